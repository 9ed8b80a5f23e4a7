//! Session event stream: typed protocol, server-side broadcaster, and the
//! listener-side reconnect state machine.

pub mod broadcaster;
pub mod listener;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use listener::{EventListener, ReconnectPolicy};
pub use types::{Envelope, Event};
