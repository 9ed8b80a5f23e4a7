//! HTTP surface: router, server lifecycle, and API error mapping.

pub mod error;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{onboarding_router, AppState};
pub use server::{start_server, OnboardingServer};
