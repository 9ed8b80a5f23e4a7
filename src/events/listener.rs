//! Listener side of the event stream: line-buffered frame parsing and the
//! reconnect protocol.
//!
//! Connection lifecycle:
//! 1. Open the stream; the channel is live only after a `connected` event
//! 2. On transport failure, back off `min(base × 1.5^attempt, 60s)`
//! 3. Give up permanently after 10 attempts without a `connected` event
//! 4. A liveness check every 10s re-enters the same reconnect path when
//!    the transport has gone silent
//! 5. `disconnect()` cancels any pending reconnect timer, idempotently
//!
//! The backoff counter and connection phase are explicit state on
//! `ReconnectState`, not captured variables, so the policy is unit-testable
//! without a live transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config;
use crate::error::OnboardingError;

use super::types::{Envelope, Event};

/// The transport is considered stalled after this much silence.
/// The server keep-alive ticks every 5s, so this allows several misses.
const STALL_THRESHOLD: Duration = Duration::from_secs(30);

// ═══════════════════════════════════════════
// Reconnect state machine
// ═══════════════════════════════════════════

/// Backoff parameters for the reconnect loop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: config::RECONNECT_BASE_DELAY,
            max_delay: config::RECONNECT_MAX_DELAY,
            max_attempts: config::RECONNECT_MAX_ATTEMPTS,
        }
    }
}

/// Connection phase of the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Explicit reconnect state: phase plus the backoff attempt counter.
#[derive(Debug)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    phase: ConnectionPhase,
    attempt: u32,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            phase: ConnectionPhase::Disconnected,
            attempt: 0,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A connection attempt is starting.
    pub fn on_connecting(&mut self) {
        self.phase = ConnectionPhase::Connecting;
    }

    /// A `connected` event arrived: the channel is live and the backoff
    /// counter resets.
    pub fn on_connected(&mut self) {
        self.phase = ConnectionPhase::Connected;
        self.attempt = 0;
    }

    /// The transport failed or went stale. Returns the delay to wait
    /// before the next attempt, or `None` when attempts are exhausted
    /// and the listener must surface a terminal error.
    pub fn on_failure(&mut self) -> Option<Duration> {
        self.phase = ConnectionPhase::Disconnected;
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = backoff_delay(self.policy.base_delay, self.policy.max_delay, self.attempt);
        self.attempt += 1;
        Some(delay)
    }
}

/// `min(base × 1.5^attempt, max)`.
fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1.5f64.powi(attempt as i32);
    let millis = (base.as_millis() as f64 * factor).round() as u64;
    Duration::from_millis(millis).min(max)
}

// ═══════════════════════════════════════════
// Wire parsing
// ═══════════════════════════════════════════

/// Buffers partial transport chunks until full lines are available.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and drain every complete line it unlocked.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

/// Accumulates `event:`/`data:` lines into complete records. A record is
/// complete at the first blank line after a data line.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    event: Option<String>,
    data: Option<String>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns a complete `(event_kind, data)` pair when
    /// the record boundary is seen.
    pub fn feed(&mut self, line: &str) -> Option<(String, String)> {
        if line.is_empty() {
            let frame = match (self.event.take(), self.data.take()) {
                (Some(event), Some(data)) => Some((event, data)),
                // Keep-alive comments and stray blanks produce no record.
                _ => None,
            };
            return frame;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data = Some(rest.trim().to_string());
        }
        // Comment lines (":" prefix) and unknown fields are ignored.
        None
    }
}

// ═══════════════════════════════════════════
// Handler registry
// ═══════════════════════════════════════════

type Handler = Box<dyn Fn(&Envelope) + Send + Sync>;

/// Every event goes to the any-event handler; a kind-specific handler
/// additionally runs when registered. Both run — kind-specific dispatch
/// is additive, not a replacement.
#[derive(Default)]
pub struct HandlerRegistry {
    any: Vec<Handler>,
    by_kind: HashMap<&'static str, Vec<Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_any(&mut self, handler: impl Fn(&Envelope) + Send + Sync + 'static) {
        self.any.push(Box::new(handler));
    }

    pub fn on(&mut self, kind: &'static str, handler: impl Fn(&Envelope) + Send + Sync + 'static) {
        self.by_kind.entry(kind).or_default().push(Box::new(handler));
    }

    pub fn dispatch(&self, envelope: &Envelope) {
        for handler in &self.any {
            handler(envelope);
        }
        if let Some(handlers) = self.by_kind.get(envelope.event.kind()) {
            for handler in handlers {
                handler(envelope);
            }
        }
    }
}

// ═══════════════════════════════════════════
// EventListener
// ═══════════════════════════════════════════

/// Long-lived stream consumer with the reconnect contract.
pub struct EventListener {
    url: String,
    policy: ReconnectPolicy,
    handlers: HandlerRegistry,
    shutdown: Arc<Shutdown>,
}

/// Shared disconnect flag. `trigger()` is idempotent.
struct Shutdown {
    requested: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Handle returned by `spawn()`; dropping it does not stop the listener.
pub struct ListenerHandle {
    shutdown: Arc<Shutdown>,
    task: tokio::task::JoinHandle<Result<(), OnboardingError>>,
}

impl ListenerHandle {
    /// Stop the listener and cancel any pending reconnect timer.
    /// Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.shutdown.trigger();
    }

    /// Wait for the listener loop to finish. Returns the terminal
    /// connection error when reconnect attempts were exhausted.
    pub async fn join(self) -> Result<(), OnboardingError> {
        self.task
            .await
            .map_err(|e| OnboardingError::StreamInterrupted(e.to_string()))?
    }
}

impl EventListener {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
            handlers: HandlerRegistry::new(),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a handler that runs for every event.
    pub fn on_any(mut self, handler: impl Fn(&Envelope) + Send + Sync + 'static) -> Self {
        self.handlers.on_any(handler);
        self
    }

    /// Register a kind-specific handler. Runs in addition to any-event
    /// handlers, never instead of them.
    pub fn on(
        mut self,
        kind: &'static str,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.on(kind, handler);
        self
    }

    /// Start the listener loop on the current runtime.
    pub fn spawn(self) -> ListenerHandle {
        let shutdown = Arc::clone(&self.shutdown);
        let task = tokio::spawn(self.run());
        ListenerHandle { shutdown, task }
    }

    async fn run(self) -> Result<(), OnboardingError> {
        let client = reqwest::Client::new();
        let mut state = ReconnectState::new(self.policy.clone());

        loop {
            if self.shutdown.is_requested() {
                return Ok(());
            }

            state.on_connecting();
            let outcome = self.consume_stream(&client, &mut state).await;

            if self.shutdown.is_requested() {
                return Ok(());
            }

            match outcome {
                Err(err) => {
                    tracing::warn!(url = %self.url, error = %err, "Event stream dropped");
                    match state.on_failure() {
                        Some(delay) => {
                            tracing::debug!(
                                attempt = state.attempt(),
                                delay_ms = delay.as_millis() as u64,
                                "Scheduling reconnect"
                            );
                            // The pending timer is cancelled by disconnect().
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = self.shutdown.notify.notified() => return Ok(()),
                            }
                        }
                        None => {
                            let terminal = OnboardingError::ConnectionFailed(format!(
                                "reconnect attempts exhausted for {}",
                                self.url
                            ));
                            self.handlers.dispatch(
                                &Event::Error {
                                    kind: terminal.kind().to_string(),
                                    detail: terminal.to_string(),
                                }
                                .into_envelope(),
                            );
                            return Err(terminal);
                        }
                    }
                }
                Ok(()) => return Ok(()),
            }
        }
    }

    /// Consume one connection until it ends. `Ok(())` only on clean
    /// shutdown; every transport problem comes back as an error so the
    /// caller re-enters the reconnect path.
    async fn consume_stream(
        &self,
        client: &reqwest::Client,
        state: &mut ReconnectState,
    ) -> Result<(), OnboardingError> {
        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| OnboardingError::ConnectionFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(OnboardingError::ConnectionFailed(format!(
                "stream endpoint returned {}",
                response.status()
            )));
        }

        let mut chunks = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut frames = FrameAccumulator::new();
        let mut last_activity = Instant::now();
        let mut liveness = tokio::time::interval(config::LIVENESS_CHECK_INTERVAL);
        liveness.reset();

        loop {
            tokio::select! {
                _ = self.shutdown.notify.notified() => return Ok(()),
                _ = liveness.tick() => {
                    if last_activity.elapsed() > STALL_THRESHOLD {
                        return Err(OnboardingError::StreamInterrupted(
                            "transport silent past stall threshold".into(),
                        ));
                    }
                }
                chunk = chunks.next() => {
                    let bytes = match chunk {
                        Some(Ok(bytes)) => bytes,
                        Some(Err(e)) => {
                            return Err(OnboardingError::StreamInterrupted(e.to_string()))
                        }
                        None => {
                            return Err(OnboardingError::StreamInterrupted(
                                "transport closed".into(),
                            ))
                        }
                    };
                    last_activity = Instant::now();
                    let text = String::from_utf8_lossy(&bytes);
                    for line in lines.push(&text) {
                        let Some((event_line, data)) = frames.feed(&line) else {
                            continue;
                        };
                        match Envelope::decode(&event_line, &data) {
                            Ok(envelope) => {
                                // The channel is live only once `connected`
                                // arrives; it also resets the backoff counter.
                                if matches!(envelope.event, Event::Connected { .. }) {
                                    state.on_connected();
                                }
                                if state.phase() == ConnectionPhase::Connected {
                                    self.handlers.dispatch(&envelope);
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Dropping undecodable event record");
                            }
                        }
                    }
                }
            }
        }
    }
}
