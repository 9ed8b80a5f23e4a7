use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Fundflow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Confidence at or above which a categorization is eligible for bulk approval.
pub const AUTO_APPROVE_CONFIDENCE: f32 = 0.8;

/// Confidence below which a categorization question must be answered
/// before the fund can be approved.
pub const QUESTION_REQUIRED_CONFIDENCE: f32 = 0.6;

/// Ceiling wait for a processing unit: if the extraction collaborator sends
/// no terminal or progress-bearing message within this window, the unit is
/// forced to `error` with a timeout classification.
pub const EXTRACTION_SILENCE_CEILING: Duration = Duration::from_secs(60);

/// Base delay for the event stream reconnect backoff.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Maximum reconnect delay (backoff cap).
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Reconnect attempts before the listener gives up permanently.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// Interval of the listener's background liveness check.
pub const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Default bind port for the HTTP API.
pub const DEFAULT_PORT: u16 = 8640;

/// Get the application data directory
/// ~/Fundflow/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Fundflow")
}

/// Get the directory where uploaded portfolio files are staged
pub fn uploads_dir() -> PathBuf {
    app_data_dir().join("uploads")
}

/// Base URL of the external extraction service.
/// Overridable via FUNDFLOW_EXTRACTION_URL.
pub fn extraction_service_url() -> String {
    std::env::var("FUNDFLOW_EXTRACTION_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string())
}

/// Default log filter when RUST_LOG is not set
pub fn default_log_filter() -> String {
    format!("info,{}=debug", env!("CARGO_PKG_NAME"))
}
