//! Client for the external extraction service.
//!
//! Two collaborator traits split the surface by file kind: tabular files
//! come back as one portfolio batch, documents as an incremental NDJSON
//! stream of typed messages. `ExtractionServiceClient` implements both
//! over HTTP; tests and the orchestrator swap in mocks.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::OnboardingError;
use crate::events::listener::LineBuffer;
use crate::models::{FundExtraction, PortfolioItem};

/// Buffered capacity of a document message channel. Backpressure past this
/// point pauses the HTTP read.
const DOCUMENT_CHANNEL_CAPACITY: usize = 64;

// ═══════════════════════════════════════════
// Collaborator traits
// ═══════════════════════════════════════════

/// Extracts a full portfolio from a tabular file in one call.
#[async_trait]
pub trait TabularCollaborator: Send + Sync {
    async fn extract_portfolio(&self, path: &Path) -> Result<Vec<PortfolioItem>, OnboardingError>;
}

/// Extracts fund records from a document as an incremental stream.
///
/// The returned receiver yields messages until `Done` or `Error`; dropping
/// it cancels the in-flight extraction.
#[async_trait]
pub trait DocumentCollaborator: Send + Sync {
    async fn extract_document(
        &self,
        path: &Path,
    ) -> Result<mpsc::Receiver<DocumentMessage>, OnboardingError>;
}

/// One line of the document extraction stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentMessage {
    Progress { progress: u8, message: String },
    Record { extraction: FundExtraction },
    Done { record_count: usize },
    Error { detail: String },
}

/// Parse one NDJSON line from the service. Blank lines carry no message.
pub fn parse_service_line(line: &str) -> Result<Option<DocumentMessage>, OnboardingError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| OnboardingError::ExtractionServiceError(format!("bad stream line: {e}")))
}

// ═══════════════════════════════════════════
// HTTP client
// ═══════════════════════════════════════════

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    file_path: &'a Path,
}

#[derive(Debug, Deserialize)]
struct PortfolioBatch {
    items: Vec<PortfolioItem>,
}

/// HTTP implementation of both collaborator traits.
#[derive(Debug, Clone)]
pub struct ExtractionServiceClient {
    client: reqwest::Client,
    base_url: String,
    method_label: String,
}

impl ExtractionServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            method_label: "extraction_service".to_string(),
        }
    }

    /// Override the method label stamped on extractions without one.
    pub fn with_method_label(mut self, label: impl Into<String>) -> Self {
        self.method_label = label.into();
        self
    }

    async fn post(&self, route: &str, path: &Path) -> Result<reqwest::Response, OnboardingError> {
        let url = format!("{}{route}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ExtractRequest { file_path: path })
            .send()
            .await
            .map_err(|e| OnboardingError::ConnectionFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(OnboardingError::ExtractionServiceError(format!(
                "{route} returned {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl TabularCollaborator for ExtractionServiceClient {
    async fn extract_portfolio(&self, path: &Path) -> Result<Vec<PortfolioItem>, OnboardingError> {
        let started = Instant::now();
        let response = self.post("/extract/tabular", path).await?;
        let batch: PortfolioBatch = response
            .json()
            .await
            .map_err(|e| OnboardingError::ExtractionServiceError(e.to_string()))?;
        tracing::info!(
            file = %path.display(),
            items = batch.items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tabular extraction finished"
        );
        Ok(batch.items)
    }
}

#[async_trait]
impl DocumentCollaborator for ExtractionServiceClient {
    async fn extract_document(
        &self,
        path: &Path,
    ) -> Result<mpsc::Receiver<DocumentMessage>, OnboardingError> {
        let started = Instant::now();
        let response = self.post("/extract/document", path).await?;
        let (tx, rx) = mpsc::channel(DOCUMENT_CHANNEL_CAPACITY);
        let method_label = self.method_label.clone();
        let path: PathBuf = path.to_path_buf();

        tokio::spawn(async move {
            let mut chunks = response.bytes_stream();
            let mut lines = LineBuffer::new();
            while let Some(chunk) = chunks.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(DocumentMessage::Error {
                                detail: format!("stream interrupted: {e}"),
                            })
                            .await;
                        return;
                    }
                };
                let text = String::from_utf8_lossy(&bytes);
                for line in lines.push(&text) {
                    let message = match parse_service_line(&line) {
                        Ok(Some(message)) => stamp(message, &method_label, started),
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(file = %path.display(), error = %e, "Dropping bad stream line");
                            continue;
                        }
                    };
                    // Receiver dropped means the unit was cancelled; stop
                    // reading so the connection is released.
                    if tx.send(message).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Fill in method label and elapsed time on records the service left blank.
fn stamp(message: DocumentMessage, method_label: &str, started: Instant) -> DocumentMessage {
    match message {
        DocumentMessage::Record { mut extraction } => {
            if extraction.extraction_method.is_empty() {
                extraction.extraction_method = method_label.to_string();
            }
            if extraction.processing_ms == 0 {
                extraction.processing_ms = started.elapsed().as_millis() as u64;
            }
            DocumentMessage::Record { extraction }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    #[test]
    fn parse_progress_line() {
        let message =
            parse_service_line(r#"{"type":"progress","progress":40,"message":"page 2 of 5"}"#)
                .unwrap()
                .unwrap();
        assert!(matches!(
            message,
            DocumentMessage::Progress { progress: 40, .. }
        ));
    }

    #[test]
    fn parse_record_line() {
        let line = r#"{"type":"record","extraction":{"ticker":"VTSAX","fund_name":"Vanguard Total Stock Market","fields":{"expense_ratio":0.04},"confidence":0.92,"extraction_method":"","processing_ms":0,"source":"document","extracted_at":"2026-08-30T12:00:00Z"}}"#;
        let message = parse_service_line(line).unwrap().unwrap();
        let DocumentMessage::Record { extraction } = message else {
            panic!("expected record");
        };
        assert_eq!(extraction.ticker, "VTSAX");
        assert_eq!(extraction.source, SourceKind::Document);
    }

    #[test]
    fn parse_done_and_error_lines() {
        assert!(matches!(
            parse_service_line(r#"{"type":"done","record_count":7}"#).unwrap(),
            Some(DocumentMessage::Done { record_count: 7 })
        ));
        assert!(matches!(
            parse_service_line(r#"{"type":"error","detail":"ocr failed"}"#).unwrap(),
            Some(DocumentMessage::Error { .. })
        ));
    }

    #[test]
    fn blank_lines_carry_no_message() {
        assert!(parse_service_line("").unwrap().is_none());
        assert!(parse_service_line("   ").unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(parse_service_line("not json").is_err());
        assert!(parse_service_line(r#"{"type":"wat"}"#).is_err());
    }

    #[test]
    fn stamp_fills_blank_method_and_elapsed() {
        let extraction = FundExtraction {
            ticker: "FXAIX".into(),
            fund_name: "Fidelity 500 Index".into(),
            fields: serde_json::Map::new(),
            confidence: 0.9,
            extraction_method: String::new(),
            processing_ms: 0,
            source: SourceKind::Document,
            extracted_at: chrono::Utc::now(),
        };
        let stamped = stamp(
            DocumentMessage::Record { extraction },
            "extraction_service",
            Instant::now(),
        );
        let DocumentMessage::Record { extraction } = stamped else {
            panic!("expected record");
        };
        assert_eq!(extraction.extraction_method, "extraction_service");
    }

    #[test]
    fn stamp_preserves_service_supplied_method() {
        let extraction = FundExtraction {
            ticker: "FXAIX".into(),
            fund_name: "Fidelity 500 Index".into(),
            fields: serde_json::Map::new(),
            confidence: 0.9,
            extraction_method: "vision_ocr".into(),
            processing_ms: 321,
            source: SourceKind::Document,
            extracted_at: chrono::Utc::now(),
        };
        let stamped = stamp(
            DocumentMessage::Record { extraction },
            "extraction_service",
            Instant::now(),
        );
        let DocumentMessage::Record { extraction } = stamped else {
            panic!("expected record");
        };
        assert_eq!(extraction.extraction_method, "vision_ocr");
        assert_eq!(extraction.processing_ms, 321);
    }
}
