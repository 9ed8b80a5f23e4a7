//! The typed event protocol for the session stream.
//!
//! A closed, tagged union per event kind. The wire shape is one
//! SSE-style record per event: an `event:` line naming the kind and a
//! `data:` line carrying the JSON payload, terminated by a blank line.
//! Decoding rejects unknown kinds instead of silently widening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::categorize::types::{CategoryQuestion, FundCategorization};
use crate::models::FundExtraction;

// ═══════════════════════════════════════════
// Event union
// ═══════════════════════════════════════════

/// Tone of a chat reply, mirrored into the `chat_response` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTone {
    Info,
    Question,
    Warning,
    Error,
    Success,
}

/// Every event kind the stream can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// First event on every stream; gates listener liveness.
    Connected { session_id: Uuid },
    /// Per-unit progress change.
    Status {
        file: String,
        progress: u8,
        message: String,
    },
    /// Tabular parsing finished for a unit.
    PortfolioProcessed {
        file: String,
        item_count: usize,
    },
    /// One fund record arrived from a document unit.
    FundExtracted { extraction: FundExtraction },
    /// All units settled; aggregate summary.
    AnalysisComplete {
        total_units: usize,
        completed: usize,
        failed: usize,
        record_count: usize,
    },
    /// A low-confidence fund needs a user decision.
    CategorizationQuestion { question: CategoryQuestion },
    /// Every fund in scope is approved; the finalized set, emitted once.
    CategorizationComplete { funds: Vec<FundCategorization> },
    /// Assistant reply on the chat channel.
    ChatResponse {
        message: String,
        tone: MessageTone,
    },
    /// Classified failure surfaced to the listener.
    Error { kind: String, detail: String },
}

impl Event {
    /// Stable wire name, used on the `event:` line.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Status { .. } => "status",
            Self::PortfolioProcessed { .. } => "portfolio_processed",
            Self::FundExtracted { .. } => "fund_extracted",
            Self::AnalysisComplete { .. } => "analysis_complete",
            Self::CategorizationQuestion { .. } => "categorization_question",
            Self::CategorizationComplete { .. } => "categorization_complete",
            Self::ChatResponse { .. } => "chat_response",
            Self::Error { .. } => "error",
        }
    }

    /// Wrap with a publish timestamp.
    pub fn into_envelope(self) -> Envelope {
        Envelope {
            event: self,
            timestamp: Some(Utc::now()),
        }
    }
}

// ═══════════════════════════════════════════
// Envelope + wire framing
// ═══════════════════════════════════════════

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unknown or malformed event payload: {0}")]
    Payload(String),
    #[error("event line '{line}' does not match payload kind '{payload}'")]
    KindMismatch { line: String, payload: String },
}

/// An event plus its optional publish timestamp. This is what travels on
/// the broadcast channel and what the listener hands to handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub event: Event,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// JSON payload for the `data:` line.
    pub fn data_json(&self) -> String {
        // Serialization of the closed union cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Full wire record: `event:` line, `data:` line, blank terminator.
    pub fn to_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event.kind(), self.data_json())
    }

    /// Decode a received record. The `event:` line must name the same kind
    /// the payload's tag carries; unknown kinds fail rather than widen.
    pub fn decode(event_line: &str, data: &str) -> Result<Envelope, DecodeError> {
        let envelope: Envelope =
            serde_json::from_str(data).map_err(|e| DecodeError::Payload(e.to_string()))?;
        let payload_kind = envelope.event.kind();
        if event_line != payload_kind {
            return Err(DecodeError::KindMismatch {
                line: event_line.to_string(),
                payload: payload_kind.to_string(),
            });
        }
        Ok(envelope)
    }
}
