//! Core domain records shared across the onboarding engine.
//!
//! These types model the workflow lifecycle:
//! Upload → Processing Units → Extraction → Categorization → Review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Workflow stage / status
// ═══════════════════════════════════════════

/// Coarse workflow phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Greeting,
    FileUpload,
    Processing,
    Research,
    Extraction,
    Analysis,
    Categorization,
    CategorizationReview,
    Recommendations,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::FileUpload => "file_upload",
            Self::Processing => "processing",
            Self::Research => "research",
            Self::Extraction => "extraction",
            Self::Analysis => "analysis",
            Self::Categorization => "categorization",
            Self::CategorizationReview => "categorization_review",
            Self::Recommendations => "recommendations",
            Self::Complete => "complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "greeting" => Some(Self::Greeting),
            "file_upload" => Some(Self::FileUpload),
            "processing" => Some(Self::Processing),
            "research" => Some(Self::Research),
            "extraction" => Some(Self::Extraction),
            "analysis" => Some(Self::Analysis),
            "categorization" => Some(Self::Categorization),
            "categorization_review" => Some(Self::CategorizationReview),
            "recommendations" => Some(Self::Recommendations),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Processing,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// File classification
// ═══════════════════════════════════════════

/// How an uploaded file is routed to an extraction collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Spreadsheet of holdings (csv/xlsx/xls) — parsed row by row.
    Tabular,
    /// Fund prospectus or similar (pdf) — streamed field extraction.
    Document,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tabular => "tabular",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a fund record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Document,
    Tabular,
    ExternalApi,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Tabular => "tabular",
            Self::ExternalApi => "external_api",
        }
    }
}

// ═══════════════════════════════════════════
// Portfolio items (tabular extraction output)
// ═══════════════════════════════════════════

/// One holding row parsed from a tabular upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub ticker: String,
    pub name: String,
    pub asset_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub morningstar_category: Option<String>,
    /// Parse confidence for this row (0.0-1.0).
    pub confidence: f32,
    /// Whether a prospectus should be fetched for deeper extraction.
    #[serde(default)]
    pub requires_prospectus: bool,
}

// ═══════════════════════════════════════════
// Fund extraction (document extraction output)
// ═══════════════════════════════════════════

/// A structured fund record produced by the extraction collaborator.
/// Immutable once produced — the orchestrator only appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundExtraction {
    pub ticker: String,
    pub fund_name: String,
    /// Named numeric/string fields (NAV, expense ratio, one-year return, ...).
    /// Opaque to the orchestration core.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Extraction confidence (0.0-1.0).
    pub confidence: f32,
    /// Method label reported by the collaborator, e.g. "llamaparse".
    pub extraction_method: String,
    /// Collaborator-reported processing duration.
    pub processing_ms: u64,
    pub source: SourceKind,
    pub extracted_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════
// Processing units (one per uploaded file)
// ═══════════════════════════════════════════

/// Lifecycle status of a processing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Structured error descriptor recorded on a failed unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitError {
    /// Stable classification label (see `OnboardingError::kind`).
    pub kind: String,
    pub detail: String,
}

/// One tracked extraction job per uploaded file.
///
/// Keyed by file path; lives for the duration of one extraction run.
/// The unit's own async task is the only writer — progress is monotone
/// by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingUnit {
    /// Stable key: staged file path.
    pub file_path: String,
    /// Original filename as uploaded.
    pub file_name: String,
    pub kind: FileKind,
    pub status: UnitStatus,
    /// Progress percentage [0,100], never decreasing within a unit.
    pub progress: u8,
    /// Human-readable status message for the UI.
    pub message: String,
    /// Records accumulated from the collaborator, append-only.
    #[serde(default)]
    pub records: Vec<FundExtraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
}

impl ProcessingUnit {
    pub fn new(file_path: String, file_name: String, kind: FileKind) -> Self {
        Self {
            file_path,
            file_name,
            kind,
            status: UnitStatus::Pending,
            progress: 0,
            message: "Waiting to start".to_string(),
            records: Vec::new(),
            error: None,
        }
    }

    /// Move the unit to `processing` at progress 0.
    pub fn start(&mut self) {
        self.status = UnitStatus::Processing;
        self.progress = 0;
        self.message = "Processing started".to_string();
    }

    /// Advance progress monotonically. Regressions are clamped to the
    /// current value; anything above 100 is clamped to 100.
    /// Returns true if the visible progress actually changed.
    pub fn advance_progress(&mut self, pct: u8, message: impl Into<String>) -> bool {
        let clamped = pct.min(100).max(self.progress);
        let changed = clamped != self.progress;
        self.progress = clamped;
        self.message = message.into();
        changed
    }

    /// Terminal success: progress pinned at exactly 100.
    pub fn complete(&mut self, message: impl Into<String>) {
        self.status = UnitStatus::Completed;
        self.progress = 100;
        self.message = message.into();
    }

    /// Terminal failure with a structured descriptor. Does not touch
    /// progress — a unit can fail mid-flight.
    pub fn fail(&mut self, kind: &str, detail: impl Into<String>) {
        let detail = detail.into();
        self.status = UnitStatus::Error;
        self.message = detail.clone();
        self.error = Some(UnitError {
            kind: kind.to_string(),
            detail,
        });
    }
}

/// A staged uploaded file, recorded on the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub path: String,
    pub name: String,
    pub kind: FileKind,
    pub size_bytes: u64,
}
