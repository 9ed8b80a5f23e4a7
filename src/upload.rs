//! Upload Coordinator — classifies uploaded files and plans a batch.
//!
//! Each accepted file becomes one pending `ProcessingUnit`. A batch is
//! rejected as a whole only when zero files are accepted; otherwise the
//! accepted subset proceeds and rejected files surface as warnings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::models::{FileKind, ProcessingUnit, UploadedFile};

/// Extensions parsed row by row as holdings spreadsheets.
const TABULAR_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

/// Extensions routed to streaming document extraction.
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf"];

// ═══════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════

/// Classify a file by its declared name/extension, with a mime-type
/// fallback for extensionless uploads.
pub fn classify(file_name: &str) -> Option<FileKind> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some(e) if TABULAR_EXTENSIONS.contains(&e) => Some(FileKind::Tabular),
        Some(e) if DOCUMENT_EXTENSIONS.contains(&e) => Some(FileKind::Document),
        Some(_) => None,
        None => {
            // No extension — a declared mime type is the only signal left.
            let guess = mime_guess::from_path(file_name).first_or_octet_stream();
            match (guess.type_().as_str(), guess.subtype().as_str()) {
                ("text", "csv") => Some(FileKind::Tabular),
                ("application", "pdf") => Some(FileKind::Document),
                _ => None,
            }
        }
    }
}

// ═══════════════════════════════════════════
// Batch planning
// ═══════════════════════════════════════════

/// A file rejected during batch planning, reported as a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedFile {
    pub name: String,
    pub reason: String,
}

/// Result of planning a batch: one pending unit per accepted file plus
/// warnings for the rejected subset.
#[derive(Debug)]
pub struct BatchPlan {
    pub units: Vec<ProcessingUnit>,
    pub warnings: Vec<RejectedFile>,
}

/// Plan a batch of staged files. Fails only when nothing is accepted.
pub fn plan_batch(files: &[UploadedFile]) -> Result<BatchPlan, OnboardingError> {
    let mut units = Vec::new();
    let mut warnings = Vec::new();

    for file in files {
        match classify(&file.name) {
            Some(kind) => {
                units.push(ProcessingUnit::new(file.path.clone(), file.name.clone(), kind));
            }
            None => {
                tracing::warn!(file = %file.name, "Rejecting unsupported file in batch");
                warnings.push(RejectedFile {
                    name: file.name.clone(),
                    reason: format!("unsupported file type: {}", file.name),
                });
            }
        }
    }

    if units.is_empty() {
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        return Err(OnboardingError::UnsupportedFileType(names.join(", ")));
    }

    Ok(BatchPlan { units, warnings })
}

// ═══════════════════════════════════════════
// Staging
// ═══════════════════════════════════════════

/// Stage upload bytes under `dir` with a uuid-prefixed filename and return
/// the session-facing `UploadedFile` record.
pub fn stage_upload(
    dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<UploadedFile, OnboardingError> {
    let kind = classify(file_name)
        .ok_or_else(|| OnboardingError::UnsupportedFileType(file_name.to_string()))?;

    std::fs::create_dir_all(dir)
        .map_err(|e| OnboardingError::UploadFailed(format!("cannot create upload dir: {e}")))?;

    let staged_name = format!("{}_{}", Uuid::new_v4(), sanitize_file_name(file_name));
    let path: PathBuf = dir.join(&staged_name);
    std::fs::write(&path, bytes)
        .map_err(|e| OnboardingError::UploadFailed(format!("cannot write {staged_name}: {e}")))?;

    tracing::info!(file = file_name, staged = %path.display(), size = bytes.len(), "Upload staged");

    Ok(UploadedFile {
        path: path.to_string_lossy().into_owned(),
        name: file_name.to_string(),
        kind,
        size_bytes: bytes.len() as u64,
    })
}

/// Strip path separators and control characters from a client-supplied name.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
