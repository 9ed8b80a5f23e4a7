//! Session Store — the single owner of per-session workflow state.
//!
//! Sessions are mutated only through explicit transition calls, never
//! directly by transport handlers. All mutations are whole-record
//! replace-on-write keyed by session id; concurrent writers to the same
//! session are serialized by the store's write lock.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::models::{SessionStatus, Stage, UploadedFile};

// ═══════════════════════════════════════════
// Session record
// ═══════════════════════════════════════════

/// One message in the session's ordered chat log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One user's onboarding run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stage: Stage,
    pub status: SessionStatus,
    /// Ordered conversation log.
    pub chat_history: Vec<ChatMessage>,
    /// Files staged for this session, in upload order.
    pub input_files: Vec<UploadedFile>,
    pub portfolio_item_count: usize,
    pub fund_extraction_count: usize,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            stage: Stage::Greeting,
            status: SessionStatus::Idle,
            chat_history: Vec::new(),
            input_files: Vec::new(),
            portfolio_item_count: 0,
            fund_extraction_count: 0,
        }
    }
}

// ═══════════════════════════════════════════
// Transition validation
// ═══════════════════════════════════════════

/// Reject stage/status combinations that cannot occur in a real run.
/// A session cannot be "completed" before any processing has started,
/// and a finished workflow cannot sit idle or processing.
fn validate_combination(stage: Stage, status: SessionStatus) -> Result<(), OnboardingError> {
    if status == SessionStatus::Completed && stage < Stage::Processing {
        return Err(OnboardingError::Validation(format!(
            "status 'completed' is invalid at stage '{stage}'"
        )));
    }
    if stage == Stage::Complete
        && matches!(status, SessionStatus::Idle | SessionStatus::Processing)
    {
        return Err(OnboardingError::Validation(format!(
            "status '{status}' is invalid at stage 'complete'"
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════
// SessionStore
// ═══════════════════════════════════════════

/// In-memory session owner. Wrapped in `Arc` at startup and shared by the
/// HTTP handlers, the extraction orchestrator, and the categorization
/// engine.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a fresh session: stage `greeting`, status `idle`.
    pub fn create(&self) -> Result<Session, OnboardingError> {
        let session = Session::new();
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| OnboardingError::LockPoisoned)?;
        sessions.insert(session.id, session.clone());
        tracing::info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    /// Snapshot of a session.
    pub fn get(&self, id: Uuid) -> Result<Session, OnboardingError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| OnboardingError::LockPoisoned)?;
        sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| OnboardingError::SessionNotFound(id.to_string()))
    }

    /// Transition stage and/or status. Rejects invalid combinations and
    /// leaves the record untouched on rejection. Idempotent: transitioning
    /// to the current stage/status is a no-op that still succeeds.
    pub fn transition(
        &self,
        id: Uuid,
        stage: Option<Stage>,
        status: Option<SessionStatus>,
    ) -> Result<Session, OnboardingError> {
        self.mutate(id, |session| {
            let next_stage = stage.unwrap_or(session.stage);
            let next_status = status.unwrap_or(session.status);
            validate_combination(next_stage, next_status)?;
            session.stage = next_stage;
            session.status = next_status;
            Ok(())
        })
    }

    /// Append a message to the ordered chat log.
    pub fn append_message(
        &self,
        id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<Session, OnboardingError> {
        let message = ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.mutate(id, |session| {
            session.chat_history.push(message);
            Ok(())
        })
    }

    /// Record a staged upload on the session.
    pub fn add_input_file(&self, id: Uuid, file: UploadedFile) -> Result<Session, OnboardingError> {
        self.mutate(id, |session| {
            session.input_files.push(file);
            Ok(())
        })
    }

    /// Record aggregate counts after an extraction run settles.
    pub fn record_counts(
        &self,
        id: Uuid,
        portfolio_items: usize,
        fund_extractions: usize,
    ) -> Result<Session, OnboardingError> {
        self.mutate(id, |session| {
            session.portfolio_item_count = portfolio_items;
            session.fund_extraction_count = fund_extractions;
            Ok(())
        })
    }

    /// Delete a session. Deleting an unknown id is an error the caller
    /// must surface, not suppress.
    pub fn delete(&self, id: Uuid) -> Result<(), OnboardingError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| OnboardingError::LockPoisoned)?;
        sessions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| OnboardingError::SessionNotFound(id.to_string()))
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    // ── Internal ────────────────────────────────────────────

    /// Whole-record replace-on-write: clone, mutate the clone, swap it in.
    /// A rejected mutation leaves the stored record byte-identical.
    fn mutate<F>(&self, id: Uuid, f: F) -> Result<Session, OnboardingError>
    where
        F: FnOnce(&mut Session) -> Result<(), OnboardingError>,
    {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| OnboardingError::LockPoisoned)?;
        let current = sessions
            .get(&id)
            .ok_or_else(|| OnboardingError::SessionNotFound(id.to_string()))?;
        let mut next = current.clone();
        f(&mut next)?;
        next.updated_at = Utc::now();
        sessions.insert(id, next.clone());
        Ok(next)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;

    #[test]
    fn create_starts_at_greeting_idle() {
        let store = SessionStore::new();
        let session = store.create().unwrap();
        assert_eq!(session.stage, Stage::Greeting);
        assert_eq!(session.status, SessionStatus::Idle);
        assert!(session.chat_history.is_empty());
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn get_unknown_session_is_not_found() {
        let store = SessionStore::new();
        let err = store.get(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, OnboardingError::SessionNotFound(_)));
    }

    #[test]
    fn transition_updates_both_fields() {
        let store = SessionStore::new();
        let session = store.create().unwrap();
        let updated = store
            .transition(
                session.id,
                Some(Stage::Processing),
                Some(SessionStatus::Processing),
            )
            .unwrap();
        assert_eq!(updated.stage, Stage::Processing);
        assert_eq!(updated.status, SessionStatus::Processing);
        assert!(updated.updated_at >= session.updated_at);
    }

    #[test]
    fn transition_rejects_completed_at_greeting() {
        let store = SessionStore::new();
        let session = store.create().unwrap();
        let err = store
            .transition(session.id, None, Some(SessionStatus::Completed))
            .unwrap_err();
        assert!(matches!(err, OnboardingError::Validation(_)));
        // Rejected transition leaves the record untouched
        let unchanged = store.get(session.id).unwrap();
        assert_eq!(unchanged.status, SessionStatus::Idle);
        assert_eq!(unchanged.stage, Stage::Greeting);
    }

    #[test]
    fn transition_rejects_idle_at_complete() {
        let store = SessionStore::new();
        let session = store.create().unwrap();
        store
            .transition(
                session.id,
                Some(Stage::Processing),
                Some(SessionStatus::Processing),
            )
            .unwrap();
        let err = store
            .transition(session.id, Some(Stage::Complete), None)
            .unwrap_err();
        assert!(matches!(err, OnboardingError::Validation(_)));
        // Completed status with complete stage is fine
        store
            .transition(
                session.id,
                Some(Stage::Complete),
                Some(SessionStatus::Completed),
            )
            .unwrap();
    }

    #[test]
    fn transition_is_idempotent() {
        let store = SessionStore::new();
        let session = store.create().unwrap();
        let a = store
            .transition(session.id, Some(Stage::FileUpload), None)
            .unwrap();
        let b = store
            .transition(session.id, Some(Stage::FileUpload), None)
            .unwrap();
        assert_eq!(a.stage, b.stage);
        assert_eq!(a.status, b.status);
    }

    #[test]
    fn append_message_preserves_order() {
        let store = SessionStore::new();
        let session = store.create().unwrap();
        store.append_message(session.id, "user", "hello").unwrap();
        store
            .append_message(session.id, "assistant", "hi, upload your portfolio")
            .unwrap();
        let session = store.get(session.id).unwrap();
        assert_eq!(session.chat_history.len(), 2);
        assert_eq!(session.chat_history[0].role, "user");
        assert_eq!(session.chat_history[1].role, "assistant");
    }

    #[test]
    fn add_input_file_and_counts() {
        let store = SessionStore::new();
        let session = store.create().unwrap();
        store
            .add_input_file(
                session.id,
                UploadedFile {
                    path: "/tmp/p.csv".into(),
                    name: "p.csv".into(),
                    kind: FileKind::Tabular,
                    size_bytes: 1024,
                },
            )
            .unwrap();
        store.record_counts(session.id, 12, 3).unwrap();
        let session = store.get(session.id).unwrap();
        assert_eq!(session.input_files.len(), 1);
        assert_eq!(session.portfolio_item_count, 12);
        assert_eq!(session.fund_extraction_count, 3);
    }

    #[test]
    fn delete_removes_session() {
        let store = SessionStore::new();
        let session = store.create().unwrap();
        store.delete(session.id).unwrap();
        assert_eq!(store.active_count(), 0);
        let err = store.delete(session.id).unwrap_err();
        assert!(matches!(err, OnboardingError::SessionNotFound(_)));
    }
}
