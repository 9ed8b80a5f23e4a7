//! HTTP surface of the onboarding engine.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! All endpoints live under `/api`; the session stream is served as SSE
//! from `/api/onboarding/stream/:id`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::categorize::engine::FundCandidate;
use crate::categorize::{
    CategorizationEngine, CategoryQuestion, ClassifierCollaborator, FundCategorization,
};
use crate::chat::{ChatChannel, ChatReply};
use crate::error::OnboardingError;
use crate::events::types::MessageTone;
use crate::events::{Envelope, Event, EventBroadcaster};
use crate::extract::{DocumentCollaborator, ExtractionOrchestrator, TabularCollaborator};
use crate::models::{
    FundExtraction, PortfolioItem, ProcessingUnit, SessionStatus, Stage, UploadedFile,
};
use crate::session::{ChatMessage, Session, SessionStore};
use crate::upload::{self, RejectedFile};

use super::error::ApiError;

// ═══════════════════════════════════════════
// State
// ═══════════════════════════════════════════

/// Extraction artifacts kept per session for the read endpoints.
#[derive(Debug, Default, Clone)]
pub struct SessionResults {
    pub portfolio_items: Vec<PortfolioItem>,
    pub extractions: Vec<FundExtraction>,
    pub units: Vec<ProcessingUnit>,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub orchestrator: Arc<ExtractionOrchestrator>,
    pub engine: Arc<CategorizationEngine>,
    pub chat: Arc<ChatChannel>,
    pub results: Arc<RwLock<HashMap<Uuid, SessionResults>>>,
    pub uploads_dir: PathBuf,
}

impl AppState {
    pub fn new(
        tabular: Arc<dyn TabularCollaborator>,
        document: Arc<dyn DocumentCollaborator>,
        classifier: Arc<dyn ClassifierCollaborator>,
        uploads_dir: PathBuf,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let broadcaster = Arc::new(EventBroadcaster::new());
        let orchestrator = Arc::new(ExtractionOrchestrator::new(
            tabular,
            document,
            Arc::clone(&broadcaster),
        ));
        let engine = Arc::new(CategorizationEngine::new(
            classifier,
            Arc::clone(&broadcaster),
        ));
        let chat = Arc::new(ChatChannel::new(
            Arc::clone(&sessions),
            Arc::clone(&engine),
            Arc::clone(&broadcaster),
        ));
        Self {
            sessions,
            broadcaster,
            orchestrator,
            engine,
            chat,
            results: Arc::new(RwLock::new(HashMap::new())),
            uploads_dir,
        }
    }

    fn store_results(&self, session_id: Uuid, results: SessionResults) {
        match self.results.write() {
            Ok(mut map) => {
                map.insert(session_id, results);
            }
            Err(_) => tracing::error!(%session_id, "Results store lock poisoned"),
        }
    }

    fn results_for(&self, session_id: Uuid) -> Result<SessionResults, OnboardingError> {
        let map = self
            .results
            .read()
            .map_err(|_| OnboardingError::LockPoisoned)?;
        Ok(map.get(&session_id).cloned().unwrap_or_default())
    }
}

/// Build the full onboarding router.
pub fn onboarding_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/onboarding/session", post(create_session))
        .route("/api/onboarding/session/:id/status", get(session_status))
        .route(
            "/api/onboarding/session/:id/portfolio",
            get(session_portfolio),
        )
        .route("/api/onboarding/session/:id/funds", get(session_funds))
        .route("/api/onboarding/session/:id/chat", get(session_chat_log))
        .route("/api/onboarding/session/:id", delete(delete_session))
        .route("/api/onboarding/upload", post(upload_files))
        .route("/api/onboarding/process", post(process))
        .route("/api/onboarding/stream/:id", get(stream_events))
        .route("/api/onboarding/chat", post(chat_send))
        .with_state(state)
}

// ═══════════════════════════════════════════
// Session endpoints
// ═══════════════════════════════════════════

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_sessions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.sessions.active_count(),
    })
}

async fn create_session(State(state): State<AppState>) -> Result<Json<Session>, ApiError> {
    let session = state.sessions.create()?;
    tracing::info!(session_id = %session.id, "Session created");
    Ok(Json(session))
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.sessions.get(id)?))
}

#[derive(Serialize)]
struct PortfolioResponse {
    session_id: Uuid,
    portfolio_items: Vec<PortfolioItem>,
}

async fn session_portfolio(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    state.sessions.get(id)?;
    let results = state.results_for(id)?;
    Ok(Json(PortfolioResponse {
        session_id: id,
        portfolio_items: results.portfolio_items,
    }))
}

#[derive(Serialize)]
struct FundsResponse {
    session_id: Uuid,
    extractions: Vec<FundExtraction>,
    categorizations: Vec<FundCategorization>,
}

async fn session_funds(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FundsResponse>, ApiError> {
    state.sessions.get(id)?;
    let results = state.results_for(id)?;
    // The review may not have started yet; that is not an error here
    let categorizations = match state.engine.funds(id) {
        Ok(funds) => funds,
        Err(OnboardingError::SessionNotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(FundsResponse {
        session_id: id,
        extractions: results.extractions,
        categorizations,
    }))
}

#[derive(Serialize)]
struct ChatLogResponse {
    session_id: Uuid,
    messages: Vec<ChatMessage>,
}

async fn session_chat_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatLogResponse>, ApiError> {
    let session = state.sessions.get(id)?;
    Ok(Json(ChatLogResponse {
        session_id: id,
        messages: session.chat_history,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.sessions.delete(id)?;
    state.broadcaster.remove(id);
    state.engine.remove_session(id)?;
    if let Ok(mut results) = state.results.write() {
        results.remove(&id);
    }
    tracing::info!(session_id = %id, "Session deleted");
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ═══════════════════════════════════════════
// Upload + process
// ═══════════════════════════════════════════

#[derive(Serialize)]
struct UploadResponse {
    session_id: Uuid,
    accepted: Vec<UploadedFile>,
    rejected: Vec<RejectedFile>,
}

async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut session_id: Option<Uuid> = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("session_id") {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            session_id = Some(
                text.parse()
                    .map_err(|_| ApiError::BadRequest(format!("invalid session id '{text}'")))?,
            );
        } else if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("unreadable upload: {e}")))?;
            files.push((file_name, bytes.to_vec()));
        }
    }

    let session_id =
        session_id.ok_or_else(|| ApiError::BadRequest("missing session_id field".to_string()))?;
    state.sessions.get(session_id).map_err(ApiError::from)?;
    if files.is_empty() {
        return Err(ApiError::BadRequest("no files in upload".to_string()));
    }

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for (file_name, bytes) in &files {
        if upload::classify(file_name).is_none() {
            rejected.push(RejectedFile {
                name: file_name.clone(),
                reason: format!("unsupported file type: {file_name}"),
            });
            continue;
        }
        let staged = upload::stage_upload(&state.uploads_dir, file_name, bytes)?;
        state.sessions.add_input_file(session_id, staged.clone())?;
        accepted.push(staged);
    }

    // Whole-batch rejection only when nothing was usable
    if accepted.is_empty() {
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        return Err(OnboardingError::UnsupportedFileType(names.join(", ")).into());
    }

    state
        .sessions
        .transition(session_id, Some(Stage::FileUpload), None)?;
    Ok(Json(UploadResponse {
        session_id,
        accepted,
        rejected,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ProcessAction {
    UploadFile,
    StartCategorization,
}

#[derive(Deserialize)]
struct ProcessRequest {
    session_id: Uuid,
    action: ProcessAction,
}

#[derive(Serialize)]
struct ProcessResponse {
    session_id: Uuid,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    units: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<RejectedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    funds: Option<Vec<FundCategorization>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    questions: Option<Vec<CategoryQuestion>>,
}

async fn process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    match request.action {
        ProcessAction::UploadFile => start_extraction(state, request.session_id).await,
        ProcessAction::StartCategorization => {
            start_categorization(state, request.session_id).await
        }
    }
}

/// Kick off the extraction run in the background. Progress and the final
/// summary arrive on the session stream; the response only acknowledges.
async fn start_extraction(
    state: AppState,
    session_id: Uuid,
) -> Result<Json<ProcessResponse>, ApiError> {
    let session = state.sessions.get(session_id)?;
    let plan = upload::plan_batch(&session.input_files)?;
    let unit_count = plan.units.len();
    state.sessions.transition(
        session_id,
        Some(Stage::Processing),
        Some(SessionStatus::Processing),
    )?;

    let task_state = state.clone();
    tokio::spawn(async move {
        let report = task_state.orchestrator.run(session_id, plan.units).await;
        let extractions: Vec<FundExtraction> = report.extractions().cloned().collect();
        if let Err(e) = task_state.sessions.record_counts(
            session_id,
            report.portfolio_items.len(),
            extractions.len(),
        ) {
            tracing::error!(%session_id, error = %e, "Failed to record extraction counts");
        }
        let (stage, status) = if report.succeeded() {
            (Stage::Analysis, SessionStatus::Completed)
        } else {
            (Stage::Processing, SessionStatus::Error)
        };
        if let Err(e) = task_state
            .sessions
            .transition(session_id, Some(stage), Some(status))
        {
            tracing::error!(%session_id, error = %e, "Failed to settle session after extraction");
        }
        task_state.store_results(
            session_id,
            SessionResults {
                portfolio_items: report.portfolio_items,
                extractions,
                units: report.units,
            },
        );
    });

    Ok(Json(ProcessResponse {
        session_id,
        status: "processing",
        units: Some(unit_count),
        warnings: plan.warnings,
        funds: None,
        questions: None,
    }))
}

/// Classify every extracted fund and open the review.
async fn start_categorization(
    state: AppState,
    session_id: Uuid,
) -> Result<Json<ProcessResponse>, ApiError> {
    state.sessions.get(session_id)?;
    let results = state.results_for(session_id)?;

    // One candidate per ticker; portfolio rows win over document records
    let mut candidates: Vec<FundCandidate> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for item in &results.portfolio_items {
        if seen.insert(item.ticker.to_uppercase()) {
            candidates.push(FundCandidate::from_portfolio_item(item));
        }
    }
    for extraction in &results.extractions {
        if seen.insert(extraction.ticker.to_uppercase()) {
            candidates.push(FundCandidate::from_extraction(extraction));
        }
    }
    if candidates.is_empty() {
        return Err(OnboardingError::Validation(
            "no extracted funds to categorize".to_string(),
        )
        .into());
    }

    let funds = state.engine.classify_all(session_id, candidates).await?;
    let questions = state.engine.open_questions(session_id)?;
    state.sessions.transition(
        session_id,
        Some(Stage::CategorizationReview),
        Some(SessionStatus::Idle),
    )?;

    Ok(Json(ProcessResponse {
        session_id,
        status: "categorization_started",
        units: None,
        warnings: Vec::new(),
        funds: Some(funds),
        questions: Some(questions),
    }))
}

// ═══════════════════════════════════════════
// Stream + chat
// ═══════════════════════════════════════════

async fn stream_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    state.sessions.get(id)?;
    let rx = state.broadcaster.subscribe(id);

    // `connected` is sent on the transport, not the broadcast channel:
    // it belongs to this subscriber's stream alone.
    let connected = Event::Connected { session_id: id }.into_envelope();
    let first = stream::once(async move { Ok(envelope_frame(&connected)) });
    let rest = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => return Some((Ok(envelope_frame(&envelope)), rx)),
                // A slow consumer skips what it lagged past
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Stream subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(first.chain(rest))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(5))))
}

fn envelope_frame(envelope: &Envelope) -> SseEvent {
    SseEvent::default()
        .event(envelope.event.kind())
        .data(envelope.data_json())
}

#[derive(Deserialize)]
struct ChatRequest {
    session_id: Uuid,
    message: String,
}

#[derive(Serialize)]
struct ChatResponseBody {
    message: String,
    tone: MessageTone,
}

async fn chat_send(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let ChatReply { message, tone } = state.chat.handle(request.session_id, &request.message)?;
    Ok(Json(ChatResponseBody { message, tone }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::RuleClassifier;
    use crate::extract::DocumentMessage;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use std::path::Path as FsPath;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct StubTabular;

    #[async_trait]
    impl TabularCollaborator for StubTabular {
        async fn extract_portfolio(
            &self,
            _path: &FsPath,
        ) -> Result<Vec<PortfolioItem>, OnboardingError> {
            Ok(vec![PortfolioItem {
                ticker: "VTI".to_string(),
                name: "Vanguard Total Stock Market ETF".to_string(),
                asset_class: "Equity".to_string(),
                expense_ratio: Some(0.03),
                morningstar_category: Some("Large Blend".to_string()),
                confidence: 0.98,
                requires_prospectus: false,
            }])
        }
    }

    struct StubDocument;

    #[async_trait]
    impl DocumentCollaborator for StubDocument {
        async fn extract_document(
            &self,
            _path: &FsPath,
        ) -> Result<mpsc::Receiver<DocumentMessage>, OnboardingError> {
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx.send(DocumentMessage::Done { record_count: 0 }).await;
            });
            Ok(rx)
        }
    }

    fn test_app() -> (Router, AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            Arc::new(StubTabular),
            Arc::new(StubDocument),
            Arc::new(RuleClassifier),
            dir.path().to_path_buf(),
        );
        (onboarding_router(state.clone()), state, dir)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_test_session(app: &Router) -> Uuid {
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/onboarding/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        body["id"].as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _state, _dir) = test_app();
        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn session_lifecycle_create_status_delete() {
        let (app, _state, _dir) = test_app();
        let id = create_test_session(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/onboarding/session/{id}/status"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["stage"], "greeting");

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/onboarding/session/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get(format!("/api/onboarding/session/{id}/status"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_session_is_404_with_stable_code() {
        let (app, _state, _dir) = test_app();
        let response = app
            .oneshot(
                Request::get(format!("/api/onboarding/session/{}/status", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
    }

    fn multipart_body(session_id: Uuid, files: &[(&str, &str)]) -> (String, Vec<u8>) {
        let boundary = "onboardingtestboundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\ncontent-disposition: form-data; name=\"session_id\"\r\n\r\n{session_id}\r\n"
            )
            .as_bytes(),
        );
        for (name, content) in files {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\ncontent-disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                     content-type: application/octet-stream\r\n\r\n{content}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        (
            format!("multipart/form-data; boundary={boundary}"),
            body,
        )
    }

    #[tokio::test]
    async fn upload_accepts_supported_and_reports_rejected() {
        let (app, state, _dir) = test_app();
        let id = create_test_session(&app).await;

        let (content_type, body) = multipart_body(
            id,
            &[("holdings.csv", "ticker,shares\nVTI,10"), ("notes.txt", "hi")],
        );
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/onboarding/upload")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["accepted"].as_array().unwrap().len(), 1);
        assert_eq!(body["rejected"].as_array().unwrap().len(), 1);

        let session = state.sessions.get(id).unwrap();
        assert_eq!(session.input_files.len(), 1);
        assert_eq!(session.stage, Stage::FileUpload);
    }

    #[tokio::test]
    async fn upload_of_only_unsupported_files_is_rejected_whole() {
        let (app, _state, _dir) = test_app();
        let id = create_test_session(&app).await;

        let (content_type, body) = multipart_body(id, &[("notes.txt", "hi")]);
        let response = app
            .oneshot(
                Request::post("/api/onboarding/upload")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn process_runs_extraction_and_fills_results() {
        let (app, state, _dir) = test_app();
        let id = create_test_session(&app).await;

        let (content_type, body) = multipart_body(id, &[("holdings.csv", "ticker\nVTI")]);
        app.clone()
            .oneshot(
                Request::post("/api/onboarding/upload")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/onboarding/process")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({ "session_id": id, "action": "upload_file" })
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The run is backgrounded; wait for the session to settle
        for _ in 0..50 {
            if state.sessions.get(id).unwrap().status == SessionStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let session = state.sessions.get(id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.portfolio_item_count, 1);

        let response = app
            .oneshot(
                Request::get(format!("/api/onboarding/session/{id}/portfolio"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["portfolio_items"][0]["ticker"], "VTI");
    }

    #[tokio::test]
    async fn categorization_starts_from_extracted_portfolio() {
        let (app, state, _dir) = test_app();
        let id = create_test_session(&app).await;
        state.store_results(
            id,
            SessionResults {
                portfolio_items: vec![PortfolioItem {
                    ticker: "VTI".to_string(),
                    name: "Vanguard Total Stock Market ETF".to_string(),
                    asset_class: "Equity".to_string(),
                    expense_ratio: None,
                    morningstar_category: None,
                    confidence: 0.98,
                    requires_prospectus: false,
                }],
                ..Default::default()
            },
        );

        let response = app
            .oneshot(
                Request::post("/api/onboarding/process")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "session_id": id,
                            "action": "start_categorization"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["funds"][0]["ticker"], "VTI");
        assert_eq!(state.sessions.get(id).unwrap().stage, Stage::CategorizationReview);
    }

    #[tokio::test]
    async fn categorization_without_extractions_is_a_validation_error() {
        let (app, _state, _dir) = test_app();
        let id = create_test_session(&app).await;
        let response = app
            .oneshot(
                Request::post("/api/onboarding/process")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "session_id": id,
                            "action": "start_categorization"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_round_trip_appends_to_log() {
        let (app, _state, _dir) = test_app();
        let id = create_test_session(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/onboarding/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({ "session_id": id, "message": "hello" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get(format!("/api/onboarding/session/{id}/chat"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stream_endpoint_requires_a_session() {
        let (app, _state, _dir) = test_app();
        let response = app
            .oneshot(
                Request::get(format!("/api/onboarding/stream/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
