//! Chat channel.
//!
//! The chat surface carries two shapes of input: plain conversation, and
//! structured commands embedded as `COMMAND_NAME:<json>`. Commands are
//! parsed exactly once, here at the boundary, into the closed
//! [`ChatCommand`] union — the workflow engine never sees raw text.
//! Unknown `WORD:` prefixes are treated as conversation, not rejected.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::categorize::types::{CategoryResponse, SubClassification};
use crate::categorize::{AssetClass, CategorizationEngine};
use crate::error::OnboardingError;
use crate::events::types::MessageTone;
use crate::events::{Event, EventBroadcaster};
use crate::models::Stage;
use crate::session::SessionStore;

// ═══════════════════════════════════════════
// Command parsing
// ═══════════════════════════════════════════

/// Structured commands the chat channel accepts.
#[derive(Debug, Clone)]
pub enum ChatCommand {
    CategoryResponse(CategoryResponse),
    CategorizationEdit {
        ticker: String,
        asset_class: AssetClass,
        sub: Option<SubClassification>,
        reason: String,
        actor: String,
    },
    ApproveCategorization {
        ticker: String,
    },
    BulkApprove {
        tickers: Option<Vec<String>>,
    },
}

/// A chat message after boundary parsing.
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Command(ChatCommand),
    Text(String),
}

#[derive(Deserialize)]
struct CategoryResponsePayload {
    question_id: Uuid,
    ticker: String,
    selected_value: String,
    #[serde(default)]
    custom_value: Option<String>,
}

#[derive(Deserialize)]
struct EditPayload {
    ticker: String,
    asset_class: AssetClass,
    #[serde(default)]
    sub: Option<SubClassification>,
    reason: String,
    #[serde(default)]
    actor: Option<String>,
}

#[derive(Deserialize)]
struct ApprovePayload {
    ticker: String,
}

#[derive(Deserialize)]
struct BulkApprovePayload {
    #[serde(default)]
    tickers: Option<Vec<String>>,
}

/// Parse one inbound chat message. A recognized command prefix with a
/// malformed JSON body is an error — it is clearly an attempted command,
/// so silently treating it as conversation would swallow the mistake.
pub fn parse_message(text: &str) -> Result<ParsedMessage, OnboardingError> {
    let trimmed = text.trim();

    let command = if let Some(body) = trimmed.strip_prefix("CATEGORY_RESPONSE:") {
        let p: CategoryResponsePayload = parse_body("CATEGORY_RESPONSE", body)?;
        ChatCommand::CategoryResponse(CategoryResponse {
            question_id: p.question_id,
            ticker: p.ticker,
            selected_value: p.selected_value,
            custom_value: p.custom_value,
            responded_at: Utc::now(),
        })
    } else if let Some(body) = trimmed.strip_prefix("CATEGORIZATION_EDIT:") {
        let p: EditPayload = parse_body("CATEGORIZATION_EDIT", body)?;
        ChatCommand::CategorizationEdit {
            ticker: p.ticker,
            asset_class: p.asset_class,
            sub: p.sub,
            reason: p.reason,
            actor: p.actor.unwrap_or_else(|| "user".to_string()),
        }
    } else if let Some(body) = trimmed.strip_prefix("APPROVE_CATEGORIZATION:") {
        let p: ApprovePayload = parse_body("APPROVE_CATEGORIZATION", body)?;
        ChatCommand::ApproveCategorization { ticker: p.ticker }
    } else if let Some(body) = trimmed.strip_prefix("BULK_APPROVE:") {
        let p: BulkApprovePayload = parse_body("BULK_APPROVE", body)?;
        ChatCommand::BulkApprove { tickers: p.tickers }
    } else {
        return Ok(ParsedMessage::Text(trimmed.to_string()));
    };
    Ok(ParsedMessage::Command(command))
}

fn parse_body<T: serde::de::DeserializeOwned>(
    command: &str,
    body: &str,
) -> Result<T, OnboardingError> {
    serde_json::from_str(body.trim())
        .map_err(|e| OnboardingError::Validation(format!("malformed {command} payload: {e}")))
}

// ═══════════════════════════════════════════
// Channel
// ═══════════════════════════════════════════

/// The assistant's reply to one chat message.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: String,
    pub tone: MessageTone,
}

/// Chat entry point: logs messages on the session, routes commands to the
/// categorization engine, and answers conversation by stage.
pub struct ChatChannel {
    sessions: Arc<SessionStore>,
    engine: Arc<CategorizationEngine>,
    broadcaster: Arc<EventBroadcaster>,
}

impl ChatChannel {
    pub fn new(
        sessions: Arc<SessionStore>,
        engine: Arc<CategorizationEngine>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            sessions,
            engine,
            broadcaster,
        }
    }

    /// Handle one inbound message end to end: log it, act on it, log and
    /// publish the reply.
    pub fn handle(&self, session_id: Uuid, text: &str) -> Result<ChatReply, OnboardingError> {
        let session = self.sessions.append_message(session_id, "user", text)?;

        let reply = match parse_message(text) {
            Ok(ParsedMessage::Command(command)) => self.run_command(session_id, command),
            Ok(ParsedMessage::Text(message)) => Ok(stage_reply(session.stage, &message)),
            Err(e) => Err(e),
        };
        // A failed command still gets a spoken reply on the channel
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => ChatReply {
                message: e.to_string(),
                tone: MessageTone::Error,
            },
        };

        self.sessions
            .append_message(session_id, "assistant", &reply.message)?;
        self.broadcaster.publish(
            session_id,
            Event::ChatResponse {
                message: reply.message.clone(),
                tone: reply.tone,
            },
        );
        Ok(reply)
    }

    fn run_command(
        &self,
        session_id: Uuid,
        command: ChatCommand,
    ) -> Result<ChatReply, OnboardingError> {
        match command {
            ChatCommand::CategoryResponse(response) => {
                let ticker = response.ticker.clone();
                let fund = self.engine.answer(session_id, response)?;
                Ok(ChatReply {
                    message: format!(
                        "Noted — {ticker} is now classified as {}. Approve it when you're ready.",
                        fund.asset_class
                    ),
                    tone: MessageTone::Info,
                })
            }
            ChatCommand::CategorizationEdit {
                ticker,
                asset_class,
                sub,
                reason,
                actor,
            } => {
                let fund = self
                    .engine
                    .edit(session_id, &ticker, asset_class, sub, &reason, &actor)?;
                Ok(ChatReply {
                    message: format!(
                        "Updated {ticker} to {} ({} override{} on record).",
                        fund.asset_class,
                        fund.overrides.len(),
                        if fund.overrides.len() == 1 { "" } else { "s" }
                    ),
                    tone: MessageTone::Success,
                })
            }
            ChatCommand::ApproveCategorization { ticker } => {
                self.engine.approve(session_id, &ticker)?;
                Ok(ChatReply {
                    message: format!("{ticker} approved."),
                    tone: MessageTone::Success,
                })
            }
            ChatCommand::BulkApprove { tickers } => {
                let report = self.engine.bulk_approve(session_id, tickers.as_deref())?;
                if report.skipped.is_empty() {
                    Ok(ChatReply {
                        message: format!("Approved {} funds.", report.approved.len()),
                        tone: MessageTone::Success,
                    })
                } else {
                    let skipped: Vec<&str> =
                        report.skipped.iter().map(|s| s.ticker.as_str()).collect();
                    Ok(ChatReply {
                        message: format!(
                            "Approved {} funds; {} still need a decision: {}",
                            report.approved.len(),
                            report.skipped.len(),
                            skipped.join(", ")
                        ),
                        tone: MessageTone::Warning,
                    })
                }
            }
        }
    }
}

/// Canned conversational reply keyed on the workflow stage.
fn stage_reply(stage: Stage, text: &str) -> ChatReply {
    let lower = text.to_lowercase();
    if lower.contains("help") {
        return ChatReply {
            message: "You can upload portfolio files (CSV, Excel) or fund documents (PDF), \
                      then I'll extract and categorize your holdings. Ask for 'status' any time."
                .to_string(),
            tone: MessageTone::Info,
        };
    }
    let message = match stage {
        Stage::Greeting => {
            "Hello! I'm your fund onboarding assistant. Upload a portfolio file or a fund \
             document to get started."
        }
        Stage::FileUpload => {
            "I'm ready for your files — CSV or Excel for portfolio holdings, PDF for fund \
             documents."
        }
        Stage::Processing | Stage::Research | Stage::Extraction | Stage::Analysis => {
            "I'm still working through your files. Progress is streaming live; I'll let you \
             know as soon as the analysis settles."
        }
        Stage::Categorization | Stage::CategorizationReview => {
            "We're reviewing fund categories. Answer any open questions, make edits where I \
             got it wrong, and approve funds when they look right."
        }
        Stage::Recommendations => {
            "Your funds are categorized and approved. I'm preparing recommendations."
        }
        Stage::Complete => "This onboarding is complete. Start a new session to process more files.",
    };
    ChatReply {
        message: message.to_string(),
        tone: MessageTone::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::engine::{Classification, ClassifierCollaborator, FundCandidate};
    use crate::categorize::RuleClassifier;
    use async_trait::async_trait;

    #[test]
    fn plain_text_parses_as_conversation() {
        assert!(matches!(
            parse_message("what's taking so long?").unwrap(),
            ParsedMessage::Text(_)
        ));
    }

    #[test]
    fn unknown_prefix_is_conversation_not_error() {
        assert!(matches!(
            parse_message("NOTE: remember to check BND").unwrap(),
            ParsedMessage::Text(_)
        ));
    }

    #[test]
    fn category_response_parses() {
        let id = Uuid::new_v4();
        let text = format!(
            r#"CATEGORY_RESPONSE:{{"question_id":"{id}","ticker":"VTI","selected_value":"Equity"}}"#
        );
        let ParsedMessage::Command(ChatCommand::CategoryResponse(r)) =
            parse_message(&text).unwrap()
        else {
            panic!("expected command");
        };
        assert_eq!(r.question_id, id);
        assert_eq!(r.final_value(), "Equity");
    }

    #[test]
    fn edit_parses_with_default_actor() {
        let text = r#"CATEGORIZATION_EDIT:{"ticker":"BND","asset_class":"Fixed Income","reason":"bond fund"}"#;
        let ParsedMessage::Command(ChatCommand::CategorizationEdit { asset_class, actor, .. }) =
            parse_message(text).unwrap()
        else {
            panic!("expected command");
        };
        assert_eq!(asset_class, AssetClass::FixedIncome);
        assert_eq!(actor, "user");
    }

    #[test]
    fn bulk_approve_parses_with_and_without_tickers() {
        let all = parse_message("BULK_APPROVE:{}").unwrap();
        assert!(matches!(
            all,
            ParsedMessage::Command(ChatCommand::BulkApprove { tickers: None })
        ));
        let some = parse_message(r#"BULK_APPROVE:{"tickers":["VTI","BND"]}"#).unwrap();
        let ParsedMessage::Command(ChatCommand::BulkApprove { tickers: Some(t) }) = some else {
            panic!("expected ticker list");
        };
        assert_eq!(t, vec!["VTI", "BND"]);
    }

    #[test]
    fn malformed_command_body_is_rejected() {
        assert!(matches!(
            parse_message("APPROVE_CATEGORIZATION:{not json}"),
            Err(OnboardingError::Validation(_))
        ));
    }

    // ── Channel behavior ────────────────────────────────

    struct LowConfidence;

    #[async_trait]
    impl ClassifierCollaborator for LowConfidence {
        async fn classify(
            &self,
            _c: &FundCandidate,
        ) -> Result<Classification, OnboardingError> {
            Ok(Classification {
                asset_class: AssetClass::Equity,
                sub: SubClassification::default(),
                confidence: 0.5,
                reasoning: "scripted".to_string(),
                alternatives: Vec::new(),
            })
        }
    }

    fn channel(
        classifier: Arc<dyn ClassifierCollaborator>,
    ) -> (ChatChannel, Arc<SessionStore>, Arc<CategorizationEngine>, Arc<EventBroadcaster>) {
        let sessions = Arc::new(SessionStore::new());
        let broadcaster = Arc::new(EventBroadcaster::new());
        let engine = Arc::new(CategorizationEngine::new(
            classifier,
            Arc::clone(&broadcaster),
        ));
        let chat = ChatChannel::new(
            Arc::clone(&sessions),
            Arc::clone(&engine),
            Arc::clone(&broadcaster),
        );
        (chat, sessions, engine, broadcaster)
    }

    #[tokio::test]
    async fn conversation_is_logged_and_published() {
        let (chat, sessions, _engine, broadcaster) = channel(Arc::new(RuleClassifier));
        let session = sessions.create().unwrap();
        let mut rx = broadcaster.subscribe(session.id);

        let reply = chat.handle(session.id, "hello there").unwrap();
        assert_eq!(reply.tone, MessageTone::Info);

        let log = sessions.get(session.id).unwrap().chat_history;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, "user");
        assert_eq!(log[1].role, "assistant");

        let envelope = rx.try_recv().unwrap();
        assert!(matches!(envelope.event, Event::ChatResponse { .. }));
    }

    #[tokio::test]
    async fn embedded_answer_command_reaches_the_engine() {
        let (chat, sessions, engine, _b) = channel(Arc::new(LowConfidence));
        let session = sessions.create().unwrap();
        engine
            .classify_all(
                session.id,
                vec![FundCandidate {
                    ticker: "XYZ".to_string(),
                    name: "Mystery Fund".to_string(),
                    provided_asset_class: None,
                    morningstar_category: None,
                }],
            )
            .await
            .unwrap();
        let question = engine.open_questions(session.id).unwrap().remove(0);

        let text = format!(
            r#"CATEGORY_RESPONSE:{{"question_id":"{}","ticker":"XYZ","selected_value":"Cash"}}"#,
            question.id
        );
        let reply = chat.handle(session.id, &text).unwrap();
        assert_eq!(reply.tone, MessageTone::Info);

        let funds = engine.funds(session.id).unwrap();
        assert_eq!(funds[0].asset_class, AssetClass::Cash);
        assert!(!funds[0].approved);
    }

    #[tokio::test]
    async fn failed_command_replies_with_error_tone() {
        let (chat, sessions, _engine, _b) = channel(Arc::new(RuleClassifier));
        let session = sessions.create().unwrap();
        // No review exists yet, so approving must fail — but the channel
        // still answers instead of dropping the message.
        let reply = chat
            .handle(session.id, r#"APPROVE_CATEGORIZATION:{"ticker":"VTI"}"#)
            .unwrap();
        assert_eq!(reply.tone, MessageTone::Error);

        let log = sessions.get(session.id).unwrap().chat_history;
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn bulk_approve_reply_reports_skips() {
        let (chat, sessions, engine, _b) = channel(Arc::new(LowConfidence));
        let session = sessions.create().unwrap();
        engine
            .classify_all(
                session.id,
                vec![FundCandidate {
                    ticker: "XYZ".to_string(),
                    name: "Mystery Fund".to_string(),
                    provided_asset_class: None,
                    morningstar_category: None,
                }],
            )
            .await
            .unwrap();

        let reply = chat.handle(session.id, "BULK_APPROVE:{}").unwrap();
        assert_eq!(reply.tone, MessageTone::Warning);
        assert!(reply.message.contains("XYZ"));
    }

    #[test]
    fn stage_replies_differ_by_stage() {
        let greeting = stage_reply(Stage::Greeting, "hi");
        let review = stage_reply(Stage::CategorizationReview, "hi");
        assert_ne!(greeting.message, review.message);
        assert!(stage_reply(Stage::Processing, "help")
            .message
            .contains("upload"));
    }
}
