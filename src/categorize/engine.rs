//! Categorization Workflow Engine.
//!
//! Owns the review state per session: classifications, open questions,
//! responses, and the approval workflow. Confidence bands drive the
//! workflow — at or above 0.8 a fund is eligible for approval untouched,
//! between 0.6 and 0.8 it is flagged but not blocking, and below 0.6 a
//! user decision is required before it can be approved.
//!
//! The engine never approves on its own: answering a question resolves
//! the block but the user (or a bulk approve) still has to approve.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::events::{Event, EventBroadcaster};
use crate::models::{FundExtraction, PortfolioItem};

use super::questions::question_for;
use super::types::{
    AlternativeClassification, AssetClass, CategoryQuestion, CategoryResponse, EquityRegion,
    EquitySize, EquityStyle, FixedIncomeDuration, FixedIncomeType, FundCategorization,
    QuestionType, ReviewState, SubClassification,
};

// ═══════════════════════════════════════════
// Classifier collaborator
// ═══════════════════════════════════════════

/// Classifier input, flattened from whichever extraction source produced
/// the fund.
#[derive(Debug, Clone)]
pub struct FundCandidate {
    pub ticker: String,
    pub name: String,
    pub provided_asset_class: Option<String>,
    pub morningstar_category: Option<String>,
}

impl FundCandidate {
    pub fn from_portfolio_item(item: &PortfolioItem) -> Self {
        Self {
            ticker: item.ticker.clone(),
            name: item.name.clone(),
            provided_asset_class: Some(item.asset_class.clone()).filter(|s| !s.trim().is_empty()),
            morningstar_category: item.morningstar_category.clone(),
        }
    }

    pub fn from_extraction(extraction: &FundExtraction) -> Self {
        let field_str = |key: &str| {
            extraction
                .fields
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            ticker: extraction.ticker.clone(),
            name: extraction.fund_name.clone(),
            provided_asset_class: field_str("asset_class"),
            morningstar_category: field_str("morningstar_category"),
        }
    }
}

/// Raw classifier output before review state is attached.
#[derive(Debug, Clone)]
pub struct Classification {
    pub asset_class: AssetClass,
    pub sub: SubClassification,
    pub confidence: f32,
    pub reasoning: String,
    pub alternatives: Vec<AlternativeClassification>,
}

#[async_trait]
pub trait ClassifierCollaborator: Send + Sync {
    async fn classify(&self, candidate: &FundCandidate) -> Result<Classification, OnboardingError>;
}

// ═══════════════════════════════════════════
// Default rule / known-fund classifier
// ═══════════════════════════════════════════

/// Deterministic classifier: a small table of well-known funds, then
/// ticker-prefix and name-keyword rules, then the Morningstar category,
/// then the asset class the source file provided.
pub struct RuleClassifier;

#[async_trait]
impl ClassifierCollaborator for RuleClassifier {
    async fn classify(&self, candidate: &FundCandidate) -> Result<Classification, OnboardingError> {
        Ok(classify_by_rules(candidate))
    }
}

fn classify_by_rules(candidate: &FundCandidate) -> Classification {
    if let Some(c) = classify_known_fund(&candidate.ticker) {
        return c;
    }
    if let Some(c) = classify_by_ticker_prefix(&candidate.ticker) {
        return c;
    }
    if let Some(c) = classify_by_name(&candidate.name) {
        return enrich_from_morningstar(c, candidate.morningstar_category.as_deref());
    }
    if let Some(c) = classify_by_morningstar(candidate.morningstar_category.as_deref()) {
        return c;
    }
    if let Some(provided) = candidate.provided_asset_class.as_deref() {
        return Classification {
            asset_class: normalize_asset_class(provided),
            sub: SubClassification::default(),
            confidence: 0.7,
            reasoning: format!("Asset class '{provided}' provided by the source file"),
            alternatives: Vec::new(),
        };
    }
    // No signal at all: low-confidence default that forces a question
    Classification {
        asset_class: AssetClass::Equity,
        sub: SubClassification::default(),
        confidence: 0.4,
        reasoning: format!(
            "No classification signal for {}; defaulted to Equity",
            candidate.ticker
        ),
        alternatives: vec![
            AlternativeClassification {
                asset_class: AssetClass::FixedIncome,
                confidence: 0.3,
                reasoning: "Possible bond fund".to_string(),
            },
            AlternativeClassification {
                asset_class: AssetClass::Alternatives,
                confidence: 0.2,
                reasoning: "Possible alternative strategy".to_string(),
            },
        ],
    }
}

fn known_fund(ticker: &str) -> Option<(AssetClass, SubClassification, &'static str)> {
    let equity = |region, style, size| SubClassification {
        equity_region: Some(region),
        equity_style: Some(style),
        equity_size: Some(size),
        ..Default::default()
    };
    let bond = |ty, duration| SubClassification {
        fixed_income_type: Some(ty),
        fixed_income_duration: Some(duration),
        ..Default::default()
    };
    use EquityRegion::*;
    use EquitySize::*;
    use EquityStyle::*;
    Some(match ticker {
        "VTI" => (
            AssetClass::Equity,
            equity(Us, Blend, Large),
            "Vanguard Total Stock Market ETF",
        ),
        "VTV" => (AssetClass::Equity, equity(Us, Value, Large), "Vanguard Value ETF"),
        "VUG" => (AssetClass::Equity, equity(Us, Growth, Large), "Vanguard Growth ETF"),
        "VTSMX" | "VTSAX" => (
            AssetClass::Equity,
            equity(Us, Blend, Large),
            "Vanguard Total Stock Market Index Fund",
        ),
        "IVV" => (
            AssetClass::Equity,
            equity(Us, Blend, Large),
            "iShares Core S&P 500 ETF",
        ),
        "IWM" => (
            AssetClass::Equity,
            equity(Us, Blend, Small),
            "iShares Russell 2000 ETF",
        ),
        "VTIAX" => (
            AssetClass::Equity,
            equity(International, Blend, Large),
            "Vanguard Total International Stock Index Fund",
        ),
        "EEM" => (
            AssetClass::Equity,
            equity(Emerging, Blend, Large),
            "iShares MSCI Emerging Markets ETF",
        ),
        "BND" => (
            AssetClass::FixedIncome,
            bond(FixedIncomeType::Government, FixedIncomeDuration::Intermediate),
            "Vanguard Total Bond Market ETF",
        ),
        "AGG" => (
            AssetClass::FixedIncome,
            bond(FixedIncomeType::Government, FixedIncomeDuration::Intermediate),
            "iShares Core U.S. Aggregate Bond ETF",
        ),
        _ => return None,
    })
}

fn classify_known_fund(ticker: &str) -> Option<Classification> {
    let (asset_class, sub, description) = known_fund(&ticker.to_uppercase())?;
    Some(Classification {
        asset_class,
        sub,
        confidence: 0.95,
        reasoning: format!("Well-known fund: {description}"),
        alternatives: Vec::new(),
    })
}

fn classify_by_ticker_prefix(ticker: &str) -> Option<Classification> {
    let t = ticker.to_uppercase();
    let (style, confidence) = if t.starts_with("VTI")
        || t.starts_with("VTS")
        || t.starts_with("VTM")
        || t.starts_with("VTX")
    {
        (EquityStyle::Blend, 0.9)
    } else if t.starts_with("VTV") {
        (EquityStyle::Value, 0.9)
    } else if t.starts_with("VUG") {
        (EquityStyle::Growth, 0.9)
    } else if ["IVV", "IWM", "IJR", "IJH"].iter().any(|p| t.starts_with(p)) {
        (EquityStyle::Blend, 0.85)
    } else {
        return None;
    };
    Some(Classification {
        asset_class: AssetClass::Equity,
        sub: SubClassification {
            equity_region: Some(EquityRegion::Us),
            equity_style: Some(style),
            ..Default::default()
        },
        confidence,
        reasoning: format!("Ticker family match on {ticker}"),
        alternatives: Vec::new(),
    })
}

fn classify_by_name(name: &str) -> Option<Classification> {
    let n = name.to_lowercase();
    let contains = |keywords: &[&str]| keywords.iter().any(|k| n.contains(k));

    let (asset_class, confidence, label) = if contains(&["money market", "stable value"])
        || n.contains("cash")
    {
        (AssetClass::Cash, 0.85, "cash-equivalent")
    } else if contains(&["bond", "treasury", "fixed income"]) {
        (AssetClass::FixedIncome, 0.8, "bond")
    } else if contains(&["reit", "real estate", "commodity", "gold", "hedge"]) {
        (AssetClass::Alternatives, 0.75, "alternative")
    } else if contains(&["stock", "equity", "index", "growth", "value", "s&p"]) {
        (AssetClass::Equity, 0.75, "equity")
    } else {
        return None;
    };
    Some(Classification {
        asset_class,
        sub: SubClassification::default(),
        confidence,
        reasoning: format!("Fund name indicates a {label} fund"),
        alternatives: Vec::new(),
    })
}

/// Morningstar categories like "Large Blend" or "Intermediate Core Bond"
/// both decide the class and fill facets.
fn classify_by_morningstar(category: Option<&str>) -> Option<Classification> {
    let category = category?;
    let c = category.to_lowercase();

    if c.contains("bond") || c.contains("government") || c.contains("municipal") {
        let ty = if c.contains("government") || c.contains("treasury") {
            Some(FixedIncomeType::Government)
        } else if c.contains("municipal") {
            Some(FixedIncomeType::Municipal)
        } else if c.contains("high yield") {
            Some(FixedIncomeType::HighYield)
        } else if c.contains("corporate") {
            Some(FixedIncomeType::Corporate)
        } else {
            None
        };
        let duration = if c.contains("short") {
            Some(FixedIncomeDuration::Short)
        } else if c.contains("long") {
            Some(FixedIncomeDuration::Long)
        } else if c.contains("intermediate") {
            Some(FixedIncomeDuration::Intermediate)
        } else {
            None
        };
        return Some(Classification {
            asset_class: AssetClass::FixedIncome,
            sub: SubClassification {
                fixed_income_type: ty,
                fixed_income_duration: duration,
                ..Default::default()
            },
            confidence: 0.8,
            reasoning: format!("Morningstar category: {category}"),
            alternatives: Vec::new(),
        });
    }
    if c.contains("money market") {
        return Some(Classification {
            asset_class: AssetClass::Cash,
            sub: SubClassification::default(),
            confidence: 0.85,
            reasoning: format!("Morningstar category: {category}"),
            alternatives: Vec::new(),
        });
    }
    if c.contains("blend") || c.contains("value") || c.contains("growth") || c.contains("stock") {
        let base = Classification {
            asset_class: AssetClass::Equity,
            sub: SubClassification::default(),
            confidence: 0.8,
            reasoning: format!("Morningstar category: {category}"),
            alternatives: Vec::new(),
        };
        return Some(enrich_from_morningstar(base, Some(category)));
    }
    None
}

/// Fill missing equity facets from the Morningstar category words.
fn enrich_from_morningstar(mut c: Classification, category: Option<&str>) -> Classification {
    let Some(category) = category else { return c };
    if c.asset_class != AssetClass::Equity {
        return c;
    }
    let lower = category.to_lowercase();
    if c.sub.equity_size.is_none() {
        c.sub.equity_size = if lower.contains("large") {
            Some(EquitySize::Large)
        } else if lower.contains("mid") {
            Some(EquitySize::Mid)
        } else if lower.contains("small") {
            Some(EquitySize::Small)
        } else {
            None
        };
    }
    if c.sub.equity_style.is_none() {
        c.sub.equity_style = if lower.contains("value") {
            Some(EquityStyle::Value)
        } else if lower.contains("growth") {
            Some(EquityStyle::Growth)
        } else if lower.contains("blend") {
            Some(EquityStyle::Blend)
        } else {
            None
        };
    }
    if c.sub.equity_region.is_none() {
        c.sub.equity_region = if lower.contains("foreign") || lower.contains("international") {
            Some(EquityRegion::International)
        } else if lower.contains("emerging") {
            Some(EquityRegion::Emerging)
        } else if lower.contains("world") || lower.contains("global") {
            Some(EquityRegion::Global)
        } else {
            Some(EquityRegion::Us)
        };
    }
    c
}

fn normalize_asset_class(value: &str) -> AssetClass {
    let v = value.to_lowercase();
    let contains = |keywords: &[&str]| keywords.iter().any(|k| v.contains(k));
    if contains(&["bond", "fixed", "income", "debt"]) {
        AssetClass::FixedIncome
    } else if contains(&["cash", "money market", "stable"]) {
        AssetClass::Cash
    } else if contains(&["alternative", "commodity", "reit", "hedge"]) {
        AssetClass::Alternatives
    } else {
        AssetClass::Equity
    }
}

// ═══════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════

/// Outcome of a bulk approve: what went through and what was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkApproveReport {
    pub approved: Vec<String>,
    pub skipped: Vec<SkippedFund>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFund {
    pub ticker: String,
    pub reason: String,
}

#[derive(Default)]
struct SessionReview {
    funds: Vec<FundCategorization>,
    open_questions: HashMap<Uuid, CategoryQuestion>,
    question_by_ticker: HashMap<String, Uuid>,
    responses: Vec<CategoryResponse>,
    complete_emitted: bool,
}

pub struct CategorizationEngine {
    classifier: Arc<dyn ClassifierCollaborator>,
    broadcaster: Arc<EventBroadcaster>,
    sessions: RwLock<HashMap<Uuid, SessionReview>>,
}

impl CategorizationEngine {
    pub fn new(classifier: Arc<dyn ClassifierCollaborator>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            classifier,
            broadcaster,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Classify every candidate and start the review. Question-required
    /// funds each get one open question, published on the stream.
    pub async fn classify_all(
        &self,
        session_id: Uuid,
        candidates: Vec<FundCandidate>,
    ) -> Result<Vec<FundCategorization>, OnboardingError> {
        let mut review = SessionReview::default();
        for candidate in &candidates {
            let c = self.classifier.classify(candidate).await?;
            let mut fund = FundCategorization {
                ticker: candidate.ticker.clone(),
                fund_name: candidate.name.clone(),
                asset_class: c.asset_class,
                sub: c.sub,
                confidence: c.confidence,
                reasoning: c.reasoning,
                alternatives: c.alternatives,
                overrides: Vec::new(),
                approved: false,
                review_state: ReviewState::Classified,
            };
            if fund.approval_blocked() {
                fund.review_state = ReviewState::UnderReview;
                if let Some(question) = question_for(&fund) {
                    self.broadcaster.publish(
                        session_id,
                        Event::CategorizationQuestion {
                            question: question.clone(),
                        },
                    );
                    review
                        .question_by_ticker
                        .insert(fund.ticker.clone(), question.id);
                    review.open_questions.insert(question.id, question);
                }
            }
            review.funds.push(fund);
        }

        tracing::info!(
            %session_id,
            funds = review.funds.len(),
            questions = review.open_questions.len(),
            "Categorization review started"
        );
        let funds = review.funds.clone();
        self.write()?.insert(session_id, review);
        Ok(funds)
    }

    pub fn funds(&self, session_id: Uuid) -> Result<Vec<FundCategorization>, OnboardingError> {
        let sessions = self.read()?;
        let review = session_review(&sessions, session_id)?;
        Ok(review.funds.clone())
    }

    pub fn open_questions(&self, session_id: Uuid) -> Result<Vec<CategoryQuestion>, OnboardingError> {
        let sessions = self.read()?;
        let review = session_review(&sessions, session_id)?;
        let mut questions: Vec<_> = review.open_questions.values().cloned().collect();
        questions.sort_by_key(|q| q.created_at);
        Ok(questions)
    }

    /// Apply a user's answer. Resolves the question and moves the fund to
    /// `Reclassified`; the fund is NOT approved — that stays a separate,
    /// explicit step. A follow-up facet question may be opened.
    pub fn answer(
        &self,
        session_id: Uuid,
        response: CategoryResponse,
    ) -> Result<FundCategorization, OnboardingError> {
        let mut sessions = self.write()?;
        let review = session_review_mut(&mut sessions, session_id)?;

        let question = review
            .open_questions
            .get(&response.question_id)
            .cloned()
            .ok_or_else(|| {
                OnboardingError::Validation(format!(
                    "no open question with id {}",
                    response.question_id
                ))
            })?;
        if question.ticker != response.ticker {
            return Err(OnboardingError::Validation(format!(
                "question {} is about {}, not {}",
                question.id, question.ticker, response.ticker
            )));
        }
        let fund = fund_mut(&mut review.funds, &response.ticker)?;
        if fund.approved {
            return Err(OnboardingError::Validation(format!(
                "{} is already approved",
                response.ticker
            )));
        }

        apply_answer(fund, &question, response.final_value())?;
        fund.review_state = ReviewState::Reclassified;

        review.open_questions.remove(&question.id);
        review.question_by_ticker.remove(&response.ticker);
        let ticker = response.ticker.clone();
        review.responses.push(response);

        // Offer the next missing facet without blocking approval
        let fund = fund_mut(&mut review.funds, &ticker)?;
        let updated = fund.clone();
        if let Some(next) = question_for(fund) {
            self.broadcaster.publish(
                session_id,
                Event::CategorizationQuestion {
                    question: next.clone(),
                },
            );
            review.question_by_ticker.insert(ticker, next.id);
            review.open_questions.insert(next.id, next);
        }
        Ok(updated)
    }

    /// Manual override of a fund's classification. Requires a reason and
    /// appends exactly one history record; the fund drops back to
    /// unapproved `Reclassified`.
    pub fn edit(
        &self,
        session_id: Uuid,
        ticker: &str,
        new_class: AssetClass,
        new_sub: Option<SubClassification>,
        reason: &str,
        actor: &str,
    ) -> Result<FundCategorization, OnboardingError> {
        if reason.trim().is_empty() {
            return Err(OnboardingError::Validation(
                "an override requires a non-empty reason".to_string(),
            ));
        }
        let mut sessions = self.write()?;
        let review = session_review_mut(&mut sessions, session_id)?;
        let fund = fund_mut(&mut review.funds, ticker)?;

        fund.overrides.push(OverrideRecordArgs {
            previous: fund.asset_class,
            new: new_class,
            reason,
            actor,
        }
        .into_record());
        fund.asset_class = new_class;
        match new_sub {
            Some(sub) => fund.sub = sub,
            None => retain_relevant_facets(&mut fund.sub, new_class),
        }
        fund.approved = false;
        fund.review_state = ReviewState::Reclassified;
        let updated = fund.clone();

        // A direct edit supersedes any pending question for the fund
        if let Some(question_id) = review.question_by_ticker.remove(ticker) {
            review.open_questions.remove(&question_id);
        }
        tracing::info!(%session_id, ticker, class = %updated.asset_class, "Categorization overridden");
        Ok(updated)
    }

    /// Approve one fund. Fails while the fund still needs a decision.
    pub fn approve(
        &self,
        session_id: Uuid,
        ticker: &str,
    ) -> Result<FundCategorization, OnboardingError> {
        let mut sessions = self.write()?;
        let review = session_review_mut(&mut sessions, session_id)?;
        let fund = fund_mut(&mut review.funds, ticker)?;
        if fund.approval_blocked() {
            return Err(OnboardingError::Validation(format!(
                "{ticker} needs a category decision before approval"
            )));
        }
        fund.approved = true;
        fund.review_state = ReviewState::Approved;
        let updated = fund.clone();
        if let Some(question_id) = review.question_by_ticker.remove(ticker) {
            review.open_questions.remove(&question_id);
        }
        self.maybe_complete(session_id, review);
        Ok(updated)
    }

    /// Approve every fund (or the named subset). Blocked funds are
    /// skipped and reported, never silently approved.
    pub fn bulk_approve(
        &self,
        session_id: Uuid,
        tickers: Option<&[String]>,
    ) -> Result<BulkApproveReport, OnboardingError> {
        let mut sessions = self.write()?;
        let review = session_review_mut(&mut sessions, session_id)?;

        let targets: Vec<String> = match tickers {
            Some(list) => list.to_vec(),
            None => review.funds.iter().map(|f| f.ticker.clone()).collect(),
        };

        let mut report = BulkApproveReport {
            approved: Vec::new(),
            skipped: Vec::new(),
        };
        for ticker in targets {
            let Ok(fund) = fund_mut(&mut review.funds, &ticker) else {
                report.skipped.push(SkippedFund {
                    ticker,
                    reason: "unknown fund".to_string(),
                });
                continue;
            };
            if fund.approval_blocked() {
                report.skipped.push(SkippedFund {
                    ticker,
                    reason: "needs a category decision".to_string(),
                });
                continue;
            }
            fund.approved = true;
            fund.review_state = ReviewState::Approved;
            if let Some(question_id) = review.question_by_ticker.remove(&ticker) {
                review.open_questions.remove(&question_id);
            }
            report.approved.push(ticker);
        }

        self.maybe_complete(session_id, review);
        tracing::info!(
            %session_id,
            approved = report.approved.len(),
            skipped = report.skipped.len(),
            "Bulk approve settled"
        );
        Ok(report)
    }

    pub fn remove_session(&self, session_id: Uuid) -> Result<(), OnboardingError> {
        self.write()?.remove(&session_id);
        Ok(())
    }

    /// Emit `categorization_complete` exactly once, when every fund in
    /// the review is approved.
    fn maybe_complete(&self, session_id: Uuid, review: &mut SessionReview) {
        if review.complete_emitted || review.funds.is_empty() {
            return;
        }
        if review.funds.iter().all(|f| f.approved) {
            review.complete_emitted = true;
            self.broadcaster.publish(
                session_id,
                Event::CategorizationComplete {
                    funds: review.funds.clone(),
                },
            );
        }
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, SessionReview>>, OnboardingError>
    {
        self.sessions.read().map_err(|_| OnboardingError::LockPoisoned)
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, SessionReview>>, OnboardingError>
    {
        self.sessions.write().map_err(|_| OnboardingError::LockPoisoned)
    }
}

struct OverrideRecordArgs<'a> {
    previous: AssetClass,
    new: AssetClass,
    reason: &'a str,
    actor: &'a str,
}

impl OverrideRecordArgs<'_> {
    fn into_record(self) -> super::types::OverrideRecord {
        super::types::OverrideRecord {
            previous: self.previous.as_str().to_string(),
            new: self.new.as_str().to_string(),
            reason: self.reason.to_string(),
            actor: self.actor.to_string(),
            at: Utc::now(),
        }
    }
}

fn session_review<'a>(
    sessions: &'a HashMap<Uuid, SessionReview>,
    session_id: Uuid,
) -> Result<&'a SessionReview, OnboardingError> {
    sessions
        .get(&session_id)
        .ok_or_else(|| OnboardingError::SessionNotFound(session_id.to_string()))
}

fn session_review_mut<'a>(
    sessions: &'a mut HashMap<Uuid, SessionReview>,
    session_id: Uuid,
) -> Result<&'a mut SessionReview, OnboardingError> {
    sessions
        .get_mut(&session_id)
        .ok_or_else(|| OnboardingError::SessionNotFound(session_id.to_string()))
}

fn fund_mut<'a>(
    funds: &'a mut [FundCategorization],
    ticker: &str,
) -> Result<&'a mut FundCategorization, OnboardingError> {
    funds
        .iter_mut()
        .find(|f| f.ticker == ticker)
        .ok_or_else(|| OnboardingError::Validation(format!("unknown fund {ticker}")))
}

/// Write the answered value into the facet the question asked about.
fn apply_answer(
    fund: &mut FundCategorization,
    question: &CategoryQuestion,
    value: &str,
) -> Result<(), OnboardingError> {
    let unknown = || OnboardingError::Validation(format!("'{value}' is not a valid option"));
    match question.question_type {
        QuestionType::AssetClass => match AssetClass::from_str(value) {
            Some(class) => {
                if class != fund.asset_class {
                    retain_relevant_facets(&mut fund.sub, class);
                }
                fund.asset_class = class;
            }
            None if question.allow_custom => {
                fund.sub.note = Some(value.to_string());
            }
            None => return Err(unknown()),
        },
        QuestionType::EquityRegion => {
            fund.sub.equity_region = Some(EquityRegion::from_str(value).ok_or_else(unknown)?)
        }
        QuestionType::EquityStyle => {
            fund.sub.equity_style = Some(EquityStyle::from_str(value).ok_or_else(unknown)?)
        }
        QuestionType::EquitySize => {
            fund.sub.equity_size = Some(EquitySize::from_str(value).ok_or_else(unknown)?)
        }
        QuestionType::FixedIncomeType => {
            fund.sub.fixed_income_type =
                Some(FixedIncomeType::from_str(value).ok_or_else(unknown)?)
        }
        QuestionType::FixedIncomeDuration => {
            fund.sub.fixed_income_duration =
                Some(FixedIncomeDuration::from_str(value).ok_or_else(unknown)?)
        }
    }
    Ok(())
}

/// Clear facets that do not apply to the new asset class.
fn retain_relevant_facets(sub: &mut SubClassification, class: AssetClass) {
    if class != AssetClass::Equity {
        sub.equity_region = None;
        sub.equity_style = None;
        sub.equity_size = None;
    }
    if class != AssetClass::FixedIncome {
        sub.fixed_income_type = None;
        sub.fixed_income_duration = None;
    }
    if class != AssetClass::Alternatives {
        sub.note = None;
    }
}
