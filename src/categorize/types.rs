//! Categorization domain types: classifications, review state, override
//! history, and the question/response pair for low-confidence funds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;

// ═══════════════════════════════════════════
// Classification taxonomy
// ═══════════════════════════════════════════

/// Top-level asset class. Wire values match the user-facing vocabulary
/// rather than snake_case — these appear verbatim in question options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    #[serde(rename = "Fixed Income")]
    FixedIncome,
    Cash,
    Alternatives,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equity => "Equity",
            Self::FixedIncome => "Fixed Income",
            Self::Cash => "Cash",
            Self::Alternatives => "Alternatives",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Equity" => Some(Self::Equity),
            "Fixed Income" => Some(Self::FixedIncome),
            "Cash" => Some(Self::Cash),
            "Alternatives" => Some(Self::Alternatives),
            _ => None,
        }
    }

    pub const ALL: [AssetClass; 4] = [
        Self::Equity,
        Self::FixedIncome,
        Self::Cash,
        Self::Alternatives,
    ];
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! facet_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            pub fn from_str(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

facet_enum!(EquityRegion {
    Us => "US",
    International => "International",
    Emerging => "Emerging",
    Global => "Global",
});

facet_enum!(EquityStyle {
    Value => "Value",
    Growth => "Growth",
    Blend => "Blend",
});

facet_enum!(EquitySize {
    Large => "Large",
    Mid => "Mid",
    Small => "Small",
    Micro => "Micro",
});

facet_enum!(FixedIncomeType {
    Government => "Government",
    Corporate => "Corporate",
    Municipal => "Municipal",
    HighYield => "High Yield",
});

facet_enum!(FixedIncomeDuration {
    Short => "Short",
    Intermediate => "Intermediate",
    Long => "Long",
});

/// Sub-classification facets. Only the facets relevant to the asset class
/// are populated; `note` carries free-form detail for alternatives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubClassification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equity_region: Option<EquityRegion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equity_style: Option<EquityStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equity_size: Option<EquitySize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_income_type: Option<FixedIncomeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_income_duration: Option<FixedIncomeDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A ranked runner-up classification with its own rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeClassification {
    pub asset_class: AssetClass,
    pub confidence: f32,
    pub reasoning: String,
}

// ═══════════════════════════════════════════
// Review state + override history
// ═══════════════════════════════════════════

/// Review lifecycle of one fund's categorization.
///
/// `Unclassified → Classified → {Approved | UnderReview → Reclassified →
/// Approved}`. High-confidence funds go straight from `Classified` to
/// `Approved`; question-required funds sit in `UnderReview` until an
/// answer or an edit moves them to `Reclassified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Unclassified,
    Classified,
    UnderReview,
    Reclassified,
    Approved,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclassified => "unclassified",
            Self::Classified => "classified",
            Self::UnderReview => "under_review",
            Self::Reclassified => "reclassified",
            Self::Approved => "approved",
        }
    }
}

/// One entry in a fund's append-only override history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub previous: String,
    pub new: String,
    pub reason: String,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// Confidence band per the workflow thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    /// ≥ 0.8 — eligible for approval without user input.
    AutoEligible,
    /// [0.6, 0.8) — flagged for attention, does not block approval.
    Flagged,
    /// < 0.6 — a user decision is required before approval.
    QuestionRequired,
}

// ═══════════════════════════════════════════
// FundCategorization
// ═══════════════════════════════════════════

/// The categorization record for one fund, carried through review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundCategorization {
    pub ticker: String,
    pub fund_name: String,
    pub asset_class: AssetClass,
    #[serde(default)]
    pub sub: SubClassification,
    /// Classifier confidence (0.0-1.0).
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<AlternativeClassification>,
    /// Append-only; the engine never rewrites or drops entries.
    #[serde(default)]
    pub overrides: Vec<OverrideRecord>,
    pub approved: bool,
    pub review_state: ReviewState,
}

impl FundCategorization {
    pub fn band(&self) -> ConfidenceBand {
        if self.confidence >= config::AUTO_APPROVE_CONFIDENCE {
            ConfidenceBand::AutoEligible
        } else if self.confidence >= config::QUESTION_REQUIRED_CONFIDENCE {
            ConfidenceBand::Flagged
        } else {
            ConfidenceBand::QuestionRequired
        }
    }

    /// True when approval must wait for a user decision: confidence is in
    /// the question band and no answer or edit has resolved it yet.
    pub fn approval_blocked(&self) -> bool {
        self.band() == ConfidenceBand::QuestionRequired
            && self.review_state != ReviewState::Reclassified
            && !self.approved
    }
}

// ═══════════════════════════════════════════
// Questions + responses
// ═══════════════════════════════════════════

/// Which facet a question asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    AssetClass,
    EquityRegion,
    EquityStyle,
    EquitySize,
    FixedIncomeType,
    FixedIncomeDuration,
}

/// One selectable answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub recommended: bool,
}

/// A pending user decision for one fund. At most one open question per
/// fund at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryQuestion {
    pub id: Uuid,
    pub ticker: String,
    pub question_type: QuestionType,
    pub question: String,
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub allow_custom: bool,
    pub created_at: DateTime<Utc>,
}

/// The user's answer to a [`CategoryQuestion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub question_id: Uuid,
    pub ticker: String,
    pub selected_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_value: Option<String>,
    pub responded_at: DateTime<Utc>,
}

impl CategoryResponse {
    /// The effective answer: the custom value wins when present.
    pub fn final_value(&self) -> &str {
        self.custom_value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.selected_value)
    }
}
