//! Question generation for funds that need a user decision.
//!
//! At most one question per fund: the asset class itself when confidence
//! is in the question band, otherwise the first missing sub-classification
//! facet for the assigned class. Alternatives get a free-form question.

use chrono::Utc;
use uuid::Uuid;

use super::types::{
    AssetClass, CategoryQuestion, FundCategorization, QuestionOption, QuestionType,
};

/// Build the single most pressing question for this fund, or `None` when
/// nothing needs asking.
pub fn question_for(fund: &FundCategorization) -> Option<CategoryQuestion> {
    if fund.approval_blocked() {
        return Some(asset_class_question(fund));
    }
    missing_facet_question(fund)
}

fn asset_class_question(fund: &FundCategorization) -> CategoryQuestion {
    let options = AssetClass::ALL
        .iter()
        .map(|class| QuestionOption {
            value: class.as_str().to_string(),
            label: option_label(*class).to_string(),
            confidence: (*class == fund.asset_class).then_some(fund.confidence),
            recommended: *class == fund.asset_class,
        })
        .collect();
    CategoryQuestion {
        id: Uuid::new_v4(),
        ticker: fund.ticker.clone(),
        question_type: QuestionType::AssetClass,
        question: format!(
            "How should {} ({}) be classified?",
            fund.ticker, fund.fund_name
        ),
        options,
        allow_custom: false,
        created_at: Utc::now(),
    }
}

fn option_label(class: AssetClass) -> &'static str {
    match class {
        AssetClass::Equity => "Equity",
        AssetClass::FixedIncome => "Fixed Income",
        AssetClass::Cash => "Cash & Cash Equivalents",
        AssetClass::Alternatives => "Alternative Investments",
    }
}

/// The first unfilled facet for the fund's asset class, if any.
fn missing_facet_question(fund: &FundCategorization) -> Option<CategoryQuestion> {
    let (question_type, question, options, allow_custom) = match fund.asset_class {
        AssetClass::Equity => {
            if fund.sub.equity_region.is_none() {
                (
                    QuestionType::EquityRegion,
                    format!("What geographic region does {} focus on?", fund.ticker),
                    plain_options(&[
                        ("US", "United States"),
                        ("International", "International Developed"),
                        ("Emerging", "Emerging Markets"),
                        ("Global", "Global/World"),
                    ]),
                    false,
                )
            } else if fund.sub.equity_style.is_none() {
                (
                    QuestionType::EquityStyle,
                    format!("What investment style does {} follow?", fund.ticker),
                    plain_options(&[
                        ("Value", "Value"),
                        ("Growth", "Growth"),
                        ("Blend", "Blend/Core"),
                    ]),
                    false,
                )
            } else if fund.sub.equity_size.is_none() {
                (
                    QuestionType::EquitySize,
                    format!("What market cap focus does {} have?", fund.ticker),
                    plain_options(&[
                        ("Large", "Large Cap"),
                        ("Mid", "Mid Cap"),
                        ("Small", "Small Cap"),
                        ("Micro", "Micro Cap"),
                    ]),
                    false,
                )
            } else {
                return None;
            }
        }
        AssetClass::FixedIncome => {
            if fund.sub.fixed_income_type.is_none() {
                (
                    QuestionType::FixedIncomeType,
                    format!("What type of bonds does {} hold?", fund.ticker),
                    plain_options(&[
                        ("Government", "Government/Treasury"),
                        ("Corporate", "Corporate"),
                        ("Municipal", "Municipal"),
                        ("High Yield", "High Yield/Junk"),
                    ]),
                    false,
                )
            } else if fund.sub.fixed_income_duration.is_none() {
                (
                    QuestionType::FixedIncomeDuration,
                    format!("What duration focus does {} have?", fund.ticker),
                    plain_options(&[
                        ("Short", "Short Duration (< 3 years)"),
                        ("Intermediate", "Intermediate Duration (3-10 years)"),
                        ("Long", "Long Duration (> 10 years)"),
                    ]),
                    false,
                )
            } else {
                return None;
            }
        }
        AssetClass::Cash => return None,
        AssetClass::Alternatives => {
            if fund.sub.note.is_none() {
                // Free-form: alternatives have no fixed facet vocabulary
                (
                    QuestionType::AssetClass,
                    format!(
                        "How would you describe the alternative strategy of {}?",
                        fund.ticker
                    ),
                    Vec::new(),
                    true,
                )
            } else {
                return None;
            }
        }
    };

    Some(CategoryQuestion {
        id: Uuid::new_v4(),
        ticker: fund.ticker.clone(),
        question_type,
        question,
        options,
        allow_custom,
        created_at: Utc::now(),
    })
}

fn plain_options(pairs: &[(&str, &str)]) -> Vec<QuestionOption> {
    pairs
        .iter()
        .map(|(value, label)| QuestionOption {
            value: value.to_string(),
            label: label.to_string(),
            confidence: None,
            recommended: false,
        })
        .collect()
}
