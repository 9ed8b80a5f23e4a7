//! Categorization Workflow Engine: classification, review, questions,
//! overrides, and approval.

pub mod engine;
pub mod questions;
pub mod types;

pub use engine::{
    BulkApproveReport, CategorizationEngine, Classification, ClassifierCollaborator,
    FundCandidate, RuleClassifier, SkippedFund,
};
pub use types::{
    AssetClass, CategoryQuestion, CategoryResponse, ConfidenceBand, FundCategorization,
    OverrideRecord, ReviewState, SubClassification,
};
