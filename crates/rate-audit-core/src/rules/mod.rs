//! Deterministic audit rules.
//!
//! These engines back the rule-based capability providers and serve as the
//! fallback for model-backed ones.

pub mod catalog;
pub mod classifier;
pub mod reasoner;
pub mod summarizer;

pub use catalog::{profile, Comparison, LabelProfile, Unit, DEFAULT_DIM_DIVISOR};
pub use classifier::{normalise_category, ClassificationError, RuleClassifier, CATEGORY_FACT};
pub use reasoner::RuleReasoner;
pub use summarizer::RuleSummarizer;
