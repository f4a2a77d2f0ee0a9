//! Site-conditions evaluation: which library conditions apply to a location
//! on a date, with their multipliers and alerts.
//!
//! The classifier table is synchronous and pure. The engine owns the I/O:
//! one bulk world-data call per evaluation and one atomic replacement of the
//! evaluated rows for `(location, date)`.

pub mod classifiers;
mod engine;
mod repository;

pub use classifiers::{Classifier, ClassifierError, ConditionResult};
pub use engine::{
    DeclinedCondition, EvaluatedCondition, EvaluationOutcome, SiteConditionError,
    SiteConditionsEngine,
};
pub use repository::{
    EvaluatedRow, InMemorySiteConditionRepository, ReplaceSummary, SiteConditionRepository,
};
