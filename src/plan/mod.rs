//! Plan change analysis.
//!
//! This module loads plan artifacts in whichever representation is
//! available and derives change counts through an ordered cascade of
//! extraction strategies:
//! - Canonical structured records
//! - Older pre/post resource lists
//! - The canonical text summary line
//! - Text section headers as a last resort

mod artifact;
mod breakdown;
mod extractor;
mod policy;
mod strategy;
mod types;

pub use artifact::{PlanArtifact, PlanArtifactLoader, PlanSource, strip_ansi};
pub use breakdown::{TypeBreakdown, top_types};
pub use extractor::{ChangeSetExtractor, declares_no_op};
pub use policy::{PolicyFinding, RiskReport, Severity, evaluate as evaluate_risks};
pub use strategy::{
    BREAKDOWN_LIMIT, ExtractionStrategy, StrategyOutcome, StructuredChangeAlternateSchemaExtraction,
    StructuredChangeExtraction, TextHeuristicExtraction, TextSummaryLineExtraction,
    canonical_records, default_strategies, summary_lines,
};
pub use types::{ChangeAction, ChangeSummary, DerivedVia, ExtractionDiagnostic, ResourceChangeRecord};
