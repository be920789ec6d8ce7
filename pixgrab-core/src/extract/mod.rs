mod detector;
mod diagnostics;
mod extractor;
mod orchestrator;
mod pattern;
mod strategy;

pub use detector::{CandidateToken, Channel, CodeDetector};
pub use diagnostics::{capture_bundle, DiagnosticBundle, DiagnosticSink, NullDiagnosticSink};
pub use extractor::{
    AttemptError, ExtractionRequest, ExtractionResult, Extractor, FailureKind,
};
pub use orchestrator::{InteractionOrchestrator, StepReport};
pub use pattern::PatternMatcher;
pub use strategy::{
    ButtonLabelFinder, FindAndAct, ScriptFillFinder, StepContext, StepOutcome,
    StructuredClickFinder, StrategySet, TextHeuristicFinder, TypedEmailFinder,
};
