pub mod browser;
pub mod config;
pub mod extract;

pub use browser::{
    BrowserEngine, BrowserError, BrowserHandle, BrowserPool, BrowserResult, ChromiumEngine,
    PageSession,
};
pub use config::{load_extractor_config, ConfigError, ConfigResult, ExtractorConfig};
pub use extract::{
    DiagnosticBundle, DiagnosticSink, ExtractionRequest, ExtractionResult, Extractor, FailureKind,
    NullDiagnosticSink, StrategySet,
};
