use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::{BrowserError, BrowserPool, PageSession};
use crate::config::ExtractorConfig;

use super::detector::CodeDetector;
use super::diagnostics::{self, DiagnosticSink};
use super::orchestrator::InteractionOrchestrator;
use super::pattern::PatternMatcher;
use super::strategy::{StepContext, StrategySet};

const DEFAULT_CUSTOMER_EMAIL: &str = "teste@gmail.com";

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub target_url: String,
    pub customer_email: String,
}

impl ExtractionRequest {
    pub fn new(target_url: impl Into<String>, customer_email: Option<String>) -> Self {
        Self {
            target_url: target_url.into(),
            customer_email: customer_email
                .filter(|email| !email.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CUSTOMER_EMAIL.to_string()),
        }
    }
}

/// Caller-visible failure classes. Step-level trouble never reaches
/// here; only attempt-terminating conditions do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    EngineUnavailable,
    AllAttemptsExhausted,
    Internal,
}

/// Terminal outcome of one `extract` call. Never a raised fault: the
/// caller always gets this struct.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub token: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl ExtractionResult {
    fn found(token: String, attempts: u32, elapsed: Duration) -> Self {
        Self {
            success: true,
            token: Some(token),
            error_kind: None,
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    fn failed(kind: FailureKind, attempts: u32, elapsed: Duration) -> Self {
        Self {
            success: false,
            token: None,
            error_kind: Some(kind),
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Why one attempt ended without a token.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("no code detected after bounded polling")]
    DetectionExhausted,
    #[error(transparent)]
    Engine(#[from] BrowserError),
}

impl AttemptError {
    fn is_crash(&self) -> bool {
        matches!(self, AttemptError::Engine(err) if err.is_crash())
    }

    fn is_launch_failure(&self) -> bool {
        matches!(self, AttemptError::Engine(err) if err.is_launch_failure())
    }
}

/// Supervises full extractions: admission control, bounded retries,
/// crash-triggered browser recreation, guaranteed session teardown.
pub struct Extractor {
    pool: Arc<BrowserPool>,
    config: ExtractorConfig,
    orchestrator: InteractionOrchestrator,
    detector: CodeDetector,
    matcher: PatternMatcher,
    sink: Arc<dyn DiagnosticSink>,
    gate: Arc<Semaphore>,
    capacity: usize,
}

impl Extractor {
    pub fn new(
        pool: Arc<BrowserPool>,
        config: ExtractorConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let strategies = Arc::new(StrategySet::checkout_defaults(&config.interaction));
        Self::with_strategies(pool, config, strategies, sink)
    }

    /// Wires an alternative strategy set, e.g. for a different checkout
    /// target. The supervision logic is unchanged.
    pub fn with_strategies(
        pool: Arc<BrowserPool>,
        config: ExtractorConfig,
        strategies: Arc<StrategySet>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let capacity = config.limits.max_concurrent_extractions.max(1);
        let orchestrator = InteractionOrchestrator::new(strategies, &config.interaction);
        let detector = CodeDetector::new(&config.detection, &config.interaction.copy_label_pattern);
        let matcher = PatternMatcher::new(&config.detection);
        Self {
            pool,
            config,
            orchestrator,
            detector,
            matcher,
            sink,
            gate: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Extractions currently holding an admission slot. Exposed so the
    /// service wrapper can report occupancy.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.gate.available_permits()
    }

    /// Runs one full extraction. Infallible by contract: every internal
    /// error collapses into a structured failure result.
    pub async fn extract(&self, request: ExtractionRequest) -> ExtractionResult {
        let started = Instant::now();

        match url::Url::parse(&request.target_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                warn!(url = %request.target_url, "rejecting malformed target url");
                return ExtractionResult::failed(FailureKind::InvalidRequest, 0, started.elapsed());
            }
        }

        // Beyond-capacity callers wait for a slot; nobody is rejected.
        let _permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("admission gate closed unexpectedly");
                return ExtractionResult::failed(FailureKind::Internal, 0, started.elapsed());
            }
        };

        let request_id = Uuid::new_v4();
        let max_attempts = self.config.retry.max_attempts.max(1);
        info!(
            request_id = %request_id,
            url = %request.target_url,
            "starting extraction"
        );

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            info!(request_id = %request_id, attempt, max_attempts, "running attempt");

            match self.run_attempt(&request, request_id, attempt as usize).await {
                Ok(token) => {
                    info!(
                        request_id = %request_id,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "extraction succeeded"
                    );
                    return ExtractionResult::found(token, attempt, started.elapsed());
                }
                Err(err) => {
                    if err.is_launch_failure() {
                        error!(request_id = %request_id, error = %err, "browser engine unavailable");
                        return ExtractionResult::failed(
                            FailureKind::EngineUnavailable,
                            attempt,
                            started.elapsed(),
                        );
                    }
                    warn!(request_id = %request_id, attempt, error = %err, "attempt failed");

                    if err.is_crash() {
                        warn!(request_id = %request_id, "crash signature; recreating browser");
                        if let Err(recreate_err) = self.pool.recreate().await {
                            error!(
                                request_id = %request_id,
                                error = %recreate_err,
                                "browser recreation failed"
                            );
                            return ExtractionResult::failed(
                                FailureKind::EngineUnavailable,
                                attempt,
                                started.elapsed(),
                            );
                        }
                    }

                    if attempt as usize >= max_attempts {
                        error!(
                            request_id = %request_id,
                            attempts = attempt,
                            "all extraction attempts exhausted"
                        );
                        return ExtractionResult::failed(
                            FailureKind::AllAttemptsExhausted,
                            attempt,
                            started.elapsed(),
                        );
                    }
                }
            }
        }
    }

    /// One attempt: fresh session, navigate, interact, detect. The
    /// session is closed on every exit path; the shared browser is not.
    async fn run_attempt(
        &self,
        request: &ExtractionRequest,
        request_id: Uuid,
        attempt: usize,
    ) -> Result<String, AttemptError> {
        let handle = self.pool.acquire().await?;
        let session = handle.open_session().await?;

        let outcome = self.drive_session(session.as_ref(), request).await;

        if matches!(outcome, Err(AttemptError::DetectionExhausted)) {
            let bundle = diagnostics::capture_bundle(session.as_ref()).await;
            self.sink.record(request_id, attempt, bundle).await;
        }

        if let Err(err) = session.close().await {
            warn!(error = %err, "failed to close session");
        }
        outcome
    }

    async fn drive_session(
        &self,
        session: &dyn PageSession,
        request: &ExtractionRequest,
    ) -> Result<String, AttemptError> {
        self.navigate(session, &request.target_url).await?;

        let ctx = StepContext {
            customer_email: request.customer_email.clone(),
            typing_delay: Duration::from_millis(self.config.interaction.typing_delay_ms),
        };
        self.orchestrator
            .run(session, &ctx)
            .await
            .map_err(AttemptError::Engine)?;

        match self
            .detector
            .wait_for_code(session)
            .await
            .map_err(AttemptError::Engine)?
        {
            Some(candidate) => Ok(self.matcher.sanitize(&candidate.raw_text)),
            None => Err(AttemptError::DetectionExhausted),
        }
    }

    /// Bounded page load. A timeout is not fatal: enough of the page may
    /// already be interactive, so the attempt presses on.
    async fn navigate(
        &self,
        session: &dyn PageSession,
        target_url: &str,
    ) -> Result<(), AttemptError> {
        let bound = Duration::from_secs(self.config.navigation.timeout_seconds);
        match timeout(bound, session.navigate(target_url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if err.is_crash() => Err(AttemptError::Engine(err)),
            Ok(Err(err)) => {
                warn!(error = %err, "navigation failed; proceeding with partial page");
                Ok(())
            }
            Err(_) => {
                let err = BrowserError::Timeout(format!(
                    "page load after {}s",
                    self.config.navigation.timeout_seconds
                ));
                warn!(error = %err, "navigation timed out; proceeding with partial page");
                Ok(())
            }
        }
    }
}
