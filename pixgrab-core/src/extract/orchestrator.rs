use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{BrowserResult, PageSession};
use crate::config::InteractionSection;

use super::strategy::{FindAndAct, StepContext, StepOutcome, StrategySet};

/// What each UI step resolved to. Purely informational: a skipped step
/// never fails the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub select_method: StepOutcome,
    pub fill_email: StepOutcome,
    pub submit: StepOutcome,
}

/// Runs the three checkout steps with layered fallbacks. Every step is
/// best-effort; only a browser crash aborts the attempt.
pub struct InteractionOrchestrator {
    strategies: Arc<StrategySet>,
    settle_delay: Duration,
}

impl InteractionOrchestrator {
    pub fn new(strategies: Arc<StrategySet>, interaction: &InteractionSection) -> Self {
        Self {
            strategies,
            settle_delay: Duration::from_millis(interaction.settle_delay_ms),
        }
    }

    pub async fn run(
        &self,
        session: &dyn PageSession,
        ctx: &StepContext,
    ) -> BrowserResult<StepReport> {
        let select_method = self
            .run_step("select_method", &self.strategies.select_method, session, ctx)
            .await?;
        // The checkout exposes no readiness signal; give its async UI
        // transitions a fixed pause instead.
        sleep(self.settle_delay).await;

        let fill_email = self
            .run_step("fill_email", &self.strategies.fill_email, session, ctx)
            .await?;
        sleep(self.settle_delay).await;

        let submit = self
            .run_step("submit", &self.strategies.submit, session, ctx)
            .await?;

        Ok(StepReport {
            select_method,
            fill_email,
            submit,
        })
    }

    async fn run_step(
        &self,
        step: &str,
        finders: &[Box<dyn FindAndAct>],
        session: &dyn PageSession,
        ctx: &StepContext,
    ) -> BrowserResult<StepOutcome> {
        for finder in finders {
            match finder.attempt(session, ctx).await {
                Ok(StepOutcome::Completed) => {
                    info!(step, strategy = finder.label(), "step completed");
                    return Ok(StepOutcome::Completed);
                }
                Ok(StepOutcome::Skipped) => {
                    debug!(step, strategy = finder.label(), "strategy found nothing");
                }
                Err(err) if err.is_crash() => return Err(err),
                Err(err) => {
                    warn!(step, strategy = finder.label(), error = %err, "strategy failed");
                }
            }
        }
        info!(step, "no strategy matched; step skipped");
        Ok(StepOutcome::Skipped)
    }
}
