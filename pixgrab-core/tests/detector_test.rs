mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pixgrab_core::browser::{BrowserError, BrowserResult, PageSession};
use pixgrab_core::config::{DetectionSection, InteractionSection};
use pixgrab_core::extract::{
    Channel, CodeDetector, FindAndAct, InteractionOrchestrator, ScriptFillFinder, StepContext,
    StepOutcome, StrategySet, TypedEmailFinder,
};

use common::{valid_token, MockSession, SessionScript};

fn detector() -> CodeDetector {
    CodeDetector::new(&DetectionSection::default(), "Copiar|Copy")
}

fn step_context() -> StepContext {
    StepContext {
        customer_email: "cliente@example.com".to_string(),
        typing_delay: Duration::from_millis(50),
    }
}

#[tokio::test(start_paused = true)]
async fn network_channel_takes_precedence_over_text_scan() {
    let script = SessionScript {
        captured_responses: vec![format!(r#"{{"qr_code":"{}"}}"#, valid_token('n'))],
        visible_text: format!("pague com {}", valid_token('t')),
        ..Default::default()
    };
    let session = MockSession::new(script);
    let candidate = detector()
        .wait_for_code(&session)
        .await
        .unwrap()
        .expect("network candidate expected");
    assert_eq!(candidate.channel, Channel::Network);
    assert!(candidate.raw_text.contains(&"n".repeat(60)));
}

#[tokio::test(start_paused = true)]
async fn input_value_beats_clipboard_and_text() {
    let script = SessionScript {
        input_values: vec![valid_token('i')],
        clipboard: valid_token('c'),
        copy_buttons: 1,
        visible_text: valid_token('t'),
        ..Default::default()
    };
    let session = MockSession::new(script);
    let candidate = detector().wait_for_code(&session).await.unwrap().unwrap();
    assert_eq!(candidate.channel, Channel::InputValue);
}

#[tokio::test(start_paused = true)]
async fn clipboard_read_after_copy_click() {
    let script = SessionScript {
        clipboard: valid_token('c'),
        copy_buttons: 2,
        ..Default::default()
    };
    let session = MockSession::new(script);
    let candidate = detector().wait_for_code(&session).await.unwrap().unwrap();
    assert_eq!(candidate.channel, Channel::Clipboard);
}

#[tokio::test(start_paused = true)]
async fn frame_text_scanned_after_main_frame() {
    let script = SessionScript {
        frame_texts: vec!["nada aqui".to_string(), valid_token('f')],
        ..Default::default()
    };
    let session = MockSession::new(script);
    let candidate = detector().wait_for_code(&session).await.unwrap().unwrap();
    assert_eq!(candidate.channel, Channel::TextScan);
}

#[tokio::test(start_paused = true)]
async fn detection_exhausts_after_bounded_iterations() {
    let detection = DetectionSection {
        poll_iterations: 5,
        ..Default::default()
    };
    let detector = CodeDetector::new(&detection, "Copiar");
    let session = MockSession::new(SessionScript::default());
    assert!(detector.wait_for_code(&session).await.unwrap().is_none());
}

struct OutcomeFinder {
    outcome: StepOutcome,
}

#[async_trait]
impl FindAndAct for OutcomeFinder {
    fn label(&self) -> &str {
        "test:outcome"
    }

    async fn attempt(
        &self,
        _session: &dyn PageSession,
        _ctx: &StepContext,
    ) -> BrowserResult<StepOutcome> {
        Ok(self.outcome)
    }
}

struct ErrorFinder {
    crash: bool,
}

#[async_trait]
impl FindAndAct for ErrorFinder {
    fn label(&self) -> &str {
        "test:error"
    }

    async fn attempt(
        &self,
        _session: &dyn PageSession,
        _ctx: &StepContext,
    ) -> BrowserResult<StepOutcome> {
        if self.crash {
            Err(BrowserError::Crash("Target closed".into()))
        } else {
            Err(BrowserError::Script("selector blew up".into()))
        }
    }
}

fn orchestrator_with(select_method: Vec<Box<dyn FindAndAct>>) -> InteractionOrchestrator {
    let strategies = Arc::new(StrategySet {
        select_method,
        fill_email: Vec::new(),
        submit: Vec::new(),
    });
    InteractionOrchestrator::new(strategies, &InteractionSection::default())
}

#[tokio::test(start_paused = true)]
async fn fallback_strategy_runs_after_primary_failure() {
    let orchestrator = orchestrator_with(vec![
        Box::new(ErrorFinder { crash: false }),
        Box::new(OutcomeFinder {
            outcome: StepOutcome::Completed,
        }),
    ]);
    let session = MockSession::new(SessionScript::default());
    let report = orchestrator.run(&session, &step_context()).await.unwrap();
    assert_eq!(report.select_method, StepOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn all_strategies_missing_degrades_to_skip() {
    let orchestrator = orchestrator_with(vec![
        Box::new(OutcomeFinder {
            outcome: StepOutcome::Skipped,
        }),
        Box::new(ErrorFinder { crash: false }),
    ]);
    let session = MockSession::new(SessionScript::default());
    let report = orchestrator.run(&session, &step_context()).await.unwrap();
    assert_eq!(report.select_method, StepOutcome::Skipped);
    assert_eq!(report.fill_email, StepOutcome::Skipped);
    assert_eq!(report.submit, StepOutcome::Skipped);
}

#[tokio::test(start_paused = true)]
async fn crash_aborts_orchestration() {
    let orchestrator = orchestrator_with(vec![Box::new(ErrorFinder { crash: true })]);
    let session = MockSession::new(SessionScript::default());
    let err = orchestrator
        .run(&session, &step_context())
        .await
        .expect_err("crash must escape");
    assert!(err.is_crash());
}

#[tokio::test(start_paused = true)]
async fn typed_email_forces_assignment_when_validation_persists() {
    let finder = TypedEmailFinder::new(
        "email:typed-entry",
        vec!["input[type='email']".to_string()],
        "Preencha este campo",
    );
    let session = MockSession::new(SessionScript {
        focus_finds_input: true,
        validation_visible: true,
        ..Default::default()
    });
    let outcome = finder.attempt(&session, &step_context()).await.unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
    assert_eq!(
        session.typed.lock().unwrap().as_slice(),
        ["cliente@example.com"]
    );
    let scripts = session.evaluated.lock().unwrap();
    assert!(
        scripts.iter().any(|s| s.contains("dispatchEvent")),
        "forced assignment script should have run"
    );
}

#[tokio::test(start_paused = true)]
async fn missing_email_field_is_optional() {
    let finder = TypedEmailFinder::new(
        "email:typed-entry",
        vec!["input[type='email']".to_string()],
        "Preencha este campo",
    );
    let session = MockSession::new(SessionScript::default());
    let outcome = finder.attempt(&session, &step_context()).await.unwrap();
    assert_eq!(outcome, StepOutcome::Skipped);

    // The forced-script fallback still tries before the step gives up.
    let fallback = ScriptFillFinder::new(
        "email:forced-script",
        vec!["input[type='email']".to_string()],
    );
    let outcome = fallback.attempt(&session, &step_context()).await.unwrap();
    assert_eq!(outcome, StepOutcome::Completed);
}
