#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pixgrab_core::browser::{
    BrowserEngine, BrowserError, BrowserHandle, BrowserResult, PageSession,
};
use pixgrab_core::extract::{DiagnosticBundle, DiagnosticSink};
use serde_json::Value;
use tokio::time::sleep;
use uuid::Uuid;

pub fn valid_token(filler: char) -> String {
    format!("000201{}", filler.to_string().repeat(60))
}

/// Canned page behavior for one mock session.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    pub navigate_delay_ms: u64,
    pub navigate_crash: bool,
    pub captured_responses: Vec<String>,
    pub input_values: Vec<String>,
    pub clipboard: String,
    pub copy_buttons: usize,
    pub visible_text: String,
    pub frame_texts: Vec<String>,
    pub focus_finds_input: bool,
    pub validation_visible: bool,
}

pub struct MockSession {
    script: SessionScript,
    pub closed: Arc<AtomicBool>,
    pub evaluated: Arc<Mutex<Vec<String>>>,
    pub typed: Arc<Mutex<Vec<String>>>,
    stats: Option<Arc<EngineStats>>,
}

impl MockSession {
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            closed: Arc::new(AtomicBool::new(false)),
            evaluated: Arc::new(Mutex::new(Vec::new())),
            typed: Arc::new(Mutex::new(Vec::new())),
            stats: None,
        }
    }

    fn with_stats(script: SessionScript, stats: Arc<EngineStats>) -> Self {
        let mut session = Self::new(script);
        session.stats = Some(stats);
        session
    }
}

#[async_trait]
impl PageSession for MockSession {
    async fn navigate(&self, _url: &str) -> BrowserResult<()> {
        if self.script.navigate_delay_ms > 0 {
            sleep(Duration::from_millis(self.script.navigate_delay_ms)).await;
        }
        if self.script.navigate_crash {
            return Err(BrowserError::Crash("Target closed".into()));
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        self.evaluated.lock().unwrap().push(script.to_string());
        // Forced fill scripts report success; finder scans find nothing.
        Ok(Value::Bool(script.contains("dispatchEvent")))
    }

    async fn click_first(&self, _selectors: &[String]) -> BrowserResult<bool> {
        Ok(false)
    }

    async fn focus_and_type(
        &self,
        _selectors: &[String],
        text: &str,
        _key_delay: Duration,
    ) -> BrowserResult<bool> {
        if !self.script.focus_finds_input {
            return Ok(false);
        }
        self.typed.lock().unwrap().push(text.to_string());
        Ok(true)
    }

    async fn is_text_visible(&self, _needle: &str) -> BrowserResult<bool> {
        Ok(self.script.validation_visible)
    }

    async fn click_labeled(&self, _pattern: &str, index: usize) -> BrowserResult<bool> {
        Ok(index < self.script.copy_buttons)
    }

    async fn read_clipboard(&self) -> BrowserResult<String> {
        Ok(self.script.clipboard.clone())
    }

    async fn captured_responses(&self) -> BrowserResult<Vec<String>> {
        Ok(self.script.captured_responses.clone())
    }

    async fn input_values(&self) -> BrowserResult<Vec<String>> {
        Ok(self.script.input_values.clone())
    }

    async fn visible_text(&self) -> BrowserResult<String> {
        Ok(self.script.visible_text.clone())
    }

    async fn frame_texts(&self) -> BrowserResult<Vec<String>> {
        Ok(self.script.frame_texts.clone())
    }

    async fn page_html(&self) -> BrowserResult<String> {
        Ok("<html><body>mock</body></html>".to_string())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        Ok(vec![0u8; 4])
    }

    async fn close(&self) -> BrowserResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(stats) = &self.stats {
            stats.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Counters shared by every mock handle and session of one engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub launches: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub open_sessions: AtomicUsize,
    pub max_open_sessions: AtomicUsize,
    pub session_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl EngineStats {
    pub fn all_sessions_closed(&self) -> bool {
        self.session_flags
            .lock()
            .unwrap()
            .iter()
            .all(|flag| flag.load(Ordering::SeqCst))
    }
}

pub struct MockEngine {
    pub stats: Arc<EngineStats>,
    pub launch_error: bool,
    pub launch_delay_ms: u64,
    /// Scripts consumed one per session; falls back to `default_script`.
    pub session_plan: Mutex<VecDeque<SessionScript>>,
    pub default_script: SessionScript,
    pub handles: Mutex<Vec<Arc<MockHandle>>>,
}

impl MockEngine {
    pub fn new(default_script: SessionScript) -> Self {
        Self {
            stats: Arc::new(EngineStats::default()),
            launch_error: false,
            launch_delay_ms: 0,
            session_plan: Mutex::new(VecDeque::new()),
            default_script,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_session_plan(mut self, plan: Vec<SessionScript>) -> Self {
        self.session_plan = Mutex::new(plan.into());
        self
    }

    pub fn failing_launch() -> Self {
        let mut engine = Self::new(SessionScript::default());
        engine.launch_error = true;
        engine
    }
}

/// Shareable engine handed to the pool as `Box<dyn BrowserEngine>`. The
/// orphan rule forbids implementing the foreign `BrowserEngine` trait
/// directly on `Arc<MockEngine>`, so tests wrap the shared engine in this
/// local newtype.
pub struct SharedEngine(pub Arc<MockEngine>);

#[async_trait]
impl BrowserEngine for SharedEngine {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserHandle>> {
        let engine = &self.0;
        if engine.launch_delay_ms > 0 {
            sleep(Duration::from_millis(engine.launch_delay_ms)).await;
        }
        engine.stats.launches.fetch_add(1, Ordering::SeqCst);
        if engine.launch_error {
            return Err(BrowserError::Launch("no chromium binary".into()));
        }
        let handle = Arc::new(MockHandle {
            engine: Arc::clone(engine),
            connected: AtomicBool::new(true),
        });
        engine.handles.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }
}

pub struct MockHandle {
    engine: Arc<MockEngine>,
    pub connected: AtomicBool,
}

#[async_trait]
impl BrowserHandle for MockHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open_session(&self) -> BrowserResult<Box<dyn PageSession>> {
        let stats = &self.engine.stats;
        stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        let now_open = stats.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_open_sessions.fetch_max(now_open, Ordering::SeqCst);

        let script = self
            .engine
            .session_plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.engine.default_script.clone());
        let session = MockSession::with_stats(script, Arc::clone(stats));
        stats
            .session_flags
            .lock()
            .unwrap()
            .push(Arc::clone(&session.closed));
        Ok(Box::new(session))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Collects every bundle the supervisor emits.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<(Uuid, usize)>>,
}

#[async_trait]
impl DiagnosticSink for RecordingSink {
    async fn record(&self, request_id: Uuid, attempt: usize, _bundle: DiagnosticBundle) {
        self.records.lock().unwrap().push((request_id, attempt));
    }
}
