use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    BrowserContextId, GrantPermissionsParams, PermissionType,
};
use chromiumoxide::cdp::browser_protocol::network::{
    SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;

use super::engine::{BrowserEngine, BrowserHandle, PageSession};
use super::error::{BrowserError, BrowserResult};

/// Captures JSON-ish POST response bodies before any page script runs.
/// The detector reads the bucket on every poll iteration.
const NETWORK_HOOK: &str = r#"
(() => {
    const bucket = [];
    Object.defineProperty(window, '__pixgrabResponses', {
        value: bucket,
        writable: false,
        configurable: false,
    });
    const interesting = (method, url, contentType) =>
        method === 'POST' &&
        (String(contentType || '').includes('json') || String(url || '').includes('__PREFIX__'));
    const push = (url, body) => {
        try {
            bucket.push({ url: String(url || ''), body: String(body || '') });
        } catch (_) {}
    };

    const originalFetch = window.fetch;
    window.fetch = async (...args) => {
        const response = await originalFetch(...args);
        try {
            const request = args[0];
            const init = args[1] || {};
            const method = String(init.method || (request && request.method) || 'GET').toUpperCase();
            const url = typeof request === 'string' ? request : request.url;
            if (interesting(method, url, response.headers.get('content-type'))) {
                response.clone().text().then((body) => push(url, body)).catch(() => {});
            }
        } catch (_) {}
        return response;
    };

    const OriginalXHR = window.XMLHttpRequest;
    window.XMLHttpRequest = function () {
        const xhr = new OriginalXHR();
        let url = '';
        let method = 'GET';
        const open = xhr.open;
        xhr.open = function (m, u) {
            method = String(m || 'GET').toUpperCase();
            url = u || '';
            return open.apply(xhr, arguments);
        };
        xhr.addEventListener('loadend', function () {
            try {
                if (interesting(method, url, xhr.getResponseHeader('content-type'))) {
                    push(url, xhr.responseText);
                }
            } catch (_) {}
        });
        return xhr;
    };
})();
"#;

const DRAIN_RESPONSES: &str =
    r#"(() => (window.__pixgrabResponses || []).map((e) => e.body))()"#;

const INPUT_VALUES: &str = r#"
(() => {
    const out = [];
    for (const el of document.querySelectorAll('input, textarea')) {
        const style = window.getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden') continue;
        if (el.value) out.push(String(el.value));
        if (el.innerText) out.push(String(el.innerText));
    }
    return out;
})()
"#;

const VISIBLE_TEXT: &str = r#"(() => (document.body ? document.body.innerText : ''))()"#;

const FRAME_TEXTS: &str = r#"
(() => {
    const out = [];
    for (const frame of document.querySelectorAll('iframe')) {
        try {
            const doc = frame.contentDocument;
            if (doc && doc.body && doc.body.innerText) out.push(String(doc.body.innerText));
        } catch (_) {}
    }
    return out;
})()
"#;

/// Production engine: one headless Chromium shared by all sessions.
pub struct ChromiumEngine {
    config: Arc<ExtractorConfig>,
}

impl ChromiumEngine {
    pub fn new(config: Arc<ExtractorConfig>) -> Self {
        Self { config }
    }

    fn build_chromium_config(&self) -> BrowserResult<ChromiumConfig> {
        let chromium = &self.config.chromium;
        let session = &self.config.session;

        let mut builder = ChromiumConfig::builder().viewport(ChromiumViewport {
            width: session.viewport_width,
            height: session.viewport_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: session.viewport_width >= session.viewport_height,
            has_touch: false,
        });

        if let Some(path) = &chromium.executable_path {
            builder = builder.chrome_executable(path);
        }
        if !chromium.headless {
            builder = builder.with_head();
        }
        if !chromium.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            format!("--user-agent={}", session.user_agent),
            format!("--lang={}", session.locale),
            format!("--accept-lang={}", session.accept_language),
            "--disable-setuid-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-first-run".to_string(),
        ];
        if chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        args.extend(chromium.extra_args.iter().cloned());
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserHandle>> {
        let chromium_config = self.build_chromium_config()?;
        info!(
            headless = self.config.chromium.headless,
            width = self.config.session.viewport_width,
            height = self.config.session.viewport_height,
            "launching chromium"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = Arc::clone(&alive);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
            // Handler stream ending means the CDP connection dropped.
            warn!("chromium event handler ended");
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Chromium opens with one blank tab; keep it as the control page
        // for browser-scoped commands (contexts, permissions).
        let control = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|err| BrowserError::Launch(err.to_string()))?;
            if pages.is_empty() {
                browser
                    .new_page(CreateTargetParams::new("about:blank"))
                    .await
                    .map_err(|err| BrowserError::Launch(err.to_string()))?
            } else {
                pages.remove(0)
            }
        };

        Ok(Arc::new(ChromiumHandle {
            browser: Mutex::new(browser),
            control,
            handler_task,
            alive,
            config: Arc::clone(&self.config),
        }))
    }
}

pub struct ChromiumHandle {
    browser: Mutex<Browser>,
    control: Page,
    handler_task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
    config: Arc<ExtractorConfig>,
}

impl ChromiumHandle {
    async fn configure_page(&self, page: &Page, context_id: &BrowserContextId) -> BrowserResult<()> {
        let session = &self.config.session;

        page.enable_stealth_mode_with_agent(&session.user_agent)
            .await?;

        let ua_params = SetUserAgentOverrideParams::builder()
            .user_agent(session.user_agent.clone())
            .accept_language(session.accept_language.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(ua_params).await?;

        let locale = &session.locale;
        let languages_script = format!(
            "Object.defineProperty(navigator, 'language', {{ get: () => '{locale}' }});\n\
             Object.defineProperty(navigator, 'languages', {{ get: () => ['{locale}', 'en-US'] }});"
        );
        page.evaluate_on_new_document(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(languages_script)
                .build()
                .map_err(BrowserError::Configuration)?,
        )
        .await?;

        let hook = NETWORK_HOOK.replace("__PREFIX__", &self.config.detection.token_prefix);
        page.evaluate_on_new_document(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(hook)
                .build()
                .map_err(BrowserError::Configuration)?,
        )
        .await?;

        // Checkout hosts routinely sit behind sloppy TLS.
        page.execute(SetIgnoreCertificateErrorsParams::new(true))
            .await?;

        if !session.blocked_url_patterns.is_empty() {
            page.execute(SetBlockedUrLsParams::new(session.blocked_url_patterns.clone()))
                .await?;
        }

        // The clipboard channel reads navigator.clipboard from page script.
        let mut grant = GrantPermissionsParams::new(vec![
            PermissionType::ClipboardReadWrite,
            PermissionType::ClipboardSanitizedWrite,
        ]);
        grant.browser_context_id = Some(context_id.clone());
        self.control.execute(grant).await?;

        Ok(())
    }
}

#[async_trait]
impl BrowserHandle for ChromiumHandle {
    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn open_session(&self) -> BrowserResult<Box<dyn PageSession>> {
        let context = self
            .control
            .execute(CreateBrowserContextParams::default())
            .await?
            .result
            .browser_context_id
            .clone();

        let mut target = CreateTargetParams::new("about:blank");
        target.browser_context_id = Some(context.clone());
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page(target).await?
        };
        self.configure_page(&page, &context).await?;

        debug!(context = ?context, "opened browsing session");
        Ok(Box::new(ChromiumSession {
            page,
            control: self.control.clone(),
            context,
            typing_jitter_ms: 25,
        }))
    }

    async fn close(&self) -> BrowserResult<()> {
        {
            let mut browser = self.browser.lock().await;
            if let Err(err) = browser.close().await {
                warn!(error = %err, "failed to close browser gracefully");
            }
        }
        self.alive.store(false, Ordering::Relaxed);
        self.handler_task.abort();
        info!("chromium closed");
        Ok(())
    }
}

pub struct ChromiumSession {
    page: Page,
    control: Page,
    context: BrowserContextId,
    typing_jitter_ms: u64,
}

impl ChromiumSession {
    async fn eval_value(&self, script: &str) -> BrowserResult<Value> {
        self.page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|err| BrowserError::Script(format!("failed to decode evaluation: {err}")))
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        self.eval_value(script).await
    }

    async fn click_first(&self, selectors: &[String]) -> BrowserResult<bool> {
        for selector in selectors {
            if let Ok(element) = self.page.find_element(selector.clone()).await {
                element.click().await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn focus_and_type(
        &self,
        selectors: &[String],
        text: &str,
        key_delay: Duration,
    ) -> BrowserResult<bool> {
        for selector in selectors {
            let element = match self.page.find_element(selector.clone()).await {
                Ok(element) => element,
                Err(_) => continue,
            };
            element.click().await?;
            sleep(Duration::from_millis(300)).await;

            let clear = format!(
                "(() => {{ const el = document.querySelector({sel}); if (el) el.value = ''; }})()",
                sel = serde_json::to_string(selector)
                    .map_err(|err| BrowserError::Script(err.to_string()))?
            );
            self.page.evaluate(clear.as_str()).await?;

            for ch in text.chars() {
                element.type_str(ch.to_string()).await?;
                let jitter = rand::thread_rng().gen_range(0..=self.typing_jitter_ms);
                sleep(key_delay + Duration::from_millis(jitter)).await;
            }
            element.press_key("Tab").await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn is_text_visible(&self, needle: &str) -> BrowserResult<bool> {
        let script = format!(
            "(() => (document.body ? document.body.innerText : '').includes({needle}))()",
            needle = serde_json::to_string(needle)
                .map_err(|err| BrowserError::Script(err.to_string()))?
        );
        let value = self.eval_value(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click_labeled(&self, pattern: &str, index: usize) -> BrowserResult<bool> {
        let script = format!(
            r#"
(() => {{
    const re = new RegExp({pattern}, 'i');
    const candidates = [];
    for (const el of document.querySelectorAll('button, span, div, a')) {{
        const text = (el.innerText || '').trim();
        if (!text || !re.test(text)) continue;
        const style = window.getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden') continue;
        candidates.push(el);
    }}
    if ({index} >= candidates.length) return false;
    candidates[{index}].click();
    return true;
}})()
"#,
            pattern = serde_json::to_string(pattern)
                .map_err(|err| BrowserError::Script(err.to_string()))?,
            index = index,
        );
        let value = self.eval_value(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn read_clipboard(&self) -> BrowserResult<String> {
        let value = self
            .eval_value(
                "(async () => { try { return await navigator.clipboard.readText(); } catch (_) { return ''; } })()",
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn captured_responses(&self) -> BrowserResult<Vec<String>> {
        let value = self.eval_value(DRAIN_RESPONSES).await?;
        serde_json::from_value(value)
            .map_err(|err| BrowserError::Script(format!("failed to decode responses: {err}")))
    }

    async fn input_values(&self) -> BrowserResult<Vec<String>> {
        let value = self.eval_value(INPUT_VALUES).await?;
        serde_json::from_value(value)
            .map_err(|err| BrowserError::Script(format!("failed to decode input values: {err}")))
    }

    async fn visible_text(&self) -> BrowserResult<String> {
        let value = self.eval_value(VISIBLE_TEXT).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn frame_texts(&self) -> BrowserResult<Vec<String>> {
        let value = self.eval_value(FRAME_TEXTS).await?;
        serde_json::from_value(value)
            .map_err(|err| BrowserError::Script(format!("failed to decode frame texts: {err}")))
    }

    async fn page_html(&self) -> BrowserResult<String> {
        self.page.content().await.map_err(BrowserError::from)
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        let params = ScreenshotParams::builder().build();
        self.page.screenshot(params).await.map_err(BrowserError::from)
    }

    async fn close(&self) -> BrowserResult<()> {
        if let Err(err) = self.page.clone().close().await {
            warn!(error = %err, "failed to close session page");
        }
        if let Err(err) = self
            .control
            .execute(DisposeBrowserContextParams::new(self.context.clone()))
            .await
        {
            warn!(error = %err, "failed to dispose browsing context");
        }
        Ok(())
    }
}
