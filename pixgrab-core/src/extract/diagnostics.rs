use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::browser::PageSession;

/// Evidence captured when an attempt exhausts detection: enough to see
/// what the page looked like without keeping the session alive.
#[derive(Debug, Clone)]
pub struct DiagnosticBundle {
    pub html_snapshot: String,
    pub screenshot: Option<Vec<u8>>,
    pub frame_texts: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

/// Where failure evidence goes. The engine only produces bundles; the
/// surrounding service decides paths and storage.
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    async fn record(&self, request_id: Uuid, attempt: usize, bundle: DiagnosticBundle);
}

/// Discards bundles. Default when the caller wires no sink.
pub struct NullDiagnosticSink;

#[async_trait]
impl DiagnosticSink for NullDiagnosticSink {
    async fn record(&self, _request_id: Uuid, _attempt: usize, _bundle: DiagnosticBundle) {}
}

/// Best-effort capture from a session that just failed; a half-dead page
/// still yields whatever pieces it can.
pub async fn capture_bundle(session: &dyn PageSession) -> DiagnosticBundle {
    let html_snapshot = match session.page_html().await {
        Ok(html) => html,
        Err(err) => {
            warn!(error = %err, "failed to capture html snapshot");
            String::new()
        }
    };
    let screenshot = match session.screenshot().await {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(error = %err, "failed to capture screenshot");
            None
        }
    };
    let frame_texts = match session.frame_texts().await {
        Ok(texts) => texts,
        Err(err) => {
            warn!(error = %err, "failed to capture frame texts");
            Vec::new()
        }
    };
    DiagnosticBundle {
        html_snapshot,
        screenshot,
        frame_texts,
        captured_at: Utc::now(),
    }
}
