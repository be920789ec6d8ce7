use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::browser::{BrowserResult, PageSession};
use crate::config::DetectionSection;

use super::pattern::PatternMatcher;

/// Which observation channel surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Network,
    InputValue,
    Clipboard,
    TextScan,
}

#[derive(Debug, Clone)]
pub struct CandidateToken {
    pub raw_text: String,
    pub channel: Channel,
    pub discovered_at: DateTime<Utc>,
}

impl CandidateToken {
    fn new(raw_text: String, channel: Channel) -> Self {
        Self {
            raw_text,
            channel,
            discovered_at: Utc::now(),
        }
    }
}

/// Polls the session's observation channels in fixed precedence order
/// until a candidate appears or the bounded loop runs dry.
pub struct CodeDetector {
    matcher: PatternMatcher,
    copy_label_pattern: String,
    poll_iterations: usize,
    poll_interval: Duration,
    clipboard_settle: Duration,
}

impl CodeDetector {
    pub fn new(detection: &DetectionSection, copy_label_pattern: &str) -> Self {
        Self {
            matcher: PatternMatcher::new(detection),
            copy_label_pattern: copy_label_pattern.to_string(),
            poll_iterations: detection.poll_iterations,
            poll_interval: Duration::from_millis(detection.poll_interval_ms),
            clipboard_settle: Duration::from_millis(detection.clipboard_settle_ms),
        }
    }

    /// `None` means the bounded loop exhausted without a hit.
    pub async fn wait_for_code(
        &self,
        session: &dyn PageSession,
    ) -> BrowserResult<Option<CandidateToken>> {
        for iteration in 1..=self.poll_iterations {
            if let Some(candidate) = self.probe_once(session).await? {
                info!(
                    channel = ?candidate.channel,
                    iteration,
                    "code candidate detected"
                );
                return Ok(Some(candidate));
            }
            debug!(
                iteration,
                total = self.poll_iterations,
                "no code yet; polling again"
            );
            sleep(self.poll_interval).await;
        }
        Ok(None)
    }

    /// One pass over all channels, short-circuiting on the first hit.
    /// Network first: its matches were captured asynchronously and need
    /// no further page interaction.
    async fn probe_once(
        &self,
        session: &dyn PageSession,
    ) -> BrowserResult<Option<CandidateToken>> {
        if let Some(candidate) = tolerate("network", self.probe_network(session).await)? {
            return Ok(Some(candidate));
        }
        if let Some(candidate) = tolerate("input", self.probe_inputs(session).await)? {
            return Ok(Some(candidate));
        }
        if let Some(candidate) = tolerate("clipboard", self.probe_clipboard(session).await)? {
            return Ok(Some(candidate));
        }
        if let Some(candidate) = tolerate("text", self.probe_text(session).await)? {
            return Ok(Some(candidate));
        }
        Ok(None)
    }

    async fn probe_network(
        &self,
        session: &dyn PageSession,
    ) -> BrowserResult<Option<CandidateToken>> {
        for body in session.captured_responses().await? {
            if !self.matcher.matches_prefix(&body) {
                continue;
            }
            // Stringify parsed JSON so tokens split across fields still line up.
            let dump = serde_json::from_str::<Value>(&body)
                .map(|value| value.to_string())
                .unwrap_or(body);
            if let Some(found) = self.matcher.find(&dump) {
                return Ok(Some(CandidateToken::new(found, Channel::Network)));
            }
        }
        Ok(None)
    }

    async fn probe_inputs(
        &self,
        session: &dyn PageSession,
    ) -> BrowserResult<Option<CandidateToken>> {
        for value in session.input_values().await? {
            if self.matcher.matches_prefix(&value) {
                return Ok(Some(CandidateToken::new(value, Channel::InputValue)));
            }
        }
        Ok(None)
    }

    async fn probe_clipboard(
        &self,
        session: &dyn PageSession,
    ) -> BrowserResult<Option<CandidateToken>> {
        let mut index = 0;
        while session
            .click_labeled(&self.copy_label_pattern, index)
            .await?
        {
            sleep(self.clipboard_settle).await;
            let clipboard = session.read_clipboard().await?;
            if self.matcher.matches_prefix(&clipboard) {
                return Ok(Some(CandidateToken::new(clipboard, Channel::Clipboard)));
            }
            index += 1;
        }
        Ok(None)
    }

    async fn probe_text(
        &self,
        session: &dyn PageSession,
    ) -> BrowserResult<Option<CandidateToken>> {
        let body = session.visible_text().await?;
        if let Some(found) = self.matcher.find(&body) {
            return Ok(Some(CandidateToken::new(found, Channel::TextScan)));
        }
        for frame_text in session.frame_texts().await? {
            if let Some(found) = self.matcher.find(&frame_text) {
                return Ok(Some(CandidateToken::new(found, Channel::TextScan)));
            }
        }
        Ok(None)
    }
}

/// A flaky channel probe must not end the whole poll loop; only a crash
/// does.
fn tolerate(
    channel: &str,
    outcome: BrowserResult<Option<CandidateToken>>,
) -> BrowserResult<Option<CandidateToken>> {
    match outcome {
        Ok(candidate) => Ok(candidate),
        Err(err) if err.is_crash() => Err(err),
        Err(err) => {
            debug!(channel, error = %err, "channel probe failed");
            Ok(None)
        }
    }
}
