use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::browser::{BrowserError, BrowserResult, PageSession};
use crate::config::InteractionSection;

/// How one interaction step ended. Strategies never abort the attempt:
/// a miss degrades to `Skipped` and the next strategy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Skipped,
}

/// Per-request data the strategies act with.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub customer_email: String,
    pub typing_delay: Duration,
}

/// One "find an element and act on it" heuristic. The orchestrator walks
/// an ordered list of these with first-success semantics.
#[async_trait]
pub trait FindAndAct: Send + Sync {
    fn label(&self) -> &str;

    async fn attempt(
        &self,
        session: &dyn PageSession,
        ctx: &StepContext,
    ) -> BrowserResult<StepOutcome>;
}

fn json_literal<T: serde::Serialize>(value: &T) -> BrowserResult<String> {
    serde_json::to_string(value).map_err(|err| BrowserError::Script(err.to_string()))
}

fn outcome_from(clicked: bool) -> StepOutcome {
    if clicked {
        StepOutcome::Completed
    } else {
        StepOutcome::Skipped
    }
}

/// Scans short text nodes of a bounded tag set and fires a synthetic
/// click on the first label match. Bypasses the visibility and overlap
/// checks that defeat structured queries on these checkouts.
pub struct TextHeuristicFinder {
    label: String,
    tags: String,
    needle: String,
    max_text_len: usize,
}

impl TextHeuristicFinder {
    pub fn new(label: impl Into<String>, tags: &str, needle: &str, max_text_len: usize) -> Self {
        Self {
            label: label.into(),
            tags: tags.to_string(),
            needle: needle.to_string(),
            max_text_len,
        }
    }
}

#[async_trait]
impl FindAndAct for TextHeuristicFinder {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(
        &self,
        session: &dyn PageSession,
        _ctx: &StepContext,
    ) -> BrowserResult<StepOutcome> {
        let script = format!(
            r#"
(() => {{
    const elements = [...document.querySelectorAll({tags})];
    const target = elements.find((el) =>
        el.innerText && el.innerText.includes({needle}) && el.innerText.length < {max});
    if (target) {{
        target.click();
        return true;
    }}
    return false;
}})()
"#,
            tags = json_literal(&self.tags)?,
            needle = json_literal(&self.needle)?,
            max = self.max_text_len,
        );
        let value = session.evaluate(&script).await?;
        Ok(outcome_from(value.as_bool().unwrap_or(false)))
    }
}

/// Force-clicks the first element matched by an ordered selector list.
pub struct StructuredClickFinder {
    label: String,
    selectors: Vec<String>,
}

impl StructuredClickFinder {
    pub fn new(label: impl Into<String>, selectors: Vec<String>) -> Self {
        Self {
            label: label.into(),
            selectors,
        }
    }
}

#[async_trait]
impl FindAndAct for StructuredClickFinder {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(
        &self,
        session: &dyn PageSession,
        _ctx: &StepContext,
    ) -> BrowserResult<StepOutcome> {
        let clicked = session.click_first(&self.selectors).await?;
        Ok(outcome_from(clicked))
    }
}

/// Scans button-like elements for a submit label and clicks synthetically.
pub struct ButtonLabelFinder {
    label: String,
    query: String,
    labels: Vec<String>,
}

impl ButtonLabelFinder {
    pub fn new(label: impl Into<String>, query: &str, labels: Vec<String>) -> Self {
        Self {
            label: label.into(),
            query: query.to_string(),
            labels,
        }
    }
}

#[async_trait]
impl FindAndAct for ButtonLabelFinder {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(
        &self,
        session: &dyn PageSession,
        _ctx: &StepContext,
    ) -> BrowserResult<StepOutcome> {
        let script = format!(
            r#"
(() => {{
    const labels = {labels};
    const buttons = [...document.querySelectorAll({query})];
    const target = buttons.find((b) =>
        (b.innerText && labels.some((l) => b.innerText.includes(l))) ||
        (b.value && labels.some((l) => b.value.includes(l))));
    if (target) {{
        target.click();
        return true;
    }}
    return false;
}})()
"#,
            labels = json_literal(&self.labels)?,
            query = json_literal(&self.query)?,
        );
        let value = session.evaluate(&script).await?;
        Ok(outcome_from(value.as_bool().unwrap_or(false)))
    }
}

/// Human-like email entry: focus, clear, keystroke-delayed typing, tab
/// out. If the page still shows its required-field message afterwards the
/// value did not register, so the forced script assignment runs on top.
pub struct TypedEmailFinder {
    label: String,
    selectors: Vec<String>,
    validation_message: String,
}

impl TypedEmailFinder {
    pub fn new(label: impl Into<String>, selectors: Vec<String>, validation_message: &str) -> Self {
        Self {
            label: label.into(),
            selectors,
            validation_message: validation_message.to_string(),
        }
    }
}

#[async_trait]
impl FindAndAct for TypedEmailFinder {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(
        &self,
        session: &dyn PageSession,
        ctx: &StepContext,
    ) -> BrowserResult<StepOutcome> {
        let typed = session
            .focus_and_type(&self.selectors, &ctx.customer_email, ctx.typing_delay)
            .await?;
        if !typed {
            return Ok(StepOutcome::Skipped);
        }
        if session.is_text_visible(&self.validation_message).await? {
            debug!("typed email did not register; forcing script assignment");
            let script = forced_fill_script(&self.selectors, &ctx.customer_email, false)?;
            session.evaluate(&script).await?;
        }
        Ok(StepOutcome::Completed)
    }
}

/// Last-resort email fill: assign the value from script and dispatch the
/// framework events a real keystroke would have produced.
pub struct ScriptFillFinder {
    label: String,
    selectors: Vec<String>,
}

impl ScriptFillFinder {
    pub fn new(label: impl Into<String>, selectors: Vec<String>) -> Self {
        Self {
            label: label.into(),
            selectors,
        }
    }
}

#[async_trait]
impl FindAndAct for ScriptFillFinder {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(
        &self,
        session: &dyn PageSession,
        ctx: &StepContext,
    ) -> BrowserResult<StepOutcome> {
        let script = forced_fill_script(&self.selectors, &ctx.customer_email, true)?;
        let value = session.evaluate(&script).await?;
        Ok(outcome_from(value.as_bool().unwrap_or(false)))
    }
}

fn forced_fill_script(
    selectors: &[String],
    email: &str,
    press_enter: bool,
) -> BrowserResult<String> {
    let enter = if press_enter {
        "input.dispatchEvent(new KeyboardEvent('keydown', { key: 'Enter', bubbles: true }));"
    } else {
        ""
    };
    Ok(format!(
        r#"
(() => {{
    const input = {selectors}
        .map((s) => document.querySelector(s))
        .find((el) => el);
    if (!input) return false;
    input.value = {email};
    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
    input.dispatchEvent(new Event('change', {{ bubbles: true }}));
    input.dispatchEvent(new Event('blur', {{ bubbles: true }}));
    {enter}
    return true;
}})()
"#,
        selectors = json_literal(&selectors)?,
        email = json_literal(&email)?,
        enter = enter,
    ))
}

/// The ordered interaction heuristics for one class of checkout page.
/// Targeting a different site means building a different set; the
/// orchestrator's control flow does not change.
pub struct StrategySet {
    pub select_method: Vec<Box<dyn FindAndAct>>,
    pub fill_email: Vec<Box<dyn FindAndAct>>,
    pub submit: Vec<Box<dyn FindAndAct>>,
}

impl StrategySet {
    /// Heuristics for the Mercado-Pago-style checkout this engine targets.
    pub fn checkout_defaults(interaction: &InteractionSection) -> Self {
        let select_method: Vec<Box<dyn FindAndAct>> = vec![
            Box::new(TextHeuristicFinder::new(
                "method:text-node-scan",
                "span, div, label, p",
                &interaction.method_label,
                interaction.method_max_text_len,
            )),
            Box::new(StructuredClickFinder::new(
                "method:structured-locator",
                interaction.method_fallback_selectors.clone(),
            )),
        ];
        let fill_email: Vec<Box<dyn FindAndAct>> = vec![
            Box::new(TypedEmailFinder::new(
                "email:typed-entry",
                interaction.email_selectors.clone(),
                &interaction.validation_message,
            )),
            Box::new(ScriptFillFinder::new(
                "email:forced-script",
                interaction.email_selectors.clone(),
            )),
        ];
        let submit: Vec<Box<dyn FindAndAct>> = vec![
            Box::new(ButtonLabelFinder::new(
                "submit:button-label-scan",
                "button, input[type=\"submit\"], .andes-button",
                interaction.submit_labels.clone(),
            )),
            Box::new(StructuredClickFinder::new(
                "submit:structured-locator",
                interaction.submit_selectors.clone(),
            )),
        ];
        Self {
            select_method,
            fill_email,
            submit,
        }
    }
}
