use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Full configuration for the extraction engine. Every section has
/// production defaults, so the engine runs without a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub chromium: ChromiumSection,
    pub session: SessionSection,
    pub navigation: NavigationSection,
    pub interaction: InteractionSection,
    pub detection: DetectionSection,
    pub retry: RetrySection,
    pub limits: LimitsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    /// Explicit binary path; `None` lets the engine auto-detect.
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub extra_args: Vec<String>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: false,
            disable_gpu: true,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub locale: String,
    pub accept_language: String,
    /// URL glob patterns aborted before fetch. Heavy static assets by default.
    pub blocked_url_patterns: Vec<String>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
            locale: "pt-BR".to_string(),
            accept_language: "pt-BR,pt;q=0.9,en;q=0.8".to_string(),
            blocked_url_patterns: [
                "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.mp4", "*.woff",
                "*.woff2",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavigationSection {
    pub timeout_seconds: u64,
}

impl Default for NavigationSection {
    fn default() -> Self {
        Self {
            timeout_seconds: 40,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractionSection {
    /// Pause after each UI step; the checkout gives no readiness signal.
    pub settle_delay_ms: u64,
    pub typing_delay_ms: u64,
    /// Label of the payment method to select.
    pub method_label: String,
    /// Text nodes longer than this are not considered method labels.
    pub method_max_text_len: usize,
    /// Structured fallback selectors when the text-node scan finds nothing.
    pub method_fallback_selectors: Vec<String>,
    /// Ordered input shapes tried when locating the email field.
    pub email_selectors: Vec<String>,
    /// Required-field message shown when typed input did not register.
    pub validation_message: String,
    /// Button labels that submit the payment form.
    pub submit_labels: Vec<String>,
    /// Structured fallback selectors for the submit button.
    pub submit_selectors: Vec<String>,
    /// Case-insensitive label pattern for copy-to-clipboard buttons.
    pub copy_label_pattern: String,
}

impl Default for InteractionSection {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2000,
            typing_delay_ms: 50,
            method_label: "Pix".to_string(),
            method_max_text_len: 20,
            method_fallback_selectors: [
                "[aria-label*='Pix']",
                "[data-testid*='pix']",
                "label[for*='pix']",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            email_selectors: [
                "input[type='email']",
                "#user-email-input",
                "input[placeholder*='email']",
                "input[placeholder*='Ex.:']",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            validation_message: "Preencha este campo".to_string(),
            submit_labels: ["Pagar", "Gerar", "Criar Pix"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            submit_selectors: [
                "button[type='submit']",
                ".andes-button--loud",
                ".andes-button",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            copy_label_pattern: "Copiar|Copy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionSection {
    /// Fixed literal prefix every BR Code starts with.
    pub token_prefix: String,
    /// Candidates at or below this length are false positives.
    pub min_token_length: usize,
    pub poll_iterations: usize,
    pub poll_interval_ms: u64,
    /// Wait between clicking a copy button and reading the clipboard.
    pub clipboard_settle_ms: u64,
}

impl Default for DetectionSection {
    fn default() -> Self {
        Self {
            token_prefix: "000201".to_string(),
            min_token_length: 50,
            poll_iterations: 25,
            poll_interval_ms: 2000,
            clipboard_settle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: usize,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_concurrent_extractions: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_concurrent_extractions: 5,
        }
    }
}

pub fn load_extractor_config<P: AsRef<Path>>(path: P) -> ConfigResult<ExtractorConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/pixgrab.toml");
        let config = load_extractor_config(path).expect("fixture should parse");
        assert_eq!(config.detection.token_prefix, "000201");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.limits.max_concurrent_extractions, 5);
        assert!(config.session.user_agent.contains("Chrome"));
    }

    #[test]
    fn defaults_match_production_constants() {
        let config = ExtractorConfig::default();
        assert_eq!(config.navigation.timeout_seconds, 40);
        assert_eq!(config.detection.poll_iterations, 25);
        assert_eq!(config.detection.min_token_length, 50);
        assert_eq!(config.interaction.settle_delay_ms, 2000);
    }
}
