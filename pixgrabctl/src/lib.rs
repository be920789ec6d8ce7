use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use pixgrab_core::browser::ChromiumEngine;
use pixgrab_core::extract::{DiagnosticBundle, DiagnosticSink};
use pixgrab_core::{
    load_extractor_config, BrowserPool, ExtractionRequest, ExtractionResult, Extractor,
    ExtractorConfig,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] pixgrab_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("browser error: {0}")]
    Browser(#[from] pixgrab_core::BrowserError),
    #[error("extração falhou: {0}")]
    ExtractionFailed(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Interface de linha de comando do extrator Pix", long_about = None)]
pub struct Cli {
    /// Caminho do pixgrab.toml
    #[arg(long, default_value = "configs/pixgrab.toml")]
    pub config: PathBuf,
    /// Diretório para artefatos de depuração
    #[arg(long, default_value = "debug")]
    pub debug_dir: PathBuf,
    /// Formato de saída
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extrai o código Pix copia e cola de um checkout
    Extract(ExtractArgs),
    /// Valida o arquivo de configuração
    Check,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Link da página de pagamento
    #[arg(long)]
    pub url: String,
    /// Email do cliente (opcional)
    #[arg(long)]
    pub email: Option<String>,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_async(cli))
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn run_async(cli: Cli) -> Result<()> {
    let Cli {
        config: config_path,
        debug_dir,
        format,
        command,
    } = cli;
    let config = load_config(&config_path)?;
    match command {
        Commands::Check => check(format, &config_path, &config),
        Commands::Extract(args) => extract(format, debug_dir, config, args).await,
    }
}

fn load_config(path: &Path) -> Result<ExtractorConfig> {
    if path.exists() {
        Ok(load_extractor_config(path)?)
    } else {
        info!(path = %path.display(), "config ausente; usando padrões");
        Ok(ExtractorConfig::default())
    }
}

fn check(format: OutputFormat, config_path: &Path, config: &ExtractorConfig) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "config": config_path.display().to_string(),
                "token_prefix": config.detection.token_prefix,
                "max_attempts": config.retry.max_attempts,
                "max_concurrent_extractions": config.limits.max_concurrent_extractions,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("config: {}", config_path.display());
            println!("prefixo do token: {}", config.detection.token_prefix);
            println!("tentativas máximas: {}", config.retry.max_attempts);
            println!(
                "extrações simultâneas: {}",
                config.limits.max_concurrent_extractions
            );
        }
    }
    Ok(())
}

async fn extract(
    format: OutputFormat,
    debug_dir: PathBuf,
    config: ExtractorConfig,
    args: ExtractArgs,
) -> Result<()> {
    let sink = Arc::new(DirectoryDiagnosticSink::new(debug_dir)?);
    let engine = ChromiumEngine::new(Arc::new(config.clone()));
    let pool = Arc::new(BrowserPool::new(Box::new(engine)));
    pool.startup().await?;

    let extractor = Extractor::new(Arc::clone(&pool), config, sink);
    let request = ExtractionRequest::new(args.url, args.email);
    let result = extractor.extract(request).await;

    if let Err(err) = pool.shutdown().await {
        warn!(error = %err, "falha ao encerrar o navegador");
    }

    print_result(format, &result)?;
    if result.success {
        Ok(())
    } else {
        let reason = result
            .error_kind
            .map(|kind| format!("{kind:?}"))
            .unwrap_or_else(|| "desconhecido".to_string());
        Err(AppError::ExtractionFailed(reason))
    }
}

fn print_result(format: OutputFormat, result: &ExtractionResult) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            if let Some(token) = &result.token {
                println!("{token}");
            } else {
                println!(
                    "nenhum código encontrado ({:?} em {} tentativas)",
                    result.error_kind, result.attempts
                );
            }
        }
    }
    Ok(())
}

/// Writes failure evidence under the debug directory, one file trio per
/// attempt. Never fails the engine: write errors are only logged.
pub struct DirectoryDiagnosticSink {
    root: PathBuf,
}

impl DirectoryDiagnosticSink {
    pub fn new(root: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

#[async_trait]
impl DiagnosticSink for DirectoryDiagnosticSink {
    async fn record(&self, request_id: Uuid, attempt: usize, bundle: DiagnosticBundle) {
        let stem = format!("{request_id}-attempt-{attempt}");

        let html_path = self.root.join(format!("{stem}.html"));
        if let Err(err) = tokio::fs::write(&html_path, bundle.html_snapshot.as_bytes()).await {
            warn!(path = %html_path.display(), error = %err, "falha ao gravar html");
        }

        if let Some(screenshot) = &bundle.screenshot {
            let png_path = self.root.join(format!("{stem}.png"));
            if let Err(err) = tokio::fs::write(&png_path, screenshot).await {
                warn!(path = %png_path.display(), error = %err, "falha ao gravar screenshot");
            }
        }

        if !bundle.frame_texts.is_empty() {
            let frames_path = self.root.join(format!("{stem}-frames.txt"));
            let joined = bundle.frame_texts.join("\n\n---\n\n");
            if let Err(err) = tokio::fs::write(&frames_path, joined.as_bytes()).await {
                warn!(path = %frames_path.display(), error = %err, "falha ao gravar frames");
            }
        }

        info!(request_id = %request_id, attempt, "artefatos de depuração gravados");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn sink_writes_bundle_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryDiagnosticSink::new(dir.path().to_path_buf()).unwrap();
        let request_id = Uuid::new_v4();

        let bundle = DiagnosticBundle {
            html_snapshot: "<html><body>sem pix</body></html>".to_string(),
            screenshot: Some(vec![1, 2, 3]),
            frame_texts: vec!["frame um".to_string(), "frame dois".to_string()],
            captured_at: Utc::now(),
        };
        sink.record(request_id, 2, bundle).await;

        let stem = format!("{request_id}-attempt-2");
        assert!(dir.path().join(format!("{stem}.html")).exists());
        assert!(dir.path().join(format!("{stem}.png")).exists());
        assert!(dir.path().join(format!("{stem}-frames.txt")).exists());
    }

    #[test]
    fn cli_parses_extract_command() {
        let cli = Cli::parse_from([
            "pixgrabctl",
            "--format",
            "json",
            "extract",
            "--url",
            "https://checkout.example/pay",
            "--email",
            "cliente@example.com",
        ]);
        match cli.command {
            Commands::Extract(args) => {
                assert_eq!(args.url, "https://checkout.example/pay");
                assert_eq!(args.email.as_deref(), Some("cliente@example.com"));
            }
            other => panic!("comando inesperado: {other:?}"),
        }
    }
}
