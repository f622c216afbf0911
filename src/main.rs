use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use voc_pulse::ai::{AnalyzerSettings, CompletionBackend, FeedbackAnalyzer, GeminiBackend, MockBackend};
use voc_pulse::config::{BackendKind, Config};
use voc_pulse::web::{self, AppState, FlashSigner};

/// Command-line arguments for the feedback analyzer web app
#[derive(Parser)]
#[command(
    name = "voc-pulse",
    about = "Voice-of-Customer analyzer - turn raw feedback into prioritized insights",
    long_about = "Serves a small web form that sends customer feedback to Google Gemini \
                  and renders the returned P0 issues, product gaps, sentiment, quick wins \
                  and key themes as an HTML report."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Override the listen host
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// Missing config files are allowed; [`Config::load`] falls back to
    /// defaults for them.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if self.port == Some(0) {
            return Err("Port must be greater than zero".to_string());
        }

        if let Some(ref host) = self.host {
            if host.trim().is_empty() {
                return Err("Host must not be empty".to_string());
            }
        }

        Ok(())
    }

    /// Convert config path to string safely, handling non-UTF-8 paths
    fn config_path_str(&self) -> Result<Option<&str>, String> {
        match &self.config {
            Some(path) => match path.to_str() {
                Some(path_str) => Ok(Some(path_str)),
                None => Err(format!(
                    "Configuration file path contains invalid UTF-8 characters: {}",
                    path.display()
                )),
            },
            None => Ok(None),
        }
    }

    /// Apply host/port flags on top of file and environment settings
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

/// Resolve the final configuration: file, then environment, then flags
fn load_config(cli: &Cli, config_path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = Config::load(config_path.map(Path::new));
    config
        .apply_process_env()
        .context("Invalid configuration in environment")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid command-line override")?;
    Ok(config)
}

/// Startup warning for a missing credential, if one applies
///
/// The analyzer checks the credential before calling any backend, so the mock
/// backend needs a placeholder key as well.
fn credential_warning(backend: BackendKind, settings: &AnalyzerSettings) -> Option<String> {
    if settings.credential().is_some() {
        return None;
    }
    Some(match backend {
        BackendKind::Gemini => {
            "GOOGLE_API_KEY is not set; every analysis will fail until it is configured".to_string()
        }
        BackendKind::Mock => "GOOGLE_API_KEY is not set; the mock backend still requires it, \
                              so set any placeholder value (e.g. GOOGLE_API_KEY=demo) to see sample reports"
            .to_string(),
    })
}

/// Wire the configured backend, analyzer and templates together
fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let backend: Arc<dyn CompletionBackend> = match config.ai.backend {
        BackendKind::Gemini => {
            info!("Using Gemini backend at {}", config.ai.base_url);
            Arc::new(GeminiBackend::from_config(&config.ai).context("Failed to create HTTP client")?)
        }
        BackendKind::Mock => {
            warn!("Using mock backend; reports are canned sample data");
            Arc::new(MockBackend::success())
        }
    };

    let settings = AnalyzerSettings::from_config(&config.ai);
    if let Some(message) = credential_warning(config.ai.backend, &settings) {
        warn!("{}", message);
    }
    info!("Analysis model: {}", settings.model);

    let analyzer = FeedbackAnalyzer::new(backend, settings);
    let flash = FlashSigner::from_secret(config.server.session_secret());

    AppState::new(analyzer, flash).context("Failed to compile templates")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt signal (SIGINT), shutting down gracefully..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path_str().map_err(anyhow::Error::msg)?;
    let config = load_config(&cli, config_path)?;
    let state = build_state(&config)?;

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!("Listening on http://{}. Press Ctrl+C to stop.", address);

    axum::serve(listener, web::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting VoC Pulse");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(config: Option<PathBuf>) -> Cli {
        Cli {
            config,
            verbose: false,
            host: None,
            port: None,
        }
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let temp_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(temp_file.path(), "[ai]\nbackend = \"mock\"").unwrap();

        assert!(cli(Some(temp_file.path().to_path_buf())).validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_missing_file() {
        // Missing files fall back to defaults
        assert!(cli(Some(PathBuf::from("/nonexistent/voc-pulse.toml"))).validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cli(Some(dir.path().to_path_buf())).validate().is_err());
    }

    #[test]
    fn test_cli_validation_no_config() {
        assert!(cli(None).validate().is_ok());
    }

    #[test]
    fn test_cli_validation_rejects_zero_port_and_blank_host() {
        let mut args = cli(None);
        args.port = Some(0);
        assert!(args.validate().is_err());

        let mut args = cli(None);
        args.host = Some("  ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_config_path_str_with_valid_path() {
        let args = cli(Some(PathBuf::from("voc-pulse.toml")));
        assert_eq!(args.config_path_str().unwrap(), Some("voc-pulse.toml"));
    }

    #[test]
    fn test_config_path_str_no_config() {
        assert_eq!(cli(None).config_path_str().unwrap(), None);
    }

    #[test]
    fn test_overrides_win_over_config() {
        let mut config = Config::default();
        let args = Cli {
            config: None,
            verbose: false,
            host: Some("127.0.0.1".to_string()),
            port: Some(8080),
        };

        args.apply_overrides(&mut config);

        assert_eq!(config.server.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_build_state_with_mock_backend() {
        let mut config = Config::default();
        config.ai.backend = BackendKind::Mock;
        config.server.secret_key = Some("secret".to_string());

        let state = build_state(&config).unwrap();
        assert_eq!(state.analyzer.settings().model, config.ai.model);
        assert!(state.analyzer.settings().credential().is_none());
    }

    #[test]
    fn test_credential_warning() {
        let mut config = Config::default();
        let settings = AnalyzerSettings::from_config(&config.ai);

        let gemini = credential_warning(BackendKind::Gemini, &settings).unwrap();
        assert!(gemini.contains("GOOGLE_API_KEY is not set"));

        let mock = credential_warning(BackendKind::Mock, &settings).unwrap();
        assert!(mock.contains("mock backend still requires it"));
        assert!(mock.contains("GOOGLE_API_KEY=demo"));

        config.ai.api_key = Some("demo".to_string());
        let settings = AnalyzerSettings::from_config(&config.ai);
        assert_eq!(credential_warning(BackendKind::Mock, &settings), None);
        assert_eq!(credential_warning(BackendKind::Gemini, &settings), None);
    }

    #[tokio::test]
    async fn test_mock_backend_with_placeholder_key_serves_sample_report() {
        let mut config = Config::default();
        config.ai.backend = BackendKind::Mock;
        config.ai.api_key = Some("demo".to_string());

        let state = build_state(&config).unwrap();
        let outcome = state.analyzer.analyze("The export button does nothing").await;

        assert!(outcome.is_success());
    }

    #[test]
    fn test_build_state_with_gemini_backend() {
        let mut config = Config::default();
        config.ai.api_key = Some("key".to_string());
        config.ai.timeout_seconds = Some(30);

        let state = build_state(&config).unwrap();
        assert_eq!(state.analyzer.settings().credential(), Some("key"));
    }
}
