use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fineprint_core::llm::LlmSettingsFile;
use fineprint_core::schema::response_schema;
use fineprint_core::{
    build_backend, render_session, AnalysisStatus, Analyzer, CardExpansion, LlmSettings,
    OutputFormat, RenderOptions, Session, SubmitRejected,
};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "fineprint",
    author,
    version,
    about = "Terms-of-Service risk analyzer"
)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON) with an `[llm]` table
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a Terms of Service or privacy policy
    Scan(ScanArgs),
    /// Print the structured-output schema sent to the model
    Schema,
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    /// Read the document from a file instead of stdin
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Confirm you understand this is an AI analysis, not legal advice
    #[arg(long)]
    accept_disclaimer: bool,

    #[arg(long, value_enum, default_value_t = Format::Human)]
    format: Format,

    /// Show the original clause and rationale for one card
    #[arg(long, value_name = "ID", conflicts_with = "details")]
    expand: Option<String>,

    /// Show the original clause and rationale for every card
    #[arg(long)]
    details: bool,

    /// Give up on the model after this long (e.g. `45s`, `2m`)
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Override the configured provider (gemini, openai, noop)
    #[arg(long)]
    provider: Option<String>,

    /// Override the configured model identifier
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Human,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Human => OutputFormat::Human,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    llm: LlmSettingsFile,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(ref args) => scan(cli.config.as_deref(), args).await,
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&response_schema())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn scan(config_path: Option<&Path>, args: &ScanArgs) -> Result<ExitCode> {
    let file_settings = load_file_config(config_path)?.llm;
    let overrides = LlmSettingsFile {
        provider: args.provider.clone(),
        model: args.model.clone(),
        ..Default::default()
    };
    let settings = LlmSettings::layered(overrides, file_settings)?;

    let text = read_document(args.file.as_deref())?;

    let mut session = Session::new();
    if let Err(rejected) = session.check_submit(&text, args.accept_disclaimer) {
        eprintln!("Nothing submitted: {}", rejected);
        if rejected == SubmitRejected::NotAcknowledged {
            eprintln!("Re-run with --accept-disclaimer to continue.");
        }
        return Ok(ExitCode::from(2));
    }

    let backend = build_backend(&settings).context("failed to configure analysis backend")?;
    let mut analyzer = Analyzer::new(backend).with_model(settings.model_or_default());
    if let Some(timeout) = args.timeout {
        analyzer = analyzer.with_timeout(timeout);
    }
    info!(provider = ?settings.provider, model = analyzer.model(), "submitting document");

    let status = session.run(&analyzer, &text, args.accept_disclaimer).await?;

    let options = RenderOptions {
        expansion: args
            .expand
            .clone()
            .map(CardExpansion::expanded)
            .unwrap_or_default(),
        expand_all: args.details,
    };
    print!(
        "{}",
        render_session(session.state(), &options, args.format.into())?
    );

    Ok(match status {
        AnalysisStatus::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .and_then(|cfg| cfg.try_deserialize::<FileConfig>())
        .with_context(|| format!("failed to load config from {}", path.display()))
}

fn read_document(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read document {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read document from stdin")?;
            Ok(buf)
        }
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
