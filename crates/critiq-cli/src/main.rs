use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use critiq_core::config_file;
use critiq_core::{
    AnalysisConfig, OpenAiCompletion, Orchestrator, PersonaResolver, StaticPersonaCatalog,
    Verifier, VerifyConfig,
};

mod output;

use output::ColorMode;

/// Persona-based document critique with citation verification
#[derive(Parser, Debug)]
#[command(name = "critiq", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// OpenAI-compatible API key
    #[arg(long)]
    api_key: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible endpoint base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Semantic Scholar API key
    #[arg(long)]
    s2_api_key: Option<String>,

    /// Contact email for CrossRef's polite pool
    #[arg(long)]
    crossref_mailto: Option<String>,

    /// Comma-separated list of authorities to disable
    #[arg(long, value_delimiter = ',')]
    disable_authorities: Vec<String>,

    /// Skip supplementary reading suggestions
    #[arg(long)]
    no_supplements: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a document under one or more personas
    Analyze {
        /// Path to the plain-text or markdown document
        file_path: PathBuf,

        /// Comma-separated persona names
        #[arg(short, long, value_delimiter = ',')]
        personas: Vec<String>,

        #[command(flatten)]
        backend: BackendArgs,

        /// Emit the JSON payload instead of the human report
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Path to output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract and verify citations without running persona critiques
    Citations {
        /// Path to the plain-text or markdown document
        file_path: PathBuf,

        #[command(flatten)]
        backend: BackendArgs,

        /// Segment only: print raw reference blocks without any network calls
        #[arg(long)]
        dry_run: bool,

        /// Emit the JSON payload instead of the human table
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Path to output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the available personas
    Personas {
        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

/// Connection settings after cascading CLI flags > env vars > config file.
struct Settings {
    api_key: Option<String>,
    model: String,
    base_url: Option<String>,
    model_timeout_secs: u64,
    verify: VerifyConfig,
    personas: Vec<String>,
    max_section_chars: usize,
    critique_temperature: f32,
    suggest_supplementary: bool,
}

fn resolve_settings(backend: &BackendArgs, personas: &[String]) -> Settings {
    let file = config_file::load_config();
    let api_keys = file.api_keys.unwrap_or_default();
    let model = file.model.unwrap_or_default();
    let authorities = file.authorities.unwrap_or_default();
    let analysis = file.analysis.unwrap_or_default();

    let defaults = AnalysisConfig::default();

    let disabled = if backend.disable_authorities.is_empty() {
        authorities.disabled.unwrap_or_default()
    } else {
        backend.disable_authorities.clone()
    };

    let personas = if personas.is_empty() {
        analysis
            .personas
            .unwrap_or_else(|| vec!["methodologist".to_string(), "statistician".to_string()])
    } else {
        personas.to_vec()
    };

    Settings {
        api_key: backend
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .or(api_keys.openai_api_key),
        model: backend
            .model
            .clone()
            .or_else(|| std::env::var("OPENAI_MODEL").ok())
            .or(model.name)
            .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        base_url: backend
            .base_url
            .clone()
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            .or(model.base_url),
        model_timeout_secs: model.timeout_secs.unwrap_or(120),
        verify: VerifyConfig {
            authority_timeout_secs: authorities
                .timeout_secs
                .unwrap_or(defaults.verify.authority_timeout_secs),
            max_candidates: authorities
                .max_candidates
                .unwrap_or(defaults.verify.max_candidates),
            disabled_authorities: disabled,
            crossref_mailto: backend
                .crossref_mailto
                .clone()
                .or_else(|| std::env::var("CROSSREF_MAILTO").ok())
                .or(api_keys.crossref_mailto),
            s2_api_key: backend
                .s2_api_key
                .clone()
                .or_else(|| std::env::var("S2_API_KEY").ok())
                .or(api_keys.s2_api_key),
        },
        personas,
        max_section_chars: analysis
            .max_section_chars
            .unwrap_or(defaults.max_section_chars),
        critique_temperature: analysis
            .critique_temperature
            .unwrap_or(defaults.critique_temperature),
        suggest_supplementary: !backend.no_supplements
            && analysis
                .suggest_supplementary
                .unwrap_or(defaults.suggest_supplementary),
    }
}

fn build_orchestrator(settings: &Settings) -> anyhow::Result<Orchestrator> {
    let api_key = settings.api_key.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "No API key. Set --api-key, OPENAI_API_KEY, or api_keys.openai_api_key in the config file"
        )
    })?;

    let client = reqwest::Client::new();

    let mut llm = OpenAiCompletion::new(api_key, settings.model.clone(), client.clone())
        .with_timeout(Duration::from_secs(settings.model_timeout_secs));
    if let Some(ref base_url) = settings.base_url {
        llm = llm.with_base_url(base_url.clone());
    }

    let verifier = Verifier::new(settings.verify.clone(), client);

    let config = AnalysisConfig {
        verify: settings.verify.clone(),
        max_section_chars: settings.max_section_chars,
        critique_temperature: settings.critique_temperature,
        suggest_supplementary: settings.suggest_supplementary,
    };

    Ok(Orchestrator::new(
        Arc::new(llm),
        Arc::new(StaticPersonaCatalog::new()),
        verifier,
        config,
    ))
}

fn make_writer(output: &Option<PathBuf>) -> anyhow::Result<Box<dyn Write>> {
    Ok(if let Some(path) = output {
        Box::new(std::fs::File::create(path)?)
    } else {
        Box::new(std::io::stdout())
    })
}

fn read_document(file_path: &PathBuf) -> anyhow::Result<String> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }
    Ok(std::fs::read_to_string(file_path)?)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });
    cancel
}

fn spinner(message: &'static str, visible: bool) -> Option<indicatif::ProgressBar> {
    if !visible {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            file_path,
            personas,
            backend,
            json,
            no_color,
            output,
        } => analyze(file_path, personas, backend, json, no_color, output).await,
        Command::Citations {
            file_path,
            backend,
            dry_run,
            json,
            no_color,
            output,
        } => citations(file_path, backend, dry_run, json, no_color, output).await,
        Command::Personas { no_color } => personas_list(no_color),
    }
}

async fn analyze(
    file_path: PathBuf,
    personas: Vec<String>,
    backend: BackendArgs,
    json: bool,
    no_color: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let settings = resolve_settings(&backend, &personas);
    let document = read_document(&file_path)?;
    let orchestrator = build_orchestrator(&settings)?;

    let color = ColorMode(!no_color && output.is_none() && !json);
    let mut writer = make_writer(&output)?;

    let cancel = cancel_on_ctrl_c();
    let pb = spinner("Analyzing...", output.is_none() && !json);

    let report = orchestrator
        .analyze(&document, &settings.personas, cancel)
        .await;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let report = report?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        output::print_report(&mut writer, &report, color)?;
    }
    Ok(())
}

async fn citations(
    file_path: PathBuf,
    backend: BackendArgs,
    dry_run: bool,
    json: bool,
    no_color: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let document = read_document(&file_path)?;
    let color = ColorMode(!no_color && output.is_none() && !json);
    let mut writer = make_writer(&output)?;

    if dry_run {
        let section = critiq_parsing::locate_references(&document);
        let blocks = critiq_parsing::segment_references(&section);
        if json {
            writeln!(writer, "{}", serde_json::to_string_pretty(&blocks)?)?;
        } else {
            output::print_segmentation(&mut writer, &blocks, color)?;
        }
        return Ok(());
    }

    let settings = resolve_settings(&backend, &[]);
    let orchestrator = build_orchestrator(&settings)?;

    let cancel = cancel_on_ctrl_c();
    let pb = spinner("Extracting citations...", output.is_none() && !json);

    let result = orchestrator.extract_citations(&document, &cancel).await;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let citations = result?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&citations)?)?;
    } else {
        output::print_citation_table(&mut writer, &citations, color)?;
    }
    Ok(())
}

fn personas_list(no_color: bool) -> anyhow::Result<()> {
    let catalog = StaticPersonaCatalog::new();
    let personas: Vec<(String, String)> = catalog
        .names()
        .into_iter()
        .filter_map(|name| catalog.resolve(&name).map(|prompt| (name, prompt)))
        .collect();

    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());
    output::print_personas(&mut writer, &personas, ColorMode(!no_color))?;
    Ok(())
}
