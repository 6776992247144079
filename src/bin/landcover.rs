//! CLI binary for edgequake-landcover.
//!
//! A thin shim over the library crate: maps CLI flags to `AnalyzerConfig`,
//! runs one upload + analysis through a `Workspace` and prints the breakdown.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use edgequake_landcover::pipeline::{input, render};
use edgequake_landcover::present::render_breakdown;
use edgequake_landcover::{
    AnalysisProgressCallback, AnalyzerConfig, Breakdown, ProgressCallback, Stage, Workspace,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr with one log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("landcover");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{}…", stage.label()));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
        self.bar.println(format!(
            "  {} {:<22} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", elapsed.as_secs_f64())),
        ));
    }

    fn on_stage_error(&self, stage: Stage, _error: &str) {
        self.bar.println(format!("  {} {}", red("✗"), stage.label()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a masterplan PDF (page 1 is used)
  landcover masterplan.pdf

  # Analyse an image, machine-readable output
  landcover --json site-plan.png > breakdown.json

  # Download from a URL
  landcover https://example.com/plans/phase-2.pdf

  # Use another provider through edgequake-llm
  landcover --provider openai --model gpt-4.1 masterplan.pdf

  # Page count and size only, no analysis
  landcover --inspect-only masterplan.pdf

CATEGORIES:
  TREES_AND_SHRUBS      woodland, tree belts, hedges, shrub planting
  GREEN_OPEN_SPACE      lawns, meadows, parkland, grass verges
  PERMEABLE_SURFACES    gravel, permeable paving, bark mulch
  IMPERMEABLE_SURFACES  roads, asphalt, concrete, buildings
  INCIDENTAL_PLAY_AREA  play equipment, play lawns, natural play

LIMITS:
  PDF, JPEG, PNG or WebP; at most 10 MB. Only the first PDF page is analysed.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (required for the default backend)
  LANDCOVER_PROVIDER      Backend: gemini (default) or any edgequake-llm provider
  LANDCOVER_MODEL         Model ID (default: gemini-2.5-flash)
  LANDCOVER_API_TIMEOUT   Seconds to wait for the model (default: 60)
  PDFIUM_LIB_PATH         Path to libpdfium; otherwise ./ then the system path
"#;

/// Estimate land-cover shares of a landscape masterplan with a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "landcover",
    version,
    about = "Estimate land-cover shares of a landscape masterplan with a Vision LLM",
    long_about = "Classify a landscape masterplan (PDF or image, local file or URL) into five \
land-cover categories using a Vision Language Model, and print each category's share of the site.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF/image path or HTTP/HTTPS URL.
    input: String,

    /// Model ID (e.g. gemini-2.5-flash, gpt-4.1).
    #[arg(long, env = "LANDCOVER_MODEL")]
    model: Option<String>,

    /// Backend: gemini, or an edgequake-llm provider (openai, anthropic, ollama, …).
    #[arg(long, env = "LANDCOVER_PROVIDER")]
    provider: Option<String>,

    /// Seconds to wait for the model before giving up.
    #[arg(long, env = "LANDCOVER_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "LANDCOVER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output the breakdown as JSON.
    #[arg(long, env = "LANDCOVER_JSON")]
    json: bool,

    /// Disable ANSI colours in the bar and cards.
    #[arg(long, env = "LANDCOVER_NO_COLOR")]
    no_color: bool,

    /// Width of the stacked bar in characters.
    #[arg(long, env = "LANDCOVER_WIDTH", default_value_t = 60,
          value_parser = clap::value_parser!(u16).range(10..=400))]
    width: u16,

    /// Print file information only, no analysis.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LANDCOVER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the result and errors.
    #[arg(short, long, env = "LANDCOVER_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "LANDCOVER_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    file: &'a str,
    model: &'a str,
    #[serde(flatten)]
    breakdown: &'a Breakdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && io::stderr().is_terminal();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    // Credentials are checked before anything else runs, inspect mode included.
    let mut config = build_config(&cli, |var| std::env::var(var).ok())?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        return inspect(&cli).await;
    }

    let spinner = show_progress.then(CliProgressCallback::new);
    config.progress_callback = spinner.clone().map(|cb| cb as ProgressCallback);

    let model_id = config.model_id().to_string();
    let workspace = Workspace::new(config).context("Could not set up the model backend")?;

    // ── Run analysis ─────────────────────────────────────────────────────
    // Ctrl-C drops the in-flight future, which cancels the request.
    let outcome = tokio::select! {
        result = run(&workspace, &cli.input) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("Cancelled")),
    };

    if let Some(ref cb) = spinner {
        cb.finish();
    }
    let breakdown = outcome?;

    if cli.json {
        let report = JsonReport {
            file: &cli.input,
            model: &model_id,
            breakdown: &breakdown,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
    } else {
        let color = !cli.no_color && io::stdout().is_terminal();
        if !cli.quiet {
            println!("{}\n", bold(&format!("Land cover: {}", cli.input)));
        }
        print!("{}", render_breakdown(&breakdown, cli.width as usize, color));
        if !cli.quiet {
            eprintln!("{}", dim(&format!("model: {model_id}")));
        }
    }

    Ok(())
}

/// Resolve the analyser config from flags and `env`.
///
/// CLI values win over the environment; clap has already folded the
/// LANDCOVER_* variables into them.
fn build_config(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<AnalyzerConfig> {
    let mut config = AnalyzerConfig::from_lookup(|var| match var {
        "LANDCOVER_MODEL" => cli.model.clone(),
        "LANDCOVER_PROVIDER" => cli.provider.clone(),
        "LANDCOVER_API_TIMEOUT" => cli.api_timeout.map(|s| s.to_string()),
        _ => env(var),
    })
    .context("Configuration error")?;
    config.download_timeout_secs = cli.download_timeout;
    Ok(config)
}

/// Upload then analyse, mapping failures to their user-facing message.
async fn run(workspace: &Workspace, input: &str) -> Result<Breakdown> {
    workspace.upload(input).await.map_err(|e| {
        debug!("upload failed: {e:?}");
        anyhow!(e.user_message())
    })?;
    workspace.analyze().await.map_err(|e| {
        debug!("analysis failed: {e:?}");
        anyhow!(e.user_message())
    })
}

/// `--inspect-only`: type, size and, for PDFs, page count and page-1 size.
async fn inspect(cli: &Cli) -> Result<()> {
    let file = input::resolve_input(&cli.input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to read {}", cli.input))?;

    let pdf = if file.is_pdf() {
        Some(
            render::inspect_pdf(file.bytes().to_vec())
                .await
                .context("Failed to inspect PDF")?,
        )
    } else {
        None
    };

    if cli.json {
        let value = serde_json::json!({
            "file": cli.input,
            "mime_type": file.mime_type(),
            "size": file.size(),
            "pdf": pdf,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialise metadata")?
        );
        return Ok(());
    }

    println!("File:         {}", cli.input);
    println!("Type:         {}", file.mime_type());
    println!("Size:         {} bytes", file.size());
    if let Some(info) = pdf {
        println!("Pages:        {} (page 1 is analysed)", info.page_count);
        if let Some((w, h)) = info.first_page_size {
            println!(
                "Page 1:       {:.0} × {:.0} pt → {:.0} × {:.0} px rendered",
                w,
                h,
                w * render::RENDER_SCALE,
                h * render::RENDER_SCALE
            );
        }
    }
    Ok(())
}
