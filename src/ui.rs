// CLI layer: parses flags, builds the API client and drives one batch with a
// progress bar, then prints the summary and maps the result to an exit code.

use crate::api::{ApiClient, BatchResult, FileState};
use crate::config::{ClientSettings, FileConfig};
use crate::files::collect_files;
use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INTERRUPTED: u8 = 130;

const API_KEY_ENV: &str = "OPEN_WEBUI_API_KEY";

const EXAMPLES: &str = "\
Examples:
  # Upload files to an existing knowledge collection
  openwebui-uploader --endpoint http://localhost:3000 --api-key YOUR_KEY \\
                     --knowledge \"My Docs\" --path ./documents

  # Create the collection if it does not exist
  openwebui-uploader --endpoint http://localhost:3000 --api-key YOUR_KEY \\
                     --knowledge \"New Collection\" --path ./documents --create

  # Only the top-level directory
  openwebui-uploader --endpoint http://localhost:3000 --api-key YOUR_KEY \\
                     --knowledge \"My Docs\" --path ./documents --no-recursive

  # API key from the environment
  export OPEN_WEBUI_API_KEY=your_key
  openwebui-uploader --endpoint http://localhost:3000 --knowledge \"My Docs\" --path ./documents";

#[derive(Parser, Debug)]
#[command(name = "openwebui-uploader")]
#[command(about = "Upload files to Open WebUI knowledge collections")]
#[command(version, after_help = EXAMPLES)]
pub struct Args {
    /// Open WebUI base URL (e.g. http://localhost:3000)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// API key used as bearer token
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Name of the knowledge collection
    #[arg(long)]
    pub knowledge: String,

    /// Create the knowledge collection if it does not exist
    #[arg(long)]
    pub create: bool,

    /// Description for the collection (used with --create)
    #[arg(long, default_value = "")]
    pub description: String,

    /// Directory containing the files to upload
    #[arg(long)]
    pub path: PathBuf,

    /// Scan subdirectories (default)
    #[arg(long, overrides_with = "no_recursive")]
    pub recursive: bool,

    /// Only scan the top-level directory
    #[arg(long, overrides_with = "recursive")]
    pub no_recursive: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (defaults to ~/.config/openwebui-uploader/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Attempts when linking a file to the collection (at least 1)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: Option<u32>,

    /// Seconds between linking attempts
    #[arg(long, value_name = "SECONDS")]
    pub retry_delay: Option<f64>,

    /// Milliseconds to wait between upload and linking
    #[arg(long, value_name = "MS")]
    pub settle_delay: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl Args {
    pub fn is_recursive(&self) -> bool {
        !self.no_recursive
    }

    /// Client settings: defaults, then the config file, then flags.
    pub fn client_settings(&self, file: &FileConfig) -> ClientSettings {
        let mut settings = ClientSettings::default();
        file.apply_to(&mut settings);
        if let Some(retries) = self.retries {
            settings.retries = retries;
        }
        if let Some(secs) = self.retry_delay {
            settings.retry_delay = Duration::from_secs_f64(secs.max(0.0));
        }
        if let Some(ms) = self.settle_delay {
            settings.settle_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.timeout {
            settings.timeout = Duration::from_secs(secs);
        }
        settings
    }
}

/// Connection details after merging flags, environment and config file.
#[derive(Debug, PartialEq)]
pub struct Target {
    pub endpoint: String,
    pub api_key: String,
}

/// Merge and validate endpoint and API key.
pub fn resolve_target(args: &Args, file: &FileConfig) -> Result<Target> {
    let api_key = args
        .api_key
        .clone()
        .or_else(|| file.api_key.clone())
        .filter(|k| !k.trim().is_empty());
    let Some(api_key) = api_key else {
        bail!(
            "API key is required. Provide --api-key or set {} environment variable.",
            API_KEY_ENV
        );
    };

    let Some(endpoint) = args.endpoint.clone().or_else(|| file.endpoint.clone()) else {
        bail!("Endpoint is required. Provide --endpoint or set it in the config file.");
    };
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        bail!("Endpoint must start with http:// or https://");
    }

    Ok(Target { endpoint, api_key })
}

/// Run one upload batch and return the process exit code.
pub fn run(args: &Args) -> Result<ExitCode> {
    let file_config =
        FileConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    let target = resolve_target(args, &file_config)?;
    let settings = args.client_settings(&file_config);

    tracing::info!(path = %args.path.display(), "Collecting files");
    let files = collect_files(&args.path, args.is_recursive())?;
    if files.is_empty() {
        tracing::warn!(path = %args.path.display(), "No files found");
        return Ok(ExitCode::from(EXIT_SUCCESS));
    }
    tracing::info!(count = files.len(), "Found file(s) to upload");

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
        eprintln!("\nStopping after the current file (press Ctrl+C again to abort)...");
    })
    .context("failed to set Ctrl+C handler")?;

    let mut client = ApiClient::new(&target.endpoint, &target.api_key, settings)?
        .with_interrupt(interrupted.clone());

    tracing::info!(knowledge = %args.knowledge, "Uploading files to knowledge collection");
    let progress = progress_bar(files.len(), args.verbose);
    let result = client.upload_files_to_knowledge_with_progress(
        &args.knowledge,
        &files,
        args.create,
        &args.description,
        |outcome| {
            let name = outcome
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if outcome.state != FileState::Linked {
                progress.set_message(format!("failed: {}", name));
            } else {
                progress.set_message(name);
            }
            progress.inc(1);
        },
    );
    progress.finish_and_clear();

    let color = std::io::stdout().is_tty();
    print!("{}", render_summary(&result, color));

    if result.interrupted {
        tracing::info!("Upload interrupted by user");
    }
    Ok(ExitCode::from(exit_code(&result)))
}

pub fn exit_code(result: &BatchResult) -> u8 {
    if result.interrupted {
        EXIT_INTERRUPTED
    } else if result.failed > 0 {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    }
}

fn progress_bar(len: usize, verbose: bool) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if verbose {
        bar.set_draw_target(ProgressDrawTarget::hidden());
        return bar;
    }
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Text of the upload summary printed after a batch.
pub fn render_summary(result: &BatchResult, color: bool) -> String {
    let rule = "=".repeat(60);
    let paint = |text: String, ok: bool| -> String {
        match (color, ok) {
            (false, _) => text,
            (true, true) => text.green().to_string(),
            (true, false) => text.red().to_string(),
        }
    };

    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!("{}\nUpload Summary\n{}\n", rule, rule));
    out.push_str(&format!("Total files: {}\n", result.total));
    out.push_str(&format!(
        "Successful: {}\n",
        paint(result.success.to_string(), true)
    ));
    out.push_str(&format!(
        "Failed: {}\n",
        paint(result.failed.to_string(), result.failed == 0)
    ));
    if result.interrupted {
        let skipped = result.total - result.success - result.failed;
        out.push_str(&format!("Not processed: {}\n", skipped));
    }

    if !result.errors.is_empty() {
        out.push_str("\nErrors:\n");
        for error in &result.errors {
            out.push_str(&format!("  - {}\n", paint(error.clone(), false)));
        }
    }
    out.push_str(&format!("{}\n", rule));
    out
}
