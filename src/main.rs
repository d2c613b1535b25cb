use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use colorize_client::{
    app_state::AppState,
    config::AppConfig,
    models::{
        image::ImageUpload,
        stats::{format_count, format_date},
    },
    services::transition::Transition,
};

#[derive(Parser, Debug)]
#[command(name = "colorize")]
#[command(about = "Colorize black-and-white photos with the remote colorization service")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a colorization job and wait for it to finish.
    Submit {
        image: PathBuf,
        /// Where to save the colorized image.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Colorize in a single request, without a server-side job.
    Ephemeral {
        image: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Show the service's public usage counters.
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize structured logging
    let filter = match args.log_level.as_deref() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // Load configuration from environment
    let config = AppConfig::from_env().context("Failed to load configuration from environment")?;

    if let Some(addr) = config.metrics_addr.as_deref() {
        install_metrics(addr)?;
    }
    describe_metrics();

    let state = AppState::new(config).context("Failed to initialize colorization client")?;

    match args.cmd {
        Command::Submit { image, output } => submit(&state, &image, output.as_deref()).await,
        Command::Ephemeral { image, output } => ephemeral(&state, &image, &output).await,
        Command::Stats => stats(&state).await,
    }
}

async fn submit(state: &AppState, path: &Path, output: Option<&Path>) -> Result<()> {
    let image = ImageUpload::from_path(path)
        .await
        .with_context(|| format!("Cannot use {}", path.display()))?;

    let job = state.flow.submit(&image).await.context("Submission failed")?;
    let request_id = job.handle().request_id.clone();

    let mut progress = job.progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let percent = *progress.borrow_and_update();
            tracing::info!(progress = percent, "Colorizing");
        }
    });

    let cancel = job.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, abandoning job");
            cancel.cancel();
        }
    });

    let transition = job
        .wait(|t: Transition| tracing::debug!(transition = ?t, "Transition delivered"))
        .await;
    let _ = reporter.await;

    match transition {
        Some(Transition::ShowResult { original_ref, result_ref }) => {
            if let Some(output) = output {
                let bytes = state
                    .api
                    .download(&result_ref)
                    .await
                    .context("Failed to download colorized image")?;
                tokio::fs::write(output, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                tracing::info!(path = %output.display(), size_bytes = bytes.len(), "Colorized image saved");
            }

            println!(
                "{}",
                serde_json::json!({
                    "request_id": request_id,
                    "original_url": original_ref,
                    "colorized_url": result_ref,
                })
            );
            Ok(())
        }
        Some(Transition::ShowError { message, .. }) => {
            bail!("{message} (the job was abandoned; submit the photo again to retry)")
        }
        None => Err(anyhow!("Job {request_id} cancelled before it finished")),
    }
}

async fn ephemeral(state: &AppState, path: &Path, output: &Path) -> Result<()> {
    let image = ImageUpload::from_path(path)
        .await
        .with_context(|| format!("Cannot use {}", path.display()))?;

    let result = state
        .api
        .colorize_ephemeral(&image)
        .await
        .context("Colorization failed")?;

    tokio::fs::write(output, &result.colorized)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        path = %output.display(),
        size_bytes = result.colorized.len(),
        expires_in = result.expires_in,
        "Colorized image saved"
    );
    Ok(())
}

async fn stats(state: &AppState) -> Result<()> {
    let stats = state.api.stats().await;

    println!(
        "{}",
        serde_json::json!({
            "total_users": stats.total_users,
            "total_memories": stats.total_memories,
            "last_updated": stats.last_updated,
            "users": format_count(stats.total_users),
            "memories": format_count(stats.total_memories),
            "updated": format_date(&stats.last_updated),
        })
    );
    Ok(())
}

fn install_metrics(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid METRICS_ADDR {addr}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus metrics exporter")?;
    tracing::info!(%addr, "Prometheus metrics listener started");
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("colorize_submissions_total", "Colorization uploads attempted");
    metrics::describe_counter!(
        "colorize_submission_failures_total",
        "Colorization uploads that did not produce a job"
    );
    metrics::describe_counter!("colorize_status_queries_total", "Job status queries issued");
    metrics::describe_counter!("colorize_jobs_completed", "Jobs that finished with a colorized result");
    metrics::describe_counter!("colorize_jobs_failed", "Jobs abandoned after a failure");
    metrics::describe_counter!(
        "colorize_jobs_timed_out",
        "Jobs abandoned after exhausting the polling budget"
    );
    metrics::describe_histogram!(
        "colorize_job_seconds",
        "Time from the first status query to the terminal outcome"
    );
}
