//! dub - command-line client for the dubbing service
//!
//! Submits jobs, watches their progress and fetches the dubbed video.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dub_common::api::{JobOptions, OutputFormat, StatusView, SubmitRequest, VideoQuality};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use dub_client::{DubClient, PollPolicy, RetrySchedule, StatusPoller};

#[derive(Parser, Debug)]
#[command(name = "dub")]
#[command(about = "Client for the video dubbing service")]
#[command(version)]
struct Cli {
    /// Service base URL
    #[arg(long, env = "DUB_URL", default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Disable operation retry
    #[arg(long, env = "DUB_NO_RETRY")]
    no_retry: bool,

    /// Waits between operation retries, in milliseconds
    #[arg(long, value_delimiter = ',', default_value = "1000,2000,4000")]
    retry_delays_ms: Vec<u64>,

    #[command(flatten)]
    poll: PollArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PollArgs {
    /// Status polling interval, in milliseconds
    #[arg(long, default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Consecutive failed status fetches tolerated while watching
    #[arg(long, default_value_t = 3)]
    max_poll_failures: u32,

    /// Give up watching after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a video for dubbing
    Submit {
        /// Source video URL
        source_url: String,

        /// Language to dub into
        #[arg(short, long)]
        target_language: String,

        #[arg(long, value_enum, default_value = "high")]
        quality: QualityArg,

        #[arg(long, value_enum, default_value = "mp4")]
        format: FormatArg,

        /// Keep the original audio as a second track
        #[arg(long)]
        preserve_original: bool,

        /// Record that this job should not be retried by clients
        #[arg(long)]
        no_auto_retry: bool,

        /// Watch the job and download the result to this path
        #[arg(short, long)]
        wait: Option<PathBuf>,
    },

    /// Show the status of a job
    Status { session_id: Uuid },

    /// Follow a job until it finishes
    Watch { session_id: Uuid },

    /// Download the dubbed video of a completed job
    Fetch { session_id: Uuid, destination: PathBuf },

    /// Cancel a running job
    Cancel { session_id: Uuid },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum QualityArg {
    Low,
    Medium,
    High,
    Best,
}

impl From<QualityArg> for VideoQuality {
    fn from(q: QualityArg) -> Self {
        match q {
            QualityArg::Low => VideoQuality::Low,
            QualityArg::Medium => VideoQuality::Medium,
            QualityArg::High => VideoQuality::High,
            QualityArg::Best => VideoQuality::Best,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Mp4,
    Webm,
    Mkv,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Mp4 => OutputFormat::Mp4,
            FormatArg::Webm => OutputFormat::Webm,
            FormatArg::Mkv => OutputFormat::Mkv,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,dub_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let retry = RetrySchedule::new(
        cli.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect(),
    )
    .with_enabled(!cli.no_retry);
    let poller = StatusPoller::new(PollPolicy::new(
        Duration::from_millis(cli.poll.poll_interval_ms),
        cli.poll.max_poll_failures,
    ));
    let timeout = cli.poll.timeout_secs.map(Duration::from_secs);

    match cli.command {
        Command::Submit {
            source_url,
            target_language,
            quality,
            format,
            preserve_original,
            no_auto_retry,
            wait,
        } => {
            let request = SubmitRequest {
                source_url,
                target_language,
                options: JobOptions {
                    quality: quality.into(),
                    format: format.into(),
                    preserve_original,
                    auto_retry: !no_auto_retry,
                },
            };
            // The caller's autoRetry preference also governs this client's own retries
            let retry = retry.clone().with_enabled(retry.enabled && request.options.auto_retry);
            let client = DubClient::new(&cli.url)?.with_retry(retry);

            let accepted = client.submit(&request).await.context("Submission failed")?;
            println!("{}", accepted.session_id);

            if let Some(destination) = wait {
                watch(&client, &poller, accepted.session_id, timeout).await?;
                fetch(&client, accepted.session_id, &destination).await?;
            }
        }
        Command::Status { session_id } => {
            let client = DubClient::new(&cli.url)?.with_retry(retry);
            let view = client.status(session_id).await.context("Status request failed")?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Watch { session_id } => {
            let client = DubClient::new(&cli.url)?.with_retry(retry);
            watch(&client, &poller, session_id, timeout).await?;
        }
        Command::Fetch {
            session_id,
            destination,
        } => {
            let client = DubClient::new(&cli.url)?.with_retry(retry);
            fetch(&client, session_id, &destination).await?;
        }
        Command::Cancel { session_id } => {
            let client = DubClient::new(&cli.url)?.with_retry(retry);
            client.cancel(session_id).await.context("Cancel failed")?;
            println!("cancellation requested for {}", session_id);
        }
    }

    Ok(())
}

async fn watch(
    client: &DubClient,
    poller: &StatusPoller,
    session_id: Uuid,
    timeout: Option<Duration>,
) -> Result<StatusView> {
    let reporter = |view: &StatusView| {
        eprintln!("[{:>3}%] {}", view.progress, view.current_stage);
    };
    let polling = poller.poll_until_terminal(client, session_id, &reporter);

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, polling).await {
            Ok(outcome) => outcome,
            Err(_) => bail!("job {} still running after {:?}", session_id, limit),
        },
        None => polling.await,
    };

    let view = outcome.with_context(|| format!("Job {} did not complete", session_id))?;
    info!(session_id = %session_id, "Job completed");
    Ok(view)
}

async fn fetch(client: &DubClient, session_id: Uuid, destination: &Path) -> Result<()> {
    let bytes = client
        .download_result(session_id, destination)
        .await
        .with_context(|| format!("Failed to download result of {}", session_id))?;
    println!("{} ({} bytes)", destination.display(), bytes);
    Ok(())
}
