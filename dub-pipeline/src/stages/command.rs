//! External tool invocation (yt-dlp, ffmpeg, ffprobe)

use dub_common::Failure;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt kept in failure details
const STDERR_EXCERPT: usize = 2000;

/// Tool run that did not succeed
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program} could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl CommandError {
    /// Stderr of a failed run, empty if the tool never started
    pub fn stderr(&self) -> &str {
        match self {
            CommandError::Exit { stderr, .. } => stderr,
            CommandError::Spawn { .. } => "",
        }
    }
}

impl From<CommandError> for Failure {
    fn from(err: CommandError) -> Self {
        Failure::Other(err.to_string())
    }
}

/// Run `program` with `args`, returning stdout on a zero exit status
///
/// The child is killed if the returned future is dropped, so cancelling a
/// job also stops its tool.
pub async fn run<I, S>(program: &Path, args: I) -> Result<String, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program_name = program.display().to_string();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program_name, "Running external tool");
    let output = command.output().await.map_err(|source| CommandError::Spawn {
        program: program_name.clone(),
        source,
    })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let excerpt_start = stderr.len().saturating_sub(STDERR_EXCERPT);
        let excerpt_start = (excerpt_start..stderr.len())
            .find(|i| stderr.is_char_boundary(*i))
            .unwrap_or(stderr.len());
        Err(CommandError::Exit {
            program: program_name,
            code: output.status.code(),
            stderr: stderr[excerpt_start..].to_string(),
        })
    }
}

/// Probe a media file's duration in seconds with ffprobe
///
/// Returns `None` when the duration cannot be determined; a missing duration
/// never fails a stage.
pub async fn probe_duration(ffprobe: &Path, media: &Path) -> Option<f64> {
    let args = [
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-show_entries"),
        OsStr::new("format=duration"),
        OsStr::new("-of"),
        OsStr::new("csv=p=0"),
        media.as_os_str(),
    ];
    match run(ffprobe, args).await {
        Ok(stdout) => stdout.trim().parse::<f64>().ok().filter(|d| d.is_finite()),
        Err(e) => {
            debug!(error = %e, "Duration probe failed");
            None
        }
    }
}
