use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

/// Fixed stem for the downloaded file inside the run's temp directory.
const OUTPUT_STEM: &str = "downloaded_audio";
/// How much of yt-dlp's stderr to keep in an error message.
const STDERR_TAIL_LINES: usize = 12;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no URL given")]
    EmptyUrl,
    #[error(
        "`{tool}` was not found on PATH; install yt-dlp and make sure it is reachable"
    )]
    ToolMissing { tool: String },
    #[error(
        "{tool} exited with {status}; the video may be private, removed, \
         region-locked or age-restricted\n{stderr_tail}"
    )]
    ToolFailed {
        tool: String,
        status: std::process::ExitStatus,
        stderr_tail: String,
    },
    #[error("download finished but no WAV file appeared under {dir}")]
    NoOutput { dir: PathBuf },
    #[error("I/O error while running the downloader: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the yt-dlp invocation for `url`, writing 16 kHz mono WAV into `dir`.
fn download_args(dir: &Path, url: &str) -> Vec<String> {
    let template = dir.join(format!("{OUTPUT_STEM}.%(ext)s"));
    vec![
        "--no-check-certificate".into(),
        "-x".into(),
        "--audio-format".into(),
        "wav".into(),
        // whisper wants 16 kHz mono; let yt-dlp's ffmpeg step produce it
        "--postprocessor-args".into(),
        "ffmpeg:-ar 16000 -ac 1".into(),
        "-o".into(),
        template.to_string_lossy().into_owned(),
        "--no-playlist".into(),
        "--newline".into(),
        url.into(),
    ]
}

/// Downloads the audio track of `url` into `dir` and returns the WAV path.
///
/// yt-dlp runs as a subprocess with piped output; every line it prints is
/// forwarded to `on_line` so the caller can surface progress. The caller owns
/// `dir` and its cleanup.
pub fn fetch_audio(
    tool: &str,
    url: &str,
    dir: &Path,
    mut on_line: impl FnMut(&str),
) -> Result<PathBuf, DownloadError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(DownloadError::EmptyUrl);
    }

    let args = download_args(dir, url);
    tracing::info!("running {} {}", tool, args.join(" "));

    let mut child = Command::new(tool)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => DownloadError::ToolMissing {
                tool: tool.to_string(),
            },
            _ => DownloadError::Io(err),
        })?;

    // yt-dlp writes progress to stdout (with --newline) and errors to stderr.
    // Drain stderr on a helper thread so neither pipe can fill up and stall
    // the child while we stream the other one.
    let stderr_reader = child.stderr.take().map(|stderr| {
        std::thread::spawn(move || {
            BufReader::new(stderr)
                .lines()
                .map_while(Result::ok)
                .collect::<Vec<String>>()
        })
    });

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            on_line(&line);
        }
    }

    let stderr_lines = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    for line in &stderr_lines {
        on_line(line);
    }

    let status = child.wait()?;
    if !status.success() {
        let tail_start = stderr_lines.len().saturating_sub(STDERR_TAIL_LINES);
        return Err(DownloadError::ToolFailed {
            tool: tool.to_string(),
            status,
            stderr_tail: stderr_lines[tail_start..].join("\n"),
        });
    }

    let expected = dir.join(format!("{OUTPUT_STEM}.wav"));
    if expected.exists() {
        return Ok(expected);
    }

    // The extension can differ when yt-dlp picks an unexpected container
    // name; accept any WAV with our stem.
    let fallback = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.extension().is_some_and(|ext| ext == "wav")
                && path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(|stem| stem.starts_with(OUTPUT_STEM))
        });

    fallback.ok_or_else(|| DownloadError::NoOutput {
        dir: dir.to_path_buf(),
    })
}

/// Runs `<program> --version` and returns the first line of output, or `None`
/// when the tool is missing. Used for startup diagnostics.
pub fn probe_tool(program: &str) -> Option<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Some(text.lines().next().unwrap_or_default().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_request_wav_at_16k_mono() {
        let args = download_args(Path::new("/tmp/run"), "https://example.com/v");
        assert!(args.contains(&"--audio-format".to_string()));
        assert!(args.contains(&"wav".to_string()));
        assert!(args.contains(&"ffmpeg:-ar 16000 -ac 1".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/v");
    }

    #[test]
    fn empty_url_is_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetch_audio("yt-dlp", "   ", dir.path(), |_| {}).unwrap_err();
        assert!(matches!(err, DownloadError::EmptyUrl));
    }

    #[test]
    fn missing_tool_maps_to_tool_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetch_audio(
            "definitely-not-a-real-downloader",
            "https://example.com/v",
            dir.path(),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, DownloadError::ToolMissing { .. }));
    }

    #[test]
    fn failing_tool_reports_status_and_stderr() {
        // `false` exits nonzero without output on any unix host.
        let dir = tempfile::tempdir().unwrap();
        let err = fetch_audio("false", "https://example.com/v", dir.path(), |_| {});
        match err {
            Err(DownloadError::ToolFailed { status, .. }) => assert!(!status.success()),
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[test]
    fn probe_missing_tool_is_none() {
        assert!(probe_tool("definitely-not-a-real-downloader").is_none());
    }
}
