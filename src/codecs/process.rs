// src/codecs/process.rs
//
// Spawning external encoders. Arguments always go through an argv vector,
// never a shell, so file names and paths cannot be interpreted.

use crate::error::{ConvertError, Result, Tool};
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Longest stderr tail kept in a `ProcessFailed` error.
const STDERR_TAIL: usize = 2048;

/// Captured result of a successful tool run.
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Run `program` with `args`, piping `input` into stdin.
///
/// Completion is a single event: the child exited and both output pipes
/// closed. A non-zero exit is an error carrying the stderr tail. When
/// `timeout` elapses the child is killed and `ProcessTimeout` returned.
pub async fn run_tool(
    tool: Tool,
    program: &Path,
    args: &[OsString],
    input: Vec<u8>,
    timeout: Option<Duration>,
) -> Result<ToolOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(tool = %tool, ?command, input_bytes = input.len(), "spawning external tool");

    let mut child = command
        .spawn()
        .map_err(|e| ConvertError::spawn_failed(tool, e))?;

    let mut stdin = child.stdin.take().ok_or_else(|| {
        ConvertError::tool_io(
            tool,
            io::Error::new(io::ErrorKind::BrokenPipe, "child stdin unavailable"),
        )
    })?;

    let feed = async move {
        stdin.write_all(&input).await?;
        stdin.shutdown().await
        // stdin dropped here so the child sees EOF
    };

    let run = async move { tokio::join!(feed, child.wait_with_output()) };

    // Dropping `run` on timeout drops the child, which kills it.
    let (fed, waited) = match timeout {
        Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
            tracing::warn!(tool = %tool, timeout_ms = limit.as_millis() as u64, "external tool timed out");
            ConvertError::process_timeout(tool, limit.as_millis() as u64)
        })?,
        None => run.await,
    };

    let output = waited.map_err(|e| ConvertError::tool_io(tool, e))?;
    let stderr = stderr_tail(&output.stderr);

    if !output.status.success() {
        return Err(ConvertError::process_failed(tool, output.status.code(), stderr));
    }

    match fed {
        Ok(()) => {}
        // The tool may legitimately stop reading once it has what it needs
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!(tool = %tool, "tool closed stdin early");
        }
        Err(e) => return Err(ConvertError::tool_io(tool, e)),
    }

    tracing::debug!(
        tool = %tool,
        stdout_bytes = output.stdout.len(),
        "external tool finished"
    );

    Ok(ToolOutput {
        stdout: output.stdout,
        stderr,
    })
}

fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
