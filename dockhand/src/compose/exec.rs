//! Runtime subprocess execution in buffered, streamed and piped modes

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::compose::command::ComposeCommand;
use crate::compose::{CommandOutput, ExecMode};
use crate::errors::DockhandError;
use crate::models::stream::StreamMessage;

/// Run `command` attached according to `mode`
pub async fn execute(command: &ComposeCommand, mode: ExecMode) -> Result<CommandOutput, DockhandError> {
    debug!("Running {}", command);
    match mode {
        ExecMode::Buffered => run_buffered(command).await,
        ExecMode::Streamed(tx) => run_streamed(command, tx).await.map(|_| CommandOutput::default()),
        ExecMode::Piped => run_piped(command).await.map(|_| CommandOutput::default()),
    }
}

fn spawn_error(command: &ComposeCommand, e: std::io::Error) -> DockhandError {
    DockhandError::RuntimeError(format!("Failed to run {}: {}", command, e))
}

fn exit_code(status: &ExitStatus) -> String {
    status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

fn exit_error(command: &ComposeCommand, status: &ExitStatus, stderr: &str) -> DockhandError {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        DockhandError::RuntimeError(format!(
            "compose {} exited with status {}",
            command.subcommand(),
            exit_code(status)
        ))
    } else {
        DockhandError::RuntimeError(format!(
            "compose {} exited with status {}: {}",
            command.subcommand(),
            exit_code(status),
            stderr
        ))
    }
}

async fn run_buffered(command: &ComposeCommand) -> Result<CommandOutput, DockhandError> {
    let output = command
        .to_command()
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| spawn_error(command, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(exit_error(command, &output.status, &stderr));
    }
    Ok(CommandOutput { stdout, stderr })
}

/// Forward each line of `reader` to `tx`, built by `wrap`. Invalid UTF-8 is
/// replaced rather than ending the stream.
async fn forward_lines<R>(
    reader: R,
    tx: mpsc::Sender<StreamMessage>,
    wrap: fn(String) -> StreamMessage,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Output reader stopped: {}", e);
                break;
            }
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        // keep draining even if nobody listens so the child never blocks on a full pipe
        let _ = tx.send(wrap(line)).await;
    }
}

async fn run_streamed(
    command: &ComposeCommand,
    tx: mpsc::Sender<StreamMessage>,
) -> Result<(), DockhandError> {
    let mut child = command
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(command, e))?;

    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward_lines(out, tx.clone(), |line| StreamMessage::stdout(line))));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward_lines(err, tx, |line| StreamMessage::stderr(line))));

    for task in [stdout_task, stderr_task].into_iter().flatten() {
        task.await.map_err(|e| {
            DockhandError::Internal(format!("Output reader for {} failed: {}", command, e))
        })?;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| spawn_error(command, e))?;
    if !status.success() {
        return Err(exit_error(command, &status, ""));
    }
    Ok(())
}

async fn run_piped(command: &ComposeCommand) -> Result<(), DockhandError> {
    let status = command
        .to_command()
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| spawn_error(command, e))?;

    if !status.success() {
        return Err(exit_error(command, &status, ""));
    }
    Ok(())
}
