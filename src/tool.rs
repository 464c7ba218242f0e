//! External tool invocation
//!
//! Runs a child process with all three standard streams piped and forwards
//! its output line by line while it runs. Output is decoded lossily; only the
//! exit status decides success.

use crate::error::{Error, Result, ToolError};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type OutputFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs external commands and streams their output
#[derive(Clone)]
pub struct ToolRunner {
    cancel: CancellationToken,
    stdin_newline: bool,
    output: Option<OutputFn>,
}

impl std::fmt::Debug for ToolRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRunner")
            .field("stdin_newline", &self.stdin_newline)
            .finish()
    }
}

impl ToolRunner {
    /// Runner that kills the child when `cancel` fires
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            stdin_newline: false,
            output: None,
        }
    }

    /// Write a single newline to the child's stdin right after spawning
    pub fn with_stdin_newline(mut self, enabled: bool) -> Self {
        self.stdin_newline = enabled;
        self
    }

    /// Receive each stdout/stderr line as it is produced
    pub fn with_output(mut self, output: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.output = Some(Arc::new(output));
        self
    }

    /// Run `program` with `args` and wait for it to exit
    ///
    /// A non-zero exit status is a [`ToolError::NonZeroExit`] carrying the full
    /// command line.
    pub async fn run(&self, program: &Path, args: &[String]) -> Result<()> {
        let mut command_line = vec![program.to_string_lossy().into_owned()];
        command_line.extend(args.iter().cloned());
        info!(command = %command_line.join(" "), "running external tool");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::SpawnFailed {
                program: program.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take()
            && self.stdin_newline
        {
            // The child may exit without reading; a broken pipe here is harmless
            if let Err(e) = stdin.write_all(b"\n").await {
                debug!(error = %e, "could not write newline to tool stdin");
            }
        }

        let mut stdout = child.stdout.take().map(OutputLines::new);
        let mut stderr = child.stderr.take().map(OutputLines::new);

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(command = %command_line.join(" "), "cancelling external tool");
                    child.kill().await?;
                    return Err(Error::Cancelled);
                }
                line = next_line(&mut stdout), if stdout.is_some() => match line {
                    Some(line) => self.forward(&line),
                    None => stdout = None,
                },
                line = next_line(&mut stderr), if stderr.is_some() => match line {
                    Some(line) => self.forward(&line),
                    None => stderr = None,
                },
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ToolError::NonZeroExit {
                code: status.code(),
                command: command_line,
            }
            .into());
        }

        debug!("external tool finished");
        Ok(())
    }

    fn forward(&self, line: &str) {
        debug!(line, "tool output");
        if let Some(output) = &self.output {
            output(line);
        }
    }
}

/// Line reader over raw tool output
///
/// Partial lines stay in `buf` between calls, so a read interrupted by another
/// `select!` branch resumes where it stopped.
struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let mut end = self.buf.len();
        while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// Next output line, or `None` once the stream ended or failed
async fn next_line<R: AsyncRead + Unpin>(lines: &mut Option<OutputLines<R>>) -> Option<String> {
    let reader = lines.as_mut()?;
    match reader.next_line().await {
        Ok(line) => line,
        Err(e) => {
            // Output is informational; the exit status still decides the result
            warn!(error = %e, "stopped reading tool output");
            None
        }
    }
}
