//! Shell command execution with live terminal streaming.
//!
//! [`run_command`] runs `sh -c <command>`, forwards stdout and stderr chunks
//! to a [`TerminalSink`] as soon as they arrive, and accumulates them in
//! arrival order into a [`RawOutput`]. Streaming to the sink is never gated
//! by the output pipeline, which only sees the accumulated text once the
//! command has finished.
//!
//! On timeout the child is killed and whatever was captured so far is
//! returned with `interrupted = true`.

use crate::output::RawOutput;
use futures::future::join3;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Receives output chunks while a command runs.
pub trait TerminalSink: Send {
    fn write_chunk(&mut self, stream: StreamKind, text: &str);
}

/// Writes chunks to this process's stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl TerminalSink for StdioSink {
    fn write_chunk(&mut self, stream: StreamKind, text: &str) {
        // Terminal write failures (closed pipe) must not abort the command.
        let _ = match stream {
            StreamKind::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|_| out.flush())
            }
            StreamKind::Stderr => {
                let mut err = std::io::stderr().lock();
                err.write_all(text.as_bytes()).and_then(|_| err.flush())
            }
        };
    }
}

/// Discards chunks. For callers that only want the accumulated output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TerminalSink for NullSink {
    fn write_chunk(&mut self, _stream: StreamKind, _text: &str) {}
}

/// Execution options for [`run_command`].
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub workdir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Incremental UTF-8 decoder. Multi-byte sequences split across reads are
/// held back until complete; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push('\u{fffd}');
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete trailing sequence: wait for more bytes.
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

type Chunk = (StreamKind, String);

async fn pump<R: AsyncRead + Unpin>(
    reader: Option<R>,
    kind: StreamKind,
    tx: mpsc::UnboundedSender<Chunk>,
) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut decoder = Utf8Decoder::default();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                if !text.is_empty() && tx.send((kind, text)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(?kind, error = %e, "Failed reading command output");
                break;
            }
        }
    }
    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = tx.send((kind, rest));
    }
}

/// Run `command` through `sh -c`, streaming output to `sink`.
///
/// Returns an error only when the shell cannot be spawned. A non-zero exit
/// status is reported in [`RawOutput::exit_code`], not as an error.
pub async fn run_command(
    command: &str,
    options: &ExecOptions,
    sink: &mut dyn TerminalSink,
) -> std::io::Result<RawOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &options.workdir {
        cmd.current_dir(dir);
    }
    let mut child = cmd.spawn()?;
    debug!(command, pid = ?child.id(), "Spawned command");

    let (tx, mut rx) = mpsc::unbounded_channel::<Chunk>();
    let stdout = pump(child.stdout.take(), StreamKind::Stdout, tx.clone());
    let stderr = pump(child.stderr.take(), StreamKind::Stderr, tx);

    let mut output = String::new();
    let mut forward = |(kind, text): Chunk, output: &mut String| {
        sink.write_chunk(kind, &text);
        output.push_str(&text);
    };

    let completed = {
        let drain = async {
            while let Some(chunk) = rx.recv().await {
                forward(chunk, &mut output);
            }
        };
        let run = async {
            join3(stdout, stderr, drain).await;
            child.wait().await
        };
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.ok(),
            None => Some(run.await),
        }
    };

    // Chunks already read before a timeout still belong to the output.
    while let Ok(chunk) = rx.try_recv() {
        forward(chunk, &mut output);
    }

    match completed {
        Some(status) => {
            let status = status?;
            debug!(command, code = ?status.code(), bytes = output.len(), "Command finished");
            Ok(RawOutput {
                command: command.to_string(),
                output,
                exit_code: status.code(),
                interrupted: false,
            })
        }
        None => {
            warn!(command, timeout = ?options.timeout, "Command timed out; killing");
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Kill after timeout failed");
            }
            Ok(RawOutput {
                command: command.to_string(),
                output,
                exit_code: None,
                interrupted: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        chunks: Vec<(StreamKind, String)>,
    }

    impl TerminalSink for RecordingSink {
        fn write_chunk(&mut self, stream: StreamKind, text: &str) {
            self.chunks.push((stream, text.to_string()));
        }
    }

    impl RecordingSink {
        fn text(&self, kind: StreamKind) -> String {
            self.chunks
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, t)| t.as_str())
                .collect()
        }
    }

    #[test]
    fn decoder_holds_back_split_sequences() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "héllo".as_bytes();
        // Split inside the two-byte 'é'.
        assert_eq!(decoder.push(&bytes[..2]), "h");
        assert_eq!(decoder.push(&bytes[2..]), "éllo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(&[b'a', 0xff, b'b']), "a\u{fffd}b");
        assert_eq!(decoder.push(&[0xe2, 0x82]), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let mut sink = RecordingSink::default();
        let raw = run_command("echo hello", &ExecOptions::default(), &mut sink)
            .await
            .unwrap();
        assert_eq!(raw.output, "hello\n");
        assert_eq!(raw.exit_code, Some(0));
        assert!(raw.success());
        assert_eq!(sink.text(StreamKind::Stdout), "hello\n");
    }

    #[tokio::test]
    async fn captures_stderr_and_failure() {
        let mut sink = RecordingSink::default();
        let raw = run_command("echo oops >&2; exit 3", &ExecOptions::default(), &mut sink)
            .await
            .unwrap();
        assert_eq!(raw.output, "oops\n");
        assert_eq!(raw.exit_code, Some(3));
        assert_eq!(sink.text(StreamKind::Stderr), "oops\n");
    }

    #[tokio::test]
    async fn timeout_keeps_partial_output() {
        let options = ExecOptions::default().timeout(Duration::from_millis(500));
        let mut sink = NullSink;
        let raw = run_command("echo before; sleep 5; echo after", &options, &mut sink)
            .await
            .unwrap();
        assert!(raw.interrupted);
        assert_eq!(raw.exit_code, None);
        assert_eq!(raw.output, "before\n");
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let raw = run_command("printf 'a\\377b'", &ExecOptions::default(), &mut NullSink)
            .await
            .unwrap();
        assert_eq!(raw.output, "a\u{fffd}b");
    }

    #[tokio::test]
    async fn runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let options = ExecOptions::default().workdir(dir.path());
        let raw = run_command("ls", &options, &mut NullSink).await.unwrap();
        assert!(raw.output.contains("marker.txt"));
    }
}
