//! Decoder subprocess supervision
//!
//! Launches the external decoder (ffmpeg) with a fixed argument template,
//! forwards its stdout as ordered chunk events followed by a single exit
//! event, aggregates its stderr diagnostics, and supports graceful
//! termination.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::config::DecoderConfig;
use crate::error::{Error, Result};

/// Fixed JPEG quality passed to the decoder (1-31, lower is better).
const JPEG_QUALITY: u32 = 5;

/// Fixed output frame rate requested from the decoder.
const FRAME_RATE: u32 = 20;

/// Capacity of the event channel; sends apply backpressure to stdout reads.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// stderr lines containing any of these are surfaced immediately.
const STDERR_ALERT_KEYWORDS: [&str; 4] = ["Error", "error", "Failed", "Opening"];

/// RTSP transport mode passed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

impl Transport {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    /// Map a request parameter to a transport; anything but "udp" is TCP.
    #[must_use]
    pub fn from_query(value: &str) -> Self {
        if value == "udp" {
            Self::Udp
        } else {
            Self::Tcp
        }
    }
}

/// One event from the decoder subprocess. Delivered strictly in order:
/// any number of `Stdout` chunks followed by exactly one `Exited`.
#[derive(Debug)]
pub enum DecoderEvent {
    Stdout(Bytes),
    Exited(ExitStatus),
}

/// Handle for signalling the decoder; cheap to clone, safe to use after
/// the process has already exited.
#[derive(Debug, Clone)]
pub struct DecoderHandle {
    term: Arc<Notify>,
    terminated: Arc<AtomicBool>,
}

impl DecoderHandle {
    /// Request graceful termination. Only the first call has any effect;
    /// later calls are no-ops.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            self.term.notify_one();
        }
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// A running decoder subprocess and its event stream.
#[derive(Debug)]
pub struct DecoderProcess {
    pid: Option<u32>,
    events: mpsc::Receiver<DecoderEvent>,
    handle: DecoderHandle,
}

impl DecoderProcess {
    /// Launch the decoder for `source_url`. The argument template is fixed;
    /// only the executable path comes from configuration.
    pub fn spawn(
        config: &DecoderConfig,
        source_url: &str,
        transport: Transport,
    ) -> Result<Self> {
        let args = build_args(source_url, transport);
        debug!(binary = %config.binary, ?args, "launching decoder");

        let mut child = Command::new(&config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::DecoderLaunch {
                binary: config.binary.clone(),
                source: e,
            })?;

        let pid = child.id();
        info!(pid, "decoder process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("decoder stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("decoder stderr not captured".to_string()))?;

        let handle = DecoderHandle {
            term: Arc::new(Notify::new()),
            terminated: Arc::new(AtomicBool::new(false)),
        };

        tokio::spawn(log_stderr(stderr, pid));

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(supervise(child, stdout, handle.clone(), events_tx));

        Ok(Self {
            pid,
            events: events_rx,
            handle,
        })
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[must_use]
    pub fn handle(&self) -> DecoderHandle {
        self.handle.clone()
    }

    /// Consume the wrapper, keeping only the event stream. The subprocess
    /// lives on under its supervisor task.
    #[must_use]
    pub fn into_events(self) -> mpsc::Receiver<DecoderEvent> {
        self.events
    }
}

fn build_args(source_url: &str, transport: Transport) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
        "-rtsp_transport".to_string(),
        transport.as_str().to_string(),
        "-i".to_string(),
        source_url.to_string(),
        "-an".to_string(),
        "-f".to_string(),
        "image2pipe".to_string(),
        "-vcodec".to_string(),
        "mjpeg".to_string(),
        "-q:v".to_string(),
        JPEG_QUALITY.to_string(),
        "-r".to_string(),
        FRAME_RATE.to_string(),
        "-".to_string(),
    ]
}

/// Forward stdout chunks and the final exit status as ordered events,
/// honoring termination requests at every await point.
async fn supervise(
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    handle: DecoderHandle,
    events_tx: mpsc::Sender<DecoderEvent>,
) {
    let mut stdout = ReaderStream::new(stdout);
    let mut signalled = false;

    'read: loop {
        tokio::select! {
            () = handle.term.notified(), if !signalled => {
                signalled = true;
                signal_term(&mut child);
            }
            chunk = stdout.next() => match chunk {
                Some(Ok(chunk)) => {
                    tokio::select! {
                        () = handle.term.notified(), if !signalled => {
                            signalled = true;
                            signal_term(&mut child);
                        }
                        sent = events_tx.send(DecoderEvent::Stdout(chunk)) => {
                            if sent.is_err() {
                                // Session is gone; stop reading.
                                break 'read;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!(error = %e, "decoder stdout read failed");
                    break 'read;
                }
                None => break 'read,
            },
        }
    }

    // The session may have requested termination after we stopped
    // listening for it; honor that before reaping.
    if handle.is_terminated() && !signalled {
        signal_term(&mut child);
    }

    match child.wait().await {
        Ok(status) => {
            log_exit(status);
            let _ = events_tx.send(DecoderEvent::Exited(status)).await;
        }
        Err(e) => error!(error = %e, "failed to reap decoder process"),
    }
}

/// Send the graceful termination signal (SIGTERM on unix).
fn signal_term(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => debug!(pid, "sent SIGTERM to decoder"),
                Err(e) => debug!(pid, error = %e, "SIGTERM failed, process likely gone"),
            }
            return;
        }
    }

    // Already reaped, or no graceful signal on this platform.
    let _ = child.start_kill();
}

/// Classify and log the decoder's exit, mirroring the states a source
/// failure, an operator stop, and a clean end of stream produce.
fn log_exit(status: ExitStatus) {
    match status.code() {
        Some(0) => info!("decoder process completed"),
        Some(1) => error!("decoder exited with code 1: could not connect to RTSP stream"),
        Some(code) => error!(code, "decoder exited abnormally"),
        None => info!("decoder terminated by signal"),
    }
}

/// Aggregate stderr diagnostics, surfacing alert lines immediately.
async fn log_stderr(stderr: tokio::process::ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    let mut diagnostics = String::new();

    while let Ok(Some(line)) = lines.next_line().await {
        if STDERR_ALERT_KEYWORDS.iter().any(|k| line.contains(k)) {
            warn!(pid, "decoder: {}", line.trim());
        }
        diagnostics.push_str(&line);
        diagnostics.push('\n');
    }

    if !diagnostics.is_empty() {
        debug!(pid, "decoder diagnostics:\n{diagnostics}");
    }
}
