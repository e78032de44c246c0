//! Per-client stream session
//!
//! One session owns one decoder subprocess and relays its output to one
//! client. Decoder chunks, decoder exit, client disconnect, and the
//! first-frame timer all feed a single consumer loop operating on an
//! explicit state value, so teardown is a one-way transition no matter
//! which signal arrives first.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::assembler::FrameAssembler;
use super::decoder::{DecoderEvent, DecoderHandle, DecoderProcess, Transport};
use super::multipart;
use crate::config::DecoderConfig;
use crate::error::Result;

/// Capacity of the per-client response channel; a slow client applies
/// backpressure here instead of growing memory.
pub const RESPONSE_CHANNEL_CAPACITY: usize = 32;

/// Sender half of the client response channel. Items are whole multipart
/// segments, ready to stream as an HTTP body.
pub type FrameSender = mpsc::Sender<std::io::Result<Bytes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Starting,
    Streaming,
    Terminated,
}

/// Which signal ended the session. Logging only; teardown is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    ClientDisconnected,
    DecoderExited,
    NoFrames,
}

pub struct StreamSession {
    events: mpsc::Receiver<DecoderEvent>,
    relay: RelayState,
}

/// Everything the event handlers mutate, kept apart from the event
/// sources they react to.
struct RelayState {
    decoder_handle: DecoderHandle,
    assembler: FrameAssembler,
    response_tx: FrameSender,
    first_frame_timeout: Duration,
    state: SessionState,
    frames_received: u64,
}

impl StreamSession {
    /// Launch the decoder and wire up a session relaying to `response_tx`.
    pub fn start(
        config: &DecoderConfig,
        source_url: &str,
        transport: Transport,
        response_tx: FrameSender,
    ) -> Result<Self> {
        let decoder = DecoderProcess::spawn(config, source_url, transport)?;
        let decoder_handle = decoder.handle();

        Ok(Self {
            events: decoder.into_events(),
            relay: RelayState {
                decoder_handle,
                assembler: FrameAssembler::new(),
                response_tx,
                first_frame_timeout: Duration::from_secs(config.first_frame_timeout_secs),
                state: SessionState::Starting,
                frames_received: 0,
            },
        })
    }

    /// Drive the session until it terminates. Always terminates the
    /// decoder on the way out, whichever side went away first.
    pub async fn run(self) {
        let Self {
            mut events,
            mut relay,
        } = self;

        let client = relay.response_tx.clone();
        let timer = tokio::time::sleep(relay.first_frame_timeout);
        tokio::pin!(timer);
        let mut timer_armed = true;

        while relay.state != SessionState::Terminated {
            tokio::select! {
                event = events.recv() => match event {
                    Some(DecoderEvent::Stdout(chunk)) => {
                        if !relay.relay_chunk(&chunk).await {
                            relay.terminate(StopReason::ClientDisconnected);
                        }
                    }
                    Some(DecoderEvent::Exited(_)) | None => {
                        // Exit classification is logged by the supervisor.
                        relay.terminate(StopReason::DecoderExited);
                    }
                },
                () = client.closed() => {
                    relay.terminate(StopReason::ClientDisconnected);
                }
                () = &mut timer, if timer_armed => {
                    timer_armed = false;
                    if relay.frames_received == 0 {
                        relay.terminate(StopReason::NoFrames);
                    } else {
                        debug!(
                            frames = relay.frames_received,
                            "frames flowing within the startup window"
                        );
                    }
                }
            }
        }
    }
}

impl RelayState {
    /// Feed a chunk through the assembler and emit every completed frame.
    /// Returns false when the client sink is gone.
    async fn relay_chunk(&mut self, chunk: &[u8]) -> bool {
        for frame in self.assembler.feed(chunk) {
            self.frames_received += 1;
            if self.frames_received == 1 {
                info!("first complete frame received");
                self.state = SessionState::Streaming;
            }

            let part = multipart::encode_part(&frame);
            if self.response_tx.send(Ok(part)).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Idempotent transition into `Terminated`: the first trigger wins,
    /// later ones are no-ops.
    fn terminate(&mut self, reason: StopReason) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.state = SessionState::Terminated;

        match reason {
            StopReason::ClientDisconnected => {
                info!(
                    frames = self.frames_received,
                    "client disconnected, stopping stream"
                );
            }
            StopReason::DecoderExited => {
                debug!(frames = self.frames_received, "decoder exited, ending stream");
            }
            StopReason::NoFrames => {
                error!(
                    timeout_secs = self.first_frame_timeout.as_secs(),
                    "no frames received, terminating decoder"
                );
            }
        }

        if self.assembler.frames_dropped() > 0 {
            debug!(
                dropped = self.assembler.frames_dropped(),
                "partial frames were discarded during this session"
            );
        }

        self.decoder_handle.terminate();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// A complete two-marker JPEG stand-in, octal-escaped for printf.
    const STUB_FRAME: &[u8] = &[0xFF, 0xD8, b'j', b'p', b'e', b'g', 0xFF, 0xD9];
    const STUB_FRAME_PRINTF: &str = r"\377\330jpeg\377\331";

    fn stub_decoder(dir: &tempfile::TempDir, body: &str) -> DecoderConfig {
        let path = dir.path().join("fake-decoder");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        DecoderConfig {
            binary: path.to_string_lossy().into_owned(),
            first_frame_timeout_secs: 1,
        }
    }

    async fn run_with_timeout(session: StreamSession) {
        tokio::time::timeout(Duration::from_secs(10), session.run())
            .await
            .expect("session did not terminate");
    }

    #[tokio::test]
    async fn test_zero_frames_times_out_and_closes_response() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_decoder(&dir, "exec sleep 30");

        let (tx, mut rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let session =
            StreamSession::start(&config, "rtsp://127.0.0.1/s", Transport::Tcp, tx).unwrap();

        run_with_timeout(session).await;

        // No frames were emitted and the response channel is closed.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_frames_relayed_as_multipart_segments() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_decoder(
            &dir,
            &format!("printf '{STUB_FRAME_PRINTF}'; exec sleep 30"),
        );

        let (tx, mut rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let session =
            StreamSession::start(&config, "rtsp://127.0.0.1/s", Transport::Tcp, tx).unwrap();
        let driver = tokio::spawn(session.run());

        let part = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no multipart segment emitted")
            .expect("response channel closed early")
            .expect("segment was an error");

        let expected_headers = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            multipart::BOUNDARY,
            STUB_FRAME.len()
        );
        assert!(part.starts_with(expected_headers.as_bytes()));
        let body_start = expected_headers.len();
        assert_eq!(&part[body_start..body_start + STUB_FRAME.len()], STUB_FRAME);

        // Client goes away; the session must wind down on its own.
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), driver)
            .await
            .expect("session did not react to client disconnect")
            .unwrap();
    }

    #[tokio::test]
    async fn test_decoder_exit_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        // Emits one frame and exits immediately.
        let config = stub_decoder(&dir, &format!("printf '{STUB_FRAME_PRINTF}'"));

        let (tx, mut rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let session =
            StreamSession::start(&config, "rtsp://127.0.0.1/s", Transport::Tcp, tx).unwrap();

        run_with_timeout(session).await;

        // The relayed frame is still delivered, then the channel closes.
        let part = rx.recv().await.expect("frame segment missing").unwrap();
        assert!(part.starts_with(format!("--{}", multipart::BOUNDARY).as_bytes()));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_racing_decoder_exit_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_decoder(&dir, "exit 0");

        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let session =
            StreamSession::start(&config, "rtsp://127.0.0.1/s", Transport::Tcp, tx).unwrap();

        // Client is already gone when the decoder exits; both teardown
        // triggers fire and the session must absorb them without effect.
        drop(rx);
        run_with_timeout(session).await;
    }
}
