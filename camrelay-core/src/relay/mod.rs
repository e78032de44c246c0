//! The RTSP-to-MJPEG relay pipeline
//!
//! One pipeline instance exists per client connection: a decoder
//! subprocess produces a raw concatenated-JPEG byte stream, the
//! assembler cuts it into complete frames, and each frame is sent to
//! the client as one multipart segment.

pub mod assembler;
pub mod decoder;
pub mod multipart;
pub mod session;

pub use assembler::FrameAssembler;
pub use decoder::{DecoderEvent, DecoderHandle, DecoderProcess, Transport};
pub use session::StreamSession;
