//! Multipart segment framing for MJPEG streaming
//!
//! Each complete JPEG frame becomes one `multipart/x-mixed-replace` part;
//! the whole part is produced as a single buffer so it reaches the client
//! socket as one write unit.

use bytes::{BufMut, Bytes, BytesMut};

/// Boundary token separating parts in the multipart body.
pub const BOUNDARY: &str = "ffmpeg_mjpeg_boundary";

/// `Content-Type` header value for the streaming response.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=ffmpeg_mjpeg_boundary";

/// Encode one JPEG frame as a complete multipart segment: boundary line,
/// part headers, blank line, the frame bytes verbatim, trailing CRLF.
#[must_use]
pub fn encode_part(frame: &[u8]) -> Bytes {
    let headers = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );

    let mut part = BytesMut::with_capacity(headers.len() + frame.len() + 2);
    part.put_slice(headers.as_bytes());
    part.put_slice(frame);
    part.put_slice(b"\r\n");
    part.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_layout() {
        let frame = [0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9];
        let part = encode_part(&frame);

        let expected_prefix = format!(
            "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.len()
        );
        assert!(part.starts_with(expected_prefix.as_bytes()));
        assert!(part.ends_with(b"\r\n"));
    }

    #[test]
    fn test_declared_length_matches_body() {
        let frame = vec![0xAB; 1234];
        let part = encode_part(&frame);

        let headers_end = part
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("part headers terminated")
            + 4;
        let body = &part[headers_end..part.len() - 2];

        assert_eq!(body.len(), frame.len());
        assert_eq!(body, &frame[..]);

        let headers = std::str::from_utf8(&part[..headers_end]).unwrap();
        let declared = headers
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .expect("content-length header present");
        assert_eq!(declared, frame.len());
    }

    #[test]
    fn test_frame_bytes_not_reencoded() {
        // Bytes that look like CRLF or boundary text pass through verbatim.
        let mut frame = b"\r\n--".to_vec();
        frame.extend_from_slice(BOUNDARY.as_bytes());
        frame.extend_from_slice(b"\r\n");
        let part = encode_part(&frame);

        let headers_end = part.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(&part[headers_end..part.len() - 2], &frame[..]);
    }
}
