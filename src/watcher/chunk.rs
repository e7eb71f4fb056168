//! Chunked-transfer framing for live-tail subscribers.

use crate::domain::LogRecord;
use bytes::Bytes;

/// Frames a payload as one HTTP/1.1 chunk whose body is the payload followed
/// by CRLF, so every record arrives as its own line.
pub fn frame(payload: &str) -> Bytes {
    Bytes::from(format!("{:X}\r\n{}\r\n\r\n", payload.len() + 2, payload))
}

/// Serializes a record to JSON and frames it.
pub fn encode_chunk(record: &LogRecord) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(record)?;
    Ok(frame(&json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_declares_payload_plus_crlf() {
        let chunk = frame("{\"a\":1}");
        assert_eq!(&chunk[..], b"9\r\n{\"a\":1}\r\n\r\n");
    }

    #[test]
    fn test_length_is_uppercase_hex() {
        let payload = "x".repeat(250);
        let chunk = frame(&payload);
        assert!(chunk.starts_with(b"FC\r\n"));
        assert!(chunk.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn test_encode_chunk_carries_record_json() {
        let record = LogRecord::new("web", "hello").with_stream_id("abc");
        let chunk = encode_chunk(&record).unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();

        let (size, rest) = text.split_once("\r\n").unwrap();
        let json = rest.strip_suffix("\r\n\r\n").unwrap();
        assert_eq!(usize::from_str_radix(size, 16).unwrap(), json.len() + 2);

        let decoded: LogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(decoded, record);
    }
}
