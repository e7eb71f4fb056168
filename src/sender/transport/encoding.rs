//! Newline-delimited JSON framing shared by the socket transports.

use crate::domain::LogRecord;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

/// Encodes each record as one JSON line and groups the lines into frames.
///
/// With a `packet_limit`, a frame is cut before the line that would push it
/// over the limit, so every frame fits one datagram unless a single line is
/// larger than the limit on its own. Without a limit everything lands in one
/// frame. Records that fail to serialize are skipped.
pub fn encode_json_lines(records: &[LogRecord], packet_limit: Option<usize>) -> Vec<Bytes> {
    let mut frames = Vec::new();
    let mut buf = BytesMut::with_capacity(packet_limit.unwrap_or(4096));

    for record in records {
        let line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(e) => {
                debug!("Skipping record of '{}' that failed to encode: {}", record.name, e);
                continue;
            }
        };

        if let Some(limit) = packet_limit
            && !buf.is_empty()
            && buf.len() + line.len() + 1 > limit
        {
            frames.push(buf.split().freeze());
        }

        buf.put_slice(&line);
        buf.put_u8(b'\n');
    }

    if !buf.is_empty() {
        frames.push(buf.freeze());
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize, data: &str) -> Vec<LogRecord> {
        (0..n)
            .map(|i| LogRecord::new(format!("test{i}"), data))
            .collect()
    }

    #[test]
    fn test_unlimited_encoding_is_one_frame() {
        let frames = encode_json_lines(&records(100, "x"), None);
        assert_eq!(frames.len(), 1);

        let text = std::str::from_utf8(&frames[0]).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 100);
        for (i, line) in lines.iter().enumerate() {
            let record: LogRecord = serde_json::from_str(line).unwrap();
            assert_eq!(record.name, format!("test{i}"));
        }
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_packet_limit_splits_frames() {
        let frames = encode_json_lines(&records(30, &"demo".repeat(20)), Some(1420));
        assert!(frames.len() > 1);
        for frame in &frames {
            assert!(frame.len() <= 1420, "frame of {} bytes", frame.len());
            assert_eq!(frame.last(), Some(&b'\n'));
        }

        let total_lines: usize = frames
            .iter()
            .map(|f| f.iter().filter(|b| **b == b'\n').count())
            .sum();
        assert_eq!(total_lines, 30);
    }

    #[test]
    fn test_oversized_record_travels_alone() {
        let mut batch = records(1, "small");
        batch.push(LogRecord::new("big", "demo".repeat(500)));
        batch.push(LogRecord::new("after", "small"));

        let frames = encode_json_lines(&batch, Some(1420));
        assert_eq!(frames.len(), 3);
        assert!(frames[1].len() > 1420);
    }

    #[test]
    fn test_empty_batch_yields_no_frames() {
        assert!(encode_json_lines(&[], None).is_empty());
        assert!(encode_json_lines(&[], Some(1420)).is_empty());
    }
}
