//! Framing for log entries.
//!
//! Frame layout:
//! ```text
//! [version: 1 byte][length: 4 bytes LE][payload: N bytes JSON][crc32: 4 bytes LE]
//! ```
//!
//! A log file starts with `MAGIC` followed by the frame version.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current frame version.
pub const FRAME_VERSION: u8 = 1;

/// Magic bytes identifying a ledger log.
pub const MAGIC: [u8; 4] = *b"RMAL";

/// Length of the file header.
pub const HEADER_LEN: u64 = 5;

/// Upper bound on a single payload; anything larger is treated as corruption.
const MAX_PAYLOAD: usize = 64 * 1024 * 1024;

fn invalid(message: String) -> IoError {
    IoError::new(ErrorKind::InvalidData, message)
}

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Serializes `value` into a single frame.
pub fn encode_frame<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let payload =
        serde_json::to_vec(value).map_err(|e| invalid(format!("serialization failed: {e}")))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| invalid(format!("frame of {} bytes is too large", payload.len())))?;

    let mut out = Vec::with_capacity(payload.len() + 9);
    out.push(FRAME_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&checksum(&payload).to_le_bytes());
    Ok(out)
}

/// Reads one frame.
///
/// # Errors
/// - `UnexpectedEof` if the frame is truncated
/// - `InvalidData` on a version mismatch, oversized length, checksum
///   mismatch or undecodable payload
pub fn decode_frame<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut head = [0u8; 5];
    reader.read_exact(&mut head)?;

    if head[0] != FRAME_VERSION {
        return Err(invalid(format!(
            "unsupported frame version {} (expected {FRAME_VERSION})",
            head[0]
        )));
    }

    let len = u32::from_le_bytes([head[1], head[2], head[3], head[4]]) as usize;
    if len > MAX_PAYLOAD {
        return Err(invalid(format!(
            "frame length {len} exceeds maximum {MAX_PAYLOAD}"
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let mut crc = [0u8; 4];
    reader.read_exact(&mut crc)?;
    let stored = u32::from_le_bytes(crc);
    let computed = checksum(&payload);
    if stored != computed {
        return Err(invalid(format!(
            "checksum mismatch: stored={stored:08x} computed={computed:08x}"
        )));
    }

    serde_json::from_slice(&payload).map_err(|e| invalid(format!("deserialization failed: {e}")))
}

/// Writes the log header.
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[FRAME_VERSION])
}

/// Reads and validates the log header, returning its version byte.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let mut header = [0u8; 5];
    reader.read_exact(&mut header)?;
    if header[..4] != MAGIC {
        return Err(invalid(format!(
            "invalid magic bytes: expected {MAGIC:?}, got {:?}",
            &header[..4]
        )));
    }
    Ok(header[4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip() {
        let value = vec!["a".to_string(), String::new()];
        let frame = encode_frame(&value).unwrap();
        let decoded: Vec<String> = decode_frame(&mut Cursor::new(frame)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_detects_flipped_payload_byte() {
        let mut frame = encode_frame(&"payload".to_string()).unwrap();
        frame[7] ^= 0xFF;
        let err = decode_frame::<String>(&mut Cursor::new(frame)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_frame_is_eof() {
        let frame = encode_frame(&"payload".to_string()).unwrap();
        let err = decode_frame::<String>(&mut Cursor::new(&frame[..frame.len() - 2])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_rejects_oversized_length() {
        let mut bad = vec![FRAME_VERSION];
        bad.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = decode_frame::<String>(&mut Cursor::new(bad)).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_header() {
        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, HEADER_LEN);
        assert_eq!(read_header(&mut Cursor::new(buf)).unwrap(), FRAME_VERSION);

        assert!(read_header(&mut Cursor::new(b"KYRO\x01".to_vec())).is_err());
    }
}
