//! Length-delimited JSON framing over any `Read + Write` byte stream.
//!
//! The replay channel is a synchronous, single OS thread per direction
//! (spec §5), so framing is done with plain blocking I/O rather than an
//! async codec: each frame is a `u32` little-endian byte length followed
//! by that many bytes of JSON.

use std::io::{Read, Write};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{TransportError, TransportResult};

const MAX_FRAME_BYTES: u32 = 512 * 1024 * 1024;

pub fn write_frame<W: Write, T: Serialize>(w: &mut W, value: &T) -> TransportResult<()> {
    let bytes = serde_json::to_vec(value)?;
    w.write_all(&(bytes.len() as u32).to_le_bytes())?;
    w.write_all(&bytes)?;
    w.flush()?;
    Ok(())
}

/// Reads one frame, or `Ok(None)` on a clean EOF before any bytes of the
/// next frame arrived.
pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> TransportResult<Option<T>> {
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::FrameTooLarge { got: len, max: MAX_FRAME_BYTES });
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &("hello".to_string(), 42u32)).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let (s, n): (String, u32) = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(s, "hello");
        assert_eq!(n, 42);
    }

    #[test]
    fn empty_stream_yields_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let got: Option<u32> = read_frame(&mut cursor).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn oversized_declared_length_errors_instead_of_truncating() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_le_bytes());
        buf.extend_from_slice(b"not actually this many bytes");
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame::<_, String>(&mut cursor).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { got, max } if got == MAX_FRAME_BYTES + 1 && max == MAX_FRAME_BYTES));
    }
}
