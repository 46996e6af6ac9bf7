//! Low-level byte-order handling shared by every wire structure.
//!
//! Provides the error taxonomy of the protocol, the CRC32 helper, and a
//! bounds-checked big-endian [`Reader`] used to unpack datagrams. Packing
//! is done by appending `to_be_bytes()` directly onto a `Vec<u8>`; only the
//! reading side needs the extra care of short-input handling.

use thiserror::Error;

use crate::MAX_PLAYER_NAME_LEN;

/// How a datagram can fail to decode.
///
/// The two endpoints react differently: the server silently drops the whole
/// datagram on any of these, while the client discards the remainder on
/// [`CodecError::CrcMismatch`] and treats [`CodecError::BadData`] behind a
/// valid checksum as a fatal sign of a misbehaving server.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes on the wire than the structure requires.
    #[error("datagram too short for the declared contents")]
    Truncated,
    /// A field holds a value outside its domain.
    #[error("malformed field in datagram")]
    BadData,
    /// The CRC32 trailer does not match the framed bytes.
    #[error("crc32 trailer mismatch")]
    CrcMismatch,
}

/// IEEE 802.3 CRC32 over `bytes` (reflected, init and final xor `0xFFFFFFFF`).
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// True iff `name` is a legal player name: at most 20 bytes, every byte a
/// printable ASCII character in 33..=126. The empty name is legal and marks
/// an observer.
pub fn valid_player_name(name: &str) -> bool {
    name.len() <= MAX_PLAYER_NAME_LEN && name.bytes().all(|b| (33..=126).contains(&b))
}

/// Cursor over a received datagram, decoding big-endian fields.
///
/// Every accessor checks the remaining length and fails with
/// [`CodecError::Truncated`] instead of panicking, so malformed input from
/// the network can never take the process down.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    /// The entire underlying datagram, independent of the cursor.
    pub fn bytes(&self) -> &'a [u8] {
        self.buf
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        let raw = self.take(4)?;
        let mut be = [0u8; 4];
        be.copy_from_slice(raw);
        Ok(u32::from_be_bytes(be))
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        let raw = self.take(8)?;
        let mut be = [0u8; 8];
        be.copy_from_slice(raw);
        Ok(u64::from_be_bytes(be))
    }

    /// Consumes exactly `n` bytes and returns them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consumes everything up to the end of the datagram.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    /// Consumes a NUL-terminated string, without the terminator.
    ///
    /// Fails with [`CodecError::Truncated`] when no NUL arrives before the
    /// end of the buffer, and with [`CodecError::BadData`] when the bytes
    /// are not valid UTF-8.
    pub fn name(&mut self) -> Result<String, CodecError> {
        let tail = &self.buf[self.pos..];
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::Truncated)?;
        let s = std::str::from_utf8(&tail[..nul]).map_err(|_| CodecError::BadData)?;
        self.pos += nul + 1;
        Ok(s.to_owned())
    }
}
