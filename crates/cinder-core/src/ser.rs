//! Canonical consensus serialization.
//!
//! One deterministic byte form underpins hashing, disk storage, and the
//! wire: integers are little-endian fixed-width, lengths use the compact
//! 1/3/5/9-byte variable integer, vectors are length-prefixed, and struct
//! fields serialize in declaration order.
//!
//! Three modes exist and must round-trip bit-exact:
//!
//! - [`SerMode::Full`]: network and disk fidelity.
//! - [`SerMode::HeaderOnly`]: a block omits its transactions and signature.
//! - [`SerMode::GetHash`]: leading protocol-version envelopes are omitted
//!   so hashes stay stable across version bumps.
//!
//! [`serialize_hash`] is double SHA-256 over the GetHash encoding.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::constants::MAX_BLOCK_SIZE;
use crate::hash::{sha256d, Hash256};

/// A serialization error.
#[derive(Error, Debug)]
pub enum SerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The data to be deserialized was malformed.
    #[error("parse error: {0}")]
    Parse(&'static str),
}

/// Which projection of a structure is being serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SerMode {
    #[default]
    Full,
    HeaderOnly,
    GetHash,
}

pub trait Encodable {
    fn encode<W: Write>(&self, w: &mut W, mode: SerMode) -> io::Result<()>;

    fn to_vec(&self, mode: SerMode) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf, mode)
            .expect("writing to a Vec cannot fail");
        buf
    }

    /// Serialized size in the given mode.
    fn serialized_size(&self, mode: SerMode) -> usize {
        self.to_vec(mode).len()
    }
}

pub trait Decodable: Sized {
    fn decode<R: Read>(r: &mut R, mode: SerMode) -> Result<Self, SerError>;

    fn from_slice(mut bytes: &[u8], mode: SerMode) -> Result<Self, SerError> {
        let value = Self::decode(&mut bytes, mode)?;
        if !bytes.is_empty() {
            return Err(SerError::Parse("trailing bytes after value"));
        }
        Ok(value)
    }
}

/// `SHA-256d(serialize-gethash(x))`: the identity hash of a structure.
pub fn serialize_hash<T: Encodable>(value: &T) -> Hash256 {
    sha256d(&value.to_vec(SerMode::GetHash))
}

/// Write a compact-size variable integer (1, 3, 5, or 9 bytes by range).
pub fn write_var_int<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    if value < 0xFD {
        w.write_u8(value as u8)
    } else if value <= u16::MAX as u64 {
        w.write_u8(0xFD)?;
        w.write_u16::<LittleEndian>(value as u16)
    } else if value <= u32::MAX as u64 {
        w.write_u8(0xFE)?;
        w.write_u32::<LittleEndian>(value as u32)
    } else {
        w.write_u8(0xFF)?;
        w.write_u64::<LittleEndian>(value)
    }
}

/// Read a compact-size variable integer, rejecting non-minimal encodings.
pub fn read_var_int<R: Read>(r: &mut R) -> Result<u64, SerError> {
    let first = r.read_u8()?;
    let value = match first {
        0xFD => {
            let v = r.read_u16::<LittleEndian>()? as u64;
            if v < 0xFD {
                return Err(SerError::Parse("non-minimal varint"));
            }
            v
        }
        0xFE => {
            let v = r.read_u32::<LittleEndian>()? as u64;
            if v <= u16::MAX as u64 {
                return Err(SerError::Parse("non-minimal varint"));
            }
            v
        }
        0xFF => {
            let v = r.read_u64::<LittleEndian>()?;
            if v <= u32::MAX as u64 {
                return Err(SerError::Parse("non-minimal varint"));
            }
            v
        }
        small => small as u64,
    };
    Ok(value)
}

/// Write a length-prefixed byte string.
pub fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_var_int(w, bytes.len() as u64)?;
    w.write_all(bytes)
}

/// Read a length-prefixed byte string. The length is bounded by
/// [`MAX_BLOCK_SIZE`] so a hostile prefix cannot force a huge allocation.
pub fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>, SerError> {
    let len = read_var_int(r)?;
    if len > MAX_BLOCK_SIZE as u64 {
        return Err(SerError::Parse("byte string length exceeds block size"));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a vector length prefix, bounded by a caller-supplied element cap.
pub fn read_vec_len<R: Read>(r: &mut R, max: usize) -> Result<usize, SerError> {
    let len = read_var_int(r)?;
    if len > max as u64 {
        return Err(SerError::Parse("vector length exceeds limit"));
    }
    Ok(len as usize)
}

impl Encodable for Hash256 {
    fn encode<W: Write>(&self, w: &mut W, _mode: SerMode) -> io::Result<()> {
        w.write_all(&self.0)
    }
}

impl Decodable for Hash256 {
    fn decode<R: Read>(r: &mut R, _mode: SerMode) -> Result<Self, SerError> {
        let mut bytes = [0u8; 32];
        r.read_exact(&mut bytes)?;
        Ok(Hash256(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn var_int_bytes(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_var_int(&mut buf, value).unwrap();
        buf
    }

    #[test]
    fn var_int_widths() {
        assert_eq!(var_int_bytes(0).len(), 1);
        assert_eq!(var_int_bytes(0xFC).len(), 1);
        assert_eq!(var_int_bytes(0xFD).len(), 3);
        assert_eq!(var_int_bytes(0xFFFF).len(), 3);
        assert_eq!(var_int_bytes(0x10000).len(), 5);
        assert_eq!(var_int_bytes(0xFFFF_FFFF).len(), 5);
        assert_eq!(var_int_bytes(0x1_0000_0000).len(), 9);
        assert_eq!(var_int_bytes(u64::MAX).len(), 9);
    }

    #[test]
    fn var_int_rejects_non_minimal() {
        // 0xFC encoded with the 3-byte form.
        let bytes = [0xFDu8, 0xFC, 0x00];
        assert!(matches!(
            read_var_int(&mut &bytes[..]),
            Err(SerError::Parse(_))
        ));
        // u16-range value encoded with the 5-byte form.
        let bytes = [0xFEu8, 0xFF, 0xFF, 0x00, 0x00];
        assert!(matches!(
            read_var_int(&mut &bytes[..]),
            Err(SerError::Parse(_))
        ));
    }

    #[test]
    fn bytes_round_trip() {
        let data = vec![7u8; 300];
        let mut buf = Vec::new();
        write_bytes(&mut buf, &data).unwrap();
        assert_eq!(read_bytes(&mut &buf[..]).unwrap(), data);
    }

    #[test]
    fn read_bytes_rejects_oversized_prefix() {
        let mut buf = Vec::new();
        write_var_int(&mut buf, (MAX_BLOCK_SIZE + 1) as u64).unwrap();
        assert!(matches!(
            read_bytes(&mut &buf[..]),
            Err(SerError::Parse(_))
        ));
    }

    #[test]
    fn hash_round_trip() {
        let h = Hash256([0x5A; 32]);
        let bytes = h.to_vec(SerMode::Full);
        assert_eq!(bytes.len(), 32);
        assert_eq!(Hash256::from_slice(&bytes, SerMode::Full).unwrap(), h);
    }

    #[test]
    fn from_slice_rejects_trailing_bytes() {
        let mut bytes = Hash256::ZERO.to_vec(SerMode::Full);
        bytes.push(0);
        assert!(Hash256::from_slice(&bytes, SerMode::Full).is_err());
    }

    proptest! {
        #[test]
        fn var_int_round_trip(value in any::<u64>()) {
            let buf = var_int_bytes(value);
            prop_assert_eq!(read_var_int(&mut &buf[..]).unwrap(), value);
        }
    }
}
