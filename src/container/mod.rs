// In: src/container/mod.rs

//! Defines all on-disk structures and constants for the timbang container format.
//! This is the single source of truth for the versioned envelope that carries a
//! transform's configuration together with its opaque model blob. It establishes
//! the contract both the writer and the reader must honor before any body bytes
//! are interpreted.

use std::io::{Cursor, Read, Write};

use crate::error::TimbangError;

pub mod artifact;
pub mod blob;

pub use artifact::{ContainerInfo, ModelContainer};
pub use blob::ScratchFile;

//==================================================================================
// I. Format Constants
//==================================================================================

/// Signature identifying a container written by the single-input transform variant.
pub const SIGNATURE_SINGLE: &[u8; 8] = b"TBGSCOR1";
/// Signature identifying a container written by the multi-input transform variant.
pub const SIGNATURE_MULTI: &[u8; 8] = b"TBGSCORN";

/// The container format version this writer produces.
pub const FORMAT_VERSION: u32 = 2;
/// The oldest `version_written` this reader still understands.
pub const READABLE_FLOOR: u32 = 1;

/// The sub-stream id under which the opaque model blob is stored.
pub const MODEL_STREAM_ID: &str = "model";

/// A reasonable limit to prevent OOM from malformed name lengths. Must not
/// exceed `u16::MAX`: the wire prefix is 2 bytes, and a longer string would
/// wrap the prefix and corrupt the container.
pub const MAX_REASONABLE_STRING_LEN: usize = u16::MAX as usize;
/// A reasonable limit on tensor rank; real models sit far below this.
pub const MAX_REASONABLE_RANK: usize = 1_024;
/// A reasonable limit on the declared input column count.
pub const MAX_REASONABLE_COLUMNS: usize = 64 * 1024;

//==================================================================================
// II. Container Kind & Header
//==================================================================================

/// Distinguishes the two transform variants sharing the container format.
/// They differ only in the presence of the input-column-count field: the
/// single-input variant always carries exactly one column and omits the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    SingleInput,
    MultiInput,
}

impl ContainerKind {
    pub fn signature(&self) -> &'static [u8; 8] {
        match self {
            Self::SingleInput => SIGNATURE_SINGLE,
            Self::MultiInput => SIGNATURE_MULTI,
        }
    }

    pub fn from_signature(sig: &[u8; 8]) -> Result<Self, TimbangError> {
        if sig == SIGNATURE_SINGLE {
            Ok(Self::SingleInput)
        } else if sig == SIGNATURE_MULTI {
            Ok(Self::MultiInput)
        } else {
            Err(TimbangError::Decode(format!(
                "Unknown container signature: {:?}",
                sig
            )))
        }
    }
}

/// The versioning envelope at the head of every container.
///
/// Three version numbers enable forward-incompatible detection: what the
/// producer wrote, the floor it declares readers must reach back to, and the
/// version of the reader the producer itself carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub kind: ContainerKind,
    pub version_written: u32,
    pub readable_floor: u32,
    pub reader_version: u32,
}

impl ContainerHeader {
    /// Builds the header this writer stamps on fresh containers.
    pub fn current(kind: ContainerKind) -> Self {
        Self {
            kind,
            version_written: FORMAT_VERSION,
            readable_floor: READABLE_FLOOR,
            reader_version: FORMAT_VERSION,
        }
    }

    /// Serializes the fixed-size header. Writing to a `Vec<u8>` cannot fail,
    /// but the signature is generic over `Write` for symmetry with `read_from`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), TimbangError> {
        writer.write_all(self.kind.signature())?;
        writer.write_all(&self.version_written.to_le_bytes())?;
        writer.write_all(&self.readable_floor.to_le_bytes())?;
        writer.write_all(&self.reader_version.to_le_bytes())?;
        Ok(())
    }

    /// Parses and validates a header. This runs before any configuration bytes
    /// are interpreted; a failure here aborts the whole load.
    pub fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<Self, TimbangError> {
        let map_err = |_: std::io::Error| {
            TimbangError::Decode("Container is too small to hold a header".into())
        };

        let mut sig = [0u8; 8];
        cursor.read_exact(&mut sig).map_err(map_err)?;
        let kind = ContainerKind::from_signature(&sig)?;

        let mut u32_buf = [0u8; 4];
        cursor.read_exact(&mut u32_buf).map_err(map_err)?;
        let version_written = u32::from_le_bytes(u32_buf);
        cursor.read_exact(&mut u32_buf).map_err(map_err)?;
        let readable_floor = u32::from_le_bytes(u32_buf);
        cursor.read_exact(&mut u32_buf).map_err(map_err)?;
        let reader_version = u32::from_le_bytes(u32_buf);

        let header = Self {
            kind,
            version_written,
            readable_floor,
            reader_version,
        };
        header.validate()?;
        Ok(header)
    }

    /// The version gate. Rejects containers written above what this reader
    /// understands, below this reader's floor, or below the floor the
    /// container itself declares (an internally inconsistent header).
    fn validate(&self) -> Result<(), TimbangError> {
        let out_of_range = self.version_written > FORMAT_VERSION
            || self.version_written < READABLE_FLOOR
            || self.version_written < self.readable_floor;
        if out_of_range {
            return Err(TimbangError::Version {
                written: self.version_written,
                floor: READABLE_FLOOR,
                current: FORMAT_VERSION,
            });
        }
        Ok(())
    }
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(header: ContainerHeader) -> Result<ContainerHeader, TimbangError> {
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        ContainerHeader::read_from(&mut Cursor::new(buf.as_slice()))
    }

    #[test]
    fn test_header_roundtrip_both_kinds() {
        for kind in [ContainerKind::SingleInput, ContainerKind::MultiInput] {
            let header = ContainerHeader::current(kind);
            assert_eq!(roundtrip(header).unwrap(), header);
        }
    }

    #[test]
    fn test_version_above_reader_is_rejected() {
        let mut header = ContainerHeader::current(ContainerKind::MultiInput);
        header.version_written = FORMAT_VERSION + 1;
        assert!(matches!(
            roundtrip(header),
            Err(TimbangError::Version { .. })
        ));
    }

    #[test]
    fn test_version_below_floor_is_rejected() {
        let mut header = ContainerHeader::current(ContainerKind::MultiInput);
        header.version_written = READABLE_FLOOR - 1;
        assert!(matches!(
            roundtrip(header),
            Err(TimbangError::Version { .. })
        ));
    }

    #[test]
    fn test_version_below_declared_floor_is_rejected() {
        // A container claiming "readers must be at version >= 2" but written
        // as version 1 is inconsistent and must fail the gate.
        let header = ContainerHeader {
            kind: ContainerKind::SingleInput,
            version_written: READABLE_FLOOR,
            readable_floor: FORMAT_VERSION,
            reader_version: FORMAT_VERSION,
        };
        assert!(matches!(
            roundtrip(header),
            Err(TimbangError::Version { .. })
        ));
    }

    #[test]
    fn test_unknown_signature_is_a_decode_error() {
        let mut buf = Vec::new();
        ContainerHeader::current(ContainerKind::MultiInput)
            .write_to(&mut buf)
            .unwrap();
        buf[..8].copy_from_slice(b"BADMAGIC");
        let res = ContainerHeader::read_from(&mut Cursor::new(buf.as_slice()));
        assert!(matches!(res, Err(TimbangError::Decode(_))));
    }

    #[test]
    fn test_truncated_header_is_a_decode_error() {
        let res = ContainerHeader::read_from(&mut Cursor::new(&b"TBGSCORN\x01"[..]));
        assert!(matches!(res, Err(TimbangError::Decode(_))));
    }
}
