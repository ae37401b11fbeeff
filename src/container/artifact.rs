// In: src/container/artifact.rs

//! Defines the self-describing serialized form of a configured scoring
//! transform. This module is the single source of truth for serialization,
//! deserialization, and efficient metadata peeking of the container.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! Header:  [8-byte signature][u32 verWritten][u32 verReadableFloor][u32 verReaderCur]
//! Body:    [len-prefixed outputColumnName]
//!          [u32 inputColumnCount]                   (multi-input variant only)
//!          repeat per input column:
//!            [len-prefixed inputColumnName]
//!            [u32 shapeDimCount][shapeDimCount x u64 positive dimension]
//! Blob:    [len-prefixed stream id][u64 blobByteLength][raw bytes]
//! ```

use std::io::{Cursor, Read, Write};

use crate::config::{InputColumn, ScorerOptions};
use crate::container::blob::{read_blob_prefix, read_prefixed_string, write_blob, write_prefixed_string};
use crate::container::{
    ContainerHeader, ContainerKind, MAX_REASONABLE_COLUMNS, MAX_REASONABLE_RANK,
};
use crate::error::TimbangError;

//==================================================================================
// Public Structs
//==================================================================================

/// Metadata extracted from a container without copying the (potentially large)
/// model blob. This is the return type of the efficient `peek_info` function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub header: ContainerHeader,
    pub output_column: String,
    pub inputs: Vec<InputColumn>,
    /// The model blob's byte length.
    pub blob_len: u64,
    /// The offset at which the raw blob bytes begin.
    pub blob_offset: usize,
}

/// A fully decoded container in memory: the transform's persistent identity
/// plus the opaque model blob, carried verbatim and never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelContainer {
    pub kind: ContainerKind,
    pub output_column: String,
    pub inputs: Vec<InputColumn>,
    pub model_blob: Vec<u8>,
}

//==================================================================================
// Core Implementation
//==================================================================================

impl ModelContainer {
    /// Assembles a container from validated options and blob bytes.
    pub fn from_options(
        kind: ContainerKind,
        options: &ScorerOptions,
        model_blob: Vec<u8>,
    ) -> Result<Self, TimbangError> {
        options.validate()?;
        if kind == ContainerKind::SingleInput && options.input_columns.len() != 1 {
            return Err(TimbangError::Encode(format!(
                "single-input container requires exactly one input column, got {}",
                options.input_columns.len()
            )));
        }
        Ok(Self {
            kind,
            output_column: options.output_column.clone(),
            inputs: options.input_columns.clone(),
            model_blob,
        })
    }

    /// Re-derives the boundary options from a decoded container.
    pub fn options(&self) -> ScorerOptions {
        ScorerOptions {
            output_column: self.output_column.clone(),
            input_columns: self.inputs.clone(),
        }
    }

    /// Serializes the container into a canonical, final byte vector.
    /// This is the authoritative writer for the timbang container format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TimbangError> {
        // Re-validate the encode-side invariants so a hand-built container
        // cannot produce bytes the reader would reject.
        self.options().validate()?;

        let mut buf = Vec::with_capacity(64 + self.model_blob.len());
        ContainerHeader::current(self.kind).write_to(&mut buf)?;

        write_prefixed_string(&mut buf, &self.output_column)?;

        // The single-input variant omits the outer column-count field.
        if self.kind == ContainerKind::MultiInput {
            buf.write_all(&(self.inputs.len() as u32).to_le_bytes())?;
        } else if self.inputs.len() != 1 {
            return Err(TimbangError::Encode(format!(
                "single-input container requires exactly one input column, got {}",
                self.inputs.len()
            )));
        }

        for col in &self.inputs {
            write_prefixed_string(&mut buf, &col.name)?;
            buf.write_all(&(col.shape.len() as u32).to_le_bytes())?;
            for &dim in &col.shape {
                buf.write_all(&(dim as u64).to_le_bytes())?;
            }
        }

        write_blob(&mut buf, &self.model_blob)?;
        Ok(buf)
    }

    /// Deserializes a full byte slice into a `ModelContainer`, copying the
    /// blob bytes into a fresh allocation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TimbangError> {
        // peek_info handles all parsing and validation; this function only
        // copies the blob payload it located.
        let info = Self::peek_info(bytes)?;

        let end = info.blob_offset + info.blob_len as usize;
        // peek_info already bounds-checked the declared blob length.
        let model_blob = bytes[info.blob_offset..end].to_vec();

        Ok(Self {
            kind: info.header.kind,
            output_column: info.output_column,
            inputs: info.inputs,
            model_blob,
        })
    }

    /// Peeks into a serialized container to extract configuration metadata
    /// without copying the model blob.
    pub fn peek_info(bytes: &[u8]) -> Result<ContainerInfo, TimbangError> {
        let mut cursor = Cursor::new(bytes);

        // The header gate runs before any body bytes are interpreted.
        let header = ContainerHeader::read_from(&mut cursor)?;

        let output_column = read_prefixed_string(&mut cursor)?;
        if output_column.is_empty() {
            return Err(TimbangError::Decode(
                "output column name must not be empty".into(),
            ));
        }

        let column_count = match header.kind {
            ContainerKind::SingleInput => 1usize,
            ContainerKind::MultiInput => {
                let n = read_u32(&mut cursor)? as usize;
                if n == 0 {
                    return Err(TimbangError::Decode(
                        "container declares zero input columns".into(),
                    ));
                }
                if n > MAX_REASONABLE_COLUMNS {
                    return Err(TimbangError::Decode(format!(
                        "declared input column count ({}) exceeds maximum ({})",
                        n, MAX_REASONABLE_COLUMNS
                    )));
                }
                n
            }
        };

        let mut inputs = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            let name = read_prefixed_string(&mut cursor)?;
            if name.is_empty() {
                return Err(TimbangError::Decode(format!(
                    "input column {} has an empty name",
                    idx
                )));
            }

            let rank = read_u32(&mut cursor)? as usize;
            if rank == 0 {
                return Err(TimbangError::Decode(format!(
                    "input column '{}' declares an empty shape",
                    name
                )));
            }
            if rank > MAX_REASONABLE_RANK {
                return Err(TimbangError::Decode(format!(
                    "input column '{}' declares rank {} (maximum {})",
                    name, rank, MAX_REASONABLE_RANK
                )));
            }

            let mut shape = Vec::with_capacity(rank);
            for dim_idx in 0..rank {
                let dim = read_u64(&mut cursor)?;
                if dim == 0 {
                    return Err(TimbangError::Decode(format!(
                        "input column '{}' has a zero-sized dimension at index {}",
                        name, dim_idx
                    )));
                }
                shape.push(dim as usize);
            }
            inputs.push(InputColumn { name, shape });
        }

        let blob_len = read_blob_prefix(&mut cursor)?;
        let blob_offset = cursor.position() as usize;

        Ok(ContainerInfo {
            header,
            output_column,
            inputs,
            blob_len,
            blob_offset,
        })
    }
}

//==================================================================================
// Private Helpers
//==================================================================================

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, TimbangError> {
    let mut buf = [0u8; 4];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| TimbangError::Decode("Truncated buffer while reading u32".into()))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, TimbangError> {
    let mut buf = [0u8; 8];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| TimbangError::Decode("Truncated buffer while reading u64".into()))?;
    Ok(u64::from_le_bytes(buf))
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::FORMAT_VERSION;

    fn test_options() -> ScorerOptions {
        ScorerOptions {
            output_column: "Score".to_string(),
            input_columns: vec![
                InputColumn::new("Features", vec![1, 3, 2, 2]),
                InputColumn::new("Mask", vec![12]),
            ],
        }
    }

    fn test_blob() -> Vec<u8> {
        (0u8..=255).cycle().take(1000).collect()
    }

    #[test]
    fn test_container_roundtrip_multi_input() {
        let original =
            ModelContainer::from_options(ContainerKind::MultiInput, &test_options(), test_blob())
                .unwrap();
        let bytes = original.to_bytes().unwrap();
        let reconstructed = ModelContainer::from_bytes(&bytes).unwrap();
        assert_eq!(original, reconstructed);
        // Blob must come back byte-for-byte.
        assert_eq!(reconstructed.model_blob, test_blob());
    }

    #[test]
    fn test_container_roundtrip_single_input() {
        let options = ScorerOptions::single("Score", "Features", vec![1, 3, 2, 2]);
        let original =
            ModelContainer::from_options(ContainerKind::SingleInput, &options, test_blob())
                .unwrap();
        let bytes = original.to_bytes().unwrap();
        let reconstructed = ModelContainer::from_bytes(&bytes).unwrap();
        assert_eq!(original, reconstructed);
        assert_eq!(reconstructed.options(), options);
    }

    #[test]
    fn test_single_input_variant_rejects_multiple_columns() {
        let res =
            ModelContainer::from_options(ContainerKind::SingleInput, &test_options(), vec![]);
        assert!(matches!(res, Err(TimbangError::Encode(_))));
    }

    #[test]
    fn test_rank_at_reader_cap_roundtrips() {
        let options = ScorerOptions::single("Score", "F", vec![1; MAX_REASONABLE_RANK]);
        let container =
            ModelContainer::from_options(ContainerKind::SingleInput, &options, vec![7]).unwrap();
        let bytes = container.to_bytes().unwrap();
        assert_eq!(ModelContainer::from_bytes(&bytes).unwrap(), container);
    }

    #[test]
    fn test_rank_past_reader_cap_cannot_be_encoded() {
        // The writer refuses what the reader would reject, so no container
        // can exist that decodes to a Version/Decode dead end.
        let options = ScorerOptions::single("Score", "F", vec![1; MAX_REASONABLE_RANK + 1]);
        let res = ModelContainer::from_options(ContainerKind::SingleInput, &options, vec![]);
        assert!(matches!(res, Err(TimbangError::Encode(_))));
    }

    #[test]
    fn test_peek_info_skips_blob() {
        let container =
            ModelContainer::from_options(ContainerKind::MultiInput, &test_options(), test_blob())
                .unwrap();
        let bytes = container.to_bytes().unwrap();
        let info = ModelContainer::peek_info(&bytes).unwrap();

        assert_eq!(info.header.version_written, FORMAT_VERSION);
        assert_eq!(info.output_column, "Score");
        assert_eq!(info.inputs, test_options().input_columns);
        assert_eq!(info.blob_len, 1000);
        assert_eq!(info.blob_offset + info.blob_len as usize, bytes.len());
    }

    #[test]
    fn test_version_gate_fires_before_body_checks() {
        let container =
            ModelContainer::from_options(ContainerKind::MultiInput, &test_options(), vec![])
                .unwrap();
        let mut bytes = container.to_bytes().unwrap();

        // Stamp a version above what this reader understands. The body after
        // the header is deliberately left corrupt-adjacent: the gate must
        // report Version, never a generic Decode failure.
        bytes[8..12].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            ModelContainer::from_bytes(&bytes),
            Err(TimbangError::Version { .. })
        ));

        // And one below the reader's floor.
        bytes[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            ModelContainer::from_bytes(&bytes),
            Err(TimbangError::Version { .. })
        ));
    }

    #[test]
    fn test_empty_output_column_is_a_decode_error() {
        let container =
            ModelContainer::from_options(ContainerKind::MultiInput, &test_options(), vec![])
                .unwrap();
        let mut bytes = container.to_bytes().unwrap();
        // Zero out the output column's 2-byte length prefix (directly after
        // the 20-byte header), making the name empty on the wire.
        bytes[20..22].copy_from_slice(&0u16.to_le_bytes());
        let res = ModelContainer::peek_info(&bytes);
        assert!(matches!(res, Err(TimbangError::Decode(_))));
    }

    #[test]
    fn test_zero_dimension_is_a_decode_error() {
        let container = ModelContainer::from_options(
            ContainerKind::SingleInput,
            &ScorerOptions::single("Score", "F", vec![3]),
            vec![],
        )
        .unwrap();
        let mut bytes = container.to_bytes().unwrap();
        // Layout: header(20) + "Score"(2+5) + "F"(2+1) + rank u32(4) + dim u64.
        let dim_offset = 20 + 7 + 3 + 4;
        bytes[dim_offset..dim_offset + 8].copy_from_slice(&0u64.to_le_bytes());
        let res = ModelContainer::peek_info(&bytes);
        match res {
            Err(TimbangError::Decode(msg)) => {
                assert!(msg.contains("zero-sized dimension at index 0"), "{}", msg)
            }
            other => panic!("expected Decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_input_columns_is_a_decode_error() {
        let container =
            ModelContainer::from_options(ContainerKind::MultiInput, &test_options(), vec![])
                .unwrap();
        let mut bytes = container.to_bytes().unwrap();
        // The u32 input count sits right after the output column name.
        let count_offset = 20 + 2 + "Score".len();
        bytes[count_offset..count_offset + 4].copy_from_slice(&0u32.to_le_bytes());
        let res = ModelContainer::peek_info(&bytes);
        assert!(matches!(res, Err(TimbangError::Decode(_))));
    }

    #[test]
    fn test_truncated_container_is_handled_gracefully() {
        let container =
            ModelContainer::from_options(ContainerKind::MultiInput, &test_options(), test_blob())
                .unwrap();
        let bytes = container.to_bytes().unwrap();

        // Chop mid-body and mid-blob; both must fail cleanly with Decode.
        for cut in [10, 25, bytes.len() - 500] {
            let res = ModelContainer::from_bytes(&bytes[..cut]);
            assert!(
                matches!(res, Err(TimbangError::Decode(_))),
                "cut at {} did not produce a Decode error",
                cut
            );
        }
    }
}
