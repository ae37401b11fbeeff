// In: src/container/blob.rs

//! The opaque blob store: reads and writes an arbitrary-length byte blob under
//! a named sub-stream slot, with no interpretation of its contents, plus the
//! scratch-file guard used to hand that blob to path-only model loaders.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use crate::container::{MAX_REASONABLE_STRING_LEN, MODEL_STREAM_ID};
use crate::error::TimbangError;

//==================================================================================
// I. Length-Prefixed Primitives
//==================================================================================

/// Writes a length-prefixed UTF-8 string with a 2-byte little-endian prefix.
pub(crate) fn write_prefixed_string<W: Write>(
    writer: &mut W,
    s: &str,
) -> Result<(), TimbangError> {
    let len = s.len();
    if len > MAX_REASONABLE_STRING_LEN {
        return Err(TimbangError::Encode(format!(
            "String length ({}) exceeds maximum allowed size ({})",
            len, MAX_REASONABLE_STRING_LEN
        )));
    }
    writer.write_all(&(len as u16).to_le_bytes())?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// Reads a length-prefixed UTF-8 string with a 2-byte little-endian prefix.
pub(crate) fn read_prefixed_string(cursor: &mut Cursor<&[u8]>) -> Result<String, TimbangError> {
    let map_err =
        |_: std::io::Error| TimbangError::Decode("Truncated buffer while reading string".into());

    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf).map_err(map_err)?;
    let len = u16::from_le_bytes(buf) as usize;

    // SECURITY: Validate length against a sane maximum before allocating.
    if len > MAX_REASONABLE_STRING_LEN {
        return Err(TimbangError::Decode(format!(
            "String length ({}) exceeds maximum allowed size ({})",
            len, MAX_REASONABLE_STRING_LEN
        )));
    }

    let mut str_buf = vec![0; len];
    cursor.read_exact(&mut str_buf).map_err(map_err)?;
    String::from_utf8(str_buf).map_err(|e| TimbangError::Decode(e.to_string()))
}

//==================================================================================
// II. The Blob Sub-Stream
//==================================================================================

/// Writes the model blob under its named sub-stream: a length-prefixed stream
/// id, an 8-byte byte count, then exactly that many raw bytes copied verbatim.
pub fn write_blob<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), TimbangError> {
    write_prefixed_string(writer, MODEL_STREAM_ID)?;
    writer.write_all(&(bytes.len() as u64).to_le_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Reads the length prefix of the blob sub-stream, validating the stream id
/// and that the declared byte count fits in the remaining buffer. Returns the
/// blob's byte length; the payload starts at the cursor's position.
pub fn read_blob_prefix(cursor: &mut Cursor<&[u8]>) -> Result<u64, TimbangError> {
    let id = read_prefixed_string(cursor)?;
    if id != MODEL_STREAM_ID {
        return Err(TimbangError::Decode(format!(
            "Unexpected blob stream id '{}', expected '{}'",
            id, MODEL_STREAM_ID
        )));
    }

    let map_err =
        |_: std::io::Error| TimbangError::Decode("Truncated buffer while reading blob length".into());
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf).map_err(map_err)?;
    let len = u64::from_le_bytes(buf);

    // SECURITY: Validate the declared blob length against the buffer size.
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    if len > remaining {
        return Err(TimbangError::Decode(format!(
            "Declared blob length ({}) exceeds remaining buffer ({})",
            len, remaining
        )));
    }
    Ok(len)
}

//==================================================================================
// III. Scratch Files
//==================================================================================

/// A uniquely named temporary file holding blob bytes for a path-only loader.
///
/// The file is removed when the guard is dropped, so a failed model load can
/// never leave scratch state behind: the caller simply lets the guard fall out
/// of scope on the error path. On success the guard moves into the scorer and
/// the file lives exactly as long as the native model handle derived from it.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Allocates a uniquely named scratch file under the OS temp directory and
    /// writes the exact byte count handed in.
    pub fn create(bytes: &[u8]) -> Result<Self, TimbangError> {
        let mut path = std::env::temp_dir();
        path.push(format!("timbang-model-{:016x}.bin", rand::random::<u64>()));

        let mut file = File::create(&path)?;
        file.write_all(bytes)?;
        log::debug!(
            "Spilled {} model blob bytes to scratch file {:?}",
            bytes.len(),
            path
        );
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            // Nothing sensible to propagate from a destructor; the temp dir
            // is the OS's problem if this ever fires.
            log::warn!("Failed to remove scratch file {:?}: {}", self.path, e);
        } else {
            log::debug!("Removed scratch file {:?}", self.path);
        }
    }
}

//==================================================================================
// Unit Tests
//==================================================================================
