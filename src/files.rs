use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::TransferError;

pub const OUTPUT_PREFIX: &str = "file-";
pub const OUTPUT_EXT: &str = "dat";

/// Name of the n-th saved file, counting from 1.
pub fn output_name(index: u32) -> String {
    format!("{}{:02}.{}", OUTPUT_PREFIX, index, OUTPUT_EXT)
}

pub fn open_source(path: &Path) -> Result<File, TransferError> {
    match File::open(path) {
        Ok(f) => Ok(f),
        Err(m) => Err(TransferError::Open {
            path: path.to_path_buf(),
            source: m,
        }),
    }
}

/// Fills `buf` from `reader` until end of input or the buffer is full.
/// Anything past `buf.len()` is left unread.
pub fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Creates or truncates `path`, readable and writable by the owner only.
pub fn create_output(path: &Path) -> Result<File, TransferError> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    match opts.open(path) {
        Ok(f) => Ok(f),
        Err(m) => Err(TransferError::Create {
            path: path.to_path_buf(),
            source: m,
        }),
    }
}

/// Writes as much of `bytes` as the file accepts and returns how much that was.
pub fn write_payload<W: Write>(writer: &mut W, bytes: &[u8]) -> usize {
    let mut written = 0;
    while written < bytes.len() {
        match writer.write(&bytes[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("write stopped after {} bytes: {}", written, e);
                break;
            }
        }
    }
    written
}

pub fn payload_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
