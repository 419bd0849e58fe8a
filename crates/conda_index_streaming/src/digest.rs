use std::io::{self, Read};

use md5::{Digest as _, Md5};
use sha2::Sha256;

use crate::error::ExtractError;

/// sha256 + md5 + byte count of a file, computed in one sequential pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub sha256: String,
    pub md5: String,
    pub size: u64,
}

pub fn digest_file(mut reader: impl Read) -> Result<FileDigest, ExtractError> {
    let mut sha256 = Sha256::new();
    let mut md5 = Md5::new();
    let mut size = 0u64;
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sha256.update(&buf[..n]);
        md5.update(&buf[..n]);
        size += n as u64;
    }

    Ok(FileDigest {
        sha256: hex::encode(sha256.finalize()),
        md5: hex::encode(md5.finalize()),
        size,
    })
}

/// A `Read` wrapper that feeds every byte passed through it into a running
/// sha256/md5/size accumulator, so a caller already streaming a reader for
/// another purpose (decompression, member extraction) gets the whole-file
/// digest for free instead of opening and re-reading the file separately.
pub struct DigestingReader<R> {
    inner: R,
    sha256: Sha256,
    md5: Md5,
    size: u64,
}

impl<R: Read> DigestingReader<R> {
    pub fn new(inner: R) -> Self {
        DigestingReader {
            inner,
            sha256: Sha256::new(),
            md5: Md5::new(),
            size: 0,
        }
    }

    /// Consumes the wrapper, returning the accumulated digest. Only correct
    /// once every byte of the underlying reader has actually been read
    /// through this wrapper.
    pub fn finish(self) -> FileDigest {
        FileDigest {
            sha256: hex::encode(self.sha256.finalize()),
            md5: hex::encode(self.md5.finalize()),
            size: self.size,
        }
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sha256.update(&buf[..n]);
            self.md5.update(&buf[..n]);
            self.size += n as u64;
        }
        Ok(n)
    }
}

/// Reads `reader` to completion into memory, computing the whole-file digest
/// over the exact same bytes as they're read. Used for `.conda` archives,
/// where the zip container's central directory forces random access over the
/// member data that a purely sequential digesting pass can't provide — this
/// buffers the raw file once instead of reading it from disk a second time,
/// then hands the buffer to the zip reader as an in-memory `Read + Seek`.
pub fn buffer_and_digest(mut reader: impl Read) -> Result<(Vec<u8>, FileDigest), ExtractError> {
    let mut digesting = DigestingReader::new(&mut reader);
    let mut buf = Vec::new();
    digesting.read_to_end(&mut buf)?;
    Ok((buf, digesting.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_known_bytes() {
        let digest = digest_file(std::io::Cursor::new(b"hello world")).unwrap();
        assert_eq!(digest.size, 11);
        assert_eq!(
            digest.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde"
        );
    }
}
