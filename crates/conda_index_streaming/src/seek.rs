use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::digest::{buffer_and_digest, FileDigest};
use crate::error::ExtractError;
use crate::read::extract_from_tar;

/// Stream `info/*` members out of a `.conda` archive, plus its whole-file
/// digest.
///
/// A `.conda` file is a zip container holding (at least) one
/// `info-*.tar.zst` entry and one `pkg-*.tar.zst` entry, each stored
/// uncompressed inside the outer zip (the zstd compression is applied to
/// the inner tar, not to the zip entry itself). Only the `info-*` entry is
/// ever opened here — the package payload in `pkg-*` is never read.
///
/// The zip format's central directory lives at the end of the file, so
/// reading it needs `Seek`, which rules out digesting the file as a single
/// forward pass the way the `.tar.bz2` path does. Instead, `file` is read
/// into memory exactly once (computing the digest as it comes in), and the
/// zip reader operates on that in-memory buffer — still one disk read of
/// the archive, with no second `File::open`.
pub fn extract_conda_members(
    file: File,
    targets: &[&str],
) -> Result<(HashMap<String, Vec<u8>>, FileDigest), ExtractError> {
    let (bytes, digest) = buffer_and_digest(file)?;
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;

    let info_entry_name = zip
        .file_names()
        .find(|name| name.starts_with("info-") && name.ends_with(".tar.zst"))
        .map(str::to_string)
        .ok_or(ExtractError::MissingInfoEntry)?;

    let mut entry = zip.by_name(&info_entry_name)?;
    if entry.compression() != zip::CompressionMethod::Stored {
        return Err(ExtractError::UnsupportedCompressionMethod(info_entry_name));
    }

    // The inner entry is itself a zstd-compressed tar; read it fully (it's
    // tiny relative to the package payload) then decode+untar it.
    let mut compressed = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut compressed)?;
    drop(entry);

    let decoder = zstd::stream::read::Decoder::new(std::io::Cursor::new(compressed))?;
    let members = extract_from_tar(decoder, targets)?;
    Ok((members, digest))
}
