use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};

use bzip2::read::BzDecoder;

use crate::digest::{DigestingReader, FileDigest};
use crate::error::ExtractError;

/// Stream `info/*` members out of a `.tar.bz2` archive, closing the
/// decompressor as soon as every requested member has been seen, while
/// accumulating the whole-file digest over the same single read of `file`.
///
/// The member scan stops as soon as every target is found, leaving the tail
/// of the compressed file unread by the tar/bzip2 layers; the raw bytes are
/// drained straight off the digesting reader afterwards (bypassing
/// decompression, which the digest doesn't need) so the returned digest
/// still covers the entire archive file.
pub fn extract_tar_bz2_members(
    file: File,
    targets: &[&str],
) -> Result<(HashMap<String, Vec<u8>>, FileDigest), ExtractError> {
    let digesting = DigestingReader::new(file);
    let decoder = BzDecoder::new(BufReader::new(digesting));
    let (members, decoder) = extract_from_tar_reclaiming(decoder, targets)?;

    let mut digesting = decoder.into_inner().into_inner();
    io_copy_to_sink(&mut digesting)?;
    Ok((members, digesting.finish()))
}

fn io_copy_to_sink(reader: &mut impl Read) -> Result<(), ExtractError> {
    std::io::copy(reader, &mut std::io::sink())?;
    Ok(())
}

/// Like [`extract_from_tar`], but also hands back the underlying reader so
/// the caller can drain whatever the tar scan didn't consume.
fn extract_from_tar_reclaiming<R: Read>(
    reader: R,
    targets: &[&str],
) -> Result<(HashMap<String, Vec<u8>>, R), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    let out = scan_tar_entries(&mut archive, targets)?;
    Ok((out, archive.into_inner()))
}

pub(crate) fn extract_from_tar<R: Read>(
    reader: R,
    targets: &[&str],
) -> Result<HashMap<String, Vec<u8>>, ExtractError> {
    let mut archive = tar::Archive::new(reader);
    scan_tar_entries(&mut archive, targets)
}

fn scan_tar_entries<R: Read>(
    archive: &mut tar::Archive<R>,
    targets: &[&str],
) -> Result<HashMap<String, Vec<u8>>, ExtractError> {
    let mut remaining: HashSet<&str> = targets.iter().copied().collect();
    let mut out = HashMap::new();

    for entry in archive.entries()? {
        if remaining.is_empty() {
            break;
        }
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        // tar stores paths without a leading "./" most of the time, but
        // normalize it away if present.
        let path = path.strip_prefix("./").unwrap_or(&path).to_string();

        if let Some(&target) = remaining.iter().find(|&&t| t == path) {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            out.insert(target.to_string(), buf);
            remaining.remove(target);
        }
    }

    Ok(out)
}
