//! C3: enumerate archive basenames in a subdir and capture cheap
//! fingerprints (mtime, size) as the "upstream" `fs` stage.

use std::path::Path;
use std::time::UNIX_EPOCH;

use conda_index_types::ArchiveType;

use crate::cache::Fingerprint;
use crate::error::CacheError;

/// Entries excluded from probing even though they live alongside archives.
const EXCLUDED: &[&str] = &[
    "repodata.json",
    "repodata.json.zst",
    "repodata_from_packages.json",
    "current_repodata.json",
    "repodata_shards.msgpack.zst",
    "index.html",
];

/// A replaceable capability for discovering a subdir's upstream archive
/// set. The default implementation lists a local directory; alternative
/// implementations (remote object-store listing, manual insertion) must
/// preserve the invariant that every path considered for emission appears
/// in the `fs` stage.
pub trait Probe {
    fn list(&self, subdir_path: &Path) -> Result<Vec<(String, Fingerprint)>, CacheError>;
}

/// Lists non-hidden archives directly inside `subdir_path`.
pub struct LocalFs;

impl Probe for LocalFs {
    fn list(&self, subdir_path: &Path) -> Result<Vec<(String, Fingerprint)>, CacheError> {
        let mut out = Vec::new();

        for entry in fs_err::read_dir(subdir_path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if !file_type.is_file() {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') || EXCLUDED.contains(&name) {
                continue;
            }
            if ArchiveType::try_from_filename(name).is_none() {
                continue;
            }

            let metadata = entry.metadata()?;
            let mtime = metadata
                .modified()?
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            out.push((
                name.to_string(),
                Fingerprint {
                    mtime,
                    size: metadata.len() as i64,
                    ..Default::default()
                },
            ));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_recognized_archive_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("a-1.0-0.conda"), b"x").unwrap();
        fs_err::write(dir.path().join("a-1.0-0.tar.bz2"), b"xx").unwrap();
        fs_err::write(dir.path().join("repodata.json"), b"{}").unwrap();
        fs_err::write(dir.path().join("README.md"), b"nope").unwrap();

        let mut found = LocalFs.list(dir.path()).unwrap();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        let names: Vec<&str> = found.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a-1.0-0.conda", "a-1.0-0.tar.bz2"]);
    }
}
