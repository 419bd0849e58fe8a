//! Streaming, short-circuit extraction of the handful of `info/*` metadata
//! members conda-index needs from a package archive, without extracting
//! the (often much larger) package payload.

mod digest;
mod error;
mod read;
mod seek;

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use conda_index_types::ArchiveType;

pub use digest::{digest_file, FileDigest};
pub use error::ExtractError;

/// The `info/*` member paths the extractor ever asks for. `paths.json` is
/// included here too even though its payload is never cached — it's
/// consumed transiently to derive `post_install`.
pub const INDEX_JSON: &str = "info/index.json";
pub const ABOUT_JSON: &str = "info/about.json";
pub const RECIPE_META_YAML_RENDERED: &str = "info/recipe/meta.yaml.rendered";
pub const RECIPE_META_YAML: &str = "info/recipe/meta.yaml";
pub const RECIPE_LOG_JSON: &str = "info/recipe_log.json";
pub const RUN_EXPORTS_JSON: &str = "info/run_exports.json";
pub const PATHS_JSON: &str = "info/paths.json";
pub const ICON_PNG: &str = "info/icon.png";

/// All members the extractor ever requests, in one streaming pass.
pub const ALL_TARGETS: &[&str] = &[
    INDEX_JSON,
    ABOUT_JSON,
    RECIPE_META_YAML_RENDERED,
    RECIPE_META_YAML,
    RECIPE_LOG_JSON,
    RUN_EXPORTS_JSON,
    PATHS_JSON,
    ICON_PNG,
];

/// The result of reading one archive: whichever of [`ALL_TARGETS`] were
/// present, plus the whole-file digest used to populate `index_json`'s
/// `sha256`/`md5`/`size`.
#[derive(Debug, Clone)]
pub struct ExtractedArchive {
    pub members: HashMap<String, Vec<u8>>,
    pub digest: FileDigest,
}

impl ExtractedArchive {
    pub fn member(&self, name: &str) -> Option<&[u8]> {
        self.members.get(name).map(Vec::as_slice)
    }
}

/// Read the requested metadata members plus the whole-file digest from one
/// archive, in a single open and a single read of `path`. `archive_type`
/// must match the file's actual extension (callers typically derive it via
/// [`ArchiveType::try_from_path`]).
pub fn extract(path: &Path, archive_type: ArchiveType, targets: &[&str]) -> Result<ExtractedArchive, ExtractError> {
    let file = File::open(path)?;

    let (members, digest) = match archive_type {
        ArchiveType::TarBz2 => read::extract_tar_bz2_members(file, targets)?,
        ArchiveType::Conda => seek::extract_conda_members(file, targets)?,
    };

    Ok(ExtractedArchive { members, digest })
}
