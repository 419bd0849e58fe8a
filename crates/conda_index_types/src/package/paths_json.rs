use serde::{Deserialize, Serialize};

/// The contents of an archive's `info/paths.json`.
///
/// Consumed transiently by the extractor to derive [`PostInstall`]; never
/// itself cached.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsJson {
    pub paths_version: u64,
    pub paths: Vec<PathsEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsEntry {
    pub relative_path: String,
    #[serde(default)]
    pub path_type: PathType,
    #[serde(default)]
    pub file_mode: Option<FileMode>,
    #[serde(default)]
    pub prefix_placeholder: Option<String>,
    pub sha256: Option<String>,
    pub size_in_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    #[default]
    HardLink,
    SoftLink,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    Binary,
    Text,
}

/// A derived record of post-install behaviour for a package, computed from
/// `paths.json` at index time (algorithm version 1, see SPEC_FULL.md §4.4).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInstall {
    pub has_post_link_scripts: bool,
    pub has_pre_unlink_scripts: bool,
    pub has_pre_link_scripts: bool,
    pub has_activate_scripts: bool,
    pub has_deactivate_scripts: bool,
    pub binary_prefix: bool,
    pub text_prefix: bool,
}

impl PostInstall {
    pub fn from_paths(paths: &PathsJson) -> Self {
        let mut out = PostInstall::default();
        for entry in &paths.paths {
            let p = entry.relative_path.as_str();

            if matches_script(p, "bin/", "-post-link.sh")
                || matches_script(p, "Scripts\\", "-post-link.bat")
            {
                out.has_post_link_scripts = true;
            }
            if matches_script(p, "bin/", "-pre-unlink.sh")
                || matches_script(p, "Scripts\\", "-pre-unlink.bat")
            {
                out.has_pre_unlink_scripts = true;
            }
            if matches_script(p, "bin/", "-pre-link.sh")
                || matches_script(p, "Scripts\\", "-pre-link.bat")
            {
                out.has_pre_link_scripts = true;
            }
            if p.starts_with("etc/conda/activate.d/") {
                out.has_activate_scripts = true;
            }
            if p.starts_with("etc/conda/deactivate.d/") {
                out.has_deactivate_scripts = true;
            }

            if entry.prefix_placeholder.is_some() {
                match entry.file_mode {
                    Some(FileMode::Binary) => out.binary_prefix = true,
                    Some(FileMode::Text) => out.text_prefix = true,
                    None => {}
                }
            }
        }
        out
    }
}

fn matches_script(path: &str, prefix: &str, suffix: &str) -> bool {
    path.starts_with(prefix) && path.ends_with(suffix)
}
