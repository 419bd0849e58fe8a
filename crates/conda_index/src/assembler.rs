//! C5: queries the cache (C2) for a subdir's indexed set, applies an
//! external patch document, and emits `repodata.json`,
//! `repodata_from_packages.json`, `current_repodata.json`,
//! `run_exports.json`, and (aggregated across subdirs) `channeldata.json`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use conda_index_types::{
    AboutJson, ChannelData, ChannelDataPackage, IndexJson, PackageRecord, PatchInstructions,
    PostInstall, RepoData, RunExportsJson,
};
use serde::Serialize;

use crate::cache::Handle;
use crate::error::AssembleError;

/// Collects `indexed_packages()` into an in-memory `RepoData`, grouping
/// legacy-extension basenames under `packages` and `.conda` basenames under
/// `packages.conda`, per SPEC_FULL.md §4.5 step 1.
pub async fn snapshot(
    cache: &Handle,
    subdir: &str,
    base_url: Option<String>,
) -> Result<RepoData, AssembleError> {
    let mut repo = RepoData::new(subdir, base_url);

    for (basename, index_json_bytes) in cache.indexed_packages().await? {
        let index_json: IndexJson = serde_json::from_slice(&index_json_bytes)
            .map_err(AssembleError::InvalidIndexJson)?;
        let run_exports = cache
            .run_exports_raw(&basename)
            .await?
            .and_then(|bytes| serde_json::from_slice::<RunExportsJson>(&bytes).ok())
            .filter(|re| !re.is_empty());

        let record = record_from_index_json(index_json, run_exports);

        if basename.ends_with(".conda") {
            repo.conda_packages.insert(basename, record);
        } else {
            repo.packages.insert(basename, record);
        }
    }

    Ok(repo)
}

/// `index_json` arriving from the cache already carries the extractor's
/// computed `sha256`/`size`/`md5` (see [`crate::extractor`]); this just
/// reshapes it into a [`PackageRecord`].
fn record_from_index_json(index_json: IndexJson, run_exports: Option<RunExportsJson>) -> PackageRecord {
    let size = index_json.size.unwrap_or(0);
    let sha256 = index_json.sha256.clone().unwrap_or_default();
    let md5 = index_json.md5.clone().unwrap_or_default();
    let mut record = PackageRecord::from_index_json(index_json, size, sha256, md5);
    record.run_exports = run_exports;
    record
}

/// Applies a subdir's patch instructions to a clone of its pre-patch
/// repodata, returning the patched document. `patch` is `None` when no
/// patch generator was configured.
pub fn apply_patch(pre_patch: &RepoData, patch: Option<&PatchInstructions>) -> RepoData {
    let mut patched = pre_patch.clone();
    if let Some(patch) = patch {
        conda_index_types::apply_patches(&mut patched, patch);
    }
    patched
}

/// For each package name, the records belonging to the maximum
/// (version, build_number, build) triple, plus every name transitively
/// depended on by one of those records (SPEC_FULL.md §4.5 step 4).
pub fn current_repodata(patched: &RepoData) -> RepoData {
    let mut latest_by_name: BTreeMap<&str, (&str, &PackageRecord)> = BTreeMap::new();

    for (basename, record) in patched.iter() {
        if record.package_has_been_revoked.is_some() {
            continue;
        }
        let name = record.name.as_normalized();
        let better = match latest_by_name.get(name) {
            None => true,
            Some((_, current)) => {
                (&record.version, record.build_number, &record.build)
                    > (&current.version, current.build_number, &current.build)
            }
        };
        if better {
            latest_by_name.insert(name, (basename, record));
        }
    }

    let mut keep: BTreeSet<&str> = BTreeSet::new();
    let mut queue: Vec<&str> = latest_by_name.keys().copied().collect();
    let all_names: BTreeSet<&str> = patched
        .iter()
        .map(|(_, r)| r.name.as_normalized())
        .collect();

    while let Some(name) = queue.pop() {
        if !keep.insert(name) {
            continue;
        }
        if let Some((_, record)) = latest_by_name.get(name) {
            for dep in &record.depends {
                if let Some(dep_name) = dependency_name(dep) {
                    if all_names.contains(dep_name.as_str()) && !keep.contains(dep_name.as_str()) {
                        // Re-borrow a 'static-lifetime-compatible str from all_names.
                        if let Some(&interned) = all_names.get(dep_name.as_str()) {
                            queue.push(interned);
                        }
                    }
                }
            }
        }
    }

    let mut out = RepoData::new(
        patched.info.as_ref().map(|i| i.subdir.clone()).unwrap_or_default(),
        patched.info.as_ref().and_then(|i| i.base_url.clone()),
    );
    out.version = patched.version;

    for name in keep {
        let Some((basename, record)) = latest_by_name.get(name) else {
            continue;
        };
        if basename.ends_with(".conda") {
            out.conda_packages.insert(basename.to_string(), (*record).clone());
        } else {
            out.packages.insert(basename.to_string(), (*record).clone());
        }
    }
    out
}

/// The package name portion of a conda match-spec dependency string, e.g.
/// `"python >=3.11,<3.12"` -> `"python"`. Full match-spec parsing (version
/// constraints, build-string globs, channel selectors) is out of scope;
/// only the leading name token is needed for the current-repodata closure.
fn dependency_name(depends: &str) -> Option<String> {
    depends
        .split_whitespace()
        .next()
        .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_' && c != '.'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase().replace(['_', '.'], "-"))
}

/// `{info: {subdir}, packages: {...}, "packages.conda": {...}}` mapping
/// basename to parsed run_exports, for indexed packages that have one.
pub fn run_exports_document(subdir: &str, patched: &RepoData) -> serde_json::Value {
    let mut packages = serde_json::Map::new();
    let mut conda_packages = serde_json::Map::new();

    for (basename, record) in &patched.packages {
        if let Some(re) = &record.run_exports {
            packages.insert(basename.clone(), serde_json::to_value(re).unwrap());
        }
    }
    for (basename, record) in &patched.conda_packages {
        if let Some(re) = &record.run_exports {
            conda_packages.insert(basename.clone(), serde_json::to_value(re).unwrap());
        }
    }

    serde_json::json!({
        "info": { "subdir": subdir },
        "packages": packages,
        "packages.conda": conda_packages,
    })
}

/// Folds one subdir's channeldata inputs into the channel-wide
/// `ChannelData` document (SPEC_FULL.md §4.5 step 5).
pub fn merge_channeldata(data: &mut ChannelData, subdir: &str, patched: &RepoData, inputs: &[crate::cache::ChanneldataInput]) {
    data.subdirs.insert(subdir.to_string());

    let about_by_path: BTreeMap<&str, &crate::cache::ChanneldataInput> =
        inputs.iter().map(|i| (i.path.as_str(), i)).collect();

    for (basename, record) in patched.iter() {
        if record.package_has_been_revoked.is_some() {
            continue;
        }
        let name = record.name.as_normalized().to_string();
        let entry = data.packages.entry(name).or_default();
        entry.subdirs.insert(subdir.to_string());

        let is_newer = match &entry.version {
            Some(existing) => record.version > *existing,
            None => true,
        };
        if !is_newer {
            continue;
        }
        entry.version = Some(record.version.clone());
        entry.timestamp = record.timestamp;
        if let Some(re) = &record.run_exports {
            entry
                .run_exports
                .insert(record.version.to_string(), re.clone());
        }

        if let Some(input) = about_by_path.get(basename) {
            if let Some(about_bytes) = &input.about {
                if let Ok(about) = serde_json::from_slice::<AboutJson>(about_bytes) {
                    apply_about(entry, &about);
                }
            }
            if let Some(post_install_bytes) = &input.post_install {
                if let Ok(post_install) = serde_json::from_slice::<PostInstall>(post_install_bytes) {
                    apply_post_install(entry, &post_install);
                }
            }
            if input.icon.is_some() {
                entry.icon_url = Some(format!("icons/{name}.png", name = record.name.as_normalized()));
            }
        }
    }
}

fn apply_about(entry: &mut ChannelDataPackage, about: &AboutJson) {
    entry.description = about.description.clone().or_else(|| entry.description.clone());
    entry.dev_url = about.dev_url.clone().or_else(|| entry.dev_url.clone());
    entry.doc_url = about.doc_url.clone().or_else(|| entry.doc_url.clone());
    entry.home = about.home.clone().or_else(|| entry.home.clone());
    entry.source_url = about.source_url.clone().or_else(|| entry.source_url.clone());
    entry.license = about.license.clone().or_else(|| entry.license.clone());
    entry.summary = about.summary.clone().or_else(|| entry.summary.clone());
    if !about.identifiers.is_empty() {
        entry.identifiers = about.identifiers.clone();
    }
}

fn apply_post_install(entry: &mut ChannelDataPackage, post_install: &PostInstall) {
    entry.has_activate_scripts = post_install.has_activate_scripts;
    entry.has_deactivate_scripts = post_install.has_deactivate_scripts;
    entry.has_post_link_scripts = post_install.has_post_link_scripts;
    entry.has_pre_link_scripts = post_install.has_pre_link_scripts;
    entry.has_pre_unlink_scripts = post_install.has_pre_unlink_scripts;
    entry.binary_prefix = post_install.binary_prefix;
    entry.text_prefix = post_install.text_prefix;
}

/// Serializes `value` and writes it via temp-file + atomic rename so
/// readers never observe a partially-written output file.
pub fn write_json_atomic(
    path: &Path,
    value: &impl Serialize,
    pretty: bool,
) -> Result<(), AssembleError> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    }
    .expect("repodata documents always serialize");

    write_atomic_bytes(path, &bytes)
}

/// Writes `bytes` via temp-file + atomic rename, creating parent
/// directories as needed. Shared by JSON and msgpack/zstd outputs alike.
pub fn write_atomic_bytes(path: &Path, bytes: &[u8]) -> Result<(), AssembleError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs_err::create_dir_all(dir).map_err(|source| AssembleError::Output {
        path: path.display().to_string(),
        source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| AssembleError::Output {
        path: path.display().to_string(),
        source,
    })?;
    tmp.write_all(bytes).map_err(|source| AssembleError::Output {
        path: path.display().to_string(),
        source,
    })?;
    tmp.persist(path).map_err(|e| AssembleError::Output {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conda_index_types::IndexJson;

    fn record(name: &str, version: &str, build_number: u64, depends: Vec<&str>) -> PackageRecord {
        let index_json: IndexJson = serde_json::from_value(serde_json::json!({
            "name": name,
            "version": version,
            "build": "0",
            "build_number": build_number,
            "subdir": "noarch",
            "depends": depends,
        }))
        .unwrap();
        PackageRecord::from_index_json(index_json, 1, "a".repeat(64), "b".repeat(32))
    }

    #[test]
    fn current_repodata_keeps_max_version_and_its_dependency_closure() {
        let mut repo = RepoData::new("noarch", None);
        repo.conda_packages.insert(
            "a-1.0-0.conda".to_string(),
            record("a", "1.0", 0, vec![]),
        );
        repo.conda_packages.insert(
            "a-2.0-0.conda".to_string(),
            record("a", "2.0", 0, vec!["b"]),
        );
        repo.conda_packages.insert(
            "b-1.0-0.conda".to_string(),
            record("b", "1.0", 0, vec![]),
        );

        let current = current_repodata(&repo);
        assert!(current.conda_packages.contains_key("a-2.0-0.conda"));
        assert!(!current.conda_packages.contains_key("a-1.0-0.conda"));
        assert!(current.conda_packages.contains_key("b-1.0-0.conda"));
    }

    #[test]
    fn dependency_name_strips_version_constraint() {
        assert_eq!(dependency_name("python >=3.11,<3.12"), Some("python".to_string()));
        assert_eq!(dependency_name("numpy"), Some("numpy".to_string()));
    }
}
