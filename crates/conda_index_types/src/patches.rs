use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_with::{rust::double_option, skip_serializing_none};

use crate::archive::ArchiveType;
use crate::repo_data::RepoData;

/// A per-record edit applied by a patch generator. `None` means "leave
/// unchanged"; for the nullable scalar fields, `Some(None)` explicitly
/// clears the field (distinguished from absence via `double_option`).
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageRecordPatch {
    pub depends: Option<Vec<String>>,
    pub constrains: Option<Vec<String>>,
    pub track_features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub features: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub license: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub license_family: Option<Option<String>>,
}

/// The patch document for one subdir, as returned by an external patch
/// generator given that subdir's pre-patch repodata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchInstructions {
    #[serde(default)]
    pub patch_instructions_version: Option<u64>,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageRecordPatch>,
    #[serde(rename = "packages.conda", default)]
    pub conda_packages: BTreeMap<String, PackageRecordPatch>,
    #[serde(default)]
    pub remove: BTreeSet<String>,
    #[serde(default)]
    pub revoke: BTreeSet<String>,
}

/// A multi-subdir patch document, as loaded from a patch-instructions
/// package (a `.conda` archive containing one `patch_instructions.json` per
/// subdir). Loading such a package is outside this crate's scope; this type
/// only models the parsed result.
#[derive(Debug, Clone, Default)]
pub struct RepoDataPatch {
    pub subdirs: BTreeMap<String, PatchInstructions>,
}

impl RepoDataPatch {
    pub fn for_subdir(&self, subdir: &str) -> Option<&PatchInstructions> {
        self.subdirs.get(subdir)
    }
}

/// Both extension variants of a basename's stem, so a patch entry written
/// for one archive format also applies to the legacy/new counterpart of the
/// same `<name>-<version>-<build>` stem.
fn stem_variants(basename: &str) -> Vec<String> {
    match ArchiveType::split_str(basename) {
        Some((stem, _)) => vec![
            format!("{stem}{}", ArchiveType::TarBz2.extension()),
            format!("{stem}{}", ArchiveType::Conda.extension()),
        ],
        None => vec![basename.to_string()],
    }
}

fn apply_record_patch(record: &mut crate::repo_data::PackageRecord, patch: &PackageRecordPatch) {
    if let Some(depends) = &patch.depends {
        record.depends = depends.clone();
    }
    if let Some(constrains) = &patch.constrains {
        record.constrains = constrains.clone();
    }
    if let Some(track_features) = &patch.track_features {
        record.track_features = track_features.clone();
    }
    if let Some(features) = &patch.features {
        record.features = features.clone();
    }
    if let Some(license) = &patch.license {
        record.license = license.clone();
    }
    if let Some(license_family) = &patch.license_family {
        record.license_family = license_family.clone();
    }
}

/// Apply one subdir's patch instructions to its repodata in place.
///
/// Order: per-record patches, then `revoke` (pushes a synthetic
/// unsatisfiable dependency string onto `depends` so solvers refuse to
/// select the record, while keeping the entry in `packages`/
/// `packages.conda`), then `remove` (moves the basename into `removed`).
pub fn apply_patches(repo: &mut RepoData, patch: &PatchInstructions) {
    for (basename, record_patch) in &patch.packages {
        if let Some(record) = repo.packages.get_mut(basename) {
            apply_record_patch(record, record_patch);
        }
    }
    for (basename, record_patch) in &patch.conda_packages {
        if let Some(record) = repo.conda_packages.get_mut(basename) {
            apply_record_patch(record, record_patch);
        }
    }

    for basename in &patch.revoke {
        for variant in stem_variants(basename) {
            if let Some(record) = repo
                .packages
                .get_mut(&variant)
                .or_else(|| repo.conda_packages.get_mut(&variant))
            {
                let marker = format!("__{}_revoked__", record.name.as_normalized());
                if !record.depends.contains(&marker) {
                    record.depends.push(marker.clone());
                }
                record.package_has_been_revoked = Some(marker);
            }
        }
    }

    for basename in &patch.remove {
        for variant in stem_variants(basename) {
            if repo.packages.remove(&variant).is_some() || repo.conda_packages.remove(&variant).is_some() {
                repo.removed.insert(variant);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::IndexJson;
    use crate::repo_data::PackageRecord;

    fn sample_repo() -> RepoData {
        let mut repo = RepoData::new("noarch", None);
        let index_json: IndexJson = serde_json::from_str(
            r#"{"name":"a","version":"1.0","build":"0","build_number":0,"subdir":"noarch","depends":["b"]}"#,
        )
        .unwrap();
        repo.conda_packages.insert(
            "a-1.0-0.conda".to_string(),
            PackageRecord::from_index_json(index_json, 10, "a".repeat(64), "b".repeat(32)),
        );
        repo
    }

    #[test]
    fn remove_moves_basename_to_removed() {
        let mut repo = sample_repo();
        let mut patch = PatchInstructions::default();
        patch.remove.insert("a-1.0-0.conda".to_string());
        apply_patches(&mut repo, &patch);
        assert!(repo.conda_packages.is_empty());
        assert!(repo.removed.contains("a-1.0-0.conda"));
    }

    #[test]
    fn revoke_adds_synthetic_dependency_but_keeps_record() {
        let mut repo = sample_repo();
        let mut patch = PatchInstructions::default();
        patch.revoke.insert("a-1.0-0.conda".to_string());
        apply_patches(&mut repo, &patch);
        let record = repo.conda_packages.get("a-1.0-0.conda").unwrap();
        let marker = record.package_has_been_revoked.clone().unwrap();
        assert!(record.depends.contains(&marker), "revoke must land in depends, not just the side field");
    }

    #[test]
    fn revoke_is_idempotent_across_repeated_application() {
        let mut repo = sample_repo();
        let mut patch = PatchInstructions::default();
        patch.revoke.insert("a-1.0-0.conda".to_string());
        apply_patches(&mut repo, &patch);
        apply_patches(&mut repo, &patch);
        let record = repo.conda_packages.get("a-1.0-0.conda").unwrap();
        let marker = record.package_has_been_revoked.clone().unwrap();
        assert_eq!(record.depends.iter().filter(|d| **d == marker).count(), 1);
    }

    #[test]
    fn per_record_patch_replaces_depends() {
        let mut repo = sample_repo();
        let mut patch = PatchInstructions::default();
        patch.conda_packages.insert(
            "a-1.0-0.conda".to_string(),
            PackageRecordPatch {
                depends: Some(vec!["b >=2".to_string()]),
                ..Default::default()
            },
        );
        apply_patches(&mut repo, &patch);
        let record = repo.conda_packages.get("a-1.0-0.conda").unwrap();
        assert_eq!(record.depends, vec!["b >=2".to_string()]);
    }
}
