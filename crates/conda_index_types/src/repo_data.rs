use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::no_arch_type::NoArchType;
use crate::package::{IndexJson, RunExportsJson};
use crate::package_name::PackageName;
use crate::version::Version;

/// Per-subdir channel metadata embedded in `repodata.json`'s `info` field.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub subdir: String,
    /// CEP-15 base URL; only present when `channel_url_format_version >= 2`.
    pub base_url: Option<String>,
}

/// A single package's entry in `repodata.json`.
///
/// Field order here is insertion order into the struct's declaration, not
/// its serialized order — [`BTreeMap`] keys (not this struct) are what makes
/// whole-document serialization deterministic.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub arch: Option<String>,
    pub build: String,
    pub build_number: u64,
    #[serde(default)]
    pub constrains: Vec<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub features: Option<String>,
    pub license: Option<String>,
    pub license_family: Option<String>,
    pub md5: Option<String>,
    pub name: PackageName,
    #[serde(default)]
    pub noarch: NoArchType,
    pub platform: Option<String>,
    pub python_site_packages_path: Option<String>,
    pub run_exports: Option<RunExportsJson>,
    pub sha256: Option<String>,
    pub size: u64,
    pub subdir: String,
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub track_features: Vec<String>,
    pub version: Version,

    /// Set when a patch generator revokes this entry. The same string is
    /// also pushed onto `depends` as an unsatisfiable synthetic dependency,
    /// so solvers (which only ever read `depends`) refuse to select the
    /// package; this field exists for callers that want to detect a revoked
    /// record without string-matching `depends`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub package_has_been_revoked: Option<String>,
}

impl PackageRecord {
    /// Build a record from an archive's parsed `index.json`, the computed
    /// digests/size from the extractor, and its basename's subdir.
    pub fn from_index_json(
        index_json: IndexJson,
        size: u64,
        sha256: String,
        md5: String,
    ) -> Self {
        let subdir = index_json
            .subdir
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        PackageRecord {
            arch: index_json.arch,
            build: index_json.build,
            build_number: index_json.build_number,
            constrains: index_json.constrains,
            depends: index_json.depends,
            features: index_json.features,
            license: index_json.license,
            license_family: index_json.license_family,
            md5: Some(md5),
            name: index_json.name,
            noarch: index_json.noarch,
            platform: index_json.platform,
            python_site_packages_path: index_json.python_site_packages_path,
            run_exports: None,
            sha256: Some(sha256),
            size,
            subdir,
            timestamp: index_json.timestamp,
            track_features: index_json.track_features,
            version: index_json.version,
            package_has_been_revoked: None,
        }
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}={}", self.name.as_source(), self.version, self.build)
    }
}

/// The top-level `repodata.json` / `repodata_from_packages.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ChannelInfo>,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageRecord>,
    #[serde(rename = "packages.conda", default)]
    pub conda_packages: BTreeMap<String, PackageRecord>,
    #[serde(default)]
    pub removed: BTreeSet<String>,
    #[serde(rename = "repodata_version")]
    pub version: u64,
}

impl RepoData {
    pub fn new(subdir: impl Into<String>, base_url: Option<String>) -> Self {
        let version = if base_url.is_some() { 2 } else { 1 };
        RepoData {
            info: Some(ChannelInfo {
                subdir: subdir.into(),
                base_url,
            }),
            packages: BTreeMap::new(),
            conda_packages: BTreeMap::new(),
            removed: BTreeSet::new(),
            version,
        }
    }

    /// Iterate all records (legacy + conda) with their basenames.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PackageRecord)> {
        self.packages
            .iter()
            .chain(self.conda_packages.iter())
            .map(|(k, v)| (k.as_str(), v))
    }
}
