use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::no_arch_type::NoArchType;
use crate::package_name::PackageName;
use crate::version::Version;

/// The contents of an archive's `info/index.json` — its primary manifest.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexJson {
    pub name: PackageName,
    pub version: Version,
    pub build: String,
    pub build_number: u64,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub constrains: Vec<String>,
    pub license: Option<String>,
    pub license_family: Option<String>,
    pub subdir: Option<String>,
    pub timestamp: Option<i64>,
    pub arch: Option<String>,
    pub platform: Option<String>,
    #[serde(default)]
    pub track_features: Vec<String>,
    #[serde(default)]
    pub features: Option<String>,
    #[serde(default)]
    pub noarch: NoArchType,
    pub python_site_packages_path: Option<String>,

    /// Filled in by the extractor (C4) from the archive bytes; never read
    /// from the archive's own `index.json`.
    pub md5: Option<String>,
    pub sha256: Option<String>,
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_index_json() {
        let raw = r#"{
            "name": "numpy",
            "version": "1.26.4",
            "build": "py311h64a7726_0",
            "build_number": 0,
            "depends": ["python >=3.11,<3.12"],
            "subdir": "linux-64",
            "timestamp": 1700000000000
        }"#;
        let parsed: IndexJson = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.name.as_normalized(), "numpy");
        assert_eq!(parsed.build_number, 0);
        assert!(parsed.noarch.is_none());
    }
}
