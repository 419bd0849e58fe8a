use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::repo_data::PackageRecord;

/// One per-package-name fragment of a sharded repodata layout (CEP-16).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shard {
    #[serde(default)]
    pub packages: BTreeMap<String, PackageRecord>,
    #[serde(rename = "packages.conda", default)]
    pub conda_packages: BTreeMap<String, PackageRecord>,
    #[serde(default)]
    pub removed: BTreeSet<String>,
}

/// Per-subdir header of the sharded manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardedSubdirInfo {
    pub subdir: String,
    /// CEP-15 base URL. Always present as a string: empty (`""`) rather
    /// than null/absent when unconfigured, for cross-tool compatibility.
    pub base_url: String,
    pub shards_base_url: String,
}

/// The top-level `repodata_shards.msgpack.zst` manifest: maps a package
/// name to the hex sha256 digest of its shard's compressed bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardedRepodata {
    pub info: ShardedSubdirInfo,
    pub shards: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_round_trips_through_json() {
        let shard = Shard::default();
        let json = serde_json::to_string(&shard).unwrap();
        let back: Shard = serde_json::from_str(&json).unwrap();
        assert!(back.packages.is_empty());
    }

    #[test]
    fn sharded_repodata_serializes_empty_base_url_as_string() {
        let manifest = ShardedRepodata {
            info: ShardedSubdirInfo {
                subdir: "noarch".to_string(),
                base_url: String::new(),
                shards_base_url: "./shards/".to_string(),
            },
            shards: BTreeMap::new(),
        };
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["info"]["base_url"], serde_json::json!(""));
    }
}
