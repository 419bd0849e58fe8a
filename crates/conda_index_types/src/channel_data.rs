use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::package::RunExportsJson;
use crate::version::Version;

/// The top-level `channeldata.json` document: one per-package-name entry
/// aggregated across every subdir of the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelData {
    pub channeldata_version: u32,
    pub packages: BTreeMap<String, ChannelDataPackage>,
    pub subdirs: BTreeSet<String>,
}

impl ChannelData {
    pub fn new() -> Self {
        ChannelData {
            channeldata_version: 1,
            packages: BTreeMap::new(),
            subdirs: BTreeSet::new(),
        }
    }
}

impl Default for ChannelData {
    fn default() -> Self {
        Self::new()
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelDataPackage {
    #[serde(default)]
    pub has_activate_scripts: bool,
    #[serde(default)]
    pub has_deactivate_scripts: bool,
    #[serde(default)]
    pub has_post_link_scripts: bool,
    #[serde(default)]
    pub has_pre_link_scripts: bool,
    #[serde(default)]
    pub has_pre_unlink_scripts: bool,
    #[serde(default)]
    pub binary_prefix: bool,
    #[serde(default)]
    pub text_prefix: bool,
    pub description: Option<String>,
    pub dev_url: Option<String>,
    pub doc_url: Option<String>,
    pub home: Option<String>,
    pub source_url: Option<String>,
    pub license: Option<String>,
    pub summary: Option<String>,
    pub icon_url: Option<String>,
    pub icon_hash: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub run_exports: BTreeMap<String, RunExportsJson>,
    #[serde(default)]
    pub subdirs: BTreeSet<String>,
    pub timestamp: Option<i64>,
    pub version: Option<Version>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_data_defaults_to_version_1_and_empty_maps() {
        let data = ChannelData::new();
        assert_eq!(data.channeldata_version, 1);
        assert!(data.packages.is_empty());
    }
}
