use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

/// The contents of an archive's `info/about.json`.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AboutJson {
    #[serde(default)]
    pub channels: Vec<String>,
    pub description: Option<String>,
    pub dev_url: Option<String>,
    pub doc_url: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
    pub home: Option<String>,
    pub license: Option<String>,
    pub license_family: Option<String>,
    pub source_url: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_empty_object() {
        let parsed: AboutJson = serde_json::from_str("{}").unwrap();
        assert!(parsed.home.is_none());
        assert!(parsed.channels.is_empty());
    }
}
