use serde::{Deserialize, Serialize};

/// Constraints a package exports to its downstream consumers at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunExportsJson {
    #[serde(default)]
    pub weak: Vec<String>,
    #[serde(default)]
    pub strong: Vec<String>,
    #[serde(default)]
    pub noarch: Vec<String>,
    #[serde(default)]
    pub weak_constrains: Vec<String>,
    #[serde(default)]
    pub strong_constrains: Vec<String>,
}

impl RunExportsJson {
    pub fn is_empty(&self) -> bool {
        self.weak.is_empty()
            && self.strong.is_empty()
            && self.noarch.is_empty()
            && self.weak_constrains.is_empty()
            && self.strong_constrains.is_empty()
    }
}
