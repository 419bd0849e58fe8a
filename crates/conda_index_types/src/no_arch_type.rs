use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The flavour of `noarch` a package declares, if any.
///
/// `index.json` historically encoded this as a boolean (`true` meaning
/// generic noarch) before switching to a string (`"generic"` / `"python"`).
/// Both forms are accepted on read; only the string form is written.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct NoArchType(Option<RawNoArchType>);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum RawNoArchType {
    GenericV1,
    GenericV2,
    Python,
}

impl NoArchType {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn generic() -> Self {
        Self(Some(RawNoArchType::GenericV2))
    }

    pub fn python() -> Self {
        Self(Some(RawNoArchType::Python))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn is_python(&self) -> bool {
        matches!(self.0, Some(RawNoArchType::Python))
    }

    pub fn is_generic(&self) -> bool {
        matches!(
            self.0,
            Some(RawNoArchType::GenericV1) | Some(RawNoArchType::GenericV2)
        )
    }
}

impl Serialize for NoArchType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            None => serializer.serialize_none(),
            Some(RawNoArchType::Python) => serializer.serialize_str("python"),
            Some(RawNoArchType::GenericV1 | RawNoArchType::GenericV2) => {
                serializer.serialize_str("generic")
            }
        }
    }
}

impl<'de> Deserialize<'de> for NoArchType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bool(bool),
            Str(String),
            Null,
        }

        match Repr::deserialize(deserializer)? {
            Repr::Null => Ok(NoArchType(None)),
            Repr::Bool(false) => Ok(NoArchType(None)),
            Repr::Bool(true) => Ok(NoArchType(Some(RawNoArchType::GenericV1))),
            Repr::Str(s) => match s.as_str() {
                "python" => Ok(NoArchType(Some(RawNoArchType::Python))),
                "generic" => Ok(NoArchType(Some(RawNoArchType::GenericV2))),
                other => Err(D::Error::custom(format!("invalid noarch type: {other}"))),
            },
        }
    }
}
