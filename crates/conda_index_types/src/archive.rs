use std::fmt;
use std::path::Path;

use crate::version::{Version, VersionParseError};

/// The on-disk archive format of a conda package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveType {
    /// The legacy bzip2-compressed tarball (`.tar.bz2`).
    TarBz2,
    /// The newer zip-of-zstd-tars format (`.conda`).
    Conda,
}

impl ArchiveType {
    pub const fn extension(self) -> &'static str {
        match self {
            ArchiveType::TarBz2 => ".tar.bz2",
            ArchiveType::Conda => ".conda",
        }
    }

    pub fn try_from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::try_from_filename(name)
    }

    pub fn try_from_filename(filename: &str) -> Option<Self> {
        if filename.ends_with(".tar.bz2") {
            Some(ArchiveType::TarBz2)
        } else if filename.ends_with(".conda") {
            Some(ArchiveType::Conda)
        } else {
            None
        }
    }

    /// Splits a basename into (stem, extension) if it ends with a recognized
    /// archive extension.
    pub fn split_str(filename: &str) -> Option<(&str, Self)> {
        let ty = Self::try_from_filename(filename)?;
        let stem = &filename[..filename.len() - ty.extension().len()];
        Some((stem, ty))
    }
}

/// A parsed `<name>-<version>-<build>` archive basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveIdentifier {
    pub name: String,
    pub version: Version,
    pub build_string: String,
    pub archive_type: ArchiveType,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArchiveIdentifierError {
    #[error("{0:?} does not end in a recognized archive extension")]
    UnrecognizedExtension(String),
    #[error("{0:?} is not a valid <name>-<version>-<build> archive basename")]
    Malformed(String),
    #[error("invalid version in archive basename {0:?}: {1}")]
    InvalidVersion(String, VersionParseError),
}

impl ArchiveIdentifier {
    pub fn try_from_filename(filename: &str) -> Result<Self, ArchiveIdentifierError> {
        let (stem, archive_type) = ArchiveType::split_str(filename)
            .ok_or_else(|| ArchiveIdentifierError::UnrecognizedExtension(filename.to_string()))?;

        let (name_and_version, build_string) = stem
            .rsplit_once('-')
            .ok_or_else(|| ArchiveIdentifierError::Malformed(filename.to_string()))?;
        let (name, version_str) = name_and_version
            .rsplit_once('-')
            .ok_or_else(|| ArchiveIdentifierError::Malformed(filename.to_string()))?;

        let version = Version::parse(version_str)
            .map_err(|e| ArchiveIdentifierError::InvalidVersion(filename.to_string(), e))?;

        Ok(ArchiveIdentifier {
            name: name.to_string(),
            version,
            build_string: build_string.to_string(),
            archive_type,
        })
    }

    pub fn try_from_path(path: &Path) -> Result<Self, ArchiveIdentifierError> {
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ArchiveIdentifierError::Malformed(path.display().to_string()))?;
        Self::try_from_filename(filename)
    }
}

impl fmt::Display for ArchiveIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}{}",
            self.name,
            self.version,
            self.build_string,
            self.archive_type.extension()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conda_basename() {
        let id = ArchiveIdentifier::try_from_filename("numpy-1.26.4-py311h64a7726_0.conda")
            .unwrap();
        assert_eq!(id.name, "numpy");
        assert_eq!(id.version.as_str(), "1.26.4");
        assert_eq!(id.build_string, "py311h64a7726_0");
        assert_eq!(id.archive_type, ArchiveType::Conda);
        assert_eq!(id.to_string(), "numpy-1.26.4-py311h64a7726_0.conda");
    }

    #[test]
    fn parses_tar_bz2_basename() {
        let id = ArchiveIdentifier::try_from_filename("a-1.0-0.tar.bz2").unwrap();
        assert_eq!(id.archive_type, ArchiveType::TarBz2);
    }

    #[test]
    fn rejects_unrecognized_extension() {
        assert!(matches!(
            ArchiveIdentifier::try_from_filename("a-1.0-0.whl"),
            Err(ArchiveIdentifierError::UnrecognizedExtension(_))
        ));
    }

    #[test]
    fn split_str_round_trips_extension() {
        let (stem, ty) = ArchiveType::split_str("a-1.0-0.conda").unwrap();
        assert_eq!(stem, "a-1.0-0");
        assert_eq!(ty, ArchiveType::Conda);
    }
}
