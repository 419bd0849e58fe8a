use std::io;

/// Errors from reading a single archive. All variants except [`Io`] are
/// scoped to that one archive — callers skip and log, never abort a whole
/// subdir over one bad package.
///
/// [`Io`]: ExtractError::Io
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("io error reading archive: {0}")]
    Io(#[from] io::Error),

    #[error("invalid zip container: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("`.conda` archive has no info-*.tar.zst entry")]
    MissingInfoEntry,

    #[error("archive member {0} is not stored uncompressed inside the zip container")]
    UnsupportedCompressionMethod(String),

    #[error("{0:?} does not have a recognized archive extension")]
    UnsupportedArchiveType(String),
}
