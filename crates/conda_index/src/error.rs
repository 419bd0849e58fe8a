use conda_index_streaming::ExtractError;

/// Errors from the cache store (C2): opening a backend, migrating its
/// schema, or running a transaction against it.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to acquire the cache lock at {path}: another indexer is running")]
    Locked { path: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize cache sidecar metadata: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the repodata assembler (C5).
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to parse a cached index_json payload: {0}")]
    InvalidIndexJson(#[source] serde_json::Error),

    #[error("patch document is malformed: {0}")]
    PatchMalformed(String),

    #[error("failed to write output {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize shard: {0}")]
    ShardSerialize(#[from] rmp_serde::encode::Error),
}

/// Errors from the channel scheduler (C7), aggregating a subdir's pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("subdir {subdir} failed during extraction: {source}")]
    Extract {
        subdir: String,
        #[source]
        source: CacheError,
    },

    #[error("subdir {subdir} failed during emission: {source}")]
    Assemble {
        subdir: String,
        #[source]
        source: AssembleError,
    },

    #[error("subdir {subdir} is locked by another process")]
    Locked { subdir: String },

    #[error("indexing was cancelled")]
    Cancelled,
}

/// Per-archive extraction failure, logged and skipped by the extractor (C4)
/// without aborting its subdir.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("archive has no info/index.json")]
    MissingIndexJson,

    #[error("info/index.json is malformed: {0}")]
    MalformedIndexJson(#[source] serde_json::Error),
}

/// Top-level error surfaced to the CLI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("one or more subdirs failed: {failed:?}")]
    SubdirsFailed { failed: Vec<String> },
}
