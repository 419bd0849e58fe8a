//! Library surface for `conda-index`: incremental metadata extraction (C1-C4
//! via [`conda_index_streaming`] and [`extractor`]), a durable cache (C2,
//! [`cache`]), repodata assembly (C5, [`assembler`]), sharded repodata
//! emission (C6, [`shards`]), and the channel-wide scheduler (C7,
//! [`scheduler`]) that ties them together. [`config`] holds the CLI surface
//! consumed by the `conda-index` binary.

pub mod assembler;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractor;
pub mod html;
pub mod probe;
pub mod rss;
pub mod scheduler;
pub mod shards;

pub use error::Error;
