//! Data model shared across conda-index's components: archive identity,
//! the conda version-ordering algorithm, the payload records extracted from
//! an archive's `info/` metadata, and the repodata/channeldata/shard
//! documents assembled from them.

mod archive;
mod channel_data;
mod no_arch_type;
mod package;
mod package_name;
mod patches;
mod repo_data;
mod shard;
mod version;

pub use archive::{ArchiveIdentifier, ArchiveIdentifierError, ArchiveType};
pub use channel_data::{ChannelData, ChannelDataPackage};
pub use no_arch_type::NoArchType;
pub use package::{AboutJson, FileMode, IndexJson, PathType, PathsEntry, PathsJson, PostInstall, RunExportsJson};
pub use package_name::PackageName;
pub use patches::{apply_patches, PackageRecordPatch, PatchInstructions, RepoDataPatch};
pub use repo_data::{ChannelInfo, PackageRecord, RepoData};
pub use shard::{Shard, ShardedRepodata, ShardedSubdirInfo};
pub use version::{Version, VersionParseError};
