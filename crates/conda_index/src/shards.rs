//! C6: partition a patched repodata by package name into content-addressed,
//! zstd-compressed msgpack shards (CEP-16), plus a manifest mapping each
//! name to its shard's digest.

use std::collections::BTreeMap;
use std::path::Path;

use conda_index_types::{RepoData, Shard, ShardedRepodata, ShardedSubdirInfo};
use sha2::{Digest, Sha256};

use crate::assembler::write_atomic_bytes;
use crate::error::AssembleError;

const ZSTD_LEVEL: i32 = 19;

/// Serializes `repo`'s records into one [`Shard`] per package name.
pub fn partition_by_name(repo: &RepoData) -> BTreeMap<String, Shard> {
    let mut shards: BTreeMap<String, Shard> = BTreeMap::new();

    for (basename, record) in &repo.packages {
        shards
            .entry(record.name.as_normalized().to_string())
            .or_default()
            .packages
            .insert(basename.clone(), record.clone());
    }
    for (basename, record) in &repo.conda_packages {
        shards
            .entry(record.name.as_normalized().to_string())
            .or_default()
            .conda_packages
            .insert(basename.clone(), record.clone());
    }
    for basename in &repo.removed {
        if let Ok(id) = conda_index_types::ArchiveIdentifier::try_from_filename(basename) {
            shards
                .entry(id.name)
                .or_default()
                .removed
                .insert(basename.clone());
        }
    }

    shards
}

/// Serializes one shard as msgpack then zstd-compresses it.
pub fn encode_shard(shard: &Shard) -> Result<Vec<u8>, AssembleError> {
    let msgpack = rmp_serde::to_vec_named(shard)?;
    let compressed = zstd::stream::encode_all(std::io::Cursor::new(msgpack), ZSTD_LEVEL)
        .map_err(|e| AssembleError::Output {
            path: "<shard>".to_string(),
            source: e,
        })?;
    Ok(compressed)
}

/// Writes every shard plus the `repodata_shards.msgpack.zst` manifest into
/// `output_dir`, content-addressed by the hex sha256 of each shard's
/// compressed bytes.
pub fn write_shards(
    output_dir: &Path,
    subdir: &str,
    base_url: &str,
    shards_base_url: &str,
    repo: &RepoData,
) -> Result<(), AssembleError> {
    let partitioned = partition_by_name(repo);
    let mut manifest = BTreeMap::new();

    for (name, shard) in &partitioned {
        let compressed = encode_shard(shard)?;
        let digest = hex::encode(Sha256::digest(&compressed));
        let shard_path = output_dir.join(format!("{digest}.msgpack.zst"));
        if !shard_path.exists() {
            write_atomic_bytes(&shard_path, &compressed)?;
        }
        manifest.insert(name.clone(), digest);
    }

    let sharded = ShardedRepodata {
        info: ShardedSubdirInfo {
            subdir: subdir.to_string(),
            base_url: base_url.to_string(),
            shards_base_url: shards_base_url.to_string(),
        },
        shards: manifest,
    };

    let manifest_bytes = rmp_serde::to_vec_named(&sharded)?;
    let manifest_compressed = zstd::stream::encode_all(std::io::Cursor::new(manifest_bytes), ZSTD_LEVEL)
        .map_err(|e| AssembleError::Output {
            path: "repodata_shards.msgpack.zst".to_string(),
            source: e,
        })?;
    write_atomic_bytes(
        &output_dir.join("repodata_shards.msgpack.zst"),
        &manifest_compressed,
    )
}
