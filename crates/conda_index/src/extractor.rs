//! C4: for each archive flagged as changed by [`crate::probe`], stream its
//! metadata via `conda_index_streaming`, parse the JSON members, and upsert
//! the result into the cache (C2).

use std::path::Path;
use std::sync::Arc;

use conda_index_streaming::{self as streaming, ExtractedArchive};
use conda_index_types::{ArchiveType, IndexJson, PathsJson, PostInstall};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::cache::{Fingerprint, Handle, PayloadMap};
use crate::error::{ArchiveError, CacheError};

/// Outcome of extracting one archive, for progress reporting / tests.
#[derive(Debug)]
pub enum ExtractOutcome {
    Stored,
    Skipped { basename: String, reason: String },
}

/// Runs the extractor for every path `changed_paths` yielded, bounded by
/// `worker_count` concurrent tasks. Archives that fail to open or whose
/// `index.json` is absent/malformed are logged and skipped: their `fs` row
/// survives so the next run retries them.
///
/// `cancel` is checked once per archive, right before that archive's work
/// starts: an archive already in flight when cancellation fires always runs
/// to completion, but any archive that hasn't started yet is skipped rather
/// than extracted, so cancellation aborts the batch without abandoning
/// in-progress I/O.
pub async fn run(
    cache: &Handle,
    subdir_path: &Path,
    fingerprints: &std::collections::HashMap<String, Fingerprint>,
    changed: Vec<String>,
    worker_count: usize,
    cancel: &CancellationToken,
) -> Result<Vec<ExtractOutcome>, CacheError> {
    let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
    let mut tasks = Vec::with_capacity(changed.len());

    for basename in changed {
        let Some(fingerprint) = fingerprints.get(&basename).cloned() else {
            continue;
        };
        let archive_path = subdir_path.join(&basename);
        let semaphore = semaphore.clone();
        let cache = cache.clone();
        let cancel = cancel.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            if cancel.is_cancelled() {
                return Ok(ExtractOutcome::Skipped {
                    basename,
                    reason: "cancelled before extraction started".to_string(),
                });
            }
            extract_one(&cache, &archive_path, &basename, fingerprint).await
        }));
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err(err)) => return Err(err),
            Err(join_err) => {
                tracing::error!("extractor task panicked: {join_err}");
            }
        }
    }
    Ok(outcomes)
}

async fn extract_one(
    cache: &Handle,
    archive_path: &Path,
    basename: &str,
    fingerprint: Fingerprint,
) -> Result<ExtractOutcome, CacheError> {
    let archive_path = archive_path.to_path_buf();
    let basename_owned = basename.to_string();

    let result = tokio::task::spawn_blocking(move || read_archive(&archive_path))
        .await
        .expect("blocking extraction task panicked");

    let extracted = match result {
        Ok(extracted) => extracted,
        Err(err) => {
            tracing::warn!("skipping {basename_owned}: {err}");
            return Ok(ExtractOutcome::Skipped {
                basename: basename_owned,
                reason: err.to_string(),
            });
        }
    };

    let payload = match build_payload(&extracted, &fingerprint) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!("skipping {basename_owned}: {err}");
            return Ok(ExtractOutcome::Skipped {
                basename: basename_owned,
                reason: err.to_string(),
            });
        }
    };

    cache.store(&basename_owned, &fingerprint, &payload).await?;
    Ok(ExtractOutcome::Stored)
}

fn read_archive(archive_path: &Path) -> Result<ExtractedArchive, ArchiveError> {
    let archive_type = ArchiveType::try_from_path(archive_path).ok_or_else(|| {
        ArchiveError::Extract(conda_index_streaming::ExtractError::UnsupportedArchiveType(
            archive_path.display().to_string(),
        ))
    })?;
    Ok(streaming::extract(
        archive_path,
        archive_type,
        streaming::ALL_TARGETS,
    )?)
}

/// Builds the payload map for one archive: parses `index.json` (required),
/// augments it with the whole-file digest/size, derives `post_install` from
/// `paths.json` (never itself cached), and passes the remaining members
/// through as opaque blobs.
fn build_payload(
    extracted: &ExtractedArchive,
    _fingerprint: &Fingerprint,
) -> Result<PayloadMap, ArchiveError> {
    let index_json_bytes = extracted
        .member(streaming::INDEX_JSON)
        .ok_or(ArchiveError::MissingIndexJson)?;

    let mut index_json: IndexJson =
        serde_json::from_slice(index_json_bytes).map_err(ArchiveError::MalformedIndexJson)?;

    index_json.sha256 = Some(extracted.digest.sha256.clone());
    index_json.size = Some(extracted.digest.size);
    index_json.md5 = Some(extracted.digest.md5.clone());

    let post_install = extracted
        .member(streaming::PATHS_JSON)
        .and_then(|bytes| serde_json::from_slice::<PathsJson>(bytes).ok())
        .map(|paths| PostInstall::from_paths(&paths))
        .filter(|p| *p != PostInstall::default());

    let recipe = extracted
        .member(streaming::RECIPE_META_YAML_RENDERED)
        .or_else(|| extracted.member(streaming::RECIPE_META_YAML))
        .map(<[u8]>::to_vec);

    Ok(PayloadMap {
        index_json: serde_json::to_vec(&index_json).expect("IndexJson always serializes"),
        about: extracted.member(streaming::ABOUT_JSON).map(<[u8]>::to_vec),
        recipe,
        recipe_log: extracted
            .member(streaming::RECIPE_LOG_JSON)
            .map(<[u8]>::to_vec),
        run_exports: extracted
            .member(streaming::RUN_EXPORTS_JSON)
            .map(<[u8]>::to_vec),
        post_install: post_install
            .map(|p| serde_json::to_vec(&p).expect("PostInstall always serializes")),
        icon: extracted.member(streaming::ICON_PNG).map(<[u8]>::to_vec),
    })
}
