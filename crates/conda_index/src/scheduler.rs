//! C7: the channel-wide scheduler. Discovers subdirs, drives each one's
//! Probe → Extractor → Assembler pipeline under a per-subdir exclusive
//! lock, overlaps extraction/emission across subdirs, and aggregates
//! channel-wide outputs (`channeldata.json`, `rss.xml`, the root
//! `index.html`) once every subdir has finished.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use conda_index_types::{ChannelData, PatchInstructions, RepoData};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::cache::{Backend, Handle};
use crate::error::{AssembleError, Error, ScheduleError};
use crate::probe::Probe as _;
use crate::{assembler, html, probe, rss, shards};

pub struct RunOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

pub struct RunOptions {
    pub channel_root: PathBuf,
    pub output_root: PathBuf,
    pub subdirs: Vec<String>,
    pub worker_count: usize,
    pub backend: Backend,
    pub base_url: Option<String>,
    pub patch_generator: Option<PathBuf>,
    pub no_update_cache: bool,
    pub emit_current_index: bool,
    pub emit_channeldata: bool,
    pub emit_run_exports: bool,
    pub emit_monolithic: bool,
    pub emit_shards: bool,
    pub emit_html: bool,
    pub emit_rss: bool,
}

/// Discovers every directory directly under `channel_root` that isn't
/// `.cache`; used when `--subdir` is never passed.
pub fn discover_subdirs(channel_root: &Path) -> std::io::Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in fs_err::read_dir(channel_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == ".cache" || name.starts_with('.') {
            continue;
        }
        out.push(name.to_string());
    }
    out.sort();
    Ok(out)
}

/// Loads an optional multi-subdir patch document: a JSON object mapping
/// subdir name to [`PatchInstructions`]. Loading an actual patch-instructions
/// `.conda` package is out of scope (see `conda_index_types::patches`); this
/// accepts only the already-decoded JSON shape.
fn load_patches(path: &Path) -> Result<BTreeMap<String, PatchInstructions>, AssembleError> {
    let raw = fs_err::read_to_string(path).map_err(|source| AssembleError::Output {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(AssembleError::InvalidIndexJson)
}

pub async fn run(options: RunOptions, cancel: CancellationToken) -> Result<RunOutcome, Error> {
    let patches = match &options.patch_generator {
        Some(path) => load_patches(path)?,
        None => BTreeMap::new(),
    };

    let semaphore = Arc::new(Semaphore::new(options.worker_count.max(1)));
    let mut tasks = Vec::with_capacity(options.subdirs.len());

    for subdir in &options.subdirs {
        let subdir = subdir.clone();
        let patch = patches.get(&subdir).cloned();
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        let channel_root = options.channel_root.clone();
        let output_root = options.output_root.clone();
        let backend = options.backend.clone();
        let base_url = options.base_url.clone();
        let worker_count = options.worker_count;
        let no_update_cache = options.no_update_cache;
        let emit_current_index = options.emit_current_index;
        let emit_run_exports = options.emit_run_exports;
        let emit_monolithic = options.emit_monolithic;
        let emit_shards = options.emit_shards;
        let emit_html = options.emit_html;

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let result = run_subdir(SubdirOptions {
                channel_root,
                output_root,
                subdir: subdir.clone(),
                worker_count,
                backend,
                base_url,
                patch,
                no_update_cache,
                emit_current_index,
                emit_run_exports,
                emit_monolithic,
                emit_shards,
                emit_html,
                cancel,
            })
            .await;
            (subdir, result)
        }));
    }

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut channeldata_parts: Vec<(String, RepoData, Vec<crate::cache::ChanneldataInput>)> = Vec::new();

    for task in tasks {
        let (subdir, result) = task.await.map_err(|join_err| {
            Error::Schedule(ScheduleError::Cancelled.tap_panic(join_err))
        })?;
        match result {
            Ok(part) => {
                succeeded.push(subdir.clone());
                if let Some(part) = part {
                    channeldata_parts.push((subdir, part.0, part.1));
                }
            }
            Err(err) => {
                tracing::error!("subdir {subdir} failed: {err}");
                failed.push(subdir);
            }
        }
    }

    if options.emit_channeldata && !channeldata_parts.is_empty() {
        let mut data = ChannelData::new();
        for (subdir, patched, inputs) in &channeldata_parts {
            assembler::merge_channeldata(&mut data, subdir, patched, inputs);
        }
        assembler::write_json_atomic(&options.output_root.join("channeldata.json"), &data, true)?;

        if options.emit_rss {
            let channel_name = options
                .channel_root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("channel")
                .to_string();
            let channel_url = options.base_url.clone().unwrap_or_default();
            let emitted_state_path = options.channel_root.join(".cache").join("rss_emitted.json");
            let mut emitted = rss::load_emitted(&emitted_state_path);
            let xml = rss::render_rss(&channel_name, &channel_url, &data, &mut emitted);
            fs_err::write(options.output_root.join("rss.xml"), xml)?;
            rss::save_emitted(&emitted_state_path, &emitted)?;
        }
    }

    if options.emit_html {
        let index = html::render_channel_index(&succeeded);
        fs_err::write(options.output_root.join("index.html"), index)?;
    }

    Ok(RunOutcome { succeeded, failed })
}

struct SubdirOptions {
    channel_root: PathBuf,
    output_root: PathBuf,
    subdir: String,
    worker_count: usize,
    backend: Backend,
    base_url: Option<String>,
    patch: Option<PatchInstructions>,
    no_update_cache: bool,
    emit_current_index: bool,
    emit_run_exports: bool,
    emit_monolithic: bool,
    emit_shards: bool,
    emit_html: bool,
    cancel: CancellationToken,
}

type SubdirChanneldataPart = (RepoData, Vec<crate::cache::ChanneldataInput>);

/// Runs one subdir's full pipeline. Returns `None` if the subdir directory
/// doesn't exist (e.g. a platform named on the CLI but absent on disk).
async fn run_subdir(opts: SubdirOptions) -> Result<Option<SubdirChanneldataPart>, ScheduleError> {
    let subdir_path = opts.channel_root.join(&opts.subdir);
    if !subdir_path.is_dir() {
        tracing::warn!("subdir {} does not exist, skipping", opts.subdir);
        return Ok(None);
    }

    let cache = Handle::open(&subdir_path, &opts.channel_root, &opts.subdir, &opts.backend)
        .await
        .map_err(|source| match source {
            crate::error::CacheError::Locked { .. } => ScheduleError::Locked {
                subdir: opts.subdir.clone(),
            },
            source => ScheduleError::Extract {
                subdir: opts.subdir.clone(),
                source,
            },
        })?;

    if opts.cancel.is_cancelled() {
        return Err(ScheduleError::Cancelled);
    }

    if !opts.no_update_cache {
        let entries = probe::LocalFs
            .list(&subdir_path)
            .map_err(|source| ScheduleError::Extract {
                subdir: opts.subdir.clone(),
                source,
            })?;
        let fingerprints: BTreeMap<String, crate::cache::Fingerprint> =
            entries.iter().cloned().collect();

        cache
            .save_fs_state(&entries)
            .await
            .map_err(|source| ScheduleError::Extract {
                subdir: opts.subdir.clone(),
                source,
            })?;

        let changed = cache.changed_paths().await.map_err(|source| ScheduleError::Extract {
            subdir: opts.subdir.clone(),
            source,
        })?;

        if opts.cancel.is_cancelled() {
            return Err(ScheduleError::Cancelled);
        }

        let fingerprints: std::collections::HashMap<String, crate::cache::Fingerprint> =
            fingerprints.into_iter().collect();
        let outcomes = crate::extractor::run(
            &cache,
            &subdir_path,
            &fingerprints,
            changed,
            opts.worker_count,
            &opts.cancel,
        )
        .await
        .map_err(|source| ScheduleError::Extract {
            subdir: opts.subdir.clone(),
            source,
        })?;

        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, crate::extractor::ExtractOutcome::Skipped { .. }))
            .count();
        if skipped > 0 {
            tracing::warn!("{skipped} archive(s) skipped in {}", opts.subdir);
        }
    }

    // Every changed archive has now been stored or recorded as a skip
    // before any output below is written.
    let pre_patch = assembler::snapshot(&cache, &opts.subdir, opts.base_url.clone())
        .await
        .map_err(|source| ScheduleError::Assemble {
            subdir: opts.subdir.clone(),
            source,
        })?;

    let patched = assembler::apply_patch(&pre_patch, opts.patch.as_ref());

    let output_subdir = opts.output_root.join(&opts.subdir);
    fs_err::create_dir_all(&output_subdir).map_err(|source| ScheduleError::Assemble {
        subdir: opts.subdir.clone(),
        source: AssembleError::Output {
            path: output_subdir.display().to_string(),
            source,
        },
    })?;

    if opts.emit_monolithic {
        assembler::write_json_atomic(&output_subdir.join("repodata_from_packages.json"), &pre_patch, false)
            .map_err(|source| ScheduleError::Assemble {
                subdir: opts.subdir.clone(),
                source,
            })?;
        assembler::write_json_atomic(&output_subdir.join("repodata.json"), &patched, false)
            .map_err(|source| ScheduleError::Assemble {
                subdir: opts.subdir.clone(),
                source,
            })?;
    }

    if opts.emit_current_index {
        let current = assembler::current_repodata(&patched);
        assembler::write_json_atomic(&output_subdir.join("current_repodata.json"), &current, false)
            .map_err(|source| ScheduleError::Assemble {
                subdir: opts.subdir.clone(),
                source,
            })?;
    }

    if opts.emit_run_exports {
        let doc = assembler::run_exports_document(&opts.subdir, &patched);
        assembler::write_json_atomic(&output_subdir.join("run_exports.json"), &doc, false)
            .map_err(|source| ScheduleError::Assemble {
                subdir: opts.subdir.clone(),
                source,
            })?;
    }

    if opts.emit_shards {
        let base_url = opts.base_url.clone().unwrap_or_default();
        shards::write_shards(&output_subdir, &opts.subdir, &base_url, "./shards/", &patched).map_err(|source| {
            ScheduleError::Assemble {
                subdir: opts.subdir.clone(),
                source,
            }
        })?;
    }

    if opts.emit_html {
        let index = html::render_subdir_index(&opts.subdir, &patched);
        fs_err::write(output_subdir.join("index.html"), index).map_err(|source| ScheduleError::Assemble {
            subdir: opts.subdir.clone(),
            source: AssembleError::Output {
                path: output_subdir.join("index.html").display().to_string(),
                source,
            },
        })?;
    }

    let channeldata_inputs = cache
        .channeldata_inputs()
        .await
        .map_err(|source| ScheduleError::Extract {
            subdir: opts.subdir.clone(),
            source,
        })?;

    cache.close().await;
    Ok(Some((patched, channeldata_inputs)))
}

impl ScheduleError {
    /// Folds a `JoinError` into a schedule-level failure without losing the
    /// panic message in the logs.
    fn tap_panic(self, join_err: tokio::task::JoinError) -> Self {
        tracing::error!("subdir task panicked: {join_err}");
        self
    }
}
