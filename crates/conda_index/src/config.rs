//! CLI surface, per SPEC_FULL.md §6.

use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use crate::cache::Backend;

#[derive(Debug, Parser)]
#[command(name = "conda-index", version, about = "Index a conda channel directory")]
pub struct Config {
    /// Root of the channel: a directory containing one subdirectory per
    /// platform (e.g. `linux-64`, `noarch`).
    pub channel_root: PathBuf,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Number of archives to extract concurrently per subdir. Defaults to
    /// the number of logical CPUs.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Restrict indexing to these subdirs (repeatable). Defaults to every
    /// subdirectory found under the channel root.
    #[arg(long = "subdir")]
    pub subdirs: Vec<String>,

    /// Where to write output files. Defaults to `channel_root`.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Path to a patch-instructions generator script or directory; if unset,
    /// no patches are applied.
    #[arg(long)]
    pub patch_generator: Option<PathBuf>,

    #[arg(long = "current-index", overrides_with = "no_current_index", default_value_t = true)]
    pub current_index: bool,
    #[arg(long = "no-current-index", overrides_with = "current_index")]
    no_current_index: bool,

    #[arg(long = "channeldata", overrides_with = "no_channeldata", default_value_t = true)]
    pub channeldata: bool,
    #[arg(long = "no-channeldata", overrides_with = "channeldata")]
    no_channeldata: bool,

    #[arg(long = "run-exports", overrides_with = "no_run_exports", default_value_t = false)]
    pub run_exports: bool,
    #[arg(long = "no-run-exports", overrides_with = "run_exports")]
    no_run_exports: bool,

    #[arg(long = "monolithic", overrides_with = "no_monolithic", default_value_t = true)]
    pub monolithic: bool,
    #[arg(long = "no-monolithic", overrides_with = "monolithic")]
    no_monolithic: bool,

    #[arg(long = "shards", overrides_with = "no_shards", default_value_t = false)]
    pub shards: bool,
    #[arg(long = "no-shards", overrides_with = "shards")]
    no_shards: bool,

    /// Skip re-probing the filesystem and reuse the cache's last known
    /// upstream state.
    #[arg(long)]
    pub no_update_cache: bool,

    /// Which cache stage represents "upstream truth". Only `fs` (local
    /// filesystem probing) is implemented; the flag exists so a future
    /// object-store probe can be selected without a CLI break.
    #[arg(long, default_value = "fs")]
    pub upstream_stage: String,

    /// Which relational backend to cache metadata in.
    #[arg(long, value_enum, default_value_t = BackendKind::Sqlite)]
    pub backend: BackendKind,

    /// Connection string for `--backend postgresql`. Required in that mode.
    #[arg(long, env = "CONDA_INDEX_DBURL")]
    pub db_url: Option<String>,

    /// Base URL packages are served from; recorded in `repodata.json`'s
    /// `info.base_url` and shard manifests.
    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long = "html", overrides_with = "no_html", default_value_t = false)]
    pub html: bool,
    #[arg(long = "no-html", overrides_with = "html")]
    no_html: bool,

    #[arg(long = "rss", overrides_with = "no_rss", default_value_t = false)]
    pub rss: bool,
    #[arg(long = "no-rss", overrides_with = "rss")]
    no_rss: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    Sqlite,
    Postgresql,
}

impl Config {
    pub fn worker_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }

    pub fn output_root(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| self.channel_root.clone())
    }

    pub fn backend(&self) -> anyhow::Result<Backend> {
        match self.backend {
            BackendKind::Sqlite => Ok(Backend::Embedded),
            BackendKind::Postgresql => {
                let db_url = self
                    .db_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("--backend postgresql requires --db-url or CONDA_INDEX_DBURL"))?;
                Ok(Backend::Server { db_url })
            }
        }
    }
}
