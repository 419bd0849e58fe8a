use clap::Parser;
use conda_index::config::Config;
use conda_index::error::Error;
use conda_index::scheduler::{self, RunOptions};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(config.verbosity.log_level_filter().as_trace())
        .init();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::warn!("received interrupt, cancelling remaining work");
            cancel.cancel();
        });
    }

    let subdirs = if config.subdirs.is_empty() {
        scheduler::discover_subdirs(&config.channel_root)?
    } else {
        config.subdirs.clone()
    };

    let options = RunOptions {
        channel_root: config.channel_root.clone(),
        output_root: config.output_root(),
        subdirs,
        worker_count: config.worker_count(),
        backend: config.backend()?,
        base_url: config.base_url.clone(),
        patch_generator: config.patch_generator.clone(),
        no_update_cache: config.no_update_cache,
        emit_current_index: config.current_index,
        emit_channeldata: config.channeldata,
        emit_run_exports: config.run_exports,
        emit_monolithic: config.monolithic,
        emit_shards: config.shards,
        emit_html: config.html,
        emit_rss: config.rss,
    };

    let outcome = scheduler::run(options, cancel).await;

    match outcome {
        Ok(outcome) if outcome.failed.is_empty() => {
            tracing::info!("indexed {} subdir(s)", outcome.succeeded.len());
            Ok(())
        }
        Ok(outcome) => Err(Error::SubdirsFailed { failed: outcome.failed }.into()),
        Err(err) => Err(err.into()),
    }
}
