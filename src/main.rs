//! CLI entry point for the dictforge tool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dictforge_core::{
    CancelToken, Database, Glossary, HttpClient, Pipeline, PluginError, Store, WorkDir,
    plugin::PolicyOverride, registry,
};
use tracing::{debug, error, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let plugin = match registry::create(&args.plugin, &args.plugin_options) {
        Ok(plugin) => plugin,
        Err(PluginError::UnknownPlugin { name }) => {
            error!(plugin = %name, available = ?registry::names(), "unknown plugin");
            bail!("unknown plugin: {name}");
        }
        Err(error) => return Err(error).context("plugin setup failed"),
    };
    let plugin: Arc<dyn dictforge_core::Plugin> = Arc::new(PolicyOverride::new(
        plugin,
        args.workers.map(usize::from),
        args.no_consolidate,
    ));

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from("data").join(&args.plugin));
    let workdir = WorkDir::new(output);
    workdir.ensure()?;

    let db = Database::new(&workdir.db_path()).await?;
    let store = Store::new(db);

    if args.reset {
        info!(root = %workdir.root().display(), "resetting previous build state");
        store.reset().await?;
        workdir.wipe()?;
    }

    if args.force_reprocess {
        info!("dropping derived entries, keeping fetched payloads");
        store.force_reprocess().await?;
    }

    for (key, value) in plugin.metadata() {
        store.set_metadata(&key, &value).await?;
    }

    let cancel = CancelToken::new();
    let pipeline = Arc::new(Pipeline::standard(
        Arc::clone(&plugin),
        store.clone(),
        workdir,
        HttpClient::new(),
        cancel.clone(),
    ));

    // First Ctrl-C cancels cooperatively; stages unwind with flags intact.
    let interrupt = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing current work");
                pipeline.cancel();
            }
        })
    };

    let ticker = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                interval.tick().await;
                info!(progress = %pipeline.progress(), "working");
            }
        })
    };

    let outcome = pipeline.run().await;
    ticker.abort();
    interrupt.abort();
    outcome.context("pipeline failed")?;

    let glossary = Glossary::collect(&store).await?;
    let alternates: usize = glossary
        .entries
        .iter()
        .map(|entry| entry.alternates.len())
        .sum();
    if cancel.is_cancelled() {
        info!(
            entries = glossary.len(),
            alternates, "stopped early; rerun to resume"
        );
    } else {
        info!(entries = glossary.len(), alternates, "dictionary ready");
    }

    store.database().clone().close().await;
    Ok(())
}
