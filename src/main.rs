use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use homedir::my_home;

mod cli;
mod config;
mod eid;
mod embedding;
mod engine;
mod graph;
mod index;
mod interaction;
mod randomness;
mod service;
mod storage;
mod store;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use embedding::LazyFastembed;
use index::{CancelFlag, IndexManager, IndexStorage, INDEX_FILE};
use randomness::StdRandom;
use service::AppService;
use store::JsonStore;

fn base_path() -> String {
    std::env::var("FEEDRANK_BASE_PATH").unwrap_or(format!(
        "{}/.local/share/feedrank",
        my_home()
            .expect("couldnt find home dir")
            .expect("couldnt find home dir")
            .to_string_lossy()
    ))
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap());
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    let base_path = base_path();
    let config = Config::load_with(&base_path);

    let backend = storage::BackendLocal::new(&base_path)?;
    let store = Arc::new(JsonStore::load(backend.clone())?);

    let embedder = Arc::new(LazyFastembed::new(
        &config.embedding.model,
        PathBuf::from(&base_path),
        Duration::from_secs(config.embedding.download_timeout_secs),
    ));

    let index = Arc::new(IndexManager::new(
        embedder.clone(),
        store.clone(),
        IndexStorage::new(backend.path_of(INDEX_FILE)),
        &config.index,
    ));

    let service = Arc::new(AppService::new(
        store,
        index,
        embedder,
        Arc::new(StdRandom::new()),
    ));

    match args.command {
        cli::Command::Daemon {} => {
            web::start_daemon(service, config.server.bind.clone());
            Ok(())
        }

        cli::Command::Recommend { email, limit } => {
            let response = service.recommend(&email, limit)?;
            print_json(&response);
            Ok(())
        }

        cli::Command::RebuildIndex { incremental } => {
            let outcome = service.rebuild_index(incremental, &CancelFlag::new())?;
            print_json(&outcome);
            Ok(())
        }

        cli::Command::IndexStatus {} => {
            print_json(&service.index_status());
            Ok(())
        }

        cli::Command::Interaction {
            source,
            target,
            stored,
        } => {
            let response = if stored {
                service.stored_interaction(&source, &target)?
            } else {
                service.compute_interaction(&source, &target)?
            };
            print_json(&response);
            Ok(())
        }

        cli::Command::Connections { user_id } => {
            let response = service.connections(&user_id)?;
            print_json(&response);
            Ok(())
        }

        cli::Command::Post { post_id } => {
            let response = service.post_details(&post_id)?;
            print_json(&response);
            Ok(())
        }
    }
}
