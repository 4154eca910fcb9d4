mod compiler;
mod config;
mod error;
mod executer;
mod judger;
mod languages;
mod sandbox;
mod scheduler;
mod server;
mod store;
mod submission;
mod verdict;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::JudgeConfig;
use crate::judger::Judger;
use crate::scheduler::{Scheduler, SchedulerOptions};
use crate::server::AppState;
use crate::store::{ProblemStore, SubmissionLog};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("arena_judge=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Arc::new(JudgeConfig::from_env()?);

    languages::init_languages()?;
    info!(
        "Loaded language configurations: {:?}",
        languages::get_supported_languages()
    );

    // Without cgroup support isolate cannot enforce memory limits; refuse to
    // start rather than judge with limits silently disabled
    sandbox::ensure_cgroups_available().await?;

    let store = Arc::new(
        ProblemStore::load_dir(&config.problems_dir)
            .context("Failed to load the problem set")?,
    );
    anyhow::ensure!(!store.is_empty(), "No problems loaded, nothing to judge");

    let log = config
        .submission_log
        .as_ref()
        .map(|path| Arc::new(SubmissionLog::new(path)));
    if log.is_some() {
        info!("Recording scored submissions to {:?}", config.submission_log);
    }

    let judger = Arc::new(Judger::new(Arc::clone(&config)));
    let scheduler = Arc::new(Scheduler::new(judger, SchedulerOptions::from_config(&config)));

    let state = AppState {
        scheduler,
        store,
        log,
        config: Arc::clone(&config),
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Judge listening on {}", config.listen_addr);

    axum::serve(listener, server::router(state)).await?;

    Ok(())
}
