//! Command implementations for reposync.
//!
//! Handles:
//! - update: Wire collaborators, trigger a sync or async update, print the result
//! - list: Print repositories from the metadata store
//! - show: Print one repository snapshot

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reposync_coordinator::{
    CommandPipeline, CoordinatorConfig, GitCliSync, GitHubConfig, GitHubDiffSource,
    JsonMetadataStore, MetadataStore, UpdateCoordinator,
};
use reposync_scheduler::JobStatus;
use reposync_service::{ServiceConfig, UpdateService};
use reposync_types::Settings;

use crate::cli::Cli;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    Ok(apply_cli_overrides(settings, cli))
}

/// Apply CLI flags on top of loaded settings.
pub fn apply_cli_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(path) = &cli.metadata_path {
        settings.metadata_path = path.clone();
    }
    settings
}

/// Initialize logging on stderr; stdout carries command output.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Build the update service from settings.
pub fn build_service(settings: &Settings) -> Result<UpdateService> {
    let pipeline = CommandPipeline::from_settings(&settings.pipeline)
        .ok_or_else(|| anyhow!("No update pipeline configured (set pipeline.program)"))?;
    let diff_source = GitHubDiffSource::new(GitHubConfig::from(&settings.github))
        .context("Failed to create GitHub client")?;
    let metadata = JsonMetadataStore::new(settings.expanded_metadata_path());

    let coordinator = UpdateCoordinator::new(
        Arc::new(metadata),
        Arc::new(diff_source),
        Arc::new(GitCliSync::new()),
        Arc::new(pipeline),
        CoordinatorConfig::from(&settings.update),
    );

    Ok(UpdateService::new(
        Arc::new(coordinator),
        ServiceConfig::from(&settings.update),
    ))
}

/// Run an update and print the outcome as JSON.
pub async fn run_update(
    settings: &Settings,
    repository: &str,
    run_async: bool,
    poll_interval: Duration,
) -> Result<()> {
    let service = build_service(settings)?;
    let shutdown = CancellationToken::new();
    let eviction = service.start_eviction(shutdown.clone());

    info!(
        repository = %repository,
        mode = if run_async { "async" } else { "sync" },
        "Triggering update"
    );

    let outcome = if run_async {
        run_async_update(&service, repository, poll_interval).await
    } else {
        run_sync_update(&service, repository).await
    };

    shutdown.cancel();
    if let Err(e) = eviction.await {
        warn!(error = %e, "Job eviction task ended abnormally");
    }
    outcome
}

async fn run_sync_update(service: &UpdateService, repository: &str) -> Result<()> {
    let response = tokio::select! {
        response = service.trigger_sync(repository) => response,
        _ = signal::ctrl_c() => bail!("Interrupted"),
    };

    match response {
        Ok(update) => {
            println!("{}", serde_json::to_string_pretty(&update)?);
            Ok(())
        }
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error)?);
            Err(anyhow!(error))
        }
    }
}

async fn run_async_update(
    service: &UpdateService,
    repository: &str,
    poll_interval: Duration,
) -> Result<()> {
    let accepted = match service.trigger_async(repository) {
        Ok(accepted) => accepted,
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error)?);
            return Err(anyhow!(error));
        }
    };
    eprintln!("{} ({})", accepted.message, accepted.job_id);

    let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(10)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = signal::ctrl_c() => bail!("Interrupted while waiting for job {}", accepted.job_id),
        }

        let job = service.job_status(&accepted.job_id)?;
        debug!(job_id = %job.job_id, status = %job.status, "Polled job");
        if job.status.is_terminal() {
            println!("{}", serde_json::to_string_pretty(&job)?);
            if job.status == JobStatus::Completed {
                return Ok(());
            }
            bail!(
                "Job {} finished with status {}: {}",
                job.job_id,
                job.status,
                job.error.unwrap_or_default()
            );
        }
    }
}

/// Print known repositories, one per line.
pub async fn list_repositories(settings: &Settings) -> Result<()> {
    let store = JsonMetadataStore::new(settings.expanded_metadata_path());
    let repositories = store
        .list_repositories()
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    if repositories.is_empty() {
        println!("No repositories in {}", store.path().display());
        return Ok(());
    }

    for repo in repositories {
        let commit = repo
            .last_indexed_commit_sha
            .as_deref()
            .map(reposync_types::short_sha)
            .unwrap_or("-");
        println!(
            "{:<24} {:<10} {:<8} {:>6} files {:>8} chunks  {}",
            repo.name,
            repo.status.to_string(),
            commit,
            repo.file_count,
            repo.chunk_count,
            repo.branch
        );
    }
    Ok(())
}

/// Print one repository snapshot as JSON.
pub async fn show_repository(settings: &Settings, repository: &str) -> Result<()> {
    let store = JsonMetadataStore::new(settings.expanded_metadata_path());
    let snapshot = store
        .get_repository(repository)
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?
        .ok_or_else(|| anyhow!("Repository not found: {repository}"))?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
