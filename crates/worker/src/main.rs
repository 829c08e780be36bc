mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use storyreel_db::store::PgStore;
use storyreel_db::DbPool;
use storyreel_events::{EventBus, EventLogger};
use storyreel_pipeline::{Pipeline, PipelineConfig};
use storyreel_providers::{ProviderConfig, ProviderSet};
use storyreel_storage::StorageConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Command};

const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    // --- Database ---
    let pool = connect_database().await?;

    if let Command::Migrate = cli.command {
        storyreel_db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations applied");
        return Ok(());
    }

    // --- Blob storage ---
    let storage_config = StorageConfig::from_env().context("Invalid storage configuration")?;
    let blobs = storage_config
        .build()
        .await
        .context("Failed to initialise blob storage")?;
    tracing::info!(backend = blobs.backend(), "Blob storage ready");

    // --- Providers ---
    let providers = ProviderSet::from_config(&ProviderConfig::from_env())
        .context("Failed to build provider clients")?;

    // --- Event bus ---
    let events = Arc::new(EventBus::default());
    let logger_handle = tokio::spawn(EventLogger::run(events.subscribe()));

    let pipeline = Pipeline::new(
        Arc::new(PgStore::new(pool)),
        blobs,
        providers,
        Arc::clone(&events),
        PipelineConfig::from_env(),
    );

    // --- Cancellation ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Shutdown requested, cancelling in-flight work");
        signal_cancel.cancel();
    });

    let result = execute(&pipeline, cli.command, &cancel).await;

    // Dropping the last sender closes the channel and stops the logger.
    drop(pipeline);
    drop(events);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;

    result
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storyreel_worker=info,storyreel_pipeline=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays machine-readable.
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn connect_database() -> anyhow::Result<DbPool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS);

    let pool = storyreel_db::create_pool(&database_url, max_connections)
        .await
        .context("Failed to connect to database")?;
    storyreel_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!(max_connections, "Database connection pool created");
    Ok(pool)
}

async fn execute(
    pipeline: &Pipeline,
    command: Command,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Migrate => Ok(()),
        Command::Ingest {
            file,
            user,
            chapters,
            style,
            narration_type,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "novel.txt".to_string());

            let resource = pipeline
                .resources()
                .register_upload(user, &name, "text/plain", bytes)
                .await?;
            let service = pipeline.chapters();
            let novel = service
                .create_novel(resource.id, user, style.as_deref(), narration_type.as_deref())
                .await?;
            let created = service.chapter_novel(novel.id, chapters).await?;
            print_json(&serde_json::json!({
                "resource_id": resource.id,
                "novel_id": novel.id,
                "chapters": created
                    .iter()
                    .map(|c| serde_json::json!({ "id": c.id, "sequence": c.sequence, "title": c.title }))
                    .collect::<Vec<_>>(),
            }))
        }
        Command::Narrate { chapter_id } => {
            print_json(&pipeline.narration().generate(chapter_id, cancel).await?)
        }
        Command::Audio {
            narration_id,
            retry,
        } => {
            let audio = pipeline.audio();
            let report = if retry.is_empty() {
                audio.generate_all(narration_id, cancel).await?
            } else {
                audio.retry(narration_id, &retry, cancel).await?
            };
            print_json(&report)
        }
        Command::Subtitle { narration_id } => {
            print_json(&pipeline.subtitles().generate(narration_id).await?)
        }
        Command::Images {
            chapter_id,
            retry_version,
        } => {
            let images = pipeline.images();
            let report = match retry_version {
                Some(version) => images.retry_failed(chapter_id, version, cancel).await?,
                None => images.generate_all(chapter_id, cancel).await?,
            };
            print_json(&report)
        }
        Command::NarrationVideo { chapter_id } => print_json(
            &pipeline
                .videos()
                .generate_narration_videos(chapter_id, cancel)
                .await?,
        ),
        Command::FinalVideo { chapter_id } => print_json(
            &pipeline
                .videos()
                .generate_final_video(chapter_id, cancel)
                .await?,
        ),
        Command::ResumeVideo { video_id } => {
            print_json(&pipeline.videos().resume(video_id, cancel).await?)
        }
        Command::Run { chapter_id } => {
            print_json(&pipeline.run_chapter(chapter_id, cancel).await?)
        }
        Command::Status { chapter_id } => {
            print_json(&pipeline.dependencies().report(chapter_id).await?)
        }
        Command::DeleteResource { resource_id } => {
            pipeline.resources().delete(resource_id).await?;
            print_json(&serde_json::json!({ "deleted": resource_id }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
