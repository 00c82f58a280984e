use std::process::ExitCode;

use tracing::{error, info};

use sqlite_pool::utils::logger;
use sqlite_pool::{EntityRepository, LogLevel, PoolConfig, SqlitePool, WorkloadError};

async fn run(pool: SqlitePool) -> Result<(), WorkloadError> {
    pool.initialize().await?;
    let outcome = workload(EntityRepository::new(pool.clone())).await;
    let shutdown = pool.shutdown().await;
    outcome?;
    shutdown?;
    Ok(())
}

async fn workload(repo: EntityRepository) -> Result<(), WorkloadError> {
    info!("creating schema");
    repo.create_schema().await?;

    info!("running 5 tasks concurrently");
    let (first, second, third, updated, entities) = tokio::join!(
        repo.insert("Entity1", "Description of entity 1"),
        repo.insert("Entity2", "Description of entity 2"),
        repo.insert("Entity3", "Description of entity 3"),
        repo.update_description(1, "Updated description of entity 1"),
        repo.select_all(),
    );
    for id in [first?, second?, third?] {
        info!(id, "inserted entity");
    }
    let updated = updated?;
    info!(rows = updated, "updated entity 1");
    for entity in entities? {
        info!(
            id = entity.id,
            name = %entity.name,
            description = entity.description.as_deref().unwrap_or(""),
            created_at = %entity.created_at,
            "entity"
        );
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if let Err(err) = logger::init(LogLevel::Debug) {
        eprintln!("failed to install log subscriber: {err}");
    }

    let config = match std::env::args().nth(1) {
        Some(path) => match PoolConfig::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                error!(path = %path, error = %err, "failed to load config");
                return ExitCode::FAILURE;
            }
        },
        None => PoolConfig {
            release_delay_ms: Some(1000),
            ..PoolConfig::default()
        },
    };

    let pool = match SqlitePool::from_config(&config) {
        Ok(pool) => pool,
        Err(err) => {
            error!(error = %err, "invalid pool configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(pool).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "demo workload failed");
            ExitCode::FAILURE
        }
    }
}
