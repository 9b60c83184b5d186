use anyhow::Context;
use chrono::Utc;
use jemallocator::Jemalloc;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use chainstats::{benchmark, PostgresClient, QueryCache, Settings, StatsApi};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to install logger")?;

    let settings = Settings::new()
        .context("Failed to load configuration. Set DB_* variables or provide config.yaml")?;

    let client = PostgresClient::new(&settings.database)
        .await
        .context("Failed to initialize warehouse connection")?;

    let api = StatsApi::new(
        client,
        &settings.database.environment,
        QueryCache::from_settings(&settings.cache),
    )
    .context("Invalid warehouse environment")?;

    let scenarios = benchmark::scenarios(Utc::now());
    let report = benchmark::run(&api, &scenarios, settings.benchmark.runs).await;

    info!("Benchmark finished");
    println!("{report}");

    Ok(())
}
