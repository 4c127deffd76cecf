use std::sync::Arc;
use std::time::Duration;

use tracing::{info, Level};

use dialcore::config::{Config, PbxConfig};
use dialcore::engine::{DispatchMode, Engine, EngineConfig, Repositories};
use dialcore::infrastructure::pbx::management::ManagementClient;
use dialcore::infrastructure::pbx::spool::SpoolConfig;
use dialcore::infrastructure::persistence::{
    create_pool, run_migrations, DatabaseConfig as PoolConfig, PgBlacklistRepository, PgCallLogRepository, PgCallerIdStatsRepository,
    PgCampaignRepository, PgConfigRepository, PgContactRepository, PgProjectRepository, PgScheduleRepository, PgTrunkRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    info!("configuration loaded");

    let pool_config = PoolConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        ..Default::default()
    };
    let pool = create_pool(&pool_config).await?;
    run_migrations(&pool).await?;
    info!("database ready");

    let repos = Repositories {
        project: Arc::new(PgProjectRepository::new(pool.clone())),
        campaign: Arc::new(PgCampaignRepository::new(pool.clone())),
        contact: Arc::new(PgContactRepository::new(pool.clone())),
        call_log: Arc::new(PgCallLogRepository::new(pool.clone())),
        schedule: Arc::new(PgScheduleRepository::new(pool.clone())),
        blacklist: Arc::new(PgBlacklistRepository::new(pool.clone())),
        config: Arc::new(PgConfigRepository::new(pool.clone())),
        callerid_stats: Arc::new(PgCallerIdStatsRepository::new(pool.clone())),
        trunk: Arc::new(PgTrunkRepository::new(pool.clone())),
    };

    // The stop signal is created here, not inside `Engine::build`, because
    // the management-channel connection (when that mode is selected) has
    // to already be running before the Engine exists, and it needs a
    // receiver of its own to stop its reader task on the same shutdown.
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);

    let dispatch_mode = match config.pbx.clone() {
        PbxConfig::Management {
            addr,
            username,
            secret,
            originate_timeout_secs,
        } => {
            let client = Arc::new(ManagementClient::connect(&addr, &username, &secret, stop_rx.clone()).await?);
            info!(addr = %addr, "connected to PBX management channel");
            DispatchMode::Management {
                client,
                originate_timeout: Duration::from_secs(originate_timeout_secs),
            }
        }
        PbxConfig::Spool {
            staging_dir,
            spool_dir,
            extension,
            priority,
            max_retries,
            retry_time,
            wait_time,
        } => {
            info!(spool_dir = %spool_dir, "dispatching via file spool");
            DispatchMode::Spool {
                config: SpoolConfig {
                    staging_dir: staging_dir.into(),
                    spool_dir: spool_dir.into(),
                },
                max_retries,
                retry_time,
                wait_time,
                extension,
                priority,
            }
        }
    };

    let engine_config = EngineConfig {
        agi_bind_addr: config.agi.bind_addr.clone(),
        dispatch_mode,
        initial_cps: config.server.initial_cps,
        max_channels_global: config.server.max_channels_global,
        max_channels_per_trunk: config.server.max_channels_per_trunk,
    };

    let (engine, _handle, components) = Engine::build(repos, engine_config, stop_tx);
    engine.run(components);
    info!("dialcore engine running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    engine.shutdown().await;

    Ok(())
}
