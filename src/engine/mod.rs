//! Engine: explicit construction and wiring of every core component
//!
//! Nothing here uses a dependency-injection framework or a lazily built
//! global; `Engine::build` constructs the object graph once, leaf-first,
//! and `Engine::run` spawns one task per long-running component. The
//! wiring order mirrors the data flow: the Log Batcher has no
//! dependency on anything else and starts first; the Channel Pool and
//! Active Call Tracker are the shared accounting primitives the rest of
//! the graph reads from; the Correlator and Orphan Reaper consume that
//! accounting; the IVR server answers inbound inline-script connections;
//! the Dispatcher performs outbound originate and the Sweeper drives it.
//! `Engine::shutdown` signals every task via one shared `watch` channel
//! and joins them in reverse order.

pub mod batcher;
pub mod correlator;
pub mod dispatcher;
pub mod ivr;
pub mod pool;
pub mod reaper;
pub mod sweeper;
pub mod tracker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::blacklist::BlacklistRepository;
use crate::domain::call_log::CallLogRepository;
use crate::domain::callerid_stats::CallerIdStatsRepository;
use crate::domain::campaign::{Campaign, CampaignRepository};
use crate::domain::config_store::{ConfigRepository, OperationalDefaults, KEY_MAX_CHANNELS, KEY_MAX_CPS, KEY_MAX_PER_TRUNK};
use crate::domain::contact::{Contact, ContactRepository};
use crate::domain::project::{Project, ProjectRepository, ProjectRepositoryExt};
use crate::domain::schedule::ScheduleRepository;
use crate::domain::shared::{CampaignId, ContactId, ProjectId, Result};
use crate::domain::trunk::TrunkRepository;
use crate::infrastructure::pbx::agi::AgiServer;
use crate::infrastructure::pbx::management::ManagementClient;
use crate::infrastructure::pbx::spool::{SpoolConfig, SpoolWriter};

use self::batcher::LogBatcher;
use self::correlator::Correlator;
use self::dispatcher::{CpsLimiter, DialRequest, DispatchOutcome, DispatchTransport, Dispatcher, FileSpoolTransport, ManagementTransport};
use self::ivr::IvrHandler;
use self::pool::{ChannelPool, PoolStats};
use self::reaper::OrphanReaper;
use self::sweeper::Sweeper;
use self::tracker::ActiveCallTracker;

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// One field per aggregate's repository port. Built once at startup from
/// the Postgres-backed implementations and shared by every component
/// that needs persistence.
pub struct Repositories {
    pub project: Arc<dyn ProjectRepository>,
    pub campaign: Arc<dyn CampaignRepository>,
    pub contact: Arc<dyn ContactRepository>,
    pub call_log: Arc<dyn CallLogRepository>,
    pub schedule: Arc<dyn ScheduleRepository>,
    pub blacklist: Arc<dyn BlacklistRepository>,
    pub config: Arc<dyn ConfigRepository>,
    pub callerid_stats: Arc<dyn CallerIdStatsRepository>,
    pub trunk: Arc<dyn TrunkRepository>,
}

/// Where the Dispatcher places an outbound call: the PBX management
/// channel's synchronous `Originate` action, or an asynchronous
/// file-spool drop. A deployment picks one at boot.
pub enum DispatchMode {
    Management {
        client: Arc<ManagementClient>,
        originate_timeout: Duration,
    },
    Spool {
        config: SpoolConfig,
        max_retries: i32,
        retry_time: i32,
        wait_time: i32,
        extension: String,
        priority: i32,
    },
}

pub struct EngineConfig {
    pub agi_bind_addr: String,
    pub dispatch_mode: DispatchMode,
    pub initial_cps: i64,
    pub max_channels_global: i64,
    pub max_channels_per_trunk: i64,
}

/// The live object graph plus every background task it owns. Dropping
/// this without calling `shutdown` leaves the tasks running detached;
/// callers are expected to hold it for the process lifetime and shut it
/// down on signal.
pub struct Engine {
    stop_tx: watch::Sender<bool>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
    batcher_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// The single seam an external caller (an out-of-core API layer, a CLI)
/// uses to reach the engine: one write operation, and read-only
/// accessors for the entities a dashboard would want to show.
pub struct EngineHandle {
    repos: Arc<Repositories>,
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<ActiveCallTracker>,
    pool: Arc<ChannelPool>,
}

impl EngineHandle {
    /// Originates a single ad-hoc call outside any campaign (no contact,
    /// no campaign association). Campaign-driven dialing goes through
    /// the Sweeper instead; this exists for operator-triggered test
    /// calls and any future manual-dial surface.
    pub async fn queue_call(&self, project_id: ProjectId, phone: impl Into<String>) -> Result<DispatchOutcome> {
        let project = self.repos.project.require(project_id).await?;
        let request = DialRequest {
            project_id,
            campaign_id: None,
            contact_id: None,
            phone: phone.into(),
        };
        self.dispatcher.dispatch(&project, request).await
    }

    pub async fn project(&self, id: ProjectId) -> Result<Option<Project>> {
        self.repos.project.get(id).await
    }

    pub async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        self.repos.campaign.get(id).await
    }

    pub async fn contact(&self, id: ContactId) -> Result<Option<Contact>> {
        self.repos.contact.get(id).await
    }

    pub async fn active_call_count(&self) -> usize {
        self.tracker.count().await
    }

    pub fn channel_pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl Engine {
    /// Builds the full object graph and returns it alongside the
    /// `EngineHandle` facade, but spawns nothing yet — call `run` to
    /// start the background tasks. `stop_tx` is the single shutdown
    /// signal for the whole process: the caller typically also hands its
    /// `subscribe()`d receiver to anything constructed before the Engine
    /// (e.g. the `ManagementClient` connection, whose reader task must
    /// already be running before `DispatchMode::Management` can be
    /// built), so one `send(true)` stops everything together.
    pub fn build(repos: Repositories, config: EngineConfig, stop_tx: watch::Sender<bool>) -> (Arc<Engine>, EngineHandle, Vec<BackgroundComponent>) {
        let stop_rx = stop_tx.subscribe();
        let repos = Arc::new(repos);

        let pool = Arc::new(ChannelPool::new(config.max_channels_global, config.max_channels_per_trunk));
        let tracker = Arc::new(ActiveCallTracker::new());
        let cps_limiter = Arc::new(CpsLimiter::new(config.initial_cps));

        let (batcher, batcher_handle) = LogBatcher::spawn(repos.call_log.clone(), repos.contact.clone(), stop_rx.clone());
        let batcher = Arc::new(batcher);

        let mut correlator_bus = None;
        let transport: Arc<dyn DispatchTransport> = match config.dispatch_mode {
            DispatchMode::Management { client, originate_timeout } => {
                correlator_bus = Some(client.bus.clone());
                Arc::new(ManagementTransport::new(client, originate_timeout))
            }
            DispatchMode::Spool { config: spool_config, max_retries, retry_time, wait_time, extension, priority } => {
                let writer = Arc::new(SpoolWriter::new(spool_config));
                Arc::new(FileSpoolTransport::new(writer, max_retries, retry_time, wait_time, extension, priority))
            }
        };

        let dispatcher = Arc::new(Dispatcher::new(
            pool.clone(),
            tracker.clone(),
            transport,
            repos.call_log.clone(),
            repos.contact.clone(),
            repos.callerid_stats.clone(),
            repos.trunk.clone(),
            cps_limiter.clone(),
        ));

        let reaper = Arc::new(OrphanReaper::new(tracker.clone(), pool.clone(), repos.call_log.clone(), repos.contact.clone()));

        let ivr_handler = Arc::new(IvrHandler::new(repos.project.clone(), repos.call_log.clone(), batcher.clone()));

        let sweeper = Arc::new(Sweeper::new(
            repos.campaign.clone(),
            repos.contact.clone(),
            repos.schedule.clone(),
            repos.blacklist.clone(),
            repos.config.clone(),
            repos.project.clone(),
            dispatcher.clone(),
        ));

        let mut components = vec![
            BackgroundComponent::Reaper(reaper),
            BackgroundComponent::Agi {
                bind_addr: config.agi_bind_addr,
                handler: ivr_handler,
            },
            BackgroundComponent::Sweeper(sweeper),
            BackgroundComponent::ConfigPoll {
                config_repo: repos.config.clone(),
                pool: pool.clone(),
                cps_limiter: cps_limiter.clone(),
                defaults: OperationalDefaults::default(),
            },
        ];

        // Only the management-channel dispatch mode has an event bus to
        // correlate against; file-spool mode has no asynchronous event
        // stream and relies entirely on the Orphan Reaper to converge.
        if let Some(bus) = correlator_bus {
            let correlator = Arc::new(Correlator::new(bus, tracker.clone(), pool.clone(), repos.call_log.clone(), repos.contact.clone()));
            components.push(BackgroundComponent::Correlator(correlator));
        }

        let handle = EngineHandle {
            repos: repos.clone(),
            dispatcher,
            tracker,
            pool: pool.clone(),
        };

        let engine = Arc::new(Engine {
            stop_tx,
            handles: std::sync::Mutex::new(Vec::new()),
            batcher_handle: std::sync::Mutex::new(Some(batcher_handle)),
        });

        (engine, handle, components)
    }

    /// Spawns every background component returned by `build`. The Log
    /// Batcher and the management-connection reader (if any) are already
    /// running by the time this is called, since they're started earlier.
    pub fn run(self: &Arc<Self>, components: Vec<BackgroundComponent>) {
        let mut handles = self.handles.lock().unwrap();
        for component in components {
            match component {
                BackgroundComponent::Reaper(reaper) => {
                    let stop = self.stop_tx.subscribe();
                    handles.push(tokio::spawn(async move { reaper.run(stop).await }));
                }
                BackgroundComponent::Sweeper(sweeper) => {
                    let stop = self.stop_tx.subscribe();
                    handles.push(tokio::spawn(async move { sweeper.run(stop).await }));
                }
                BackgroundComponent::Correlator(correlator) => {
                    let stop = self.stop_tx.subscribe();
                    handles.push(tokio::spawn(async move { correlator.run(stop).await }));
                }
                BackgroundComponent::Agi { bind_addr, handler } => {
                    let stop = self.stop_tx.subscribe();
                    handles.push(tokio::spawn(async move {
                        if let Err(e) = AgiServer::serve(&bind_addr, handler, stop).await {
                            warn!("agi server exited with error: {e}");
                        }
                    }));
                }
                BackgroundComponent::ConfigPoll {
                    config_repo,
                    pool,
                    cps_limiter,
                    defaults,
                } => {
                    let stop = self.stop_tx.subscribe();
                    handles.push(tokio::spawn(config_poll_loop(config_repo, pool, cps_limiter, defaults, stop)));
                }
            }
        }

        info!("engine running with {} background components", handles.len());
    }

    /// Signals every running task to stop and waits for them to exit,
    /// in reverse of the order they were spawned. The Log Batcher is
    /// joined last since it owns the final flush of whatever arrived
    /// between the stop signal and its own draining.
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        let _ = self.stop_tx.send(true);

        let mut handles = { self.handles.lock().unwrap().drain(..).collect::<Vec<_>>() };
        handles.reverse();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("background component task panicked during shutdown: {e}");
            }
        }

        let batcher_handle = self.batcher_handle.lock().unwrap().take();
        if let Some(handle) = batcher_handle {
            if let Err(e) = handle.await {
                warn!("log batcher task panicked during shutdown: {e}");
            }
        }
    }
}

/// A component `Engine::build` constructed but has not yet spawned.
/// Kept as an enum (rather than a trait object with a uniform `run`)
/// because each component's `run`/`serve` signature differs slightly.
pub enum BackgroundComponent {
    Reaper(Arc<OrphanReaper>),
    Sweeper(Arc<Sweeper>),
    Correlator(Arc<Correlator>),
    Agi {
        bind_addr: String,
        handler: Arc<IvrHandler>,
    },
    ConfigPoll {
        config_repo: Arc<dyn ConfigRepository>,
        pool: Arc<ChannelPool>,
        cps_limiter: Arc<CpsLimiter>,
        defaults: OperationalDefaults,
    },
}

/// Re-reads `max_cps`, `max_channels`, and `max_per_trunk` every 5s so
/// operators can retune without a restart, matching `contacts_per_cycle`'s
/// own fresh-read-per-cycle handling in the Sweeper.
async fn config_poll_loop(
    config_repo: Arc<dyn ConfigRepository>,
    pool: Arc<ChannelPool>,
    cps_limiter: Arc<CpsLimiter>,
    defaults: OperationalDefaults,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(CONFIG_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = stop.changed() => {
                if *stop.borrow() {
                    info!("config poll loop stopping");
                    return;
                }
            }
            _ = interval.tick() => {
                apply_config(&config_repo, &pool, &cps_limiter, &defaults).await;
            }
        }
    }
}

async fn apply_config(config_repo: &Arc<dyn ConfigRepository>, pool: &Arc<ChannelPool>, cps_limiter: &Arc<CpsLimiter>, defaults: &OperationalDefaults) {
    match config_repo.get_int(KEY_MAX_CPS).await {
        Ok(Some(v)) => cps_limiter.reconfigure(v).await,
        Ok(None) => cps_limiter.reconfigure(defaults.max_cps).await,
        Err(e) => warn!("config poll failed to read {KEY_MAX_CPS}: {e}"),
    }
    match config_repo.get_int(KEY_MAX_CHANNELS).await {
        Ok(Some(v)) => pool.set_max_global(v),
        Ok(None) => pool.set_max_global(defaults.max_channels),
        Err(e) => warn!("config poll failed to read {KEY_MAX_CHANNELS}: {e}"),
    }
    match config_repo.get_int(KEY_MAX_PER_TRUNK).await {
        Ok(Some(v)) => pool.set_max_per_trunk(v),
        Ok(None) => pool.set_max_per_trunk(defaults.max_per_trunk),
        Err(e) => warn!("config poll failed to read {KEY_MAX_PER_TRUNK}: {e}"),
    }
}
