//! Postgres-backed implementations of the domain's repository traits

pub mod blacklist_repository;
pub mod call_log_repository;
pub mod callerid_stats_repository;
pub mod campaign_repository;
pub mod config_repository;
pub mod contact_repository;
pub mod database;
pub mod project_repository;
pub mod schedule_repository;
pub mod trunk_repository;

pub use blacklist_repository::PgBlacklistRepository;
pub use call_log_repository::PgCallLogRepository;
pub use callerid_stats_repository::PgCallerIdStatsRepository;
pub use campaign_repository::PgCampaignRepository;
pub use config_repository::PgConfigRepository;
pub use contact_repository::PgContactRepository;
pub use database::{create_pool, run_migrations, DatabaseConfig};
pub use project_repository::PgProjectRepository;
pub use schedule_repository::PgScheduleRepository;
pub use trunk_repository::PgTrunkRepository;
