//! Shared application state

use anfrage_common::{Config, Result};
use anfrage_core::desk::{InquiryService, Notifier, ReplyService, SettingsService};
use anfrage_core::{DrainWorker, FetchWorker, InboundMailbox, MailTransport};
use anfrage_storage::repository::{
    ApiKeyRepository, DbApiKeyRepository, DbMailSettingsRepository, DbQueueRepository,
    DbStaffRepository, DbTicketRepository, MailSettingsRepository, QueueRepository,
    StaffRepository, TicketRepository,
};
use anfrage_storage::DatabasePool;
use ipnet::IpNet;
use std::sync::Arc;
use std::time::Duration;

/// Repository handles the API works against
#[derive(Clone)]
pub struct Repositories {
    pub tickets: Arc<dyn TicketRepository>,
    pub queue: Arc<dyn QueueRepository>,
    pub settings: Arc<dyn MailSettingsRepository>,
    pub staff: Arc<dyn StaffRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: &DatabasePool) -> Self {
        Self {
            tickets: Arc::new(DbTicketRepository::new(pool.clone())),
            queue: Arc::new(DbQueueRepository::new(pool.clone())),
            settings: Arc::new(DbMailSettingsRepository::new(pool.clone())),
            staff: Arc::new(DbStaffRepository::new(pool.clone())),
            api_keys: Arc::new(DbApiKeyRepository::new(pool.clone())),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub repos: Repositories,
    /// Present when running against PostgreSQL; used by readiness checks
    pub db_pool: Option<DatabasePool>,
    pub drain: DrainWorker,
    pub fetch: FetchWorker,
    pub replies: ReplyService,
    pub inquiries: InquiryService,
    pub settings: SettingsService,
    pub cron_networks: Vec<IpNet>,
    pub cron_token: Option<String>,
    pub cron_max_duration: Duration,
}

impl AppState {
    /// Wire workers and services; fails on an invalid cron network
    pub fn new(
        config: &Config,
        repos: Repositories,
        transport: Arc<dyn MailTransport>,
        mailbox: Arc<dyn InboundMailbox>,
        db_pool: Option<DatabasePool>,
    ) -> Result<Self> {
        let notifier = Notifier::new(config);

        Ok(Self {
            drain: DrainWorker::new(
                repos.queue.clone(),
                repos.settings.clone(),
                transport.clone(),
                &config.queue,
            ),
            fetch: FetchWorker::new(
                repos.tickets.clone(),
                repos.queue.clone(),
                repos.staff.clone(),
                repos.settings.clone(),
                mailbox.clone(),
                notifier.clone(),
                &config.fetch,
            ),
            replies: ReplyService::new(
                repos.tickets.clone(),
                repos.queue.clone(),
                repos.settings.clone(),
                notifier.clone(),
            ),
            inquiries: InquiryService::new(
                repos.tickets.clone(),
                repos.queue.clone(),
                repos.staff.clone(),
                repos.settings.clone(),
                notifier,
            ),
            settings: SettingsService::new(repos.settings.clone(), transport, mailbox),
            cron_networks: config.cron.networks()?,
            cron_token: config.cron.token.clone().filter(|t| !t.is_empty()),
            cron_max_duration: Duration::from_secs(config.cron.max_duration_secs),
            repos,
            db_pool,
        })
    }
}
