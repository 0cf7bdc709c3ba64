pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod notifications;
pub mod scheduler;
pub mod validation;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;
use std::time::Duration;

use crate::api::rate_limit::RateLimiter;
use crate::auth::SessionGate;
use crate::crypto::TokenCodec;
use crate::db::{Entity, EntityStore, ServiceBooking};
use crate::error::CoreResult;
use crate::notifications::Notifier;
use crate::scheduler::{BookingScheduler, Clock};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub gate: SessionGate,
    pub scheduler: BookingScheduler,
    pub notifier: Arc<dyn Notifier>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Fails when the token secret is missing in production
    pub fn new(config: Config, db: DbPool, notifier: Arc<dyn Notifier>) -> CoreResult<Self> {
        let environment = config.server.environment;
        let codec = TokenCodec::from_config(&config.auth, environment)?;
        let gate = SessionGate::new(codec, db.clone(), config.auth.clone(), environment);

        let scheduler = BookingScheduler::new(
            Arc::new(EntityStore::<ServiceBooking>::new(db.clone())),
            notifier.clone(),
            config.booking.clone(),
            Duration::from_secs(config.email.send_timeout_secs),
        );

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Ok(Self {
            config,
            db,
            gate,
            scheduler,
            notifier,
            rate_limiter,
        })
    }

    /// Replace the scheduler's clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.scheduler = self.scheduler.with_clock(clock);
        self
    }

    /// Store for one entity kind over the shared pool
    pub fn store<E: Entity>(&self) -> EntityStore<E> {
        EntityStore::new(self.db.clone())
    }
}
