//! Wires configuration into a running server

use crate::config::{ConfigError, ServerConfig};
use crate::limiting::RateLimiter;
use crate::mailer::LogMailer;
use crate::routes::{router, AppState};
use axum::Router;
use gazette_cache::{MemoryBackend, ResponseCache};
use gazette_core::{Clock, Mailer, MemoryStore, SystemClock};
use gazette_engine::{Pipeline, Services};
use gazette_security::{PasswordHasher, SigningKeys, TokenService};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default time between maintenance sweeps when rate limiting is off
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct Server {
    state: AppState,
    backend: Arc<MemoryBackend>,
    sweep_interval: Duration,
}

impl Server {
    /// Build the service graph with in-process collaborators
    pub fn build(config: &ServerConfig) -> Result<Self, ConfigError> {
        Self::build_with(config, Arc::new(SystemClock), Arc::new(LogMailer))
    }

    pub fn build_with(
        config: &ServerConfig,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let auth = &config.auth;
        let tokens = Arc::new(TokenService::new(
            SigningKeys::new(
                auth.access_secret.as_bytes(),
                auth.refresh_secret.as_bytes(),
                auth.single_use_secret.as_bytes(),
            ),
            auth.tokens.clone(),
            clock.clone(),
        ));
        let passwords = PasswordHasher::new(auth.hashing)
            .map_err(|e| ConfigError::Hashing(e.to_string()))?;
        let backend = Arc::new(MemoryBackend::new(clock.clone()));
        let cache = Arc::new(ResponseCache::new(
            backend.clone(),
            config.cache.clone(),
            clock.clone(),
        ));

        let services = Services {
            store: Arc::new(MemoryStore::new()),
            tokens,
            passwords,
            mailer,
            cache,
            clock,
            accounts: auth.accounts.clone(),
        };
        let pipeline = Arc::new(Pipeline::new(Arc::new(services), config.cost.clone()));

        let mut state =
            AppState::new(pipeline).trust_forwarded_for(config.server.trust_forwarded_for);
        let mut sweep_interval = DEFAULT_SWEEP_INTERVAL;
        if config.rate_limit.enabled {
            state = state.with_limiter(Arc::new(RateLimiter::new(
                config.rate_limit.requests,
                Duration::from_secs(config.rate_limit.window_secs),
            )));
            sweep_interval = Duration::from_secs(config.rate_limit.sweep_interval_secs);
        }

        Ok(Self {
            state,
            backend,
            sweep_interval,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Periodically drop closed rate-limit windows and expired cache entries
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let limiter = self.state.limiter.clone();
        let backend = self.backend.clone();
        let every = self.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let windows = match &limiter {
                    Some(limiter) => limiter.sweep().await,
                    None => 0,
                };
                let entries = backend.purge_expired();
                debug!(windows, entries, "maintenance sweep");
            }
        })
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let maintenance = self.spawn_maintenance();
        let app = self.router();

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        maintenance.abort();
        info!("server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
