//! Composition root.
//!
//! Wires the configured session store, the default script, the two command
//! handlers and the optional collaborators into one [`Assistant`] that a
//! transport layer (chat webhook, payment webhook) can call into.
//!
//! Outside production, missing collaborators fall back to local stand-ins.
//! In production the account provisioner and the checkout provider must be
//! supplied.

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapters::checkout::MockCheckoutProvider;
use crate::adapters::maintenance::{SessionReaper, SessionReaperConfig};
use crate::adapters::memory::InMemorySessionRepository;
use crate::adapters::messaging::LoggingMessenger;
use crate::adapters::postgres::{run_migrations, PostgresSessionRepository};
use crate::adapters::provisioning::MockProvisioner;
use crate::application::{
    CoordinatorError, DispatchMessageCommand, DispatchMessageHandler, DispatchMessageResult,
    HandlePaymentConfirmedCommand, HandlePaymentConfirmedHandler, HandlePaymentConfirmedResult,
};
use crate::config::{AppConfig, DatabaseConfig};
use crate::domain::conversation::{script, ConversationEngine};
use crate::domain::foundation::{DomainError, ErrorCode, IdempotencyKey, UserId};
use crate::domain::provisioning::PaymentConfirmation;
use crate::ports::{AccountProvisioner, CheckoutProvider, OutboundMessenger, SessionRepository};

/// Collaborators supplied by the embedding service.
///
/// Outside production, anything left unset falls back to a local stand-in:
/// the mock provisioner, the mock checkout and the logging messenger.
#[derive(Default)]
pub struct Collaborators {
    pub sessions: Option<Arc<dyn SessionRepository>>,
    pub provisioner: Option<Arc<dyn AccountProvisioner>>,
    pub checkout: Option<Arc<dyn CheckoutProvider>>,
    pub messenger: Option<Arc<dyn OutboundMessenger>>,
}

/// The assembled assistant.
pub struct Assistant {
    sessions: Arc<dyn SessionRepository>,
    dispatch: DispatchMessageHandler,
    payments: HandlePaymentConfirmedHandler,
    reaper: Option<SessionReaperConfig>,
}

impl Assistant {
    /// Builds the assistant from configuration with default collaborators.
    ///
    /// Connects to PostgreSQL when `database.url` is set, otherwise keeps
    /// sessions in memory.
    pub async fn from_config(config: &AppConfig) -> Result<Self, DomainError> {
        Self::with_collaborators(config, Collaborators::default()).await
    }

    /// Validates `config` and builds the assistant around `collaborators`.
    pub async fn with_collaborators(
        config: &AppConfig,
        collaborators: Collaborators,
    ) -> Result<Self, DomainError> {
        config.validate().map_err(|e| {
            DomainError::new(ErrorCode::ValidationFailed, format!("Invalid configuration: {}", e))
        })?;
        if config.is_production() {
            let mut missing = Vec::new();
            if collaborators.provisioner.is_none() {
                missing.push("account provisioner");
            }
            if collaborators.checkout.is_none() {
                missing.push("checkout provider");
            }
            if !missing.is_empty() {
                return Err(DomainError::new(
                    ErrorCode::ValidationFailed,
                    format!("Production requires a real {}", missing.join(" and ")),
                ));
            }
        }

        let sessions = match collaborators.sessions {
            Some(sessions) => sessions,
            None => build_session_store(config).await?,
        };
        let provisioner = collaborators.provisioner.unwrap_or_else(|| {
            tracing::warn!("No account provisioner configured, using the mock provisioner");
            Arc::new(MockProvisioner::new())
        });
        let checkout = collaborators.checkout.unwrap_or_else(|| {
            tracing::warn!("No checkout provider configured, using the mock checkout");
            Arc::new(MockCheckoutProvider::new())
        });
        let messenger = collaborators
            .messenger
            .unwrap_or_else(|| Arc::new(LoggingMessenger::new()));

        let registry = script::default_script()?;
        let engine = Arc::new(ConversationEngine::new(registry));

        let dispatch = DispatchMessageHandler::new(
            sessions.clone(),
            engine,
            config.session.max_save_attempts,
        )
        .with_messenger(messenger.clone())
        .with_checkout(checkout);

        let mut payments = HandlePaymentConfirmedHandler::new(
            sessions.clone(),
            provisioner,
            config.provisioning.settings(),
        );
        if config.provisioning.notify_user {
            payments = payments.with_messenger(messenger);
        }

        let reaper = config.session.reaper_enabled.then(|| {
            SessionReaperConfig::default()
                .with_interval(config.session.reaper_interval())
                .with_retention_days(config.session.purge_after_days)
        });

        Ok(Self {
            sessions,
            dispatch,
            payments,
            reaper,
        })
    }

    /// Handles one inbound chat message and returns the reply.
    pub async fn handle_chat_message(
        &self,
        user_id: UserId,
        text: impl Into<String>,
    ) -> DispatchMessageResult {
        self.dispatch
            .handle(DispatchMessageCommand {
                user_id,
                text: text.into(),
            })
            .await
    }

    /// Handles one payment-confirmed event.
    pub async fn handle_payment_confirmed(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Result<HandlePaymentConfirmedResult, CoordinatorError> {
        self.payments
            .handle(HandlePaymentConfirmedCommand { confirmation })
            .await
    }

    /// Frees a payment event whose claim outlived its lease. Call only after
    /// checking that no account was created for it.
    pub async fn release_stale_claim(
        &self,
        user_id: &UserId,
        key: &IdempotencyKey,
    ) -> Result<bool, CoordinatorError> {
        self.payments.release_stale_claim(user_id, key).await
    }

    pub fn sessions(&self) -> Arc<dyn SessionRepository> {
        self.sessions.clone()
    }

    /// Spawns the session reaper if enabled.
    pub fn spawn_reaper(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let config = self.reaper.clone()?;
        let reaper = SessionReaper::new(self.sessions.clone(), config);
        Some(tokio::spawn(async move { reaper.run(shutdown).await }))
    }
}

async fn build_session_store(config: &AppConfig) -> Result<Arc<dyn SessionRepository>, DomainError> {
    let ttl_secs = config.session.ttl_secs;
    match &config.database.url {
        Some(url) => {
            let pool = connect(&config.database, url.expose_secret()).await?;
            if config.database.run_migrations {
                run_migrations(&pool).await?;
            }
            tracing::info!(ttl_secs, "Using PostgreSQL session store");
            Ok(Arc::new(PostgresSessionRepository::new(pool, ttl_secs)))
        }
        None => {
            tracing::info!(ttl_secs, "Using in-memory session store");
            Ok(Arc::new(InMemorySessionRepository::new(ttl_secs)))
        }
    }
}

async fn connect(config: &DatabaseConfig, url: &str) -> Result<sqlx::PgPool, DomainError> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(Duration::from_secs(600))
        .connect(url)
        .await
        .map_err(|e| DomainError::database(format!("Failed to connect to database: {}", e)))
}
