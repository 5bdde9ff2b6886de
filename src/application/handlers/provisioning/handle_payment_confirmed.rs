//! HandlePaymentConfirmedHandler - provisions a hosting account once per
//! payment event.
//!
//! Payment events arrive at least once and may be redelivered at any time,
//! including concurrently. The handler keeps account creation at most once
//! per idempotency key using the ledger stored on the session:
//!
//! 1. **Claim.** Load the session. A processed key returns immediately; a
//!    key with a live claim is in flight elsewhere; a stale claim is
//!    reported as unresolved. Otherwise write a claim (random token, lease)
//!    through compare-and-save.
//! 2. **Provision.** Call the provisioner once, bounded by a timeout that
//!    ends before the lease does. A timeout keeps the claim: the account
//!    may exist, so the key waits for an operator instead of a retry.
//! 3. **Mark provisioned.** Replace the claim with a provisioned entry
//!    that has no lease. From here on no delivery calls the provisioner.
//! 4. **Apply.** Mark the key processed, move the session to
//!    awaiting-credentials and save, re-applying on conflict. A redelivery
//!    that finds a provisioned entry runs only this step.
//! 5. **Release.** On a definite provisioning failure, drop our claim so a
//!    redelivery can try again. The conversation is untouched.
//! 6. **Notify.** Optionally tell the user; failures are logged only.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::conversation::{keys, ConversationState, ScratchpadPatch, Session, SessionVersion};
use crate::domain::foundation::{ClaimToken, DomainError, IdempotencyKey, Timestamp, UserId};
use crate::domain::provisioning::{LedgerStatus, PaymentConfirmation, ProvisioningRecord};
use crate::ports::{AccountProvisioner, OutboundMessenger, ProvisioningError, SaveResult, SessionRepository};

/// Command carrying one payment-confirmed event.
#[derive(Debug, Clone)]
pub struct HandlePaymentConfirmedCommand {
    pub confirmation: PaymentConfirmation,
}

/// Result of handling a payment-confirmed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlePaymentConfirmedResult {
    /// The account was created by this delivery.
    Provisioned {
        username: String,
        domain: String,
        version: SessionVersion,
    },
    /// An earlier delivery created the account; this one finished the
    /// session update without calling the provisioner.
    Resumed {
        username: String,
        domain: String,
        version: SessionVersion,
    },
    /// An earlier delivery already provisioned this key.
    AlreadyProcessed,
    /// Another delivery holds a live claim on this key.
    InFlight,
}

/// Failures surfaced to the payment ingress for operator alerting.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Session store unavailable: {0}")]
    Store(#[from] DomainError),

    #[error("Gave up after {attempts} conflicting saves")]
    RetriesExhausted { attempts: u32 },

    #[error("Provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// The provisioner did not answer in time. The claim is kept and goes
    /// stale with its lease.
    #[error("Provisioning did not answer within {timeout:?}, outcome unknown")]
    ProvisioningTimedOut { timeout: Duration },

    /// A claim outlived its lease without a result.
    #[error(
        "Payment was claimed at {} and never resolved; check the control panel, then release the stale claim",
        .claimed_at.as_datetime()
    )]
    Unresolved { claimed_at: Timestamp },

    /// The account exists but the ledger does not say so. The claim stays
    /// in place, so redeliveries end up unresolved instead of provisioning.
    #[error("Account '{username}' for {domain} was created but could not be recorded: {reason}")]
    PersistAfterProvisioning {
        domain: String,
        username: String,
        reason: String,
    },

    /// The account is recorded as provisioned but the conversation has not
    /// moved yet. A redelivery finishes the update.
    #[error("Account '{username}' for {domain} is provisioned but the session update is pending: {reason}")]
    SessionUpdatePending {
        domain: String,
        username: String,
        reason: String,
    },
}

impl CoordinatorError {
    /// Whether redelivering the same payment event may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoordinatorError::Store(_)
            | CoordinatorError::RetriesExhausted { .. }
            | CoordinatorError::SessionUpdatePending { .. } => true,
            CoordinatorError::Provisioning(e) => e.is_retryable(),
            CoordinatorError::ProvisioningTimedOut { .. }
            | CoordinatorError::Unresolved { .. }
            | CoordinatorError::PersistAfterProvisioning { .. } => false,
        }
    }
}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    /// Hosting plan passed to the provisioner.
    pub plan: String,
    /// How long a claim blocks other deliveries of the same key.
    pub claim_lease_secs: u64,
    /// Upper bound on one provisioner call.
    pub provision_timeout_secs: u64,
    /// Bound on compare-and-save attempts per phase.
    pub max_save_attempts: u32,
}

impl ProvisioningSettings {
    /// Effective bound on one provisioner call: the configured timeout,
    /// capped at four fifths of the claim lease.
    pub fn provision_timeout(&self) -> Duration {
        let lease = Duration::from_secs(self.claim_lease_secs);
        Duration::from_secs(self.provision_timeout_secs).min(lease * 4 / 5)
    }
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            plan: "Dresbach-Start".to_string(),
            claim_lease_secs: 300,
            provision_timeout_secs: 120,
            max_save_attempts: 3,
        }
    }
}

enum ClaimOutcome {
    Claimed,
    AlreadyProcessed,
    InFlight,
    Stale(Timestamp),
    Provisioned(ProvisioningRecord),
}

/// Handler for payment-confirmed events.
pub struct HandlePaymentConfirmedHandler {
    sessions: Arc<dyn SessionRepository>,
    provisioner: Arc<dyn AccountProvisioner>,
    messenger: Option<Arc<dyn OutboundMessenger>>,
    settings: ProvisioningSettings,
}

impl HandlePaymentConfirmedHandler {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        provisioner: Arc<dyn AccountProvisioner>,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            sessions,
            provisioner,
            messenger: None,
            settings: ProvisioningSettings {
                claim_lease_secs: settings.claim_lease_secs.max(1),
                max_save_attempts: settings.max_save_attempts.max(1),
                ..settings
            },
        }
    }

    /// Sends a confirmation message to the user after provisioning.
    pub fn with_messenger(mut self, messenger: Arc<dyn OutboundMessenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    pub async fn handle(
        &self,
        cmd: HandlePaymentConfirmedCommand,
    ) -> Result<HandlePaymentConfirmedResult, CoordinatorError> {
        let confirmation = &cmd.confirmation;
        let token = ClaimToken::new();

        match self.claim(confirmation, token).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessed => {
                tracing::info!(
                    user_id = %confirmation.user_id,
                    idempotency_key = %confirmation.idempotency_key,
                    "Payment event already processed, skipping"
                );
                return Ok(HandlePaymentConfirmedResult::AlreadyProcessed);
            }
            ClaimOutcome::InFlight => {
                tracing::info!(
                    user_id = %confirmation.user_id,
                    idempotency_key = %confirmation.idempotency_key,
                    "Payment event is being processed by another delivery"
                );
                return Ok(HandlePaymentConfirmedResult::InFlight);
            }
            ClaimOutcome::Stale(claimed_at) => {
                tracing::error!(
                    user_id = %confirmation.user_id,
                    idempotency_key = %confirmation.idempotency_key,
                    domain = %confirmation.domain,
                    claimed_at = %claimed_at.as_datetime(),
                    "Payment event has a stale claim, operator action required"
                );
                return Err(CoordinatorError::Unresolved { claimed_at });
            }
            ClaimOutcome::Provisioned(record) => {
                tracing::info!(
                    user_id = %confirmation.user_id,
                    idempotency_key = %confirmation.idempotency_key,
                    username = %record.username,
                    "Account already provisioned, finishing session update"
                );
                let version = self.apply(confirmation, &record).await?;
                return Ok(HandlePaymentConfirmedResult::Resumed {
                    username: record.username,
                    domain: record.domain,
                    version,
                });
            }
        }

        let request = confirmation.to_request(self.settings.plan.clone());
        let timeout = self.settings.provision_timeout();
        let account = match tokio::time::timeout(timeout, self.provisioner.provision(&request)).await {
            Ok(Ok(account)) => account,
            Ok(Err(err)) => {
                tracing::error!(
                    user_id = %confirmation.user_id,
                    idempotency_key = %confirmation.idempotency_key,
                    domain = %confirmation.domain,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Payment received but provisioning failed"
                );
                if let Err(release_err) = self.release(confirmation, token).await {
                    tracing::warn!(
                        idempotency_key = %confirmation.idempotency_key,
                        error = %release_err,
                        "Could not release provisioning claim; it will go stale with its lease"
                    );
                }
                return Err(err.into());
            }
            Err(_) => {
                tracing::error!(
                    user_id = %confirmation.user_id,
                    idempotency_key = %confirmation.idempotency_key,
                    domain = %confirmation.domain,
                    timeout_ms = timeout.as_millis() as u64,
                    "Provisioning timed out, keeping the claim"
                );
                return Err(CoordinatorError::ProvisioningTimedOut { timeout });
            }
        };

        let record = ProvisioningRecord {
            idempotency_key: confirmation.idempotency_key.clone(),
            domain: account.domain,
            username: account.username,
            provisioned_at: Timestamp::now(),
        };

        self.mark_provisioned(confirmation, &record)
            .await
            .map_err(|err| {
                tracing::error!(
                    user_id = %confirmation.user_id,
                    idempotency_key = %confirmation.idempotency_key,
                    domain = %record.domain,
                    username = %record.username,
                    error = %err,
                    "Account provisioned but not recorded"
                );
                CoordinatorError::PersistAfterProvisioning {
                    domain: record.domain.clone(),
                    username: record.username.clone(),
                    reason: err.to_string(),
                }
            })?;

        let version = self.apply(confirmation, &record).await?;

        tracing::info!(
            user_id = %confirmation.user_id,
            idempotency_key = %confirmation.idempotency_key,
            domain = %record.domain,
            username = %record.username,
            version = %version,
            "Account provisioned"
        );

        Ok(HandlePaymentConfirmedResult::Provisioned {
            username: record.username,
            domain: record.domain,
            version,
        })
    }

    /// Drops a claim that outlived its lease so the payment event can be
    /// delivered again.
    ///
    /// Returns false if the key has no stale claim. Only call this after
    /// checking that no account was created for the payment.
    pub async fn release_stale_claim(
        &self,
        user_id: &UserId,
        key: &IdempotencyKey,
    ) -> Result<bool, CoordinatorError> {
        for attempt in 1..=self.settings.max_save_attempts {
            let mut session = self.sessions.load(user_id).await?;
            let expected = session.version();
            if !session.ledger_mut().clear_stale(key, Timestamp::now()) {
                return Ok(false);
            }
            if self.save(&session, expected, attempt, "release-stale").await? {
                tracing::warn!(
                    user_id = %user_id,
                    idempotency_key = %key,
                    "Stale provisioning claim released"
                );
                return Ok(true);
            }
        }
        Err(CoordinatorError::RetriesExhausted {
            attempts: self.settings.max_save_attempts,
        })
    }

    async fn claim(
        &self,
        confirmation: &PaymentConfirmation,
        token: ClaimToken,
    ) -> Result<ClaimOutcome, CoordinatorError> {
        let key = &confirmation.idempotency_key;
        for attempt in 1..=self.settings.max_save_attempts {
            let mut session = self.sessions.load(&confirmation.user_id).await?;
            let now = Timestamp::now();
            match session.ledger().status(key, now) {
                LedgerStatus::Processed(_) => return Ok(ClaimOutcome::AlreadyProcessed),
                LedgerStatus::InFlight(_) => return Ok(ClaimOutcome::InFlight),
                LedgerStatus::Stale(claim) => return Ok(ClaimOutcome::Stale(claim.claimed_at)),
                LedgerStatus::Provisioned(record) => return Ok(ClaimOutcome::Provisioned(record)),
                LedgerStatus::Fresh => {}
            }

            let expected = session.version();
            session
                .ledger_mut()
                .try_claim(key, token, now, self.settings.claim_lease_secs);
            if self.save(&session, expected, attempt, "claim").await? {
                return Ok(ClaimOutcome::Claimed);
            }
        }
        Err(CoordinatorError::RetriesExhausted {
            attempts: self.settings.max_save_attempts,
        })
    }

    async fn mark_provisioned(
        &self,
        confirmation: &PaymentConfirmation,
        record: &ProvisioningRecord,
    ) -> Result<(), CoordinatorError> {
        for attempt in 1..=self.settings.max_save_attempts {
            let mut session = self.sessions.load(&confirmation.user_id).await?;
            if session.ledger().is_processed(&record.idempotency_key) {
                return Ok(());
            }
            let expected = session.version();
            session.ledger_mut().mark_provisioned(record.clone());
            if self.save(&session, expected, attempt, "mark-provisioned").await? {
                return Ok(());
            }
        }
        Err(CoordinatorError::RetriesExhausted {
            attempts: self.settings.max_save_attempts,
        })
    }

    /// Records the key as processed and moves the conversation on. Notifies
    /// the user only if this call made the change.
    async fn apply(
        &self,
        confirmation: &PaymentConfirmation,
        record: &ProvisioningRecord,
    ) -> Result<SessionVersion, CoordinatorError> {
        let pending = |reason: String| {
            tracing::error!(
                user_id = %confirmation.user_id,
                idempotency_key = %confirmation.idempotency_key,
                domain = %record.domain,
                username = %record.username,
                error = %reason,
                "Account provisioned but session update failed"
            );
            CoordinatorError::SessionUpdatePending {
                domain: record.domain.clone(),
                username: record.username.clone(),
                reason,
            }
        };
        let patch = ScratchpadPatch::none()
            .set(keys::PROVISIONED_DOMAIN, record.domain.clone())
            .set(keys::PAYMENT_REFERENCE, confirmation.idempotency_key.as_str());

        for attempt in 1..=self.settings.max_save_attempts {
            let mut session = self
                .sessions
                .load(&confirmation.user_id)
                .await
                .map_err(|e| pending(e.to_string()))?;
            if session.ledger().is_processed(&record.idempotency_key) {
                return Ok(session.version());
            }
            let expected = session.version();
            session.ledger_mut().record(record.clone());
            session.patch_scratchpad(&patch);
            session.move_to(ConversationState::AwaitingCredentials, Timestamp::now());

            let saved = self
                .save(&session, expected, attempt, "apply")
                .await
                .map_err(|e| pending(e.to_string()))?;
            if saved {
                self.notify(confirmation, &record.domain).await;
                return Ok(expected.next());
            }
        }
        Err(pending(format!(
            "gave up after {} conflicting saves",
            self.settings.max_save_attempts
        )))
    }

    async fn release(
        &self,
        confirmation: &PaymentConfirmation,
        token: ClaimToken,
    ) -> Result<(), CoordinatorError> {
        for attempt in 1..=self.settings.max_save_attempts {
            let mut session = self.sessions.load(&confirmation.user_id).await?;
            let expected = session.version();
            if !session
                .ledger_mut()
                .release(&confirmation.idempotency_key, token)
            {
                return Ok(());
            }
            if self.save(&session, expected, attempt, "release").await? {
                return Ok(());
            }
        }
        Err(CoordinatorError::RetriesExhausted {
            attempts: self.settings.max_save_attempts,
        })
    }

    /// Returns true if saved, false on conflict.
    async fn save(
        &self,
        session: &Session,
        expected: SessionVersion,
        attempt: u32,
        phase: &'static str,
    ) -> Result<bool, CoordinatorError> {
        match self.sessions.compare_and_save(session, expected).await? {
            SaveResult::Saved(_) => Ok(true),
            SaveResult::Conflict => {
                tracing::debug!(
                    user_id = %session.user_id(),
                    attempt,
                    phase,
                    expected = %expected,
                    "Session changed during provisioning, retrying"
                );
                Ok(false)
            }
        }
    }

    async fn notify(&self, confirmation: &PaymentConfirmation, domain: &str) {
        let Some(messenger) = &self.messenger else {
            return;
        };
        let body = format!(
            "Great news! Your payment was confirmed and the hosting account for {} \
             has been created. Your access details will be sent to {} shortly.",
            domain, confirmation.contact_email
        );
        if let Err(e) = messenger.send_text(&confirmation.user_id, &body).await {
            tracing::warn!(
                user_id = %confirmation.user_id,
                error = %e,
                "Failed to send provisioning confirmation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemorySessionRepository;
    use crate::adapters::messaging::MockMessenger;
    use crate::adapters::provisioning::MockProvisioner;
    use crate::ports::MessagingError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn user() -> UserId {
        UserId::new("5551999990000").unwrap()
    }

    fn confirmation(key: &str) -> PaymentConfirmation {
        PaymentConfirmation::new(
            IdempotencyKey::new(key).unwrap(),
            user(),
            "shop.com.br",
            "owner@shop.com.br",
        )
        .unwrap()
    }

    fn command(key: &str) -> HandlePaymentConfirmedCommand {
        HandlePaymentConfirmedCommand {
            confirmation: confirmation(key),
        }
    }

    struct Fixture {
        repo: Arc<InMemorySessionRepository>,
        provisioner: Arc<MockProvisioner>,
        messenger: Arc<MockMessenger>,
        handler: HandlePaymentConfirmedHandler,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        fixture_with(repo.clone(), repo, MockProvisioner::new(), ProvisioningSettings::default())
    }

    fn fixture_with(
        repo: Arc<InMemorySessionRepository>,
        sessions: Arc<dyn SessionRepository>,
        provisioner: MockProvisioner,
        settings: ProvisioningSettings,
    ) -> Fixture {
        let provisioner = Arc::new(provisioner);
        let messenger = Arc::new(MockMessenger::new());
        let handler = HandlePaymentConfirmedHandler::new(sessions, provisioner.clone(), settings)
            .with_messenger(messenger.clone());
        Fixture {
            repo,
            provisioner,
            messenger,
            handler,
        }
    }

    fn one_second_lease() -> ProvisioningSettings {
        ProvisioningSettings {
            claim_lease_secs: 1,
            ..ProvisioningSettings::default()
        }
    }

    /// Lets the first `healthy_saves` saves through, then refuses every
    /// write until healed.
    struct RefusingSaves {
        inner: Arc<InMemorySessionRepository>,
        healthy_saves: u32,
        saves: AtomicU32,
        healed: AtomicBool,
    }

    impl RefusingSaves {
        fn after(inner: Arc<InMemorySessionRepository>, healthy_saves: u32) -> Self {
            Self {
                inner,
                healthy_saves,
                saves: AtomicU32::new(0),
                healed: AtomicBool::new(false),
            }
        }

        fn heal(&self) {
            self.healed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SessionRepository for RefusingSaves {
        async fn load(&self, user_id: &UserId) -> Result<Session, DomainError> {
            self.inner.load(user_id).await
        }

        async fn compare_and_save(
            &self,
            session: &Session,
            expected: SessionVersion,
        ) -> Result<SaveResult, DomainError> {
            let n = self.saves.fetch_add(1, Ordering::SeqCst);
            if n >= self.healthy_saves && !self.healed.load(Ordering::SeqCst) {
                return Err(DomainError::database("write refused"));
            }
            self.inner.compare_and_save(session, expected).await
        }

        async fn purge_idle_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
            self.inner.purge_idle_before(cutoff).await
        }
    }

    fn key(s: &str) -> IdempotencyKey {
        IdempotencyKey::new(s).unwrap()
    }

    async fn seed_awaiting_payment(repo: &InMemorySessionRepository) {
        let mut session = Session::new(user(), Timestamp::now());
        session.move_to(ConversationState::AwaitingPayment, Timestamp::now());
        repo.compare_and_save(&session, SessionVersion::unsaved())
            .await
            .unwrap();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Fresh key
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn fresh_key_provisions_once_and_moves_to_awaiting_credentials() {
        let f = fixture();
        seed_awaiting_payment(&f.repo).await;

        let result = f.handler.handle(command("cs_1")).await.unwrap();

        assert!(matches!(
            result,
            HandlePaymentConfirmedResult::Provisioned { ref username, ref domain, .. }
                if username == "shop" && domain == "shop.com.br"
        ));
        assert_eq!(f.provisioner.call_count(), 1);
        assert_eq!(f.provisioner.calls()[0].plan, "Dresbach-Start");

        let stored = f.repo.stored(&user()).await.unwrap();
        assert_eq!(stored.state(), ConversationState::AwaitingCredentials);
        assert!(stored.ledger().is_processed(&key("cs_1")));
        assert_eq!(stored.scratchpad().get(keys::PROVISIONED_DOMAIN), Some("shop.com.br"));
        assert_eq!(stored.scratchpad().get(keys::PAYMENT_REFERENCE), Some("cs_1"));
    }

    #[tokio::test]
    async fn result_version_matches_stored_version() {
        let f = fixture();
        let result = f.handler.handle(command("cs_1")).await.unwrap();

        let HandlePaymentConfirmedResult::Provisioned { version, .. } = result else {
            panic!("expected Provisioned, got {:?}", result);
        };
        assert_eq!(f.repo.stored(&user()).await.unwrap().version(), version);
    }

    #[tokio::test]
    async fn sends_confirmation_message() {
        let f = fixture();
        f.handler.handle(command("cs_1")).await.unwrap();

        let sent = f.messenger.sent_to(&user());
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("shop.com.br"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Redelivery
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn redelivery_has_no_side_effects() {
        let f = fixture();
        seed_awaiting_payment(&f.repo).await;
        f.handler.handle(command("cs_1")).await.unwrap();
        let after_first = f.repo.stored(&user()).await.unwrap();

        let result = f.handler.handle(command("cs_1")).await.unwrap();

        assert_eq!(result, HandlePaymentConfirmedResult::AlreadyProcessed);
        assert_eq!(f.provisioner.call_count(), 1);
        assert_eq!(f.messenger.sent_count(), 1);
        assert_eq!(f.repo.stored(&user()).await.unwrap(), after_first);
    }

    #[tokio::test]
    async fn distinct_keys_each_provision() {
        let f = fixture();
        f.handler.handle(command("cs_1")).await.unwrap();
        f.handler.handle(command("cs_2")).await.unwrap();

        assert_eq!(f.provisioner.call_count(), 2);
        assert_eq!(f.repo.stored(&user()).await.unwrap().ledger().processed_count(), 2);
    }

    #[tokio::test]
    async fn live_claim_reports_in_flight() {
        let f = fixture();
        let mut session = f.repo.load(&user()).await.unwrap();
        session
            .ledger_mut()
            .try_claim(&key("cs_1"), ClaimToken::new(), Timestamp::now(), 300);
        f.repo.compare_and_save(&session, session.version()).await.unwrap();

        let result = f.handler.handle(command("cs_1")).await.unwrap();

        assert_eq!(result, HandlePaymentConfirmedResult::InFlight);
        assert_eq!(f.provisioner.call_count(), 0);
    }

    #[tokio::test]
    async fn stale_claim_is_reported_without_provisioning() {
        let f = fixture();
        let mut session = f.repo.load(&user()).await.unwrap();
        session.ledger_mut().try_claim(
            &key("cs_1"),
            ClaimToken::new(),
            Timestamp::now().minus_secs(600),
            300,
        );
        f.repo.compare_and_save(&session, session.version()).await.unwrap();

        let err = f.handler.handle(command("cs_1")).await.unwrap_err();

        assert!(matches!(err, CoordinatorError::Unresolved { .. }));
        assert!(!err.is_retryable());
        assert_eq!(f.provisioner.call_count(), 0);
    }

    #[tokio::test]
    async fn released_stale_claim_can_be_provisioned() {
        let f = fixture();
        let mut session = f.repo.load(&user()).await.unwrap();
        session.ledger_mut().try_claim(
            &key("cs_1"),
            ClaimToken::new(),
            Timestamp::now().minus_secs(600),
            300,
        );
        f.repo.compare_and_save(&session, session.version()).await.unwrap();

        assert!(f.handler.release_stale_claim(&user(), &key("cs_1")).await.unwrap());
        let result = f.handler.handle(command("cs_1")).await.unwrap();

        assert!(matches!(result, HandlePaymentConfirmedResult::Provisioned { .. }));
        assert_eq!(f.provisioner.call_count(), 1);
    }

    #[tokio::test]
    async fn live_claim_is_not_released_as_stale() {
        let f = fixture();
        let mut session = f.repo.load(&user()).await.unwrap();
        session
            .ledger_mut()
            .try_claim(&key("cs_1"), ClaimToken::new(), Timestamp::now(), 300);
        f.repo.compare_and_save(&session, session.version()).await.unwrap();

        assert!(!f.handler.release_stale_claim(&user(), &key("cs_1")).await.unwrap());
        assert!(f.repo.stored(&user()).await.unwrap().ledger().claim_for(&key("cs_1")).is_some());
    }

    #[tokio::test]
    async fn provisioned_entry_is_finished_without_calling_provisioner() {
        let f = fixture();
        seed_awaiting_payment(&f.repo).await;
        let mut session = f.repo.load(&user()).await.unwrap();
        session.ledger_mut().mark_provisioned(ProvisioningRecord {
            idempotency_key: key("cs_1"),
            domain: "shop.com.br".to_string(),
            username: "shop".to_string(),
            provisioned_at: Timestamp::now().minus_secs(86_400),
        });
        f.repo.compare_and_save(&session, session.version()).await.unwrap();

        let result = f.handler.handle(command("cs_1")).await.unwrap();

        assert!(matches!(
            result,
            HandlePaymentConfirmedResult::Resumed { ref username, .. } if username == "shop"
        ));
        assert_eq!(f.provisioner.call_count(), 0);
        let stored = f.repo.stored(&user()).await.unwrap();
        assert_eq!(stored.state(), ConversationState::AwaitingCredentials);
        assert!(stored.ledger().is_processed(&key("cs_1")));
        assert_eq!(f.messenger.sent_count(), 1);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Slow provisioner and lost writes
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn provision_timeout_stays_below_lease() {
        let settings = ProvisioningSettings::default();
        assert_eq!(settings.provision_timeout(), Duration::from_secs(120));

        let short_lease = ProvisioningSettings {
            claim_lease_secs: 10,
            ..ProvisioningSettings::default()
        };
        assert_eq!(short_lease.provision_timeout(), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn slow_provisioner_outliving_lease_is_called_once() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        let f = Arc::new(fixture_with(
            repo.clone(),
            repo,
            MockProvisioner::new().with_delay(Duration::from_millis(1500)),
            one_second_lease(),
        ));
        seed_awaiting_payment(&f.repo).await;

        let first = {
            let f = f.clone();
            tokio::spawn(async move { f.handler.handle(command("cs_1")).await })
        };
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = f.handler.handle(command("cs_1")).await;
        let first = first.await.unwrap();

        let first_err = first.unwrap_err();
        assert!(matches!(first_err, CoordinatorError::ProvisioningTimedOut { .. }));
        assert!(!first_err.is_retryable());
        assert!(matches!(second, Err(CoordinatorError::Unresolved { .. })));
        assert_eq!(f.provisioner.call_count(), 1);
        let stored = f.repo.stored(&user()).await.unwrap();
        assert_eq!(stored.state(), ConversationState::AwaitingPayment);
        assert!(stored.ledger().claim_for(&key("cs_1")).is_some());
    }

    #[tokio::test]
    async fn unrecorded_account_is_not_provisioned_again_after_lease() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        // Claim lands, the provisioned marker does not.
        let sessions = Arc::new(RefusingSaves::after(repo.clone(), 1));
        let f = fixture_with(repo, sessions.clone(), MockProvisioner::new(), one_second_lease());
        seed_awaiting_payment(&f.repo).await;

        let err = f.handler.handle(command("cs_1")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::PersistAfterProvisioning { .. }));
        assert!(!err.is_retryable());

        sessions.heal();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        let redelivery = f.handler.handle(command("cs_1")).await;

        assert!(matches!(redelivery, Err(CoordinatorError::Unresolved { .. })));
        assert_eq!(f.provisioner.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_session_update_is_finished_by_redelivery() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        // Claim and provisioned marker land, the state change does not.
        let sessions = Arc::new(RefusingSaves::after(repo.clone(), 2));
        let f = fixture_with(repo, sessions.clone(), MockProvisioner::new(), one_second_lease());
        seed_awaiting_payment(&f.repo).await;

        let err = f.handler.handle(command("cs_1")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::SessionUpdatePending { .. }));
        assert!(err.is_retryable());
        assert_eq!(
            f.repo.stored(&user()).await.unwrap().state(),
            ConversationState::AwaitingPayment
        );

        sessions.heal();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        let redelivery = f.handler.handle(command("cs_1")).await.unwrap();

        assert!(matches!(
            redelivery,
            HandlePaymentConfirmedResult::Resumed { ref domain, .. } if domain == "shop.com.br"
        ));
        assert_eq!(f.provisioner.call_count(), 1);
        let stored = f.repo.stored(&user()).await.unwrap();
        assert_eq!(stored.state(), ConversationState::AwaitingCredentials);
        assert!(stored.ledger().is_processed(&key("cs_1")));
        assert_eq!(f.messenger.sent_count(), 1);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failures
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn provisioning_failure_leaves_key_unprocessed_and_state_unchanged() {
        let f = fixture();
        seed_awaiting_payment(&f.repo).await;
        f.provisioner
            .fail_next(ProvisioningError::Unavailable("timeout".into()));

        let err = f.handler.handle(command("cs_1")).await.unwrap_err();

        assert!(matches!(err, CoordinatorError::Provisioning(_)));
        assert!(err.is_retryable());
        let stored = f.repo.stored(&user()).await.unwrap();
        assert_eq!(stored.state(), ConversationState::AwaitingPayment);
        assert!(!stored.ledger().is_processed(&key("cs_1")));
        assert!(stored.ledger().claim_for(&key("cs_1")).is_none());
        assert_eq!(f.messenger.sent_count(), 0);
    }

    #[tokio::test]
    async fn retry_after_failure_provisions() {
        let f = fixture();
        f.provisioner
            .fail_next(ProvisioningError::Unavailable("timeout".into()));
        assert!(f.handler.handle(command("cs_1")).await.is_err());

        let result = f.handler.handle(command("cs_1")).await.unwrap();

        assert!(matches!(result, HandlePaymentConfirmedResult::Provisioned { .. }));
        assert_eq!(f.provisioner.call_count(), 2);
    }

    #[tokio::test]
    async fn rejected_provisioning_is_not_retryable() {
        let f = fixture();
        f.provisioner
            .fail_next(ProvisioningError::Rejected("plan unknown".into()));

        let err = f.handler.handle(command("cs_1")).await.unwrap_err();

        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn messaging_failure_does_not_fail_provisioning() {
        let f = fixture();
        f.messenger
            .set_error(Some(MessagingError::Unavailable("503".into())));

        let result = f.handler.handle(command("cs_1")).await.unwrap();

        assert!(matches!(result, HandlePaymentConfirmedResult::Provisioned { .. }));
        assert_eq!(
            f.repo.stored(&user()).await.unwrap().state(),
            ConversationState::AwaitingCredentials
        );
    }

    #[test]
    fn coordinator_error_retryability() {
        assert!(CoordinatorError::Store(DomainError::database("down")).is_retryable());
        assert!(CoordinatorError::RetriesExhausted { attempts: 3 }.is_retryable());
        assert!(!CoordinatorError::PersistAfterProvisioning {
            domain: "shop.com".into(),
            username: "shop".into(),
            reason: "conflict".into(),
        }
        .is_retryable());
        assert!(CoordinatorError::SessionUpdatePending {
            domain: "shop.com".into(),
            username: "shop".into(),
            reason: "conflict".into(),
        }
        .is_retryable());
        assert!(!CoordinatorError::ProvisioningTimedOut {
            timeout: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!CoordinatorError::Unresolved {
            claimed_at: Timestamp::now()
        }
        .is_retryable());
    }
}
