//! DispatchMessageHandler - runs one inbound chat message through the engine.
//!
//! Load, step, compare-and-save. A version conflict reloads the session and
//! re-runs the handler against the newer state with the same inbound text,
//! up to `max_save_attempts`. The caller always gets a reply: the handler's,
//! the engine's fallback, or a transient-failure text when the store is
//! unavailable or every attempt conflicted.
//!
//! A step that requests checkout gets its payment link before the save. The
//! link is created at most once per message, even across conflict retries.
//! If it cannot be created the turn is dropped: nothing is saved and the
//! user is told to try again.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::conversation::{
    keys, ConversationEngine, ConversationState, Effect, ScratchpadPatch, SessionVersion, StepKind,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::provisioning::CheckoutRequest;
use crate::ports::{CheckoutLink, CheckoutProvider, OutboundMessenger, SaveResult, SessionRepository};

/// Reply sent when the turn could not be persisted.
pub const TRANSIENT_FAILURE_REPLY: &str =
    "Sorry, we couldn't process your message right now. Please try again in a moment.";

/// Reply sent when the payment link could not be created.
pub const CHECKOUT_FAILURE_REPLY: &str =
    "Sorry, we could not generate the payment link right now. Please send your e-mail again in a moment.";

/// Command carrying one inbound chat message.
#[derive(Debug, Clone)]
pub struct DispatchMessageCommand {
    pub user_id: UserId,
    pub text: String,
}

/// How the turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The state handler ran and its transition was saved.
    Applied,
    /// No handler was bound; the session was reset to the initial state and saved.
    HandlerMissing,
    /// Nothing was saved; the user got the transient-failure reply.
    TransientFailure,
    /// The payment link could not be created; nothing was saved.
    CheckoutFailed,
}

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchMessageResult {
    pub reply: String,
    pub outcome: DispatchOutcome,
    /// State persisted by this turn, if anything was persisted.
    pub state: Option<ConversationState>,
    /// Version persisted by this turn, if anything was persisted.
    pub version: Option<SessionVersion>,
    /// Number of save attempts made.
    pub attempts: u32,
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    Store(#[from] DomainError),

    #[error("Gave up after {attempts} conflicting saves")]
    RetriesExhausted { attempts: u32 },
}

/// Handler for inbound chat messages.
pub struct DispatchMessageHandler {
    sessions: Arc<dyn SessionRepository>,
    engine: Arc<ConversationEngine>,
    messenger: Option<Arc<dyn OutboundMessenger>>,
    checkout: Option<Arc<dyn CheckoutProvider>>,
    max_save_attempts: u32,
    transient_reply: String,
}

impl DispatchMessageHandler {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        engine: Arc<ConversationEngine>,
        max_save_attempts: u32,
    ) -> Self {
        Self {
            sessions,
            engine,
            messenger: None,
            checkout: None,
            max_save_attempts: max_save_attempts.max(1),
            transient_reply: TRANSIENT_FAILURE_REPLY.to_string(),
        }
    }

    /// Delivers every reply through `messenger` after the turn completes.
    pub fn with_messenger(mut self, messenger: Arc<dyn OutboundMessenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    /// Creates payment links for steps that request checkout.
    pub fn with_checkout(mut self, checkout: Arc<dyn CheckoutProvider>) -> Self {
        self.checkout = Some(checkout);
        self
    }

    pub fn with_transient_reply(mut self, reply: impl Into<String>) -> Self {
        self.transient_reply = reply.into();
        self
    }

    pub async fn handle(&self, cmd: DispatchMessageCommand) -> DispatchMessageResult {
        let result = match self.dispatch(&cmd).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    user_id = %cmd.user_id,
                    error = %err,
                    "Chat turn not persisted, replying with transient failure"
                );
                DispatchMessageResult {
                    reply: self.transient_reply.clone(),
                    outcome: DispatchOutcome::TransientFailure,
                    state: None,
                    version: None,
                    attempts: match err {
                        DispatchError::RetriesExhausted { attempts } => attempts,
                        DispatchError::Store(_) => 0,
                    },
                }
            }
        };

        if let Some(messenger) = &self.messenger {
            if let Err(e) = messenger.send_text(&cmd.user_id, &result.reply).await {
                tracing::warn!(user_id = %cmd.user_id, error = %e, "Failed to deliver reply");
            }
        }
        result
    }

    async fn dispatch(
        &self,
        cmd: &DispatchMessageCommand,
    ) -> Result<DispatchMessageResult, DispatchError> {
        let mut checkout: Option<(CheckoutRequest, CheckoutLink)> = None;
        for attempt in 1..=self.max_save_attempts {
            let mut session = self.sessions.load(&cmd.user_id).await?;
            let expected = session.version();
            let mut step = self.engine.step(&mut session, &cmd.text, Timestamp::now());

            if let Some(effect) = step.effect.take() {
                match self.run_effect(&cmd.user_id, effect, &mut checkout).await {
                    Ok(link) => {
                        session.patch_scratchpad(
                            &ScratchpadPatch::none()
                                .set(keys::CHECKOUT_REFERENCE, link.reference.clone())
                                .set(keys::CHECKOUT_URL, link.url.clone()),
                        );
                        step.reply = format!("{}\n{}", step.reply, link.url);
                    }
                    Err(err) => {
                        tracing::warn!(
                            user_id = %cmd.user_id,
                            state = %step.from,
                            error = %err,
                            "Payment link not created, keeping the conversation where it was"
                        );
                        return Ok(DispatchMessageResult {
                            reply: CHECKOUT_FAILURE_REPLY.to_string(),
                            outcome: DispatchOutcome::CheckoutFailed,
                            state: None,
                            version: None,
                            attempts: attempt,
                        });
                    }
                }
            }

            match self.sessions.compare_and_save(&session, expected).await? {
                SaveResult::Saved(version) => {
                    tracing::info!(
                        user_id = %cmd.user_id,
                        from = %step.from,
                        to = %step.to,
                        version = %version,
                        attempt,
                        "Chat turn applied"
                    );
                    return Ok(DispatchMessageResult {
                        reply: step.reply,
                        outcome: match step.kind {
                            StepKind::Handled => DispatchOutcome::Applied,
                            StepKind::HandlerMissing => DispatchOutcome::HandlerMissing,
                        },
                        state: Some(step.to),
                        version: Some(version),
                        attempts: attempt,
                    });
                }
                SaveResult::Conflict => {
                    tracing::debug!(
                        user_id = %cmd.user_id,
                        attempt,
                        expected = %expected,
                        "Session changed during chat turn, retrying"
                    );
                }
            }
        }
        Err(DispatchError::RetriesExhausted {
            attempts: self.max_save_attempts,
        })
    }

    /// Runs a handler-requested effect. A link created on an earlier attempt
    /// for the same request is reused.
    async fn run_effect(
        &self,
        user_id: &UserId,
        effect: Effect,
        cached: &mut Option<(CheckoutRequest, CheckoutLink)>,
    ) -> Result<CheckoutLink, DomainError> {
        let Effect::StartCheckout {
            domain,
            contact_email,
        } = effect;
        let request = CheckoutRequest::new(user_id.clone(), &domain, &contact_email)?;
        if let Some((previous, link)) = cached.as_ref() {
            if *previous == request {
                return Ok(link.clone());
            }
        }
        let provider = self.checkout.as_ref().ok_or_else(|| {
            DomainError::new(ErrorCode::CheckoutFailed, "No checkout provider configured")
        })?;
        let link = provider.create_checkout(&request).await?;
        tracing::info!(
            user_id = %user_id,
            domain = %request.domain,
            checkout_reference = %link.reference,
            "Payment link created"
        );
        *cached = Some((request, link.clone()));
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::checkout::MockCheckoutProvider;
    use crate::adapters::memory::InMemorySessionRepository;
    use crate::adapters::messaging::MockMessenger;
    use crate::domain::conversation::{script, Session, StateRegistry, DEFAULT_FALLBACK_REPLY};
    use crate::domain::provisioning::metadata;
    use crate::ports::{CheckoutError, MessagingError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════════════════

    /// Store whose every operation fails.
    struct UnavailableRepository;

    #[async_trait]
    impl SessionRepository for UnavailableRepository {
        async fn load(&self, _user_id: &UserId) -> Result<Session, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn compare_and_save(
            &self,
            _session: &Session,
            _expected: SessionVersion,
        ) -> Result<SaveResult, DomainError> {
            Err(DomainError::database("connection refused"))
        }

        async fn purge_idle_before(&self, _cutoff: Timestamp) -> Result<u64, DomainError> {
            Err(DomainError::database("connection refused"))
        }
    }

    /// Wraps the in-memory store and reports a conflict for the first
    /// `conflicts` saves without writing anything.
    struct ConflictingRepository {
        inner: InMemorySessionRepository,
        conflicts: AtomicU32,
    }

    impl ConflictingRepository {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: InMemorySessionRepository::new(1800),
                conflicts: AtomicU32::new(conflicts),
            }
        }
    }

    #[async_trait]
    impl SessionRepository for ConflictingRepository {
        async fn load(&self, user_id: &UserId) -> Result<Session, DomainError> {
            self.inner.load(user_id).await
        }

        async fn compare_and_save(
            &self,
            session: &Session,
            expected: SessionVersion,
        ) -> Result<SaveResult, DomainError> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Ok(SaveResult::Conflict);
            }
            self.inner.compare_and_save(session, expected).await
        }

        async fn purge_idle_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
            self.inner.purge_idle_before(cutoff).await
        }
    }

    fn user() -> UserId {
        UserId::new("5551999990000").unwrap()
    }

    fn engine() -> Arc<ConversationEngine> {
        Arc::new(ConversationEngine::new(script::default_script().unwrap()))
    }

    fn command(text: &str) -> DispatchMessageCommand {
        DispatchMessageCommand {
            user_id: user(),
            text: text.to_string(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Happy path
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn option_one_advances_to_tech_ops() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        let handler = DispatchMessageHandler::new(repo.clone(), engine(), 3);

        let result = handler.handle(command("1")).await;

        assert_eq!(result.outcome, DispatchOutcome::Applied);
        assert_eq!(result.state, Some(ConversationState::TechOpsStart));
        assert_eq!(result.version, Some(SessionVersion::from_raw(1)));
        assert!(result.reply.contains("type of business"));
        let stored = repo.stored(&user()).await.unwrap();
        assert_eq!(stored.state(), ConversationState::TechOpsStart);
    }

    #[tokio::test]
    async fn whitespace_input_is_routed_to_handler() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        let handler = DispatchMessageHandler::new(repo, engine(), 3);

        let result = handler.handle(command("   ")).await;

        assert_eq!(result.outcome, DispatchOutcome::Applied);
        assert_eq!(result.state, Some(ConversationState::Initial));
        assert_eq!(result.reply, script::MAIN_MENU);
    }

    #[tokio::test]
    async fn missing_handler_resets_and_persists() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        let mut session = Session::new(user(), Timestamp::now());
        session.move_to(ConversationState::Support, Timestamp::now());
        repo.compare_and_save(&session, SessionVersion::unsaved())
            .await
            .unwrap();

        let handler = DispatchMessageHandler::new(
            repo.clone(),
            Arc::new(ConversationEngine::new(StateRegistry::new())),
            3,
        );
        let result = handler.handle(command("help")).await;

        assert_eq!(result.outcome, DispatchOutcome::HandlerMissing);
        assert_eq!(result.reply, DEFAULT_FALLBACK_REPLY);
        assert_eq!(result.state, Some(ConversationState::Initial));
        assert_eq!(
            repo.stored(&user()).await.unwrap().state(),
            ConversationState::Initial
        );
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Conflicts and failures
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn retries_after_conflict() {
        let repo = Arc::new(ConflictingRepository::new(2));
        let handler = DispatchMessageHandler::new(repo.clone(), engine(), 3);

        let result = handler.handle(command("2")).await;

        assert_eq!(result.outcome, DispatchOutcome::Applied);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.state, Some(ConversationState::ClientLogin));
    }

    #[tokio::test]
    async fn exhausted_retries_reply_with_transient_failure() {
        let repo = Arc::new(ConflictingRepository::new(10));
        let handler = DispatchMessageHandler::new(repo.clone(), engine(), 3);

        let result = handler.handle(command("2")).await;

        assert_eq!(result.outcome, DispatchOutcome::TransientFailure);
        assert_eq!(result.reply, TRANSIENT_FAILURE_REPLY);
        assert_eq!(result.attempts, 3);
        assert!(repo.inner.stored(&user()).await.is_none());
    }

    #[tokio::test]
    async fn unavailable_store_replies_with_transient_failure() {
        let handler = DispatchMessageHandler::new(Arc::new(UnavailableRepository), engine(), 3)
            .with_transient_reply("Try again later.");

        let result = handler.handle(command("1")).await;

        assert_eq!(result.outcome, DispatchOutcome::TransientFailure);
        assert_eq!(result.reply, "Try again later.");
        assert_eq!(result.state, None);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Delivery
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn delivers_reply_through_messenger() {
        let messenger = Arc::new(MockMessenger::new());
        let handler = DispatchMessageHandler::new(
            Arc::new(InMemorySessionRepository::new(1800)),
            engine(),
            3,
        )
        .with_messenger(messenger.clone());

        let result = handler.handle(command("3")).await;

        assert_eq!(messenger.sent_to(&user()), vec![result.reply]);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_undo_the_turn() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        let messenger = Arc::new(MockMessenger::new());
        messenger.set_error(Some(MessagingError::Unavailable("503".into())));
        let handler =
            DispatchMessageHandler::new(repo.clone(), engine(), 3).with_messenger(messenger);

        let result = handler.handle(command("3")).await;

        assert_eq!(result.outcome, DispatchOutcome::Applied);
        assert_eq!(
            repo.stored(&user()).await.unwrap().state(),
            ConversationState::Support
        );
    }

    #[tokio::test]
    async fn transient_failure_is_still_delivered() {
        let messenger = Arc::new(MockMessenger::new());
        let handler = DispatchMessageHandler::new(Arc::new(UnavailableRepository), engine(), 3)
            .with_messenger(messenger.clone());

        handler.handle(command("1")).await;

        assert_eq!(messenger.sent_to(&user()), vec![TRANSIENT_FAILURE_REPLY]);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Checkout
    // ════════════════════════════════════════════════════════════════════════════

    fn awaiting_email() -> Session {
        let now = Timestamp::now();
        let mut session = Session::new(user(), now);
        session.patch_scratchpad(&ScratchpadPatch::none().set(keys::DOMAIN, "shop.com.br"));
        session.move_to(ConversationState::TechOpsContactEmail, now);
        session
    }

    #[tokio::test]
    async fn email_turn_sends_payment_link() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        repo.compare_and_save(&awaiting_email(), SessionVersion::unsaved())
            .await
            .unwrap();
        let checkout = Arc::new(MockCheckoutProvider::new());
        let handler =
            DispatchMessageHandler::new(repo.clone(), engine(), 3).with_checkout(checkout.clone());

        let result = handler.handle(command("owner@shop.com.br")).await;

        assert_eq!(result.outcome, DispatchOutcome::Applied);
        assert_eq!(result.state, Some(ConversationState::AwaitingPayment));
        let stored = repo.stored(&user()).await.unwrap();
        let url = stored.scratchpad().get(keys::CHECKOUT_URL).unwrap();
        assert!(result.reply.ends_with(url));
        assert!(stored
            .scratchpad()
            .get(keys::CHECKOUT_REFERENCE)
            .unwrap()
            .starts_with("cs_mock_"));

        let calls = checkout.calls();
        assert_eq!(calls.len(), 1);
        let sent = calls[0].metadata();
        assert_eq!(sent[metadata::USER_ID], user().as_str());
        assert_eq!(sent[metadata::DOMAIN], "shop.com.br");
    }

    #[tokio::test]
    async fn checkout_failure_keeps_state_and_saves_nothing() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        repo.compare_and_save(&awaiting_email(), SessionVersion::unsaved())
            .await
            .unwrap();
        let checkout = Arc::new(MockCheckoutProvider::new());
        checkout.fail_next(CheckoutError::Unavailable("503".into()));
        let handler =
            DispatchMessageHandler::new(repo.clone(), engine(), 3).with_checkout(checkout.clone());

        let result = handler.handle(command("owner@shop.com.br")).await;

        assert_eq!(result.outcome, DispatchOutcome::CheckoutFailed);
        assert_eq!(result.reply, CHECKOUT_FAILURE_REPLY);
        assert_eq!(result.state, None);
        let stored = repo.stored(&user()).await.unwrap();
        assert_eq!(stored.state(), ConversationState::TechOpsContactEmail);
        assert_eq!(stored.version(), SessionVersion::from_raw(1));
        assert!(stored.scratchpad().get(keys::CONTACT_EMAIL).is_none());

        // The user simply sends the e-mail again.
        let retry = handler.handle(command("owner@shop.com.br")).await;
        assert_eq!(retry.state, Some(ConversationState::AwaitingPayment));
        assert_eq!(checkout.call_count(), 2);
    }

    #[tokio::test]
    async fn missing_checkout_provider_fails_the_turn() {
        let repo = Arc::new(InMemorySessionRepository::new(1800));
        repo.compare_and_save(&awaiting_email(), SessionVersion::unsaved())
            .await
            .unwrap();
        let handler = DispatchMessageHandler::new(repo.clone(), engine(), 3);

        let result = handler.handle(command("owner@shop.com.br")).await;

        assert_eq!(result.outcome, DispatchOutcome::CheckoutFailed);
        assert_eq!(
            repo.stored(&user()).await.unwrap().state(),
            ConversationState::TechOpsContactEmail
        );
    }

    #[tokio::test]
    async fn conflict_retries_reuse_the_payment_link() {
        let repo = Arc::new(ConflictingRepository::new(2));
        repo.inner
            .compare_and_save(&awaiting_email(), SessionVersion::unsaved())
            .await
            .unwrap();
        let checkout = Arc::new(MockCheckoutProvider::new());
        let handler =
            DispatchMessageHandler::new(repo.clone(), engine(), 3).with_checkout(checkout.clone());

        let result = handler.handle(command("owner@shop.com.br")).await;

        assert_eq!(result.outcome, DispatchOutcome::Applied);
        assert_eq!(result.attempts, 3);
        assert_eq!(checkout.call_count(), 1);
    }
}
