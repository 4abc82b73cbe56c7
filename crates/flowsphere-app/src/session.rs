//! Session provider: current identity plus sign-in, sign-up and sign-out.

use crate::cache::QueryCache;
use crate::retry::RetryPolicy;
use flowsphere_core::{Session, User};
use flowsphere_notify::{Notification, NotificationSink};
use flowsphere_remote::{AuthService, RemoteError, RemoteStore};
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

const USERS: &str = "users";
const EVENT_CAPACITY: usize = 16;

/// Session transition pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A session became available.
    SignedIn(User),
    /// The user signed out.
    SignedOut,
    /// The held session passed its expiry and was dropped.
    SessionExpired,
}

type Renewal<'a> = Pin<Box<dyn Future<Output = Option<Session>> + 'a>>;

/// Renews or drops an expired session on behalf of a [`SessionWatch`].
trait Renew: Send + Sync {
    fn renew(&self) -> Renewal<'_>;
}

/// Read-only view of the current session.
///
/// Cheap to clone; every clone observes the same provider.
#[derive(Clone)]
pub struct SessionWatch {
    rx: watch::Receiver<Option<Session>>,
    renew: Arc<dyn Renew>,
}

impl fmt::Debug for SessionWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionWatch")
            .field("session", &*self.rx.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionWatch {
    /// The session, unless absent or expired.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.rx
            .borrow()
            .as_ref()
            .filter(|session| !session.is_expired(OffsetDateTime::now_utc()))
            .cloned()
    }

    /// The session, renewing it first when it has expired.
    ///
    /// A session that cannot be renewed is dropped for every subscriber and
    /// reported as [`AuthEvent::SessionExpired`].
    pub async fn current_or_renew(&self) -> Option<Session> {
        let held = self.rx.borrow().clone()?;
        if !held.is_expired(OffsetDateTime::now_utc()) {
            return Some(held);
        }
        self.renew.renew().await
    }

    /// Wait for the next change.
    ///
    /// # Errors
    /// Returns an error once the provider is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

#[derive(Clone, Copy)]
enum AuthOp {
    SignIn,
    SignUp,
    SignOut,
}

impl AuthOp {
    const fn title(self) -> &'static str {
        match self {
            Self::SignIn => "Sign In Failed",
            Self::SignUp => "Sign Up Failed",
            Self::SignOut => "Sign Out Failed",
        }
    }

    const fn fallback(self) -> &'static str {
        match self {
            Self::SignIn => "Failed to sign in",
            Self::SignUp => "Failed to sign up",
            Self::SignOut => "Failed to sign out",
        }
    }

    const fn unexpected(self) -> &'static str {
        match self {
            Self::SignIn => "An unexpected error occurred during sign in",
            Self::SignUp => "An unexpected error occurred during sign up",
            Self::SignOut => "An unexpected error occurred during sign out",
        }
    }

    /// Service refusals keep their message; transport failures become generic.
    fn message(self, err: &RemoteError) -> String {
        match err {
            RemoteError::Auth(_) | RemoteError::Api { .. } => err
                .remote_message()
                .unwrap_or_else(|| self.fallback())
                .to_owned(),
            RemoteError::NotConfigured => err.to_string(),
            _ => self.unexpected().to_owned(),
        }
    }
}

/// Session state shared between the provider and every [`SessionWatch`].
struct Shared<A, N> {
    auth: A,
    sink: N,
    state: watch::Sender<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    cache: OnceLock<Arc<QueryCache>>,
}

impl<A, N> Shared<A, N>
where
    A: AuthService,
    N: NotificationSink,
{
    fn publish_signed_in(&self, session: Session) {
        let user = session.user.clone();
        let switched = self
            .state
            .borrow()
            .as_ref()
            .is_some_and(|previous| previous.user_id() != user.id);
        if switched {
            self.clear_cache();
        }
        self.state.send_replace(Some(session));
        let _ = self.events.send(AuthEvent::SignedIn(user));
    }

    fn clear_session(&self, event: AuthEvent) {
        self.state.send_replace(None);
        self.clear_cache();
        let _ = self.events.send(event);
    }

    fn clear_cache(&self) {
        if let Some(cache) = self.cache.get() {
            cache.clear();
        }
    }

    fn expire(&self, session: &Session) {
        info!(user = %session.user_id(), "Session expired");
        self.clear_session(AuthEvent::SessionExpired);
        self.sink.notify(Notification::info(
            "Session expired",
            "Please sign in again.",
        ));
    }

    /// Ask the auth service for a fresh session in place of an expired one.
    async fn renew_expired(&self) -> Option<Session> {
        let held = self.state.borrow().clone()?;
        let now = OffsetDateTime::now_utc();
        if !held.is_expired(now) {
            return Some(held);
        }
        if held.refresh_token.is_some() {
            match self.auth.get_session().await {
                Ok(Some(renewed)) if !renewed.is_expired(now) => {
                    debug!(user = %renewed.user_id(), "Session renewed");
                    self.state.send_replace(Some(renewed.clone()));
                    return Some(renewed);
                }
                Ok(_) => {}
                Err(err) if err.is_transient() => {
                    // Keep the session so the next call can try again.
                    warn!(error = %err, "Session renewal failed");
                    return None;
                }
                Err(err) => warn!(error = %err, "Session renewal rejected"),
            }
        }
        // Another caller may have renewed or cleared it meanwhile.
        let still_held = self
            .state
            .borrow()
            .as_ref()
            .is_some_and(|current| current.is_expired(now));
        if still_held {
            self.expire(&held);
        }
        None
    }
}

impl<A, N> Renew for Shared<A, N>
where
    A: AuthService,
    N: NotificationSink,
{
    fn renew(&self) -> Renewal<'_> {
        Box::pin(self.renew_expired())
    }
}

/// Owns the authenticated session and exposes it reactively.
///
/// Failures never propagate as errors: every method reports a user-facing
/// message and a destructive notification instead.
pub struct SessionProvider<A, S, N> {
    shared: Arc<Shared<A, N>>,
    store: S,
    retry: RetryPolicy,
    loading: AtomicBool,
    last_error: Mutex<Option<String>>,
    pending_profile: Mutex<Option<User>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<A, S, N> SessionProvider<A, S, N>
where
    A: AuthService + 'static,
    S: RemoteStore,
    N: NotificationSink + 'static,
{
    /// Provider with no session yet; call [`Self::initialize`] to load one.
    pub fn new(auth: A, store: S, sink: N) -> Self {
        let (state, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                auth,
                sink,
                state,
                events,
                cache: OnceLock::new(),
            }),
            store,
            retry: RetryPolicy::default(),
            loading: AtomicBool::new(true),
            last_error: Mutex::new(None),
            pending_profile: Mutex::new(None),
        }
    }

    /// Retry policy for profile provisioning.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cache cleared whenever the signed-in user changes.
    #[must_use]
    pub fn with_query_cache(self, cache: Arc<QueryCache>) -> Self {
        if self.shared.cache.set(cache).is_err() {
            warn!("Query cache already attached");
        }
        self
    }

    /// Load the session held by the auth service.
    pub async fn initialize(&self) {
        match self.shared.auth.get_session().await {
            Ok(session) => {
                debug!(signed_in = session.is_some(), "Loaded initial session");
                *guard(&self.last_error) = None;
                if let Some(session) = session {
                    self.shared.publish_signed_in(session);
                }
            }
            Err(err) => {
                error!(error = %err, "Error getting session");
                *guard(&self.last_error) = Some(err.to_string());
            }
        }
        self.loading.store(false, Ordering::SeqCst);
    }

    /// Current session; an expired one is dropped and reported.
    pub fn current(&self) -> Option<Session> {
        let session = self.shared.state.borrow().clone()?;
        if session.is_expired(OffsetDateTime::now_utc()) {
            self.shared.expire(&session);
            return None;
        }
        Some(session)
    }

    /// Current session, renewed through the auth service when it has expired.
    pub async fn refresh_if_expired(&self) -> Option<Session> {
        self.shared.renew_expired().await
    }

    /// Reactive view of the session for consumers.
    #[must_use]
    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch {
            rx: self.shared.state.subscribe(),
            renew: self.shared.clone(),
        }
    }

    /// Session transitions as they happen.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.shared.events.subscribe()
    }

    /// Whether an auth operation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Message of the most recent failure, cleared when the next operation starts.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        guard(&self.last_error).clone()
    }

    /// Profile row still waiting to be written after a partial sign-up.
    #[must_use]
    pub fn pending_profile(&self) -> Option<User> {
        guard(&self.pending_profile).clone()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    /// Returns the user-facing failure message.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), String> {
        self.begin();
        let result = self.shared.auth.sign_in_with_password(email, password).await;
        self.loading.store(false, Ordering::SeqCst);
        let session = result.map_err(|err| self.fail(AuthOp::SignIn, &err))?;
        info!(user = %session.user_id(), "Signed in");
        let user = session.user.clone();
        self.shared.publish_signed_in(session);
        self.resume_pending_profile(&user).await;
        Ok(())
    }

    /// Register an account and provision its profile row.
    ///
    /// A profile insert that still fails after retries does not fail the
    /// sign-up; it is kept pending and written after the next sign-in.
    ///
    /// # Errors
    /// Returns the user-facing failure message when registration fails.
    pub async fn sign_up(&self, email: &str, password: &str, name: Option<&str>) -> Result<(), String> {
        self.begin();
        let result = self.shared.auth.sign_up(email, password, name).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.loading.store(false, Ordering::SeqCst);
                return Err(self.fail(AuthOp::SignUp, &err));
            }
        };
        info!(user = %outcome.user.id, "Signed up");
        if let Some(session) = outcome.session {
            self.shared.publish_signed_in(session);
        }
        if let Err(err) = self.provision_profile(&outcome.user).await {
            warn!(user = %outcome.user.id, error = %err, "Profile provisioning deferred");
            *guard(&self.pending_profile) = Some(outcome.user);
            self.shared.sink.notify(Notification::info(
                "Profile setup pending",
                "Your account was created. We'll finish setting up your profile the next time you sign in.",
            ));
        }
        self.loading.store(false, Ordering::SeqCst);
        self.shared.sink.notify(Notification::success(
            "Sign Up Successful",
            "Please check your email to verify your account.",
        ));
        Ok(())
    }

    /// End the current session.
    ///
    /// # Errors
    /// Returns the user-facing failure message.
    pub async fn sign_out(&self) -> Result<(), String> {
        self.begin();
        let result = self.shared.auth.sign_out().await;
        self.loading.store(false, Ordering::SeqCst);
        result.map_err(|err| self.fail(AuthOp::SignOut, &err))?;
        info!("Signed out");
        self.shared.clear_session(AuthEvent::SignedOut);
        Ok(())
    }

    fn begin(&self) {
        self.loading.store(true, Ordering::SeqCst);
        *guard(&self.last_error) = None;
    }

    fn fail(&self, op: AuthOp, err: &RemoteError) -> String {
        let message = op.message(err);
        error!(error = %err, "{}", op.title());
        *guard(&self.last_error) = Some(message.clone());
        self.shared
            .sink
            .notify(Notification::destructive(op.title(), message.clone()));
        message
    }

    async fn provision_profile(&self, user: &User) -> Result<(), RemoteError> {
        let mut row = json!({ "id": user.id.to_string(), "email": user.email });
        if let Some(name) = &user.name {
            row["name"] = json!(name);
        }
        let inserted = self
            .retry
            .run("users.insert", || self.store.insert(USERS, row.clone()))
            .await;
        match inserted {
            Ok(_) => Ok(()),
            // Row already exists, e.g. from an earlier attempt.
            Err(RemoteError::Api { status: 409, .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn resume_pending_profile(&self, signed_in: &User) {
        let pending = guard(&self.pending_profile).clone();
        let Some(user) = pending.filter(|user| user.id == signed_in.id) else {
            return;
        };
        match self.provision_profile(&user).await {
            Ok(()) => {
                info!(user = %user.id, "Completed pending profile");
                *guard(&self.pending_profile) = None;
            }
            Err(err) => warn!(user = %user.id, error = %err, "Profile still pending"),
        }
    }
}
