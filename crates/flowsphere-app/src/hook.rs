//! Cached, session-gated CRUD over one remote collection.

use crate::cache::{QueryCache, QueryKey};
use crate::error::AppError;
use crate::retry::RetryPolicy;
use crate::session::SessionWatch;
use flowsphere_core::{Deletable, Project, Resource, Session, Task, sort_newest_first};
use flowsphere_notify::{Notification, NotificationSink};
use flowsphere_remote::{Filter, Query, RemoteStore};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Hook over the `tasks` collection.
pub type TaskHook<S, N> = ResourceHook<Task, S, N>;
/// Hook over the `projects` collection.
pub type ProjectHook<S, N> = ResourceHook<Project, S, N>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Create,
    Update,
    Delete,
}

impl Mutation {
    const fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    const fn past(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }
}

/// Pending mutation counters, one per kind.
#[derive(Debug, Default)]
pub struct MutationTracker {
    creating: AtomicUsize,
    updating: AtomicUsize,
    deleting: AtomicUsize,
}

impl MutationTracker {
    const fn counter(&self, mutation: Mutation) -> &AtomicUsize {
        match mutation {
            Mutation::Create => &self.creating,
            Mutation::Update => &self.updating,
            Mutation::Delete => &self.deleting,
        }
    }

    fn begin(&self, mutation: Mutation) -> Pending<'_> {
        let counter = self.counter(mutation);
        counter.fetch_add(1, Ordering::SeqCst);
        Pending { counter }
    }

    /// Whether a create is in flight.
    #[must_use]
    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::SeqCst) > 0
    }

    /// Whether an update is in flight.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst) > 0
    }

    /// Whether a delete is in flight.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.deleting.load(Ordering::SeqCst) > 0
    }
}

/// Returns the tracker to idle on drop, including on early return.
struct Pending<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reactive cache plus mutations for collection `R`.
///
/// Reads are gated on the session and retried on transient failures; they
/// never fail, degrading to an empty collection plus a notification.
/// Mutations are attempted once. The visible state only changes after the
/// service confirms a mutation: the collection is invalidated and the next
/// read refetches.
pub struct ResourceHook<R, S, N> {
    store: S,
    sink: N,
    session: SessionWatch,
    cache: Arc<QueryCache>,
    retry: RetryPolicy,
    tracker: MutationTracker,
    _resource: PhantomData<fn() -> R>,
}

fn noun<R: Resource>() -> String {
    R::LABEL.to_lowercase()
}

fn decode<R: Resource>(row: Value) -> Result<R, AppError> {
    Ok(serde_json::from_value(row)?)
}

impl<R, S, N> ResourceHook<R, S, N>
where
    R: Resource,
    S: RemoteStore,
    N: NotificationSink,
{
    /// Hook sharing `cache` with the rest of the application.
    pub fn new(store: S, sink: N, session: SessionWatch, cache: Arc<QueryCache>) -> Self {
        Self {
            store,
            sink,
            session,
            cache,
            retry: RetryPolicy::default(),
            tracker: MutationTracker::default(),
            _resource: PhantomData,
        }
    }

    /// Retry policy for reads.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cache key of this collection.
    #[must_use]
    pub const fn key(&self) -> QueryKey {
        QueryKey::of::<R>()
    }

    /// Pending mutation state.
    #[must_use]
    pub const fn mutations(&self) -> &MutationTracker {
        &self.tracker
    }

    /// The collection, newest first.
    ///
    /// Empty without a session, in which case nothing is fetched. An expired
    /// session is renewed first.
    pub async fn list(&self) -> Arc<[R]> {
        let Some(session) = self.session.current_or_renew().await else {
            debug!(collection = R::COLLECTION, "No session; skipping fetch");
            return Arc::from(Vec::new());
        };
        let owner = session.user_id();
        if let Some(items) = self.cache.get::<R>(owner) {
            return items;
        }
        let generation = self.cache.generation(self.key());
        match self.fetch().await {
            Ok(items) => {
                self.cache.put(owner, generation, items.clone());
                items
            }
            Err(err) => {
                error!(collection = R::COLLECTION, error = %err, "Error fetching collection");
                let description = err.remote_message().map_or_else(
                    || format!("Failed to load {}s. Please try again.", noun::<R>()),
                    str::to_owned,
                );
                self.sink.notify(Notification::destructive("Error", description));
                Arc::from(Vec::new())
            }
        }
    }

    /// Drop the cached collection and fetch it again.
    pub async fn refresh(&self) -> Arc<[R]> {
        self.cache.invalidate(self.key());
        self.list().await
    }

    /// Find one item of the collection by id.
    pub async fn get(&self, id: R::Id) -> Option<R> {
        self.list().await.iter().find(|item| item.id() == id).cloned()
    }

    async fn fetch(&self) -> Result<Arc<[R]>, AppError> {
        debug!(collection = R::COLLECTION, "Fetching collection");
        let query = Query::from(R::COLLECTION).order_desc("created_at");
        let rows = self
            .retry
            .run(R::COLLECTION, || self.store.select(&query))
            .await?;
        let mut items: Vec<R> = rows
            .into_iter()
            .filter_map(|row| match decode::<R>(row) {
                Ok(item) => Some(item),
                Err(err) => {
                    warn!(collection = R::COLLECTION, error = %err, "Skipping malformed row");
                    None
                }
            })
            .collect();
        sort_newest_first(&mut items);
        debug!(collection = R::COLLECTION, count = items.len(), "Fetched collection");
        Ok(Arc::from(items))
    }

    /// Create an item stamped with the signed-in user as creator.
    ///
    /// # Errors
    /// [`AppError::Unauthenticated`] without a session, [`AppError::Validation`]
    /// for rejected drafts, [`AppError::Remote`] when the service fails.
    pub async fn create(&self, draft: &R::Draft) -> Result<R, AppError> {
        let _pending = self.tracker.begin(Mutation::Create);
        let session = self.gate(Mutation::Create).await?;
        let result = async {
            R::validate_draft(draft)?;
            let row = R::insert_row(draft, session.user_id())?;
            debug!(collection = R::COLLECTION, "Creating item");
            let stored = self.store.insert(R::COLLECTION, row).await?;
            decode::<R>(stored)
        }
        .await;
        self.settle(Mutation::Create, result)
    }

    /// Apply `patch` to the item `id`, stamping the update time.
    ///
    /// # Errors
    /// Same as [`Self::create`]; a missing row surfaces as [`AppError::Remote`].
    pub async fn update(&self, id: R::Id, patch: &R::Patch) -> Result<R, AppError> {
        let _pending = self.tracker.begin(Mutation::Update);
        self.gate(Mutation::Update).await?;
        let result = async {
            R::validate_patch(patch)?;
            let row = R::update_row(patch, OffsetDateTime::now_utc())?;
            debug!(collection = R::COLLECTION, %id, "Updating item");
            let stored = self
                .store
                .update(R::COLLECTION, &Filter::eq("id", id), row)
                .await?;
            decode::<R>(stored)
        }
        .await;
        self.settle(Mutation::Update, result)
    }

    async fn gate(&self, mutation: Mutation) -> Result<Session, AppError> {
        self.session.current_or_renew().await.ok_or_else(|| {
            warn!(collection = R::COLLECTION, operation = mutation.verb(), "Rejected without session");
            self.sink.notify(Notification::destructive(
                "Error",
                format!("You must be signed in to {} a {}.", mutation.verb(), noun::<R>()),
            ));
            AppError::Unauthenticated
        })
    }

    fn settle<T>(&self, mutation: Mutation, result: Result<T, AppError>) -> Result<T, AppError> {
        match result {
            Ok(value) => {
                info!(collection = R::COLLECTION, operation = mutation.verb(), "Mutation confirmed");
                self.cache.invalidate(self.key());
                self.sink.notify(Notification::success(
                    format!("{} {}", R::LABEL, mutation.past()),
                    format!(
                        "Your {} has been {} successfully.",
                        noun::<R>(),
                        mutation.past()
                    ),
                ));
                Ok(value)
            }
            Err(err) => {
                error!(collection = R::COLLECTION, operation = mutation.verb(), error = %err, "Mutation failed");
                let description = err.remote_message().map_or_else(
                    || {
                        format!(
                            "Failed to {} {}. Please try again.",
                            mutation.verb(),
                            noun::<R>()
                        )
                    },
                    str::to_owned,
                );
                self.sink.notify(Notification::destructive("Error", description));
                Err(err)
            }
        }
    }
}

impl<R, S, N> ResourceHook<R, S, N>
where
    R: Deletable,
    S: RemoteStore,
    N: NotificationSink,
{
    /// Delete the item `id`.
    ///
    /// # Errors
    /// Same as [`Self::create`].
    pub async fn delete(&self, id: R::Id) -> Result<(), AppError> {
        let _pending = self.tracker.begin(Mutation::Delete);
        self.gate(Mutation::Delete).await?;
        debug!(collection = R::COLLECTION, %id, "Deleting item");
        let result = self
            .store
            .delete(R::COLLECTION, &Filter::eq("id", id))
            .await
            .map_err(AppError::from);
        self.settle(Mutation::Delete, result)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::session::SessionProvider;
    use flowsphere_core::{NewProject, NewTask, TaskPatch, TaskStatus};
    use flowsphere_notify::{NotificationKind, NotificationLog};
    use flowsphere_core::{User, UserId};
    use flowsphere_remote::MemoryBackend;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Store whose first select holds its rows until released.
    struct Gated {
        inner: Arc<MemoryBackend>,
        armed: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    impl RemoteStore for Gated {
        async fn select(&self, query: &Query) -> Result<Vec<Value>, flowsphere_remote::RemoteError> {
            let rows = self.inner.select(query).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            Ok(rows)
        }

        async fn insert(&self, collection: &str, row: Value) -> Result<Value, flowsphere_remote::RemoteError> {
            self.inner.insert(collection, row).await
        }

        async fn update(
            &self,
            collection: &str,
            filter: &Filter,
            patch: Value,
        ) -> Result<Value, flowsphere_remote::RemoteError> {
            self.inner.update(collection, filter, patch).await
        }

        async fn delete(&self, collection: &str, filter: &Filter) -> Result<(), flowsphere_remote::RemoteError> {
            self.inner.delete(collection, filter).await
        }
    }

    struct Fixture {
        backend: Arc<MemoryBackend>,
        log: Arc<NotificationLog>,
        provider: SessionProvider<Arc<MemoryBackend>, Arc<MemoryBackend>, Arc<NotificationLog>>,
        cache: Arc<QueryCache>,
    }

    impl Fixture {
        fn new() -> Self {
            let backend = Arc::new(MemoryBackend::new());
            let log = Arc::new(NotificationLog::new());
            let cache = Arc::new(QueryCache::new());
            let provider = SessionProvider::new(backend.clone(), backend.clone(), log.clone())
                .with_query_cache(cache.clone());
            Self {
                backend,
                log,
                provider,
                cache,
            }
        }

        async fn signed_in(self) -> Self {
            self.backend.register("ada@example.invalid", "hunter22");
            self.provider
                .sign_in("ada@example.invalid", "hunter22")
                .await
                .unwrap();
            self
        }

        fn hook<R: Resource>(&self) -> ResourceHook<R, Arc<MemoryBackend>, Arc<NotificationLog>> {
            ResourceHook::new(
                self.backend.clone(),
                self.log.clone(),
                self.provider.subscribe(),
                self.cache.clone(),
            )
            .with_retry(RetryPolicy::default().with_backoff(Duration::ZERO))
        }
    }

    #[tokio::test]
    async fn list_serves_the_cache_until_invalidated() {
        let fx = Fixture::new().signed_in().await;
        let tasks = fx.hook::<Task>();
        tasks.create(&NewTask::new("first")).await.unwrap();

        assert_eq!(tasks.list().await.len(), 1);
        let calls = fx.backend.calls();
        assert_eq!(tasks.list().await.len(), 1);
        assert_eq!(fx.backend.calls(), calls);

        tasks.create(&NewTask::new("second")).await.unwrap();
        let listed = tasks.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "second");
    }

    #[tokio::test]
    async fn validation_failures_never_reach_the_service() {
        let fx = Fixture::new().signed_in().await;
        let projects = fx.hook::<Project>();
        let calls = fx.backend.calls();
        let err = projects.create(&NewProject::new("  ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(fx.backend.calls(), calls);
        let last = fx.log.entries().pop().unwrap();
        assert_eq!(last.description, "Project name is required");
        assert!(!projects.mutations().is_creating());
    }

    #[tokio::test]
    async fn mutation_notifications_follow_the_label() {
        let fx = Fixture::new().signed_in().await;
        let tasks = fx.hook::<Task>();
        let task = tasks.create(&NewTask::new("write report")).await.unwrap();
        tasks
            .update(task.id, &TaskPatch::status(TaskStatus::Completed))
            .await
            .unwrap();
        tasks.delete(task.id).await.unwrap();
        let titles: Vec<String> = fx.log.entries().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Task created", "Task updated", "Task deleted"]);
        assert_eq!(
            fx.log.entries()[0].description,
            "Your task has been created successfully."
        );
        assert!(tasks.list().await.is_empty());
    }

    #[tokio::test]
    async fn remote_failures_use_the_service_message() {
        let fx = Fixture::new().signed_in().await;
        let tasks = fx.hook::<Task>();
        fx.backend.inject_failures(1, 400);
        let err = tasks.create(&NewTask::new("x")).await.unwrap_err();
        assert!(matches!(err, AppError::Remote(_)));
        let last = fx.log.entries().pop().unwrap();
        assert_eq!(last.kind, NotificationKind::Destructive);
        assert_eq!(last.description, "Service temporarily unavailable");
    }

    #[tokio::test]
    async fn updating_a_missing_row_uses_the_generic_message() {
        let fx = Fixture::new().signed_in().await;
        let tasks = fx.hook::<Task>();
        let err = tasks
            .update(flowsphere_core::TaskId(404), &TaskPatch::title("renamed"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Remote(flowsphere_remote::RemoteError::NotFound { .. })));
        let last = fx.log.entries().pop().unwrap();
        assert_eq!(last.description, "Failed to update task. Please try again.");
    }

    #[tokio::test]
    async fn exhausted_retries_yield_empty_with_one_notification() {
        let fx = Fixture::new().signed_in().await;
        let tasks = fx.hook::<Task>();
        let before = fx.backend.calls();
        fx.backend.inject_failures(3, 503);
        assert!(tasks.list().await.is_empty());
        assert_eq!(fx.log.count(NotificationKind::Destructive), 1);
        assert_eq!(fx.backend.calls() - before, 3);
    }

    #[tokio::test]
    async fn create_confirmed_during_a_read_is_refetched() {
        let fx = Fixture::new().signed_in().await;
        let gated = Arc::new(Gated {
            inner: fx.backend.clone(),
            armed: AtomicBool::new(true),
            parked: Notify::new(),
            release: Notify::new(),
        });
        let tasks: ResourceHook<Task, _, _> = ResourceHook::new(
            gated.clone(),
            fx.log.clone(),
            fx.provider.subscribe(),
            fx.cache.clone(),
        );

        let create_while_parked = async {
            gated.parked.notified().await;
            let created = tasks.create(&NewTask::new("new")).await.unwrap();
            gated.release.notify_one();
            created
        };
        let (in_flight, created) = tokio::join!(tasks.list(), create_while_parked);
        assert!(in_flight.is_empty());

        let listed = tasks.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
    }

    #[tokio::test]
    async fn hooks_drop_an_expired_session() {
        let fx = Fixture::new();
        fx.backend.restore_session(Some(Session {
            user: User {
                id: UserId::new(),
                email: "ada@example.invalid".into(),
                name: None,
            },
            access_token: "t".into(),
            refresh_token: None,
            expires_at: Some(OffsetDateTime::now_utc() - time::Duration::minutes(1)),
        }));
        fx.provider.initialize().await;
        let mut events = fx.provider.events();
        let tasks = fx.hook::<Task>();
        let calls = fx.backend.calls();

        let err = tasks.create(&NewTask::new("late")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
        assert_eq!(events.try_recv().unwrap(), crate::session::AuthEvent::SessionExpired);
        assert_eq!(fx.log.count(NotificationKind::Info), 1);
        assert_eq!(fx.log.count(NotificationKind::Destructive), 1);
        assert!(tasks.list().await.is_empty());
        assert_eq!(fx.backend.calls(), calls);
    }
}
