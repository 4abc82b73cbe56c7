//! Application context tying session, hooks, AI and navigation together.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use flowsphere_notify::{NotificationSink, ToastQueue};
use flowsphere_remote::{AuthService, RemoteStore};
use time::OffsetDateTime;
use tracing::info;

use crate::ai::{AiService, LlmProvider, TextProvider};
use crate::backend::Backend;
use crate::cache::QueryCache;
use crate::config::{AppConfig, SyncConfig};
use crate::dashboard::DashboardSummary;
use crate::hook::{ProjectHook, TaskHook};
use crate::navigation::Navigator;
use crate::session::SessionProvider;

/// Everything one signed-in dashboard needs, sharing one backend, one
/// notification sink and one query cache.
pub struct AppContext<B, N, P = LlmProvider> {
    backend: Arc<B>,
    sink: Arc<N>,
    cache: Arc<QueryCache>,
    session: SessionProvider<Arc<B>, Arc<B>, Arc<N>>,
    tasks: TaskHook<Arc<B>, Arc<N>>,
    projects: ProjectHook<Arc<B>, Arc<N>>,
    ai: AiService<P>,
    navigator: Navigator,
}

impl AppContext<Backend, ToastQueue> {
    /// Wire the hosted, offline or disabled backend selected by `config`.
    ///
    /// # Errors
    /// Returns an error when the backend or AI clients cannot be built.
    pub fn from_config(config: &AppConfig, session_file: Option<&Path>) -> Result<Self> {
        let backend =
            Backend::from_config(config, session_file).context("failed to set up the backend")?;
        let ai = AiService::from_config(config).context("failed to set up AI providers")?;
        info!(
            app = %config.app.name,
            environment = %config.app.environment,
            backend = backend.describe(),
            ai = ai.is_enabled(),
            "Application context ready"
        );
        Ok(Self::new(
            backend,
            ToastQueue::new(config.notifications.clone()),
            ai,
            &config.sync,
        ))
    }
}

impl<B, N, P> AppContext<B, N, P>
where
    B: RemoteStore + AuthService + 'static,
    N: NotificationSink + 'static,
    P: TextProvider,
{
    /// Wire `backend` and `sink` with the retry and cache settings of `sync`.
    pub fn new(backend: B, sink: N, ai: AiService<P>, sync: &SyncConfig) -> Self {
        let backend = Arc::new(backend);
        let sink = Arc::new(sink);
        let cache = Arc::new(QueryCache::new().with_max_age(sync.cache_max_age()));
        let retry = sync.retry_policy();
        let session = SessionProvider::new(backend.clone(), backend.clone(), sink.clone())
            .with_retry(retry)
            .with_query_cache(cache.clone());
        let tasks = TaskHook::new(
            backend.clone(),
            sink.clone(),
            session.subscribe(),
            cache.clone(),
        )
        .with_retry(retry);
        let projects = ProjectHook::new(
            backend.clone(),
            sink.clone(),
            session.subscribe(),
            cache.clone(),
        )
        .with_retry(retry);
        Self {
            backend,
            sink,
            cache,
            session,
            tasks,
            projects,
            ai,
            navigator: Navigator::default(),
        }
    }

    /// Restore any stored session.
    pub async fn start(&self) {
        self.session.initialize().await;
    }

    /// Session state and auth operations.
    pub const fn session(&self) -> &SessionProvider<Arc<B>, Arc<B>, Arc<N>> {
        &self.session
    }

    /// Cached task collection.
    pub const fn tasks(&self) -> &TaskHook<Arc<B>, Arc<N>> {
        &self.tasks
    }

    /// Cached project collection.
    pub const fn projects(&self) -> &ProjectHook<Arc<B>, Arc<N>> {
        &self.projects
    }

    /// The productivity assistant.
    pub const fn ai(&self) -> &AiService<P> {
        &self.ai
    }

    /// Current view and its switchers.
    pub const fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Where operation outcomes are reported.
    pub fn sink(&self) -> &N {
        &self.sink
    }

    /// The shared remote collaborator.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Query cache shared by both hooks.
    pub const fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Task and project numbers of the signed-in user.
    pub async fn summary(&self) -> DashboardSummary {
        let (tasks, projects) = tokio::join!(self.tasks.list(), self.projects.list());
        DashboardSummary::from_items(&tasks, &projects, OffsetDateTime::now_utc().date())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::ai::RateLimiter;
    use crate::navigation::View;
    use flowsphere_core::{NewProject, NewTask};
    use flowsphere_notify::NotificationLog;
    use flowsphere_remote::MemoryBackend;

    fn offline() -> AppContext<MemoryBackend, NotificationLog> {
        let backend = MemoryBackend::new();
        backend.register("ada@example.invalid", "hunter22");
        AppContext::new(
            backend,
            NotificationLog::new(),
            AiService::new(Vec::new(), RateLimiter::per_minute(60)),
            &SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn summary_reflects_confirmed_writes() {
        let ctx = offline();
        ctx.start().await;
        ctx.session()
            .sign_in("ada@example.invalid", "hunter22")
            .await
            .unwrap();
        ctx.tasks().create(&NewTask::new("plan sprint")).await.unwrap();
        ctx.projects().create(&NewProject::new("Launch")).await.unwrap();

        let summary = ctx.summary().await;
        assert_eq!(summary.tasks.total, 1);
        assert_eq!(summary.projects.total, 1);
    }

    #[tokio::test]
    async fn sign_out_empties_every_collection() {
        let ctx = offline();
        ctx.session()
            .sign_in("ada@example.invalid", "hunter22")
            .await
            .unwrap();
        ctx.tasks().create(&NewTask::new("private")).await.unwrap();
        assert_eq!(ctx.tasks().list().await.len(), 1);

        ctx.session().sign_out().await.unwrap();
        assert!(ctx.tasks().list().await.is_empty());
        assert_eq!(ctx.summary().await, DashboardSummary::default());
    }

    #[test]
    fn navigator_starts_on_the_dashboard() {
        let ctx = offline();
        assert_eq!(ctx.navigator().current(), View::Dashboard);
        ctx.navigator().handle().navigate(View::Tasks);
        assert_eq!(ctx.navigator().current(), View::Tasks);
    }
}
