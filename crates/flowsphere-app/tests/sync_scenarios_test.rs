//! End-to-end scenarios for the session-gated task and project hooks,
//! driven against the in-memory backend.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use flowsphere_app::ai::{AiService, RateLimiter};
use flowsphere_app::config::SyncConfig;
use flowsphere_app::{AppContext, AppError};
use flowsphere_core::{NewProject, NewTask, ProjectPatch, ProjectStatus, TaskPatch, TaskStatus};
use flowsphere_notify::{NotificationKind, NotificationLog};
use flowsphere_remote::{MemoryBackend, RemoteStore};

const ADA: (&str, &str) = ("ada@example.invalid", "hunter22");
const GRACE: (&str, &str) = ("grace@example.invalid", "cobol1959");

type Ctx = AppContext<MemoryBackend, NotificationLog>;

fn context() -> Ctx {
    let backend = MemoryBackend::new();
    backend.register(ADA.0, ADA.1);
    backend.register(GRACE.0, GRACE.1);
    AppContext::new(
        backend,
        NotificationLog::new(),
        AiService::new(Vec::new(), RateLimiter::per_minute(60)),
        &SyncConfig::default(),
    )
}

async fn signed_in(ctx: &Ctx, (email, password): (&str, &str)) {
    ctx.session().sign_in(email, password).await.unwrap();
}

#[tokio::test]
async fn list_without_session_is_empty_and_offline() {
    let ctx = context();
    ctx.start().await;
    assert!(ctx.tasks().list().await.is_empty());
    assert!(ctx.projects().list().await.is_empty());
    assert_eq!(ctx.backend().calls(), 0);
    assert!(ctx.sink().entries().is_empty());
}

#[tokio::test]
async fn created_task_is_stamped_and_listed_first() {
    let ctx = context();
    signed_in(&ctx, ADA).await;
    let ada = ctx.session().current().unwrap().user_id();

    ctx.tasks().create(&NewTask::new("older")).await.unwrap();
    let created = ctx.tasks().create(&NewTask::new("newer")).await.unwrap();
    assert_eq!(created.created_by, Some(ada));

    let listed = ctx.tasks().list().await;
    assert_eq!(listed[0].id, created.id);
    assert_eq!(listed[0].title, "newer");
    assert!(listed.iter().all(|task| task.created_by == Some(ada)));
}

#[tokio::test]
async fn create_then_find_returns_the_same_task() {
    let ctx = context();
    signed_in(&ctx, ADA).await;
    let created = ctx
        .tasks()
        .create(&NewTask::new("round trip").with_description("kept verbatim"))
        .await
        .unwrap();
    let found = ctx.tasks().get(created.id).await.unwrap();
    assert_eq!(found, created);
}

#[tokio::test]
async fn update_changes_the_field_and_stamps_updated_at() {
    let ctx = context();
    signed_in(&ctx, ADA).await;
    let task = ctx.tasks().create(&NewTask::new("draft")).await.unwrap();
    assert!(task.updated_at.is_none());

    let patch = TaskPatch::status(TaskStatus::Completed);
    let first = ctx.tasks().update(task.id, &patch).await.unwrap();
    assert_eq!(first.status, TaskStatus::Completed);
    assert!(first.completed());
    assert!(first.updated_at.is_some());

    let second = ctx.tasks().update(task.id, &patch).await.unwrap();
    assert_eq!(second.status, first.status);
    assert_eq!(second.title, first.title);

    let listed = ctx.tasks().get(task.id).await.unwrap();
    assert_eq!(listed.status, TaskStatus::Completed);
}

#[tokio::test]
async fn project_status_update_keeps_other_fields() {
    let ctx = context();
    signed_in(&ctx, ADA).await;
    let project = ctx
        .projects()
        .create(&NewProject::new("Launch").with_budget(1000.0))
        .await
        .unwrap();
    assert_eq!(project.progress, 0);

    let updated = ctx
        .projects()
        .update(project.id, &ProjectPatch::status(ProjectStatus::InProgress))
        .await
        .unwrap();
    assert_eq!(updated.status, ProjectStatus::InProgress);
    assert_eq!(updated.budget_allocated, Some(1000.0));
}

#[tokio::test]
async fn patches_can_clear_optional_task_fields() {
    let ctx = context();
    signed_in(&ctx, ADA).await;
    let due = time::Date::from_calendar_date(2024, time::Month::June, 1).unwrap();
    let task = ctx
        .tasks()
        .create(&NewTask::new("pay invoice").with_description("vendor 42").with_due_date(due))
        .await
        .unwrap();
    assert_eq!(task.due_date, Some(due));

    let patch = TaskPatch {
        description: Some(None),
        due_date: Some(None),
        ..TaskPatch::default()
    };
    let cleared = ctx.tasks().update(task.id, &patch).await.unwrap();
    assert_eq!(cleared.description, None);
    assert_eq!(cleared.due_date, None);
    assert_eq!(cleared.title, "pay invoice");

    let found = ctx.tasks().get(task.id).await.unwrap();
    assert_eq!(found.due_date, None);
    assert_eq!(found.description, None);
}

#[tokio::test]
async fn unauthenticated_create_never_reaches_the_service() {
    let ctx = context();
    let err = ctx.tasks().create(&NewTask::new("x")).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated));
    assert_eq!(ctx.backend().calls(), 0);
    let entries = ctx.sink().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, NotificationKind::Destructive);
}

#[tokio::test(start_paused = true)]
async fn transient_read_failures_are_retried_silently() {
    let ctx = context();
    signed_in(&ctx, ADA).await;
    ctx.tasks().create(&NewTask::new("survives")).await.unwrap();
    let _ = ctx.sink().take();

    ctx.backend().inject_failures(2, 503);
    let before = ctx.backend().calls();
    let listed = ctx.tasks().refresh().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "survives");
    assert_eq!(ctx.backend().calls() - before, 3);
    assert_eq!(ctx.sink().count(NotificationKind::Destructive), 0);
}

#[tokio::test]
async fn rows_of_other_users_stay_invisible() {
    let ctx = context();
    signed_in(&ctx, ADA).await;
    ctx.tasks().create(&NewTask::new("ada's")).await.unwrap();
    ctx.session().sign_out().await.unwrap();

    signed_in(&ctx, GRACE).await;
    assert!(ctx.tasks().list().await.is_empty());
    ctx.tasks().create(&NewTask::new("grace's")).await.unwrap();
    let listed = ctx.tasks().list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "grace's");
}

#[tokio::test]
async fn sign_up_provisions_the_profile_row() {
    let ctx = context();
    ctx.session()
        .sign_up("linus@example.invalid", "penguin42", Some("Linus"))
        .await
        .unwrap();
    let profiles = ctx.backend().rows("users");
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["email"], "linus@example.invalid");
    assert_eq!(profiles[0]["name"], "Linus");
    assert!(ctx.session().pending_profile().is_none());
}

#[tokio::test]
async fn deletes_disappear_from_the_next_read() {
    let ctx = context();
    signed_in(&ctx, ADA).await;
    let task = ctx.tasks().create(&NewTask::new("short-lived")).await.unwrap();
    assert_eq!(ctx.tasks().list().await.len(), 1);
    ctx.tasks().delete(task.id).await.unwrap();
    assert!(ctx.tasks().get(task.id).await.is_none());
    assert!(
        ctx.backend()
            .select(&flowsphere_remote::Query::from("tasks"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sixty_first_ai_request_is_rate_limited() {
    struct Echo;

    impl flowsphere_app::TextProvider for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn complete(
            &self,
            _system: &str,
            prompt: &str,
        ) -> Result<String, flowsphere_app::ai::ProviderError> {
            Ok(format!("- {prompt}"))
        }
    }

    let ai = AiService::new(vec![Echo], RateLimiter::per_minute(60));
    for _ in 0..60 {
        assert!(!ai.generate_response("focus").await.unwrap().fallback);
    }
    let err = ai.generate_response("focus").await.unwrap_err();
    match err {
        AppError::RateLimited { retry_after } => assert!(retry_after <= Duration::from_secs(60)),
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn session_watchers_see_sign_in_and_out() {
    let ctx = context();
    let mut watch = ctx.session().subscribe();
    signed_in(&ctx, ADA).await;
    watch.changed().await.unwrap();
    assert!(watch.current().is_some());
    ctx.session().sign_out().await.unwrap();
    watch.changed().await.unwrap();
    assert!(watch.current().is_none());
    let cache = Arc::clone(ctx.cache());
    assert!(cache.is_stale(flowsphere_app::QueryKey::of::<flowsphere_core::Task>()));
}
