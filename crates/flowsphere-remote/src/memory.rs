//! In-process backend used for offline mode and tests.

use crate::error::RemoteError;
use crate::store::{AuthService, Filter, Query, RemoteStore, SignUpOutcome, column_text};
use flowsphere_core::{Session, User, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

const SESSION_LIFETIME: Duration = Duration::hours(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    user: User,
    // Offline accounts only; never point a snapshot at real credentials.
    password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryState {
    #[serde(default)]
    tables: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    next_ids: BTreeMap<String, i64>,
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    session: Option<Session>,
}

impl MemoryState {
    fn signed_in_user(&self) -> Option<UserId> {
        self.session
            .as_ref()
            .filter(|session| !session.is_expired(OffsetDateTime::now_utc()))
            .map(Session::user_id)
    }

    fn next_id(&mut self, collection: &str) -> i64 {
        let rows = self.tables.get(collection);
        let seen = rows
            .into_iter()
            .flatten()
            .filter_map(|row| row.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        let next = self.next_ids.entry(collection.to_owned()).or_insert(0);
        *next = (*next).max(seen) + 1;
        *next
    }
}

/// Rows owned by a user are only visible to their creator or assignee.
fn visible_to(row: &Value, viewer: Option<UserId>) -> bool {
    let Some(owner) = row.get("created_by") else {
        return true;
    };
    let Some(viewer) = viewer.map(|id| id.to_string()) else {
        return false;
    };
    column_text(owner) == viewer
        || row
            .get("assignee_id")
            .is_some_and(|assignee| column_text(assignee) == viewer)
}

fn compare_columns(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => column_text(x).cmp(&column_text(y)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn now_rfc3339() -> Result<String, RemoteError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| RemoteError::Other(err.to_string()))
}

fn as_object(collection: &str, value: Value) -> Result<Map<String, Value>, RemoteError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(RemoteError::api(
            400,
            format!("{collection} rows must be JSON objects, got {other}"),
        )),
    }
}

/// Table and auth emulation kept in memory, optionally mirrored to a JSON file.
///
/// Mirrors the service's observable behaviour closely enough for the
/// application layer: auto-increment ids, `created_at` stamping, equality
/// filters, ordering, and creator/assignee row visibility.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    snapshot: Option<PathBuf>,
    persist_lock: tokio::sync::Mutex<()>,
    calls: AtomicUsize,
    injected_failures: AtomicUsize,
    injected_status: AtomicUsize,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    /// Empty backend without persistence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend mirrored to `path`, loading any snapshot already there.
    ///
    /// # Errors
    /// Returns an error when an existing snapshot cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RemoteError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            MemoryState::default()
        };
        info!(path = %path.display(), "Opened offline store");
        Ok(Self {
            state: Mutex::new(state),
            snapshot: Some(path),
            ..Self::default()
        })
    }

    /// Register an account directly, bypassing sign-up.
    pub fn register(&self, email: &str, password: &str) -> User {
        let user = User {
            id: UserId::new(),
            email: email.to_owned(),
            name: None,
        };
        guard(&self.state).accounts.push(Account {
            user: user.clone(),
            password: password.to_owned(),
        });
        user
    }

    /// Replace the held session.
    pub fn restore_session(&self, session: Option<Session>) {
        guard(&self.state).session = session;
    }

    /// Make the next `count` table calls fail with HTTP `status`.
    pub fn inject_failures(&self, count: usize, status: u16) {
        self.injected_status
            .store(usize::from(status), AtomicOrdering::SeqCst);
        self.injected_failures.store(count, AtomicOrdering::SeqCst);
    }

    /// Number of table calls received so far, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Rows currently stored in `collection`, ignoring visibility.
    #[must_use]
    pub fn rows(&self, collection: &str) -> Vec<Value> {
        guard(&self.state)
            .tables
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn enter(&self, operation: &str, collection: &str) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let took = self
            .injected_failures
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if took {
            let status = u16::try_from(self.injected_status.load(AtomicOrdering::SeqCst))
                .unwrap_or(503);
            debug!(operation, collection, status, "Injected failure");
            return Err(RemoteError::api(status, "Service temporarily unavailable"));
        }
        Ok(())
    }

    async fn persist(&self) -> Result<(), RemoteError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let _write = self.persist_lock.lock().await;
        let encoded = serde_json::to_vec_pretty(&*guard(&self.state))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl RemoteStore for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError> {
        self.enter("select", &query.collection)?;
        let state = guard(&self.state);
        let viewer = state.signed_in_user();
        let mut rows: Vec<Value> = state
            .tables
            .get(&query.collection)
            .into_iter()
            .flatten()
            .filter(|row| visible_to(row, viewer) && query.filter.matches(row))
            .cloned()
            .collect();
        drop(state);
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_columns(a.get(&order.column), b.get(&order.column));
                if order.descending { ord.reverse() } else { ord }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, RemoteError> {
        self.enter("insert", collection)?;
        let mut map = as_object(collection, row)?;
        let stored = {
            let mut state = guard(&self.state);
            match map.get("id") {
                Some(id) => {
                    let key = column_text(id);
                    let taken = state
                        .tables
                        .get(collection)
                        .is_some_and(|rows| rows.iter().any(|r| r.get("id").map(column_text).as_ref() == Some(&key)));
                    if taken {
                        return Err(RemoteError::Api {
                            status: 409,
                            message: format!(
                                "duplicate key value violates unique constraint \"{collection}_pkey\""
                            ),
                            code: Some("23505".to_owned()),
                        });
                    }
                }
                None => {
                    let id = state.next_id(collection);
                    map.insert("id".to_owned(), Value::from(id));
                }
            }
            if !map.contains_key("created_at") {
                map.insert("created_at".to_owned(), Value::String(now_rfc3339()?));
            }
            let stored = Value::Object(map);
            state
                .tables
                .entry(collection.to_owned())
                .or_default()
                .push(stored.clone());
            stored
        };
        debug!(collection, "Inserted row");
        self.persist().await?;
        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Value,
    ) -> Result<Value, RemoteError> {
        self.enter("update", collection)?;
        let patch = as_object(collection, patch)?;
        let updated = {
            let mut state = guard(&self.state);
            let viewer = state.signed_in_user();
            let row = state
                .tables
                .get_mut(collection)
                .and_then(|rows| {
                    rows.iter_mut()
                        .find(|row| visible_to(row, viewer) && filter.matches(row))
                })
                .ok_or_else(|| RemoteError::NotFound {
                    collection: collection.to_owned(),
                })?;
            if let Value::Object(existing) = row {
                existing.extend(patch);
            }
            row.clone()
        };
        debug!(collection, "Updated row");
        self.persist().await?;
        Ok(updated)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<(), RemoteError> {
        self.enter("delete", collection)?;
        if filter.is_empty() {
            return Err(RemoteError::Other(format!(
                "Refusing to delete every row of {collection}"
            )));
        }
        let removed = {
            let mut state = guard(&self.state);
            let viewer = state.signed_in_user();
            state.tables.get_mut(collection).map_or(0, |rows| {
                let before = rows.len();
                rows.retain(|row| !(visible_to(row, viewer) && filter.matches(row)));
                before - rows.len()
            })
        };
        debug!(collection, removed, "Deleted rows");
        self.persist().await
    }
}

impl AuthService for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        Ok(guard(&self.state).session.clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        let session = {
            let mut state = guard(&self.state);
            let account = state
                .accounts
                .iter()
                .find(|account| account.user.email.eq_ignore_ascii_case(email) && account.password == password)
                .ok_or_else(|| RemoteError::Auth("Invalid login credentials".to_owned()))?;
            let session = Session {
                user: account.user.clone(),
                access_token: Uuid::new_v4().to_string(),
                refresh_token: Some(Uuid::new_v4().to_string()),
                expires_at: Some(OffsetDateTime::now_utc() + SESSION_LIFETIME),
            };
            state.session = Some(session.clone());
            session
        };
        self.persist().await?;
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, RemoteError> {
        if password.len() < 6 {
            return Err(RemoteError::Auth(
                "Password should be at least 6 characters".to_owned(),
            ));
        }
        let user = {
            let mut state = guard(&self.state);
            if state
                .accounts
                .iter()
                .any(|account| account.user.email.eq_ignore_ascii_case(email))
            {
                return Err(RemoteError::Auth("User already registered".to_owned()));
            }
            let user = User {
                id: UserId::new(),
                email: email.to_owned(),
                name: name.map(str::to_owned),
            };
            state.accounts.push(Account {
                user: user.clone(),
                password: password.to_owned(),
            });
            user
        };
        self.persist().await?;
        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        guard(&self.state).session = None;
        self.persist().await
    }
}
