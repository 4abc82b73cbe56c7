//! Collaborator traits for table access and authentication.

use crate::error::RemoteError;
use flowsphere_core::{Session, User};
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;

/// Conjunction of equality conditions on row columns.
///
/// Values are kept in their textual form, which is what the REST filter
/// syntax carries and what the in-memory backend compares against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(String, String)>,
}

impl Filter {
    /// Filter on a single `column = value` condition.
    pub fn eq(column: impl Into<String>, value: impl Display) -> Self {
        Self::default().and_eq(column, value)
    }

    /// Add another `column = value` condition.
    #[must_use]
    pub fn and_eq(mut self, column: impl Into<String>, value: impl Display) -> Self {
        self.conditions.push((column.into(), value.to_string()));
        self
    }

    /// The conditions in insertion order.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conditions
            .iter()
            .map(|(column, value)| (column.as_str(), value.as_str()))
    }

    /// Whether the filter matches every row.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `row` satisfies every condition.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions().all(|(column, expected)| {
            row.get(column)
                .is_some_and(|actual| column_text(actual) == expected)
        })
    }
}

/// Textual form of a JSON column value as used by equality filters.
#[must_use]
pub fn column_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_owned(),
        other => other.to_string(),
    }
}

/// Sort specification for a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column to sort by.
    pub column: String,
    /// Sort direction.
    pub descending: bool,
}

/// A read against one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Remote table name.
    pub collection: String,
    /// Row filter.
    pub filter: Filter,
    /// Optional ordering.
    pub order: Option<Order>,
    /// Optional row limit.
    pub limit: Option<usize>,
}

impl Query {
    /// Select every row of `collection`.
    pub fn from(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: Filter::default(),
            order: None,
            limit: None,
        }
    }

    /// Add an equality condition.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Display) -> Self {
        self.filter = self.filter.and_eq(column, value);
        self
    }

    /// Order by `column`, newest or largest first.
    #[must_use]
    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending: true,
        });
        self
    }

    /// Order by `column`, smallest first.
    #[must_use]
    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending: false,
        });
        self
    }

    /// Cap the number of returned rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Authenticated table-style access to named remote collections.
///
/// Row-level visibility is enforced by the service, not by callers.
#[allow(async_fn_in_trait)]
pub trait RemoteStore: Send + Sync {
    /// Fetch rows matching `query`.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] when the service rejects the read or is unreachable.
    async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError>;

    /// Insert one row and return it as stored.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] when the insert is rejected.
    async fn insert(&self, collection: &str, row: Value) -> Result<Value, RemoteError>;

    /// Apply `patch` to the single row matching `filter` and return it.
    ///
    /// # Errors
    /// Returns [`RemoteError::NotFound`] when nothing matched.
    async fn update(&self, collection: &str, filter: &Filter, patch: Value)
    -> Result<Value, RemoteError>;

    /// Delete rows matching `filter`.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] when the delete is rejected.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<(), RemoteError>;
}

/// Result of a successful sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    /// The registered user.
    pub user: User,
    /// Present when the service signs the user in immediately.
    pub session: Option<Session>,
}

/// Session and credential operations of the auth service.
#[allow(async_fn_in_trait)]
pub trait AuthService: Send + Sync {
    /// Current session, if one is held.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] when the stored session cannot be read or renewed.
    async fn get_session(&self) -> Result<Option<Session>, RemoteError>;

    /// Exchange email and password for a session.
    ///
    /// # Errors
    /// Returns [`RemoteError::Auth`] for rejected credentials.
    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, RemoteError>;

    /// Register a new account.
    ///
    /// # Errors
    /// Returns [`RemoteError::Auth`] when the account cannot be created.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, RemoteError>;

    /// End the current session.
    ///
    /// # Errors
    /// Returns a [`RemoteError`] when the service refuses the sign-out.
    async fn sign_out(&self) -> Result<(), RemoteError>;
}

impl<T: RemoteStore> RemoteStore for Arc<T> {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError> {
        (**self).select(query).await
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, RemoteError> {
        (**self).insert(collection, row).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Value,
    ) -> Result<Value, RemoteError> {
        (**self).update(collection, filter, patch).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<(), RemoteError> {
        (**self).delete(collection, filter).await
    }
}

impl<T: AuthService> AuthService for Arc<T> {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        (**self).get_session().await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        (**self).sign_in_with_password(email, password).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, RemoteError> {
        (**self).sign_up(email, password, name).await
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        (**self).sign_out().await
    }
}
