//! Runtime choice of the remote collaborator.

use std::path::Path;

use flowsphere_core::Session;
use flowsphere_remote::{
    AuthService, Filter, MemoryBackend, Query, RemoteError, RemoteStore, SignUpOutcome,
    SupabaseClient,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::AppConfig;

/// Where data and sessions come from.
#[derive(Debug)]
pub enum Backend {
    /// Hosted database and auth service.
    Supabase(SupabaseClient),
    /// Local store, optionally persisted to a snapshot file.
    Offline(MemoryBackend),
    /// No database configured: reads degrade, sign-in fails.
    Disabled,
}

impl Backend {
    /// Pick a backend from `config`.
    ///
    /// Offline mode wins over a configured database. `session_file` keeps the
    /// hosted session across runs.
    ///
    /// # Errors
    /// Returns an error when a client cannot be built or a stored session or
    /// snapshot cannot be read.
    pub fn from_config(config: &AppConfig, session_file: Option<&Path>) -> Result<Self, RemoteError> {
        if config.features.offline_mode {
            let backend = match &config.features.offline_store {
                Some(path) => MemoryBackend::open(path)?,
                None => MemoryBackend::new(),
            };
            info!("Using offline store");
            return Ok(Self::Offline(backend));
        }
        let (Some(url), Some(anon_key)) = (config.database.url(), config.database.anon_key())
        else {
            warn!("Database not configured; remote features are disabled");
            return Ok(Self::Disabled);
        };
        let mut client = SupabaseClient::new(url, anon_key, config.sync.request_timeout())?;
        if let Some(path) = session_file {
            client = client.with_session_file(path)?;
        }
        info!(url, "Using hosted database");
        Ok(Self::Supabase(client))
    }

    /// Short description for diagnostics.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Supabase(_) => "hosted",
            Self::Offline(_) => "offline",
            Self::Disabled => "disabled",
        }
    }
}

impl RemoteStore for Backend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError> {
        match self {
            Self::Supabase(client) => client.select(query).await,
            Self::Offline(store) => store.select(query).await,
            Self::Disabled => Err(RemoteError::NotConfigured),
        }
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, RemoteError> {
        match self {
            Self::Supabase(client) => client.insert(collection, row).await,
            Self::Offline(store) => store.insert(collection, row).await,
            Self::Disabled => Err(RemoteError::NotConfigured),
        }
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Value,
    ) -> Result<Value, RemoteError> {
        match self {
            Self::Supabase(client) => client.update(collection, filter, patch).await,
            Self::Offline(store) => store.update(collection, filter, patch).await,
            Self::Disabled => Err(RemoteError::NotConfigured),
        }
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<(), RemoteError> {
        match self {
            Self::Supabase(client) => client.delete(collection, filter).await,
            Self::Offline(store) => store.delete(collection, filter).await,
            Self::Disabled => Err(RemoteError::NotConfigured),
        }
    }
}

impl AuthService for Backend {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        match self {
            Self::Supabase(client) => client.get_session().await,
            Self::Offline(store) => store.get_session().await,
            Self::Disabled => Ok(None),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        match self {
            Self::Supabase(client) => client.sign_in_with_password(email, password).await,
            Self::Offline(store) => store.sign_in_with_password(email, password).await,
            Self::Disabled => Err(RemoteError::NotConfigured),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, RemoteError> {
        match self {
            Self::Supabase(client) => client.sign_up(email, password, name).await,
            Self::Offline(store) => store.sign_up(email, password, name).await,
            Self::Disabled => Err(RemoteError::NotConfigured),
        }
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        match self {
            Self::Supabase(client) => client.sign_out().await,
            Self::Offline(store) => store.sign_out().await,
            Self::Disabled => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::config::Secret;
    use tempfile::tempdir;

    #[test]
    fn selection_follows_configuration() {
        let mut config = AppConfig::default();
        assert!(matches!(
            Backend::from_config(&config, None).unwrap(),
            Backend::Disabled
        ));

        config.database.url = Some("https://demo.supabase.co".to_owned());
        config.database.anon_key = Some(Secret::new("anon"));
        assert_eq!(Backend::from_config(&config, None).unwrap().describe(), "hosted");

        config.features.offline_mode = true;
        assert_eq!(Backend::from_config(&config, None).unwrap().describe(), "offline");
    }

    #[tokio::test]
    async fn disabled_backend_refuses_table_calls() {
        let backend = Backend::Disabled;
        assert!(backend.get_session().await.unwrap().is_none());
        let err = backend.select(&Query::from("tasks")).await.unwrap_err();
        assert!(matches!(err, RemoteError::NotConfigured));
        backend.sign_out().await.unwrap();
    }

    #[tokio::test]
    async fn offline_store_snapshot_is_reused() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.features.offline_mode = true;
        config.features.offline_store = Some(dir.path().join("offline.json"));

        let first = Backend::from_config(&config, None).unwrap();
        first
            .sign_up("ada@example.invalid", "hunter22", None)
            .await
            .unwrap();

        let second = Backend::from_config(&config, None).unwrap();
        second
            .sign_in_with_password("ada@example.invalid", "hunter22")
            .await
            .unwrap();
    }
}
