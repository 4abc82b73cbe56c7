//! REST client for a hosted Supabase project (PostgREST tables plus GoTrue auth).

use crate::error::RemoteError;
use crate::store::{AuthService, Filter, Query, RemoteStore, SignUpOutcome};
use flowsphere_core::{Session, User, UserId};
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";
// PostgREST code for "single object requested, zero or many rows returned".
const NO_SINGLE_ROW: &str = "PGRST116";

/// HTTP client for the remote database and auth service.
///
/// Holds the current session so every request carries the signed-in user's
/// bearer token; before sign-in the anonymous key is used instead.
pub struct SupabaseClient {
    base_url: String,
    anon_key: String,
    http: Client,
    session: RwLock<Option<Session>>,
    session_file: Option<PathBuf>,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("session_file", &self.session_file)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_error(self, status: StatusCode) -> RemoteError {
        let code = self.code.as_ref().map(crate::store::column_text);
        let message = self
            .message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unexpected response")
                    .to_owned()
            });
        RemoteError::Api {
            status: status.as_u16(),
            message,
            code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl From<AuthUser> for User {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
            name: user.user_metadata.and_then(|meta| meta.name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: OffsetDateTime) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + time::Duration::seconds(secs))
            });
        Session {
            user: self.user.into(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// Sign-up answers with a full token response when email confirmation is
/// disabled and with the bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

async fn read_error(resp: Response) -> RemoteError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| ErrorBody {
        message: (!text.trim().is_empty()).then(|| text.trim().to_owned()),
        ..ErrorBody::default()
    });
    body.into_error(status)
}

async fn into_json(resp: Response) -> Result<Value, RemoteError> {
    if !resp.status().is_success() {
        return Err(read_error(resp).await);
    }
    if resp.status() == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn filter_pairs(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .map(|(column, value)| (column.to_owned(), format!("eq.{value}")))
        .collect()
}

fn auth_error(err: RemoteError) -> RemoteError {
    match err {
        RemoteError::Api { status, message, .. } if (400..500).contains(&status) && status != 429 => {
            RemoteError::Auth(message)
        }
        other => other,
    }
}

impl SupabaseClient {
    /// Build a client for the project at `base_url`.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(
        base_url: &str,
        anon_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            anon_key: anon_key.to_owned(),
            http,
            session: RwLock::new(None),
            session_file: None,
        })
    }

    /// Persist the session in `path` across process restarts, restoring any
    /// session already stored there.
    ///
    /// # Errors
    /// Returns an error when an existing file cannot be read or parsed.
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Result<Self, RemoteError> {
        let path = path.into();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let stored: Option<Session> = serde_json::from_str(&raw)?;
            debug!(path = %path.display(), restored = stored.is_some(), "Loaded stored session");
            self.session = RwLock::new(stored);
        }
        self.session_file = Some(path);
        Ok(self)
    }

    fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn store_session(&self, session: Option<Session>) -> Result<(), RemoteError> {
        let encoded = serde_json::to_string_pretty(&session)?;
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
        if let Some(path) = &self.session_file {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, encoded).await?;
        }
        Ok(())
    }

    fn bearer(&self) -> String {
        self.current_session()
            .map_or_else(|| self.anon_key.clone(), |session| session.access_token)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn rest_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{collection}", self.base_url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    async fn single_row(
        &self,
        collection: &str,
        builder: RequestBuilder,
    ) -> Result<Value, RemoteError> {
        let resp = self
            .authed(builder)
            .header("Prefer", RETURN_REPRESENTATION)
            .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            .send()
            .await?;
        match into_json(resp).await {
            Err(RemoteError::Api { code: Some(code), .. }) if code == NO_SINGLE_ROW => {
                Err(RemoteError::NotFound {
                    collection: collection.to_owned(),
                })
            }
            other => other,
        }
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> Result<Session, RemoteError> {
        let resp = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;
        let value = into_json(resp).await.map_err(auth_error)?;
        let token: TokenResponse = serde_json::from_value(value)?;
        Ok(token.into_session(OffsetDateTime::now_utc()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, RemoteError> {
        debug!("Refreshing expired session");
        self.token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }
}

impl RemoteStore for SupabaseClient {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError> {
        let mut params = vec![("select".to_owned(), "*".to_owned())];
        params.extend(filter_pairs(&query.filter));
        if let Some(order) = &query.order {
            let direction = if order.descending { "desc" } else { "asc" };
            params.push(("order".to_owned(), format!("{}.{direction}", order.column)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_owned(), limit.to_string()));
        }
        debug!(collection = %query.collection, "Selecting rows");
        let resp = self
            .authed(self.http.get(self.rest_url(&query.collection)))
            .query(&params)
            .send()
            .await?;
        match into_json(resp).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, RemoteError> {
        debug!(collection, "Inserting row");
        let builder = self.http.post(self.rest_url(collection)).json(&row);
        self.single_row(collection, builder).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Value,
    ) -> Result<Value, RemoteError> {
        debug!(collection, "Updating row");
        let builder = self
            .http
            .patch(self.rest_url(collection))
            .query(&filter_pairs(filter))
            .json(&patch);
        self.single_row(collection, builder).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<(), RemoteError> {
        if filter.is_empty() {
            return Err(RemoteError::Other(format!(
                "Refusing to delete every row of {collection}"
            )));
        }
        debug!(collection, "Deleting rows");
        let resp = self
            .authed(self.http.delete(self.rest_url(collection)))
            .query(&filter_pairs(filter))
            .send()
            .await?;
        into_json(resp).await.map(|_| ())
    }
}

impl AuthService for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.is_expired(OffsetDateTime::now_utc()) {
            return Ok(Some(session));
        }
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            self.store_session(None).await?;
            return Ok(None);
        };
        match self.refresh(refresh_token).await {
            Ok(renewed) => {
                self.store_session(Some(renewed.clone())).await?;
                Ok(Some(renewed))
            }
            Err(err) if err.is_transient() => Err(err),
            Err(err) => {
                warn!(error = %err, "Session refresh rejected; clearing stored session");
                self.store_session(None).await?;
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;
        self.store_session(Some(session.clone())).await?;
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<SignUpOutcome, RemoteError> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(name) = name {
            body["data"] = json!({ "name": name });
        }
        let resp = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;
        let value = into_json(resp).await.map_err(auth_error)?;
        match serde_json::from_value::<SignUpResponse>(value)? {
            SignUpResponse::Session(token) => {
                let session = token.into_session(OffsetDateTime::now_utc());
                self.store_session(Some(session.clone())).await?;
                Ok(SignUpOutcome {
                    user: session.user.clone(),
                    session: Some(session),
                })
            }
            SignUpResponse::User(user) => Ok(SignUpOutcome {
                user: user.into(),
                session: None,
            }),
        }
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if self.current_session().is_none() {
            return Ok(());
        }
        let resp = self
            .authed(self.http.post(self.auth_url("logout")))
            .send()
            .await?;
        match into_json(resp).await {
            Ok(_) => {}
            // Token already revoked or expired server side.
            Err(RemoteError::Api { status: 401 | 403 | 404, .. }) => {}
            Err(err) => return Err(err),
        }
        self.store_session(None).await
    }
}
