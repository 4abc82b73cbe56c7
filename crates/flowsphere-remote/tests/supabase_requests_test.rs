//! Request-level tests for the REST client against a local HTTP stub.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowsphere_core::{Session, User, UserId};
use flowsphere_remote::{AuthService, Filter, Query, RemoteError, RemoteStore, SupabaseClient};
use serde_json::json;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const ANON_KEY: &str = "anon-key";
const USER_ID: &str = "0190f3a4-7c1e-7000-8000-000000000001";

/// Serves one canned response per connection and records each raw request.
struct Stub {
    url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Stub {
    async fn serve(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request.to_ascii_lowercase());
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        Self { url, requests }
    }

    fn client(&self) -> SupabaseClient {
        SupabaseClient::new(&self.url, ANON_KEY, Duration::from_secs(5)).unwrap()
    }

    fn request(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index].clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(end) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn token_body(access_token: &str) -> String {
    json!({
        "access_token": access_token,
        "refresh_token": "refresh-token",
        "expires_in": 3600,
        "user": { "id": USER_ID, "email": "ada@example.invalid" }
    })
    .to_string()
}

#[tokio::test]
async fn anonymous_select_uses_the_anon_key_and_orders_newest_first() {
    let stub = Stub::serve(vec![(200, "[]".to_owned())]).await;
    let client = stub.client();

    let rows = client
        .select(&Query::from("tasks").order_desc("created_at"))
        .await
        .unwrap();
    assert!(rows.is_empty());

    let request = stub.request(0);
    assert!(request.starts_with("get /rest/v1/tasks?"), "{request}");
    assert!(request.contains("order=created_at.desc"));
    assert!(request.contains("apikey: anon-key\r\n"));
    assert!(request.contains("authorization: bearer anon-key\r\n"));
}

#[tokio::test]
async fn writes_after_sign_in_carry_the_session_token() {
    let row = json!({ "id": 1, "title": "draft", "created_at": "2024-05-01T09:00:00Z" });
    let stub = Stub::serve(vec![
        (200, token_body("user-token")),
        (201, row.to_string()),
    ])
    .await;
    let client = stub.client();

    let session = client
        .sign_in_with_password("ada@example.invalid", "hunter22")
        .await
        .unwrap();
    assert_eq!(session.access_token, "user-token");
    let stored = client
        .insert("tasks", json!({ "title": "draft" }))
        .await
        .unwrap();
    assert_eq!(stored, row);

    let token = stub.request(0);
    assert!(token.starts_with("post /auth/v1/token?grant_type=password "), "{token}");
    assert!(token.contains("apikey: anon-key\r\n"));

    let insert = stub.request(1);
    assert!(insert.starts_with("post /rest/v1/tasks "), "{insert}");
    assert!(insert.contains("apikey: anon-key\r\n"));
    assert!(insert.contains("authorization: bearer user-token\r\n"));
    assert!(insert.contains("prefer: return=representation\r\n"));
    assert!(insert.contains("accept: application/vnd.pgrst.object+json\r\n"));
    assert!(insert.contains(r#""title":"draft""#));
}

#[tokio::test]
async fn update_of_a_missing_row_is_not_found() {
    let body = json!({
        "code": "PGRST116",
        "message": "JSON object requested, multiple (or no) rows returned"
    });
    let stub = Stub::serve(vec![(406, body.to_string())]).await;
    let client = stub.client();

    let err = client
        .update("tasks", &Filter::eq("id", 7), json!({ "title": "renamed" }))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::NotFound { .. }), "{err:?}");
    let request = stub.request(0);
    assert!(request.starts_with("patch /rest/v1/tasks?id=eq.7 "), "{request}");
}

#[tokio::test]
async fn server_errors_keep_status_and_are_transient() {
    let stub = Stub::serve(vec![(503, json!({ "message": "upstream down" }).to_string())]).await;
    let err = stub.client().select(&Query::from("projects")).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.remote_message(), Some("upstream down"));
}

#[tokio::test]
async fn expired_sessions_are_refreshed_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let expired = Session {
        user: User {
            id: USER_ID.parse::<UserId>().unwrap(),
            email: "ada@example.invalid".into(),
            name: None,
        },
        access_token: "old-token".into(),
        refresh_token: Some("refresh-token".into()),
        expires_at: Some(OffsetDateTime::now_utc() - time::Duration::minutes(5)),
    };
    std::fs::write(&path, serde_json::to_string(&Some(expired)).unwrap()).unwrap();

    let stub = Stub::serve(vec![(200, token_body("new-token"))]).await;
    let client = stub.client().with_session_file(&path).unwrap();

    let renewed = client.get_session().await.unwrap().unwrap();
    assert_eq!(renewed.access_token, "new-token");
    let request = stub.request(0);
    assert!(
        request.starts_with("post /auth/v1/token?grant_type=refresh_token "),
        "{request}"
    );
    assert!(request.contains(r#""refresh_token":"refresh-token""#));
}
