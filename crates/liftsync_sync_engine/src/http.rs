//! REST remote store.
//!
//! Talks to a PostgREST-style API: one table endpoint per entity kind, rows
//! exchanged as JSON objects with the wire field names of the entity rows.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.).

use crate::config::RestConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::store::RemoteStore;
use async_trait::async_trait;
use liftsync_model::{EntityId, SyncEntity, UserId};
use std::fmt;
use tracing::debug;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Full URL including the query string.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Body, empty for GET.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Returns the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. An `Err`
/// means the request never produced a response (DNS, connect, TLS, ...).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// Remote store backed by a REST API.
pub struct RestRemoteStore<C: HttpClient> {
    config: RestConfig,
    client: C,
}

impl<C: HttpClient> RestRemoteStore<C> {
    /// Creates a new REST remote store.
    pub fn new(config: RestConfig, client: C) -> Self {
        Self { config, client }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn request(&self, method: HttpMethod, url: String, body: Vec<u8>) -> HttpRequest {
        let mut headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            headers.push(("apikey".to_string(), key.clone()));
            headers.push(("Authorization".to_string(), format!("Bearer {key}")));
        }
        HttpRequest {
            method,
            url,
            headers,
            body,
        }
    }

    async fn execute(&self, table: &'static str, request: HttpRequest) -> RemoteResult<Vec<u8>> {
        debug!(method = %request.method, url = %request.url, "remote request");

        let response = tokio::time::timeout(self.config.timeout, self.client.send(request))
            .await
            .map_err(|_| RemoteError::Timeout)?
            .map_err(RemoteError::Unavailable)?;

        classify(table, response)
    }

    async fn get_rows<E: SyncEntity>(&self, query: &str) -> RemoteResult<Vec<E::Row>> {
        let table = E::KIND.table();
        let url = format!("{}?select=*&{query}", self.config.table_url(table));
        let body = self
            .execute(table, self.request(HttpMethod::Get, url, Vec::new()))
            .await?;
        serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(format!("{table}: {e}")))
    }
}

impl<C: HttpClient> fmt::Debug for RestRemoteStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestRemoteStore")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish_non_exhaustive()
    }
}

/// Maps a response status onto the remote error taxonomy.
fn classify(table: &'static str, response: HttpResponse) -> RemoteResult<Vec<u8>> {
    let status = response.status;
    if (200..300).contains(&status) {
        return Ok(response.body);
    }

    let message = String::from_utf8_lossy(&response.body).into_owned();
    if status == 408 || status == 429 || status >= 500 {
        Err(RemoteError::Unavailable(format!("HTTP {status}: {message}")))
    } else {
        Err(RemoteError::Rejected {
            table,
            status: Some(status),
            message,
        })
    }
}

#[async_trait]
impl<C: HttpClient, E: SyncEntity> RemoteStore<E> for RestRemoteStore<C> {
    async fn upsert(&self, row: E::Row) -> RemoteResult<()> {
        let table = E::KIND.table();
        let body = serde_json::to_vec(&row).map_err(|e| RemoteError::Decode(e.to_string()))?;
        let url = format!("{}?on_conflict=id", self.config.table_url(table));

        let mut request = self.request(HttpMethod::Post, url, body);
        request.headers.push((
            "Prefer".to_string(),
            "resolution=merge-duplicates,return=minimal".to_string(),
        ));
        self.execute(table, request).await.map(|_| ())
    }

    async fn select_by_user_id(&self, user_id: &UserId) -> RemoteResult<Vec<E::Row>> {
        let user_id = urlencoding::encode(user_id.as_str());
        self.get_rows::<E>(&format!("user_id=eq.{user_id}")).await
    }

    async fn select_by_foreign_key_in(
        &self,
        column: &'static str,
        ids: &[EntityId],
    ) -> RemoteResult<Vec<E::Row>> {
        let ids: Vec<String> = ids
            .iter()
            .map(|id| urlencoding::encode(&id.to_string()).into_owned())
            .collect();
        self.get_rows::<E>(&format!("{column}=in.({})", ids.join(",")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PullScope;
    use chrono::{TimeZone, Utc};
    use liftsync_model::{Plan, PlanRow, Session};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeClient {
        requests: Mutex<Vec<HttpRequest>>,
        responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
        hang: bool,
    }

    impl FakeClient {
        fn respond(self, response: Result<HttpResponse, String>) -> Self {
            self.responses.lock().push_back(response);
            self
        }
    }

    #[async_trait]
    impl HttpClient for FakeClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.requests.lock().push(request);
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(200, "[]")))
        }
    }

    fn store(client: FakeClient) -> RestRemoteStore<FakeClient> {
        RestRemoteStore::new(
            RestConfig::new("https://api.example.co/").with_api_key("secret"),
            client,
        )
    }

    fn plan() -> Plan {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap();
        Plan::new(UserId::new("athlete"), "Strength", now)
    }

    #[tokio::test]
    async fn upsert_posts_row_with_merge_preference() {
        let store = store(FakeClient::default().respond(Ok(HttpResponse::new(201, ""))));
        let plan = plan();
        let row = plan.to_row(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());

        RemoteStore::<Plan>::upsert(&store, row.clone()).await.unwrap();

        let requests = store.client().requests.lock();
        let request = &requests[0];
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.url,
            "https://api.example.co/rest/v1/training_plans?on_conflict=id"
        );
        assert_eq!(
            request.header("prefer"),
            Some("resolution=merge-duplicates,return=minimal")
        );
        assert_eq!(request.header("apikey"), Some("secret"));
        assert_eq!(request.header("authorization"), Some("Bearer secret"));

        let sent: PlanRow = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent, row);
    }

    #[tokio::test]
    async fn select_by_user_filters_on_owner() {
        let plan = plan();
        let row = plan.to_row(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());
        let body = serde_json::to_vec(&vec![row.clone()]).unwrap();
        let store = store(FakeClient::default().respond(Ok(HttpResponse::new(200, body))));

        let rows = RemoteStore::<Plan>::select_by_user_id(&store, &UserId::new("athlete"))
            .await
            .unwrap();
        assert_eq!(rows, vec![row]);

        let requests = store.client().requests.lock();
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(
            requests[0].url,
            "https://api.example.co/rest/v1/training_plans?select=*&user_id=eq.athlete"
        );
    }

    #[tokio::test]
    async fn user_id_is_percent_encoded() {
        let store = store(FakeClient::default());
        let user = UserId::new("a&user_id=neq.x y#");

        RemoteStore::<Plan>::select_by_user_id(&store, &user)
            .await
            .unwrap();

        let url = store.client().requests.lock()[0].url.clone();
        assert_eq!(
            url,
            "https://api.example.co/rest/v1/training_plans?select=*&user_id=eq.a%26user_id%3Dneq.x%20y%23"
        );
    }

    #[tokio::test]
    async fn select_by_parents_uses_in_filter() {
        let store = store(FakeClient::default());
        let (a, b) = (EntityId::new(), EntityId::new());

        let rows = RemoteStore::<Session>::select_by_foreign_key_in(&store, "plan_id", &[a, b])
            .await
            .unwrap();
        assert!(rows.is_empty());

        let url = store.client().requests.lock()[0].url.clone();
        let expected =
            format!("https://api.example.co/rest/v1/training_sessions?select=*&plan_id=in.({a},{b})");
        assert_eq!(url, expected);
    }

    #[tokio::test]
    async fn empty_parent_scope_sends_nothing() {
        let store = store(FakeClient::default());
        let scope = PullScope::Parents {
            column: "plan_id",
            ids: Vec::new(),
        };

        let rows = RemoteStore::<Session>::select(&store, &scope).await.unwrap();
        assert!(rows.is_empty());
        assert!(store.client().requests.lock().is_empty());
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let user = UserId::new("athlete");
        let cases = [
            (500, true),
            (503, true),
            (429, true),
            (408, true),
            (400, false),
            (409, false),
        ];
        for (status, retryable) in cases {
            let client = FakeClient::default().respond(Ok(HttpResponse::new(status, "nope")));
            let store = store(client);
            let err = RemoteStore::<Plan>::select_by_user_id(&store, &user)
                .await
                .unwrap_err();
            assert_eq!(err.is_retryable(), retryable, "status {status}");
            if !retryable {
                assert!(matches!(err, RemoteError::Rejected { status: Some(s), .. } if s == status));
            }
        }
    }

    #[tokio::test]
    async fn transport_failure_is_unavailable() {
        let store = store(FakeClient::default().respond(Err("connection refused".into())));
        let err = RemoteStore::<Plan>::select_by_user_id(&store, &UserId::new("athlete"))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Unavailable("connection refused".into()));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let store = store(FakeClient::default().respond(Ok(HttpResponse::new(200, "{\"oops\""))));
        let err = RemoteStore::<Plan>::select_by_user_id(&store, &UserId::new("athlete"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_times_out() {
        let client = FakeClient {
            hang: true,
            ..FakeClient::default()
        };
        let store = RestRemoteStore::new(
            RestConfig::new("https://api.example.co").with_timeout(Duration::from_secs(5)),
            client,
        );

        let err = RemoteStore::<Plan>::select_by_user_id(&store, &UserId::new("athlete"))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Timeout);
        assert!(store.client().requests.lock()[0].header("apikey").is_none());
    }
}
