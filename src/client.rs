// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated HTTP client for the Modovisa API.
//!
//! [`ApiClient::secure_fetch`] is the single entry point for backend calls:
//! it ensures a usable token, attaches it, and on a `401` refreshes once and
//! retries once.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::auth::{AccessToken, ProactiveRefresher, RefreshCoordinator, RefreshTimerHandle, TokenStore};
use crate::config::ClientConfig;
use crate::error::ClientError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// A replayable request description.
///
/// The body is kept as bytes so the request can be sent again after a
/// token refresh.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    /// Add a caller header. `Authorization` is always overwritten by the client.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as JSON and set `Content-Type` unless already set.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ClientError::InvalidResponse(format!("serialize body failed: {e}")))?;
        self.headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        self.body = Some(bytes);
        Ok(self)
    }
}

/// Modovisa API client with automatic credential management.
///
/// Clones share the same token store, cookie jar and refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http: reqwest::Client,
    store: TokenStore,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    /// Build a client with a fresh token store and cookie jar.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::with_store(config, TokenStore::new())
    }

    /// Build a client over an existing token store.
    pub fn with_store(config: ClientConfig, store: TokenStore) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        let refresh_url = RefreshCoordinator::endpoint(&config.base_url, &config.refresh_audience)?;
        let refresher = RefreshCoordinator::new(http.clone(), refresh_url, store.clone());

        Ok(Self {
            config,
            http,
            store,
            refresher,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Resolve a path against the base URL. Absolute URLs pass through.
    pub fn url(&self, path_or_url: &str) -> Result<Url, ClientError> {
        if let Ok(url) = Url::parse(path_or_url) {
            return Ok(url);
        }
        self.config
            .base_url
            .join(path_or_url.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{path_or_url}: {e}")))
    }

    /// Return a token that is not about to expire, refreshing if needed.
    pub async fn ensure_access(&self) -> Result<AccessToken, ClientError> {
        if let Some(token) = self.store.get().await {
            if !token.expires_soon(self.config.refresh_threshold) {
                return Ok(token);
            }
            debug!(expires_at = token.expiry(), "Access token expiring soon, refreshing");
        }

        self.refresher.refresh().await.map_err(|e| {
            warn!(error = %e, "Could not ensure access token");
            ClientError::Unauthorized
        })
    }

    /// Send an authenticated request.
    ///
    /// Fails with [`ClientError::Unauthorized`] before sending anything if
    /// no token can be ensured. A `401` triggers one refresh and one retry;
    /// whatever the retry returns is handed back as-is.
    pub async fn secure_fetch(
        &self,
        path_or_url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let url = self.url(path_or_url)?;
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "secure_fetch",
            request_id = %request_id,
            method = %options.method,
            path = %url.path()
        );

        async move {
            let token = self.ensure_access().await?;

            let response = self.send(&url, &options, &token, &request_id).await?;
            if response.status() != reqwest::StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            info!("Request rejected with 401, refreshing token and retrying once");
            let token = self.refresher.refresh().await.map_err(|e| {
                warn!(error = %e, "Refresh after 401 failed");
                ClientError::Unauthorized
            })?;

            let retried = self.send(&url, &options, &token, &request_id).await?;
            debug!(status = %retried.status(), "Retried request completed");
            Ok(retried)
        }
        .instrument(span)
        .await
    }

    /// `GET` a path and decode its JSON body. Non-2xx becomes [`ClientError::Status`].
    pub async fn get_json<T: DeserializeOwned>(&self, path_or_url: &str) -> Result<T, ClientError> {
        let response = self.secure_fetch(path_or_url, RequestOptions::get()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("{path_or_url}: {e}")))
    }

    /// Start the background refresher for this client's store.
    ///
    /// Keep the returned handle alive for as long as refreshing should run.
    pub fn start_proactive_refresh(&self) -> RefreshTimerHandle {
        ProactiveRefresher::new(
            self.store.clone(),
            self.refresher.clone(),
            self.config.proactive_interval,
            self.config.refresh_threshold,
        )
        .spawn()
    }

    async fn send(
        &self,
        url: &Url,
        options: &RequestOptions,
        token: &AccessToken,
        request_id: &str,
    ) -> Result<Response, ClientError> {
        let mut headers = options.headers.clone();
        let bearer = HeaderValue::from_str(&token.bearer())
            .map_err(|_| ClientError::InvalidResponse("token is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        if !headers.contains_key(REQUEST_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(request_id) {
                headers.insert(REQUEST_ID_HEADER, value);
            }
        }

        let mut request = self
            .http
            .request(options.method.clone(), url.clone())
            .headers(headers);
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        debug!(status = %response.status(), "Request completed");
        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::token::{now_unix, tests::jwt_expiring_at};

    pub(crate) fn client_for(server: &MockServer) -> ApiClient {
        let config = ClientConfig::with_base_url(&server.uri()).unwrap();
        ApiClient::new(config).unwrap()
    }

    async fn mount_refresh(server: &MockServer, token: &str, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/api/refresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
            .expect(expected)
            .mount(server)
            .await;
    }

    async fn seed(client: &ApiClient, exp: i64) -> String {
        let raw = jwt_expiring_at(exp);
        client.store().set(AccessToken::parse(raw.clone()).unwrap()).await;
        raw
    }

    #[test]
    fn url_joins_relative_paths_and_keeps_absolute() {
        let config = ClientConfig::with_base_url("https://api.modovisa.com/v1").unwrap();
        let client = ApiClient::new(config).unwrap();
        assert_eq!(
            client.url("/api/me").unwrap().as_str(),
            "https://api.modovisa.com/v1/api/me"
        );
        assert_eq!(
            client.url("https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }

    #[test]
    fn json_options_set_content_type() {
        let options = RequestOptions::post().json(&json!({ "a": 1 })).unwrap();
        assert_eq!(options.headers[CONTENT_TYPE], "application/json");
        assert_eq!(options.body.as_deref(), Some(br#"{"a":1}"#.as_slice()));
    }

    #[tokio::test]
    async fn ensure_access_refreshes_token_close_to_expiry() {
        let server = MockServer::start().await;
        let fresh = jwt_expiring_at(now_unix() + 3600);
        mount_refresh(&server, &fresh, 1).await;

        let client = client_for(&server);
        seed(&client, now_unix() + 30).await;

        let token = client.ensure_access().await.unwrap();
        assert_eq!(token.as_str(), fresh);
    }

    #[tokio::test]
    async fn ensure_access_keeps_token_far_from_expiry() {
        let server = MockServer::start().await;
        mount_refresh(&server, &jwt_expiring_at(now_unix() + 3600), 0).await;

        let client = client_for(&server);
        let seeded = seed(&client, now_unix() + 120).await;

        assert_eq!(client.ensure_access().await.unwrap().as_str(), seeded);
    }

    #[tokio::test]
    async fn no_token_and_failing_refresh_never_hits_target() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/refresh-token"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/api/sites"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .secure_fetch("/api/sites", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn attaches_bearer_and_overrides_caller_authorization() {
        let server = MockServer::start().await;
        mount_refresh(&server, "unused", 0).await;

        let client = client_for(&server);
        let raw = seed(&client, now_unix() + 3600).await;

        Mock::given(method("GET"))
            .and(path("/api/sites"))
            .and(header("authorization", format!("Bearer {raw}").as_str()))
            .and(header("x-site", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let options = RequestOptions::get()
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer caller"))
            .header(HeaderName::from_static("x-site"), HeaderValue::from_static("42"));
        let response = client.secure_fetch("/api/sites", options).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn retries_once_after_401_with_refreshed_token() {
        let server = MockServer::start().await;
        let fresh = jwt_expiring_at(now_unix() + 3600);
        mount_refresh(&server, &fresh, 1).await;

        let client = client_for(&server);
        let stale = seed(&client, now_unix() + 3000).await;

        Mock::given(method("POST"))
            .and(path("/api/sites"))
            .and(header("authorization", format!("Bearer {stale}").as_str()))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/sites"))
            .and(header("authorization", format!("Bearer {fresh}").as_str()))
            .and(body_json(json!({ "domain": "shop.example" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let options = RequestOptions::post()
            .json(&json!({ "domain": "shop.example" }))
            .unwrap();
        let response = client.secure_fetch("/api/sites", options).await.unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(client.store().get().await.unwrap().as_str(), fresh);
    }

    #[tokio::test]
    async fn second_401_is_returned_without_another_refresh() {
        let server = MockServer::start().await;
        mount_refresh(&server, &jwt_expiring_at(now_unix() + 3600), 1).await;

        let client = client_for(&server);
        seed(&client, now_unix() + 3000).await;

        Mock::given(method("GET"))
            .and(path("/api/admin/users"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let response = client
            .secure_fetch("/api/admin/users", RequestOptions::get())
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn failed_refresh_after_401_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/refresh-token"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/billing"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        seed(&client, now_unix() + 3000).await;

        let err = client
            .secure_fetch("/api/billing", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn other_error_statuses_are_not_retried() {
        let server = MockServer::start().await;
        mount_refresh(&server, "unused", 0).await;

        let client = client_for(&server);
        seed(&client, now_unix() + 3600).await;

        Mock::given(method("GET"))
            .and(path("/api/sites/9"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let response = client
            .secure_fetch("/api/sites/9", RequestOptions::get())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn concurrent_requests_with_expired_token_refresh_once() {
        let server = MockServer::start().await;
        let fresh = jwt_expiring_at(now_unix() + 3600);
        Mock::given(method("POST"))
            .and(path("/api/refresh-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": fresh }))
                    .set_delay(Duration::from_millis(150)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/live"))
            .and(header("authorization", format!("Bearer {fresh}").as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(5)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let calls = (0..5).map(|_| {
            let client = client.clone();
            async move { client.secure_fetch("/api/live", RequestOptions::get()).await }
        });
        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().status(), 200);
        }
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let server = MockServer::start().await;
        mount_refresh(&server, "unused", 0).await;
        let client = client_for(&server);
        seed(&client, now_unix() + 3600).await;

        // Nothing listens on port 9 of localhost.
        let err = client
            .secure_fetch("http://127.0.0.1:9/api/me", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn transport_failure_on_retry_propagates() {
        let server = MockServer::start().await;
        let fresh = jwt_expiring_at(now_unix() + 3600);
        mount_refresh(&server, &fresh, 1).await;

        let mut config = ClientConfig::with_base_url(&server.uri()).unwrap();
        config.http_timeout = Duration::from_secs(1);
        let client = ApiClient::new(config).unwrap();
        let stale = seed(&client, now_unix() + 3000).await;

        Mock::given(method("GET"))
            .and(path("/api/live"))
            .and(header("authorization", format!("Bearer {stale}").as_str()))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/live"))
            .and(header("authorization", format!("Bearer {fresh}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .expect(1)
            .mount(&server)
            .await;

        let err = client
            .secure_fetch("/api/live", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(client.store().get().await.unwrap().as_str(), fresh);
    }

    #[tokio::test]
    async fn get_json_requires_success() {
        let server = MockServer::start().await;
        mount_refresh(&server, "unused", 0).await;
        let client = client_for(&server);
        seed(&client, now_unix() + 3600).await;

        Mock::given(method("GET"))
            .and(path("/api/sites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sites: Vec<serde_json::Value> = client.get_json("/api/sites").await.unwrap();
        assert_eq!(sites[0]["id"], 1);

        let err = client.get_json::<serde_json::Value>("/api/broken").await.unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    }
}
