//! Signed HTTP transport for gateway and file-manager endpoints
//!
//! One hyper client per transport, HTTP/1.1 with a tuned connection pool.
//! Every attempt - retries included - is signed with a fresh context, so a
//! retried request never reuses a time-bound signature.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Profile;
use crate::error::{Error, Result};
use crate::model::{Envelope, ResponseBody};
use crate::retry::RetryPolicy;
use crate::sign::{SignContext, SignatureEngine};

const GATEWAY_PATH: &str = "/gateway";
const JSON_CONTENT_TYPE: &str = "application/json";
const OCTET_CONTENT_TYPE: &str = "application/octet-stream";

/// Outbound call surface the upload engine and the asset facade depend on.
///
/// Control-plane calls retry at this layer; data-plane PUTs are single
/// attempts because their retry budget belongs to the upload engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Signed POST of a JSON body to the gateway. Transport failures retry
    /// per the transport policy; business errors surface immediately.
    async fn call(&self, action: &str, body: serde_json::Value) -> Result<ResponseBody>;

    /// Signed PUT of raw bytes to a file-manager path. Single attempt.
    async fn put(&self, action: &str, path_and_query: &str, body: Bytes) -> Result<ResponseBody>;

    /// Signed GET returning the raw response bytes. Retries like `call`.
    async fn get(&self, action: &str, path_and_query: &str) -> Result<Bytes>;
}

/// hyper-backed transport bound to one service host.
///
/// Clone is cheap - the underlying HTTP client shares its connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: HyperClient<HttpConnector, Full<Bytes>>,
    host: String,
    port: u16,
    secret_id: String,
    secret_key: String,
    service: String,
    version: String,
    policy: RetryPolicy,
}

impl HttpTransport {
    /// Build a transport with tuned HTTP settings: TCP_NODELAY, 10s connect
    /// timeout, 90s keepalive, 90s idle pool timeout.
    pub fn new(profile: &Profile) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .retry_canceled_requests(true)
            .set_host(true)
            .build(http);

        Self {
            client,
            host: profile.host.clone(),
            port: profile.port,
            secret_id: profile.secret_id.clone(),
            secret_key: profile.secret_key.clone(),
            service: profile.service.clone(),
            version: profile.version.clone(),
            policy: RetryPolicy::transport(),
        }
    }

    /// Override the control-plane retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path_and_query)
    }

    /// Sign and send one attempt, classifying the outcome.
    async fn send_once(
        &self,
        method: Method,
        path_and_query: &str,
        content_type: &str,
        action: &str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes)> {
        // Fresh context per attempt: new timestamp and nonce.
        let ctx = SignContext::new(
            &self.host,
            action,
            &self.version,
            &self.service,
            content_type,
            method.as_str(),
            &self.secret_id,
            &self.secret_key,
        );
        let headers = SignatureEngine::build_headers(&ctx)?;

        let url = self.url(path_and_query);
        let mut req = Request::builder().method(method).uri(&url);
        for (key, value) in headers.iter() {
            req = req.header(key, value);
        }

        let request = req
            .body(Full::new(body))
            .map_err(|e| Error::transport(format!("request build error: {e}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| Error::transport(format!("request failed: {e}")))?;

        let status = response.status();

        // Always collect the body so the connection returns to the pool.
        let body_bytes = response
            .collect()
            .await
            .map_err(|e| Error::transport(format!("body error: {e}")))?
            .to_bytes();

        if !status.is_success() {
            return Err(Error::status(
                status.as_u16(),
                String::from_utf8_lossy(&body_bytes).to_string(),
            ));
        }

        Ok((status, body_bytes))
    }

    /// Retry transport failures per the policy, re-signing every attempt.
    async fn send_with_retry(
        &self,
        method: Method,
        path_and_query: &str,
        content_type: &str,
        action: &str,
        body: Bytes,
    ) -> Result<Bytes> {
        let mut attempt = 1;
        loop {
            match self
                .send_once(
                    method.clone(),
                    path_and_query,
                    content_type,
                    action,
                    body.clone(),
                )
                .await
            {
                Ok((_, bytes)) => return Ok(bytes),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(action, attempt, error = %err, "transport attempt failed, retrying");
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, action: &str, body: serde_json::Value) -> Result<ResponseBody> {
        let payload = serde_json::to_vec(&body)
            .map_err(|e| Error::transport(format!("request encode error: {e}")))?;
        debug!(action, "gateway call");

        let bytes = self
            .send_with_retry(
                Method::POST,
                GATEWAY_PATH,
                JSON_CONTENT_TYPE,
                action,
                Bytes::from(payload),
            )
            .await?;

        Envelope::from_slice(&bytes)?.response.check()
    }

    async fn put(&self, action: &str, path_and_query: &str, body: Bytes) -> Result<ResponseBody> {
        debug!(action, bytes = body.len(), "file-manager put");

        let (_, bytes) = self
            .send_once(Method::PUT, path_and_query, OCTET_CONTENT_TYPE, action, body)
            .await?;

        Envelope::from_slice(&bytes)?.response.check()
    }

    async fn get(&self, action: &str, path_and_query: &str) -> Result<Bytes> {
        debug!(action, path = path_and_query, "file-manager get");

        self.send_with_retry(
            Method::GET,
            path_and_query,
            OCTET_CONTENT_TYPE,
            action,
            Bytes::new(),
        )
        .await
    }
}
