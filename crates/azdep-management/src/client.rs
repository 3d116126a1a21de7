//! Transport seam and request plumbing for the management endpoint.
//!
//! `ManagementTransport` is the only thing that touches the network. The
//! default `HttpTransport` authenticates every request with the management
//! certificate as a TLS client identity; tests swap in a scripted transport.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Identity, Method};

use crate::credentials::ManagementCredentials;
use crate::types::{ManagementConfig, ManagementError, ManagementResult, ProviderFault};

pub const CONTENT_XML: &str = "application/xml";
pub const CONTENT_JSON: &str = "application/json";

/// Header carrying the id used to poll asynchronous operations.
pub const REQUEST_ID_HEADER: &str = "x-ms-request-id";
const VERSION_HEADER: &str = "x-ms-version";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub content_type: &'static str,
    pub text: String,
}

/// One call against the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementRequest {
    pub method: Method,
    /// Path below `/{subscription-id}`, including any query string.
    pub path: String,
    pub api_version: String,
    pub body: Option<RequestBody>,
}

impl ManagementRequest {
    pub fn get(path: impl Into<String>, api_version: &str) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            api_version: api_version.to_string(),
            body: None,
        }
    }

    pub fn post_xml(path: impl Into<String>, api_version: &str, xml: String) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            api_version: api_version.to_string(),
            body: Some(RequestBody { content_type: CONTENT_XML, text: xml }),
        }
    }

    pub fn put_json(path: impl Into<String>, api_version: &str, json: String) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            api_version: api_version.to_string(),
            body: Some(RequestBody { content_type: CONTENT_JSON, text: json }),
        }
    }
}

/// Whatever the provider answered, success or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementResponse {
    pub status: u16,
    pub request_id: Option<String>,
    pub body: String,
}

impl ManagementResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn fault(&self) -> ProviderFault {
        ProviderFault::from_response(self.status, &self.body).with_request_id(self.request_id.clone())
    }

    /// Textual status as the provider names it (`OK`, `Created`, …).
    pub fn status_text(&self) -> String {
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .map(str::to_string)
            .unwrap_or_else(|| self.status.to_string())
    }
}

/// Sends authenticated requests. A non-2xx answer is `Ok`; only failures
/// to obtain an answer are errors.
#[async_trait]
pub trait ManagementTransport: Send + Sync {
    async fn send(&self, request: ManagementRequest) -> ManagementResult<ManagementResponse>;
}

// ─── HTTP transport ─────────────────────────────────────────────────

/// reqwest transport presenting the management certificate.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(credentials: &ManagementCredentials, config: &ManagementConfig) -> ManagementResult<Self> {
        let pem = credentials.identity_pem().ok_or_else(|| {
            ManagementError::Credential(
                "certificate has no private key; supply a PEM bundle with certificate and key".into(),
            )
        })?;
        let identity = Identity::from_pem(pem)
            .map_err(|e| ManagementError::Credential(format!("unusable client identity: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| ManagementError::Validation(format!("user agent: {e}")))?,
        );

        let http = Client::builder()
            .identity(identity)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: format!(
                "{}/{}",
                config.endpoint.trim_end_matches('/'),
                credentials.subscription_id()
            ),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ManagementTransport for HttpTransport {
    async fn send(&self, request: ManagementRequest) -> ManagementResult<ManagementResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(VERSION_HEADER, request.api_version.as_str());
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, body.content_type).body(body.text);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let request_id = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;

        Ok(ManagementResponse { status, request_id, body })
    }
}

// ─── Client ─────────────────────────────────────────────────────────

/// Credentials, transport and configuration handed to every operation.
pub struct ManagementClient<T> {
    credentials: Arc<ManagementCredentials>,
    transport: T,
    config: ManagementConfig,
}

impl<T: ManagementTransport> ManagementClient<T> {
    pub fn new(credentials: Arc<ManagementCredentials>, transport: T, config: ManagementConfig) -> Self {
        Self { credentials, transport, config }
    }

    pub fn config(&self) -> &ManagementConfig {
        &self.config
    }

    pub fn credentials(&self) -> &ManagementCredentials {
        &self.credentials
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn subscription_id(&self) -> &str {
        self.credentials.subscription_id()
    }

    /// Full URL of a subscription-relative path, for logs.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}{}",
            self.config.endpoint.trim_end_matches('/'),
            self.subscription_id(),
            path
        )
    }

    /// Send a request; a non-2xx answer still comes back as `Ok`.
    pub async fn execute(&self, request: ManagementRequest) -> ManagementResult<ManagementResponse> {
        debug!("{} {}", request.method, self.url(&request.path));
        let method = request.method.clone();
        let path = request.path.clone();
        let resp = self.transport.send(request).await?;
        if !resp.is_success() {
            warn!("{} {} → {}", method, self.url(&path), resp.status);
        }
        Ok(resp)
    }

    /// Send a request and turn a non-2xx answer into the error `classify` picks.
    pub async fn execute_checked(
        &self,
        request: ManagementRequest,
        classify: impl FnOnce(ProviderFault) -> ManagementError,
    ) -> ManagementResult<ManagementResponse> {
        let resp = self.execute(request).await?;
        if resp.is_success() {
            Ok(resp)
        } else {
            Err(classify(resp.fault()))
        }
    }

    pub(crate) fn into_parts(self) -> (Arc<ManagementCredentials>, T) {
        (self.credentials, self.transport)
    }
}

/// Decode a Service Management XML body.
pub fn parse_xml<R: serde::de::DeserializeOwned>(body: &str) -> ManagementResult<R> {
    quick_xml::de::from_str(body).map_err(|e| ManagementError::Protocol(format!("XML parse: {e}")))
}

/// Encode a Service Management XML body.
pub fn to_xml<B: serde::Serialize>(body: &B) -> ManagementResult<String> {
    quick_xml::se::to_string(body).map_err(|e| ManagementError::Protocol(format!("XML encode: {e}")))
}

// ─── Tests ──────────────────────────────────────────────────────────
