//! Scripted transport and throwaway credentials for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::client::{ManagementRequest, ManagementResponse, ManagementTransport};
use crate::credentials::ManagementCredentials;
use crate::types::{ManagementError, ManagementResult};

/// Replays queued answers in order and records every request it sees.
/// Running out of answers is reported as a transport error.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ManagementResult<ManagementResponse>>>,
    requests: Mutex<Vec<ManagementRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: ManagementResponse) -> &Self {
        lock(&self.replies).push_back(Ok(response));
        self
    }

    pub fn push_status(&self, status: u16, body: &str) -> &Self {
        self.push(ManagementResponse {
            status,
            request_id: None,
            body: body.to_string(),
        })
    }

    /// A `202 Accepted` carrying the id of an asynchronous operation.
    pub fn push_accepted(&self, request_id: &str) -> &Self {
        self.push(ManagementResponse {
            status: 202,
            request_id: Some(request_id.to_string()),
            body: String::new(),
        })
    }

    /// An operation-status poll answer.
    pub fn push_operation(&self, id: &str, status: &str, http_status: u16) -> &Self {
        self.push_status(
            200,
            &format!(
                "<Operation xmlns=\"http://schemas.microsoft.com/windowsazure\"><ID>{id}</ID><Status>{status}</Status><HttpStatusCode>{http_status}</HttpStatusCode></Operation>"
            ),
        )
    }

    pub fn push_failed_operation(&self, id: &str, http_status: u16, code: &str, message: &str) -> &Self {
        self.push_status(
            200,
            &format!(
                "<Operation xmlns=\"http://schemas.microsoft.com/windowsazure\"><ID>{id}</ID><Status>Failed</Status><HttpStatusCode>{http_status}</HttpStatusCode><Error><Code>{code}</Code><Message>{message}</Message></Error></Operation>"
            ),
        )
    }

    pub fn push_error(&self, error: ManagementError) -> &Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<ManagementRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl ManagementTransport for ScriptedTransport {
    async fn send(&self, request: ManagementRequest) -> ManagementResult<ManagementResponse> {
        let path = request.path.clone();
        lock(&self.requests).push(request);
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(ManagementError::Transport(format!("no scripted reply for {path}"))))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Base64 DER of a fresh self-signed certificate.
pub fn test_certificate_base64() -> String {
    let cert = self_signed();
    STANDARD.encode(cert.serialize_der().unwrap_or_default())
}

/// Base64 PEM bundle (certificate + private key) of a fresh self-signed certificate.
pub fn test_identity_base64() -> String {
    let cert = self_signed();
    let bundle = format!(
        "{}{}",
        cert.serialize_pem().unwrap_or_default(),
        cert.serialize_private_key_pem()
    );
    STANDARD.encode(bundle.as_bytes())
}

/// Base64 PKCS#12 archive (certificate + key) protected by `password`.
pub fn test_pkcs12_base64(password: &str) -> String {
    let cert = self_signed();
    let der = cert.serialize_der().unwrap_or_default();
    let pfx = p12::PFX::new(&der, &cert.serialize_private_key_der(), None, password, "management")
        .unwrap_or_else(|| panic!("PKCS#12 encoding failed"));
    STANDARD.encode(pfx.to_der())
}

/// Credentials backed by a certificate without a private key.
pub fn test_credentials(subscription_id: &str) -> ManagementCredentials {
    ManagementCredentials::new(subscription_id, &test_certificate_base64())
        .unwrap_or_else(|e| panic!("test certificate rejected: {e}"))
}

/// Credentials carrying a private key, usable by `HttpTransport`.
pub fn test_credentials_with_key(subscription_id: &str) -> ManagementCredentials {
    ManagementCredentials::new(subscription_id, &test_identity_base64())
        .unwrap_or_else(|e| panic!("test identity rejected: {e}"))
}

fn self_signed() -> rcgen::Certificate {
    rcgen::generate_simple_self_signed(vec!["deployer.test".to_string()])
        .unwrap_or_else(|e| panic!("certificate generation failed: {e}"))
}
