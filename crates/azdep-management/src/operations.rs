//! Completion of asynchronous Service Management operations.
//!
//! Create calls answer `202 Accepted` with an `x-ms-request-id`; the work is
//! done once `GET /operations/{id}` reports `Succeeded` or `Failed`. There is
//! no overall deadline here: callers bound the wait at the transport.

use log::debug;

use crate::client::{parse_xml, ManagementClient, ManagementRequest, ManagementResponse, ManagementTransport};
use crate::types::{
    ManagementError, ManagementResult, OperationState, OperationStatus, ProviderFault,
};

/// Wait for the operation started by `accepted` to finish.
///
/// A failed operation becomes the error chosen by `classify`, carrying the
/// operation's own status code and error. A response without a request id
/// completed synchronously and is returned as-is.
pub async fn await_completion<T: ManagementTransport>(
    client: &ManagementClient<T>,
    accepted: ManagementResponse,
    classify: impl Fn(ProviderFault) -> ManagementError,
) -> ManagementResult<ManagementResponse> {
    let request_id = match accepted.request_id.clone() {
        Some(id) if accepted.status == 202 && !id.is_empty() => id,
        _ => return Ok(accepted),
    };

    let path = format!("/operations/{}", request_id);
    let mut polls = 0u32;
    loop {
        let resp = client
            .execute_checked(
                ManagementRequest::get(&path, &client.config().api_version),
                &classify,
            )
            .await?;
        let status: OperationStatus = parse_xml(&resp.body)?;
        polls += 1;

        match status.status {
            OperationState::Succeeded => {
                debug!("operation {} succeeded after {} poll(s)", request_id, polls);
                return Ok(accepted);
            }
            OperationState::Failed => {
                let (code, message) = status
                    .error
                    .map(|e| (e.code, e.message))
                    .unwrap_or_default();
                let fault = ProviderFault::new(
                    status.http_status_code.unwrap_or(accepted.status),
                    code,
                    message,
                )
                .with_request_id(Some(request_id));
                return Err(classify(fault));
            }
            OperationState::InProgress => {
                tokio::time::sleep(client.config().poll_interval()).await;
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{test_credentials, ScriptedTransport};
    use crate::types::ManagementConfig;

    fn client(transport: ScriptedTransport) -> ManagementClient<ScriptedTransport> {
        let config = ManagementConfig {
            operation_poll_interval_ms: 0,
            ..ManagementConfig::default()
        };
        ManagementClient::new(Arc::new(test_credentials("sub-1")), transport, config)
    }

    fn accepted(id: &str) -> ManagementResponse {
        ManagementResponse { status: 202, request_id: Some(id.into()), body: String::new() }
    }

    #[tokio::test]
    async fn polls_until_succeeded() {
        let t = ScriptedTransport::new();
        t.push_operation("op-1", "InProgress", 202)
            .push_operation("op-1", "InProgress", 202)
            .push_operation("op-1", "Succeeded", 200);
        let c = client(t);
        let resp = await_completion(&c, accepted("op-1"), ManagementError::Provisioning)
            .await
            .unwrap();
        assert_eq!(resp.status, 202);
        let reqs = c.transport().requests();
        assert_eq!(reqs.len(), 3);
        assert!(reqs.iter().all(|r| r.path == "/operations/op-1"));
    }

    #[tokio::test]
    async fn failed_operation_carries_its_status() {
        let t = ScriptedTransport::new();
        t.push_failed_operation("op-2", 409, "ConflictError", "name taken");
        let c = client(t);
        let err = await_completion(&c, accepted("op-2"), ManagementError::Provisioning)
            .await
            .unwrap_err();
        match err {
            ManagementError::Provisioning(f) => {
                assert_eq!(f.status_code, 409);
                assert_eq!(f.code, "ConflictError");
                assert_eq!(f.message, "name taken");
                assert_eq!(f.request_id.as_deref(), Some("op-2"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn synchronous_completion_skips_polling() {
        let c = client(ScriptedTransport::new());
        let done = ManagementResponse { status: 201, request_id: Some("x".into()), body: String::new() };
        await_completion(&c, done, ManagementError::Provisioning).await.unwrap();
        assert_eq!(c.transport().request_count(), 0);
    }

    #[tokio::test]
    async fn unreadable_status_is_protocol_error() {
        let t = ScriptedTransport::new();
        t.push_status(200, "definitely not xml");
        let c = client(t);
        let err = await_completion(&c, accepted("op-3"), ManagementError::Deployment)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagementError::Protocol(_)));
    }
}
