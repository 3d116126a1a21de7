//! Package deployments into a hosted service slot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use log::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::client::{to_xml, ManagementClient, ManagementRequest, ManagementTransport};
use crate::operations::await_completion;
use crate::types::{
    CreateDeploymentInput, DeploymentReceipt, DeploymentSlot, ManagementError, ManagementResult,
    MANAGEMENT_XMLNS,
};

/// 100-ns ticks between 0001-01-01 and the Unix epoch.
const EPOCH_TICKS: i64 = 621_355_968_000_000_000;

static LAST_TICK: AtomicI64 = AtomicI64::new(0);

/// Wall-clock ticks, strictly increasing within the process.
pub fn next_label_tick() -> i64 {
    let now = Utc::now().timestamp_micros() * 10 + EPOCH_TICKS;
    let prev = LAST_TICK
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or_else(|last| last);
    now.max(prev + 1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub service_name: String,
    pub package_uri: Url,
    pub config_path: PathBuf,
    pub slot: DeploymentSlot,
    pub start: bool,
}

impl DeploymentRequest {
    /// Production slot, started on arrival.
    pub fn new(service_name: &str, package_uri: Url, config_path: impl AsRef<Path>) -> Self {
        Self {
            service_name: service_name.to_string(),
            package_uri,
            config_path: config_path.as_ref().to_path_buf(),
            slot: DeploymentSlot::Production,
            start: true,
        }
    }

    pub fn with_slot(mut self, slot: DeploymentSlot) -> Self {
        self.slot = slot;
        self
    }
}

/// Publish a package + configuration into the request's slot.
///
/// The configuration document is read in full before anything is sent; it
/// is forwarded verbatim and only the provider judges it.
pub async fn deploy<T: ManagementTransport>(
    client: &ManagementClient<T>,
    request: &DeploymentRequest,
) -> ManagementResult<DeploymentReceipt> {
    let configuration = tokio::fs::read_to_string(&request.config_path)
        .await
        .map_err(|source| ManagementError::Io {
            path: request.config_path.clone(),
            source,
        })?;

    let deployment_id = Uuid::new_v4().to_string();
    let label = format!(
        "{} {} {}",
        request.service_name,
        request.slot.label_tag(),
        next_label_tick()
    );

    let body = to_xml(&CreateDeploymentInput {
        xmlns: MANAGEMENT_XMLNS,
        name: deployment_id.clone(),
        package_url: request.package_uri.to_string(),
        label: STANDARD.encode(label.as_bytes()),
        configuration: STANDARD.encode(configuration.as_bytes()),
        start_deployment: request.start,
        treat_warnings_as_error: false,
    })?;
    let path = format!(
        "/services/hostedservices/{}/deploymentslots/{}",
        request.service_name,
        request.slot.as_path()
    );
    debug!(
        "deploy({} → {}, id {}) → {}",
        request.package_uri,
        request.service_name,
        deployment_id,
        client.url(&path)
    );

    let accepted = client
        .execute_checked(
            ManagementRequest::post_xml(&path, &client.config().api_version, body),
            ManagementError::Deployment,
        )
        .await?;
    await_completion(client, accepted, ManagementError::Deployment).await?;

    info!(
        "Deployment {} ({}) published to {} {}",
        deployment_id, label, request.service_name, request.slot
    );
    Ok(DeploymentReceipt {
        service_name: request.service_name.clone(),
        deployment_id,
        label,
        slot: request.slot,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::testing::{test_credentials, ScriptedTransport};
    use crate::types::ManagementConfig;

    const CSCFG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ServiceConfiguration serviceName="acme-web" xmlns="http://schemas.microsoft.com/ServiceHosting/2008/10/ServiceConfiguration">
  <Role name="WebRole1"><Instances count="1" /></Role>
</ServiceConfiguration>"#;

    fn client(t: ScriptedTransport) -> ManagementClient<ScriptedTransport> {
        let config = ManagementConfig { operation_poll_interval_ms: 0, ..Default::default() };
        ManagementClient::new(Arc::new(test_credentials("sub-1")), t, config)
    }

    fn config_file() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(CSCFG.as_bytes()).unwrap();
        f
    }

    fn package() -> Url {
        Url::parse("https://acmestore.blob.core.windows.net/packages/acme-web.cspkg").unwrap()
    }

    fn body_field<'a>(xml: &'a str, tag: &str) -> &'a str {
        let open = format!("<{}>", tag);
        let start = xml.find(&open).unwrap() + open.len();
        let end = xml[start..].find(&format!("</{}>", tag)).unwrap();
        &xml[start..start + end]
    }

    #[test]
    fn ticks_strictly_increase() {
        let mut last = next_label_tick();
        for _ in 0..1_000 {
            let t = next_label_tick();
            assert!(t > last);
            last = t;
        }
    }

    #[tokio::test]
    async fn deploys_to_production_and_starts() {
        let cfg = config_file();
        let t = ScriptedTransport::new();
        t.push_accepted("op-1").push_operation("op-1", "Succeeded", 200);
        let c = client(t);

        let receipt = deploy(&c, &DeploymentRequest::new("acme-web", package(), cfg.path()))
            .await
            .unwrap();
        assert_eq!(receipt.slot, DeploymentSlot::Production);
        assert!(receipt.label.starts_with("acme-web Prod "));
        assert!(Uuid::parse_str(&receipt.deployment_id).is_ok());

        let reqs = c.transport().requests();
        assert_eq!(reqs[0].path, "/services/hostedservices/acme-web/deploymentslots/production");
        let xml = &reqs[0].body.as_ref().unwrap().text;
        assert_eq!(body_field(xml, "Name"), receipt.deployment_id);
        assert_eq!(body_field(xml, "PackageUrl"), package().as_str());
        assert_eq!(body_field(xml, "StartDeployment"), "true");
        let config = STANDARD.decode(body_field(xml, "Configuration")).unwrap();
        assert_eq!(String::from_utf8(config).unwrap(), CSCFG);
        let label = STANDARD.decode(body_field(xml, "Label")).unwrap();
        assert_eq!(String::from_utf8(label).unwrap(), receipt.label);
    }

    #[tokio::test]
    async fn every_call_gets_a_fresh_id() {
        let cfg = config_file();
        let t = ScriptedTransport::new();
        t.push_status(200, "").push_status(200, "");
        let c = client(t);
        let req = DeploymentRequest::new("acme-web", package(), cfg.path());

        let a = deploy(&c, &req).await.unwrap();
        let b = deploy(&c, &req).await.unwrap();
        assert_ne!(a.deployment_id, b.deployment_id);
        assert_ne!(a.label, b.label);
    }

    #[tokio::test]
    async fn unreadable_config_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.cscfg");
        let c = client(ScriptedTransport::new());

        let err = deploy(&c, &DeploymentRequest::new("acme-web", package(), &missing))
            .await
            .unwrap_err();
        match err {
            ManagementError::Io { path, source } => {
                assert_eq!(path, missing);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(c.transport().request_count(), 0);
    }

    #[tokio::test]
    async fn missing_service_is_deployment_error() {
        let cfg = config_file();
        let t = ScriptedTransport::new();
        t.push_status(404, "<Error><Code>ResourceNotFound</Code><Message>No deployments were found.</Message></Error>");
        let err = deploy(&client(t), &DeploymentRequest::new("ghost", package(), cfg.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagementError::Deployment(ref f) if f.status_code == 404));
    }

    #[tokio::test]
    async fn rejected_package_during_operation() {
        let cfg = config_file();
        let t = ScriptedTransport::new();
        t.push_accepted("op-9")
            .push_failed_operation("op-9", 400, "BadRequest", "The package could not be downloaded.");
        let err = deploy(&client(t), &DeploymentRequest::new("acme-web", package(), cfg.path()))
            .await
            .unwrap_err();
        match err {
            ManagementError::Deployment(f) => {
                assert_eq!(f.status_code, 400);
                assert!(f.message.contains("could not be downloaded"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn staging_slot() {
        let cfg = config_file();
        let t = ScriptedTransport::new();
        t.push_status(200, "");
        let c = client(t);
        let receipt = deploy(
            &c,
            &DeploymentRequest::new("acme-web", package(), cfg.path()).with_slot(DeploymentSlot::Staging),
        )
        .await
        .unwrap();
        assert!(receipt.label.starts_with("acme-web Staging "));
        assert!(c.transport().requests()[0].path.ends_with("/deploymentslots/staging"));
    }
}
