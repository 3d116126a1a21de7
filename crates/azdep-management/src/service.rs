//! Central service façade for cloud service management.
//!
//! Owns one credential context and the transport built on it, and exposes
//! every provisioning operation as a method. The credentials outlive every
//! operation started through the service and are released exactly once,
//! either by `close` or when a `scope` body finishes.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, warn};
use url::Url;

use crate::autoscale::{self, AutoscaleOutcome, AutoscalePolicyConfig};
use crate::client::{HttpTransport, ManagementClient, ManagementTransport};
use crate::compute;
use crate::credentials::ManagementCredentials;
use crate::deployment::{self, DeploymentRequest};
use crate::storage;
use crate::types::*;

pub struct ManagementService<T> {
    client: ManagementClient<T>,
}

impl ManagementService<HttpTransport> {
    /// Service over the certificate-authenticated HTTP transport.
    pub fn connect(credentials: ManagementCredentials, config: ManagementConfig) -> ManagementResult<Self> {
        let transport = HttpTransport::new(&credentials, &config)?;
        debug!("Connected to {} as subscription {}", transport.base_url(), credentials.subscription_id());
        Ok(Self::with_transport(credentials, transport, config))
    }
}

impl<T: ManagementTransport> ManagementService<T> {
    pub fn with_transport(credentials: ManagementCredentials, transport: T, config: ManagementConfig) -> Self {
        Self {
            client: ManagementClient::new(Arc::new(credentials), transport, config),
        }
    }

    pub fn client(&self) -> &ManagementClient<T> {
        &self.client
    }

    pub fn summary(&self) -> ConnectionSummary {
        let creds = self.client.credentials();
        let cert = creds.certificate();
        ConnectionSummary {
            subscription_id: creds.subscription_id().to_string(),
            endpoint: self.client.config().endpoint.clone(),
            certificate_subject: cert.subject.clone(),
            certificate_fingerprint: cert.fingerprint.clone(),
            certificate_not_after: cert.not_after.to_rfc3339(),
            has_private_key: creds.has_private_key(),
        }
    }

    // ── Storage ──────────────────────────────────────────────────────

    pub async fn create_storage_account(&self, account: &StorageAccountDescriptor) -> ManagementResult<()> {
        storage::create_storage_account(&self.client, account).await
    }

    pub async fn get_storage_keys(&self, account_name: &str) -> ManagementResult<StorageKeys> {
        storage::get_storage_keys(&self.client, account_name).await
    }

    pub async fn get_storage_connection_string(&self, account_name: &str) -> ManagementResult<String> {
        storage::get_connection_string(&self.client, account_name).await
    }

    // ── Hosted services ──────────────────────────────────────────────

    pub async fn create_hosted_service(&self, service: &HostedServiceDescriptor) -> ManagementResult<()> {
        compute::create_hosted_service(&self.client, service).await
    }

    /// Publish into the production slot and start the deployment.
    pub async fn deploy_cloud_service(
        &self,
        service_name: &str,
        package_uri: Url,
        config_path: impl AsRef<Path>,
    ) -> ManagementResult<DeploymentReceipt> {
        deployment::deploy(&self.client, &DeploymentRequest::new(service_name, package_uri, config_path)).await
    }

    pub async fn deploy_to_slot(&self, request: &DeploymentRequest) -> ManagementResult<DeploymentReceipt> {
        deployment::deploy(&self.client, request).await
    }

    // ── Autoscale ────────────────────────────────────────────────────

    pub async fn autoscale_cloud_service(
        &self,
        service_name: &str,
        role_name: &str,
        config: &AutoscalePolicyConfig,
    ) -> ManagementResult<AutoscaleOutcome> {
        autoscale::autoscale_cloud_service(&self.client, service_name, role_name, config).await
    }

    // ── Lifetime ─────────────────────────────────────────────────────

    /// Run `f` against the service, then release the credentials.
    ///
    /// Every future `f` creates borrows the service, so all of them have
    /// completed by the time the release happens.
    pub async fn scope<R, F>(self, f: F) -> R
    where
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, R>,
    {
        let out = f(&self).await;
        self.close();
        out
    }

    /// Release the credential context.
    pub fn close(self) {
        let (credentials, _transport) = self.client.into_parts();
        match Arc::try_unwrap(credentials) {
            Ok(creds) => creds.release(),
            Err(shared) => warn!(
                "Management certificate {} still shared on close; released with last holder",
                shared.certificate().fingerprint
            ),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use futures::FutureExt;

    use super::*;
    use crate::testing::{test_credentials, ScriptedTransport};

    fn service(t: ScriptedTransport) -> ManagementService<ScriptedTransport> {
        let config = ManagementConfig { operation_poll_interval_ms: 0, ..Default::default() };
        ManagementService::with_transport(test_credentials("sub-1"), t, config)
    }

    #[test]
    fn summary_describes_certificate() {
        let s = service(ScriptedTransport::new());
        let sum = s.summary();
        assert_eq!(sum.subscription_id, "sub-1");
        assert_eq!(sum.endpoint, MANAGEMENT_BASE);
        assert_eq!(sum.certificate_fingerprint.len(), 64);
        assert!(!sum.has_private_key);
        s.close();
    }

    #[test]
    fn connect_requires_private_key() {
        let err = ManagementService::connect(test_credentials("sub-1"), ManagementConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ManagementError::Credential(_)));
    }

    #[tokio::test]
    async fn scope_runs_full_provisioning_flow() {
        let mut cfg = tempfile::NamedTempFile::new().unwrap();
        cfg.write_all(b"<ServiceConfiguration serviceName=\"acme-web\" />").unwrap();
        let cfg_path = cfg.path().to_path_buf();

        let t = ScriptedTransport::new();
        t.push_accepted("op-1")
            .push_operation("op-1", "Succeeded", 200)
            .push_status(
                200,
                "<StorageService><StorageServiceKeys><Primary>pk</Primary><Secondary>sk</Secondary></StorageServiceKeys></StorageService>",
            )
            .push_status(201, "")
            .push_status(202, "");
        let s = service(t);

        let (conn, receipt) = s
            .scope(|svc| {
                async move {
                    svc.create_storage_account(&StorageAccountDescriptor {
                        region: "West Europe".into(),
                        name: "acmestore".into(),
                        account_type: StorageAccountType::StandardLrs,
                    })
                    .await?;
                    let conn = svc.get_storage_connection_string("acmestore").await?;
                    svc.create_hosted_service(&HostedServiceDescriptor {
                        region: "West Europe".into(),
                        name: "acme-web".into(),
                    })
                    .await?;
                    let package = Url::parse("https://acmestore.blob.core.windows.net/p/acme.cspkg").unwrap();
                    let receipt = svc.deploy_cloud_service("acme-web", package, &cfg_path).await?;
                    Ok::<_, ManagementError>((conn, receipt))
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(conn, "DefaultEndpointsProtocol=https;AccountName=acmestore;AccountKey=sk;");
        assert_eq!(receipt.slot, DeploymentSlot::Production);
    }

    #[tokio::test]
    async fn scope_surfaces_errors() {
        let t = ScriptedTransport::new();
        t.push_status(404, "<Error><Code>ResourceNotFound</Code><Message>gone</Message></Error>");
        let err = service(t)
            .scope(|svc| svc.get_storage_connection_string("ghost").boxed())
            .await
            .unwrap_err();
        assert!(matches!(err, ManagementError::NotFound(_)));
    }

    #[tokio::test]
    async fn autoscale_through_service() {
        let stock = autoscale::synthesize(
            &autoscale::RoleTarget::production("acme-web", "WebRole1"),
            &AutoscalePolicyConfig::default(),
        );
        let t = ScriptedTransport::new();
        t.push_status(200, "").push_status(200, &serde_json::to_string(&stock).unwrap());
        let s = service(t);
        let outcome = s
            .autoscale_cloud_service("acme-web", "WebRole1", &AutoscalePolicyConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.status_code, "OK");
        assert!(outcome.is_consistent());
        s.close();
    }
}
