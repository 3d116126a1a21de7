//! Hosted (cloud) services.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info};

use crate::client::{to_xml, ManagementClient, ManagementRequest, ManagementTransport};
use crate::operations::await_completion;
use crate::types::{
    CreateHostedServiceInput, HostedServiceDescriptor, ManagementError, ManagementResult,
    MANAGEMENT_XMLNS,
};

/// Create a hosted service. Acceptance is success; nothing is read back.
pub async fn create_hosted_service<T: ManagementTransport>(
    client: &ManagementClient<T>,
    service: &HostedServiceDescriptor,
) -> ManagementResult<()> {
    let body = to_xml(&CreateHostedServiceInput {
        xmlns: MANAGEMENT_XMLNS,
        service_name: service.name.clone(),
        label: STANDARD.encode(service.name.as_bytes()),
        location: service.region.clone(),
    })?;
    let path = "/services/hostedservices";
    debug!("create_hosted_service({} in {}) → {}", service.name, service.region, client.url(path));

    let resp = client
        .execute_checked(
            ManagementRequest::post_xml(path, &client.config().api_version, body),
            ManagementError::Provisioning,
        )
        .await?;
    await_completion(client, resp, ManagementError::Provisioning).await?;
    info!("Hosted service {} created in {}", service.name, service.region);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{test_credentials, ScriptedTransport};
    use crate::types::ManagementConfig;

    fn client(t: ScriptedTransport) -> ManagementClient<ScriptedTransport> {
        ManagementClient::new(Arc::new(test_credentials("sub-1")), t, ManagementConfig::default())
    }

    fn service() -> HostedServiceDescriptor {
        HostedServiceDescriptor { region: "North Europe".into(), name: "acme-web".into() }
    }

    #[tokio::test]
    async fn created_without_read_back() {
        let t = ScriptedTransport::new();
        t.push_status(201, "");
        let c = client(t);
        create_hosted_service(&c, &service()).await.unwrap();

        let reqs = c.transport().requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].path, "/services/hostedservices");
        assert_eq!(reqs[0].api_version, "2014-06-01");
        let body = &reqs[0].body.as_ref().unwrap().text;
        assert!(body.starts_with("<CreateHostedService"));
        assert!(body.contains("<ServiceName>acme-web</ServiceName>"));
        assert!(body.contains("<Location>North Europe</Location>"));
    }

    #[tokio::test]
    async fn name_collision_is_provisioning_error() {
        let t = ScriptedTransport::new();
        t.push_status(
            409,
            "<Error><Code>ConflictError</Code><Message>The specified DNS name is already taken.</Message></Error>",
        );
        let err = create_hosted_service(&client(t), &service()).await.unwrap_err();
        assert!(matches!(err, ManagementError::Provisioning(ref f) if f.status_code == 409 && f.code == "ConflictError"));
    }

    #[tokio::test]
    async fn invalid_region_is_provisioning_error() {
        let t = ScriptedTransport::new();
        t.push_status(400, "<Error><Code>BadRequest</Code><Message>The location constraint is not valid</Message></Error>");
        let err = create_hosted_service(&client(t), &service()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));
    }
}
