//! Storage accounts – create, read keys, format connection strings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info};

use crate::client::{parse_xml, to_xml, ManagementClient, ManagementRequest, ManagementTransport};
use crate::operations::await_completion;
use crate::types::{
    CreateStorageServiceInput, ManagementError, ManagementResult, StorageAccountDescriptor,
    StorageKeys, StorageServiceKeysResponse, MANAGEMENT_XMLNS,
};

/// Create a storage account and wait for the provider to finish it.
pub async fn create_storage_account<T: ManagementTransport>(
    client: &ManagementClient<T>,
    account: &StorageAccountDescriptor,
) -> ManagementResult<()> {
    let body = to_xml(&CreateStorageServiceInput {
        xmlns: MANAGEMENT_XMLNS,
        service_name: account.name.clone(),
        label: STANDARD.encode(account.name.as_bytes()),
        location: account.region.clone(),
        account_type: account.account_type.as_str().to_string(),
    })?;
    let path = "/services/storageservices";
    debug!("create_storage_account({} in {}) → {}", account.name, account.region, client.url(path));

    let accepted = client
        .execute_checked(
            ManagementRequest::post_xml(path, &client.config().api_version, body),
            ManagementError::Provisioning,
        )
        .await?;
    await_completion(client, accepted, ManagementError::Provisioning).await?;
    info!("Storage account {} ({}) created in {}", account.name, account.account_type, account.region);
    Ok(())
}

/// Read the primary/secondary access keys of an account.
pub async fn get_storage_keys<T: ManagementTransport>(
    client: &ManagementClient<T>,
    account_name: &str,
) -> ManagementResult<StorageKeys> {
    let path = format!("/services/storageservices/{}/keys", account_name);
    debug!("get_storage_keys({}) → {}", account_name, client.url(&path));
    let resp = client
        .execute_checked(
            ManagementRequest::get(&path, &client.config().api_version),
            |fault| {
                if fault.status_code == 404 {
                    ManagementError::NotFound(fault)
                } else {
                    ManagementError::Provider(fault)
                }
            },
        )
        .await?;
    let parsed: StorageServiceKeysResponse = parse_xml(&resp.body)?;
    Ok(parsed.storage_service_keys)
}

/// Connection string for an account, built on its secondary key.
pub async fn get_connection_string<T: ManagementTransport>(
    client: &ManagementClient<T>,
    account_name: &str,
) -> ManagementResult<String> {
    let keys = get_storage_keys(client, account_name).await?;
    Ok(connection_string(account_name, &keys))
}

/// Always built on the secondary key; the primary is never exposed here.
pub fn connection_string(account_name: &str, keys: &StorageKeys) -> String {
    format!(
        "DefaultEndpointsProtocol=https;AccountName={};AccountKey={};",
        account_name, keys.secondary
    )
}

// ─── Tests ──────────────────────────────────────────────────────────
