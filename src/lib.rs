//! Deployer front end: settings, logging and connection setup around the
//! `azdep_management` core.

pub mod logging;
pub mod settings;

pub use azdep_management as management;

use azdep_management::{HttpTransport, ManagementService};
use settings::{DeployerSettings, SettingsError};

/// Build the certificate-authenticated service described by `settings`.
pub fn connect(settings: &DeployerSettings) -> Result<ManagementService<HttpTransport>, SettingsError> {
    let span = tracing::info_span!("connect", subscription = %settings.subscription_id);
    let _guard = span.enter();

    let credentials = settings.credentials()?;
    let service = ManagementService::connect(credentials, settings.management.clone())?;
    let summary = service.summary();
    tracing::info!(
        endpoint = %summary.endpoint,
        certificate = %summary.certificate_fingerprint,
        expires = %summary.certificate_not_after,
        "management service ready"
    );
    Ok(service)
}
