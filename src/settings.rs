//! Deployer settings file (YAML or JSON).

use std::path::{Path, PathBuf};

use azdep_management::{AutoscalePolicyConfig, ManagementConfig, ManagementCredentials, ManagementError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("neither `certificate` nor `certificate_path` is set")]
    MissingCertificate,
    #[error(transparent)]
    Management(#[from] ManagementError),
}

impl From<SettingsError> for String {
    fn from(e: SettingsError) -> String {
        e.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerSettings {
    pub subscription_id: String,
    /// Inline base64 certificate; wins over `certificate_path`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// File holding the base64 certificate. Relative paths resolve against
    /// the settings file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<PathBuf>,
    /// Password of a PKCS#12 certificate; empty when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_password: Option<String>,
    pub management: ManagementConfig,
    pub autoscale: AutoscalePolicyConfig,
}

impl DeployerSettings {
    /// Load from `path`; `.json` is JSON, anything else YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let parse_err = |message: String| SettingsError::Parse { path: path.to_path_buf(), message };

        let mut settings: Self = if is_json {
            serde_json::from_str(&text).map_err(|e| parse_err(e.to_string()))?
        } else {
            serde_yaml::from_str(&text).map_err(|e| parse_err(e.to_string()))?
        };

        if let (Some(cert), Some(dir)) = (settings.certificate_path.as_mut(), path.parent()) {
            if cert.is_relative() {
                *cert = dir.join(&*cert);
            }
        }
        settings.autoscale.validate()?;
        log::debug!("Loaded deployer settings from {}", path.display());
        Ok(settings)
    }

    /// The base64 certificate text, from inline value or file.
    pub fn certificate_base64(&self) -> Result<String, SettingsError> {
        if let Some(inline) = &self.certificate {
            return Ok(inline.clone());
        }
        let path = self.certificate_path.as_ref().ok_or(SettingsError::MissingCertificate)?;
        std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })
    }

    pub fn credentials(&self) -> Result<ManagementCredentials, SettingsError> {
        Ok(ManagementCredentials::with_password(
            &self.subscription_id,
            &self.certificate_base64()?,
            self.certificate_password.as_deref().unwrap_or_default(),
        )?)
    }
}
