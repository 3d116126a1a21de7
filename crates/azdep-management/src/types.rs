//! Core types for the cloud service management API.
//!
//! Errors, configuration, provisioning descriptors, the autoscale policy
//! model and the XML bodies exchanged with the Service Management endpoint.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Service Management endpoint.
pub const MANAGEMENT_BASE: &str = "https://management.core.windows.net";

/// XML namespace of every Service Management request body.
pub const MANAGEMENT_XMLNS: &str = "http://schemas.microsoft.com/windowsazure";

pub mod api_versions {
    pub const SERVICE_MANAGEMENT: &str = "2014-06-01";
    pub const AUTOSCALE: &str = "2013-10-01";
}

// ─── Error types ─────────────────────────────────────────────────────

/// A failure reported by the provider, kept exactly as received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderFault {
    /// HTTP status code of the failed call (or of the failed async operation).
    pub status_code: u16,
    /// Provider error code (e.g. `ConflictError`), empty when none was sent.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ProviderFault {
    pub fn new(status_code: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Build a fault from an error response body.
    ///
    /// Service Management answers with
    /// `<Error><Code>…</Code><Message>…</Message></Error>`, the autoscale
    /// endpoint with `{"Code": "…", "Message": "…"}`. Anything else is kept
    /// verbatim as the message.
    pub fn from_response(status_code: u16, body: &str) -> Self {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            if let Ok(err) = quick_xml::de::from_str::<XmlErrorBody>(trimmed) {
                return Self::new(status_code, err.code, err.message);
            }
        } else if trimmed.starts_with('{') {
            if let Ok(val) = serde_json::from_str::<serde_json::Value>(trimmed) {
                let code = val
                    .get("Code")
                    .or_else(|| val.get("code"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let message = val
                    .get("Message")
                    .or_else(|| val.get("message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or(body);
                return Self::new(status_code, code, message);
            }
        }
        Self::new(status_code, "", body)
    }
}

impl fmt::Display for ProviderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "HTTP {}: {}", self.status_code, self.message)?;
        } else {
            write!(f, "HTTP {} {}: {}", self.status_code, self.code, self.message)?;
        }
        if let Some(ref id) = self.request_id {
            write!(f, " [RequestId: {}]", id)?;
        }
        Ok(())
    }
}

/// Error taxonomy of every management operation.
#[derive(Debug, Error)]
pub enum ManagementError {
    /// Malformed or undecodable credential material.
    #[error("credential error: {0}")]
    Credential(String),
    /// A create request was rejected (name collision, invalid parameters).
    #[error("provisioning rejected: {0}")]
    Provisioning(ProviderFault),
    /// The referenced resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(ProviderFault),
    /// A deployment was rejected.
    #[error("deployment rejected: {0}")]
    Deployment(ProviderFault),
    /// Any other provider-reported failure.
    #[error("provider error: {0}")]
    Provider(ProviderFault),
    /// Local configuration document unreadable.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value: {0}")]
    Validation(String),
    /// The request never produced a provider response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The provider answered with something we could not read.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl ManagementError {
    /// The provider fault behind this error, if the provider produced one.
    pub fn fault(&self) -> Option<&ProviderFault> {
        match self {
            Self::Provisioning(f) | Self::NotFound(f) | Self::Deployment(f) | Self::Provider(f) => {
                Some(f)
            }
            _ => None,
        }
    }

    /// Provider HTTP status code, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        self.fault().map(|f| f.status_code)
    }
}

impl From<reqwest::Error> for ManagementError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ManagementError> for String {
    fn from(e: ManagementError) -> String {
        e.to_string()
    }
}

pub type ManagementResult<T> = Result<T, ManagementError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XmlErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

// ─── Configuration ───────────────────────────────────────────────────

/// Transport and polling settings for the management endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagementConfig {
    pub endpoint: String,
    pub api_version: String,
    pub autoscale_api_version: String,
    /// Delay between two status polls of an asynchronous operation.
    pub operation_poll_interval_ms: u64,
    /// Per-request timeout applied by the HTTP transport.
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl ManagementConfig {
    pub fn new() -> Self {
        Self {
            endpoint: MANAGEMENT_BASE.into(),
            api_version: api_versions::SERVICE_MANAGEMENT.into(),
            autoscale_api_version: api_versions::AUTOSCALE.into(),
            operation_poll_interval_ms: 2_000,
            request_timeout_secs: 60,
            user_agent: concat!("azdeploy/", env!("CARGO_PKG_VERSION")).into(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.operation_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Storage ─────────────────────────────────────────────────────────

/// Replication tier of a storage account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageAccountType {
    #[serde(rename = "Standard_LRS")]
    StandardLrs,
    #[serde(rename = "Standard_ZRS")]
    StandardZrs,
    #[serde(rename = "Standard_GRS")]
    StandardGrs,
    #[serde(rename = "Standard_RAGRS")]
    StandardRagrs,
    #[serde(rename = "Premium_LRS")]
    PremiumLrs,
}

impl StorageAccountType {
    pub const ALL: [StorageAccountType; 5] = [
        Self::StandardLrs,
        Self::StandardZrs,
        Self::StandardGrs,
        Self::StandardRagrs,
        Self::PremiumLrs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StandardLrs => "Standard_LRS",
            Self::StandardZrs => "Standard_ZRS",
            Self::StandardGrs => "Standard_GRS",
            Self::StandardRagrs => "Standard_RAGRS",
            Self::PremiumLrs => "Premium_LRS",
        }
    }
}

impl fmt::Display for StorageAccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unknown type is a rejected storage account creation, reported the
/// way the provider reports it (`400 InvalidAccountType`).
impl FromStr for StorageAccountType {
    type Err = ManagementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ManagementError::Provisioning(ProviderFault::new(
                    400,
                    "InvalidAccountType",
                    format!("The storage account type '{}' is not supported.", s),
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageAccountDescriptor {
    pub region: String,
    pub name: String,
    pub account_type: StorageAccountType,
}

impl StorageAccountDescriptor {
    /// Descriptor from a textual account type, e.g. `"Standard_GRS"`.
    pub fn parse(region: &str, name: &str, account_type: &str) -> ManagementResult<Self> {
        Ok(Self {
            region: region.to_string(),
            name: name.to_string(),
            account_type: account_type.parse()?,
        })
    }
}

/// The rotating access-key pair of a storage account.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageKeys {
    pub primary: String,
    pub secondary: String,
}

impl fmt::Debug for StorageKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageKeys")
            .field("primary", &"<redacted>")
            .field("secondary", &"<redacted>")
            .finish()
    }
}

// ─── Hosted services & deployments ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostedServiceDescriptor {
    pub region: String,
    pub name: String,
}

/// One of the two parallel environments of a hosted service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentSlot {
    #[default]
    Production,
    Staging,
}

impl DeploymentSlot {
    /// Path segment used by the management API.
    pub fn as_path(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
        }
    }

    /// Short form used in deployment labels.
    pub fn label_tag(&self) -> &'static str {
        match self {
            Self::Production => "Prod",
            Self::Staging => "Staging",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for DeploymentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

/// Result of a successful deployment submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentReceipt {
    pub service_name: String,
    pub deployment_id: String,
    pub label: String,
    pub slot: DeploymentSlot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub subscription_id: String,
    pub endpoint: String,
    pub certificate_subject: String,
    pub certificate_fingerprint: String,
    pub certificate_not_after: String,
    pub has_private_key: bool,
}

// ─── Autoscale policy model ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricStatistic {
    Average,
    Min,
    Max,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeAggregation {
    Average,
    Minimum,
    Maximum,
    Last,
    Total,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleDirection {
    None,
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleType {
    ChangeCount,
    PercentChangeCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceFrequency {
    None,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// Instance count bounds; the provider transports them as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScaleCapacity {
    pub minimum: String,
    pub maximum: String,
    pub default: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecurrentSchedule {
    pub time_zone: String,
    pub days: Vec<String>,
    pub hours: Vec<u32>,
    pub minutes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Recurrence {
    pub frequency: RecurrenceFrequency,
    pub schedule: RecurrentSchedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricTrigger {
    pub metric_name: String,
    #[serde(default)]
    pub metric_namespace: String,
    pub metric_source: String,
    #[serde(with = "crate::iso8601")]
    pub time_grain: Duration,
    pub statistic: MetricStatistic,
    #[serde(with = "crate::iso8601")]
    pub time_window: Duration,
    pub time_aggregation: TimeAggregation,
    pub operator: ComparisonOperator,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScaleAction {
    pub direction: ScaleDirection,
    #[serde(rename = "Type")]
    pub scale_type: ScaleType,
    pub value: String,
    #[serde(with = "crate::iso8601")]
    pub cooldown: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScaleRule {
    pub metric_trigger: MetricTrigger,
    pub scale_action: ScaleAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutoscaleProfile {
    pub name: String,
    pub capacity: ScaleCapacity,
    pub rules: Vec<ScaleRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
}

/// The document submitted to (and read back from) the autoscale endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutoscaleSetting {
    pub profiles: Vec<AutoscaleProfile>,
    pub enabled: bool,
}

// ─── Service Management XML bodies ───────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename = "CreateStorageServiceInput", rename_all = "PascalCase")]
pub struct CreateStorageServiceInput {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    pub service_name: String,
    /// Base64-encoded, as the API requires.
    pub label: String,
    pub location: String,
    pub account_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CreateHostedService", rename_all = "PascalCase")]
pub struct CreateHostedServiceInput {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    pub service_name: String,
    pub label: String,
    pub location: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CreateDeployment", rename_all = "PascalCase")]
pub struct CreateDeploymentInput {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    pub name: String,
    pub package_url: String,
    pub label: String,
    /// Base64 of the service configuration document.
    pub configuration: String,
    pub start_deployment: bool,
    pub treat_warnings_as_error: bool,
}

/// `GET /services/storageservices/{name}/keys`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageServiceKeysResponse {
    #[serde(default)]
    pub service_name: Option<String>,
    pub storage_service_keys: StorageKeys,
}

/// Asynchronous operation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OperationState {
    InProgress,
    Succeeded,
    Failed,
}

/// `GET /operations/{request-id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationStatus {
    #[serde(rename = "ID", default)]
    pub id: String,
    pub status: OperationState,
    #[serde(default)]
    pub http_status_code: Option<u16>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ─── Tests ──────────────────────────────────────────────────────────
