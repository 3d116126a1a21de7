//! # azdeploy – Cloud Service Management Core
//!
//! Certificate-authenticated provisioning against the classic Service
//! Management endpoint.
//!
//! ## Features
//!
//! - **Credentials** – subscription id + base64 X.509 management certificate (DER or PEM bundle)
//! - **Storage Accounts** – create, read keys, secondary-key connection strings
//! - **Hosted Services** – create
//! - **Deployments** – publish package + configuration into production or staging, started on arrival
//! - **Autoscale** – synthesize CPU-driven policies, submit, read back and diff
//! - **Async operations** – `202 Accepted` requests polled to completion

pub mod types;
pub mod iso8601;
pub mod credentials;
pub mod client;
pub mod operations;
pub mod storage;
pub mod compute;
pub mod deployment;
pub mod autoscale;
pub mod service;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use autoscale::{AutoscaleOutcome, AutoscalePolicy, AutoscalePolicyConfig, PolicyDrift, RoleTarget};
pub use client::{HttpTransport, ManagementClient, ManagementRequest, ManagementResponse, ManagementTransport};
pub use credentials::{CertificateSummary, ManagementCredentials};
pub use deployment::DeploymentRequest;
pub use service::ManagementService;
pub use types::*;
