//! Autoscale policy synthesis for cloud service roles.
//!
//! A policy moves through three states:
//!
//! ```text
//! Built ──submit()──▶ Submitted ──verify()──▶ Verified
//! ```
//!
//! `Built` holds the synthesized setting, `Submitted` adds the provider's raw
//! status text, `Verified` adds the setting read back and its differences
//! from what was sent. All three share one `RoleTarget`, which is the only
//! source of both the resource id and every rule's metric source.

use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::client::{ManagementClient, ManagementRequest, ManagementTransport};
use crate::types::{
    AutoscaleProfile, AutoscaleSetting, ComparisonOperator, ManagementError, ManagementResult,
    MetricStatistic, MetricTrigger, Recurrence, RecurrenceFrequency, RecurrentSchedule,
    ScaleAction, ScaleCapacity, ScaleDirection, ScaleRule, ScaleType, TimeAggregation,
};

// ─── Target ─────────────────────────────────────────────────────────

/// A role of a cloud service in one deployment slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleTarget {
    pub service_name: String,
    pub role_name: String,
    pub production: bool,
}

impl RoleTarget {
    pub fn new(service_name: &str, role_name: &str, production: bool) -> Self {
        Self {
            service_name: service_name.to_string(),
            role_name: role_name.to_string(),
            production,
        }
    }

    /// Production slot, as every policy of this crate targets by default.
    pub fn production(service_name: &str, role_name: &str) -> Self {
        Self::new(service_name, role_name, true)
    }

    fn path(&self) -> String {
        format!(
            "/hostedservices/{}/deploymentslots/{}/roles/{}",
            self.service_name,
            if self.production { "production" } else { "staging" },
            self.role_name
        )
    }

    /// Id the autoscale setting is stored under.
    pub fn resource_id(&self) -> String {
        self.path()
    }

    /// Source every metric trigger samples.
    pub fn metric_source(&self) -> String {
        self.path()
    }
}

// ─── Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub minimum: u32,
    pub default: u32,
    pub maximum: u32,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self { minimum: 1, default: 1, maximum: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrenceConfig {
    pub frequency: RecurrenceFrequency,
    pub days: Vec<String>,
    pub hours: Vec<u32>,
    pub minutes: Vec<u32>,
    pub time_zone: String,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            frequency: RecurrenceFrequency::Week,
            days: vec!["Monday".into(), "Thursday".into(), "Friday".into()],
            hours: vec![7, 19],
            minutes: vec![0],
            time_zone: "Eastern Standard Time".into(),
        }
    }
}

/// One direction of scaling: the threshold that fires it and what it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleStep {
    pub threshold: f64,
    /// Instances added or removed per action.
    pub change: u32,
    #[serde(with = "crate::iso8601")]
    pub cooldown: Duration,
}

/// A `ScaleStep` with every field optional, merged over a default step.
#[derive(Deserialize)]
struct ScaleStepOverride {
    threshold: Option<f64>,
    change: Option<u32>,
    cooldown: Option<String>,
}

impl ScaleStep {
    /// CPU >= 80 % adds one instance, then waits 20 minutes.
    pub fn scale_out() -> Self {
        Self { threshold: 80.0, change: 1, cooldown: Duration::from_secs(20 * 60) }
    }

    /// CPU <= 60 % removes one instance, then waits 20 minutes.
    pub fn scale_in() -> Self {
        Self { threshold: 60.0, change: 1, cooldown: Duration::from_secs(20 * 60) }
    }

    fn merged<'de, D: Deserializer<'de>>(base: Self, deserializer: D) -> Result<Self, D::Error> {
        let o = ScaleStepOverride::deserialize(deserializer)?;
        let cooldown = match o.cooldown {
            Some(text) => crate::iso8601::parse(&text).map_err(serde::de::Error::custom)?,
            None => base.cooldown,
        };
        Ok(Self {
            threshold: o.threshold.unwrap_or(base.threshold),
            change: o.change.unwrap_or(base.change),
            cooldown,
        })
    }

    fn scale_out_override<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::merged(Self::scale_out(), deserializer)
    }

    fn scale_in_override<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::merged(Self::scale_in(), deserializer)
    }
}

/// Every tunable of the synthesized policy. `Default` is the stock policy:
/// CPU ≥ 80 % over 30 minutes adds an instance, ≤ 60 % removes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalePolicyConfig {
    pub profile_name: String,
    pub enabled: bool,
    pub capacity: CapacityConfig,
    pub metric_name: String,
    pub metric_namespace: String,
    pub statistic: MetricStatistic,
    pub time_aggregation: TimeAggregation,
    #[serde(with = "crate::iso8601")]
    pub time_grain: Duration,
    #[serde(with = "crate::iso8601")]
    pub time_window: Duration,
    /// Fields left out of an override keep that direction's stock values.
    #[serde(deserialize_with = "ScaleStep::scale_out_override")]
    pub scale_out: ScaleStep,
    #[serde(deserialize_with = "ScaleStep::scale_in_override")]
    pub scale_in: ScaleStep,
    /// `None` makes the profile apply at all times.
    pub recurrence: Option<RecurrenceConfig>,
}

impl Default for AutoscalePolicyConfig {
    fn default() -> Self {
        Self {
            profile_name: "sampleProfile".into(),
            enabled: true,
            capacity: CapacityConfig::default(),
            metric_name: "PercentageCPU".into(),
            metric_namespace: String::new(),
            statistic: MetricStatistic::Average,
            time_aggregation: TimeAggregation::Average,
            time_grain: Duration::from_secs(5 * 60),
            time_window: Duration::from_secs(30 * 60),
            scale_out: ScaleStep::scale_out(),
            scale_in: ScaleStep::scale_in(),
            recurrence: Some(RecurrenceConfig::default()),
        }
    }
}

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

impl AutoscalePolicyConfig {
    pub fn validate(&self) -> ManagementResult<()> {
        let invalid = |msg: String| Err(ManagementError::Validation(msg));
        let c = &self.capacity;
        if !(c.minimum <= c.default && c.default <= c.maximum) {
            return invalid(format!(
                "capacity must satisfy minimum <= default <= maximum (got {}/{}/{})",
                c.minimum, c.default, c.maximum
            ));
        }
        if c.maximum == 0 {
            return invalid("maximum capacity must be at least 1".into());
        }
        if self.profile_name.trim().is_empty() || self.metric_name.trim().is_empty() {
            return invalid("profile and metric names must not be empty".into());
        }
        if self.time_grain.is_zero() || self.time_window < self.time_grain {
            return invalid(format!(
                "time window ({}) must be at least one non-zero time grain ({})",
                crate::iso8601::format(self.time_window),
                crate::iso8601::format(self.time_grain)
            ));
        }
        if !(self.scale_in.threshold < self.scale_out.threshold) {
            return invalid(format!(
                "scale-in threshold {} must be below scale-out threshold {}",
                self.scale_in.threshold, self.scale_out.threshold
            ));
        }
        if self.scale_in.change == 0 || self.scale_out.change == 0 {
            return invalid("scale steps must change the instance count".into());
        }
        if let Some(r) = &self.recurrence {
            if r.days.is_empty() || r.hours.is_empty() || r.minutes.is_empty() {
                return invalid("recurrence needs at least one day, hour and minute".into());
            }
            if let Some(day) = r.days.iter().find(|d| !WEEKDAYS.contains(&d.as_str())) {
                return invalid(format!("unknown weekday '{}'", day));
            }
            if let Some(h) = r.hours.iter().find(|h| **h > 23) {
                return invalid(format!("hour {} out of range", h));
            }
            if let Some(m) = r.minutes.iter().find(|m| **m > 59) {
                return invalid(format!("minute {} out of range", m));
            }
            if r.time_zone.trim().is_empty() {
                return invalid("recurrence time zone must not be empty".into());
            }
        }
        Ok(())
    }
}

// ─── Synthesis ──────────────────────────────────────────────────────

/// Build the setting for `target`. Both rules sample `target.metric_source()`.
pub fn synthesize(target: &RoleTarget, config: &AutoscalePolicyConfig) -> AutoscaleSetting {
    let trigger = |operator, threshold| MetricTrigger {
        metric_name: config.metric_name.clone(),
        metric_namespace: config.metric_namespace.clone(),
        metric_source: target.metric_source(),
        time_grain: config.time_grain,
        statistic: config.statistic,
        time_window: config.time_window,
        time_aggregation: config.time_aggregation,
        operator,
        threshold,
    };
    let action = |direction, step: &ScaleStep| ScaleAction {
        direction,
        scale_type: ScaleType::ChangeCount,
        value: step.change.to_string(),
        cooldown: step.cooldown,
    };

    let rules = vec![
        ScaleRule {
            metric_trigger: trigger(ComparisonOperator::GreaterThanOrEqual, config.scale_out.threshold),
            scale_action: action(ScaleDirection::Increase, &config.scale_out),
        },
        ScaleRule {
            metric_trigger: trigger(ComparisonOperator::LessThanOrEqual, config.scale_in.threshold),
            scale_action: action(ScaleDirection::Decrease, &config.scale_in),
        },
    ];

    let recurrence = config.recurrence.as_ref().map(|r| Recurrence {
        frequency: r.frequency,
        schedule: RecurrentSchedule {
            time_zone: r.time_zone.clone(),
            days: r.days.clone(),
            hours: r.hours.clone(),
            minutes: r.minutes.clone(),
        },
    });

    AutoscaleSetting {
        profiles: vec![AutoscaleProfile {
            name: config.profile_name.clone(),
            capacity: ScaleCapacity {
                minimum: config.capacity.minimum.to_string(),
                maximum: config.capacity.maximum.to_string(),
                default: config.capacity.default.to_string(),
            },
            rules,
            recurrence,
        }],
        enabled: config.enabled,
    }
}

// ─── Verification ───────────────────────────────────────────────────

/// One field where the stored policy differs from the submitted one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDrift {
    /// Dotted location, e.g. `profiles[0].rules[1].scale_action.cooldown`.
    pub field: String,
    pub submitted: String,
    pub stored: String,
}

struct DriftCollector(Vec<PolicyDrift>);

impl DriftCollector {
    fn check<V: PartialEq + std::fmt::Debug>(&mut self, field: impl Into<String>, submitted: &V, stored: &V) {
        if submitted != stored {
            self.0.push(PolicyDrift {
                field: field.into(),
                submitted: format!("{:?}", submitted),
                stored: format!("{:?}", stored),
            });
        }
    }
}

/// Field-by-field comparison of what was sent against what was stored.
pub fn diff(submitted: &AutoscaleSetting, stored: &AutoscaleSetting) -> Vec<PolicyDrift> {
    let mut d = DriftCollector(Vec::new());
    d.check("enabled", &submitted.enabled, &stored.enabled);
    d.check("profiles.len", &submitted.profiles.len(), &stored.profiles.len());

    for (i, (sp, fp)) in submitted.profiles.iter().zip(&stored.profiles).enumerate() {
        let p = format!("profiles[{}]", i);
        d.check(format!("{p}.name"), &sp.name, &fp.name);
        d.check(format!("{p}.capacity"), &sp.capacity, &fp.capacity);
        d.check(format!("{p}.recurrence"), &sp.recurrence, &fp.recurrence);
        d.check(format!("{p}.rules.len"), &sp.rules.len(), &fp.rules.len());

        for (j, (sr, fr)) in sp.rules.iter().zip(&fp.rules).enumerate() {
            let r = format!("{p}.rules[{j}]");
            let (st, ft) = (&sr.metric_trigger, &fr.metric_trigger);
            d.check(format!("{r}.metric_trigger.metric_name"), &st.metric_name, &ft.metric_name);
            d.check(format!("{r}.metric_trigger.metric_namespace"), &st.metric_namespace, &ft.metric_namespace);
            d.check(format!("{r}.metric_trigger.metric_source"), &st.metric_source, &ft.metric_source);
            d.check(format!("{r}.metric_trigger.operator"), &st.operator, &ft.operator);
            d.check(format!("{r}.metric_trigger.threshold"), &st.threshold, &ft.threshold);
            d.check(format!("{r}.metric_trigger.statistic"), &st.statistic, &ft.statistic);
            d.check(format!("{r}.metric_trigger.time_grain"), &st.time_grain, &ft.time_grain);
            d.check(format!("{r}.metric_trigger.time_aggregation"), &st.time_aggregation, &ft.time_aggregation);
            d.check(format!("{r}.metric_trigger.time_window"), &st.time_window, &ft.time_window);
            d.check(format!("{r}.scale_action"), &sr.scale_action, &fr.scale_action);
        }
    }
    d.0
}

// ─── Policy lifecycle ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Built;

#[derive(Debug, Clone)]
pub struct Submitted {
    status_code: String,
}

#[derive(Debug, Clone)]
pub struct Verified {
    status_code: String,
    stored: AutoscaleSetting,
    drift: Vec<PolicyDrift>,
}

#[derive(Debug, Clone)]
pub struct AutoscalePolicy<S> {
    target: RoleTarget,
    setting: AutoscaleSetting,
    state: S,
}

impl<S> AutoscalePolicy<S> {
    pub fn target(&self) -> &RoleTarget {
        &self.target
    }

    pub fn resource_id(&self) -> String {
        self.target.resource_id()
    }

    pub fn setting(&self) -> &AutoscaleSetting {
        &self.setting
    }
}

fn settings_path(resource_id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(resource_id.as_bytes()).collect();
    format!("/services/monitoring/autoscalesettings?resourceId={}", encoded)
}

impl AutoscalePolicy<Built> {
    pub fn build(target: RoleTarget, config: &AutoscalePolicyConfig) -> ManagementResult<Self> {
        config.validate()?;
        let setting = synthesize(&target, config);
        Ok(Self { target, setting, state: Built })
    }

    /// Create-or-update the setting. The status text is kept as received.
    pub async fn submit<T: ManagementTransport>(
        self,
        client: &ManagementClient<T>,
    ) -> ManagementResult<AutoscalePolicy<Submitted>> {
        let path = settings_path(&self.resource_id());
        let body = serde_json::to_string(&self.setting)
            .map_err(|e| ManagementError::Protocol(format!("JSON encode: {e}")))?;
        debug!("submit autoscale setting for {} → {}", self.resource_id(), client.url(&path));

        let resp = client
            .execute_checked(
                ManagementRequest::put_json(&path, &client.config().autoscale_api_version, body),
                ManagementError::Provider,
            )
            .await?;
        let status_code = resp.status_text();
        info!("Autoscale setting for {} submitted ({})", self.resource_id(), status_code);

        Ok(AutoscalePolicy {
            target: self.target,
            setting: self.setting,
            state: Submitted { status_code },
        })
    }
}

impl AutoscalePolicy<Submitted> {
    pub fn status_code(&self) -> &str {
        &self.state.status_code
    }

    /// Read the setting back under the same resource id and compare.
    pub async fn verify<T: ManagementTransport>(
        self,
        client: &ManagementClient<T>,
    ) -> ManagementResult<AutoscalePolicy<Verified>> {
        let stored = fetch_setting(client, &self.target).await?;
        let drift = diff(&self.setting, &stored);
        if drift.is_empty() {
            debug!("autoscale setting for {} verified", self.resource_id());
        } else {
            for d in &drift {
                warn!(
                    "autoscale setting for {} drifted at {}: sent {}, stored {}",
                    self.resource_id(),
                    d.field,
                    d.submitted,
                    d.stored
                );
            }
        }

        Ok(AutoscalePolicy {
            target: self.target,
            setting: self.setting,
            state: Verified {
                status_code: self.state.status_code,
                stored,
                drift,
            },
        })
    }
}

impl AutoscalePolicy<Verified> {
    pub fn status_code(&self) -> &str {
        &self.state.status_code
    }

    pub fn stored(&self) -> &AutoscaleSetting {
        &self.state.stored
    }

    pub fn drift(&self) -> &[PolicyDrift] {
        &self.state.drift
    }

    pub fn into_outcome(self) -> AutoscaleOutcome {
        AutoscaleOutcome {
            resource_id: self.target.resource_id(),
            status_code: self.state.status_code,
            drift: self.state.drift,
        }
    }
}

/// What `autoscale_cloud_service` reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscaleOutcome {
    pub resource_id: String,
    /// Provider status text of the create-or-update call, uninterpreted.
    pub status_code: String,
    pub drift: Vec<PolicyDrift>,
}

impl AutoscaleOutcome {
    pub fn is_consistent(&self) -> bool {
        self.drift.is_empty()
    }
}

/// Read the stored setting of a role.
pub async fn fetch_setting<T: ManagementTransport>(
    client: &ManagementClient<T>,
    target: &RoleTarget,
) -> ManagementResult<AutoscaleSetting> {
    let path = settings_path(&target.resource_id());
    debug!("fetch autoscale setting → {}", client.url(&path));
    let resp = client
        .execute_checked(
            ManagementRequest::get(&path, &client.config().autoscale_api_version),
            |fault| {
                if fault.status_code == 404 {
                    ManagementError::NotFound(fault)
                } else {
                    ManagementError::Provider(fault)
                }
            },
        )
        .await?;
    serde_json::from_str(&resp.body)
        .map_err(|e| ManagementError::Protocol(format!("autoscale setting JSON: {e}")))
}

/// Build, submit and verify the policy for a production role.
pub async fn autoscale_cloud_service<T: ManagementTransport>(
    client: &ManagementClient<T>,
    service_name: &str,
    role_name: &str,
    config: &AutoscalePolicyConfig,
) -> ManagementResult<AutoscaleOutcome> {
    let policy = AutoscalePolicy::build(RoleTarget::production(service_name, role_name), config)?;
    let verified = policy.submit(client).await?.verify(client).await?;
    Ok(verified.into_outcome())
}

// ─── Tests ──────────────────────────────────────────────────────────
