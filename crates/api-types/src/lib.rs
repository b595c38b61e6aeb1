//! Shared API type definitions
//!
//! This crate contains the `Vizier` custom resource (`px.dev/v1alpha1`) whose
//! status is written by the vizier monitor, together with the phase enum and
//! the reason to message table used when rendering that status.

mod reason;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

pub use reason::message_from_reason;
pub use reason::VizierReason;

/// Aggregate health phase of a Vizier instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum VizierPhase {
    #[default]
    Unknown,
    /// The cloud connector has no pod at all.
    Disconnected,
    /// The cloud connector pod is still pending.
    Updating,
    Unhealthy,
    Healthy,
}

impl std::fmt::Display for VizierPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Desired state of a Vizier. The monitor only reads the status subresource,
/// the desired state is carried so the object round-trips without loss.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "px.dev",
    version = "v1alpha1",
    kind = "Vizier",
    namespaced,
    status = "VizierStatus",
    shortname = "vz",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.vizierPhase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VizierSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem_memory_limit: Option<String>,
    #[serde(default)]
    pub use_etcd_operator: bool,
}

/// Observed state of a Vizier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VizierStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_version: Option<String>,
    #[serde(default)]
    pub vizier_phase: VizierPhase,
    /// Machine readable cause of the current phase, empty when healthy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vizier_reason: String,
    /// Human readable rendering of `vizier_reason`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Vizier {
    /// Sets phase, reason and the message derived from the reason.
    pub fn set_health(&mut self, phase: VizierPhase, reason: &str) {
        let status = self.status.get_or_insert_with(VizierStatus::default);
        status.vizier_phase = phase;
        status.vizier_reason = reason.to_string();
        status.message = message_from_reason(reason).to_string();
    }
}
