/// Reasons a Vizier may report through its status. The cloud connector's
/// statusz endpoint returns one of these as its diagnostic body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VizierReason {
    CloudConnectorFailedToConnect,
    CloudConnectorInvalidDeployKey,
    CloudConnectorBasicQueryFailed,
    CloudConnectorPodPending,
    CloudConnectorPodFailed,
    CloudConnectorMissing,
    MetadataPVCMissing,
    MetadataPVCStorageClassUnavailable,
    MetadataPVCPendingBinding,
    ControlPlanePodsPending,
    ControlPlanePodsFailed,
    NATSPodPending,
    NATSPodFailed,
    NATSPodMissing,
    KelvinPodPending,
    KelvinPodFailed,
}

impl VizierReason {
    const ALL: [VizierReason; 16] = [
        Self::CloudConnectorFailedToConnect,
        Self::CloudConnectorInvalidDeployKey,
        Self::CloudConnectorBasicQueryFailed,
        Self::CloudConnectorPodPending,
        Self::CloudConnectorPodFailed,
        Self::CloudConnectorMissing,
        Self::MetadataPVCMissing,
        Self::MetadataPVCStorageClassUnavailable,
        Self::MetadataPVCPendingBinding,
        Self::ControlPlanePodsPending,
        Self::ControlPlanePodsFailed,
        Self::NATSPodPending,
        Self::NATSPodFailed,
        Self::NATSPodMissing,
        Self::KelvinPodPending,
        Self::KelvinPodFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CloudConnectorFailedToConnect => "CloudConnectorFailedToConnect",
            Self::CloudConnectorInvalidDeployKey => "CloudConnectorInvalidDeployKey",
            Self::CloudConnectorBasicQueryFailed => "CloudConnectorBasicQueryFailed",
            Self::CloudConnectorPodPending => "CloudConnectorPodPending",
            Self::CloudConnectorPodFailed => "CloudConnectorPodFailed",
            Self::CloudConnectorMissing => "CloudConnectorMissing",
            Self::MetadataPVCMissing => "MetadataPVCMissing",
            Self::MetadataPVCStorageClassUnavailable => "MetadataPVCStorageClassUnavailable",
            Self::MetadataPVCPendingBinding => "MetadataPVCPendingBinding",
            Self::ControlPlanePodsPending => "ControlPlanePodsPending",
            Self::ControlPlanePodsFailed => "ControlPlanePodsFailed",
            Self::NATSPodPending => "NATSPodPending",
            Self::NATSPodFailed => "NATSPodFailed",
            Self::NATSPodMissing => "NATSPodMissing",
            Self::KelvinPodPending => "KelvinPodPending",
            Self::KelvinPodFailed => "KelvinPodFailed",
        }
    }

    pub fn parse(reason: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == reason)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::CloudConnectorFailedToConnect => {
                "Cloud connector failed to connect to Pixie Cloud. Please check your cloud address."
            }
            Self::CloudConnectorInvalidDeployKey => {
                "Invalid deploy key specified. Please verify that the deploy key is correct."
            }
            Self::CloudConnectorBasicQueryFailed => {
                "Unable to run basic healthcheck query on cluster."
            }
            Self::CloudConnectorPodPending => "Cloud connector pod is pending.",
            Self::CloudConnectorPodFailed => "Cloud connector pod failed to start.",
            Self::CloudConnectorMissing => "Cloud connector pod could not be found.",
            Self::MetadataPVCMissing => {
                "The metadata service's persistent volume claim is missing."
            }
            Self::MetadataPVCStorageClassUnavailable => {
                "The storage class for the metadata persistent volume claim is unavailable."
            }
            Self::MetadataPVCPendingBinding => {
                "The metadata persistent volume claim is waiting to be bound."
            }
            Self::ControlPlanePodsPending => "Vizier control plane pods are still pending.",
            Self::ControlPlanePodsFailed => "Vizier control plane pods are failing.",
            Self::NATSPodPending => "The NATS message bus pod is pending.",
            Self::NATSPodFailed => "The NATS message bus pod has failed.",
            Self::NATSPodMissing => "The NATS message bus pod could not be found.",
            Self::KelvinPodPending => "The Kelvin pod is pending.",
            Self::KelvinPodFailed => "The Kelvin pod has failed.",
        }
    }
}

impl std::fmt::Display for VizierReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human readable message for a status reason. Unknown or empty reasons map
/// to an empty message.
pub fn message_from_reason(reason: &str) -> &'static str {
    VizierReason::parse(reason)
        .map(|r| r.message())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn every_reason_parses_back() {
        for reason in VizierReason::ALL {
            assert_eq!(VizierReason::parse(reason.as_str()), Some(reason));
        }
    }

    #[test]
    fn unknown_reason_has_empty_message() {
        assert_eq!(message_from_reason(""), "");
        assert_eq!(message_from_reason("db unreachable"), "");
    }

    #[test]
    fn known_reason_has_message() {
        assert_eq!(
            message_from_reason("CloudConnectorBasicQueryFailed"),
            "Unable to run basic healthcheck query on cluster."
        );
    }
}
