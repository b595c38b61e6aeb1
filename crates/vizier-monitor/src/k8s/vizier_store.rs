use api_types::Vizier;
use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use kube::api::PostParams;
use kube::Api;
use kube::Client;
use kube::ResourceExt;

use crate::k8s::MonitorError;
use crate::k8s::NamespacedName;

/// Read/update access to `Vizier` resources.
#[async_trait]
pub trait VizierStore: Send + Sync {
    async fn get(&self, name: &NamespacedName) -> Result<Vizier, Report<MonitorError>>;

    /// Writes the status of `vizier`. No conflict retry is attempted.
    async fn update(&self, vizier: &Vizier) -> Result<(), Report<MonitorError>>;
}

/// [`VizierStore`] writing through the `status` subresource.
#[derive(Clone)]
pub struct KubeVizierStore {
    client: Client,
}

impl KubeVizierStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VizierStore for KubeVizierStore {
    async fn get(&self, name: &NamespacedName) -> Result<Vizier, Report<MonitorError>> {
        let api: Api<Vizier> = Api::namespaced(self.client.clone(), &name.namespace);
        api.get(&name.name)
            .await
            .change_context(MonitorError::FetchFailed { name: name.clone() })
    }

    async fn update(&self, vizier: &Vizier) -> Result<(), Report<MonitorError>> {
        let name = NamespacedName::new(vizier.namespace().unwrap_or_default(), vizier.name_any());
        let api: Api<Vizier> = Api::namespaced(self.client.clone(), &name.namespace);

        let data = serde_json::to_vec(vizier)
            .change_context(MonitorError::UpdateFailed { name: name.clone() })?;

        api.replace_status(&name.name, &PostParams::default(), data)
            .await
            .change_context(MonitorError::UpdateFailed { name: name.clone() })
            .attach_printable_lazy(|| {
                format!(
                    "resource version {}",
                    vizier.resource_version().unwrap_or_default()
                )
            })?;

        Ok(())
    }
}
