use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use ahf_dnssd::{ServiceBrowser, ServicePublisher};

use crate::types::ServiceRecord;

/// Registry operations composed from DNS-SD: publish a record, look up a
/// service type, withdraw a record.
pub struct RegistryClient {
    browser: ServiceBrowser,
    publisher: ServicePublisher,
    domain: String,
}

impl RegistryClient {
    pub fn new(browser: ServiceBrowser, publisher: ServicePublisher, domain: &str) -> Self {
        Self { browser, publisher, domain: domain.to_string() }
    }

    pub async fn publish(&self, record: &ServiceRecord) -> Result<()> {
        let instance = record.to_instance(&self.domain);
        self.publisher.register(&instance).await
    }

    pub async fn remove(&self, record: &ServiceRecord) -> Result<()> {
        let instance = record.to_instance(&self.domain);
        self.publisher.unregister(&instance).await
    }

    /// Everything currently registered under `service_type`.
    pub async fn lookup(&self, service_type: &str) -> Result<Vec<ServiceRecord>> {
        let instances = self.browser.browse(service_type).await?;
        debug!(service_type, count = instances.len(), "Registry lookup");
        let seen = Utc::now();
        Ok(instances
            .iter()
            .map(|instance| ServiceRecord::from_instance(instance, seen))
            .collect())
    }
}
