use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ahf_common::ServiceInstance;

/// One registry entry: a service a system offers at an endpoint, with
/// free-form metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    /// What the service does, e.g. `temperature`.
    pub service_definition: String,
    /// The system offering it, e.g. `sensor-gw-1`; becomes the instance
    /// label.
    pub system_name: String,
    /// DNS-SD service type, e.g. `_coap._udp`.
    pub service_type: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub metadata: Vec<(String, String)>,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
}

fn default_ttl() -> u32 {
    120
}

/// Metadata key carrying the service definition through TXT.
const DEFINITION_KEY: &str = "ahsd";

impl ServiceRecord {
    /// Project the record onto the DNS-SD instance it publishes as.
    pub fn to_instance(&self, domain: &str) -> ServiceInstance {
        let mut attributes =
            vec![(DEFINITION_KEY.to_string(), self.service_definition.clone())];
        attributes.extend(self.metadata.iter().cloned());
        ServiceInstance {
            name: self.system_name.clone(),
            service_type: self.service_type.clone(),
            domain: domain.to_string(),
            host: self.host.clone(),
            port: self.port,
            priority: 0,
            weight: 0,
            attributes,
        }
    }

    /// Rebuild a record from a browsed instance.
    pub fn from_instance(instance: &ServiceInstance, seen_at: DateTime<Utc>) -> Self {
        let mut service_definition = String::new();
        let mut metadata = Vec::new();
        for (key, value) in &instance.attributes {
            if key == DEFINITION_KEY {
                service_definition = value.clone();
            } else {
                metadata.push((key.clone(), value.clone()));
            }
        }
        Self {
            service_definition,
            system_name: instance.name.clone(),
            service_type: instance.service_type.clone(),
            host: instance.host.clone(),
            port: instance.port,
            metadata,
            ttl: default_ttl(),
            registered_at: Some(seen_at),
        }
    }
}
