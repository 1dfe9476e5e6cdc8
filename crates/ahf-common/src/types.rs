use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    #[error("Instance label {0:?} is empty or exceeds 63 bytes")]
    BadLabel(String),
    #[error("Service type {0:?} must look like _name._udp or _name._tcp")]
    BadServiceType(String),
}

/// One discoverable service instance, the unit both the DNS-SD layer and
/// the registry client trade in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    /// Instance label, e.g. `temperature-7`.
    pub name: String,
    /// DNS-SD service type, e.g. `_coap._udp`.
    pub service_type: String,
    /// Domain the instance lives under, e.g. `arrowhead.org.`.
    pub domain: String,
    /// Host providing the service (SRV target).
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub priority: u16,
    #[serde(default)]
    pub weight: u16,
    /// TXT attributes, in publication order.
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
}

impl ServiceInstance {
    /// `<type>.<domain>` — the PTR name enumerating instances of the type.
    pub fn type_domain(&self) -> String {
        format!("{}.{}", self.service_type, absolute(&self.domain))
    }

    /// `<name>.<type>.<domain>` — the instance's own SRV/TXT name.
    pub fn fqdn(&self) -> String {
        format!("{}.{}.{}", self.name, self.service_type, absolute(&self.domain))
    }

    /// Check the pieces fit DNS label limits before they go on the wire.
    pub fn validate(&self) -> Result<(), InstanceError> {
        if self.name.is_empty() || self.name.len() > 63 {
            return Err(InstanceError::BadLabel(self.name.clone()));
        }
        let mut parts = self.service_type.split('.');
        let well_formed = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(proto), None) => {
                name.starts_with('_') && (proto == "_udp" || proto == "_tcp")
            }
            _ => false,
        };
        if !well_formed {
            return Err(InstanceError::BadServiceType(self.service_type.clone()));
        }
        Ok(())
    }
}

/// Append the trailing dot when the caller left the name relative.
pub fn absolute(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}
