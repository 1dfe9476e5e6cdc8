//! Browse side: enumerate instances of a service type and resolve each to
//! host, port and attributes.

use anyhow::Result;
use futures_util::future::join_all;
use rand::Rng;
use tracing::debug;

use ahf_common::{absolute, ServiceInstance};
use ahf_dns::{Message, RData, RecordType, ResolverSocket};

pub struct ServiceBrowser {
    socket: ResolverSocket,
    domain: String,
}

impl ServiceBrowser {
    pub fn new(socket: ResolverSocket, domain: &str) -> Self {
        Self { socket, domain: absolute(domain) }
    }

    /// Enumerate instances of `service_type` (e.g. `_coap._udp`): one PTR
    /// query for the type, then SRV + TXT per instance, fanned out.
    pub async fn browse(&self, service_type: &str) -> Result<Vec<ServiceInstance>> {
        let type_domain = format!("{}.{}", service_type, self.domain);
        let instance_names = self.socket.resolve_ptr(&type_domain).await?;
        debug!(%type_domain, count = instance_names.len(), "Browsed service type");

        let resolved = join_all(
            instance_names
                .iter()
                .map(|name| self.resolve_instance(service_type, name)),
        )
        .await;

        Ok(resolved.into_iter().flatten().collect())
    }

    /// Resolve one instance name from a PTR answer into a full instance:
    /// the SRV and TXT queries travel together through `send_all`.
    /// Instances that fail to resolve are skipped, not fatal to the browse.
    async fn resolve_instance(&self, service_type: &str, fqdn: &str) -> Option<ServiceInstance> {
        let srv_id: u16 = rand::rng().random();
        let queries = vec![
            Message::query(srv_id, fqdn, RecordType::SRV),
            Message::query(srv_id.wrapping_add(1), fqdn, RecordType::TXT),
        ];
        let mut settled = self.socket.send_all(queries).await.into_iter();
        let srv_response = settled.next()?.ok()?;
        let txt_response = settled.next()?;

        let srv = srv_response.answer.iter().find_map(|rr| match &rr.rdata {
            Some(RData::SRV { priority, weight, port, target }) => {
                Some((*priority, *weight, *port, target.clone()))
            }
            _ => None,
        });
        let Some((priority, weight, port, target)) = srv else {
            debug!(%fqdn, "Instance has no SRV record");
            return None;
        };

        // A failed TXT lookup just means no attributes.
        let strings: Vec<String> = txt_response
            .map(|response| {
                response
                    .answer
                    .iter()
                    .filter_map(|rr| match &rr.rdata {
                        Some(RData::TXT(strings)) => Some(strings.clone()),
                        _ => None,
                    })
                    .flatten()
                    .collect()
            })
            .unwrap_or_default();

        Some(ServiceInstance {
            name: first_label(fqdn),
            service_type: service_type.to_string(),
            domain: self.domain.clone(),
            host: target,
            port,
            priority,
            weight,
            attributes: crate::txt::decode(&strings),
        })
    }
}

/// First label of a name, honouring `\.` escapes.
fn first_label(name: &str) -> String {
    let mut label = String::new();
    let mut chars = name.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    label.push(escaped);
                }
            }
            '.' => break,
            other => label.push(other),
        }
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_label() {
        assert_eq!(first_label("temp-1._coap._udp.arrowhead.org."), "temp-1");
        assert_eq!(first_label("a\\.b._http._tcp.org."), "a.b");
        assert_eq!(first_label(""), "");
    }
}
