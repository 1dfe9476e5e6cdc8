//! Publication side: registering and withdrawing instances with signed
//! dynamic updates (RFC 2136 + RFC 2845).

use anyhow::{bail, Result};
use tracing::{debug, info};

use ahf_common::{absolute, ServiceInstance};
use ahf_dns::{
    Message, RData, RecordType, ResolverSocket, ResourceRecord, TsigSigner, UpdateBuilder,
};

pub const DEFAULT_RECORD_TTL: u32 = 120;

pub struct ServicePublisher {
    socket: ResolverSocket,
    domain: String,
    signer: Option<TsigSigner>,
    ttl: u32,
}

impl ServicePublisher {
    pub fn new(socket: ResolverSocket, domain: &str, signer: Option<TsigSigner>) -> Self {
        Self { socket, domain: absolute(domain), signer, ttl: DEFAULT_RECORD_TTL }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Publish an instance: PTR into the type enumeration, SRV and TXT at
    /// the instance name.
    pub async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        instance.validate()?;
        let update = self.registration(instance)?;
        self.issue(update).await?;
        info!(instance = %instance.fqdn(), "Registered service instance");
        Ok(())
    }

    /// Withdraw an instance: drop its SRV/TXT RRsets and the PTR row that
    /// points at it.
    pub async fn unregister(&self, instance: &ServiceInstance) -> Result<()> {
        instance.validate()?;
        let update = self.removal(instance)?;
        self.issue(update).await?;
        info!(instance = %instance.fqdn(), "Unregistered service instance");
        Ok(())
    }

    fn registration(&self, instance: &ServiceInstance) -> Result<Message> {
        let fqdn = instance.fqdn();
        let mut builder = UpdateBuilder::new()
            .zone(&self.domain)
            .add(ResourceRecord::ptr(&instance.type_domain(), &fqdn, self.ttl))
            .add(ResourceRecord::srv(
                &fqdn,
                instance.priority,
                instance.weight,
                instance.port,
                &instance.host,
                self.ttl,
            ))
            .add(ResourceRecord::txt(
                &fqdn,
                crate::txt::encode(&instance.attributes),
                self.ttl,
            ));
        if let Some(signer) = &self.signer {
            builder = builder.sign(signer.clone());
        }
        Ok(builder.build()?)
    }

    fn removal(&self, instance: &ServiceInstance) -> Result<Message> {
        let fqdn = instance.fqdn();
        let mut builder = UpdateBuilder::new()
            .zone(&self.domain)
            .delete(&fqdn, RecordType::SRV)
            .delete(&fqdn, RecordType::TXT)
            .delete_record(&instance.type_domain(), RecordType::PTR, RData::PTR(fqdn));
        if let Some(signer) = &self.signer {
            builder = builder.sign(signer.clone());
        }
        Ok(builder.build()?)
    }

    async fn issue(&self, update: Message) -> Result<()> {
        let response = self.socket.send(update).await?;
        if response.flags.rcode != 0 {
            bail!("Update refused with rcode {}", response.flags.rcode);
        }
        debug!(id = response.id, "Update accepted");
        Ok(())
    }
}
