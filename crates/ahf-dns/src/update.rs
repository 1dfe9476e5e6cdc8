//! RFC 2136 dynamic-update builder.
//!
//! UPDATE reuses the message sections: the zone rides in the question slot,
//! prerequisites in answer, update rows in authority.

use rand::Rng;

use crate::error::DnsError;
use crate::message::{Flags, Message, OPCODE_UPDATE};
use crate::rdata::{RData, RecordClass, RecordType};
use crate::record::ResourceRecord;
use crate::tsig::TsigSigner;

#[derive(Debug, Default)]
pub struct UpdateBuilder {
    id: Option<u16>,
    zone: Option<String>,
    prerequisites: Vec<ResourceRecord>,
    updates: Vec<ResourceRecord>,
    signer: Option<TsigSigner>,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: u16) -> Self {
        self.id = Some(id);
        self
    }

    /// Name the zone being updated; becomes the single SOA question.
    pub fn zone(mut self, name: &str) -> Self {
        self.zone = Some(name.to_string());
        self
    }

    /// Prerequisite: `name` must own at least one RR (RFC 2136 §2.4.4,
    /// class ANY, empty RDATA).
    pub fn present(mut self, name: &str) -> Self {
        self.prerequisites.push(ResourceRecord {
            name: name.to_string(),
            rtype: RecordType::ANY,
            class: RecordClass::Any,
            ttl: 0,
            rdata: None,
        });
        self
    }

    /// Prerequisite: `name` must not exist (class NONE, empty RDATA).
    pub fn absent(mut self, name: &str) -> Self {
        self.prerequisites.push(ResourceRecord {
            name: name.to_string(),
            rtype: RecordType::ANY,
            class: RecordClass::None,
            ttl: 0,
            rdata: None,
        });
        self
    }

    /// Append a raw update row. Class IN adds, class NONE removes a
    /// specific RR, class ANY deletes an RRset or name.
    pub fn update(mut self, rr: ResourceRecord) -> Self {
        self.updates.push(rr);
        self
    }

    /// Add a record (class IN as constructed).
    pub fn add(self, rr: ResourceRecord) -> Self {
        self.update(rr)
    }

    /// Delete the whole RRset of `rtype` at `name`; `ANY` deletes the name.
    pub fn delete(self, name: &str, rtype: RecordType) -> Self {
        self.update(ResourceRecord {
            name: name.to_string(),
            rtype,
            class: RecordClass::Any,
            ttl: 0,
            rdata: None,
        })
    }

    /// Delete one specific record, matched by RDATA (class NONE).
    pub fn delete_record(self, name: &str, rtype: RecordType, rdata: RData) -> Self {
        self.update(ResourceRecord {
            name: name.to_string(),
            rtype,
            class: RecordClass::None,
            ttl: 0,
            rdata: Some(rdata),
        })
    }

    pub fn sign(mut self, signer: TsigSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<Message, DnsError> {
        let zone = self.zone.ok_or(DnsError::UpdateWithoutZone)?;
        let id = self.id.unwrap_or_else(|| rand::rng().random());
        Ok(Message {
            id,
            flags: Flags { opcode: OPCODE_UPDATE, ..Flags::default() },
            question: vec![ResourceRecord::question(&zone, RecordType::SOA)],
            answer: self.prerequisites,
            authority: self.updates,
            additional: Vec::new(),
            signer: self.signer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Writer;
    use crate::message::Message;

    #[test]
    fn test_zone_required() {
        let err = UpdateBuilder::new().update(ResourceRecord::a(
            "a.arrowhead.org.",
            std::net::Ipv4Addr::LOCALHOST,
            60,
        ))
        .build()
        .unwrap_err();
        assert_eq!(err, DnsError::UpdateWithoutZone);
    }

    #[test]
    fn test_sections_land_where_rfc2136_says() {
        let msg = UpdateBuilder::new()
            .with_id(9)
            .zone("arrowhead.org.")
            .present("svc.arrowhead.org.")
            .absent("stale.arrowhead.org.")
            .add(ResourceRecord::ptr("t._tcp.arrowhead.org.", "svc.arrowhead.org.", 120))
            .delete("old.arrowhead.org.", RecordType::ANY)
            .build()
            .unwrap();

        assert_eq!(msg.flags.opcode, OPCODE_UPDATE);
        assert_eq!(msg.question.len(), 1);
        assert_eq!(msg.question[0].rtype, RecordType::SOA);
        assert_eq!(msg.answer.len(), 2);
        assert_eq!(msg.answer[0].class, RecordClass::Any);
        assert_eq!(msg.answer[1].class, RecordClass::None);
        assert_eq!(msg.authority.len(), 2);
        assert_eq!(msg.authority[0].class, RecordClass::IN);
        assert_eq!(msg.authority[1].class, RecordClass::Any);
        assert_eq!(msg.authority[1].rdata, None);
    }

    #[test]
    fn test_signed_update_matches_reference_mac() {
        let signer = TsigSigner::new("key.arrowhead.org.", "VQEOSuLEGcsnJqjOJKnjbA==")
            .unwrap()
            .pin_time(1_506_594_227);
        let msg = UpdateBuilder::new()
            .with_id(37352)
            .zone("beta.arrowhead.org.")
            .sign(signer.clone())
            .build()
            .unwrap();

        let mut buf = [0u8; 512];
        let mut w = Writer::new(&mut buf);
        msg.write(&mut w).unwrap();
        let wire = w.buffer();

        // ARCOUNT on the wire counts the appended TSIG RR.
        assert_eq!(u16::from_be_bytes([wire[10], wire[11]]), 1);

        let decoded = Message::read(wire).unwrap();
        assert_eq!(decoded.additional.len(), 1);
        let tsig = &decoded.additional[0];
        assert_eq!(tsig.rtype, RecordType::TSIG);
        assert_eq!(tsig.name, "key.arrowhead.org.");
        let Some(RData::TSIG { mac, time_signed, original_id, .. }) = &tsig.rdata else {
            panic!("expected TSIG rdata");
        };
        assert_eq!(*time_signed, 1_506_594_227);
        assert_eq!(*original_id, 37352);
        assert_eq!(hex::encode(mac), "52fb20edcfbc965d2b041c134ef32f6b");

        // The signature covers the image before the TSIG RR was appended,
        // with the unadjusted ARCOUNT.
        let tsig_start = wire.len()
            - {
                let mut m = [0u8; 128];
                let mut tw = Writer::new(&mut m);
                tsig.write(&mut tw, false).unwrap();
                tw.offset()
            };
        let mut unsigned = wire[..tsig_start].to_vec();
        unsigned[11] = 0;
        assert!(signer.verify_at(&unsigned, tsig, 1_506_594_227).is_ok());
    }
}
