//! Resource records: name + type + class + TTL + typed RDATA.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::buffer::{Reader, Writer};
use crate::error::WireError;
use crate::rdata::{RData, RecordClass, RecordType};

/// One resource record. In the question section TTL and RDATA are absent;
/// `rdata: None` with a zero RDLENGTH also expresses the RFC 2136 deletion
/// rows (class `ANY`/`NONE`, empty RDATA).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rtype: RecordType,
    pub class: RecordClass,
    pub ttl: u32,
    pub rdata: Option<RData>,
}

impl ResourceRecord {
    pub fn question(name: &str, rtype: RecordType) -> Self {
        Self {
            name: name.to_string(),
            rtype,
            class: RecordClass::IN,
            ttl: 0,
            rdata: None,
        }
    }

    pub fn a(name: &str, ip: Ipv4Addr, ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            rtype: RecordType::A,
            class: RecordClass::IN,
            ttl,
            rdata: Some(RData::A(ip)),
        }
    }

    pub fn aaaa(name: &str, ip: Ipv6Addr, ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            rtype: RecordType::AAAA,
            class: RecordClass::IN,
            ttl,
            rdata: Some(RData::AAAA(ip)),
        }
    }

    pub fn ptr(name: &str, target: &str, ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            rtype: RecordType::PTR,
            class: RecordClass::IN,
            ttl,
            rdata: Some(RData::PTR(target.to_string())),
        }
    }

    pub fn srv(name: &str, priority: u16, weight: u16, port: u16, target: &str, ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            rtype: RecordType::SRV,
            class: RecordClass::IN,
            ttl,
            rdata: Some(RData::SRV {
                priority,
                weight,
                port,
                target: target.to_string(),
            }),
        }
    }

    pub fn txt(name: &str, strings: Vec<String>, ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            rtype: RecordType::TXT,
            class: RecordClass::IN,
            ttl,
            rdata: Some(RData::TXT(strings)),
        }
    }

    pub fn read(reader: &mut Reader<'_>, is_question: bool) -> Result<Self, WireError> {
        let name = reader.read_name()?;
        let rtype = RecordType::from_u16(reader.read_u16());
        let class = RecordClass::from_u16(reader.read_u16());
        if is_question {
            return Ok(Self { name, rtype, class, ttl: 0, rdata: None });
        }
        let ttl = reader.read_u32();
        let rdlength = reader.read_u16() as usize;
        let mut sub = reader.sub(rdlength);
        let rdata = if rdlength == 0 {
            None
        } else {
            Some(RData::read(rtype, &mut sub)?)
        };
        Ok(Self { name, rtype, class, ttl, rdata })
    }

    /// Write the record; RDLENGTH is back-filled from the writer offset
    /// delta so it always matches the encoder's exact output.
    pub fn write(&self, writer: &mut Writer<'_>, is_question: bool) -> Result<(), WireError> {
        writer.write_name(&self.name)?;
        writer.write_u16(self.rtype.to_u16());
        writer.write_u16(self.class.to_u16());
        if is_question {
            return Ok(());
        }
        writer.write_u32(self.ttl);
        let rdlength_at = writer.offset();
        writer.write_u16(0);
        if let Some(rdata) = &self.rdata {
            rdata.write(writer)?;
        }
        let rdlength = writer.offset() - rdlength_at - 2;
        writer.patch_u16(rdlength_at, rdlength as u16);
        Ok(())
    }
}
