//! DNS messages: header, flags, the four record sections, and the TSIG
//! signing hook for UPDATE.

use crate::buffer::{Reader, Writer};
use crate::error::WireError;
use crate::rdata::RecordType;
use crate::record::ResourceRecord;
use crate::tsig::TsigSigner;

pub const OPCODE_QUERY: u8 = 0;
pub const OPCODE_UPDATE: u8 = 5;

pub const RCODE_NOERROR: u8 = 0;
pub const RCODE_FORMERR: u8 = 1;
pub const RCODE_SERVFAIL: u8 = 2;
pub const RCODE_NXDOMAIN: u8 = 3;
pub const RCODE_NOTIMP: u8 = 4;
pub const RCODE_REFUSED: u8 = 5;

/// Header flag word, packed as `[qr:1][opcode:4][aa:1][tc:1][rd:1][ra:1][z:3][rcode:4]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
}

impl Flags {
    pub fn from_u16(v: u16) -> Self {
        Self {
            qr: v & 0x8000 != 0,
            opcode: ((v >> 11) & 0xF) as u8,
            aa: v & 0x0400 != 0,
            tc: v & 0x0200 != 0,
            rd: v & 0x0100 != 0,
            ra: v & 0x0080 != 0,
            z: ((v >> 4) & 0x7) as u8,
            rcode: (v & 0xF) as u8,
        }
    }

    pub fn to_u16(self) -> u16 {
        (u16::from(self.qr) << 15)
            | (u16::from(self.opcode & 0xF) << 11)
            | (u16::from(self.aa) << 10)
            | (u16::from(self.tc) << 9)
            | (u16::from(self.rd) << 8)
            | (u16::from(self.ra) << 7)
            | (u16::from(self.z & 0x7) << 4)
            | u16::from(self.rcode & 0xF)
    }
}

/// A whole DNS message. Section counts are derived from the vectors on
/// write. An attached signer appends a TSIG RR to UPDATE messages during
/// encoding; it takes no part in equality.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub id: u16,
    pub flags: Flags,
    pub question: Vec<ResourceRecord>,
    pub answer: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
    pub signer: Option<TsigSigner>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.flags == other.flags
            && self.question == other.question
            && self.answer == other.answer
            && self.authority == other.authority
            && self.additional == other.additional
    }
}

impl Eq for Message {}

impl Message {
    /// A recursion-desired query with a single question.
    pub fn query(id: u16, name: &str, rtype: RecordType) -> Self {
        Self {
            id,
            flags: Flags { rd: true, ..Flags::default() },
            question: vec![ResourceRecord::question(name, rtype)],
            ..Self::default()
        }
    }

    pub fn read(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        let id = reader.read_u16();
        let flags = Flags::from_u16(reader.read_u16());
        let qdcount = reader.read_u16();
        let ancount = reader.read_u16();
        let nscount = reader.read_u16();
        let arcount = reader.read_u16();

        let mut read_section = |count: u16, is_question: bool| {
            let mut records = Vec::with_capacity(count as usize);
            for _ in 0..count {
                records.push(ResourceRecord::read(&mut reader, is_question)?);
            }
            Ok::<_, WireError>(records)
        };

        let question = read_section(qdcount, true)?;
        let answer = read_section(ancount, false)?;
        let authority = read_section(nscount, false)?;
        let additional = read_section(arcount, false)?;

        Ok(Self { id, flags, question, answer, authority, additional, signer: None })
    }

    /// Encode the message. With a signer attached and opcode UPDATE, a TSIG
    /// RR computed over the prior bytes is appended and ARCOUNT is bumped
    /// in place (RFC 2845 §3.4.1).
    pub fn write(&self, writer: &mut Writer<'_>) -> Result<(), WireError> {
        writer.write_u16(self.id);
        writer.write_u16(self.flags.to_u16());
        writer.write_u16(self.question.len() as u16);
        writer.write_u16(self.answer.len() as u16);
        writer.write_u16(self.authority.len() as u16);
        writer.write_u16(self.additional.len() as u16);

        for rr in &self.question {
            rr.write(writer, true)?;
        }
        for rr in self.answer.iter().chain(&self.authority).chain(&self.additional) {
            rr.write(writer, false)?;
        }

        if let Some(signer) = &self.signer {
            if self.flags.opcode == OPCODE_UPDATE && !writer.overflowed() {
                let tsig = signer.sign(self.id, writer.buffer());
                tsig.write(writer, false)?;
                writer.patch_u16(10, (self.additional.len() + 1) as u16);
            }
        }
        Ok(())
    }
}
