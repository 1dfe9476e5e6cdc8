//! Typed RDATA codecs, dispatched by numeric record type.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::buffer::{Reader, Writer};
use crate::error::WireError;

/// Record types the codec understands. Anything else is carried as an
/// opaque blob under [`RData::Raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    DNAME,
    OPT,
    TSIG,
    ANY,
    Unknown(u16),
}

impl RecordType {
    pub fn from_u16(val: u16) -> Self {
        match val {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            12 => Self::PTR,
            15 => Self::MX,
            16 => Self::TXT,
            28 => Self::AAAA,
            33 => Self::SRV,
            39 => Self::DNAME,
            41 => Self::OPT,
            250 => Self::TSIG,
            255 => Self::ANY,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::NS => 2,
            Self::CNAME => 5,
            Self::SOA => 6,
            Self::PTR => 12,
            Self::MX => 15,
            Self::TXT => 16,
            Self::AAAA => 28,
            Self::SRV => 33,
            Self::DNAME => 39,
            Self::OPT => 41,
            Self::TSIG => 250,
            Self::ANY => 255,
            Self::Unknown(v) => v,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::NS => write!(f, "NS"),
            Self::CNAME => write!(f, "CNAME"),
            Self::SOA => write!(f, "SOA"),
            Self::PTR => write!(f, "PTR"),
            Self::MX => write!(f, "MX"),
            Self::TXT => write!(f, "TXT"),
            Self::AAAA => write!(f, "AAAA"),
            Self::SRV => write!(f, "SRV"),
            Self::DNAME => write!(f, "DNAME"),
            Self::OPT => write!(f, "OPT"),
            Self::TSIG => write!(f, "TSIG"),
            Self::ANY => write!(f, "ANY"),
            Self::Unknown(v) => write!(f, "TYPE{}", v),
        }
    }
}

/// Record classes. `NONE` and `ANY` carry the RFC 2136 prerequisite and
/// deletion semantics; TSIG records travel in class `ANY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordClass {
    IN,
    None,
    Any,
    Unknown(u16),
}

impl RecordClass {
    pub fn from_u16(val: u16) -> Self {
        match val {
            1 => Self::IN,
            254 => Self::None,
            255 => Self::Any,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::IN => 1,
            Self::None => 254,
            Self::Any => 255,
            Self::Unknown(v) => v,
        }
    }
}

/// Decoded RDATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(String),
    CNAME(String),
    PTR(String),
    DNAME(String),
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    MX {
        preference: u16,
        exchange: String,
    },
    /// One or more character-strings.
    TXT(Vec<String>),
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    /// EDNS0 pseudo-record payload: (option-code, option-data) pairs.
    OPT {
        options: Vec<(u16, Vec<u8>)>,
    },
    /// RFC 2845 transaction signature.
    TSIG {
        algorithm: String,
        time_signed: u64,
        fudge: u16,
        mac: Vec<u8>,
        original_id: u16,
        error: u16,
        other: Vec<u8>,
    },
    /// Unsupported types, preserved byte for byte.
    Raw(Vec<u8>),
}

impl RData {
    /// Decode one RDATA body from its sub-window. `reader` is bounded by
    /// RDLENGTH but resolves compression pointers against the whole message.
    pub fn read(rtype: RecordType, reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let rdata = match rtype {
            RecordType::A => {
                let bytes = reader.read_bytes(4);
                let mut octets = [0u8; 4];
                octets[..bytes.len()].copy_from_slice(bytes);
                RData::A(Ipv4Addr::from(octets))
            }
            RecordType::AAAA => {
                let bytes = reader.read_bytes(16);
                let mut octets = [0u8; 16];
                octets[..bytes.len()].copy_from_slice(bytes);
                RData::AAAA(Ipv6Addr::from(octets))
            }
            RecordType::NS => RData::NS(reader.read_name()?),
            RecordType::CNAME => RData::CNAME(reader.read_name()?),
            RecordType::PTR => RData::PTR(reader.read_name()?),
            RecordType::DNAME => RData::DNAME(reader.read_name()?),
            RecordType::SOA => RData::SOA {
                mname: reader.read_name()?,
                rname: reader.read_name()?,
                serial: reader.read_u32(),
                refresh: reader.read_u32(),
                retry: reader.read_u32(),
                expire: reader.read_u32(),
                minimum: reader.read_u32(),
            },
            RecordType::MX => RData::MX {
                preference: reader.read_u16(),
                exchange: reader.read_name()?,
            },
            RecordType::TXT => RData::TXT(reader.read_character_strings()),
            RecordType::SRV => RData::SRV {
                priority: reader.read_u16(),
                weight: reader.read_u16(),
                port: reader.read_u16(),
                target: reader.read_name()?,
            },
            RecordType::OPT => {
                let mut options = Vec::new();
                while reader.remaining() >= 4 {
                    let code = reader.read_u16();
                    let len = reader.read_u16() as usize;
                    options.push((code, reader.read_bytes(len).to_vec()));
                }
                RData::OPT { options }
            }
            RecordType::TSIG => {
                let algorithm = reader.read_name()?;
                let time_signed = reader.read_u48();
                let fudge = reader.read_u16();
                let mac_len = reader.read_u16() as usize;
                let mac = reader.read_bytes(mac_len).to_vec();
                let original_id = reader.read_u16();
                let error = reader.read_u16();
                let other_len = reader.read_u16() as usize;
                let other = reader.read_bytes(other_len).to_vec();
                RData::TSIG { algorithm, time_signed, fudge, mac, original_id, error, other }
            }
            RecordType::ANY | RecordType::Unknown(_) => {
                RData::Raw(reader.read_bytes(reader.remaining()).to_vec())
            }
        };
        Ok(rdata)
    }

    /// Encode the RDATA body (without the RDLENGTH prefix).
    pub fn write(&self, writer: &mut Writer<'_>) -> Result<(), WireError> {
        match self {
            RData::A(ip) => writer.write(&ip.octets()),
            RData::AAAA(ip) => writer.write(&ip.octets()),
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) | RData::DNAME(name) => {
                writer.write_name(name)?;
            }
            RData::SOA { mname, rname, serial, refresh, retry, expire, minimum } => {
                writer.write_name(mname)?;
                writer.write_name(rname)?;
                writer.write_u32(*serial);
                writer.write_u32(*refresh);
                writer.write_u32(*retry);
                writer.write_u32(*expire);
                writer.write_u32(*minimum);
            }
            RData::MX { preference, exchange } => {
                writer.write_u16(*preference);
                writer.write_name(exchange)?;
            }
            RData::TXT(strings) => {
                for s in strings {
                    writer.write_character_string(s);
                }
            }
            RData::SRV { priority, weight, port, target } => {
                writer.write_u16(*priority);
                writer.write_u16(*weight);
                writer.write_u16(*port);
                writer.write_name(target)?;
            }
            RData::OPT { options } => {
                for (code, data) in options {
                    writer.write_u16(*code);
                    writer.write_u16(data.len() as u16);
                    writer.write(data);
                }
            }
            RData::TSIG { algorithm, time_signed, fudge, mac, original_id, error, other } => {
                writer.write_name(algorithm)?;
                writer.write_u48(*time_signed);
                writer.write_u16(*fudge);
                writer.write_u16(mac.len() as u16);
                writer.write(mac);
                writer.write_u16(*original_id);
                writer.write_u16(*error);
                writer.write_u16(other.len() as u16);
                writer.write(other);
            }
            RData::Raw(data) => writer.write(data),
        }
        Ok(())
    }
}
