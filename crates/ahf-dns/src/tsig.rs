//! RFC 2845 transaction signatures for DNS UPDATE.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::buffer::Writer;
use crate::error::DnsError;
use crate::rdata::{RData, RecordClass, RecordType};
use crate::record::ResourceRecord;

/// Legacy default algorithm name. Kept for compatibility with deployments
/// keyed the old way; prefer `hmac-sha256.` where the server allows it.
pub const ALGORITHM_HMAC_MD5: &str = "hmac-md5.sig-alg.reg.int.";

pub const DEFAULT_FUDGE_SECONDS: u16 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

/// Match an algorithm name on its canonical form: lowercased, trailing dot
/// ignored.
fn algorithm_of(name: &str) -> Option<Algorithm> {
    let canonical = name.trim_end_matches('.').to_ascii_lowercase();
    match canonical.as_str() {
        "hmac-md5.sig-alg.reg.int" | "hmac-md5" => Some(Algorithm::Md5),
        "hmac-sha1" => Some(Algorithm::Sha1),
        "hmac-sha224" => Some(Algorithm::Sha224),
        "hmac-sha256" => Some(Algorithm::Sha256),
        "hmac-sha384" => Some(Algorithm::Sha384),
        "hmac-sha512" => Some(Algorithm::Sha512),
        _ => None,
    }
}

fn hmac_parts<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut mac = <M as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}

fn compute_hmac(algorithm: Algorithm, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    match algorithm {
        Algorithm::Md5 => hmac_parts::<Hmac<Md5>>(key, parts),
        Algorithm::Sha1 => hmac_parts::<Hmac<Sha1>>(key, parts),
        Algorithm::Sha224 => hmac_parts::<Hmac<Sha224>>(key, parts),
        Algorithm::Sha256 => hmac_parts::<Hmac<Sha256>>(key, parts),
        Algorithm::Sha384 => hmac_parts::<Hmac<Sha384>>(key, parts),
        Algorithm::Sha512 => hmac_parts::<Hmac<Sha512>>(key, parts),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// HMAC-keyed signer producing and checking TSIG records.
#[derive(Debug, Clone)]
pub struct TsigSigner {
    key_name: String,
    secret: Vec<u8>,
    algorithm: String,
    fudge: u16,
    /// Pinned signing clock; `None` means the system clock.
    pinned_time: Option<u64>,
}

impl TsigSigner {
    /// Signer for `key_name` with a base64 secret and the legacy default
    /// algorithm.
    pub fn new(key_name: &str, secret_base64: &str) -> Result<Self, DnsError> {
        Self::with_algorithm(key_name, secret_base64, ALGORITHM_HMAC_MD5)
    }

    pub fn with_algorithm(
        key_name: &str,
        secret_base64: &str,
        algorithm: &str,
    ) -> Result<Self, DnsError> {
        use base64::Engine;
        if algorithm_of(algorithm).is_none() {
            return Err(DnsError::TsigBadKey(algorithm.to_string()));
        }
        let secret = base64::engine::general_purpose::STANDARD
            .decode(secret_base64)
            .map_err(|_| DnsError::TsigBadKey(key_name.to_string()))?;
        Ok(Self {
            key_name: key_name.to_string(),
            secret,
            algorithm: algorithm.to_string(),
            fudge: DEFAULT_FUDGE_SECONDS,
            pinned_time: None,
        })
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Pin the signing clock to a fixed `time_signed`, for reproducible
    /// signatures.
    pub fn pin_time(mut self, time_signed: u64) -> Self {
        self.pinned_time = Some(time_signed);
        self
    }

    /// Compute a TSIG RR over `message` (the wire image before the TSIG RR
    /// is appended, with the unadjusted ARCOUNT).
    pub fn sign(&self, original_id: u16, message: &[u8]) -> ResourceRecord {
        let time_signed = self.pinned_time.unwrap_or_else(now_epoch_secs);
        self.sign_at(original_id, message, time_signed)
    }

    pub fn sign_at(&self, original_id: u16, message: &[u8], time_signed: u64) -> ResourceRecord {
        let mac = self.digest(message, time_signed, self.fudge, 0, &[]);
        ResourceRecord {
            name: self.key_name.clone(),
            rtype: RecordType::TSIG,
            class: RecordClass::Any,
            ttl: 0,
            rdata: Some(RData::TSIG {
                algorithm: self.algorithm.clone(),
                time_signed,
                fudge: self.fudge,
                mac,
                original_id,
                error: 0,
                other: Vec::new(),
            }),
        }
    }

    /// Check a received TSIG RR against `message` (the wire image without
    /// the TSIG RR). Outcomes map onto BADKEY / BADSIG / BADTIME.
    pub fn verify(&self, message: &[u8], record: &ResourceRecord) -> Result<(), DnsError> {
        self.verify_at(message, record, now_epoch_secs())
    }

    pub fn verify_at(
        &self,
        message: &[u8],
        record: &ResourceRecord,
        now: u64,
    ) -> Result<(), DnsError> {
        let Some(RData::TSIG { algorithm, time_signed, fudge, mac, error, other, .. }) =
            &record.rdata
        else {
            return Err(DnsError::TsigBadKey(record.name.clone()));
        };
        if !names_equal(&record.name, &self.key_name) {
            return Err(DnsError::TsigBadKey(record.name.clone()));
        }
        if algorithm_of(algorithm) != algorithm_of(&self.algorithm) {
            return Err(DnsError::TsigBadKey(algorithm.clone()));
        }
        let expected = self.digest(message, *time_signed, *fudge, *error, other);
        if !constant_time_eq(&expected, mac) {
            return Err(DnsError::TsigBadSig);
        }
        if now.abs_diff(*time_signed) > u64::from(*fudge) {
            return Err(DnsError::TsigBadTime);
        }
        Ok(())
    }

    /// RFC 2845 §3.4 digest input: the message, then the canonicalised key
    /// name, class ANY, TTL 0, algorithm name, time, fudge, error, other.
    fn digest(&self, message: &[u8], time_signed: u64, fudge: u16, error: u16, other: &[u8]) -> Vec<u8> {
        let mut scratch = [0u8; 640];
        let mut vars = Writer::new(&mut scratch);
        // write_name lowercases, which is exactly the canonical form.
        let _ = vars.write_name(&self.key_name);
        vars.write_u16(RecordClass::Any.to_u16());
        vars.write_u32(0);
        let _ = vars.write_name(&self.algorithm);
        vars.write_u48(time_signed);
        vars.write_u16(fudge);
        vars.write_u16(error);
        vars.write_u16(other.len() as u16);
        vars.write(other);

        let algorithm = algorithm_of(&self.algorithm)
            .expect("algorithm validated at construction");
        compute_hmac(algorithm, &self.secret, &[message, vars.buffer()])
    }
}

fn names_equal(a: &str, b: &str) -> bool {
    a.trim_end_matches('.').eq_ignore_ascii_case(b.trim_end_matches('.'))
}
