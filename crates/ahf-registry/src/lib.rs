//! Service-registry client: registry records expressed as DNS-SD
//! publications and lookups.

pub mod client;
pub mod types;

pub use client::RegistryClient;
pub use types::ServiceRecord;
