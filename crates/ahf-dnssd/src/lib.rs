//! DNS-SD service discovery over the resolver socket: browse for service
//! instances via PTR/SRV/TXT, publish and withdraw them via signed DNS
//! UPDATE.

pub mod browse;
pub mod publish;
pub mod txt;

pub use browse::ServiceBrowser;
pub use publish::ServicePublisher;
