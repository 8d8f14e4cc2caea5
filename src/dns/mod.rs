//! Domain resolver: MX lookup with classified failures, a basic A/AAAA
//! existence check, and the graduated fallback used when a domain has no
//! usable MX records.

mod error;
mod fallback;
mod options;
mod resolver;
mod types;

pub use error::DnsError;
pub use fallback::{PortProbe, attempt_fallback_validation};
pub use options::DnsOptions;
pub use resolver::{DnsLookup, SystemDns, domain_exists, resolve_mx};
pub use types::{AddressFamily, DomainPresence, FallbackMethod, FallbackReport, MxRecord};
