use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;
use trust_dns_resolver::{
    Resolver,
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    proto::op::ResponseCode,
    system_conf::read_system_conf,
};

use super::{AddressFamily, DnsError, DnsOptions, DomainPresence, MxRecord};

/// DNS seam of the resolver. Implementations classify failures into
/// [`DnsError`] kinds; an answer without records is reported as
/// [`DnsError::NoMxRecords`] by `lookup_mx` and as an empty/negative result by
/// the other lookups.
pub trait DnsLookup: Send + Sync {
    fn lookup_mx(&self, domain: &str, timeout: Duration) -> Result<Vec<MxRecord>, DnsError>;

    fn has_address(
        &self,
        host: &str,
        family: AddressFamily,
        timeout: Duration,
    ) -> Result<bool, DnsError>;

    fn lookup_txt(&self, name: &str, timeout: Duration) -> Result<Vec<String>, DnsError>;

    /// A and AAAA addresses of `host`, used to open SMTP connections.
    fn lookup_ips(&self, host: &str, timeout: Duration) -> Result<Vec<IpAddr>, DnsError>;
}

impl<T: DnsLookup + ?Sized> DnsLookup for Arc<T> {
    fn lookup_mx(&self, domain: &str, timeout: Duration) -> Result<Vec<MxRecord>, DnsError> {
        (**self).lookup_mx(domain, timeout)
    }

    fn has_address(
        &self,
        host: &str,
        family: AddressFamily,
        timeout: Duration,
    ) -> Result<bool, DnsError> {
        (**self).has_address(host, family, timeout)
    }

    fn lookup_txt(&self, name: &str, timeout: Duration) -> Result<Vec<String>, DnsError> {
        (**self).lookup_txt(name, timeout)
    }

    fn lookup_ips(&self, host: &str, timeout: Duration) -> Result<Vec<IpAddr>, DnsError> {
        (**self).lookup_ips(host, timeout)
    }
}

/// Looks up MX records for an ASCII domain and returns them sorted by
/// ascending priority, deduplicated. Null MX (`.`) entries are dropped; a
/// domain publishing nothing else gets [`DnsError::NullMx`].
pub fn resolve_mx<D>(
    dns: &D,
    ascii_domain: &str,
    options: &DnsOptions,
) -> Result<Vec<MxRecord>, DnsError>
where
    D: DnsLookup + ?Sized,
{
    let answer = dns.lookup_mx(ascii_domain, options.mx_timeout)?;
    let published = answer.len();
    let mut records: Vec<MxRecord> = answer
        .into_iter()
        .map(|record| MxRecord::new(record.priority, normalize_exchange(&record.exchange)))
        .filter(|record| !record.exchange.is_empty())
        .collect();

    records.sort();
    records.dedup();

    debug!(domain = ascii_domain, count = records.len(), "MX lookup finished");
    match (records.is_empty(), published) {
        (false, _) => Ok(records),
        (true, 0) => Err(DnsError::NoMxRecords),
        (true, _) => Err(DnsError::NullMx),
    }
}

/// Basic existence check: A record first, AAAA as a fallback. The domain is
/// only reported as missing on an explicit NXDOMAIN answer.
pub fn domain_exists<D>(dns: &D, ascii_domain: &str, timeout: Duration) -> DomainPresence
where
    D: DnsLookup + ?Sized,
{
    let mut not_found = false;
    for family in [AddressFamily::V4, AddressFamily::V6] {
        match dns.has_address(ascii_domain, family, timeout) {
            Ok(true) => {
                return DomainPresence {
                    exists: true,
                    has_a_record: true,
                };
            }
            Ok(false) => {}
            Err(DnsError::DomainNotFound) => not_found = true,
            Err(err) => {
                debug!(domain = ascii_domain, ?family, error = %err, "address lookup failed");
            }
        }
    }
    DomainPresence {
        exists: !not_found,
        has_a_record: false,
    }
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    let trimmed = exchange.trim().trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}

/// Granularity of per-call resolver timeouts.
const TIMEOUT_STEP: Duration = Duration::from_millis(100);
const MAX_RESOLVERS: usize = 16;

/// [`DnsLookup`] backed by the system resolver configuration.
///
/// Each lookup runs on a resolver whose single attempt times out within the
/// caller's budget. Budgets are rounded down to whole [`TIMEOUT_STEP`]s (at
/// least one) so resolvers can be reused, and at most [`MAX_RESOLVERS`] are
/// kept. Answer caching is disabled: validations never see each other's DNS
/// results.
pub struct SystemDns {
    config: ResolverConfig,
    base: ResolverOpts,
    resolvers: Mutex<HashMap<Duration, Arc<Resolver>>>,
}

impl SystemDns {
    pub fn from_system_conf() -> io::Result<Self> {
        let (config, base) = read_system_conf().map_err(|err| io::Error::other(err.to_string()))?;
        Ok(Self::with_config(config, base))
    }

    pub fn with_config(config: ResolverConfig, base: ResolverOpts) -> Self {
        Self {
            config,
            base,
            resolvers: Mutex::new(HashMap::new()),
        }
    }

    pub(super) fn resolver(&self, timeout: Duration) -> Result<Arc<Resolver>, DnsError> {
        let opts = self.resolver_opts(timeout);
        let mut resolvers = self.resolvers.lock();
        if let Some(resolver) = resolvers.get(&opts.timeout) {
            return Ok(Arc::clone(resolver));
        }
        if resolvers.len() >= MAX_RESOLVERS {
            resolvers.clear();
        }
        let key = opts.timeout;
        let resolver = Resolver::new(self.config.clone(), opts)
            .map(Arc::new)
            .map_err(|err| DnsError::other(format!("resolver initialization failed: {err}")))?;
        resolvers.insert(key, Arc::clone(&resolver));
        Ok(resolver)
    }

    pub(super) fn resolver_opts(&self, timeout: Duration) -> ResolverOpts {
        let steps = (timeout.as_millis() / TIMEOUT_STEP.as_millis()).max(1);
        let mut opts = self.base.clone();
        opts.timeout = TIMEOUT_STEP * u32::try_from(steps).unwrap_or(u32::MAX);
        opts.attempts = 1;
        opts.cache_size = 0;
        opts
    }

    #[cfg(test)]
    pub(super) fn resolver_count(&self) -> usize {
        self.resolvers.lock().len()
    }
}

impl std::fmt::Debug for SystemDns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemDns")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DnsLookup for SystemDns {
    fn lookup_mx(&self, domain: &str, timeout: Duration) -> Result<Vec<MxRecord>, DnsError> {
        let lookup = self
            .resolver(timeout)?
            .mx_lookup(domain)
            .map_err(|err| classify_resolve_error(&err))?;
        Ok(lookup
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), mx.exchange().to_utf8()))
            .collect())
    }

    fn has_address(
        &self,
        host: &str,
        family: AddressFamily,
        timeout: Duration,
    ) -> Result<bool, DnsError> {
        let resolver = self.resolver(timeout)?;
        let count = match family {
            AddressFamily::V4 => resolver.ipv4_lookup(host).map(|lookup| lookup.iter().count()),
            AddressFamily::V6 => resolver.ipv6_lookup(host).map(|lookup| lookup.iter().count()),
        };
        match count {
            Ok(count) => Ok(count > 0),
            Err(err) => match classify_resolve_error(&err) {
                DnsError::NoMxRecords => Ok(false),
                other => Err(other),
            },
        }
    }

    fn lookup_txt(&self, name: &str, timeout: Duration) -> Result<Vec<String>, DnsError> {
        let lookup = match self.resolver(timeout)?.txt_lookup(name) {
            Ok(lookup) => lookup,
            Err(err) => {
                return match classify_resolve_error(&err) {
                    DnsError::NoMxRecords => Ok(Vec::new()),
                    other => Err(other),
                };
            }
        };
        let mut records = Vec::new();
        for txt in lookup.iter() {
            let mut record = String::new();
            for piece in txt.txt_data().iter() {
                record.push_str(&String::from_utf8_lossy(piece));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn lookup_ips(&self, host: &str, timeout: Duration) -> Result<Vec<IpAddr>, DnsError> {
        match self.resolver(timeout)?.lookup_ip(host) {
            Ok(lookup) => Ok(lookup.iter().collect()),
            Err(err) => match classify_resolve_error(&err) {
                DnsError::NoMxRecords => Ok(Vec::new()),
                other => Err(other),
            },
        }
    }
}

/// Maps a resolver failure onto the DNS error taxonomy. "No records" answers
/// come back as [`DnsError::NoMxRecords`]; callers looking up other record
/// types translate that into an empty result.
pub(crate) fn classify_resolve_error(err: &ResolveError) -> DnsError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match response_code {
            ResponseCode::NXDomain => DnsError::DomainNotFound,
            ResponseCode::NoError => DnsError::NoMxRecords,
            ResponseCode::ServFail | ResponseCode::Refused => {
                DnsError::server_failure(format!("{response_code:?}"))
            }
            other => DnsError::other(format!("unexpected response code {other:?}")),
        },
        ResolveErrorKind::Timeout => DnsError::Timeout,
        ResolveErrorKind::NoConnections => DnsError::server_failure("no name server reachable"),
        ResolveErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::TimedOut => {
            DnsError::Timeout
        }
        _ => DnsError::other(err.to_string()),
    }
}
