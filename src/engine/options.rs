use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::dns::DnsOptions;
use crate::smtp::ProbeOptions;

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorOptions {
    pub probe: ProbeOptions,
    pub dns: DnsOptions,
    /// Exchangers tried, in priority order, while connections keep failing.
    pub max_mx_hosts: usize,
    /// Pause between catch-all probes.
    pub catchall_pause: Duration,
    pub catchall_enabled: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            probe: ProbeOptions::default(),
            dns: DnsOptions::default(),
            max_mx_hosts: 3,
            catchall_pause: Duration::from_secs(1),
            catchall_enabled: true,
        }
    }
}

impl ValidatorOptions {
    /// Applies `timeout` to every SMTP step (connect, greeting, commands,
    /// TLS).
    pub fn with_smtp_timeout(mut self, timeout: Duration) -> Self {
        self.probe.connect_timeout = timeout;
        self.probe.greeting_timeout = timeout;
        self.probe.command_timeout = timeout;
        self.probe.tls_timeout = timeout;
        self
    }
}
