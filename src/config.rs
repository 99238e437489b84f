/// Default TCP port of the alert service
pub const DEFAULT_ALERT_PORT: u16 = 12321;

/// One contiguous address range to sweep for alert devices
///
/// Candidate addresses are formed as `"{network_prefix}.{suffix}"` for every
/// suffix in `first_host..=last_host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    /// Network prefix without trailing dot, e.g. `"192.168.17"`
    pub network_prefix: String,

    /// First host suffix to probe (inclusive)
    pub first_host: u8,

    /// Last host suffix to probe (inclusive)
    pub last_host: u8,
}

impl ScanRange {
    /// Create a range over `network_prefix.first_host ..= network_prefix.last_host`
    pub fn new(network_prefix: impl Into<String>, first_host: u8, last_host: u8) -> Self {
        Self {
            network_prefix: network_prefix.into(),
            first_host,
            last_host,
        }
    }
}

impl Default for ScanRange {
    fn default() -> Self {
        Self::new("192.168.17", 2, 254)
    }
}

/// Configuration for a [`ClientRegistry`](crate::ClientRegistry)
///
/// The registry creates one scanner per range. The minimal configuration has
/// exactly one range; multiple ranges scan concurrently and report a single
/// combined completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Address ranges to sweep during discovery
    pub ranges: Vec<ScanRange>,

    /// TCP port of the alert service on every device
    pub port: u16,
}

impl RegistryConfig {
    /// Configuration with a single range and the default alert port
    pub fn single_range(range: ScanRange) -> Self {
        Self {
            ranges: vec![range],
            port: DEFAULT_ALERT_PORT,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::single_range(ScanRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_deployment() {
        let config = RegistryConfig::default();
        assert_eq!(config.port, 12321);
        assert_eq!(config.ranges.len(), 1);
        assert_eq!(config.ranges[0].network_prefix, "192.168.17");
        assert_eq!(config.ranges[0].first_host, 2);
        assert_eq!(config.ranges[0].last_host, 254);
    }
}
