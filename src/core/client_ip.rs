/// Resolves the trusted client address for a request.
///
/// Forwarding headers are attacker-controlled unless the direct peer is a
/// known proxy, so the header is only consulted when the connection comes
/// from the trusted set. This is what keeps rate limiting spoof-proof.
#[derive(Debug, Clone)]
pub struct ClientIpResolver {
    /// Addresses whose X-Forwarded-For header is trusted
    trusted_proxies: Vec<String>,
    /// Number of trusted proxies in the chain
    /// (client -> CDN -> nginx -> app means 2)
    num_trusted_proxies: usize,
}

impl ClientIpResolver {
    /// Create a new resolver from the configured proxy trust list
    pub fn new(trusted_proxies: Vec<String>, num_trusted_proxies: usize) -> Self {
        Self {
            trusted_proxies,
            num_trusted_proxies,
        }
    }

    /// Resolve the client address from the direct peer address and the
    /// optional X-Forwarded-For header.
    ///
    /// Returns the peer address unchanged when it is not a trusted proxy.
    /// A malformed or empty header also degrades to the peer address;
    /// this never fails.
    pub fn resolve(&self, remote_addr: &str, forwarded_for: Option<&str>) -> String {
        if self.trusted_proxies.is_empty()
            || !self.trusted_proxies.iter().any(|proxy| proxy == remote_addr)
        {
            return remote_addr.to_string();
        }

        let header = match forwarded_for {
            Some(value) if !value.trim().is_empty() => value,
            _ => return remote_addr.to_string(),
        };

        // X-Forwarded-For format: client, proxy1, proxy2, ...
        let ips: Vec<&str> = header.split(',').map(str::trim).collect();

        // Skip the trusted proxies from the right to find the address the
        // first trusted proxy saw; shorter chains fall back to the leftmost
        // entry.
        let candidate = if ips.len() > self.num_trusted_proxies {
            ips[ips.len() - (self.num_trusted_proxies + 1)]
        } else {
            ips[0]
        };

        if candidate.is_empty() {
            remote_addr.to_string()
        } else {
            candidate.to_string()
        }
    }
}
