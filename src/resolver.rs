//! CNAME resolution.
//!
//! The `Resolver` asks the primary upstream server for the CNAME of an inbound
//! host and keeps answers in its own `CnameCache` for as long as their TTL
//! allows.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use log::debug;

use crate::cache::CnameCache;
use crate::config::ResolverConfig;
use crate::dns::{self, TYPE_A, TYPE_CNAME};
use crate::errors::{ExchangeError, RedirectError};
use crate::utils::fqdn;

/// Resolves hostnames to their CNAME targets.
#[derive(Debug)]
pub struct Resolver {
    upstream: SocketAddr,
    timeout: Duration,
    cache: Option<CnameCache>,
}

impl Resolver {
    /// Create a resolver for the given configuration.
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            upstream: config.primary(),
            timeout: config.timeout,
            cache: config
                .use_cache
                .then(|| CnameCache::new(config.cache_max_entries)),
        }
    }

    /// The cache, when caching is enabled.
    pub fn cache(&self) -> Option<&CnameCache> {
        self.cache.as_ref()
    }

    /// Look up the CNAME of `host`.
    ///
    /// A fresh cache entry is returned without touching the network.
    /// Otherwise one query is sent to the primary upstream; the first CNAME in
    /// its answer section is cached for its TTL and returned dot-terminated,
    /// exactly as received.
    ///
    /// # Errors
    /// `RedirectError::Resolution` when the exchange fails or times out,
    /// `RedirectError::NoCname` when the answer holds no CNAME record.
    pub async fn lookup(&self, host: &str) -> Result<String, RedirectError> {
        if let Some(cache) = &self.cache {
            if let Some(cname) = cache.get(host, Instant::now()) {
                metrics::counter!("cname_cache_lookups_total", "result" => "hit").increment(1);
                debug!("Cache hit for {}: {}", host, cname);
                return Ok(cname);
            }
            metrics::counter!("cname_cache_lookups_total", "result" => "miss").increment(1);
        }

        let response = self.query(host, TYPE_CNAME).await?;
        let (cname, ttl) = match response.first_cname() {
            Some(found) => found,
            None => {
                metrics::counter!("dns_queries_total", "status" => "no_cname").increment(1);
                return Err(RedirectError::NoCname { host: host.to_string() });
            }
        };
        metrics::counter!("dns_queries_total", "status" => "success").increment(1);

        if let Some(cache) = &self.cache {
            cache.insert(host, cname, ttl, Instant::now());
            debug!("Cached CNAME for {}: {} (ttl {}s)", host, cname, ttl);
        }
        Ok(cname.to_string())
    }

    /// Look up the first IPv4 address of `host`. Never cached.
    ///
    /// # Errors
    /// `RedirectError::Resolution` when the exchange fails,
    /// `RedirectError::NoAddress` when the answer holds no A record.
    pub async fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, RedirectError> {
        let response = self.query(host, TYPE_A).await?;
        response.first_a().ok_or_else(|| RedirectError::NoAddress {
            host: host.to_string(),
        })
    }

    async fn query(&self, host: &str, qtype: u16) -> Result<dns::Response, RedirectError> {
        dns::query(self.upstream, &fqdn(host), qtype, self.timeout)
            .await
            .map_err(|source| {
                let status = match source {
                    ExchangeError::Timeout(_) => "timeout",
                    _ => "failure",
                };
                metrics::counter!("dns_queries_total", "status" => status).increment(1);
                RedirectError::Resolution {
                    host: host.to_string(),
                    source,
                }
            })
    }
}
