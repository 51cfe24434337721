//! Configuration for the redirect service.
//!
//! This module defines the configuration structures and the methods to load
//! them from environment variables. Configuration is read once at startup and
//! handed to the components by reference.

use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV6},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{info, warn};
use resolv_conf::ScopedIp;

use crate::errors::RedirectError;
use crate::redirect::{RedirectDomainTable, RedirectStatus};

/// Resolver configuration file read when `DNS_CONFIG_FILE` is unset.
pub const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";

/// Upstream used when no resolver configuration can be read.
pub const FALLBACK_DNS_SERVER: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));

/// Default upstream DNS port.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Default bound on one upstream exchange.
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(2);

/// Default plain HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port.
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Settings for the upstream DNS exchange and the CNAME cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upstream servers in preference order, link-local IPv6 addresses with
    /// their scope ID. Never empty.
    pub servers: Vec<SocketAddr>,

    /// Whether CNAME answers are cached.
    pub use_cache: bool,

    /// Bound on one upstream exchange.
    pub timeout: Duration,

    /// Optional bound on the number of cached hosts.
    pub cache_max_entries: Option<NonZeroUsize>,
}

impl ResolverConfig {
    /// Resolver settings for the given upstream servers with caching enabled.
    ///
    /// An empty server list is replaced by the fallback server on the default
    /// port.
    pub fn new(servers: Vec<SocketAddr>) -> Self {
        let servers = if servers.is_empty() {
            vec![SocketAddr::new(FALLBACK_DNS_SERVER, DEFAULT_DNS_PORT)]
        } else {
            servers
        };
        Self {
            servers,
            use_cache: true,
            timeout: DEFAULT_DNS_TIMEOUT,
            cache_max_entries: None,
        }
    }

    /// The server queries are sent to.
    pub fn primary(&self) -> SocketAddr {
        self.servers
            .first()
            .copied()
            .unwrap_or(SocketAddr::new(FALLBACK_DNS_SERVER, DEFAULT_DNS_PORT))
    }

    /// Read the nameservers listed in a resolv.conf file.
    ///
    /// # Errors
    /// Fails when the file cannot be read or is not valid resolv.conf syntax.
    pub fn read_resolv_conf(path: &Path) -> io::Result<Vec<ScopedIp>> {
        let contents = fs::read(path)?;
        let conf = resolv_conf::Config::parse(&contents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(conf.nameservers)
    }
}

/// Socket address of a nameserver, keeping the zone of scoped IPv6 addresses.
///
/// # Arguments
/// * `ip` - The nameserver address, possibly with a `%zone` suffix.
/// * `port` - Upstream port.
///
/// # Returns
/// The socket address, or `None` when the zone names no known interface.
pub fn nameserver_addr(ip: &ScopedIp, port: u16) -> Option<SocketAddr> {
    match ip {
        ScopedIp::V4(ip) => Some(SocketAddr::new(IpAddr::V4(*ip), port)),
        ScopedIp::V6(ip, None) => Some(SocketAddrV6::new(*ip, port, 0, 0).into()),
        ScopedIp::V6(ip, Some(zone)) => {
            let scope_id = scope_id(zone)?;
            Some(SocketAddrV6::new(*ip, port, 0, scope_id).into())
        }
    }
}

/// Interface index for an IPv6 zone, given as a number or an interface name.
fn scope_id(zone: &str) -> Option<u32> {
    if let Ok(index) = zone.parse() {
        return Some(index);
    }
    interface_index(zone)
}

#[cfg(unix)]
fn interface_index(name: &str) -> Option<u32> {
    let name = std::ffi::CString::new(name).ok()?;
    // SAFETY: `name` is a NUL-terminated string that outlives the call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    (index != 0).then_some(index)
}

#[cfg(not(unix))]
fn interface_index(_name: &str) -> Option<u32> {
    None
}

/// HTTPS listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert_path: PathBuf,

    /// PEM private key.
    pub key_path: PathBuf,

    /// Port to listen on.
    pub port: u16,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upstream DNS and cache settings.
    pub resolver: ResolverConfig,

    /// Redirect suffixes and their status codes.
    pub redirect_domains: RedirectDomainTable,

    /// Address the listeners bind to.
    pub listen_addr: IpAddr,

    /// Plain HTTP port.
    pub http_port: u16,

    /// HTTPS listener, present when a certificate and key are configured.
    pub tls: Option<TlsConfig>,

    /// Template for the informational page; the bundled one when unset.
    pub static_template: Option<PathBuf>,

    /// Address of the Prometheus endpoint, if enabled.
    pub metrics_addr: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    ///
    /// # Returns
    /// A `Result` containing either the loaded `ServerConfig` or a
    /// `RedirectError::Config`.
    pub fn from_env() -> Result<Self, RedirectError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load server configuration through `var`, which returns the value of a
    /// variable. Empty values count as unset.
    pub fn from_vars<F>(var: F) -> Result<Self, RedirectError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| var(key).filter(|value| !value.trim().is_empty());

        let mut configured = Vec::new();
        for status in RedirectStatus::ALL {
            if let Some(suffix) = get(&redirect_domain_var(status)) {
                info!("Redirect domain suffix: {}, Status code: {}", suffix.trim(), status);
                configured.push((suffix, status));
            }
        }
        let redirect_domains = RedirectDomainTable::new(configured).ok_or_else(|| {
            RedirectError::Config(
                "No redirect domains defined. Please set at least one REDIRECT_DOMAIN_ environment variable.".into(),
            )
        })?;

        let port = parse_var(&get, "DNS_PORT")?.unwrap_or(DEFAULT_DNS_PORT);
        let servers = match get("DNS_SERVERS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<ScopedIp>()
                        .ok()
                        .and_then(|ip| nameserver_addr(&ip, port))
                        .ok_or_else(|| RedirectError::Config(format!("Invalid DNS_SERVERS entry: {s}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => {
                let path = get("DNS_CONFIG_FILE").unwrap_or_else(|| DEFAULT_RESOLV_CONF.into());
                let servers: Vec<SocketAddr> = match ResolverConfig::read_resolv_conf(Path::new(&path)) {
                    Ok(nameservers) => nameservers
                        .iter()
                        .filter_map(|ip| {
                            let addr = nameserver_addr(ip, port);
                            if addr.is_none() {
                                warn!("Skipping nameserver {:?} in {}: unknown interface", ip, path);
                            }
                            addr
                        })
                        .collect(),
                    Err(e) => {
                        warn!("Error reading DNS config {}: {}", path, e);
                        Vec::new()
                    }
                };
                if servers.is_empty() {
                    warn!("No usable nameserver in {}, defaulting to {}", path, FALLBACK_DNS_SERVER);
                    vec![SocketAddr::new(FALLBACK_DNS_SERVER, port)]
                } else {
                    servers
                }
            }
        };

        let mut resolver = ResolverConfig::new(servers);
        resolver.use_cache = get("CACHE_DNS").map(|v| cache_flag(&v)).unwrap_or(false);
        if let Some(ms) = parse_var::<u64, _>(&get, "DNS_TIMEOUT_MS")? {
            if ms == 0 {
                return Err(RedirectError::Config("DNS_TIMEOUT_MS must be positive".into()));
            }
            resolver.timeout = Duration::from_millis(ms);
        }
        resolver.cache_max_entries = parse_var::<usize, _>(&get, "DNS_CACHE_MAX_ENTRIES")?.and_then(NonZeroUsize::new);

        let tls = match (get("TLS_CERT_FILE"), get("TLS_KEY_FILE")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.into(),
                key_path: key.into(),
                port: parse_var(&get, "HTTPS_PORT")?.unwrap_or(DEFAULT_HTTPS_PORT),
            }),
            (None, None) => None,
            _ => {
                return Err(RedirectError::Config(
                    "TLS_CERT_FILE and TLS_KEY_FILE must be set together".into(),
                ))
            }
        };

        Ok(Self {
            resolver,
            redirect_domains,
            listen_addr: parse_var(&get, "LISTEN_ADDR")?.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            http_port: parse_var(&get, "HTTP_PORT")?.unwrap_or(DEFAULT_HTTP_PORT),
            tls,
            static_template: get("STATIC_TEMPLATE_FILE").map(PathBuf::from),
            metrics_addr: parse_var(&get, "METRICS_ADDR")?,
        })
    }
}

/// Environment variable naming the suffix for `status`.
pub fn redirect_domain_var(status: RedirectStatus) -> String {
    format!("REDIRECT_DOMAIN_{}", status.code())
}

/// Interpret `CACHE_DNS`: anything but empty, `false`, `off` or `0` enables it.
fn cache_flag(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    !matches!(value.as_str(), "" | "false" | "off" | "0")
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>, RedirectError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| RedirectError::Config(format!("Invalid {key}: {value}")))
        })
        .transpose()
}
