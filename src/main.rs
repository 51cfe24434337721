//! CNAME Redirect Server
//!
//! Redirects requests according to the CNAME record of their host, over HTTP
//! and, when a certificate is configured, HTTPS.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;

use cname_redirect::{
    config::ServerConfig,
    errors::RedirectError,
    handlers::{run_http_server, run_https_server, AppState},
    RedirectStatus, Resolver, StaticPage,
};

#[tokio::main]
async fn main() -> Result<(), RedirectError> {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    // Load configuration from environment variables
    let config = ServerConfig::from_env().map_err(|e| {
        error!("{}", e);
        e
    })?;

    info!("DNS upstream: {}", config.resolver.primary());
    info!("DNS timeout: {:?}", config.resolver.timeout);
    if config.resolver.use_cache {
        match config.resolver.cache_max_entries {
            Some(max) => info!("Using DNS cache (at most {} hosts)", max),
            None => info!("Using DNS cache"),
        }
    }

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| RedirectError::Config(format!("Failed to start metrics exporter: {e}")))?;
        info!("Prometheus metrics exporter listening on {}", addr);
    }

    let resolver = Resolver::new(&config.resolver);

    // The informational page advertises the address of the first configured suffix
    let page_domain = RedirectStatus::ALL
        .into_iter()
        .find_map(|status| config.redirect_domains.suffix_for(status))
        .ok_or_else(|| RedirectError::Config("No redirect domains defined".into()))?;
    let ip_address = resolver.lookup_ipv4(page_domain).await.map_err(|e| {
        RedirectError::Config(format!("Error getting IP address of {page_domain}: {e}"))
    })?;
    let static_page = StaticPage::load(
        config.static_template.as_deref(),
        ip_address,
        &config.redirect_domains,
    )?;

    let state = AppState {
        resolver: Arc::new(resolver),
        redirect_domains: Arc::new(config.redirect_domains.clone()),
        static_page: Arc::new(static_page),
    };

    // Set up shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let http_addr = SocketAddr::new(config.listen_addr, config.http_port);
    let http_server = run_http_server(http_addr, state.clone());

    let https_server = async {
        match config.tls.clone() {
            Some(tls) => {
                let addr = SocketAddr::new(config.listen_addr, tls.port);
                run_https_server(addr, tls, state.clone()).await
            }
            None => {
                info!("TLS_CERT_FILE/TLS_KEY_FILE not set, HTTPS disabled");
                std::future::pending().await
            }
        }
    };

    // Wait for either a shutdown signal or server error
    let result = tokio::select! {
        _ = shutdown_signal => Ok(()),
        res = http_server => res,
        res = https_server => res,
    };
    if let Err(e) = &result {
        error!("Server error: {}", e);
    }
    result
}
