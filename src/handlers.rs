//! Request handlers for the redirect service.
//!
//! This module provides the HTTP handler that turns an inbound host into a
//! redirect, and the functions running the HTTP and HTTPS listeners.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Extension, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use log::{error, info, warn};
use tokio::net::TcpListener;

use crate::config::TlsConfig;
use crate::errors::RedirectError;
use crate::redirect::{compose_redirect_url, RedirectDomainTable, RedirectStatus, Scheme};
use crate::resolver::Resolver;
use crate::static_page::{escape_html, StaticPage};
use crate::utils::split_host_port;

/// Shared state of the request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// CNAME resolver with its cache.
    pub resolver: Arc<Resolver>,
    /// Redirect suffixes, read-only.
    pub redirect_domains: Arc<RedirectDomainTable>,
    /// Renderer for direct visits of a suffix domain.
    pub static_page: Arc<StaticPage>,
}

/// What to answer a request with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Redirect to `url` with `status`.
    Redirect { url: String, status: RedirectStatus },
    /// Serve the rendered informational page.
    StaticPage(String),
}

/// Decide how to answer a request for `host`.
///
/// # Arguments
/// * `state` - The handler state.
/// * `scheme` - Scheme of the inbound connection, reused for the redirect.
/// * `host` - Inbound hostname without port.
/// * `path` - Request path, copied verbatim.
/// * `query` - Raw query string, empty when absent.
///
/// # Returns
/// A `Result` containing the outcome or the per-request error.
pub async fn resolve_request(
    state: &AppState,
    scheme: Scheme,
    host: &str,
    path: &str,
    query: &str,
) -> Result<Outcome, RedirectError> {
    if state.redirect_domains.is_redirect_domain(host) {
        return Ok(Outcome::StaticPage(state.static_page.render(host)));
    }

    let cname = state.resolver.lookup(host).await?;
    let target = state
        .redirect_domains
        .match_cname(&cname)
        .ok_or_else(|| RedirectError::UnmatchedCname {
            cname: cname.trim_end_matches('.').to_string(),
        })?;

    Ok(Outcome::Redirect {
        url: compose_redirect_url(scheme, &target.target_domain, path, query),
        status: target.status,
    })
}

/// Build the router serving every path with the redirect handler.
pub fn router(state: AppState, scheme: Scheme) -> Router {
    Router::new()
        .fallback(redirect_handler)
        .layer(Extension(scheme))
        .with_state(state)
}

/// Handle one inbound request.
async fn redirect_handler(
    State(state): State<AppState>,
    Extension(scheme): Extension<Scheme>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let Some(host) = request_host(&uri, &headers) else {
        warn!("Request without host: {}", uri);
        return (StatusCode::BAD_REQUEST, "Missing host").into_response();
    };
    let path = uri.path();
    let query = uri.query().unwrap_or_default();

    match resolve_request(&state, scheme, &host, path, query).await {
        Ok(Outcome::Redirect { url, status }) => {
            let Ok(location) = HeaderValue::try_from(url.as_str()) else {
                error!("Refusing to redirect {} to invalid location {:?}", host, url);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Unexpected CNAME format").into_response();
            };
            info!(
                "Redirect ({}) {} to {}",
                status,
                compose_redirect_url(scheme, &host, path, query),
                url
            );
            metrics::counter!("redirects_total", "status" => status.to_string()).increment(1);

            let mut response = if method == Method::GET || method == Method::HEAD {
                Html(redirect_body(&url, status)).into_response()
            } else {
                Response::new(Body::empty())
            };
            *response.status_mut() = status.status_code();
            response.headers_mut().insert(header::LOCATION, location);
            response
        }
        Ok(Outcome::StaticPage(page)) => {
            metrics::counter!("static_pages_total").increment(1);
            Html(page).into_response()
        }
        Err(e) => {
            metrics::counter!("request_errors_total", "kind" => e.kind()).increment(1);
            e.into_response()
        }
    }
}

impl IntoResponse for RedirectError {
    fn into_response(self) -> Response {
        let message = match &self {
            RedirectError::Resolution { host, .. } | RedirectError::NoCname { host } => {
                error!("Error fetching CNAME for {}: {}", host, self);
                "Unable to fetch CNAME"
            }
            RedirectError::UnmatchedCname { cname } => {
                error!("Unexpected CNAME format or no matching redirect domain: {}", cname);
                "Unexpected CNAME format"
            }
            RedirectError::Io(_) | RedirectError::Config(_) | RedirectError::NoAddress { .. } => {
                error!("Request failed: {}", self);
                "Unexpected error"
            }
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Short HTML body linking to the redirect target.
fn redirect_body(url: &str, status: RedirectStatus) -> String {
    let reason = status.status_code().canonical_reason().unwrap_or_default();
    format!("<a href=\"{}\">{}</a>.\n", escape_html(url), reason)
}

/// The inbound hostname, port stripped and lowercased.
pub fn request_host(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    let raw = match uri.authority() {
        Some(authority) => authority.as_str().to_string(),
        None => headers.get(header::HOST)?.to_str().ok()?.to_string(),
    };
    let host = split_host_port(raw.trim()).to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}

/// Run the plain HTTP listener.
///
/// # Arguments
/// * `addr` - The address to bind.
/// * `state` - The handler state.
///
/// # Returns
/// A `Result` that is only returned when the listener fails.
pub async fn run_http_server(addr: SocketAddr, state: AppState) -> Result<(), RedirectError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Starting HTTP server on {}", addr);
    axum::serve(listener, router(state, Scheme::Http).into_make_service()).await?;
    Ok(())
}

/// Run the HTTPS listener with the configured PEM certificate and key.
pub async fn run_https_server(
    addr: SocketAddr,
    tls: TlsConfig,
    state: AppState,
) -> Result<(), RedirectError> {
    let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| {
            RedirectError::Config(format!(
                "Failed to load TLS certificate {} / key {}: {}",
                tls.cert_path.display(),
                tls.key_path.display(),
                e
            ))
        })?;

    info!("Starting HTTPS server on {}", addr);
    axum_server::bind_rustls(addr, rustls)
        .serve(router(state, Scheme::Https).into_make_service())
        .await?;
    Ok(())
}
