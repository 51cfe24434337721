//! Error types for the redirect service.
//!
//! This module defines the error types used by the resolver, the redirect
//! table and the HTTP handlers.

use std::time::Duration;
use thiserror::Error;

/// Failures of a single exchange with the upstream DNS server.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Socket errors while talking to the upstream server.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No answer arrived within the configured timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The response could not be parsed as a DNS message for our query.
    #[error("malformed DNS response: {0}")]
    Malformed(String),
}

/// Represents errors that can occur while serving redirects.
#[derive(Error, Debug)]
pub enum RedirectError {
    /// I/O errors from the listeners or template loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream exchange for `host` failed.
    #[error("DNS resolution failed for {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: ExchangeError,
    },

    /// The upstream answered but carried no CNAME record.
    #[error("no CNAME record found for host: {host}")]
    NoCname { host: String },

    /// The upstream answered but carried no A record.
    #[error("no A record found for host: {host}")]
    NoAddress { host: String },

    /// The CNAME did not end with any configured redirect suffix.
    #[error("no redirect domain matches CNAME: {cname}")]
    UnmatchedCname { cname: String },
}

impl RedirectError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RedirectError::Io(_) => "io",
            RedirectError::Config(_) => "config",
            RedirectError::Resolution { .. } => "resolution",
            RedirectError::NoCname { .. } => "no_cname",
            RedirectError::NoAddress { .. } => "no_address",
            RedirectError::UnmatchedCname { .. } => "unmatched_cname",
        }
    }
}
