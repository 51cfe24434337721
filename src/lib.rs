//! CNAME Redirect Library
//!
//! This library provides a redirect service driven by DNS. A client points a
//! CNAME for its host at `<target>.<redirect-suffix>`; requests for that host
//! are answered with a redirect to `<target>`, using the status code
//! configured for the suffix. Visiting a suffix domain itself serves an
//! informational page.

// Define modules
pub mod cache;
pub mod config;
pub mod dns;
pub mod errors;
pub mod handlers;
pub mod redirect;
pub mod resolver;
pub mod static_page;
pub mod utils;

// Re-export commonly used items
pub use cache::CnameCache;
pub use config::{ResolverConfig, ServerConfig};
pub use errors::{ExchangeError, RedirectError};
pub use handlers::AppState;
pub use redirect::{RedirectDomainTable, RedirectStatus, RedirectTarget, Scheme};
pub use resolver::Resolver;
pub use static_page::StaticPage;
