//! Informational page served when a redirect suffix domain is visited
//! directly.

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::errors::RedirectError;
use crate::redirect::{RedirectDomainTable, RedirectStatus};

/// Template bundled with the binary.
pub const DEFAULT_TEMPLATE: &str = include_str!("../static/index.html");

/// Renders the informational page.
#[derive(Debug, Clone)]
pub struct StaticPage {
    template: String,
    ip_address: String,
    domains: Vec<(RedirectStatus, Option<String>)>,
    domain_list: String,
}

impl StaticPage {
    /// Create a renderer from a template string.
    ///
    /// # Arguments
    /// * `template` - HTML with `{{placeholder}}` markers.
    /// * `ip_address` - Address advertised for bare domains.
    /// * `table` - The configured redirect suffixes.
    pub fn new(template: impl Into<String>, ip_address: Ipv4Addr, table: &RedirectDomainTable) -> Self {
        let domains: Vec<_> = RedirectStatus::ALL
            .into_iter()
            .map(|status| (status, table.suffix_for(status).map(str::to_string)))
            .collect();

        let mut domain_list = String::new();
        for (status, suffix) in &domains {
            if let Some(suffix) = suffix {
                let _ = writeln!(
                    domain_list,
                    "    <li><code>{}</code>: {} {}</li>",
                    escape_html(suffix),
                    status,
                    status.status_code().canonical_reason().unwrap_or_default()
                );
            }
        }

        Self {
            template: template.into(),
            ip_address: ip_address.to_string(),
            domains,
            domain_list,
        }
    }

    /// Create a renderer from a template file, or the bundled template when
    /// `path` is `None`.
    pub fn load(
        path: Option<&Path>,
        ip_address: Ipv4Addr,
        table: &RedirectDomainTable,
    ) -> Result<Self, RedirectError> {
        let template = match path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                RedirectError::Config(format!("Error reading template {}: {}", path.display(), e))
            })?,
            None => DEFAULT_TEMPLATE.to_string(),
        };
        Ok(Self::new(template, ip_address, table))
    }

    /// Render the page for a visit to `host`.
    pub fn render(&self, host: &str) -> String {
        let mut page = self
            .template
            .replace("{{redirect_domains}}", &self.domain_list)
            .replace("{{redirect_domain}}", &escape_html(host))
            .replace("{{ip_address}}", &self.ip_address);

        for (status, suffix) in &self.domains {
            let marker = format!("{{{{redirect_domain_{}}}}}", status.code());
            page = page.replace(&marker, &escape_html(suffix.as_deref().unwrap_or_default()));
        }
        page
    }
}

/// Escape `value` for use in HTML text and attribute values.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
