//! Redirect decisions.
//!
//! Maps a resolved CNAME onto the target domain it cloaks and the status code
//! associated with the redirect suffix it ends with, and composes the outbound
//! redirect URL.

use std::fmt;

use axum::http::StatusCode;

/// Status codes a redirect suffix may be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RedirectStatus {
    /// 301 Moved Permanently.
    MovedPermanently,
    /// 302 Found.
    Found,
    /// 303 See Other.
    SeeOther,
    /// 307 Temporary Redirect.
    TemporaryRedirect,
    /// 308 Permanent Redirect.
    PermanentRedirect,
}

impl RedirectStatus {
    /// Every status in ascending code order.
    pub const ALL: [RedirectStatus; 5] = [
        RedirectStatus::MovedPermanently,
        RedirectStatus::Found,
        RedirectStatus::SeeOther,
        RedirectStatus::TemporaryRedirect,
        RedirectStatus::PermanentRedirect,
    ];

    /// Numeric HTTP status code.
    pub fn code(self) -> u16 {
        match self {
            RedirectStatus::MovedPermanently => 301,
            RedirectStatus::Found => 302,
            RedirectStatus::SeeOther => 303,
            RedirectStatus::TemporaryRedirect => 307,
            RedirectStatus::PermanentRedirect => 308,
        }
    }

    /// Look up a status by its numeric code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// The HTTP status code.
    pub fn status_code(self) -> StatusCode {
        match self {
            RedirectStatus::MovedPermanently => StatusCode::MOVED_PERMANENTLY,
            RedirectStatus::Found => StatusCode::FOUND,
            RedirectStatus::SeeOther => StatusCode::SEE_OTHER,
            RedirectStatus::TemporaryRedirect => StatusCode::TEMPORARY_REDIRECT,
            RedirectStatus::PermanentRedirect => StatusCode::PERMANENT_REDIRECT,
        }
    }
}

impl fmt::Display for RedirectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Scheme of the inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// TLS terminated by this service.
    Https,
}

impl Scheme {
    /// The URL scheme string.
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of matching a CNAME against the redirect table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// The uncloaked domain to redirect to.
    pub target_domain: String,
    /// The status to redirect with.
    pub status: RedirectStatus,
}

/// Redirect suffixes and their status codes.
///
/// Built once at startup and read-only afterwards. Suffixes are kept longest
/// first, so when two configured suffixes both end a CNAME the more specific
/// one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectDomainTable {
    entries: Vec<(String, RedirectStatus)>,
}

impl RedirectDomainTable {
    /// Build a table from `(suffix, status)` pairs.
    ///
    /// Suffixes are compared case-insensitively and stored without a trailing
    /// dot. Empty suffixes are skipped; a repeated suffix keeps its first
    /// status.
    ///
    /// # Returns
    /// `None` if no usable suffix remains.
    pub fn new<I, S>(entries: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, RedirectStatus)>,
        S: AsRef<str>,
    {
        let mut table: Vec<(String, RedirectStatus)> = Vec::new();
        for (suffix, status) in entries {
            let suffix = normalize(suffix.as_ref());
            if suffix.is_empty() || table.iter().any(|(known, _)| *known == suffix) {
                continue;
            }
            table.push((suffix, status));
        }

        if table.is_empty() {
            return None;
        }
        // Stable sort: equal lengths keep configuration order
        table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Some(Self { entries: table })
    }

    /// Iterate over `(suffix, status)` pairs, longest suffix first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, RedirectStatus)> {
        self.entries.iter().map(|(suffix, status)| (suffix.as_str(), *status))
    }

    /// Number of configured suffixes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The suffix configured for `status`, if any.
    pub fn suffix_for(&self, status: RedirectStatus) -> Option<&str> {
        self.iter()
            .find(|(_, configured)| *configured == status)
            .map(|(suffix, _)| suffix)
    }

    /// Whether `host` is itself one of the redirect suffix domains.
    pub fn is_redirect_domain(&self, host: &str) -> bool {
        let host = normalize(host);
        self.entries.iter().any(|(suffix, _)| *suffix == host)
    }

    /// Match a resolved CNAME against the table.
    ///
    /// # Arguments
    /// * `cname` - The CNAME target, normally dot-terminated.
    ///
    /// # Returns
    /// The target domain (the CNAME with `"." + suffix` removed) and the
    /// suffix's status, or `None` if no suffix matches.
    pub fn match_cname(&self, cname: &str) -> Option<RedirectTarget> {
        let cname = cname.strip_suffix('.').unwrap_or(cname);

        self.entries.iter().find_map(|(suffix, status)| {
            let cut = cname.len().checked_sub(suffix.len() + 1)?;
            let tail = cname.get(cut..)?;
            if cut > 0 && tail.as_bytes()[0] == b'.' && tail[1..].eq_ignore_ascii_case(suffix) {
                Some(RedirectTarget {
                    target_domain: cname[..cut].to_string(),
                    status: *status,
                })
            } else {
                None
            }
        })
    }
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Compose the URL to redirect to.
///
/// `path` and `query` are copied verbatim; `"?" + query` is appended only when
/// `query` is non-empty.
pub fn compose_redirect_url(scheme: Scheme, target_domain: &str, path: &str, query: &str) -> String {
    let mut url = String::with_capacity(target_domain.len() + path.len() + query.len() + 9);
    url.push_str(scheme.as_str());
    url.push_str("://");
    url.push_str(target_domain);
    url.push_str(path);
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}
