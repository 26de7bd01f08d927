use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9+.-]*://").unwrap());

/// Canonical form of a domain for comparisons and cache keys.
///
/// Accepts bare hosts as well as URLs: `HTTPS://WWW.Example.com:443/a` →
/// `example.com`.
pub fn normalize_domain(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let without_scheme = RE_SCHEME.replace(&lowered, "");

    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Drop userinfo and port.
    let host = host.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let host = host.trim_end_matches('.');

    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// Normalized host of a URL, or `None` when there is no host.
pub fn host_of(url: &str) -> Option<String> {
    let host = normalize_domain(url);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// How a SERP entry's domain is compared with the tracked domain.
///
/// Both sides are expected to be normalized already.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainMatch {
    /// Either domain contains the other as a substring. Tolerates
    /// subdomains and parent domains but also matches unrelated names
    /// that happen to share text (`notexample.com` for `example.com`).
    #[default]
    Loose,
    /// Equal, or one is a subdomain of the other on a label boundary.
    Boundary,
}

impl DomainMatch {
    pub fn matches(&self, candidate: &str, target: &str) -> bool {
        if candidate.is_empty() || target.is_empty() {
            return false;
        }
        match self {
            DomainMatch::Loose => candidate.contains(target) || target.contains(candidate),
            DomainMatch::Boundary => {
                candidate == target
                    || is_subdomain_of(candidate, target)
                    || is_subdomain_of(target, candidate)
            }
        }
    }
}

fn is_subdomain_of(child: &str, parent: &str) -> bool {
    child
        .strip_suffix(parent)
        .is_some_and(|prefix| prefix.ends_with('.'))
}
