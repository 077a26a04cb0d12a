//! Post-verification access control.
//!
//! Evaluates an app's [`AccessControlConfig`] against the request path and
//! client IP. This runs only after the signature has verified; it answers
//! "may this authenticated app call this endpoint from here", not "is this
//! request genuine".
//!
//! # Path patterns
//!
//! - A pattern without wildcards matches the exact path or any deeper path at
//!   a segment boundary: `/admin` matches `/admin` and `/admin/users`, but
//!   not `/administrator`.
//! - `*` matches any run of characters within one segment: `/api/*/status`
//!   matches `/api/v1/status`.
//! - `**` matches zero or more whole segments: `/api/**` matches `/api`,
//!   `/api/v1`, and `/api/v1/users/42`.
//! - Wildcard patterns must match the whole path.
//!
//! A denied match always wins over an allowed one. An empty allow list means
//! every path is allowed (the deny list still applies).
//!
//! # IP rules
//!
//! Entries are exact addresses (`203.0.113.7`) or CIDR blocks
//! (`10.0.0.0/8`, `2001:db8::/32`). A non-empty list with no usable client
//! IP denies the request: an unknown caller location cannot satisfy a
//! location restriction.

use std::net::IpAddr;

use ipnet::IpNet;

use signet_storage::AccessControlConfig;

/// Outcome of access evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    /// The request may proceed.
    Allowed,
    /// The request is blocked; `reason` names the rule that blocked it.
    Denied {
        /// Human-readable explanation for logs and error detail.
        reason: String,
    },
}

impl AccessDecision {
    /// Returns `true` for [`AccessDecision::Allowed`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self::Denied { reason: reason.into() }
    }
}

/// A parsed path pattern. Parsing never fails; every string is a pattern.
#[derive(Clone, Debug)]
pub struct PathPattern {
    raw: String,
    segments: Vec<String>,
    has_wildcard: bool,
}

impl PathPattern {
    /// Parses a pattern. Empty segments (from `//` or trailing `/`) are
    /// dropped, so `/a/` and `/a` are the same pattern.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        Self {
            raw: pattern.to_owned(),
            segments: split_segments(pattern).into_iter().map(str::to_owned).collect(),
            has_wildcard: pattern.contains('*'),
        }
    }

    /// The original pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Tests a request path against this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path_segments = split_segments(path);
        let pattern: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        if self.has_wildcard {
            match_segments(&pattern, &path_segments)
        } else {
            // Exact or prefix at a segment boundary.
            path_segments.len() >= pattern.len()
                && pattern.iter().zip(&path_segments).all(|(p, s)| p == s)
        }
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        },
        Some((head, rest)) => match path.split_first() {
            Some((first, remaining)) if segment_matches(head, first) => {
                match_segments(rest, remaining)
            },
            _ => false,
        },
    }
}

/// Glob match within one segment: `*` matches any run of characters.
fn segment_matches(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();

    // Iterative glob with single-star backtracking.
    let (mut p, mut t) = (0, 0);
    let (mut star, mut star_t) = (None, 0);
    while t < txt.len() {
        if p < pat.len() && (pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

/// Evaluates access rules for an authenticated request.
///
/// `access` being `None` (or fully empty) allows everything. `method` is not
/// consulted by the current rule forms; it is carried into denial reasons so
/// logs show the full request line.
#[must_use]
pub fn evaluate(
    access: Option<&AccessControlConfig>,
    path: &str,
    method: &str,
    client_ip: Option<&str>,
) -> AccessDecision {
    let Some(access) = access else {
        return AccessDecision::Allowed;
    };

    for pattern in &access.denied_paths {
        if PathPattern::parse(pattern).matches(path) {
            return AccessDecision::denied(format!(
                "{method} {path} matches denied pattern '{pattern}'"
            ));
        }
    }

    if !access.allowed_paths.is_empty() {
        let allowed =
            access.allowed_paths.iter().any(|pattern| PathPattern::parse(pattern).matches(path));
        if !allowed {
            return AccessDecision::denied(format!("{method} {path} matches no allowed pattern"));
        }
    }

    if !access.allowed_ips.is_empty() {
        let Some(client_ip) = client_ip else {
            return AccessDecision::denied("client IP unknown but IP restrictions configured");
        };
        let Ok(addr) = client_ip.parse::<IpAddr>() else {
            return AccessDecision::denied(format!("client IP '{client_ip}' is not parseable"));
        };
        if !ip_allowed(&access.allowed_ips, addr) {
            return AccessDecision::denied(format!("client IP {addr} not in allowed list"));
        }
    }

    AccessDecision::Allowed
}

fn ip_allowed(allowed: &[String], addr: IpAddr) -> bool {
    allowed.iter().any(|entry| {
        if entry.contains('/') {
            match entry.parse::<IpNet>() {
                Ok(net) => net.contains(&addr),
                Err(err) => {
                    tracing::warn!(entry = %entry, error = %err, "unparseable CIDR entry, ignoring");
                    false
                },
            }
        } else {
            match entry.parse::<IpAddr>() {
                Ok(allowed_addr) => allowed_addr == addr,
                Err(err) => {
                    tracing::warn!(entry = %entry, error = %err, "unparseable IP entry, ignoring");
                    false
                },
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::exact("/api/v1", "/api/v1", true)]
    #[case::prefix_boundary("/api/v1", "/api/v1/users", true)]
    #[case::not_a_segment_prefix("/api/v1", "/api/v10", false)]
    #[case::trailing_slash_normalized("/api/v1/", "/api/v1", true)]
    #[case::single_star_one_segment("/api/*/status", "/api/v1/status", true)]
    #[case::single_star_not_two_segments("/api/*/status", "/api/v1/x/status", false)]
    #[case::star_within_segment("/files/*.json", "/files/report.json", true)]
    #[case::star_within_segment_miss("/files/*.json", "/files/report.xml", false)]
    #[case::double_star_deep("/api/**", "/api/v1/users/42", true)]
    #[case::double_star_zero_segments("/api/**", "/api", true)]
    #[case::double_star_middle("/api/**/status", "/api/a/b/status", true)]
    #[case::wildcard_is_full_match("/admin/*", "/admin/users/42", false)]
    #[case::wildcard_single("/admin/*", "/admin/users", true)]
    #[case::root_matches_everything("/", "/anything/at/all", true)]
    fn test_path_pattern(#[case] pattern: &str, #[case] path: &str, #[case] expected: bool) {
        assert_eq!(PathPattern::parse(pattern).matches(path), expected, "{pattern} vs {path}");
    }

    fn config(allowed: &[&str], denied: &[&str], ips: &[&str]) -> AccessControlConfig {
        AccessControlConfig::builder()
            .allowed_paths(allowed.iter().map(|s| (*s).to_owned()).collect())
            .denied_paths(denied.iter().map(|s| (*s).to_owned()).collect())
            .allowed_ips(ips.iter().map(|s| (*s).to_owned()).collect())
            .build()
    }

    #[test]
    fn test_no_config_allows_everything() {
        assert!(evaluate(None, "/anything", "GET", None).is_allowed());
        let empty = AccessControlConfig::default();
        assert!(evaluate(Some(&empty), "/anything", "DELETE", None).is_allowed());
    }

    #[test]
    fn test_deny_overrides_allow() {
        // /admin/health is inside the allowed tree AND the denied tree.
        let cfg = config(&["/admin/**"], &["/admin/**"], &[]);
        let decision = evaluate(Some(&cfg), "/admin/health", "GET", None);
        assert!(!decision.is_allowed());
        match decision {
            AccessDecision::Denied { reason } => assert!(reason.contains("denied pattern")),
            AccessDecision::Allowed => panic!("expected denial"),
        }
    }

    #[test]
    fn test_allow_list_restricts() {
        let cfg = config(&["/api/**"], &[], &[]);
        assert!(evaluate(Some(&cfg), "/api/v1/users", "GET", None).is_allowed());
        assert!(!evaluate(Some(&cfg), "/internal/metrics", "GET", None).is_allowed());
    }

    #[test]
    fn test_denied_single_segment() {
        let cfg = config(&[], &["/admin/*"], &[]);
        assert!(!evaluate(Some(&cfg), "/admin/users", "GET", None).is_allowed());
        assert!(evaluate(Some(&cfg), "/api/users", "GET", None).is_allowed());
    }

    #[rstest]
    #[case::exact_match("203.0.113.7", true)]
    #[case::in_cidr("10.1.2.3", true)]
    #[case::outside("192.0.2.55", false)]
    fn test_ip_rules(#[case] client: &str, #[case] expected: bool) {
        let cfg = config(&[], &[], &["203.0.113.7", "10.0.0.0/8"]);
        let decision = evaluate(Some(&cfg), "/any", "GET", Some(client));
        assert_eq!(decision.is_allowed(), expected);
    }

    #[test]
    fn test_ipv6_cidr() {
        let cfg = config(&[], &[], &["2001:db8::/32"]);
        assert!(evaluate(Some(&cfg), "/any", "GET", Some("2001:db8::1")).is_allowed());
        assert!(!evaluate(Some(&cfg), "/any", "GET", Some("2001:db9::1")).is_allowed());
    }

    #[test]
    fn test_missing_client_ip_denied_when_restricted() {
        let cfg = config(&[], &[], &["10.0.0.0/8"]);
        assert!(!evaluate(Some(&cfg), "/any", "GET", None).is_allowed());
        assert!(!evaluate(Some(&cfg), "/any", "GET", Some("not-an-ip")).is_allowed());
    }

    #[test]
    fn test_unparseable_allowlist_entry_never_matches() {
        let cfg = config(&[], &[], &["not-an-ip", "10.0.0.0/8"]);
        // The garbage entry is skipped; the valid one still works.
        assert!(evaluate(Some(&cfg), "/any", "GET", Some("10.0.0.1")).is_allowed());
        assert!(!evaluate(Some(&cfg), "/any", "GET", Some("192.0.2.1")).is_allowed());
    }

    #[test]
    fn test_rules_compose() {
        let cfg = config(&["/api/**"], &["/api/admin/**"], &["10.0.0.0/8"]);
        assert!(evaluate(Some(&cfg), "/api/v1", "GET", Some("10.9.9.9")).is_allowed());
        assert!(!evaluate(Some(&cfg), "/api/admin/keys", "GET", Some("10.9.9.9")).is_allowed());
        assert!(!evaluate(Some(&cfg), "/api/v1", "GET", Some("8.8.8.8")).is_allowed());
    }
}
