//! URL canonicalization
//!
//! Every component that keys anything by URL goes through [`parse_url`], so a
//! page reached as `https://www.example.com/a/`, `example.com/a?utm_source=x`
//! or `http://example.com/a#top` is the same link, the same document.

use url::{Host, Url};

/// Tracking/session query parameters stripped from fetch URLs
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "sid",
    "sessionid",
    "ref",
];

/// Second-level labels that form a public suffix with a country code
/// (`clarin.com.ar`, `eltiempo.com.co`)
const SECOND_LEVEL_LABELS: &[&str] = &["com", "co", "org", "net", "gob", "gov", "edu", "ac"];

/// A URL split into its canonical parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// Fetchable URL: fragment and tracking parameters removed
    pub url: Url,
    /// Registrable domain, subdomains and `www` stripped
    pub domain: String,
    /// `subdomain|domain|path`; no scheme, query, fragment or trailing slash
    pub url_identifier: String,
}

/// Parse and canonicalize a URL. Inputs without a scheme are accepted.
pub fn parse_url(raw: &str) -> Option<ParsedUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = if raw.contains("://") {
        Url::parse(raw).ok()?
    } else if has_bare_scheme(raw) {
        return None;
    } else {
        Url::parse(&format!("http://{}", raw)).ok()?
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let (subdomain, domain) = match url.host()? {
        Host::Domain(host) => {
            let host = host.to_lowercase();
            split_host(host.strip_prefix("www.").unwrap_or(&host))?
        }
        Host::Ipv4(addr) => (None, addr.to_string()),
        Host::Ipv6(addr) => (None, addr.to_string()),
    };

    let path = url.path().trim_matches('/');
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if let Some(ref sub) = subdomain {
        parts.push(sub);
    }
    parts.push(&domain);
    if !path.is_empty() {
        parts.push(path);
    }
    let url_identifier = parts.join("|");

    Some(ParsedUrl {
        url: fetch_url(&url),
        domain,
        url_identifier,
    })
}

/// Domain of a URL, if it parses
pub fn domain_of(raw: &str) -> Option<String> {
    parse_url(raw).map(|p| p.domain)
}

/// `mailto:x`, `javascript:void(0)`, `tel:123`
fn has_bare_scheme(raw: &str) -> bool {
    match raw.split_once(':') {
        Some((scheme, _)) => !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

/// Split a host into (subdomain, registrable domain)
fn split_host(host: &str) -> Option<(Option<String>, String)> {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return None;
    }
    let n = labels.len();
    let suffix_len = if n >= 3
        && labels[n - 1].len() == 2
        && SECOND_LEVEL_LABELS.contains(&labels[n - 2])
    {
        3
    } else {
        2
    };
    if n < suffix_len {
        return None;
    }
    let domain = labels[n - suffix_len..].join(".");
    let subdomain = if n > suffix_len {
        Some(labels[..n - suffix_len].join("."))
    } else {
        None
    };
    Some((subdomain, domain))
}

fn fetch_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    if let Some(query) = normalized.query() {
        let params: Vec<String> = query
            .split('&')
            .filter(|p| {
                let key = p.split('=').next().unwrap_or("").to_lowercase();
                !key.is_empty() && !TRACKING_PARAMS.contains(&key.as_str())
            })
            .map(str::to_string)
            .collect();
        if params.is_empty() {
            normalized.set_query(None);
        } else {
            normalized.set_query(Some(&params.join("&")));
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(raw: &str) -> String {
        parse_url(raw).unwrap().url_identifier
    }

    #[test]
    fn canonical_identifiers() {
        let cases = [
            ("https://google.com", "google.com", "google.com"),
            ("http://google.com/", "google.com", "google.com"),
            ("http://google.com/?q=value", "google.com", "google.com"),
            ("http://blog.google.com/?q=value", "google.com", "blog|google.com"),
            ("http://www.google.com/?q=value", "google.com", "google.com"),
            ("www.google.com/?q=value", "google.com", "google.com"),
            ("www.google.com/some-page", "google.com", "google.com|some-page"),
            ("www.google.com/some-page/v2", "google.com", "google.com|some-page/v2"),
            ("www.google.com/some-page/v2?q=123", "google.com", "google.com|some-page/v2"),
        ];
        for (input, domain, identifier) in cases {
            let parsed = parse_url(input).unwrap();
            assert_eq!(parsed.domain, domain, "domain of {}", input);
            assert_eq!(parsed.url_identifier, identifier, "identifier of {}", input);
        }
    }

    #[test]
    fn same_logical_page_same_identifier() {
        let a = ident("https://example.com");
        assert_eq!(a, ident("http://www.example.com/"));
        assert_eq!(a, ident("example.com/?q=1#frag"));
        assert_ne!(a, ident("example.com/other"));
    }

    #[test]
    fn country_code_second_level_domains() {
        let parsed = parse_url("https://www.clarin.com.ar/politica/nota.html").unwrap();
        assert_eq!(parsed.domain, "clarin.com.ar");
        assert_eq!(parsed.url_identifier, "clarin.com.ar|politica/nota.html");

        let parsed = parse_url("https://deportes.elpais.com.uy/").unwrap();
        assert_eq!(parsed.domain, "elpais.com.uy");
        assert_eq!(parsed.url_identifier, "deportes|elpais.com.uy");

        assert_eq!(domain_of("https://elpais.es/x").as_deref(), Some("elpais.es"));
    }

    #[test]
    fn host_case_is_ignored() {
        assert_eq!(ident("HTTPS://WWW.Example.COM/Noticia"), "example.com|Noticia");
    }

    #[test]
    fn fetch_url_drops_fragment_and_tracking() {
        let parsed = parse_url("https://example.com/a?utm_source=x&id=3#top").unwrap();
        assert_eq!(parsed.url.as_str(), "https://example.com/a?id=3");
    }

    #[test]
    fn ip_hosts_are_their_own_domain() {
        let parsed = parse_url("http://127.0.0.1:8080/nota").unwrap();
        assert_eq!(parsed.domain, "127.0.0.1");
        assert_eq!(parsed.url_identifier, "127.0.0.1|nota");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_url("").is_none());
        assert!(parse_url("localhost").is_none());
        assert!(parse_url("mailto:someone@example.com").is_none());
        assert!(parse_url("javascript:void(0)").is_none());
        assert!(parse_url("ftp://example.com/file").is_none());
    }
}
