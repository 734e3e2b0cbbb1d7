//! Single-pass HTML page parser
//!
//! One top-down walk over the DOM collects outbound links, `<meta>` tags,
//! the page language, body text from text-bearing tags and the paywall
//! signal selected by the source's [`PaywallFilter`].

use scraper::{Html, Node};
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::sources::PaywallFilter;

/// Tags whose direct text is treated as article body
const TEXT_TAGS: &[&str] = &[
    "a", "abbr", "address", "b", "center", "h1", "h2", "h3", "h4", "h5", "h6", "li", "p",
    "span", "strong", "td",
];

const IMAGE_EXTENSIONS: &[&str] = &[".jpeg", ".jpg", ".gif", ".png"];

/// Everything extracted from one HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    /// Absolute outbound link URLs, in document order, deduplicated
    pub links: Vec<String>,
    /// Text segments joined with newlines
    pub body_text: String,
    /// `<html lang>` value
    pub language: Option<String>,
    /// `og:type`
    pub page_type: Option<String>,
    /// `<meta name|property=... content=...>` pairs
    pub metadata: HashMap<String, String>,
    pub is_paywalled: bool,
}

/// Parse a page. Relative links are resolved against `base`.
pub fn parse_html(html: &str, base: &Url, paywall: Option<&PaywallFilter>) -> ParsedPage {
    let document = Html::parse_document(html);

    let mut page = ParsedPage::default();
    let mut seen_links = HashSet::new();
    let mut body_text: Vec<String> = Vec::new();
    let mut title: Option<String> = None;

    for node in document.tree.root().descendants() {
        match node.value() {
            Node::Element(element) => {
                match paywall {
                    Some(PaywallFilter::LdJson) => {
                        if element.name() == "script"
                            && element.attr("type") == Some("application/ld+json")
                        {
                            let json: String = node
                                .children()
                                .filter_map(|c| c.value().as_text().map(|t| (&**t).to_owned()))
                                .collect();
                            page.is_paywalled |= ld_json_is_paywalled(&json);
                        }
                    }
                    Some(PaywallFilter::Classes { classes }) => {
                        if element.classes().any(|c| classes.iter().any(|p| p == c)) {
                            page.is_paywalled = true;
                        }
                    }
                    Some(PaywallFilter::Ids { ids }) => {
                        if let Some(id) = element.id() {
                            if ids.iter().any(|p| p == id) {
                                page.is_paywalled = true;
                            }
                        }
                    }
                    None => {}
                }

                match element.name() {
                    "a" => {
                        if let Some(link) = element.attr("href").and_then(|href| resolve_href(href, base)) {
                            if seen_links.insert(link.clone()) {
                                page.links.push(link);
                            }
                        }
                    }
                    "meta" => {
                        let key = element.attr("name").or_else(|| element.attr("property"));
                        if let (Some(key), Some(content)) = (key, element.attr("content")) {
                            page.metadata.insert(key.to_string(), content.to_string());
                        }
                    }
                    "html" => {
                        if let Some(lang) = element.attr("lang") {
                            page.language = Some(lang.to_string());
                        }
                    }
                    _ => {}
                }
            }
            Node::Text(text) => {
                let parent_tag = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| e.name().to_string()));
                match parent_tag.as_deref() {
                    Some(tag) if TEXT_TAGS.contains(&tag) => {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            body_text.push(trimmed.to_string());
                        }
                    }
                    Some("title") if title.is_none() => {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            title = Some(trimmed.to_string());
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    page.body_text = body_text.join("\n");
    page.page_type = page.metadata.get("og:type").cloned();
    if let Some(title) = title {
        page.metadata.entry("title".to_string()).or_insert(title);
    }
    page
}

/// Resolve an anchor href to an absolute http(s) URL, or skip it
fn resolve_href(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href == "." {
        return None;
    }
    let lower = href.to_lowercase();
    if lower.starts_with("mailto:") || lower.starts_with("javascript:") || lower.starts_with("tel:") {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    let path = url.path().to_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return None;
    }
    Some(url.to_string())
}

/// Paywalled when any `isAccessibleForFree` in the block says not free
fn ld_json_is_paywalled(json: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) => find_accessible_for_free(&value) == Some(false),
        Err(e) => {
            tracing::debug!("Ignoring unparseable ld+json block: {}", e);
            false
        }
    }
}

fn find_accessible_for_free(value: &serde_json::Value) -> Option<bool> {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            if let Some(flag) = map.get("isAccessibleForFree") {
                match flag {
                    Value::Bool(b) => return Some(*b),
                    // any string other than "false" means free
                    Value::String(s) => return Some(!s.trim().eq_ignore_ascii_case("false")),
                    _ => {}
                }
            }
            let mut result = None;
            for nested in map.values() {
                match find_accessible_for_free(nested) {
                    Some(false) => return Some(false),
                    Some(true) => result = Some(true),
                    None => {}
                }
            }
            result
        }
        Value::Array(items) => {
            let mut result = None;
            for item in items {
                match find_accessible_for_free(item) {
                    Some(false) => return Some(false),
                    Some(true) => result = Some(true),
                    None => {}
                }
            }
            result
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.elpais.com/internacional/").unwrap()
    }

    const PAGE: &str = r##"
        <!DOCTYPE html>
        <html lang="es-ES">
        <head>
            <title>Titular de prueba</title>
            <meta property="og:type" content="article">
            <meta property="og:title" content="Titular">
            <meta name="description" content="Resumen">
            <script>var ignored = "no soy texto";</script>
        </head>
        <body>
            <h1>Gran noticia</h1>
            <div>texto suelto fuera de etiquetas</div>
            <p>Primer párrafo. <strong>Importante</strong></p>
            <a href="/deportes/futbol">Fútbol</a>
            <a href="https://otro.com/nota#comentarios">Otro</a>
            <a href="#arriba">Arriba</a>
            <a href=".">Aquí</a>
            <a href="/foto.JPG">Foto</a>
            <a href="mailto:redaccion@elpais.com">Correo</a>
            <a href="/deportes/futbol">Repetido</a>
        </body>
        </html>
    "##;

    #[test]
    fn extracts_links_metadata_language_and_text() {
        let page = parse_html(PAGE, &base(), None);

        assert_eq!(page.language.as_deref(), Some("es-ES"));
        assert_eq!(page.page_type.as_deref(), Some("article"));
        assert_eq!(page.metadata.get("og:title").map(String::as_str), Some("Titular"));
        assert_eq!(page.metadata.get("description").map(String::as_str), Some("Resumen"));
        assert_eq!(page.metadata.get("title").map(String::as_str), Some("Titular de prueba"));

        assert_eq!(
            page.links,
            vec![
                "https://www.elpais.com/deportes/futbol".to_string(),
                "https://otro.com/nota".to_string(),
            ]
        );

        assert_eq!(
            page.body_text,
            "Gran noticia\nPrimer párrafo.\nImportante\nFútbol\nOtro\nArriba\nAquí\nFoto\nCorreo\nRepetido"
        );
        assert!(!page.body_text.contains("no soy texto"));
        assert!(!page.body_text.contains("texto suelto"));
        assert!(!page.is_paywalled);
    }

    #[test]
    fn paywall_by_class() {
        let filter = PaywallFilter::Classes {
            classes: vec!["premium".to_string()],
        };
        let html = r#"<html><body><div class="article premium"><p>x</p></div></body></html>"#;
        assert!(parse_html(html, &base(), Some(&filter)).is_paywalled);

        let html = r#"<html><body><div class="article premium-teaser"><p>x</p></div></body></html>"#;
        assert!(!parse_html(html, &base(), Some(&filter)).is_paywalled);
    }

    #[test]
    fn paywall_by_id() {
        let filter = PaywallFilter::Ids {
            ids: vec!["paywall".to_string()],
        };
        let html = r#"<html><body><section id="paywall"></section></body></html>"#;
        assert!(parse_html(html, &base(), Some(&filter)).is_paywalled);
        let html = r#"<html><body><section class="paywall"></section></body></html>"#;
        assert!(!parse_html(html, &base(), Some(&filter)).is_paywalled);
    }

    #[test]
    fn paywall_by_ld_json() {
        let filter = PaywallFilter::LdJson;
        let locked = r#"<html><head><script type="application/ld+json">
            {"@type": "NewsArticle", "isAccessibleForFree": false}
        </script></head><body></body></html>"#;
        assert!(parse_html(locked, &base(), Some(&filter)).is_paywalled);

        let locked_str = r#"<html><head><script type="application/ld+json">
            [{"@graph": [{"isAccessibleForFree": "False"}]}]
        </script></head></html>"#;
        assert!(parse_html(locked_str, &base(), Some(&filter)).is_paywalled);

        let free = r#"<html><head><script type="application/ld+json">
            {"isAccessibleForFree": "True"}
        </script></head></html>"#;
        assert!(!parse_html(free, &base(), Some(&filter)).is_paywalled);

        let broken = r#"<html><head><script type="application/ld+json">{ nope</script></head></html>"#;
        assert!(!parse_html(broken, &base(), Some(&filter)).is_paywalled);
    }

    #[test]
    fn only_configured_strategy_is_evaluated() {
        // LD+JSON says locked, but the source is configured for class matching
        let html = r#"<html><head><script type="application/ld+json">
            {"isAccessibleForFree": false}
        </script></head><body><div class="free"></div></body></html>"#;
        let filter = PaywallFilter::Classes {
            classes: vec!["premium".to_string()],
        };
        assert!(!parse_html(html, &base(), Some(&filter)).is_paywalled);
        assert!(!parse_html(html, &base(), None).is_paywalled);
    }
}
