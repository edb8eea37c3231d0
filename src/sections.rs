use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::browser::{PageSession, LINK_BODY_WAIT_TIMEOUT, LINK_NAV_TIMEOUT};

/// Containers shorter than this are navigation links and button labels that
/// happen to contain a keyword, not content.
pub const MIN_BLOCK_LEN: usize = 80;
/// Cap on any returned block.
pub const MAX_BLOCK_LEN: usize = 2500;

static ABOUT_KEYWORDS: &[&str] = &["about", "our story", "who we are"];
static SERVICES_KEYWORDS: &[&str] = &["services", "treatments", "what we offer"];
static TEAM_KEYWORDS: &[&str] = &["team", "meet the team", "our team"];
static CONTACT_KEYWORDS: &[&str] = &["contact", "get in touch", "contact us"];

/// The four-topic extraction result. Absent topics serialize as `null`,
/// never as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sections {
    pub about: Option<String>,
    pub services: Option<String>,
    pub team: Option<String>,
    pub contact: Option<String>,
}

/// Extract all four topics from a rendered document.
///
/// The document is scanned once for every topic before the live session is
/// touched: the services follow-navigation replaces the page, so it must be
/// the last read. Fallback failures degrade to `None`, they never propagate.
pub async fn extract_sections(html: &str, session: &dyn PageSession, base_url: &str) -> Sections {
    let scan = scan_document(html);
    let mut sections = scan.sections;

    // Services content disproportionately lives on a dedicated sub-page;
    // this topic alone gets the heavier fallback.
    if sections.services.is_none() {
        if let Some(href) = scan.services_href {
            sections.services = follow_services_link(session, base_url, &href).await;
        }
    }

    sections
}

struct DocumentScan {
    sections: Sections,
    services_href: Option<String>,
}

/// Single synchronous pass over the rendered document. Parsing stays inside
/// this function so no document handle is ever held across an await.
fn scan_document(html: &str) -> DocumentScan {
    let doc = Html::parse_document(html);

    let mut sections = Sections {
        about: find_block(&doc, ABOUT_KEYWORDS),
        services: find_block(&doc, SERVICES_KEYWORDS),
        team: find_block(&doc, TEAM_KEYWORDS),
        contact: find_block(&doc, CONTACT_KEYWORDS),
    };

    let services_href = if sections.services.is_none() {
        find_link_href(&doc, SERVICES_KEYWORDS)
    } else {
        None
    };

    if sections.about.is_none() {
        sections.about = meta_description(&doc);
    }

    DocumentScan {
        sections,
        services_href,
    }
}

/// First element in document order whose own text contains a keyword, bubbled
/// up to the nearest grouping ancestor with enough visible text. No scoring;
/// first sufficiently-long match wins.
pub fn find_block(doc: &Html, keywords: &[&str]) -> Option<String> {
    for node in doc.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        if matches!(element.value().name(), "script" | "style" | "noscript") {
            continue;
        }

        let own_text: String = node
            .children()
            .filter_map(|child| child.value().as_text().map(|t| &**t))
            .collect();
        if !matches_keywords(&own_text, keywords) {
            continue;
        }

        let container = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| matches!(a.value().name(), "section" | "div" | "article" | "main"))
            .unwrap_or(element);

        let text = collapse_whitespace(container.text());
        if text.chars().count() >= MIN_BLOCK_LEN {
            return Some(truncate_chars(text, MAX_BLOCK_LEN));
        }
    }
    None
}

/// Navigate the live session to the first link whose visible text matches a
/// services keyword and re-run the block scan there. Any failure yields
/// `None`.
async fn follow_services_link(
    session: &dyn PageSession,
    base_url: &str,
    href: &str,
) -> Option<String> {
    if href.starts_with('#') {
        // An in-page anchor cannot usefully be re-rendered as a new document.
        return None;
    }
    let target = Url::parse(base_url).ok()?.join(href).ok()?;

    println!("🔗 Following services link: {}", target);
    let html = match session
        .goto(target.as_str(), LINK_NAV_TIMEOUT, LINK_BODY_WAIT_TIMEOUT)
        .await
    {
        Ok(html) => html,
        Err(e) => {
            eprintln!("⚠️ Services link navigation failed: {}", e);
            return None;
        }
    };

    let doc = Html::parse_document(&html);
    find_block(&doc, SERVICES_KEYWORDS)
}

fn find_link_href(doc: &Html, keywords: &[&str]) -> Option<String> {
    let link_sel = Selector::parse("a[href]").unwrap();
    doc.select(&link_sel)
        .find(|a| matches_keywords(&collapse_whitespace(a.text()), keywords))
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
}

/// `about` fallback: a description meta tag long enough to stand in for an
/// on-page block. Plain `description` first, then Open Graph.
fn meta_description(doc: &Html) -> Option<String> {
    let meta_sel = Selector::parse("meta").unwrap();

    for el in doc.select(&meta_sel) {
        let Some(name) = el.value().attr("name") else {
            continue;
        };
        if name.eq_ignore_ascii_case("description") {
            if let Some(content) = qualified_meta_content(el) {
                return Some(content);
            }
        }
    }

    for el in doc.select(&meta_sel) {
        if el.value().attr("property") == Some("og:description") {
            if let Some(content) = qualified_meta_content(el) {
                return Some(content);
            }
        }
    }

    None
}

fn qualified_meta_content(el: ElementRef) -> Option<String> {
    let content = el.value().attr("content")?.trim();
    if content.chars().count() >= MIN_BLOCK_LEN {
        Some(content.to_string())
    } else {
        None
    }
}

fn matches_keywords(text: &str, keywords: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k))
}

fn collapse_whitespace<'a, I>(parts: I) -> String
where
    I: Iterator<Item = &'a str>,
{
    let mut raw = String::new();
    for part in parts {
        raw.push_str(part);
        raw.push(' ');
    }
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: String, max: usize) -> String {
    if text.chars().count() <= max {
        text
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records follow-navigations and serves canned documents.
    struct FakeSession {
        calls: Mutex<Vec<String>>,
        pages: Vec<(String, String)>,
    }

    impl FakeSession {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                pages: pages
                    .iter()
                    .map(|(u, h)| (u.to_string(), h.to_string()))
                    .collect(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSession for FakeSession {
        async fn goto(
            &self,
            url: &str,
            _nav_timeout: Duration,
            _body_timeout: Duration,
        ) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.pages.iter().find(|(u, _)| u == url) {
                Some((_, html)) => Ok(html.clone()),
                None => anyhow::bail!("net::ERR_NAME_NOT_RESOLVED"),
            }
        }
    }

    fn parse(html: &str) -> Html {
        Html::parse_document(html)
    }

    #[test]
    fn find_block_skips_short_containers() {
        let html = format!(
            "<html><body>\
             <div>About {}</div>\
             <div>About our story {}</div>\
             </body></html>",
            "x".repeat(73),
            "y".repeat(120),
        );
        let block = find_block(&parse(&html), ABOUT_KEYWORDS).expect("expected a match");
        assert!(block.contains("yyy"), "should have skipped the 79-char container");
    }

    #[test]
    fn find_block_takes_first_match_in_document_order() {
        let html = format!(
            "<html><body>\
             <div>Contact us first {}</div>\
             <div>Contact us second {}</div>\
             </body></html>",
            "a".repeat(100),
            "b".repeat(100),
        );
        let block = find_block(&parse(&html), CONTACT_KEYWORDS).unwrap();
        assert!(block.contains("first"));
        assert!(!block.contains("second"));
    }

    #[test]
    fn find_block_caps_at_max_length() {
        let html = format!(
            "<html><body><div>About {}</div></body></html>",
            "z".repeat(3000)
        );
        let block = find_block(&parse(&html), ABOUT_KEYWORDS).unwrap();
        assert_eq!(block.chars().count(), MAX_BLOCK_LEN);
        assert!(block.starts_with("About"));
    }

    #[test]
    fn find_block_bubbles_to_grouping_ancestor() {
        let html = format!(
            "<html><body><section><h2>Our Team</h2><p>{}</p></section></body></html>",
            "The people behind the product. ".repeat(5)
        );
        let block = find_block(&parse(&html), TEAM_KEYWORDS).unwrap();
        assert!(block.starts_with("Our Team"));
        assert!(block.contains("people behind the product"));
    }

    #[test]
    fn find_block_collapses_whitespace() {
        let html = format!(
            "<html><body><div><h2>Get in touch</h2><p>Call   us\n\n  anytime. {}</p></div></body></html>",
            "w".repeat(100)
        );
        let block = find_block(&parse(&html), CONTACT_KEYWORDS).unwrap();
        assert!(block.starts_with("Get in touch Call us anytime."));
    }

    #[test]
    fn find_block_ignores_script_text() {
        let html = format!(
            "<html><body>\
             <div><script>var aboutConfig = \"{}\";</script></div>\
             </body></html>",
            "s".repeat(200)
        );
        assert_eq!(find_block(&parse(&html), ABOUT_KEYWORDS), None);
    }

    #[tokio::test]
    async fn about_falls_back_to_meta_description() {
        let html = format!(
            "<html><head><meta name=\"Description\" content=\"{}\"></head>\
             <body><p>Welcome to our landing page, nothing to see here.</p></body></html>",
            "A company that builds reliable plumbing for the modern web, since 1999. ".repeat(2)
        );
        let session = FakeSession::new(&[]);
        let sections = extract_sections(&html, &session, "http://example.org").await;
        assert!(sections.about.as_ref().unwrap().contains("reliable plumbing"));
    }

    #[tokio::test]
    async fn about_falls_back_to_og_description_when_meta_is_short() {
        let html = format!(
            "<html><head>\
             <meta name=\"description\" content=\"too short\">\
             <meta property=\"og:description\" content=\"{}\">\
             </head><body></body></html>",
            "An open graph description long enough to qualify as a block of content. ".repeat(2)
        );
        let session = FakeSession::new(&[]);
        let sections = extract_sections(&html, &session, "http://example.org").await;
        assert!(sections.about.as_ref().unwrap().contains("open graph"));
    }

    #[tokio::test]
    async fn about_is_null_without_block_or_meta() {
        let html = "<html><body><p>Plain landing page with no descriptive markup.</p></body></html>";
        let session = FakeSession::new(&[]);
        let sections = extract_sections(html, &session, "http://example.org").await;
        assert_eq!(sections.about, None);
    }

    #[tokio::test]
    async fn services_follows_qualifying_link() {
        let main = "<html><body><nav><a href=\"/services.html\">Our Services</a></nav></body></html>";
        let followed = format!(
            "<html><body><div><h2>What we offer</h2><p>{}</p></div></body></html>",
            "Design, build and run support for small teams. ".repeat(3)
        );
        let session = FakeSession::new(&[("http://example.org/services.html", &followed)]);

        let sections = extract_sections(main, &session, "http://example.org").await;

        assert_eq!(session.calls(), ["http://example.org/services.html"]);
        assert!(sections.services.as_ref().unwrap().contains("What we offer"));
    }

    #[tokio::test]
    async fn services_abandons_in_page_anchor() {
        let main = "<html><body><a href=\"#services\">Our Services</a></body></html>";
        let session = FakeSession::new(&[]);

        let sections = extract_sections(main, &session, "http://example.org").await;

        assert_eq!(sections.services, None);
        assert!(session.calls().is_empty(), "anchor must not be followed");
    }

    #[tokio::test]
    async fn services_degrades_to_null_on_navigation_failure() {
        let main = "<html><body><a href=\"/services\">Our Services</a></body></html>";
        let session = FakeSession::new(&[]);

        let sections = extract_sections(main, &session, "http://example.org").await;

        assert_eq!(session.calls(), ["http://example.org/services"]);
        assert_eq!(sections.services, None);
    }

    #[tokio::test]
    async fn other_topics_read_the_original_document() {
        let main = format!(
            "<html><body>\
             <div><h2>Contact us</h2><p>{}</p></div>\
             <a href=\"/services\">Our Services</a>\
             </body></html>",
            "Reach the office by mail, phone or pigeon at any hour. ".repeat(2)
        );
        let followed = format!(
            "<html><body>\
             <div><h2>What we offer</h2><p>{}</p></div>\
             <div><h2>Contact us</h2><p>{}</p></div>\
             </body></html>",
            "Consulting retainers. ".repeat(6),
            "A different contact block that must not win. ".repeat(3)
        );
        let session = FakeSession::new(&[("http://example.org/services", &followed)]);

        let sections = extract_sections(&main, &session, "http://example.org").await;

        assert!(sections.contact.as_ref().unwrap().contains("pigeon"));
        assert!(sections.services.as_ref().unwrap().contains("Consulting"));
    }

    #[tokio::test]
    async fn extraction_is_idempotent_without_session_access() {
        let html = format!(
            "<html><body>\
             <div><h2>Meet the team</h2><p>{}</p></div>\
             <a href=\"/services\">Our Services</a>\
             </body></html>",
            "Four engineers and a dog. ".repeat(5)
        );
        let session = FakeSession::new(&[]);

        let first = extract_sections(&html, &session, "http://example.org").await;
        let second = extract_sections(&html, &session, "http://example.org").await;

        assert_eq!(first, second);
    }
}
