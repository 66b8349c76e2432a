//! RSS 2.0 bookmark-feed discoverer.
//!
//! Each `<item>` becomes a candidate. Its body goes through the extractor as
//! an html fragment (the description is usually markup), then the feed's own
//! title, link and categories are laid over the result. `pubDate` is kept in
//! metadata. Items without a title or link are skipped and counted. Over HTTP
//! the feed is only re-parsed when its body changed.

use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};
use tracing::{debug, warn};
use url::Url;

use crate::config::SourceConfig;
use crate::discovery::{extract_each, Discoverer, DiscovererBase};
use crate::error::{DiscoveryError, DiscoveryResult, InitError};
use crate::pipeline::cleaner::normalize_text;
use crate::types::{CandidateOpportunity, ContentType, DiscoveryContext, RawContent, SourceType};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    category: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(rename = "$text", default)]
    text: String,
}

enum Mode {
    Fixture(String),
    Http { url: String, base: DiscovererBase },
}

pub struct FeedDiscoverer {
    name: String,
    mode: Mode,
}

/// Parsed items plus how many were dropped as malformed.
#[derive(Debug)]
pub struct FeedParse {
    pub items: Vec<CandidateOpportunity>,
    pub skipped: usize,
}

fn rfc2822_to_rfc3339(ts: &str) -> Option<String> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    dt.to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .ok()
}

/// Named html entities quick-xml rejects, folded to plain text before parsing.
const FEED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&ndash;", "-"),
    ("&mdash;", "-"),
    ("&ldquo;", "\""),
    ("&rdquo;", "\""),
    ("&lsquo;", "'"),
    ("&rsquo;", "'"),
    ("&hellip;", "..."),
    ("&euro;", "EUR "),
    ("&pound;", "GBP "),
];

fn fold_feed_entities(xml: &str) -> String {
    FEED_ENTITIES
        .iter()
        .fold(xml.to_string(), |acc, (entity, plain)| acc.replace(entity, plain))
}

/// Html fragment handed to the extractor for one item.
fn item_document(title: &str, body: &str) -> String {
    format!(
        "<html><body><h1 class=\"opportunity-title\">{}</h1>\
         <div class=\"opportunity-description\">{body}</div></body></html>",
        html_escape::encode_text(title)
    )
}

impl FeedDiscoverer {
    pub fn from_fixture_str(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>, base: DiscovererBase) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                base,
            },
        }
    }

    pub fn parse_feed(name: &str, xml: &str) -> DiscoveryResult<FeedParse> {
        let t0 = std::time::Instant::now();
        let rss: Rss = from_str(&fold_feed_entities(xml))
            .map_err(|e| DiscoveryError::Parse(format!("{name}: rss: {e}")))?;

        struct Kept {
            title: String,
            link: String,
            description: String,
            categories: Vec<String>,
            published_at: Option<String>,
        }

        let mut kept = Vec::with_capacity(rss.channel.item.len());
        let mut raws = Vec::with_capacity(rss.channel.item.len());
        let mut skipped = 0usize;
        for (pos, it) in rss.channel.item.into_iter().enumerate() {
            let title = it.title.as_deref().map(normalize_text).unwrap_or_default();
            let link = it.link.as_deref().map(str::trim).unwrap_or_default().to_string();
            if title.is_empty() || link.is_empty() {
                skipped += 1;
                debug!(target: "discovery", source = name, pos, "feed item without title or link skipped");
                continue;
            }

            let body = it.description.unwrap_or_default();
            let description = Some(normalize_text(&body))
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| title.clone());
            raws.push(RawContent::new(item_document(&title, &body), ContentType::Html).with_url(link.clone()));
            kept.push(Kept {
                title,
                link,
                description,
                categories: it
                    .category
                    .iter()
                    .map(|c| normalize_text(&c.text).to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect(),
                published_at: it.pub_date.as_deref().and_then(rfc2822_to_rfc3339),
            });
        }

        let extracted = extract_each(name, &raws, SourceType::BookmarkFeed);
        let mut items = Vec::with_capacity(kept.len());
        for (k, x) in kept.into_iter().zip(extracted) {
            let mut c = x.unwrap_or_else(|| CandidateOpportunity::new(SourceType::BookmarkFeed));
            c.source_type = SourceType::BookmarkFeed;
            c.title = k.title;
            c.url = k.link;
            c.description = k.description;
            c.tags.extend(k.categories);
            c.source_metadata.insert("feed".into(), name.into());
            if let Some(p) = k.published_at {
                c.source_metadata.insert("published_at".into(), p.into());
            }
            items.push(c);
        }

        histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        if skipped > 0 {
            counter!("pipeline_rejected_total", "stage" => "feed").increment(skipped as u64);
            warn!(target: "discovery", source = name, skipped, "malformed feed items skipped");
        }
        Ok(FeedParse { items, skipped })
    }
}

fn matches_context(c: &CandidateOpportunity, ctx: &DiscoveryContext) -> bool {
    if ctx.search_terms.is_empty() {
        return true;
    }
    let hay = format!("{} {}", c.title, c.description).to_lowercase();
    ctx.search_terms
        .iter()
        .any(|t| hay.contains(&t.to_lowercase()))
}

#[async_trait]
impl Discoverer for FeedDiscoverer {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::BookmarkFeed
    }

    fn default_config(&self) -> SourceConfig {
        SourceConfig {
            rate_limit: 30,
            schedule: Some("every 1h".to_string()),
            ..Default::default()
        }
    }

    async fn initialize(&self) -> Result<(), InitError> {
        match &self.mode {
            Mode::Fixture(_) => Ok(()),
            Mode::Http { url, .. } => Url::parse(url)
                .map(|_| ())
                .map_err(|e| InitError::InvalidConfig(format!("{}: feed_url: {e}", self.name))),
        }
    }

    async fn check_health(&self) -> bool {
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_feed(&self.name, xml).is_ok(),
            Mode::Http { url, .. } => Url::parse(url).is_ok(),
        }
    }

    async fn discover(
        &self,
        context: Option<&DiscoveryContext>,
    ) -> DiscoveryResult<Vec<CandidateOpportunity>> {
        let body = match &self.mode {
            Mode::Fixture(xml) => xml.clone(),
            Mode::Http { url, base } => match base.fetch_if_changed(url).await? {
                Some(b) => b,
                None => return Ok(Vec::new()),
            },
        };

        let mut items = Self::parse_feed(&self.name, &body)?.items;
        if let Some(ctx) = context {
            items.retain(|c| matches_context(c, ctx));
            if let Some(max) = ctx.max_results {
                items.truncate(max);
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Calls</title>
<item><title>Open Call: Harbor Mural</title><link>https://harbor.gov/mural</link>
<description>Budget $20,000 for a public art mural.</description>
<pubDate>Tue, 10 Jun 2025 09:00:00 +0000</pubDate><category>Public Art</category></item>
<item><title></title><link>https://x.org/none</link></item>
<item><title>Film Lab Residency</title><link>https://filmlab.org/r</link>
<description>Two months&nbsp;of editing suites for documentary makers.</description></item>
<item><title>Print Studio Fellowship</title><link>https://inkworks.org/fellowship</link>
<description><![CDATA[<p>A year of press time for printmakers.</p>
<span class="organization">Inkworks Collective</span><span class="location">Leeds, UK</span>]]></description></item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_skips_malformed() {
        let p = FeedDiscoverer::parse_feed("bookmarks", FEED).unwrap();
        assert_eq!(p.skipped, 1);
        assert_eq!(p.items.len(), 3);
        let first = &p.items[0];
        assert_eq!(first.url, "https://harbor.gov/mural");
        assert_eq!(first.amount.as_deref(), Some("$20,000"));
        assert!(first.tags.contains("public art"));
        assert_eq!(
            first.source_metadata.get("published_at").and_then(|v| v.as_str()),
            Some("2025-06-10T09:00:00Z")
        );
        assert_eq!(
            p.items[1].description,
            "Two months of editing suites for documentary makers."
        );
    }

    #[test]
    fn item_markup_goes_through_extraction() {
        let p = FeedDiscoverer::parse_feed("bookmarks", FEED).unwrap();
        let print = &p.items[2];
        assert_eq!(print.title, "Print Studio Fellowship");
        assert_eq!(print.url, "https://inkworks.org/fellowship");
        assert_eq!(print.organization.as_deref(), Some("Inkworks Collective"));
        assert_eq!(print.location.as_deref(), Some("Leeds, UK"));
        assert_eq!(print.source_type, SourceType::BookmarkFeed);
        assert!(!print.description.contains('<'));
    }

    #[test]
    fn garbage_is_parse_error() {
        let err = FeedDiscoverer::parse_feed("b", "<<<not xml").unwrap_err();
        assert!(matches!(err, DiscoveryError::Parse(_)));
    }

    #[tokio::test]
    async fn context_filters_and_caps() {
        let d = FeedDiscoverer::from_fixture_str("bookmarks", FEED);
        let ctx = DiscoveryContext {
            search_terms: vec!["residency".into()],
            ..Default::default()
        };
        let items = d.discover(Some(&ctx)).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Film Lab Residency");

        let capped = DiscoveryContext {
            max_results: Some(1),
            ..Default::default()
        };
        assert_eq!(d.discover(Some(&capped)).await.unwrap().len(), 1);
    }
}
