use chrono::DateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

use crate::storage::{FeedType, NewEntry};

/// `pubDate` layouts accepted for RSS after the weekday is removed, tried in
/// order: RFC 1123 with a numeric zone, then the same without the leading
/// zero on the day.
const RSS_DATE_FORMATS: [&str; 2] = ["%d %b %Y %H:%M:%S %z", "%e %b %Y %H:%M:%S %z"];

/// The weekday must be one of these but is not checked against the date.
const RSS_WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Maximum element nesting depth accepted in a feed document.
/// Guards against pathological documents built to exhaust memory.
const MAX_DEPTH: usize = 64;

/// A feed document that could not be turned into entries.
#[derive(Debug, Error)]
#[error("could not parse feed {url}: {kind}")]
pub struct ParseError {
    /// URL of the feed the document was fetched from
    pub url: String,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// Malformed XML (syntax, bad escape, bad attribute).
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The root element does not match the feed format.
    #[error("expected <{expected}> root element, found <{found}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    /// The document contains no element at all.
    #[error("document has no root element")]
    MissingRoot,

    /// The document ended before every element was closed.
    #[error("document ended before the root element was closed")]
    Truncated,

    #[error("nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// A date field is missing or in an unsupported layout.
    #[error("invalid {field} date {value:?}")]
    Date { field: &'static str, value: String },
}

impl ParseErrorKind {
    /// The format whose root element was found instead of the expected one,
    /// if it is a feed root at all.
    pub fn found_format(&self) -> Option<FeedType> {
        let ParseErrorKind::UnexpectedRoot { found, .. } = self else {
            return None;
        };
        let local = found.rsplit(':').next().unwrap_or(found.as_str());
        match local {
            "rss" => Some(FeedType::Rss),
            "feed" => Some(FeedType::Atom),
            _ => None,
        }
    }
}

/// Decode a feed document into entries, in document order.
///
/// # Errors
///
/// Any XML error, a root element that does not match `feed_type`, or a single
/// entry with an unparseable date fails the whole document.
pub fn parse_feed(body: &[u8], feed_type: FeedType, url: &str) -> Result<Vec<NewEntry>, ParseError> {
    let result = match feed_type {
        FeedType::Rss => parse_rss(body),
        FeedType::Atom => parse_atom(body),
    };

    match result {
        Ok(entries) => {
            tracing::debug!(url = %url, feed_type = %feed_type, entries = entries.len(), "Parsed feed");
            Ok(entries)
        }
        Err(kind) => Err(ParseError {
            url: url.to_string(),
            kind,
        }),
    }
}

fn parse_rss(body: &[u8]) -> Result<Vec<NewEntry>, ParseErrorKind> {
    collect_items(body, "rss", "item")?
        .iter()
        .map(rss_entry)
        .collect()
}

fn rss_entry(item: &RawItem) -> Result<NewEntry, ParseErrorKind> {
    let published_at = parse_rss_date(item.field("pubDate"))?;
    let link = item.field("link").trim();
    let title = item.field("title").to_string();

    Ok(NewEntry {
        guid: entry_guid(item.field("guid"), link, &title, published_at),
        url: link.to_string(),
        title,
        description: item.field("description").to_string(),
        published_at,
    })
}

fn parse_atom(body: &[u8]) -> Result<Vec<NewEntry>, ParseErrorKind> {
    collect_items(body, "feed", "entry")?
        .iter()
        .map(atom_entry)
        .collect()
}

fn atom_entry(item: &RawItem) -> Result<NewEntry, ParseErrorKind> {
    let published_at = match item.fields.get("updated") {
        Some(updated) => parse_atom_date("updated", updated)?,
        None => parse_atom_date("published", item.field("published"))?,
    };
    let link = pick_atom_link(&item.links).unwrap_or("");
    let title = item.field("title").to_string();

    let content = item.field("content").trim();
    let description = if content.is_empty() {
        item.field("summary").trim()
    } else {
        content
    };

    Ok(NewEntry {
        guid: entry_guid(item.field("id"), link, &title, published_at),
        url: link.to_string(),
        title,
        description: description.to_string(),
        published_at,
    })
}

fn parse_rss_date(value: &str) -> Result<i64, ParseErrorKind> {
    let invalid = || ParseErrorKind::Date {
        field: "pubDate",
        value: value.to_string(),
    };

    let (weekday, rest) = value.trim().split_once(", ").ok_or_else(invalid)?;
    if !RSS_WEEKDAYS.iter().any(|day| day.eq_ignore_ascii_case(weekday)) {
        return Err(invalid());
    }

    RSS_DATE_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(rest, format).ok())
        .map(|dt| dt.timestamp())
        .ok_or_else(invalid)
}

fn parse_atom_date(field: &'static str, value: &str) -> Result<i64, ParseErrorKind> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.timestamp())
        .map_err(|_| ParseErrorKind::Date {
            field,
            value: value.to_string(),
        })
}

/// The feed's own identifier if it has one, else the entry link.
///
/// Entries with neither get a SHA-256 of title and date so they still
/// deduplicate across syncs without colliding on an empty guid.
fn entry_guid(id: &str, link: &str, title: &str, published_at: i64) -> String {
    let id = id.trim();
    if !id.is_empty() {
        return id.to_string();
    }

    let link = link.trim();
    if !link.is_empty() {
        return link.to_string();
    }

    let input = format!("|{}|{}", title, published_at);
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// First `rel="alternate"` (or rel-less) link, falling back to the first link.
fn pick_atom_link(links: &[RawLink]) -> Option<&str> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.trim())
}

// ============================================================================
// Event-level decoding
// ============================================================================

#[derive(Debug)]
struct RawLink {
    href: String,
    rel: Option<String>,
}

/// Direct children of one `<item>`/`<entry>`, keyed by element name.
#[derive(Debug, Default)]
struct RawItem {
    fields: HashMap<String, String>,
    links: Vec<RawLink>,
}

impl RawItem {
    fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Walk the document and gather every `item` element below `root`.
///
/// Text and CDATA of a direct child are concatenated, including text of
/// nested markup (Atom `type="xhtml"` content). When a child appears twice the
/// first occurrence wins. `<link href=...>` children are kept separately.
///
/// A child is keyed by its local name when it shares the root element's
/// prefix and by its qualified name otherwise, so `<atom:title>` in an
/// `<atom:feed>` is `title` while `<media:title>` stays `media:title`.
fn collect_items(
    body: &[u8],
    root: &'static str,
    item: &'static str,
) -> Result<Vec<RawItem>, ParseErrorKind> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();

    let mut items = Vec::new();
    let mut depth: usize = 0;
    let mut seen_root = false;
    let mut root_prefix: Option<Vec<u8>> = None;
    let mut current: Option<RawItem> = None;
    let mut item_depth: usize = 0;
    // (key, depth) of the child element whose text is being captured
    let mut field: Option<(String, usize)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(ParseErrorKind::MaxDepthExceeded(MAX_DEPTH));
                }

                if !seen_root {
                    check_root(&e, root)?;
                    root_prefix = prefix_of(&e);
                    seen_root = true;
                } else if let Some(raw) = current.as_mut() {
                    if depth == item_depth + 1 {
                        if e.local_name().as_ref() == b"link" {
                            push_link(raw, &e, &reader)?;
                        }
                        field = Some((element_key(&e, root_prefix.as_deref()), depth));
                        text.clear();
                    }
                } else if e.local_name().as_ref() == item.as_bytes() {
                    current = Some(RawItem::default());
                    item_depth = depth;
                }
            }
            Event::Empty(e) => {
                if !seen_root {
                    check_root(&e, root)?;
                    seen_root = true;
                } else if let Some(raw) = current.as_mut() {
                    if depth == item_depth && e.local_name().as_ref() == b"link" {
                        push_link(raw, &e, &reader)?;
                    }
                }
            }
            Event::Text(e) => {
                if field.is_some() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                if matches!(&field, Some((_, d)) if *d == depth) {
                    if let (Some((key, _)), Some(raw)) = (field.take(), current.as_mut()) {
                        raw.fields
                            .entry(key)
                            .or_insert_with(|| std::mem::take(&mut text));
                    }
                } else if depth == item_depth {
                    if let Some(raw) = current.take() {
                        items.push(raw);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(ParseErrorKind::MissingRoot);
    }
    if depth > 0 {
        return Err(ParseErrorKind::Truncated);
    }

    Ok(items)
}

fn check_root(e: &BytesStart<'_>, root: &'static str) -> Result<(), ParseErrorKind> {
    if e.local_name().as_ref() == root.as_bytes() {
        Ok(())
    } else {
        Err(ParseErrorKind::UnexpectedRoot {
            expected: root,
            found: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        })
    }
}

fn prefix_of(e: &BytesStart<'_>) -> Option<Vec<u8>> {
    e.name().prefix().map(|p| p.as_ref().to_vec())
}

fn element_key(e: &BytesStart<'_>, root_prefix: Option<&[u8]>) -> String {
    let name = e.name();
    let key = if name.prefix().map(|p| p.into_inner()) == root_prefix {
        e.local_name().into_inner()
    } else {
        name.into_inner()
    };
    String::from_utf8_lossy(key).into_owned()
}

fn push_link(
    raw: &mut RawItem,
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<(), ParseErrorKind> {
    let mut href = None;
    let mut rel = None;

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(attr.decode_and_unescape_value(reader.decoder())?.into_owned()),
            b"rel" => rel = Some(attr.decode_and_unescape_value(reader.decoder())?.into_owned()),
            _ => {}
        }
    }

    // RSS `<link>` carries its URL as text, not as an attribute
    if let Some(href) = href {
        raw.links.push(RawLink { href, rel });
    }
    Ok(())
}
