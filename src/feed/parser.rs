// src/feed/parser.rs
//! Best-effort RSS 2.0 / RSS 1.0 (RDF) / Atom parser.
//!
//! Streams the document with `quick-xml` instead of deserializing into fixed
//! structs, so a feed that breaks half way still yields the entries read before
//! the break. Element names are matched on their local part, lowercased, which
//! folds `dc:date`, `content:encoded` and friends into plain names.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::feed::date::parse_feed_date;
use crate::feed::types::Entry;

#[derive(Debug, thiserror::Error)]
pub enum FeedParseError {
    #[error("document is not an RSS or Atom feed (root element <{0}>)")]
    NotAFeed(String),
    #[error("malformed XML before the feed root: {0}")]
    Malformed(String),
    #[error("document contains no elements")]
    EmptyDocument,
}

/// Raw parse output. The source-level instant is not resolved yet; see
/// [`crate::feed::types::FetchedFeed::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub entries: Vec<Entry>,
    pub warnings: Vec<String>,
}

pub fn parse_feed(xml: &str, fetched_at: DateTime<Utc>) -> Result<ParsedFeed, FeedParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::new(fetched_at);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => state.open(&e)?,
            Ok(Event::Empty(e)) => {
                state.open(&e)?;
                state.close();
            }
            Ok(Event::Text(t)) => {
                let raw = String::from_utf8_lossy(&t.into_inner()).into_owned();
                // HTML entity rules, so `&nbsp;` and friends do not abort the parse.
                state.text(&html_escape::decode_html_entities(&raw));
            }
            Ok(Event::CData(c)) => state.text(&String::from_utf8_lossy(&c.into_inner())),
            Ok(Event::End(_)) => state.close(),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                if !state.root_seen {
                    return Err(FeedParseError::Malformed(e.to_string()));
                }
                state.warn(format!("malformed XML, parsing stopped early: {e}"));
                break;
            }
        }
    }
    state.finish()
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn is_text_field(name: &str) -> bool {
    matches!(
        name,
        "title" | "description" | "summary" | "content" | "encoded"
    )
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

#[derive(Debug, Default)]
struct PendingEntry {
    link: Option<String>,
    id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    published: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
}

impl PendingEntry {
    fn into_entry(self, fetched_at: DateTime<Utc>) -> Entry {
        let link = self.link.or_else(|| {
            self.id
                .as_deref()
                .filter(|id| id.starts_with("http://") || id.starts_with("https://"))
                .map(str::to_string)
        });
        Entry {
            link,
            id: self.id,
            title: self.title.unwrap_or_default(),
            description: self.description.or(self.content),
            published: self.published,
            updated: self.updated,
            created: self.created,
            fetched_at,
        }
    }
}

struct ParseState {
    fetched_at: DateTime<Utc>,
    root_seen: bool,
    stack: Vec<String>,
    buf: String,
    /// Depth of the text field currently being captured; nested markup inside it
    /// (XHTML content) only contributes text.
    capture_depth: Option<usize>,
    entry: Option<PendingEntry>,
    entry_depth: usize,
    title: Option<String>,
    updated: Option<DateTime<Utc>>,
    entries: Vec<Entry>,
    warnings: Vec<String>,
}

impl ParseState {
    fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            root_seen: false,
            stack: Vec::new(),
            buf: String::new(),
            capture_depth: None,
            entry: None,
            entry_depth: 0,
            title: None,
            updated: None,
            entries: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn text(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    /// True while the top of the stack is the open entry element.
    fn at_entry_child(&self) -> bool {
        self.entry.is_some() && self.stack.len() == self.entry_depth + 1
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), FeedParseError> {
        let name = local_name(e.local_name().as_ref());

        if !self.root_seen {
            if !matches!(name.as_str(), "rss" | "feed" | "rdf") {
                return Err(FeedParseError::NotAFeed(name));
            }
            self.root_seen = true;
        }

        if self.capture_depth.is_some() {
            self.stack.push(name);
            return Ok(());
        }

        self.buf.clear();
        match name.as_str() {
            "item" | "entry" if self.entry.is_none() => {
                self.entry = Some(PendingEntry::default());
                self.entry_depth = self.stack.len();
            }
            "link" if self.at_entry_child() => self.atom_link(e),
            _ => {}
        }
        if is_text_field(&name) {
            self.capture_depth = Some(self.stack.len());
        }
        self.stack.push(name);
        Ok(())
    }

    /// Atom carries links as `<link rel=".." href=".."/>`; only the alternate one
    /// points at the article.
    fn atom_link(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(value),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }
        let is_alternate = rel.as_deref().map_or(true, |r| r == "alternate");
        if let (Some(href), true, Some(entry)) = (href, is_alternate, self.entry.as_mut()) {
            if entry.link.is_none() {
                entry.link = non_empty(href);
            }
        }
    }

    fn close(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        if let Some(depth) = self.capture_depth {
            if self.stack.len() > depth {
                return;
            }
            self.capture_depth = None;
        }

        let text = std::mem::take(&mut self.buf);

        if self.entry.is_some() {
            if self.stack.len() == self.entry_depth {
                if let Some(pending) = self.entry.take() {
                    self.entries.push(pending.into_entry(self.fetched_at));
                }
            } else if self.at_entry_child() {
                self.entry_field(&name, text);
            }
            return;
        }

        if self
            .stack
            .last()
            .is_some_and(|parent| parent == "channel" || parent == "feed")
        {
            self.feed_field(&name, text);
        }
    }

    fn date(&mut self, field: &str, raw: &str) -> Option<DateTime<Utc>> {
        if raw.trim().is_empty() {
            return None;
        }
        let parsed = parse_feed_date(raw);
        if parsed.is_none() {
            self.warn(format!("unreadable date {:?} in <{field}>", raw.trim()));
        }
        parsed
    }

    fn entry_field(&mut self, name: &str, text: String) {
        let stamp = match name {
            "pubdate" | "published" | "issued" | "updated" | "modified" | "date" | "created" => {
                self.date(name, &text)
            }
            _ => None,
        };
        let Some(entry) = self.entry.as_mut() else {
            return;
        };
        match name {
            "title" if entry.title.is_none() => entry.title = non_empty(collapse_ws(&text)),
            "link" if entry.link.is_none() => entry.link = non_empty(text),
            "guid" | "id" if entry.id.is_none() => entry.id = non_empty(text),
            "description" | "summary" if entry.description.is_none() => {
                entry.description = non_empty(text)
            }
            "content" | "encoded" if entry.content.is_none() => entry.content = non_empty(text),
            "pubdate" | "published" | "issued" => entry.published = entry.published.or(stamp),
            "updated" | "modified" | "date" => entry.updated = entry.updated.or(stamp),
            "created" => entry.created = entry.created.or(stamp),
            _ => {}
        }
    }

    fn feed_field(&mut self, name: &str, text: String) {
        match name {
            "title" if self.title.is_none() => self.title = non_empty(collapse_ws(&text)),
            "lastbuilddate" | "updated" | "modified" | "date" => {
                let stamp = self.date(name, &text);
                self.updated = self.updated.or(stamp);
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Result<ParsedFeed, FeedParseError> {
        if !self.root_seen {
            return Err(FeedParseError::EmptyDocument);
        }
        if let Some(open) = self.stack.last().cloned() {
            self.warn(format!("document ended inside <{open}>"));
        }
        if self.entry.take().is_some() {
            self.warn("dropped a truncated entry".to_string());
        }
        Ok(ParsedFeed {
            title: self.title,
            updated: self.updated,
            entries: self.entries,
            warnings: self.warnings,
        })
    }
}
