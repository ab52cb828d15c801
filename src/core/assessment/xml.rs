//! Minimal element/attribute access for the provider's XML dialect.
//!
//! The scoring payload is a small, attribute-heavy document with no mixed
//! content, so the parser only needs to locate elements by tag (pairing
//! nested open/close tags of the same name) and read their attributes.
//! Scoring code goes through [`find_elements`] and [`Element::attr`] only.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(/?)([A-Za-z_][\w\-.:]*)((?:[^>"']|"[^"]*"|'[^']*')*?)(/?)>"#)
        .expect("tag pattern is valid")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][\w\-.:]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

/// One element located in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    tag: &'a str,
    attributes: &'a str,
    body: &'a str,
}

impl<'a> Element<'a> {
    pub fn tag(&self) -> &'a str {
        self.tag
    }

    /// Inner XML between the open and close tags (empty when self-closing).
    pub fn body(&self) -> &'a str {
        self.body
    }

    /// Attribute value with XML entities decoded.
    pub fn attr(&self, name: &str) -> Option<String> {
        ATTR_RE.captures_iter(self.attributes).find_map(|caps| {
            if &caps[1] != name {
                return None;
            }
            caps.get(2)
                .or_else(|| caps.get(3))
                .map(|m| unescape(m.as_str()))
        })
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Attribute parsed as a number; absent or malformed values yield `None`.
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attr(name)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    /// Attribute parsed as an unsigned bitmask.
    pub fn attr_u32(&self, name: &str) -> Option<u32> {
        self.attr(name).and_then(|v| v.trim().parse::<u32>().ok())
    }

    /// Descendants with the given tag, in document order.
    pub fn descendants(&self, tag: &str) -> Vec<Element<'a>> {
        find_elements(self.body, tag)
    }
}

struct Token<'a> {
    closing: bool,
    self_closing: bool,
    name: &'a str,
    attributes: &'a str,
    start: usize,
    end: usize,
}

fn tokens(xml: &str) -> Vec<Token<'_>> {
    TAG_RE
        .captures_iter(xml)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Token {
                closing: !caps[1].is_empty(),
                self_closing: !caps[4].is_empty(),
                name: caps.get(2)?.as_str(),
                attributes: caps.get(3).map_or("", |m| m.as_str()),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Every element named `tag` in `xml`, outermost first, in document order.
///
/// Nested elements sharing the tag name are returned as separate entries.
/// An open tag without a matching close runs to the end of the input.
pub fn find_elements<'a>(xml: &'a str, tag: &str) -> Vec<Element<'a>> {
    let tokens = tokens(xml);
    let mut elements = Vec::new();

    for (i, open) in tokens.iter().enumerate() {
        if open.closing || open.name != tag {
            continue;
        }

        if open.self_closing {
            elements.push(Element {
                tag: open.name,
                attributes: open.attributes,
                body: "",
            });
            continue;
        }

        let mut depth = 0usize;
        let mut body_end = xml.len();
        for token in &tokens[i + 1..] {
            if token.name != tag || token.self_closing {
                continue;
            }
            if token.closing {
                if depth == 0 {
                    body_end = token.start;
                    break;
                }
                depth -= 1;
            } else {
                depth += 1;
            }
        }

        elements.push(Element {
            tag: open.name,
            attributes: open.attributes,
            body: &xml[open.end..body_end],
        });
    }

    elements
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
