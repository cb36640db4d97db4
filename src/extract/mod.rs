use crate::types::BodyPart;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Body text pulled out of a MIME part tree.
#[derive(Clone, Debug, Default)]
pub struct ExtractedContent {
    pub text: Option<String>,
    pub html: Option<String>,
}

impl ExtractedContent {
    /// Plain text if present, otherwise HTML rendered down to text.
    pub fn best_text(&self) -> String {
        if let Some(text) = &self.text {
            if !text.trim().is_empty() {
                return text.clone();
            }
        }
        if let Some(html) = &self.html {
            return html2text::from_read(html.as_bytes(), 100)
                .unwrap_or_default();
        }
        String::new()
    }
}

/// Walks the part tree iteratively (no recursion, arbitrary nesting depth)
/// and keeps the first text/plain and first text/html leaf encountered in
/// document order.
pub fn extract_bodies(root: &BodyPart) -> ExtractedContent {
    let mut out = ExtractedContent::default();
    let mut stack = vec![root];

    while let Some(part) = stack.pop() {
        match part {
            BodyPart::Container { children } => {
                // Reverse push so children are visited in document order.
                for child in children.iter().rev() {
                    stack.push(child);
                }
            }
            BodyPart::Leaf { mime_type, data } => {
                let mime = mime_type.to_ascii_lowercase();
                if mime.starts_with("text/plain") && out.text.is_none() {
                    out.text = Some(String::from_utf8_lossy(data).into_owned());
                } else if mime.starts_with("text/html") && out.html.is_none() {
                    out.html = Some(String::from_utf8_lossy(data).into_owned());
                }
                if out.text.is_some() && out.html.is_some() {
                    break;
                }
            }
        }
    }

    out
}

static ANGLE_TARGET: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]+)>").unwrap());
static MAILTO_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"mailto:[^,>\s]+").unwrap());
static BODY_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).unwrap());
static UNSUB_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)unsubscribe|opt[-_]?out|preferences").unwrap());

/// Collects unsubscribe targets from the List-Unsubscribe header and the
/// message bodies. Header targets come first, then body links, each in
/// encounter order with duplicates removed. `mailto:` targets are kept;
/// the automation layer decides whether to act on them.
pub fn harvest_unsubscribe_urls(
    list_unsubscribe_header: Option<&str>,
    content: &ExtractedContent,
) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    if let Some(header) = list_unsubscribe_header {
        for cap in ANGLE_TARGET.captures_iter(header) {
            let target = cap[1].trim().to_string();
            if !target.is_empty() && seen.insert(target.clone()) {
                out.push(target);
            }
        }
        // Some senders omit the angle brackets around mailto targets.
        for m in MAILTO_TOKEN.find_iter(header) {
            let target = m.as_str().to_string();
            if seen.insert(target.clone()) {
                out.push(target);
            }
        }
    }

    for body in [content.html.as_deref(), content.text.as_deref()]
        .into_iter()
        .flatten()
    {
        for m in BODY_URL.find_iter(body) {
            let url = m
                .as_str()
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | ')' | ']' | ';'))
                .to_string();
            if UNSUB_HINT.is_match(&url) && seen.insert(url.clone()) {
                out.push(url);
            }
        }
    }

    out
}
