use once_cell::sync::Lazy;
use regex::Regex;

const SUMMARY_MAX: usize = 200;
const SIMPLE_MAX: usize = 180;

static BANNED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(because|indicat|fits?\s+best|given that|therefore|we (decided|classif)|classified|category|best (match|fit)|rationale|reason|this (suggests|indicates)|due to)",
    )
    .unwrap()
});

static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,;]+\S*$").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static FOOTER_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)unsubscribe|opt\s*out|privacy\s*policy|view\s*in\s*browser").unwrap()
});

/// Splits on sentence-ending punctuation followed by whitespace, keeping
/// the punctuation with its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < bytes.len() {
                out.push(&text[start..=i]);
                start = j;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    if start < text.len() {
        out.push(text[start..].trim_end());
    }
    out
}

fn clip_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn truncate_at_boundary(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let clipped = clip_chars(text, max);
    TRAILING_FRAGMENT.replace(clipped, "").into_owned()
}

/// Drops sentences that leak classification reasoning and keeps at most
/// the first two surviving ones, truncated at a word boundary. If every
/// sentence is banned the first original sentence survives so the summary
/// is never empty for non-empty input.
pub fn sanitize_summary(input: Option<&str>) -> Option<String> {
    let input = input?;
    let text = WS.replace_all(input.trim(), " ").into_owned();
    if text.is_empty() {
        return None;
    }

    let sentences = split_sentences(&text);
    let kept: Vec<&str> = sentences
        .iter()
        .copied()
        .filter(|s| !BANNED.is_match(s))
        .collect();

    let mut result = match (kept.first(), kept.get(1)) {
        (Some(first), Some(second)) => format!("{} {}", first, second),
        (Some(first), None) => first.to_string(),
        (None, _) => sentences.first().copied().unwrap_or("").to_string(),
    };
    result = result.trim().to_string();
    Some(truncate_at_boundary(&result, SUMMARY_MAX))
}

/// Rule-based summary used whenever the oracle is unavailable. Pulls a
/// subject-like line plus the first body sentence, with links and list
/// footers stripped out.
pub fn simple_summary(content: &str) -> String {
    let normalized = content.replace('\r', "");
    let lines: Vec<&str> = normalized
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let is_envelope = |l: &str| {
        let lower = l.to_lowercase();
        lower.starts_with("from:") || lower.starts_with("to:")
    };

    let mut subject = lines
        .iter()
        .find(|l| !is_envelope(l))
        .copied()
        .unwrap_or("")
        .to_string();

    let body_joined = lines
        .iter()
        .filter(|l| !is_envelope(l))
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let body = WS
        .replace_all(
            &FOOTER_NOISE.replace_all(&LINK.replace_all(&body_joined, ""), ""),
            " ",
        )
        .trim()
        .to_string();

    let first = split_sentences(&body)
        .into_iter()
        .find(|s| s.len() >= 8)
        .map(str::to_string)
        .unwrap_or_else(|| clip_chars(&body, SIMPLE_MAX).to_string());

    if !subject.is_empty() && first.to_lowercase().starts_with(&subject.to_lowercase()) {
        subject.clear();
    }

    let summary = if subject.is_empty() {
        first
    } else {
        format!("{} — {}", subject, first)
    };
    let summary = WS
        .replace_all(&truncate_at_boundary(&summary, SIMPLE_MAX), " ")
        .trim()
        .to_string();

    if summary.is_empty() {
        "Recent email update".to_string()
    } else {
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_reasoning_sentences() {
        let input = "Your package has shipped. We classified this as shipping because it mentions tracking. Expect delivery Friday.";
        let out = sanitize_summary(Some(input)).unwrap();
        assert_eq!(out, "Your package has shipped. Expect delivery Friday.");
    }

    #[test]
    fn strips_classification_meta_but_keeps_content() {
        let input = "This is about your invoice. We classify this as Finance because it indicates billing. More text.";
        let out = sanitize_summary(Some(input)).unwrap();
        let lower = out.to_lowercase();
        assert!(!lower.contains("because"));
        assert!(!lower.contains("classif"));
        assert!(out.chars().count() <= 200);
        assert!(lower.contains("invoice") || lower.contains("billing"));
    }

    #[test]
    fn keeps_first_sentence_when_all_are_banned() {
        let input = "This fits best under Finance because of the invoice.";
        let out = sanitize_summary(Some(input)).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn truncates_at_word_boundary() {
        let long = "word ".repeat(80);
        let out = sanitize_summary(Some(&long)).unwrap();
        assert!(out.chars().count() <= 200);
        assert!(!out.ends_with(' '));
        assert!(out.ends_with("word"));
    }

    #[test]
    fn none_and_empty_yield_none() {
        assert!(sanitize_summary(None).is_none());
        assert!(sanitize_summary(Some("   ")).is_none());
    }

    #[test]
    fn simple_summary_prefers_subject_and_strips_links() {
        let content = "Weekly digest\nRead more at https://example.com/post\nNew articles arrived this week. Unsubscribe anytime.";
        let out = simple_summary(content);
        assert!(out.starts_with("Weekly digest"));
        assert!(!out.contains("https://"));
        assert!(out.chars().count() <= 180);
    }

    #[test]
    fn simple_summary_never_empty() {
        assert_eq!(simple_summary(""), "Recent email update");
        assert_eq!(simple_summary("\n\n  \n"), "Recent email update");
    }
}
