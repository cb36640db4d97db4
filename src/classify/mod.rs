pub mod categories;
pub mod oracle;
pub mod summary;

pub use categories::CategoryResolver;
pub use oracle::{OllamaOracle, Oracle};

use crate::storage::Database;
use crate::types::Category;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use categories::{best_category_match, is_generic_name, normalize, suggest_by_keywords};
use summary::{sanitize_summary, simple_summary};

const PROMPT_CONTENT_CHARS: usize = 8000;

/// Outcome of classifying one email. All fields optional: a failed or
/// unconvinced run leaves the email uncategorized but still summarized.
#[derive(Clone, Debug, Default)]
pub struct Classification {
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub summary: Option<String>,
}

pub struct Classifier {
    db: Database,
    oracle: Arc<dyn Oracle>,
    resolver: CategoryResolver,
}

impl Classifier {
    pub fn new(db: Database, oracle: Arc<dyn Oracle>, resolver: CategoryResolver) -> Self {
        Self {
            db,
            oracle,
            resolver,
        }
    }

    pub fn heuristics(&self) -> &crate::config::Heuristics {
        self.resolver.heuristics()
    }

    /// Classifies email content against the user's taxonomy. Infallible:
    /// every error path degrades to the rule-based fallback, so ingestion
    /// never stalls on a flaky model.
    pub async fn classify(&self, user_id: &str, content: &str) -> Classification {
        let categories = match self.db.list_categories(user_id).await {
            Ok(cats) => cats,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Failed to load categories; classifying against empty taxonomy");
                Vec::new()
            }
        };

        match self.classify_with_oracle(user_id, content, &categories).await {
            Some(classification) => classification,
            None => self.rule_fallback(content, &categories),
        }
    }

    async fn classify_with_oracle(
        &self,
        user_id: &str,
        content: &str,
        categories: &[Category],
    ) -> Option<Classification> {
        let prompt = build_prompt(content, categories);
        let raw = match self.oracle.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Oracle unavailable; falling back to rules");
                return None;
            }
        };

        let parsed: Value = match serde_json::from_str(extract_json(&raw)) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Unparseable oracle output; falling back to rules");
                return None;
            }
        };

        let summary = sanitize_summary(parsed["summary"].as_str());

        if parsed["action"].as_str() == Some("create") {
            if let Some(new_cat) = parsed.get("newCategory") {
                let name = new_cat["name"].as_str().unwrap_or("").trim();
                let description = new_cat["description"].as_str().unwrap_or("").trim();
                if !name.is_empty() {
                    match self.resolver.ensure_category(user_id, name, description).await {
                        Ok(cat) => {
                            return Some(Classification {
                                category_id: Some(cat.id),
                                category_name: Some(cat.name),
                                summary,
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to create proposed category");
                            return None;
                        }
                    }
                }
            }
        }

        let matched = parsed["categoryId"]
            .as_str()
            .and_then(|id| categories.iter().find(|c| c.id == id));

        if let Some(matched) = matched {
            if is_generic_name(&matched.name, self.resolver.heuristics()) {
                // Second pass: derive a meaningful name instead of filing
                // into a generic bucket.
                if let Some(cat) = self.propose_category(user_id, content, categories).await {
                    return Some(Classification {
                        category_id: Some(cat.id),
                        category_name: Some(cat.name),
                        summary,
                    });
                }
                if let Some((name, description)) =
                    suggest_by_keywords(content, self.resolver.heuristics())
                {
                    match self.resolver.ensure_category(user_id, name, description).await {
                        Ok(cat) => {
                            return Some(Classification {
                                category_id: Some(cat.id),
                                category_name: Some(cat.name),
                                summary,
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to create keyword-derived category");
                            return None;
                        }
                    }
                }
            }
            return Some(Classification {
                category_id: Some(matched.id.clone()),
                category_name: Some(matched.name.clone()),
                summary,
            });
        }

        // The oracle answered but named nothing usable; try resolving the
        // free-text category name it may have produced.
        if let Some(proposed) = parsed["category"].as_str() {
            if let Some(found) =
                best_category_match(proposed, categories, self.resolver.heuristics())
            {
                return Some(Classification {
                    category_id: Some(found.id.clone()),
                    category_name: Some(found.name.clone()),
                    summary,
                });
            }
        }

        summary.map(|s| Classification {
            category_id: None,
            category_name: None,
            summary: Some(s),
        })
    }

    /// Second-pass naming: ask the oracle for a category name derived from
    /// the content alone.
    async fn propose_category(
        &self,
        user_id: &str,
        content: &str,
        categories: &[Category],
    ) -> Option<Category> {
        let prompt = format!(
            "Derive a concise, human-friendly category name for this single email. \
             Base only on content. Avoid generic names like test/misc/other/general. \
             Return JSON only:\n{{\n  \"name\": \"<1-3 words, e.g., Receipts, Email Verification>\",\n  \"description\": \"<short description of what belongs here>\"\n}}\n\nEmail:\n{}",
            clip_chars(content, PROMPT_CONTENT_CHARS)
        );

        let raw = match self.oracle.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Second-pass naming failed");
                return None;
            }
        };
        let parsed: Value = serde_json::from_str(extract_json(&raw)).ok()?;
        let name = parsed["name"].as_str()?.trim().to_string();
        if name.is_empty() || is_generic_name(&name, self.resolver.heuristics()) {
            return None;
        }
        let description = parsed["description"].as_str().unwrap_or("").trim().to_string();

        if let Some(existing) = categories
            .iter()
            .find(|c| normalize(&c.name) == normalize(&name))
        {
            return Some(existing.clone());
        }

        match self.resolver.ensure_category(user_id, &name, &description).await {
            Ok(cat) => Some(cat),
            Err(e) => {
                warn!(error = %e, "Failed to persist derived category");
                None
            }
        }
    }

    /// Last resort: token overlap between taxonomy names/descriptions and
    /// the content. Never fails.
    fn rule_fallback(&self, content: &str, categories: &[Category]) -> Classification {
        let lower = content.to_lowercase();
        for cat in categories {
            let haystack = format!("{} {}", cat.name, cat.description).to_lowercase();
            let hit = haystack
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|token| token.len() > 3 && lower.contains(token));
            if hit {
                return Classification {
                    category_id: Some(cat.id.clone()),
                    category_name: Some(cat.name.clone()),
                    summary: Some(simple_summary(content)),
                };
            }
        }
        Classification {
            category_id: None,
            category_name: None,
            summary: Some(simple_summary(content)),
        }
    }
}

/// Prompt asking the oracle to match or create a category and summarize.
fn build_prompt(content: &str, categories: &[Category]) -> String {
    let listing: Vec<Value> = categories
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id,
                "name": c.name,
                "description": c.description,
            })
        })
        .collect();

    format!(
        "Analyze this email and either:\n\
         1. Match it to an existing category (if there's a good fit), OR\n\
         2. Suggest a NEW category to create (if no good match exists)\n\n\
         Existing categories (if none are relevant, choose create):\n{}\n\n\
         Email to categorize:\n{}\n\n\
         Avoid selecting generic buckets like \"test\", \"misc\", \"other\", or \"general\". \
         If only generic categories exist, prefer creating a new category with a meaningful name.\n\n\
         Return JSON only (no extra text) with ONE of these structures. The summary MUST describe \
         the email's content in neutral terms, not your reasoning or classification logic. \
         Avoid phrases like \"this indicates\", \"fits best\", \"because\", \"we classify\". \
         Keep it to 1-2 sentences, max 180 characters.\n\n\
         Option A (existing category match):\n\
         {{\n  \"action\": \"match\",\n  \"categoryId\": \"<id from existing list>\",\n  \"summary\": \"<2 sentences>\"\n}}\n\n\
         Option B (suggest new category):\n\
         {{\n  \"action\": \"create\",\n  \"newCategory\": {{\n    \"name\": \"<short category name like 'Receipts' or 'Jobs'>\",\n    \"description\": \"<what types of emails belong here>\"\n  }},\n  \"summary\": \"<2 sentences>\"\n}}",
        serde_json::to_string(&listing).unwrap_or_else(|_| "[]".to_string()),
        clip_chars(content, PROMPT_CONTENT_CHARS)
    )
}

/// Models wrap JSON in prose; take the outermost brace span.
fn extract_json(raw: &str) -> &str {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => raw,
    }
}

fn clip_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_takes_outermost_braces() {
        let raw = "Sure! Here you go: {\"action\": \"match\", \"inner\": {\"x\": 1}} hope that helps";
        assert_eq!(
            extract_json(raw),
            "{\"action\": \"match\", \"inner\": {\"x\": 1}}"
        );
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn clip_chars_respects_utf8_boundaries() {
        let s = "héllo wörld";
        assert_eq!(clip_chars(s, 4), "héll");
        assert_eq!(clip_chars(s, 100), s);
    }
}
