use crate::config::Heuristics;
use crate::storage::Database;
use crate::types::Category;
use anyhow::Result;
use std::collections::HashSet;
use tracing::info;

/// Lowercase, strip punctuation, keep word spacing. Used for name equality.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect()
}

/// Tokenization for similarity: folds `&` to "and" so "Bills & Receipts"
/// and "Bills and Receipts" compare equal.
fn token_set(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .replace('&', " and ")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    inter as f64 / union as f64
}

pub fn is_generic_name(name: &str, heuristics: &Heuristics) -> bool {
    let n = normalize(name);
    heuristics.generic_names.iter().any(|g| *g == n)
}

/// Resolves proposed category names against the user's taxonomy, reusing
/// similar existing categories instead of minting near-duplicates.
pub struct CategoryResolver {
    db: Database,
    heuristics: Heuristics,
    similarity_threshold: f64,
}

impl CategoryResolver {
    pub fn new(db: Database, heuristics: Heuristics, similarity_threshold: f64) -> Self {
        Self {
            db,
            heuristics,
            similarity_threshold,
        }
    }

    pub fn heuristics(&self) -> &Heuristics {
        &self.heuristics
    }

    /// Returns an existing category when the name matches exactly or is
    /// similar enough to a non-generic one, otherwise creates it. Creation
    /// upserts on (user_id, name) so concurrent resolvers converge on a
    /// single row.
    pub async fn ensure_category(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Category> {
        if let Some(existing) = self.db.find_category_by_name(user_id, name).await? {
            return Ok(existing);
        }

        let all = self.db.list_categories(user_id).await?;
        let wanted = token_set(name);
        let mut best: Option<&Category> = None;
        let mut best_sim = 0.0;
        for cat in &all {
            if is_generic_name(&cat.name, &self.heuristics) {
                continue;
            }
            let sim = jaccard(&wanted, &token_set(&cat.name));
            if sim > best_sim {
                best_sim = sim;
                best = Some(cat);
            }
        }
        if let Some(cat) = best {
            if best_sim >= self.similarity_threshold {
                info!(
                    category = %cat.name,
                    proposed = %name,
                    similarity = best_sim,
                    "Reusing similar existing category"
                );
                return Ok(cat.clone());
            }
        }

        let created = self.db.upsert_category(user_id, name, description).await?;
        info!(category = %created.name, id = %created.id, "Created category");
        Ok(created)
    }
}

/// Best existing category for an oracle-proposed name: exact normalized
/// match, then substring containment, then the name-keyword table.
pub fn best_category_match<'a>(
    proposed: &str,
    options: &'a [Category],
    heuristics: &Heuristics,
) -> Option<&'a Category> {
    let n = normalize(proposed);
    if n.is_empty() {
        return None;
    }

    if let Some(exact) = options.iter().find(|o| normalize(&o.name) == n) {
        return Some(exact);
    }

    if let Some(contains) = options.iter().find(|o| {
        let on = normalize(&o.name);
        !on.is_empty() && (n.contains(&on) || on.contains(&n))
    }) {
        return Some(contains);
    }

    for opt in options {
        let on = normalize(&opt.name);
        for (key, words) in &heuristics.match_keywords {
            if on.contains(key) && words.iter().any(|w| n.contains(w)) {
                return Some(opt);
            }
        }
    }

    None
}

/// Content-cue fallback when the oracle cannot name a category.
pub fn suggest_by_keywords<'a>(
    content: &str,
    heuristics: &'a Heuristics,
) -> Option<(&'a str, &'a str)> {
    let text = content.to_lowercase();
    for (name, description, cues) in &heuristics.suggestions {
        if cues.iter().any(|cue| text.contains(cue)) {
            return Some((name, description));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: &str, name: &str) -> Category {
        Category {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: name.to_string(),
            description: String::new(),
            created_at: 0,
        }
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize("  Bills, & Receipts!  "), "bills  receipts");
    }

    #[test]
    fn ampersand_folds_to_and_for_similarity() {
        let a = token_set("Bills & Receipts");
        let b = token_set("bills and receipts");
        assert!((jaccard(&a, &b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a = token_set("travel bookings");
        let b = token_set("job offers");
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn generic_names_detected_after_normalization() {
        let h = Heuristics::default();
        assert!(is_generic_name("Misc.", &h));
        assert!(is_generic_name("  OTHER ", &h));
        assert!(!is_generic_name("Receipts", &h));
    }

    #[test]
    fn match_prefers_exact_over_contains() {
        let h = Heuristics::default();
        let options = vec![cat("1", "Newsletters Weekly"), cat("2", "Newsletters")];
        let found = best_category_match("newsletters", &options, &h).unwrap();
        assert_eq!(found.id, "2");
    }

    #[test]
    fn match_falls_back_to_keyword_table() {
        let h = Heuristics::default();
        let options = vec![cat("1", "Promotions")];
        let found = best_category_match("Flash Sale Digest", &options, &h).unwrap();
        assert_eq!(found.id, "1");
    }

    #[test]
    fn keyword_suggestion_picks_first_matching_table_entry() {
        let h = Heuristics::default();
        let (name, _) =
            suggest_by_keywords("Your invoice for order #991 is attached", &h).unwrap();
        assert_eq!(name, "Receipts");
        assert!(suggest_by_keywords("nothing relevant here", &h).is_none());
    }
}
