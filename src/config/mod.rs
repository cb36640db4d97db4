use anyhow::Result;
use std::env;
use std::time::Duration;

/// Application-wide defaults. These can be overridden by env vars but do not
/// require any user-authored config files.
#[derive(Debug, Clone)]
pub struct AppDefaults {
    pub ingest_days: u32,
    pub ingest_max: u32,
    pub recategorize_limit: u32,
    pub similarity_threshold: f64,
    pub oracle_url: String,
    pub oracle_model: String,
    pub oracle_timeout: Duration,
    pub chrome_path: Option<String>,
    pub nav_timeout: Duration,
    pub probe_timeout: Duration,
    pub settle_wait: Duration,
}

impl AppDefaults {
    pub fn load() -> Result<Self> {
        let ingest_days = env_u32("MAILSWEEP_INGEST_DAYS", 30).clamp(1, 30);
        let ingest_max = env_u32("MAILSWEEP_INGEST_MAX", 50).clamp(1, 50);
        let recategorize_limit = env_u32("MAILSWEEP_RECATEGORIZE_LIMIT", 200).clamp(1, 500);
        let similarity_threshold = env::var("MAILSWEEP_SIMILARITY_THRESHOLD")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.6);

        let oracle_url = env::var("MAILSWEEP_ORACLE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let oracle_model =
            env::var("MAILSWEEP_ORACLE_MODEL").unwrap_or_else(|_| "mistral:latest".to_string());

        Ok(Self {
            ingest_days,
            ingest_max,
            recategorize_limit,
            similarity_threshold,
            oracle_url,
            oracle_model,
            oracle_timeout: Duration::from_secs(env_u32("MAILSWEEP_ORACLE_TIMEOUT_SECS", 30) as u64),
            chrome_path: env::var("MAILSWEEP_CHROME_PATH").ok(),
            nav_timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(2),
            settle_wait: Duration::from_secs(2),
        })
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

/// Heuristic tables used by category resolution, fallback classification and
/// unsubscribe automation. Kept as data so tests can substitute fixtures.
#[derive(Debug, Clone)]
pub struct Heuristics {
    /// Category names that carry no discriminative meaning; excluded from
    /// fuzzy reuse and flagged for replacement.
    pub generic_names: Vec<&'static str>,
    /// Category-name substrings mapped to characteristic content keywords.
    pub match_keywords: Vec<(&'static str, &'static [&'static str])>,
    /// Content cues mapped to category suggestions (name, description, cues).
    pub suggestions: Vec<(&'static str, &'static str, &'static [&'static str])>,
    /// Ordered XPath probes for unsubscribe controls on landing pages.
    pub unsubscribe_probes: Vec<&'static str>,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            generic_names: vec![
                "test",
                "test1",
                "misc",
                "general",
                "uncategorized",
                "other",
                "default",
            ],
            match_keywords: vec![
                ("promotions", &["deal", "sale", "offer", "promo", "discount", "coupon"]),
                ("newsletters", &["newsletter", "digest", "update", "roundup", "recap"]),
                ("social", &["follow", "like", "comment", "mention"]),
                ("finance", &["invoice", "receipt", "payment", "billing", "statement"]),
                ("travel", &["flight", "hotel", "booking", "itinerary", "reservation"]),
            ],
            suggestions: vec![
                (
                    "Receipts",
                    "Purchase confirmations, invoices, and payment receipts",
                    &["receipt", "invoice", "payment", "order", "subtotal", "purchased", "thanks for your purchase"],
                ),
                (
                    "Verification",
                    "Email verifications, activations, and security confirmations",
                    &["verify", "verification", "confirm your", "activate", "activation", "one-time code", "otp", "2fa"],
                ),
                (
                    "Jobs",
                    "Job applications, interview invites, and career opportunities",
                    &["job", "career", "interview", "application", "hiring", "position"],
                ),
                (
                    "Marketing",
                    "Promotions, newsletters, and offers",
                    &["newsletter", "unsubscribe", "promo", "offer", "sale", "discount", "limited time"],
                ),
                (
                    "Shipping",
                    "Delivery updates and tracking notifications",
                    &["shipped", "delivered", "tracking", "on the way", "carrier", "courier"],
                ),
                (
                    "Finance",
                    "Bank statements, billing, and subscription updates",
                    &["statement", "billing", "subscription", "charge"],
                ),
            ],
            unsubscribe_probes: vec![
                "//button[contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'unsubscribe')]",
                "//button[contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'opt out')]",
                "//a[contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'unsubscribe')]",
                "//a[contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'opt out')]",
                "//input[@type='submit'][contains(translate(@value, 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'unsubscribe')]",
                "//button[contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'confirm')]",
                "//button[contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'yes')]",
            ],
        }
    }
}
