//! Topic Extractor: header scan primary, bounded LLM fallback.
//!
//! Grounded in the same "returns structured data, never throws" idiom as
//! the rest of this crate's leaf components (see [`crate::embedding`]).

use regex::Regex;
use std::sync::OnceLock;

fn header_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(##|###)[ \t]+(.*)$").unwrap())
}

fn inline_markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[`*_]").unwrap())
}

/// Lowercase; strip everything outside `[a-z0-9]` to `-`; collapse repeats;
/// trim leading/trailing `-`; keep only `3..=30` char results.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let lower = raw.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut last_was_dash = false;
    for c in lower.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    let len = trimmed.chars().count();
    if (3..=30).contains(&len) {
        Some(trimmed)
    } else {
        None
    }
}

fn dedup_preserve_order(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Header strategy: scan `^(##|###) ` lines; H1/H4+ ignored.
pub fn extract_topics_from_headers(markdown: &str) -> Vec<String> {
    let raw: Vec<String> = header_line_re()
        .captures_iter(markdown)
        .filter_map(|cap| {
            let text = cap.get(2).unwrap().as_str();
            let stripped = inline_markup_re().replace_all(text, "").to_string();
            normalize_tag(&stripped)
        })
        .collect();
    dedup_preserve_order(raw)
}

/// Parses a bounded LLM response into normalized topic tags, tolerating a
/// fenced ```json``` block by matching the first JSON array literal.
/// Parse failure yields the empty set — never an error.
pub fn parse_llm_topic_response(response: &str) -> Vec<String> {
    let array_text = match (response.find('['), response.rfind(']')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => return Vec::new(),
    };
    let parsed: Result<Vec<String>, _> = serde_json::from_str(array_text);
    match parsed {
        Ok(tags) => dedup_preserve_order(tags.iter().filter_map(|t| normalize_tag(t)).collect()),
        Err(_) => Vec::new(),
    }
}

/// Bounded prompt sent to the upstream LLM when the header strategy yields
/// nothing and a fallback is permitted.
pub fn build_llm_prompt(content: &str) -> String {
    let bounded: String = content.chars().take(2000).collect();
    format!(
        "Extract 1 to 5 short topic tags for the following documentation \
         snippet. Respond with a JSON array of strings only.\n\n{bounded}"
    )
}

/// Whether the LLM fallback should be attempted: header strategy found
/// nothing, the caller opted in, and an upstream LLM is configured.
pub fn should_use_llm_fallback(
    header_topics: &[String],
    use_llm_fallback: bool,
    llm_configured: bool,
) -> bool {
    header_topics.is_empty() && use_llm_fallback && llm_configured
}

/// Library-level aggregation: ordered union of snippet topic sets, first
/// occurrence wins.
pub fn aggregate_library_topics<'a>(per_snippet: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for topics in per_snippet {
        for t in topics {
            if seen.insert(t.clone()) {
                out.push(t.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_and_bounds_length() {
        assert_eq!(normalize_tag("Data Fetching!!").unwrap(), "data-fetching");
        assert_eq!(normalize_tag("  Routing  ").unwrap(), "routing");
        assert_eq!(normalize_tag("ab"), None, "below min length");
        assert_eq!(normalize_tag(&"a".repeat(31)), None, "above max length");
        assert_eq!(normalize_tag("---"), None, "collapses to nothing");
    }

    #[test]
    fn normalize_is_idempotent() {
        let cases = ["Data Fetching!!", "routing", "  A B C  ", "###weird###"];
        for c in cases {
            if let Some(once) = normalize_tag(c) {
                let twice = normalize_tag(&once).unwrap();
                assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn header_strategy_scenario() {
        let text = "## Routing\n\nContent.\n\n## Data Fetching\n\nMore.";
        let topics = extract_topics_from_headers(text);
        assert_eq!(topics, vec!["routing", "data-fetching"]);
    }

    #[test]
    fn header_strategy_ignores_h1_and_h4() {
        let text = "# Title\n\n## Valid\n\n#### Ignored\n\nbody";
        let topics = extract_topics_from_headers(text);
        assert_eq!(topics, vec!["valid"]);
    }

    #[test]
    fn header_strategy_strips_inline_markup() {
        let text = "## `Routing` and *Data*";
        let topics = extract_topics_from_headers(text);
        assert_eq!(topics, vec!["routing-and-data"]);
    }

    #[test]
    fn llm_fallback_parses_bare_array() {
        let resp = r#"["auth", "routing", "bad"]"#;
        let topics = parse_llm_topic_response(resp);
        assert_eq!(topics, vec!["auth", "routing", "bad"]);
    }

    #[test]
    fn llm_fallback_parses_fenced_block() {
        let resp = "Here you go:\n```json\n[\"auth\", \"routing\"]\n```\n";
        let topics = parse_llm_topic_response(resp);
        assert_eq!(topics, vec!["auth", "routing"]);
    }

    #[test]
    fn llm_fallback_malformed_yields_empty() {
        assert_eq!(parse_llm_topic_response("not json at all"), Vec::<String>::new());
        assert_eq!(parse_llm_topic_response("[1, 2, }"), Vec::<String>::new());
    }

    #[test]
    fn fallback_gating_rules() {
        assert!(should_use_llm_fallback(&[], true, true));
        assert!(!should_use_llm_fallback(&["x".to_string()], true, true));
        assert!(!should_use_llm_fallback(&[], false, true));
        assert!(!should_use_llm_fallback(&[], true, false));
    }

    #[test]
    fn aggregate_preserves_first_occurrence_order() {
        let a = vec!["auth".to_string(), "routing".to_string()];
        let b = vec!["routing".to_string(), "billing".to_string()];
        let agg = aggregate_library_topics([a.as_slice(), b.as_slice()].into_iter());
        assert_eq!(agg, vec!["auth", "routing", "billing"]);
    }
}
