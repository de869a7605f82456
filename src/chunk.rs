//! Header-anchored markdown chunker.
//!
//! Splits a document's markdown body into [`Snippet`]s bounded by an
//! approximate token budget, anchored to level-2/3 ATX headers. Each
//! snippet receives a deterministic id (stable across re-indexes of the
//! same library) and a deterministic quality score.

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{estimate_tokens, CodeBlock, SourceType, Snippet};

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.*)$").unwrap())
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```([A-Za-z0-9_+-]*)\n([\s\S]*?)```").unwrap())
}

struct HeaderMatch {
    start: usize,
    end_of_line: usize,
    level: usize,
    title: String,
}

fn find_headers(text: &str) -> Vec<HeaderMatch> {
    header_re()
        .captures_iter(text)
        .map(|cap| {
            let m = cap.get(0).unwrap();
            let hashes = cap.get(1).unwrap().as_str();
            let title = cap.get(2).unwrap().as_str().trim().to_string();
            HeaderMatch {
                start: m.start(),
                end_of_line: m.end(),
                level: hashes.len(),
                title,
            }
        })
        .collect()
}

/// Extracts all fenced code blocks in order, default language `"text"`.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    code_fence_re()
        .captures_iter(text)
        .map(|cap| {
            let lang = cap.get(1).unwrap().as_str();
            let code = cap.get(2).unwrap().as_str().to_string();
            CodeBlock {
                language: if lang.is_empty() {
                    "text".to_string()
                } else {
                    lang.to_string()
                },
                code,
            }
        })
        .collect()
}

/// First paragraph between the header line and the first code fence,
/// truncated to `description_max_chars`.
fn extract_description(body: &str, description_max_chars: usize) -> String {
    let before_fence = match body.find("```") {
        Some(idx) => &body[..idx],
        None => body,
    };
    let first_para = before_fence
        .split("\n\n")
        .map(|p| p.trim())
        .find(|p| !p.is_empty())
        .unwrap_or("");
    truncate_chars(first_para, description_max_chars)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Quality score per core spec §4.1: base 0.5, boundary values do not award
/// the bonus (strict `>`, not `>=`).
pub fn compute_quality_score(
    code_block_count: i64,
    content_length: usize,
    description_length: usize,
) -> f64 {
    let mut score: f64 = 0.5;
    if code_block_count > 0 {
        score += 0.2;
    }
    if code_block_count > 2 {
        score += 0.1;
    }
    if content_length > 500 {
        score += 0.1;
    }
    if description_length > 50 {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Deterministic snippet id: stable within a library across re-indexes of
/// the same ordered input, and incorporating `library_id` so identical
/// content across libraries never collides.
fn deterministic_snippet_id(library_id: &str, source_file: &str, position: usize) -> String {
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_OID, library_id.as_bytes());
    let name = format!("{source_file}#{position}");
    Uuid::new_v5(&namespace, name.as_bytes()).to_string()
}

/// Splits `s` into successive sub-strings of at most `max_chars` characters,
/// always on a char boundary.
fn chunk_by_chars(s: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Splits an oversize section into chunks of at most `chunk_target_chars`,
/// alternating text/code parts, never splitting inside a fence. Returns
/// `(title_suffix_index, content)` pairs — index 0 keeps the bare title.
fn split_oversize_section(body: &str, chunk_target_chars: usize) -> Vec<String> {
    // Build an ordered list of (is_code, text) parts by walking fence matches.
    let mut parts: Vec<String> = Vec::new();
    let mut last = 0usize;
    for m in code_fence_re().find_iter(body) {
        if m.start() > last {
            parts.push(body[last..m.start()].to_string());
        }
        parts.push(body[m.start()..m.end()].to_string());
        last = m.end();
    }
    if last < body.len() {
        parts.push(body[last..].to_string());
    }
    if parts.is_empty() {
        parts.push(body.to_string());
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for part in parts {
        let would_be = current.len() + part.len();
        if would_be > chunk_target_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if part.chars().count() > chunk_target_chars {
            // A single part (text span or fenced block) already exceeds the
            // target on its own; break it into bounded sub-spans rather than
            // appending it whole.
            for sub in chunk_by_chars(&part, chunk_target_chars) {
                chunks.push(sub);
            }
        } else {
            current.push_str(&part);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(body.to_string());
    }
    chunks
}

/// Splits a markdown document into snippets per core spec §4.1.
pub fn chunk_markdown(
    library_id: &str,
    source_file: &str,
    source_type: SourceType,
    text: &str,
    params: &ChunkingConfig,
    now_ms: i64,
) -> Vec<Snippet> {
    let headers = find_headers(text);
    let section_boundaries: Vec<&HeaderMatch> = headers
        .iter()
        .filter(|h| h.level == 2 || h.level == 3)
        .collect();

    let mut snippets = Vec::new();
    let mut position = 0usize;

    if section_boundaries.is_empty() {
        if text.trim().chars().count() >= params.min_section_chars {
            let mut code_blocks = extract_code_blocks(text);
            code_blocks.truncate(params.fallback_code_blocks_max);
            let content = truncate_chars(text.trim(), params.fallback_content_chars);
            let description = extract_description(text, params.description_max_chars);
            let mut snippet = build_snippet(
                library_id,
                source_file,
                source_type,
                "Overview".to_string(),
                content,
                description,
                code_blocks,
                position,
                now_ms,
            );
            snippet.derive_code_fields();
            snippets.push(snippet);
        }
        return snippets;
    }

    for (i, boundary) in section_boundaries.iter().enumerate() {
        let section_start = boundary.start;
        let section_end = section_boundaries
            .get(i + 1)
            .map(|next| next.start)
            .unwrap_or(text.len());
        let section_text = &text[section_start..section_end];
        let body = &text[boundary.end_of_line.min(section_end)..section_end];

        // MIN_SECTION_CHARS only gates the headerless-fallback path above;
        // a header-bounded section is kept regardless of body length, since
        // its heading line alone is a meaningful retrieval unit.
        let title = boundary.title.clone();
        let tokens = estimate_tokens(section_text);

        if tokens as usize <= params.section_max_tokens {
            let code_blocks = extract_code_blocks(body);
            let description = extract_description(body, params.description_max_chars);
            let mut snippet = build_snippet(
                library_id,
                source_file,
                source_type,
                title,
                body.trim().to_string(),
                description,
                code_blocks,
                position,
                now_ms,
            );
            snippet.derive_code_fields();
            snippets.push(snippet);
            position += 1;
        } else {
            let pieces = split_oversize_section(body, params.chunk_target_chars);
            for (n, piece) in pieces.iter().enumerate() {
                let piece_title = if n == 0 {
                    title.clone()
                } else {
                    format!("{title} (continued {n})")
                };
                let code_blocks = extract_code_blocks(piece);
                let description = extract_description(piece, params.description_max_chars);
                let mut snippet = build_snippet(
                    library_id,
                    source_file,
                    source_type,
                    piece_title,
                    piece.trim().to_string(),
                    description,
                    code_blocks,
                    position,
                    now_ms,
                );
                snippet.derive_code_fields();
                snippets.push(snippet);
                position += 1;
            }
        }
    }

    snippets
}

#[allow(clippy::too_many_arguments)]
fn build_snippet(
    library_id: &str,
    source_file: &str,
    source_type: SourceType,
    title: String,
    content: String,
    description: String,
    code_blocks: Vec<CodeBlock>,
    position: usize,
    now_ms: i64,
) -> Snippet {
    let code_block_count = code_blocks.len() as i64;
    let quality_score =
        compute_quality_score(code_block_count, content.len(), description.len());
    Snippet {
        id: deterministic_snippet_id(library_id, source_file, position),
        library_id: library_id.to_string(),
        version_id: None,
        title,
        source_file: source_file.to_string(),
        source_type,
        description,
        tokens: estimate_tokens(&content),
        content,
        code_blocks,
        topics: Vec::new(),
        has_code: false,
        code_block_count,
        quality_score,
        embedding: None,
        updated_ms: now_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ChunkingConfig {
        ChunkingConfig::default()
    }

    #[test]
    fn header_based_topic_extraction_scenario() {
        let text = "## Routing\n\nContent.\n\n## Data Fetching\n\nMore.";
        let snippets = chunk_markdown("lib1", "/a.md", SourceType::Docs, text, &params(), 0);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].title, "Routing");
        assert_eq!(snippets[1].title, "Data Fetching");
        for s in &snippets {
            assert!((s.quality_score - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn short_header_bounded_sections_are_kept() {
        let text = "## A\n\nhi\n\n## B\n\nThis is a long enough paragraph to pass the minimum section character threshold easily.";
        let snippets = chunk_markdown("lib1", "/a.md", SourceType::Docs, text, &params(), 0);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].title, "A");
        assert_eq!(snippets[1].title, "B");
    }

    #[test]
    fn min_section_chars_gates_headerless_fallback_only() {
        let short = "hi";
        assert!(chunk_markdown("lib1", "/a.md", SourceType::Docs, short, &params(), 0).is_empty());
    }

    #[test]
    fn oversize_section_split_scenario() {
        let mut text = String::from("## T\n\n");
        text.push_str(&"a".repeat(10_000));
        text.push_str("\n\n```rust\nfn one() {}\n```\n\n```rust\nfn two() {}\n```\n");
        let snippets = chunk_markdown("lib1", "/a.md", SourceType::Docs, &text, &params(), 0);
        assert!(snippets.len() >= 2);
        assert_eq!(snippets[0].title, "T");
        assert_eq!(snippets[1].title, "T (continued 1)");
        for s in &snippets {
            assert!(s.content.len() <= 3500);
        }
    }

    #[test]
    fn h1_and_h4_headers_are_not_section_boundaries() {
        let text = "# Title\n\nIntro.\n\n## Body\n\n#### Tiny\n\nStill body content long enough to count as a section on its own merits here.";
        let snippets = chunk_markdown("lib1", "/a.md", SourceType::Docs, text, &params(), 0);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].title, "Body");
    }

    #[test]
    fn no_headers_falls_back_to_whole_file() {
        let text = "Just a long paragraph of plain prose with no markdown headers in it at all, long enough to pass the minimum.";
        let snippets = chunk_markdown("lib1", "/a.md", SourceType::Docs, text, &params(), 0);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].title, "Overview");
    }

    #[test]
    fn deterministic_ids_across_reindex() {
        let text = "## Routing\n\nContent.\n\n## Data Fetching\n\nMore.";
        let a = chunk_markdown("lib1", "/a.md", SourceType::Docs, text, &params(), 0);
        let b = chunk_markdown("lib1", "/a.md", SourceType::Docs, text, &params(), 999);
        let ids_a: Vec<&str> = a.iter().map(|s| s.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn ids_differ_across_libraries_for_identical_content() {
        let text = "## Routing\n\nContent.";
        let a = chunk_markdown("lib1", "/a.md", SourceType::Docs, text, &params(), 0);
        let b = chunk_markdown("lib2", "/a.md", SourceType::Docs, text, &params(), 0);
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn code_block_count_bonus_boundaries() {
        assert!((compute_quality_score(0, 0, 0) - 0.5).abs() < 1e-9);
        assert!((compute_quality_score(1, 0, 0) - 0.7).abs() < 1e-9);
        assert!((compute_quality_score(2, 0, 0) - 0.7).abs() < 1e-9, "==2 is not > 2");
        assert!((compute_quality_score(3, 0, 0) - 0.8).abs() < 1e-9);
        assert!((compute_quality_score(0, 500, 0) - 0.5).abs() < 1e-9, "==500 is not > 500");
        assert!((compute_quality_score(0, 501, 0) - 0.6).abs() < 1e-9);
        assert!((compute_quality_score(0, 0, 50) - 0.5).abs() < 1e-9, "==50 is not > 50");
        assert!((compute_quality_score(0, 0, 51) - 0.6).abs() < 1e-9);
    }
}
