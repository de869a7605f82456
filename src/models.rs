//! Core data models: the four persisted entities plus the transient
//! indexing-job entity.
//!
//! Kept data-only by design (core spec §9: no decorator-style method
//! injection) — validation and derivation live in `chunk.rs`, `topics.rs`,
//! and free functions here.

use serde::{Deserialize, Serialize};

/// Catch-all for forward-compatible dynamic fields on persisted entities,
/// serialized to JSON only at the storage boundary.
pub type MetadataMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: String,
    /// `"/" + org + "/" + project"`, unique.
    pub identifier: String,
    pub name: String,
    pub org: String,
    pub project: String,
    pub description: String,
    pub repository_url: Option<String>,
    pub homepage_url: Option<String>,
    /// Opaque preference weight in `[1,10]`; default 5, locally indexed 10.
    pub trust_score: u8,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub rules: Vec<String>,
    pub source_path: Option<String>,
    #[serde(default)]
    pub metadata: MetadataMap,
    pub created_ms: i64,
    pub updated_ms: i64,
}

impl Library {
    /// Builds the canonical identifier from org/project.
    pub fn make_identifier(org: &str, project: &str) -> String {
        format!("/{org}/{project}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub library_id: String,
    /// Raw, as supplied by the caller.
    pub version_string: String,
    /// `MAJOR.MINOR.PATCH`, leading `v` stripped, missing parts zero-filled,
    /// truncated to three components.
    pub version_normalized: String,
    pub is_latest: bool,
    pub is_deprecated: bool,
    pub document_count: i64,
    pub git_commit_sha: Option<String>,
    pub release_date_ms: Option<i64>,
    pub indexed_ms: i64,
    pub updated_ms: i64,
}

/// Normalizes a raw version string to `MAJOR.MINOR.PATCH`.
pub fn normalize_version(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('v').trim_start_matches('V');
    let mut parts: Vec<&str> = trimmed.split('.').collect();
    parts.truncate(3);
    let mut out: Vec<String> = parts
        .iter()
        .map(|p| {
            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                "0".to_string()
            } else {
                digits
            }
        })
        .collect();
    while out.len() < 3 {
        out.push("0".to_string());
    }
    out.join(".")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Readme,
    Api,
    Docs,
    Examples,
    Content,
    Github,
    Web,
    Pdf,
    Markdown,
}

impl SourceType {
    /// Infers a source type from the top-level folder name of a relative
    /// path, per the core spec's file-selection rule.
    pub fn infer_from_folder(top_level: &str) -> Self {
        let lower = top_level.to_lowercase();
        if lower.contains("example") {
            SourceType::Examples
        } else if lower.contains("api") || lower.contains("reference") {
            SourceType::Api
        } else if lower.contains("content") {
            SourceType::Content
        } else {
            SourceType::Docs
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub library_id: String,
    pub version_id: Option<String>,
    /// Leading `/`.
    pub path: String,
    pub title: String,
    pub content: String,
    pub content_hash: String,
    pub tokens: i64,
    pub source_type: SourceType,
    pub source_path: Option<String>,
    pub source_url: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    pub indexed_ms: i64,
}

fn default_language() -> String {
    "en".to_string()
}

/// `ceil(len / 4)`, the approximate token estimate used throughout.
pub fn estimate_tokens(text: &str) -> i64 {
    ((text.chars().count() + 3) / 4) as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    /// Deterministic within a library; incorporates `library_id` across
    /// libraries to avoid collision on identical content.
    pub id: String,
    pub library_id: String,
    /// Set by the indexing orchestrator once a library version is known;
    /// absent on freshly parsed snippets. Not part of the snippet identity.
    pub version_id: Option<String>,
    pub title: String,
    pub source_file: String,
    pub source_type: SourceType,
    /// At most `DESCRIPTION_MAX_CHARS`.
    pub description: String,
    pub content: String,
    pub code_blocks: Vec<CodeBlock>,
    pub topics: Vec<String>,
    pub has_code: bool,
    pub code_block_count: i64,
    pub tokens: i64,
    pub quality_score: f64,
    pub embedding: Option<Vec<f32>>,
    pub updated_ms: i64,
}

impl Snippet {
    /// `code_block_count == len(code_blocks)`, `has_code == count > 0`.
    pub fn derive_code_fields(&mut self) {
        self.code_block_count = self.code_blocks.len() as i64;
        self.has_code = self.code_block_count > 0;
    }

    /// Text fed to the embedding client for this snippet (core spec §4.3).
    pub fn embedding_input(&self) -> String {
        format!("{}\n\n{}\n\n{}", self.title, self.description, self.content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingJob {
    pub id: String,
    pub library_id: String,
    pub version_id: Option<String>,
    pub status: JobStatus,
    pub total_documents: i64,
    pub processed_documents: i64,
    pub failed_documents: i64,
    pub error: Option<String>,
    pub started_ms: i64,
    pub completed_ms: Option<i64>,
    #[serde(default)]
    pub metadata: MetadataMap,
}

impl IndexingJob {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One of the three exclude-rule dialects described in core spec §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcludeRule {
    /// Matches the bare name anywhere in the tree.
    Bare(String),
    /// `./name` — matches only at the root.
    RootOnly(String),
    /// `a/b` — exact relative path, or a path this is a prefix of.
    PathPrefix(String),
}

impl ExcludeRule {
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix("./") {
            ExcludeRule::RootOnly(rest.to_string())
        } else if raw.contains('/') {
            ExcludeRule::PathPrefix(raw.trim_end_matches('/').to_string())
        } else {
            ExcludeRule::Bare(raw.to_string())
        }
    }

    /// `rel_path` is POSIX-separated, without a leading `/`.
    pub fn matches(&self, rel_path: &str) -> bool {
        match self {
            ExcludeRule::Bare(name) => rel_path.split('/').any(|segment| segment == name),
            ExcludeRule::RootOnly(name) => {
                rel_path == *name || rel_path.split('/').next() == Some(name.as_str())
            }
            ExcludeRule::PathPrefix(prefix) => {
                rel_path == *prefix || rel_path.starts_with(&format!("{prefix}/"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_version_strips_v_and_pads() {
        assert_eq!(normalize_version("v1.2"), "1.2.0");
        assert_eq!(normalize_version("2"), "2.0.0");
        assert_eq!(normalize_version("1.2.3.4"), "1.2.3");
        assert_eq!(normalize_version("V1.2.3"), "1.2.3");
    }

    #[test]
    fn estimate_tokens_matches_ceil_len_over_4() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn exclude_rule_dialects() {
        let bare = ExcludeRule::parse("node_modules");
        assert!(bare.matches("src/node_modules/pkg/doc.md"));

        let root_only = ExcludeRule::parse("./dist");
        assert!(root_only.matches("dist/x.md"));
        assert!(!root_only.matches("src/dist/x.md"));

        let prefix = ExcludeRule::parse("app-sdk/v2.3");
        assert!(prefix.matches("app-sdk/v2.3/api.md"));
        assert!(!prefix.matches("src/dist/x.md"));
    }

    #[test]
    fn snippet_code_fields_derived() {
        let mut s = Snippet {
            id: "s1".into(),
            library_id: "l1".into(),
            version_id: None,
            title: "T".into(),
            source_file: "/a.md".into(),
            source_type: SourceType::Docs,
            description: String::new(),
            content: String::new(),
            code_blocks: vec![CodeBlock {
                language: "rust".into(),
                code: "fn x() {}".into(),
            }],
            topics: vec![],
            has_code: false,
            code_block_count: 0,
            tokens: 0,
            quality_score: 0.0,
            embedding: None,
            updated_ms: 0,
        };
        s.derive_code_fields();
        assert_eq!(s.code_block_count, 1);
        assert!(s.has_code);
    }
}
