//! Core data models shared by the chunker, store, retriever, and chat
//! summarizer.
//!
//! Field names serialize in PascalCase so that stores written by earlier
//! versions of the tool load unchanged.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A document registered in the store, keyed by its path relative to the
/// store root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Document {
    /// Path relative to the store root. Unique within a store.
    #[serde(default)]
    pub rel_path: String,
    /// Legacy path field from schema 0.1, imprecise about what it was
    /// relative to. Only read by the migrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Document {
    pub fn new(rel_path: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            path: None,
        }
    }
}

/// A fragment of a document's text.
///
/// Only the byte range is persisted; text is re-read from the live
/// document whenever it is needed. `token_count`, `stale`, and `text` are
/// transient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Chunk {
    /// Relative path of the owning document. A lookup key, not a pointer.
    #[serde(deserialize_with = "document_ref")]
    pub document: String,
    /// Byte offset into the document. Absent in 2.0 stores.
    #[serde(default)]
    pub offset: usize,
    /// Length in bytes.
    #[serde(default)]
    pub length: usize,
    /// SHA-256 of the document-prefixed text. Empty for legacy chunks.
    #[serde(default)]
    pub hash: String,
    /// `None` for empty text.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip)]
    pub token_count: Option<usize>,
    #[serde(skip)]
    pub stale: bool,
    #[serde(skip)]
    pub text: Option<String>,
}

impl Chunk {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Accept either the current string key or the nested document object that
/// pre-3.0 stores wrote for each chunk.
fn document_ref<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Key(String),
        Legacy {
            #[serde(rename = "RelPath", default)]
            rel_path: String,
            #[serde(rename = "Path", default)]
            path: String,
        },
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Key(key) => key,
        Raw::Legacy { rel_path, path } if rel_path.is_empty() => path,
        Raw::Legacy { rel_path, .. } => rel_path,
    })
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "AI")]
    Ai,
}

impl Role {
    /// Normalize a role token from a chat file. Matching ignores case and
    /// surrounding whitespace; anything unrecognized is attributed to the AI.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "USER" => Role::User,
            _ => Role::Ai,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Ai => "AI",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Role::Ai, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_document_ref_accepts_legacy_object() {
        let json = r#"{"Document":{"Path":"/old/a.md","RelPath":""},"Offset":3,"Length":7,"Hash":"h","Embedding":null}"#;
        let chunk: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.document, "/old/a.md");
        assert_eq!(chunk.offset, 3);
        assert_eq!(chunk.length, 7);

        let json = r#"{"Document":{"Path":"/old/a.md","RelPath":"a.md"},"Offset":0,"Length":1}"#;
        let chunk: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.document, "a.md");
        assert!(chunk.embedding.is_none());
    }

    #[test]
    fn test_chunk_serializes_without_transient_fields() {
        let chunk = Chunk {
            document: "a.md".into(),
            offset: 1,
            length: 2,
            hash: "abc".into(),
            embedding: Some(vec![0.5]),
            token_count: Some(9),
            stale: true,
            text: Some("xy".into()),
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["Document"], "a.md");
        assert!(value.get("TokenCount").is_none());
        assert!(value.get("Stale").is_none());
        assert!(value.get("Text").is_none());
    }

    #[test]
    fn test_role_normalization() {
        assert_eq!(Role::from_token("user"), Role::User);
        assert_eq!(Role::from_token(" USER "), Role::User);
        assert_eq!(Role::from_token("AI"), Role::Ai);
        assert_eq!(Role::from_token("assistant"), Role::Ai);
        assert_eq!(Role::from_token("SYSTEM"), Role::Ai);
    }
}
