use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One short-key → chunk-ID mapping inside a user's per-platform document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMapping {
    #[serde(rename = "shortKey")]
    pub short_key: String,
    #[serde(rename = "chunkId")]
    pub chunk_id: String,
    pub service: String,
    #[serde(rename = "resourceId")]
    pub resource_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastUsed")]
    pub last_used: DateTime<Utc>,
}

/// The per-(user, platform) mapping document, keyed `{user_id}_{platform}`.
///
/// `version` is the optimistic-concurrency guard: every rewrite filters on
/// the version it read and increments it, so concurrent writers fall back
/// to read-append-rewrite instead of clobbering each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMappingDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "chunkMappings", default)]
    pub chunk_mappings: Vec<ChunkMapping>,
    #[serde(default)]
    pub version: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl ChunkMappingDocument {
    pub fn document_id(user_id: &uuid::Uuid, platform: &str) -> String {
        format!("{}_{}", user_id, platform)
    }

    /// Locate a mapping by its short key.
    pub fn find_short_key(&self, short_key: &str) -> Option<&ChunkMapping> {
        self.chunk_mappings
            .iter()
            .find(|m| m.short_key == short_key)
    }

    /// Whether the given (short key, resource) pair is present.
    pub fn contains(&self, short_key: &str, resource_id: &str) -> bool {
        self.chunk_mappings
            .iter()
            .any(|m| m.short_key == short_key && m.resource_id == resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(short_key: &str, resource_id: &str) -> ChunkMapping {
        ChunkMapping {
            short_key: short_key.to_string(),
            chunk_id: "startoffset:0-endoffset:10".to_string(),
            service: "MICROSOFT_DRIVE".to_string(),
            resource_id: resource_id.to_string(),
            created_at: Utc::now(),
            last_used: Utc::now(),
        }
    }

    #[test]
    fn document_id_format() {
        let user = uuid::Uuid::nil();
        assert_eq!(
            ChunkMappingDocument::document_id(&user, "GOOGLE"),
            format!("{}_GOOGLE", user)
        );
    }

    #[test]
    fn find_and_contains() {
        let doc = ChunkMappingDocument {
            id: "u_GOOGLE".to_string(),
            chunk_mappings: vec![mapping("k1", "r1"), mapping("k2", "r2")],
            version: 2,
            updated_at: Utc::now(),
        };
        assert!(doc.find_short_key("k1").is_some());
        assert!(doc.find_short_key("k3").is_none());
        assert!(doc.contains("k2", "r2"));
        assert!(!doc.contains("k2", "r1"));
    }
}
