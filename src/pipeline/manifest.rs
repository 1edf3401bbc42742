// ABOUTME: Artifact manifest and content-addressed release hashing.
// ABOUTME: Hashes canonical JSON (sorted keys, no whitespace) so identical inputs hash identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::types::{ReleaseHash, SiteId, TenantId, sha256_hex};

use super::PipelineError;

pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// One file of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    pub path: String,
    pub size: u64,
    pub content_hash: String,
    pub content_type: String,
    pub cache_control: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    pub site_id: SiteId,
    pub tenant_id: TenantId,
    /// Informational only; not part of the release hash.
    pub build_time: DateTime<Utc>,
    pub environment: String,
    #[serde(default)]
    pub revision: Option<String>,
}

/// Everything needed to reproduce and check a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub release_hash: ReleaseHash,
    /// SHA-256 of the canonical file list.
    pub integrity: String,
    pub files: Vec<ManifestFile>,
    pub metadata: ManifestMetadata,
}

/// Part of the manifest that determines the release hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedPayload<'a> {
    format_version: u32,
    files: &'a [ManifestFile],
    site_id: &'a SiteId,
    tenant_id: &'a TenantId,
    environment: &'a str,
    revision: Option<&'a str>,
}

impl ArtifactManifest {
    /// Sort `files` by path, then derive the integrity and release hashes.
    pub fn build(
        mut files: Vec<ManifestFile>,
        metadata: ManifestMetadata,
    ) -> Result<Self, PipelineError> {
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut seen = HashSet::new();
        if let Some(dup) = files.iter().find(|f| !seen.insert(f.path.as_str())) {
            return Err(PipelineError::DuplicatePath(dup.path.clone()));
        }

        let integrity = integrity_of(&files)?;
        let release_hash = release_hash_of(&files, &metadata)?;

        Ok(Self {
            format_version: MANIFEST_FORMAT_VERSION,
            release_hash,
            integrity,
            files,
            metadata,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn file(&self, path: &str) -> Option<&ManifestFile> {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .and_then(|i| self.files.get(i))
    }

    /// Recompute both hashes and compare them with the recorded values.
    pub fn verify(&self) -> Result<(), PipelineError> {
        if integrity_of(&self.files)? != self.integrity {
            return Err(PipelineError::Packaging(
                "manifest integrity hash does not match its file list".to_string(),
            ));
        }
        if release_hash_of(&self.files, &self.metadata)? != self.release_hash {
            return Err(PipelineError::Packaging(
                "manifest release hash does not match its content".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| PipelineError::Packaging(format!("failed to encode manifest: {e}")))
    }

    pub fn from_json_bytes(raw: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(raw)
            .map_err(|e| PipelineError::Packaging(format!("failed to decode manifest: {e}")))
    }
}

fn integrity_of(files: &[ManifestFile]) -> Result<String, PipelineError> {
    Ok(sha256_hex(canonical_bytes(&files)?.as_bytes()))
}

fn release_hash_of(
    files: &[ManifestFile],
    metadata: &ManifestMetadata,
) -> Result<ReleaseHash, PipelineError> {
    let payload = HashedPayload {
        format_version: MANIFEST_FORMAT_VERSION,
        files,
        site_id: &metadata.site_id,
        tenant_id: &metadata.tenant_id,
        environment: &metadata.environment,
        revision: metadata.revision.as_deref(),
    };
    Ok(ReleaseHash::digest(canonical_bytes(&payload)?.as_bytes()))
}

fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<String, PipelineError> {
    let value = serde_json::to_value(value)
        .map_err(|e| PipelineError::Packaging(format!("failed to serialize for hashing: {e}")))?;
    canonical_json(&value)
}

/// Serialize with object keys sorted and no insignificant whitespace.
pub fn canonical_json(value: &Value) -> Result<String, PipelineError> {
    let encode = |s: &str| {
        serde_json::to_string(s)
            .map_err(|e| PipelineError::Packaging(format!("failed to encode string: {e}")))
    };

    Ok(match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => encode(s)?,
        Value::Array(items) => {
            let items = items
                .iter()
                .map(canonical_json)
                .collect::<Result<Vec<_>, _>>()?;
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let mut entries = Vec::with_capacity(sorted.len());
            for (key, value) in sorted {
                entries.push(format!("{}:{}", encode(key)?, canonical_json(value)?));
            }
            format!("{{{}}}", entries.join(","))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file(path: &str, body: &[u8]) -> ManifestFile {
        ManifestFile {
            path: path.to_string(),
            size: body.len() as u64,
            content_hash: sha256_hex(body),
            content_type: "text/plain".to_string(),
            cache_control: "no-cache".to_string(),
        }
    }

    fn metadata() -> ManifestMetadata {
        ManifestMetadata {
            site_id: SiteId::parse("s1").unwrap(),
            tenant_id: TenantId::parse("t1").unwrap(),
            build_time: Utc::now(),
            environment: "production".to_string(),
            revision: None,
        }
    }

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let value = json!({ "z": [ { "y": "yes", "b": 1 }, null ], "a": { "x": 10 } });
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"x":10},"z":[{"b":1,"y":"yes"},null]}"#
        );
    }

    #[test]
    fn file_order_does_not_change_hash() {
        let a = ArtifactManifest::build(
            vec![file("b.txt", b"b"), file("a.txt", b"a")],
            metadata(),
        )
        .unwrap();
        let b = ArtifactManifest::build(
            vec![file("a.txt", b"a"), file("b.txt", b"b")],
            metadata(),
        )
        .unwrap();
        assert_eq!(a.release_hash, b.release_hash);
        assert_eq!(a.integrity, b.integrity);
        assert_eq!(a.files[0].path, "a.txt");
    }

    #[test]
    fn build_time_is_not_hashed_but_revision_is() {
        let mut later = metadata();
        later.build_time = later.build_time + chrono::Duration::hours(3);
        let base = ArtifactManifest::build(vec![file("a", b"a")], metadata()).unwrap();
        let same = ArtifactManifest::build(vec![file("a", b"a")], later).unwrap();
        assert_eq!(base.release_hash, same.release_hash);

        let mut revised = metadata();
        revised.revision = Some("abc123".to_string());
        let other = ArtifactManifest::build(vec![file("a", b"a")], revised).unwrap();
        assert_ne!(base.release_hash, other.release_hash);
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let result =
            ArtifactManifest::build(vec![file("a", b"1"), file("a", b"2")], metadata());
        assert!(matches!(result, Err(PipelineError::DuplicatePath(p)) if p == "a"));
    }

    #[test]
    fn verify_detects_tampering() {
        let mut manifest =
            ArtifactManifest::build(vec![file("a", b"a"), file("b", b"b")], metadata()).unwrap();
        assert!(manifest.verify().is_ok());
        assert!(manifest.file("b").is_some());

        manifest.files[0].size = 999;
        assert!(manifest.verify().is_err());
    }

    #[test]
    fn json_round_trip_preserves_manifest() {
        let manifest = ArtifactManifest::build(vec![file("a", b"a")], metadata()).unwrap();
        let decoded = ArtifactManifest::from_json_bytes(&manifest.to_json_bytes().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
    }
}
