// ABOUTME: Release packaging: contract files plus build assets become hashed manifest entries.
// ABOUTME: Assigns content types and cache policies per file.

use bytes::Bytes;
use chrono::Utc;

use crate::build::BuildOutput;
use crate::contract::{ContractPaths, GeneratedContract, is_contract_path};
use crate::store::validate_key;
use crate::types::{SiteId, TenantId, sha256_hex};

use super::PipelineError;
use super::manifest::{ArtifactManifest, ManifestFile, ManifestMetadata};

/// Cache policy for crawler-facing and document files.
pub const NO_CACHE: &str = "no-cache";

/// Cache policy for versioned assets.
pub const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("mjs", "application/javascript; charset=utf-8"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain; charset=utf-8"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("wasm", "application/wasm"),
    ("pdf", "application/pdf"),
    ("webmanifest", "application/manifest+json"),
];

/// Content type inferred from the file extension.
pub fn content_type_for(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return "application/octet-stream";
    };
    let ext = ext.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, ct)| *ct)
        .unwrap_or("application/octet-stream")
}

/// Contract files and HTML documents are revalidated; everything else is
/// content-addressed and cached forever.
pub fn cache_policy_for(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    if is_contract_path(path) || lower.ends_with(".html") || lower.ends_with(".htm") {
        NO_CACHE
    } else {
        IMMUTABLE_CACHE
    }
}

/// A file ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedFile {
    pub entry: ManifestFile,
    pub body: Bytes,
}

/// Manifest plus the bodies it describes, in manifest order.
#[derive(Debug, Clone)]
pub struct ReleasePackage {
    pub manifest: ArtifactManifest,
    pub files: Vec<PackagedFile>,
}

/// Inputs for [`package_release`].
#[derive(Debug, Clone, Copy)]
pub struct PackageInput<'a> {
    pub site_id: &'a SiteId,
    pub tenant_id: &'a TenantId,
    pub environment: &'a str,
    pub revision: Option<&'a str>,
    pub contract: &'a GeneratedContract,
    pub contract_paths: &'a ContractPaths,
    pub build: &'a BuildOutput,
}

fn packaged(path: &str, body: Bytes) -> PackagedFile {
    PackagedFile {
        entry: ManifestFile {
            path: path.to_string(),
            size: body.len() as u64,
            content_hash: sha256_hex(&body),
            content_type: content_type_for(path).to_string(),
            cache_control: cache_policy_for(path).to_string(),
        },
        body,
    }
}

/// Hash every artifact and build the release manifest.
pub fn package_release(input: PackageInput<'_>) -> Result<ReleasePackage, PipelineError> {
    let mut files: Vec<PackagedFile> = input
        .contract
        .files(input.contract_paths)
        .into_iter()
        .map(|(path, text)| packaged(path, Bytes::copy_from_slice(text.as_bytes())))
        .collect();

    for asset in &input.build.assets {
        if validate_key(&asset.path).is_err() {
            return Err(PipelineError::Packaging(format!(
                "invalid asset path: {:?}",
                asset.path
            )));
        }
        files.push(packaged(&asset.path, asset.body.clone()));
    }

    files.sort_by(|a, b| a.entry.path.cmp(&b.entry.path));

    let manifest = ArtifactManifest::build(
        files.iter().map(|f| f.entry.clone()).collect(),
        ManifestMetadata {
            site_id: input.site_id.clone(),
            tenant_id: input.tenant_id.clone(),
            build_time: Utc::now(),
            environment: input.environment.to_string(),
            revision: input.revision.map(str::to_string),
        },
    )?;

    tracing::info!(
        release = %manifest.release_hash.short(),
        files = manifest.files.len(),
        bytes = manifest.total_bytes(),
        "packaged release"
    );

    Ok(ReleasePackage { manifest, files })
}
