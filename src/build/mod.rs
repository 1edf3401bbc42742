// ABOUTME: Site build step: produces the static assets of a release.
// ABOUTME: DirectoryBuilder collects a prebuilt output directory, NoopBuilder ships contract only.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::contract::Site;

/// Caller-supplied knobs for a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildParameters {
    pub environment: String,
    #[serde(default)]
    pub feature_flags: BTreeMap<String, String>,
    #[serde(default)]
    pub custom_domain: Option<String>,
}

impl Default for BuildParameters {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            feature_flags: BTreeMap::new(),
            custom_domain: None,
        }
    }
}

/// One built file, addressed by its release-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAsset {
    pub path: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    pub assets: Vec<BuildAsset>,
}

impl BuildOutput {
    pub fn total_bytes(&self) -> u64 {
        self.assets.iter().map(|a| a.body.len() as u64).sum()
    }
}

/// Produces the assets for a site.
#[async_trait]
pub trait SiteBuilder: Send + Sync {
    async fn build(&self, site: &Site, params: &BuildParameters) -> Result<BuildOutput, BuildError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("build failed: {0}")]
    Failed(String),
}

/// Builder for sites without assets of their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBuilder;

#[async_trait]
impl SiteBuilder for NoopBuilder {
    async fn build(&self, site: &Site, _params: &BuildParameters) -> Result<BuildOutput, BuildError> {
        tracing::debug!(site = %site.id, "no build step configured");
        Ok(BuildOutput::default())
    }
}

/// Collects every file under the site's `build_dir`.
///
/// A site without a `build_dir` builds to an empty output.
#[derive(Debug, Clone, Default)]
pub struct DirectoryBuilder {
    /// Resolves relative `build_dir` values.
    base: Option<PathBuf>,
}

impl DirectoryBuilder {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        match &self.base {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl SiteBuilder for DirectoryBuilder {
    async fn build(&self, site: &Site, params: &BuildParameters) -> Result<BuildOutput, BuildError> {
        let Some(dir) = site.build_dir.as_deref() else {
            return Ok(BuildOutput::default());
        };
        let root = self.resolve(dir);
        tracing::info!(site = %site.id, dir = %root.display(), env = %params.environment, "collecting build output");

        tokio::task::spawn_blocking(move || collect_dir(&root))
            .await
            .map_err(|e| BuildError::Failed(format!("build task failed: {e}")))?
    }
}

fn collect_dir(root: &Path) -> Result<BuildOutput, BuildError> {
    if !root.is_dir() {
        return Err(BuildError::MissingDirectory(root.to_path_buf()));
    }

    let mut assets = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| BuildError::Failed(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let body = std::fs::read(entry.path()).map_err(|source| BuildError::Io {
            path: entry.path().to_path_buf(),
            source,
        })?;
        assets.push(BuildAsset {
            path,
            body: Bytes::from(body),
        });
    }
    Ok(BuildOutput { assets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SiteId, TenantId};

    fn site(build_dir: Option<PathBuf>) -> Site {
        Site {
            id: SiteId::parse("s1").unwrap(),
            tenant_id: TenantId::parse("t1").unwrap(),
            name: "s1".to_string(),
            base_url: "http://localhost".to_string(),
            publishable: true,
            pages: Vec::new(),
            actions: Vec::new(),
            build_dir,
        }
    }

    #[tokio::test]
    async fn collects_nested_files_with_slash_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "console.log(1)").unwrap();

        let output = DirectoryBuilder::default()
            .build(&site(Some(dir.path().to_path_buf())), &BuildParameters::default())
            .await
            .unwrap();

        let paths: Vec<_> = output.assets.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["assets/app.js", "index.html"]);
        assert_eq!(output.total_bytes(), 25);
    }

    #[tokio::test]
    async fn relative_build_dir_resolves_against_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/index.html"), "x").unwrap();

        let output = DirectoryBuilder::new(dir.path())
            .build(&site(Some(PathBuf::from("dist"))), &BuildParameters::default())
            .await
            .unwrap();
        assert_eq!(output.assets.len(), 1);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let result = DirectoryBuilder::default()
            .build(
                &site(Some(PathBuf::from("/definitely/not/here"))),
                &BuildParameters::default(),
            )
            .await;
        assert!(matches!(result, Err(BuildError::MissingDirectory(_))));
    }

    #[tokio::test]
    async fn site_without_build_dir_builds_nothing() {
        let output = DirectoryBuilder::default()
            .build(&site(None), &BuildParameters::default())
            .await
            .unwrap();
        assert!(output.assets.is_empty());
    }
}
