// ABOUTME: Object key layout for releases and aliases.
// ABOUTME: Decides which keys are release-scoped and therefore write-once.

use serde::Serialize;

use crate::types::{ReleaseHash, SiteId, TenantId};

use super::StoreError;

/// Key segment that holds all releases of a site.
pub const RELEASES_SEGMENT: &str = "releases";

/// Name of the manifest object inside a release.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Site-relative key of the publish lock object.
pub const LOCK_OBJECT: &str = "locks/publish.json";

/// Serving slot an alias represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasSlot {
    Live,
    Preview,
}

impl AliasSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasSlot::Live => "live",
            AliasSlot::Preview => "preview",
        }
    }
}

/// Reject keys that could escape the store namespace.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = |reason| StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must be relative"));
    }
    if key.contains('\\') {
        return Err(invalid("key contains a backslash"));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("key contains an empty or dot segment"));
    }
    Ok(())
}

/// Whether `key` lives inside a release: `{tenant}/{site}/releases/{hash}/...`.
///
/// Every release-scoped key is write-once, whatever the caller's options say.
pub fn is_release_scoped(key: &str) -> bool {
    let mut segments = key.split('/');
    let (Some(_tenant), Some(_site), Some(releases), Some(hash)) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return false;
    };

    releases == RELEASES_SEGMENT
        && ReleaseHash::parse(hash).is_ok()
        && segments.any(|rest| !rest.is_empty())
}

/// Object and alias keys for one site of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseLayout {
    tenant: TenantId,
    site: SiteId,
}

impl ReleaseLayout {
    pub fn new(tenant: &TenantId, site: &SiteId) -> Self {
        Self {
            tenant: tenant.clone(),
            site: site.clone(),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn site(&self) -> &SiteId {
        &self.site
    }

    /// `{tenant}/{site}`
    pub fn site_prefix(&self) -> String {
        format!("{}/{}", self.tenant, self.site)
    }

    /// `{tenant}/{site}/releases/`
    pub fn releases_prefix(&self) -> String {
        format!("{}/{}/", self.site_prefix(), RELEASES_SEGMENT)
    }

    /// `{tenant}/{site}/releases/{hash}/`
    pub fn release_prefix(&self, release: &str) -> String {
        format!("{}{}/", self.releases_prefix(), release)
    }

    pub fn object_key(&self, release: &ReleaseHash, path: &str) -> String {
        format!("{}{}", self.release_prefix(release.as_str()), path)
    }

    pub fn manifest_key(&self, release: &str) -> String {
        format!("{}{}", self.release_prefix(release), MANIFEST_FILE)
    }

    /// `{tenant}/{site}/locks/publish.json`
    pub fn lock_key(&self) -> String {
        format!("{}/{}", self.site_prefix(), LOCK_OBJECT)
    }

    /// `{tenant}/{site}/{slot}`
    pub fn alias_key(&self, slot: AliasSlot) -> String {
        format!("{}/{}", self.site_prefix(), slot.as_str())
    }

    /// Alias target for a release, relative to the site prefix.
    pub fn alias_target(release: &str) -> String {
        format!("{}/{}", RELEASES_SEGMENT, release)
    }

    /// Extract the release identifier from an alias target.
    pub fn release_from_target(target: &str) -> Option<&str> {
        target
            .strip_prefix(RELEASES_SEGMENT)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|release| !release.is_empty() && !release.contains('/'))
    }

    /// Extract the release identifier from an object key under this site.
    pub fn release_of_key<'k>(&self, key: &'k str) -> Option<&'k str> {
        let prefix = self.releases_prefix();
        key.strip_prefix(prefix.as_str())
            .and_then(|rest| rest.split('/').next())
            .filter(|release| !release.is_empty())
    }
}
