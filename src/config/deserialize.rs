// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles the site list and warm routes, both of which must be non-empty.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashSet;

use crate::contract::Site;

pub fn deserialize_sites<'de, D>(deserializer: D) -> Result<NonEmpty<Site>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let sites: Vec<Site> = Vec::deserialize(deserializer)?;

    let mut seen = HashSet::new();
    for site in &sites {
        if !seen.insert((site.tenant_id.clone(), site.id.clone())) {
            return Err(serde::de::Error::custom(format!(
                "site {} is configured twice for tenant {}",
                site.id, site.tenant_id
            )));
        }
    }

    NonEmpty::from_vec(sites).ok_or_else(|| serde::de::Error::custom("at least one site is required"))
}

pub fn deserialize_routes<'de, D>(deserializer: D) -> Result<NonEmpty<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let routes: Vec<RouteEntry> = Vec::deserialize(deserializer)?;
    let routes = routes
        .into_iter()
        .map(RouteEntry::into_route)
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(routes)
        .ok_or_else(|| serde::de::Error::custom("warm routes list cannot be empty"))
}

/// A route given as a bare path or as `{ path: ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RouteEntry {
    Simple(String),
    Detailed { path: String },
}

impl RouteEntry {
    fn into_route(self) -> Result<String, String> {
        let path = match self {
            RouteEntry::Simple(path) | RouteEntry::Detailed { path } => path,
        };
        if path.starts_with('/') {
            Ok(path)
        } else {
            Err(format!("warm route '{path}' must start with '/'"))
        }
    }
}
