// ABOUTME: Config-backed site catalog and template contract generator.
// ABOUTME: Rendering is deterministic so identical sites yield byte-identical files.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::{
    ContractError, ContractGenerator, ContractOptions, ContractPaths, GeneratedContract, Page,
    Site, SiteAction, SiteRepository,
};
use crate::types::{SiteId, TenantId};

const CONTRACT_VERSION: &str = "1";

/// Sites known to this process.
#[derive(Debug, Clone, Default)]
pub struct SiteCatalog {
    sites: HashMap<SiteId, Site>,
}

impl SiteCatalog {
    pub fn new(sites: impl IntoIterator<Item = Site>) -> Self {
        Self {
            sites: sites
                .into_iter()
                .map(|site| (site.id.clone(), site))
                .collect(),
        }
    }

    pub fn insert(&mut self, site: Site) {
        self.sites.insert(site.id.clone(), site);
    }

    pub fn get(&self, id: &SiteId) -> Option<&Site> {
        self.sites.get(id)
    }
}

#[async_trait]
impl SiteRepository for SiteCatalog {
    async fn find_by_id(&self, site: &SiteId, tenant: &TenantId) -> Result<Site, ContractError> {
        let found = self
            .sites
            .get(site)
            .ok_or_else(|| ContractError::SiteNotFound(site.clone()))?;

        if &found.tenant_id != tenant {
            return Err(ContractError::TenantMismatch {
                site: site.clone(),
                tenant: tenant.clone(),
            });
        }
        Ok(found.clone())
    }
}

#[async_trait]
impl ContractGenerator for SiteCatalog {
    async fn generate_contract(
        &self,
        site: &Site,
        opts: &ContractOptions,
    ) -> Result<GeneratedContract, ContractError> {
        render_contract(site, opts)
    }
}

/// Render the four contract files for `site`.
pub(crate) fn render_contract(
    site: &Site,
    opts: &ContractOptions,
) -> Result<GeneratedContract, ContractError> {
    let base = opts
        .base_url
        .as_deref()
        .unwrap_or(&site.base_url)
        .trim_end_matches('/');
    let paths = ContractPaths::default();
    let pages = page_paths(&site.pages);

    let actions = ActionsDocument {
        version: CONTRACT_VERSION,
        site: site.id.as_str(),
        actions: &site.actions,
    };
    let contract = ContractDocument {
        version: CONTRACT_VERSION,
        site: ContractSite {
            id: site.id.as_str(),
            tenant: site.tenant_id.as_str(),
            name: &site.name,
            base_url: base,
        },
        indexable: !opts.preview,
        pages: &pages,
        actions: &site.actions,
        files: &paths,
    };

    Ok(GeneratedContract {
        sitemap_text: render_sitemap(base, &pages),
        robots_text: render_robots(base, opts.preview),
        actions_json: to_json(&actions)?,
        contract_json: to_json(&contract)?,
    })
}

/// Sorted, de-duplicated page paths; an empty site still has its root.
fn page_paths(pages: &[Page]) -> Vec<String> {
    let mut paths: BTreeSet<String> = pages
        .iter()
        .map(|page| {
            if page.path.starts_with('/') {
                page.path.clone()
            } else {
                format!("/{}", page.path)
            }
        })
        .collect();
    if paths.is_empty() {
        paths.insert("/".to_string());
    }
    paths.into_iter().collect()
}

fn render_sitemap(base: &str, pages: &[String]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for path in pages {
        xml.push_str("  <url><loc>");
        xml.push_str(&escape_xml(&format!("{base}{path}")));
        xml.push_str("</loc></url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn render_robots(base: &str, preview: bool) -> String {
    if preview {
        "User-agent: *\nDisallow: /\n".to_string()
    } else {
        format!("User-agent: *\nAllow: /\n\nSitemap: {base}/sitemap.xml\n")
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ContractError> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| ContractError::Generation(e.to_string()))?;
    json.push('\n');
    Ok(json)
}

#[derive(Serialize)]
struct ActionsDocument<'a> {
    version: &'a str,
    site: &'a str,
    actions: &'a [SiteAction],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContractDocument<'a> {
    version: &'a str,
    site: ContractSite<'a>,
    indexable: bool,
    pages: &'a [String],
    actions: &'a [SiteAction],
    files: &'a ContractPaths,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContractSite<'a> {
    id: &'a str,
    tenant: &'a str,
    name: &'a str,
    base_url: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Site {
        Site {
            id: SiteId::parse("s1").unwrap(),
            tenant_id: TenantId::parse("t1").unwrap(),
            name: "Docs & Guides".to_string(),
            base_url: "https://docs.test/".to_string(),
            publishable: true,
            pages: vec![
                Page {
                    path: "/pricing".to_string(),
                    title: None,
                },
                Page {
                    path: "about".to_string(),
                    title: Some("About".to_string()),
                },
            ],
            actions: vec![SiteAction {
                name: "search".to_string(),
                description: None,
                method: "GET".to_string(),
                path: "/search".to_string(),
            }],
            build_dir: None,
        }
    }

    #[tokio::test]
    async fn find_by_id_checks_ownership() {
        let catalog = SiteCatalog::new([site()]);
        let s1 = SiteId::parse("s1").unwrap();

        assert!(
            catalog
                .find_by_id(&s1, &TenantId::parse("t1").unwrap())
                .await
                .is_ok()
        );
        assert!(matches!(
            catalog.find_by_id(&s1, &TenantId::parse("t2").unwrap()).await,
            Err(ContractError::TenantMismatch { .. })
        ));
        assert!(matches!(
            catalog
                .find_by_id(&SiteId::parse("nope").unwrap(), &TenantId::parse("t1").unwrap())
                .await,
            Err(ContractError::SiteNotFound(_))
        ));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render_contract(&site(), &ContractOptions::default()).unwrap();
        let b = render_contract(&site(), &ContractOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sitemap_lists_sorted_pages_under_base_url() {
        let contract = render_contract(&site(), &ContractOptions::default()).unwrap();
        let about = contract
            .sitemap_text
            .find("https://docs.test/about")
            .unwrap();
        let pricing = contract
            .sitemap_text
            .find("https://docs.test/pricing")
            .unwrap();
        assert!(about < pricing);
        assert!(
            contract
                .robots_text
                .contains("Sitemap: https://docs.test/sitemap.xml")
        );
    }

    #[test]
    fn preview_contract_disallows_crawlers() {
        let opts = ContractOptions {
            base_url: Some("https://preview.test".to_string()),
            preview: true,
        };
        let contract = render_contract(&site(), &opts).unwrap();
        assert_eq!(contract.robots_text, "User-agent: *\nDisallow: /\n");
        assert!(contract.sitemap_text.contains("https://preview.test/about"));

        let doc: serde_json::Value = serde_json::from_str(&contract.contract_json).unwrap();
        assert_eq!(doc["indexable"], false);
        assert_eq!(doc["site"]["name"], "Docs & Guides");
    }

    #[test]
    fn empty_site_still_lists_root() {
        let mut bare = site();
        bare.pages.clear();
        let contract = render_contract(&bare, &ContractOptions::default()).unwrap();
        assert!(contract.sitemap_text.contains("<loc>https://docs.test/</loc>"));
    }
}
