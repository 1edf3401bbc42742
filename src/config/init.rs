// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates sitepub.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{SiteId, TenantId};

use super::{CONFIG_FILENAME, Config};

pub fn init_config(
    dir: &Path,
    site: Option<&str>,
    tenant: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(s) = site {
        config.sites.head.id = SiteId::parse(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(t) = tenant {
        config.sites.head.tenant_id =
            TenantId::parse(t).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let site = config.sites.first();
    format!(
        r#"storage:
  backend: local
  root: {}
  base_url: {}
  # presign_secret:
  #   env: SITEPUB_PRESIGN_SECRET

# cdn:
#   base_url: https://cdn.example.com
#   purge_timeout: 30s

verify:
  health_path: {}
  timeout: {}

warm:
  routes:
{}
retry:
  attempts: {}
  initial_backoff: {}
  max_backoff: {}

sites:
  - id: {}
    tenant: {}
    name: {}
    base_url: {}
    build_dir: {}
    pages:
      - path: /
"#,
        config.storage.root.display(),
        config.storage.base_url,
        config.verify.health_path,
        humantime_serde::re::humantime::format_duration(config.verify.timeout),
        config
            .warm
            .routes
            .iter()
            .map(|r| format!("    - {r}\n"))
            .collect::<String>(),
        config.retry.attempts,
        humantime_serde::re::humantime::format_duration(config.retry.initial_backoff),
        humantime_serde::re::humantime::format_duration(config.retry.max_backoff),
        site.id,
        site.tenant_id,
        site.name,
        site.base_url,
        site.build_dir
            .as_deref()
            .unwrap_or_else(|| Path::new("dist"))
            .display(),
    )
}
