// ABOUTME: Integration tests for sitepub.yml parsing and validation.
// ABOUTME: Covers defaults, overrides, discovery, and rejected configurations.

use sitepub::config::{Config, EnvValue, StorageBackend, init_config};
use sitepub::error::Error;
use sitepub::pipeline::LockPolicy;
use sitepub::types::{SiteId, TenantId};
use std::time::Duration;

const MINIMAL: &str = r#"
sites:
  - id: docs
    tenant: acme
    name: Docs
    base_url: https://docs.acme.test
"#;

#[test]
fn minimal_config_gets_defaults() {
    let config = Config::from_yaml(MINIMAL).unwrap();

    assert_eq!(config.storage.backend, StorageBackend::Local);
    assert_eq!(config.storage.base_url, "http://localhost:8080");
    assert!(config.cdn.base_url.is_none());
    assert_eq!(config.cdn.purge_timeout, Duration::from_secs(30));
    assert_eq!(config.verify.health_path, "/");
    assert!(config.verify.check_sitemap);
    assert_eq!(config.warm.routes.len(), 4);
    assert_eq!(config.concurrency.lock_policy, LockPolicy::Reject);
    assert_eq!(config.concurrency.upload_concurrency, 8);

    let site = config.sites.first();
    assert!(site.publishable);
    assert!(site.pages.is_empty());
}

#[test]
fn full_config_overrides_defaults() {
    let yaml = r#"
storage:
  backend: memory
  base_url: https://origin.acme.test
cdn:
  base_url: https://cdn.acme.test
  purge_timeout: 10s
verify:
  health_path: /healthz
  check_sitemap: false
  timeout: 2s
warm:
  routes:
    - /
    - path: /pricing
  timeout: 500ms
retry:
  attempts: 5
  initial_backoff: 100ms
  max_backoff: 2s
concurrency:
  lock_policy: queue
  upload_concurrency: 2
sites:
  - id: docs
    tenant: acme
    name: Docs
    base_url: https://docs.acme.test
    publishable: false
    build_dir: public
    pages:
      - path: /
        title: Home
      - path: /guide
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let settings = config.pipeline_settings();

    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(settings.warm.routes, vec!["/", "/pricing"]);
    assert_eq!(settings.warm.timeout, Duration::from_millis(500));
    assert_eq!(settings.warm.purge_timeout, Duration::from_secs(10));
    assert_eq!(settings.verify.health_path, "/healthz");
    assert!(!settings.verify.check_sitemap);
    assert_eq!(settings.retry.attempts, 5);
    assert_eq!(settings.retry.initial_backoff, Duration::from_millis(100));
    assert_eq!(settings.lock_policy, LockPolicy::Queue);
    assert_eq!(settings.upload_concurrency, 2);

    let site = config.sites.first();
    assert!(!site.publishable);
    assert_eq!(site.pages.len(), 2);
}

#[test]
fn empty_site_list_is_rejected() {
    assert!(matches!(Config::from_yaml("sites: []"), Err(Error::Yaml(_))));
}

#[test]
fn duplicate_sites_are_rejected() {
    let yaml = r#"
sites:
  - { id: docs, tenant: acme, name: A, base_url: "https://a.test" }
  - { id: docs, tenant: acme, name: B, base_url: "https://b.test" }
"#;
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("configured twice"));
}

#[test]
fn same_site_id_for_two_tenants_needs_a_tenant() {
    let yaml = r#"
sites:
  - { id: docs, tenant: acme, name: A, base_url: "https://a.test" }
  - { id: docs, tenant: globex, name: B, base_url: "https://b.test" }
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let docs = SiteId::parse("docs").unwrap();

    assert!(matches!(config.site(&docs, None), Err(Error::InvalidConfig(_))));
    let globex = TenantId::parse("globex").unwrap();
    assert_eq!(config.site(&docs, Some(&globex)).unwrap().name, "B");
    assert!(matches!(
        config.site(&SiteId::parse("blog").unwrap(), None),
        Err(Error::UnknownSite(_))
    ));
}

#[test]
fn invalid_values_are_rejected() {
    let cases = [
        (
            "sites: [{ id: docs, tenant: acme, name: A, base_url: \"ftp://a.test\" }]",
            "base_url",
        ),
        (
            "verify: { health_path: healthz }\nsites: [{ id: docs, tenant: acme, name: A, base_url: \"https://a.test\" }]",
            "health_path",
        ),
        (
            "retry: { attempts: 0 }\nsites: [{ id: docs, tenant: acme, name: A, base_url: \"https://a.test\" }]",
            "attempts",
        ),
        (
            "concurrency: { upload_concurrency: 0 }\nsites: [{ id: docs, tenant: acme, name: A, base_url: \"https://a.test\" }]",
            "upload_concurrency",
        ),
    ];

    for (yaml, field) in cases {
        match Config::from_yaml(yaml) {
            Err(Error::InvalidConfig(msg)) => assert!(msg.contains(field), "{msg}"),
            other => panic!("expected invalid config for {field}, got {other:?}"),
        }
    }
}

#[test]
fn warm_routes_must_be_absolute() {
    let yaml = r#"
warm:
  routes: [pricing]
sites:
  - { id: docs, tenant: acme, name: A, base_url: "https://a.test" }
"#;
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("must start with '/'"));
}

#[test]
fn site_ids_must_be_path_safe() {
    let yaml = r#"
sites:
  - { id: "../etc", tenant: acme, name: A, base_url: "https://a.test" }
"#;
    assert!(Config::from_yaml(yaml).is_err());
}

#[test]
fn discover_finds_config_and_resolves_build_dirs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("sitepub.yaml"),
        "sites: [{ id: docs, tenant: acme, name: A, base_url: \"https://a.test\", build_dir: out }]",
    )
    .unwrap();

    let config = Config::discover(dir.path()).unwrap();
    assert_eq!(config.base_dir, dir.path());

    let catalog = config.catalog();
    let site = catalog.get(&SiteId::parse("docs").unwrap()).unwrap();
    assert_eq!(site.build_dir.as_deref(), Some(dir.path().join("out").as_path()));
}

#[test]
fn discover_without_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Config::discover(dir.path()),
        Err(Error::ConfigNotFound(_))
    ));
}

#[test]
fn init_writes_a_loadable_template() {
    let dir = tempfile::tempdir().unwrap();
    init_config(dir.path(), Some("blog"), Some("acme"), false).unwrap();

    let config = Config::discover(dir.path()).unwrap();
    let site = config.sites.first();
    assert_eq!(site.id.as_str(), "blog");
    assert_eq!(site.tenant_id.as_str(), "acme");

    assert!(matches!(
        init_config(dir.path(), None, None, false),
        Err(Error::AlreadyExists(_))
    ));
    init_config(dir.path(), None, None, true).unwrap();
}

#[test]
fn presign_secret_reads_environment() {
    let yaml = r#"
storage:
  presign_secret:
    env: SITEPUB_IT_PRESIGN_SECRET
sites:
  - { id: docs, tenant: acme, name: A, base_url: "https://a.test" }
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let secret = config.storage.presign_secret.clone().unwrap();
    assert_eq!(
        secret,
        EnvValue::FromEnv {
            var: "SITEPUB_IT_PRESIGN_SECRET".to_string(),
            default: None,
        }
    );

    temp_env::with_var("SITEPUB_IT_PRESIGN_SECRET", Some("from-env"), || {
        assert_eq!(secret.resolve().unwrap(), "from-env");
    });
    temp_env::with_var_unset("SITEPUB_IT_PRESIGN_SECRET", || {
        assert!(matches!(secret.resolve(), Err(Error::MissingEnvVar(_))));
    });
}

#[test]
fn memory_backend_opens_without_a_directory() {
    let config = Config::from_yaml(
        "storage: { backend: memory }\nsites: [{ id: docs, tenant: acme, name: A, base_url: \"https://a.test\" }]",
    )
    .unwrap();
    let store = config.storage.open(std::path::Path::new("/nonexistent")).unwrap();
    assert_eq!(
        store.public_url("acme/docs/live"),
        "http://localhost:8080/acme/docs/live"
    );
}
