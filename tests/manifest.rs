// ABOUTME: Property tests for content-addressed release hashing.
// ABOUTME: The release hash must depend on content only, never on ordering or build time.

use bytes::Bytes;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use sitepub::build::{BuildAsset, BuildOutput};
use sitepub::contract::{ContractPaths, GeneratedContract};
use sitepub::pipeline::{
    ArtifactManifest, ManifestFile, ManifestMetadata, PackageInput, canonical_json,
    package_release,
};
use sitepub::types::{SiteId, TenantId};
use std::collections::BTreeMap;

fn metadata(revision: Option<&str>) -> ManifestMetadata {
    ManifestMetadata {
        site_id: SiteId::parse("s1").unwrap(),
        tenant_id: TenantId::parse("t1").unwrap(),
        build_time: Utc::now(),
        environment: "production".to_string(),
        revision: revision.map(str::to_string),
    }
}

fn entries(files: &BTreeMap<String, Vec<u8>>) -> Vec<ManifestFile> {
    files
        .iter()
        .map(|(path, body)| ManifestFile {
            path: path.clone(),
            size: body.len() as u64,
            content_hash: sitepub::types::sha256_hex(body),
            content_type: "text/html".to_string(),
            cache_control: "no-cache".to_string(),
        })
        .collect()
}

fn file_set() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        "[a-z]{1,8}(/[a-z]{1,8}){0,2}\\.(html|css|js)",
        prop::collection::vec(any::<u8>(), 0..64),
        1..12,
    )
}

proptest! {
    #[test]
    fn hash_ignores_file_order_and_build_time(files in file_set(), seed in any::<u64>()) {
        let ordered = entries(&files);
        let mut shuffled = ordered.clone();
        let len = shuffled.len();
        shuffled.rotate_left(seed as usize % len);
        shuffled.reverse();

        let mut later = metadata(None);
        later.build_time = later.build_time + Duration::hours(3);

        let a = ArtifactManifest::build(ordered, metadata(None)).unwrap();
        let b = ArtifactManifest::build(shuffled, later).unwrap();

        prop_assert_eq!(&a.release_hash, &b.release_hash);
        prop_assert_eq!(&a.integrity, &b.integrity);
        prop_assert_eq!(a.files, b.files);
    }

    #[test]
    fn any_content_change_changes_the_hash(files in file_set(), pick in any::<prop::sample::Index>()) {
        let original = ArtifactManifest::build(entries(&files), metadata(None)).unwrap();

        let mut changed = files.clone();
        let path = pick.get(&files.keys().collect::<Vec<_>>()).to_string();
        if let Some(body) = changed.get_mut(&path) {
            body.push(0x2a);
        }
        let edited = ArtifactManifest::build(entries(&changed), metadata(None)).unwrap();

        prop_assert_ne!(original.release_hash, edited.release_hash);
    }

    #[test]
    fn canonical_json_ignores_key_order(pairs in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..10)) {
        let forward: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(*v)))
            .collect();
        let backward: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(*v)))
            .collect();

        let a = canonical_json(&serde_json::Value::Object(forward)).unwrap();
        let b = canonical_json(&serde_json::Value::Object(backward)).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert!(!a.contains(' '));
    }
}

#[test]
fn revision_is_part_of_the_release_identity() {
    let files = entries(&BTreeMap::from([(
        "index.html".to_string(),
        b"<h1>hi</h1>".to_vec(),
    )]));
    let r1 = ArtifactManifest::build(files.clone(), metadata(Some("r1"))).unwrap();
    let r2 = ArtifactManifest::build(files, metadata(Some("r2"))).unwrap();
    assert_ne!(r1.release_hash, r2.release_hash);
}

#[test]
fn manifest_survives_storage_and_verifies() {
    let contract = GeneratedContract {
        sitemap_text: "<urlset/>".to_string(),
        robots_text: "User-agent: *\n".to_string(),
        actions_json: "{}".to_string(),
        contract_json: "{}".to_string(),
    };
    let build = BuildOutput {
        assets: vec![BuildAsset {
            path: "index.html".to_string(),
            body: Bytes::from_static(b"<h1>hi</h1>"),
        }],
    };
    let (site, tenant) = (SiteId::parse("s1").unwrap(), TenantId::parse("t1").unwrap());

    let package = package_release(PackageInput {
        site_id: &site,
        tenant_id: &tenant,
        environment: "production",
        revision: None,
        contract: &contract,
        contract_paths: &ContractPaths::default(),
        build: &build,
    })
    .unwrap();

    let stored = package.manifest.to_json_bytes().unwrap();
    let loaded = ArtifactManifest::from_json_bytes(&stored).unwrap();
    loaded.verify().unwrap();
    assert_eq!(loaded, package.manifest);
    assert_eq!(loaded.files.len(), 5);
    assert!(loaded.file("index.html").is_some());

    let mut forged = loaded;
    forged.files[0].size += 1;
    assert!(forged.verify().is_err());
}

#[test]
fn duplicate_paths_are_refused() {
    let mut files = entries(&BTreeMap::from([("a.html".to_string(), b"x".to_vec())]));
    files.push(files[0].clone());
    let err = ArtifactManifest::build(files, metadata(None)).unwrap_err();
    assert_eq!(err.to_string(), "duplicate artifact path: a.html");
}
