//! Integration tests: expand JSON fixtures and compare against golden output.
//!
//! Fixtures live in `tests/fixtures/realms/` at the workspace root:
//! - `db.json`: permissions database snapshot
//! - `chromium.json`: a project realms config
//! - `chromium_expanded.json`: its expected expansion
//! - `internal.json`: a config for the internal project

use realms_core::config::{parse_permissions_db, parse_realms_config};
use realms_core::types::INTERNAL_PROJECT;
use realms_core::{expand_realms, ExpandError, ExpandedRealms, StaticPermissionsDb};

const DB: &str = include_str!("../../../tests/fixtures/realms/db.json");
const CHROMIUM: &str = include_str!("../../../tests/fixtures/realms/chromium.json");
const CHROMIUM_EXPANDED: &str =
    include_str!("../../../tests/fixtures/realms/chromium_expanded.json");
const INTERNAL: &str = include_str!("../../../tests/fixtures/realms/internal.json");

fn db() -> StaticPermissionsDb {
    parse_permissions_db(DB).expect("db fixture parses")
}

#[test]
fn chromium_matches_golden_output() {
    let config = parse_realms_config(CHROMIUM).expect("config fixture parses");
    let expanded = expand_realms(&db(), "chromium", &config).expect("expands");
    let golden: ExpandedRealms =
        serde_json::from_str(CHROMIUM_EXPANDED).expect("golden fixture parses");
    assert_eq!(expanded, golden);
}

#[test]
fn chromium_serializes_identically_every_time() {
    let db = db();
    let config = parse_realms_config(CHROMIUM).unwrap();
    let first = serde_json::to_vec(&expand_realms(&db, "chromium", &config).unwrap()).unwrap();
    let second = serde_json::to_vec(&expand_realms(&db, "chromium", &config).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn internal_project_uses_internal_roles() {
    let db = db();
    let config = parse_realms_config(INTERNAL).unwrap();

    // Internal roles are rejected for regular projects.
    assert!(matches!(
        expand_realms(&db, "chromium", &config),
        Err(ExpandError::Validation(_))
    ));

    let expanded = expand_realms(&db, INTERNAL_PROJECT, &config).unwrap();
    assert_eq!(
        expanded.permissions,
        vec!["luci.builds.get", "luci.builds.list", "luci.realms.admin"]
    );
    let names: Vec<&str> = expanded.realms.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["@internal:@legacy", "@internal:@root"]);

    // No implicit `project:` principal anywhere.
    for realm in &expanded.realms {
        for binding in &realm.bindings {
            assert!(binding.principals.iter().all(|p| !p.starts_with("project:")));
        }
    }

    let legacy = &expanded.realms[0].bindings;
    assert_eq!(legacy.len(), 2);
    assert_eq!(legacy[0].permissions, vec![0, 1]);
    assert_eq!(legacy[0].principals, vec!["group:all"]);
    assert_eq!(legacy[1].permissions, vec![2]);
    assert_eq!(legacy[1].principals, vec!["group:administrators"]);
}

#[test]
fn disallowed_attribute_is_rejected() {
    let json = r#"{
        "realms": [{
            "name": "ci",
            "bindings": [{
                "role": "role/buildbucket.reader",
                "principals": ["group:all"],
                "conditions": [{"restrict": {"attribute": "os", "values": ["linux"]}}]
            }]
        }]
    }"#;
    let config = parse_realms_config(json).unwrap();
    match expand_realms(&db(), "chromium", &config) {
        Err(ExpandError::Validation(err)) => {
            assert_eq!(err.path, "realms[0].bindings[0].conditions[0].restrict.attribute")
        }
        other => panic!("unexpected result {:?}", other),
    }
}
