//! End-to-end scenarios run against both backends.

use serde_json::json;
use shelfdb_core::{check, Collection, Config, ErrorKind, Version, VersioningPolicy};
use tempfile::tempdir;

const BACKENDS: [&str; 2] = ["", "sqlite://collection.sqlite"];

#[test]
fn create_list_delete() {
    for dsn in BACKENDS {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scenario.ds");
        let mut c = Collection::init(&path, Config::new().dsn(dsn)).unwrap();

        c.create("1", &json!({"one": 1})).unwrap();
        c.create("2", &json!({"two": 2})).unwrap();
        assert_eq!(c.keys().unwrap(), vec!["1", "2"], "dsn {dsn:?}");
        assert_eq!(c.len().unwrap(), 2);

        c.delete("1").unwrap();
        assert_eq!(c.keys().unwrap(), vec!["2"]);
        c.close().unwrap();

        check(&path, false).unwrap();
    }
}

#[test]
fn crud_consistency() {
    for dsn in BACKENDS {
        let dir = tempdir().unwrap();
        let mut c = Collection::init(dir.path().join("crud.ds"), Config::new().dsn(dsn)).unwrap();

        c.create("Mixed-Case", &json!({"v": 1})).unwrap();
        assert!(c.has_key("mixed-case").unwrap());
        assert_eq!(
            c.create("MIXED-CASE", &json!({"v": 9})).unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(c.read("mixed-case").unwrap(), json!({"v": 1}));

        c.update("mixed-case", &json!({"v": 2})).unwrap();
        assert_eq!(c.read("MIXED-case").unwrap(), json!({"v": 2}));

        c.delete("mixed-case").unwrap();
        assert!(!c.has_key("mixed-case").unwrap());
        assert_eq!(c.read("mixed-case").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            c.update("mixed-case", &json!({})).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(c.delete("mixed-case").unwrap_err().kind(), ErrorKind::NotFound);
    }
}

#[test]
fn patch_versions_are_monotonic() {
    for dsn in BACKENDS {
        let dir = tempdir().unwrap();
        let config = Config::new().dsn(dsn).versioning(VersioningPolicy::Patch);
        let mut c = Collection::init(dir.path().join("v.ds"), config).unwrap();

        c.create("doc", &json!({"rev": 0})).unwrap();
        for rev in 1..=3 {
            c.update("doc", &json!({ "rev": rev })).unwrap();
        }

        let versions = c.versions("doc").unwrap();
        assert_eq!(
            versions,
            vec![Version::new(0, 0, 1), Version::new(0, 0, 2), Version::new(0, 0, 3)]
        );
        for (rev, version) in versions.iter().enumerate() {
            assert_eq!(
                c.read_version("doc", &version.to_string()).unwrap(),
                json!({ "rev": rev })
            );
        }
        assert_eq!(c.read("doc").unwrap(), json!({"rev": 3}));

        c.delete("doc").unwrap();
        c.create("doc", &json!({})).unwrap();
        assert!(c.versions("doc").unwrap().is_empty());
    }
}

#[test]
fn major_policy_starts_at_one() {
    let dir = tempdir().unwrap();
    let config = Config::new().versioning(VersioningPolicy::Major);
    let mut c = Collection::init(dir.path().join("major.ds"), config).unwrap();
    c.create("k", &json!({"a": 1})).unwrap();
    c.update("k", &json!({"a": 2})).unwrap();
    c.update("k", &json!({"a": 3})).unwrap();
    assert_eq!(
        c.versions("k").unwrap(),
        vec![Version::new(1, 0, 0), Version::new(2, 0, 0)]
    );
}

#[test]
fn frames_follow_refresh_on_both_backends() {
    for dsn in BACKENDS {
        let dir = tempdir().unwrap();
        let mut c = Collection::init(dir.path().join("f.ds"), Config::new().dsn(dsn)).unwrap();
        c.create("k1", &json!({"a": 1})).unwrap();
        c.create("k2", &json!({"a": 2})).unwrap();

        let keys = vec!["k1".to_string(), "k2".to_string()];
        let frame = c
            .frame_create("f", &keys, &[".a".to_string()], &["A".to_string()], false)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&frame.objects).unwrap(),
            json!([{"A": 1}, {"A": 2}])
        );

        c.delete("k1").unwrap();
        c.frame_refresh("f", false).unwrap();
        assert_eq!(c.frame_keys("f").unwrap(), vec!["k2"]);
        assert_eq!(
            serde_json::to_value(c.frame_objects("f").unwrap()).unwrap(),
            json!([{"A": 2}])
        );
    }
}

#[test]
fn reopen_preserves_everything() {
    for dsn in BACKENDS {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.ds");
        let config = Config::new().dsn(dsn).versioning(VersioningPolicy::Minor);
        let mut c = Collection::init(&path, config).unwrap();
        c.create("a", &json!({"n": 1})).unwrap();
        c.update("a", &json!({"n": 2})).unwrap();
        c.frame_create("f", &["a".to_string()], &[".n".to_string()], &[], false)
            .unwrap();
        c.close().unwrap();

        let c = Collection::open(&path).unwrap();
        assert_eq!(c.read("a").unwrap(), json!({"n": 2}));
        assert_eq!(c.read_version("a", "0.1.0").unwrap(), json!({"n": 1}));
        assert_eq!(c.frame_names(), vec!["f"]);
        assert_eq!(c.frame_grid("f", true).unwrap(), vec![vec![json!("n")], vec![json!(2)]]);
    }
}
