use std::fs;

use tempfile::tempdir;
use user_identity::{identity_file, IdentityError, IdentityRecord, IdentityStore};

#[test]
fn load_or_create_generates_uuid_once_and_reuses_it() {
    let dir = tempdir().expect("tempdir");
    let path = identity_file(&dir.path().join("nested"));

    let first = IdentityStore::load_or_create(&path).expect("identity should be created");
    assert!(path.exists());
    assert_eq!(first.record().version, 1);
    assert_eq!(first.user_id().len(), 36);
    assert!(uuid_like(first.user_id()));

    let second = IdentityStore::load_or_create(&path).expect("identity should be reused");
    assert_eq!(second.user_id(), first.user_id());
    assert_eq!(second.record(), first.record());
}

#[test]
fn open_rejects_unknown_fields() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("identity.json");
    fs::write(
        &path,
        r#"{"version":1,"user_id":"u","created_at":"2026-01-01T00:00:00Z","token":"x"}"#,
    )
    .expect("write identity");

    let error = IdentityStore::open(&path).expect_err("unknown fields should fail");
    assert!(matches!(error, IdentityError::Parse { .. }));
}

#[test]
fn open_rejects_invalid_timestamp_and_blank_user() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("identity.json");

    let record = IdentityRecord::v1("user-1", "yesterday");
    fs::write(&path, serde_json::to_string(&record).expect("serialize")).expect("write");
    let error = IdentityStore::open(&path).expect_err("timestamp should be validated");
    assert!(matches!(error, IdentityError::InvalidTimestamp { value, .. } if value == "yesterday"));

    let record = IdentityRecord::v1("  ", "2026-01-01T00:00:00Z");
    fs::write(&path, serde_json::to_string(&record).expect("serialize")).expect("write");
    let error = IdentityStore::open(&path).expect_err("blank user id should fail");
    assert!(matches!(error, IdentityError::EmptyUserId { .. }));
}

#[test]
fn load_or_create_surfaces_corrupt_file_instead_of_replacing_it() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("identity.json");
    fs::write(&path, "not json").expect("write");

    let error = IdentityStore::load_or_create(&path).expect_err("corrupt file should fail");
    assert!(matches!(error, IdentityError::Parse { .. }));
    assert_eq!(fs::read_to_string(&path).expect("read"), "not json");
}

fn uuid_like(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_hexdigit() || c == '-')
        && value.matches('-').count() == 4
}
