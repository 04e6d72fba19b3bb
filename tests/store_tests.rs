use napster_provider::store::{keys, JsonFileStore, MemoryStore, SessionStore};
use tempfile::tempdir;

#[test]
fn memory_store_round_trips_values() {
    let store = MemoryStore::new();
    assert!(store.read(keys::ACCESS_TOKEN).is_none());
    store.write(keys::ACCESS_TOKEN, "token").expect("write");
    assert_eq!(store.read(keys::ACCESS_TOKEN).as_deref(), Some("token"));
}

#[test]
fn json_file_store_persists_across_reopen() {
    let dir = tempdir().expect("tmpdir");
    let path = dir.path().join("session.json");

    {
        let store = JsonFileStore::open(&path).expect("open");
        store.write(keys::ACCESS_TOKEN, "token").expect("write");
        store.write(keys::EXPIRY_TIME, "1735689600").expect("write");
        store.write(keys::CATALOG_REGION, "US").expect("write");
    }

    let store = JsonFileStore::open(&path).expect("reopen");
    assert_eq!(store.read(keys::ACCESS_TOKEN).as_deref(), Some("token"));
    assert_eq!(store.read(keys::EXPIRY_TIME).as_deref(), Some("1735689600"));
    assert_eq!(store.read(keys::CATALOG_REGION).as_deref(), Some("US"));
}

#[test]
fn json_file_store_creates_missing_parent_dirs() {
    let dir = tempdir().expect("tmpdir");
    let path = dir.path().join("nested/config/session.json");

    let store = JsonFileStore::open(&path).expect("open");
    store.write(keys::ACCESS_TOKEN, "token").expect("write");
    assert!(path.exists());
}

#[test]
fn json_file_store_rejects_corrupt_contents() {
    let dir = tempdir().expect("tmpdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, "not json").expect("seed file");

    assert!(JsonFileStore::open(&path).is_err());
}
