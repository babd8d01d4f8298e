//! End-to-end: a real on-disk profile directory, a `SqliteBackend` opened
//! at the path the profile manager hands back, and a full `add_item` /
//! `tag_item` / `sync_all` loop against a fake transport.

use std::sync::Arc;

use async_trait::async_trait;
use peek_datastore::config::{BuildType, Env};
use peek_datastore::profile::paths;
use peek_datastore::sync::{
    PullResponse, PushItemBody, PushItemResponse, SyncEngine, SyncTransport, SyncTransportError,
    VersionHeaders,
};
use peek_datastore::{AddItemOptions, DatastoreService, ItemType, ProfileManager, SqliteBackend};
use tempfile::tempdir;

struct RecordingTransport {
    pushed: parking_lot::Mutex<Vec<PushItemBody>>,
}

impl RecordingTransport {
    fn new() -> Self {
        Self {
            pushed: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SyncTransport for RecordingTransport {
    async fn pull(
        &self,
        _profile_id: &str,
        _slug: &str,
        _since: Option<&str>,
    ) -> Result<(PullResponse, VersionHeaders), SyncTransportError> {
        Ok((PullResponse::default(), VersionHeaders::default()))
    }

    async fn push_item(
        &self,
        _profile_id: &str,
        _slug: &str,
        body: &PushItemBody,
    ) -> Result<(PushItemResponse, VersionHeaders), SyncTransportError> {
        self.pushed.lock().push(body.clone());
        Ok((
            PushItemResponse {
                id: uuid::Uuid::new_v4().to_string(),
                created: true,
            },
            VersionHeaders::default(),
        ))
    }
}

#[tokio::test]
async fn add_tag_and_sync_a_fresh_profile_end_to_end() {
    let user_data_root = tempdir().unwrap();

    let profiles = Arc::new(ProfileManager::open(user_data_root.path()).unwrap());
    let profile = profiles
        .resolve_active_profile(&Env::default(), BuildType::Production)
        .unwrap();
    assert_eq!(profile.slug, "default");

    profiles.ensure_profile_dirs(&profile.slug).unwrap();
    let db_path = paths::datastore_path(user_data_root.path(), &profile.slug);
    assert!(db_path.parent().unwrap().is_dir());

    let backend = Arc::new(SqliteBackend::open(&db_path).unwrap());
    let datastore = Arc::new(DatastoreService::new(backend));

    let item_id = datastore
        .add_item(
            ItemType::Url,
            AddItemOptions {
                content: Some("https://example.com/a?utm_source=x".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let (tag, created) = datastore.get_or_create_tag("reading").await.unwrap();
    assert!(created);
    datastore.tag_item(&item_id, &tag.id).await.unwrap();

    let transport = Arc::new(RecordingTransport::new());
    let engine = SyncEngine::new(
        datastore.clone(),
        profiles.clone(),
        transport.clone(),
        "3",
        "1",
        "peek-test",
    );

    let counters = engine.sync_all(&profile).await.unwrap();
    assert_eq!(counters.pushed, 1);
    assert_eq!(counters.pulled, 0);

    let pushed = transport.pushed.lock();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].tags, vec!["reading".to_string()]);

    let reloaded = profiles.get(&profile.id).unwrap().unwrap();
    assert!(reloaded.last_sync_at > 0);

    let stored = datastore.get_item(&item_id).await.unwrap().unwrap();
    assert!(!stored.sync_id.is_empty());

    // A second sync with nothing new pending pushes nothing further.
    let again = engine.sync_all(&profile).await.unwrap();
    assert_eq!(again.pushed, 0);
}
