//! Sync engine (spec §4.5): a pair of bounded loops — pull, then push —
//! over a single profile's items, serialized per profile (spec §5).
//!
//! Mirrors the teacher's split between a `SyncTransport` (network,
//! supplied by the caller) and the engine's own protocol logic, but the
//! protocol itself is Peek's plain last-write-wins item sync rather than
//! the teacher's encrypted CRDT merge — see DESIGN.md.

use std::sync::Arc;

use tracing::{info, warn};

use crate::datastore::DatastoreService;
use crate::error::{ErrorKind, PeekError, Result};
use crate::now_ms;
use crate::profile::{Profile, ProfileManager};
use crate::storage::StorageBackend;
use crate::types::{Item, ItemPatch, ItemType, SyncSource};

use super::iso::{from_iso, to_iso};
use super::types::{
    PushItemBody, SyncCounters, SyncStatus, SyncTransport, SyncTransportError, VersionHeaders,
};

enum PullOutcome {
    Inserted,
    Updated,
    Conflict,
    Skipped,
}

pub struct SyncEngine<B: StorageBackend, T: SyncTransport> {
    datastore: Arc<DatastoreService<B>>,
    profiles: Arc<ProfileManager>,
    transport: Arc<T>,
    datastore_version: String,
    protocol_version: String,
    client_name: String,
    // Single-flight guard (spec §4.5 syncAll: "serialized per profile").
    // One `SyncEngine` is constructed per active profile (spec §5:
    // "switching profiles requires process restart"), so a single mutex
    // here is sufficient without a profile-keyed map.
    guard: tokio::sync::Mutex<()>,
}

impl<B: StorageBackend, T: SyncTransport> SyncEngine<B, T> {
    pub fn new(
        datastore: Arc<DatastoreService<B>>,
        profiles: Arc<ProfileManager>,
        transport: Arc<T>,
        datastore_version: impl Into<String>,
        protocol_version: impl Into<String>,
        client_name: impl Into<String>,
    ) -> Self {
        Self {
            datastore,
            profiles,
            transport,
            datastore_version: datastore_version.into(),
            protocol_version: protocol_version.into(),
            client_name: client_name.into(),
            guard: tokio::sync::Mutex::new(()),
        }
    }

    fn our_headers(&self) -> VersionHeaders {
        VersionHeaders {
            datastore_version: Some(self.datastore_version.clone()),
            protocol_version: Some(self.protocol_version.clone()),
            client: Some(self.client_name.clone()),
        }
    }

    fn check_headers(&self, theirs: &VersionHeaders) -> Result<()> {
        super::types::check_version_headers(&self.our_headers(), theirs)
            .map_err(|(client, server)| PeekError::Version { client, server })
    }

    fn map_transport_err(err: SyncTransportError) -> PeekError {
        match err.kind {
            ErrorKind::Auth => PeekError::Auth(err.message),
            ErrorKind::Version => PeekError::Version {
                client: "unknown".to_string(),
                server: "unknown".to_string(),
            },
            _ => PeekError::Transport(err.message),
        }
    }

    /// spec §4.5 Pull.
    pub async fn pull(&self, profile: &Profile) -> Result<SyncCounters> {
        let since = (profile.last_sync_at > 0).then(|| to_iso(profile.last_sync_at));
        let (response, headers) = self
            .transport
            .pull(&profile.id, &profile.slug, since.as_deref())
            .await
            .map_err(Self::map_transport_err)?;
        self.check_headers(&headers)?;

        let mut counters = SyncCounters::default();
        for wire_item in &response.items {
            match self.apply_pulled_item(wire_item).await {
                Ok(PullOutcome::Inserted) | Ok(PullOutcome::Updated) => counters.pulled += 1,
                Ok(PullOutcome::Conflict) => counters.conflicts += 1,
                Ok(PullOutcome::Skipped) => {}
                Err(e) => {
                    warn!(item_id = wire_item.id.as_str(), error = %e, "pull: item failed, continuing batch");
                    counters.failed += 1;
                }
            }
        }
        Ok(counters)
    }

    async fn apply_pulled_item(&self, wire: &super::types::WireItem) -> Result<PullOutcome> {
        let server_updated_at = from_iso(&wire.updated_at)?;
        let server_created_at = from_iso(&wire.created_at)?;
        let backend = self.datastore.backend();

        match backend.find_item_by_sync_id(&wire.id).await? {
            None => {
                let item = Item {
                    id: uuid::Uuid::new_v4().to_string(),
                    item_type: ItemType::from_str(&wire.item_type).unwrap_or(ItemType::Text),
                    content: wire.content.clone(),
                    mime_type: String::new(),
                    metadata: wire.metadata.clone(),
                    sync_id: wire.id.clone(),
                    sync_source: SyncSource::Server,
                    synced_at: now_ms(),
                    created_at: server_created_at,
                    updated_at: server_updated_at,
                    deleted_at: 0,
                    starred: false,
                    archived: false,
                    visit_count: 0,
                    last_visit_at: 0,
                };
                backend.insert_item(&item).await?;
                self.reconcile_tags(&item.id, &wire.tags).await?;
                Ok(PullOutcome::Inserted)
            }
            Some(existing) if server_updated_at > existing.updated_at => {
                let patch = ItemPatch {
                    content: wire.content.clone(),
                    metadata: Some(wire.metadata.clone()),
                    updated_at: Some(server_updated_at),
                    synced_at: Some(now_ms()),
                    sync_source: Some(SyncSource::Server),
                    ..Default::default()
                };
                backend.update_item(&existing.id, &patch).await?;
                self.reconcile_tags(&existing.id, &wire.tags).await?;
                Ok(PullOutcome::Updated)
            }
            Some(existing) if existing.updated_at > server_updated_at => {
                info!(item_id = existing.id.as_str(), "pull: local wins, classified as conflict");
                Ok(PullOutcome::Conflict)
            }
            Some(_) => Ok(PullOutcome::Skipped),
        }
    }

    async fn reconcile_tags(&self, item_id: &str, tag_names: &[String]) -> Result<()> {
        self.datastore.backend().clear_for_item(item_id).await?;
        for name in tag_names {
            let (tag, _created) = self.datastore.get_or_create_tag(name).await?;
            self.datastore.backend().link(item_id, &tag.id).await?;
        }
        Ok(())
    }

    /// spec §4.5 Push.
    pub async fn push(&self, profile: &Profile) -> Result<SyncCounters> {
        let candidates = self
            .datastore
            .backend()
            .items_pending_push(profile.last_sync_at)
            .await?;

        let mut counters = SyncCounters::default();
        for item in &candidates {
            match self.push_one(profile, item).await {
                Ok(()) => counters.pushed += 1,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::Transport | ErrorKind::Version | ErrorKind::Auth
                    ) =>
                {
                    // spec §7: these abort the phase immediately; prior
                    // mutations (items already pushed) stay durable.
                    return Err(e);
                }
                Err(e) => {
                    warn!(item_id = item.id.as_str(), error = %e, "push: item failed, continuing batch");
                    counters.failed += 1;
                }
            }
        }
        Ok(counters)
    }

    async fn push_one(&self, profile: &Profile, item: &Item) -> Result<()> {
        let tags = self.datastore.get_item_tags(&item.id).await?;
        let body = PushItemBody {
            item_type: item.item_type.as_str().to_string(),
            content: item.content.clone(),
            tags: tags.into_iter().map(|t| t.name).collect(),
            metadata: Some(item.metadata.clone()),
            sync_id: (!item.sync_id.is_empty()).then(|| item.sync_id.clone()),
        };

        let (response, headers) = self
            .transport
            .push_item(&profile.id, &profile.slug, &body)
            .await
            .map_err(Self::map_transport_err)?;
        self.check_headers(&headers)?;

        let patch = ItemPatch {
            sync_id: Some(response.id),
            sync_source: Some(SyncSource::Server),
            synced_at: Some(now_ms()),
            ..Default::default()
        };
        self.datastore.backend().update_item(&item.id, &patch).await
    }

    /// spec §4.5 syncAll: pull, then push, then record `lastSyncAt`.
    /// Single-flight per profile: a concurrent call observes the guard
    /// already held and fails fast rather than running a second pull/push
    /// pair against the same connection.
    pub async fn sync_all(&self, profile: &Profile) -> Result<SyncCounters> {
        let _permit = self.guard.try_lock().map_err(|_| PeekError::Conflict {
            collection: "sync".to_string(),
            field: "in_flight".to_string(),
        })?;

        let sync_start = now_ms();
        let mut counters = self.pull(profile).await?;
        counters.merge(&self.push(profile).await?);
        self.profiles.update_last_sync_at(&profile.id, sync_start)?;
        Ok(counters)
    }

    /// spec §4.5 Status.
    pub async fn status(&self, profile: &Profile) -> Result<SyncStatus> {
        let configured = profile.sync_enabled
            && profile
                .api_key
                .as_deref()
                .map(|k| !k.is_empty())
                .unwrap_or(false);
        let pending_count = self
            .datastore
            .backend()
            .items_pending_push(profile.last_sync_at)
            .await?
            .len() as i64;
        Ok(SyncStatus {
            configured,
            pending_count,
            last_sync_at: profile.last_sync_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteBackend;
    use crate::sync::types::{PullResponse, PushItemResponse, WireItem};
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::path::Path;
    use tempfile::tempdir;

    struct FakeTransport {
        pull_responses: SyncMutex<Vec<PullResponse>>,
        pushed: SyncMutex<Vec<PushItemBody>>,
    }

    impl FakeTransport {
        fn new(pull_responses: Vec<PullResponse>) -> Self {
            Self {
                pull_responses: SyncMutex::new(pull_responses),
                pushed: SyncMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SyncTransport for FakeTransport {
        async fn pull(
            &self,
            _profile_id: &str,
            _slug: &str,
            _since: Option<&str>,
        ) -> std::result::Result<(PullResponse, VersionHeaders), SyncTransportError> {
            let response = self.pull_responses.lock().pop().unwrap_or_default();
            Ok((response, VersionHeaders::default()))
        }

        async fn push_item(
            &self,
            _profile_id: &str,
            _slug: &str,
            body: &PushItemBody,
        ) -> std::result::Result<(PushItemResponse, VersionHeaders), SyncTransportError> {
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

    fn harness(dir: &Path, pull_responses: Vec<PullResponse>) -> (SyncEngine<SqliteBackend, FakeTransport>, Arc<ProfileManager>) {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let datastore = Arc::new(DatastoreService::new(backend));
        let profiles = Arc::new(ProfileManager::open(dir).unwrap());
        let transport = Arc::new(FakeTransport::new(pull_responses));
        let engine = SyncEngine::new(datastore, profiles.clone(), transport, "3", "1", "peek-test");
        (engine, profiles)
    }

    #[tokio::test]
    async fn scenario_pull_then_no_push() {
        let dir = tempdir().unwrap();
        let response = PullResponse {
            items: vec![WireItem {
                id: "srv-1".to_string(),
                item_type: "text".to_string(),
                content: Some("hello".to_string()),
                metadata: serde_json::json!({}),
                tags: vec!["work".to_string()],
                created_at: "2024-01-01T00:00:00Z".to_string(),
                updated_at: "2024-01-01T00:00:00Z".to_string(),
            }],
        };
        let (engine, profiles) = harness(dir.path(), vec![response]);
        let profile = profiles
            .resolve_active_profile(&crate::config::Env::default(), crate::config::BuildType::Production)
            .unwrap();

        let pull_counters = engine.pull(&profile).await.unwrap();
        assert_eq!(pull_counters.pulled, 1);

        let item = engine
            .datastore
            .backend()
            .find_item_by_sync_id("srv-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.sync_id, "srv-1");
        assert_eq!(item.sync_source, SyncSource::Server);

        let tags = engine.datastore.get_item_tags(&item.id).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "work");

        let push_counters = engine.push(&profile).await.unwrap();
        assert_eq!(push_counters.pushed, 0);
    }

    #[tokio::test]
    async fn scenario_conflict_local_wins_then_repushed() {
        let dir = tempdir().unwrap();
        let (engine, profiles) = harness(dir.path(), vec![]);
        let profile = profiles
            .resolve_active_profile(&crate::config::Env::default(), crate::config::BuildType::Production)
            .unwrap();

        let backend = engine.datastore.backend();
        let item = Item {
            id: "local-1".to_string(),
            item_type: ItemType::Text,
            content: Some("local content".to_string()),
            mime_type: String::new(),
            metadata: serde_json::json!({}),
            sync_id: "srv-2".to_string(),
            sync_source: SyncSource::Server,
            synced_at: 1600,
            created_at: 1000,
            updated_at: 1700,
            deleted_at: 0,
            starred: false,
            archived: false,
            visit_count: 0,
            last_visit_at: 0,
        };
        backend.insert_item(&item).await.unwrap();

        let wire = WireItem {
            id: "srv-2".to_string(),
            item_type: "text".to_string(),
            content: Some("server content".to_string()),
            metadata: serde_json::json!({}),
            tags: vec![],
            created_at: to_iso(900),
            updated_at: to_iso(1500),
        };
        let outcome = engine.apply_pulled_item(&wire).await.unwrap();
        assert!(matches!(outcome, PullOutcome::Conflict));

        let unchanged = backend.get_item("local-1").await.unwrap().unwrap();
        assert_eq!(unchanged.content.as_deref(), Some("local content"));

        // A prior sync must have happened for the `updatedAt > syncedAt`
        // push predicate to apply (spec §4.5 Push) rather than the
        // first-sync `syncSource == ""` predicate, which this
        // server-sourced item never matches.
        profiles.update_last_sync_at(&profile.id, 1650).unwrap();
        let profile = profiles.get(&profile.id).unwrap().unwrap();

        let push_counters = engine.push(&profile).await.unwrap();
        assert_eq!(push_counters.pushed, 1);

        let repushed = backend.get_item("local-1").await.unwrap().unwrap();
        assert!(repushed.synced_at >= unchanged.updated_at);
    }

    struct MismatchedVersionTransport;

    #[async_trait]
    impl SyncTransport for MismatchedVersionTransport {
        async fn pull(
            &self,
            _profile_id: &str,
            _slug: &str,
            _since: Option<&str>,
        ) -> std::result::Result<(PullResponse, VersionHeaders), SyncTransportError> {
            Ok((
                PullResponse::default(),
                VersionHeaders {
                    datastore_version: Some("2".to_string()),
                    protocol_version: Some("1".to_string()),
                    client: None,
                },
            ))
        }

        async fn push_item(
            &self,
            _profile_id: &str,
            _slug: &str,
            _body: &PushItemBody,
        ) -> std::result::Result<(PushItemResponse, VersionHeaders), SyncTransportError> {
            unreachable!("pull aborts before push runs in this scenario")
        }
    }

    #[tokio::test]
    async fn scenario_version_mismatch_aborts_before_applying_anything() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let datastore = Arc::new(DatastoreService::new(backend));
        let profiles = Arc::new(ProfileManager::open(dir.path()).unwrap());
        let transport = Arc::new(MismatchedVersionTransport);
        let engine = SyncEngine::new(datastore, profiles.clone(), transport, "1", "1", "peek-test");

        let profile = profiles
            .resolve_active_profile(&crate::config::Env::default(), crate::config::BuildType::Production)
            .unwrap();
        let before = profile.last_sync_at;

        let err = engine.sync_all(&profile).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Version);

        let stats = engine.datastore.get_stats().await.unwrap();
        assert_eq!(stats.total_items, 0);

        let reloaded = profiles.get(&profile.id).unwrap().unwrap();
        assert_eq!(reloaded.last_sync_at, before);
    }
}
