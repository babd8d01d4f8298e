//! The seven endpoints of spec §4.6's behavior table.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use peek_datastore::sync::{from_iso, to_iso, WireItem};
use peek_datastore::{
    AddItemOptions, DatastoreService, ItemFilter, ItemPatch, ItemType, SortBy, SqliteBackend,
    StorageBackend, SyncSource,
};

use crate::error::AppError;
use crate::{AppState, DATASTORE_VERSION, PROTOCOL_VERSION};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/items", get(list_items).post(push_item))
        .route("/items/since/{iso}", get(list_items_since))
        .route("/items/{id}", get(get_item).delete(delete_item))
        .route("/items/{id}/tags", patch(replace_tags))
        .route("/tags", get(list_tags))
        .with_state(Arc::new(state))
        .layer(axum::middleware::from_fn(attach_version_headers))
}

async fn attach_version_headers(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        "X-Peek-Datastore-Version",
        DATASTORE_VERSION.parse().unwrap(),
    );
    headers.insert(
        "X-Peek-Protocol-Version",
        PROTOCOL_VERSION.parse().unwrap(),
    );
    response
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    profile: String,
    slug: String,
}

fn bearer_user_id(headers: &HeaderMap) -> Result<String, AppError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| peek_datastore::PeekError::Auth("missing Authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| peek_datastore::PeekError::Auth("expected Bearer token".into()).into())
}

fn resolve_backend(
    state: &AppState,
    headers: &HeaderMap,
    query: &ProfileQuery,
) -> Result<Arc<SqliteBackend>, AppError> {
    let user_id = bearer_user_id(headers)?;
    // spec §4.5: "so that a server migrating from slug-keyed to
    // UUID-keyed profile storage can resolve either" — this mirror keys
    // purely on slug; `profile` is accepted and ignored beyond validation.
    if query.profile.is_empty() && query.slug.is_empty() {
        return Err(peek_datastore::PeekError::validation("profile or slug is required").into());
    }
    Ok(state.pool.get_or_open(&user_id, &query.slug)?)
}

fn item_to_wire(item: &peek_datastore::Item, tags: Vec<String>) -> WireItem {
    WireItem {
        id: if item.sync_id.is_empty() {
            item.id.clone()
        } else {
            item.sync_id.clone()
        },
        item_type: item.item_type.as_str().to_string(),
        content: item.content.clone(),
        metadata: item.metadata.clone(),
        tags,
        created_at: to_iso(item.created_at),
        updated_at: to_iso(item.updated_at),
    }
}

async fn tags_for(backend: &Arc<SqliteBackend>, item_id: &str) -> Result<Vec<String>, AppError> {
    let names = backend
        .get_tags_for_item(item_id)
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect();
    Ok(names)
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<Vec<WireItem>>, AppError> {
    let backend = resolve_backend(&state, &headers, &query)?;
    let items = backend
        .list_items(&ItemFilter {
            sort_by: SortBy::Updated,
            ..Default::default()
        })
        .await?;

    let mut wire = Vec::with_capacity(items.len());
    for item in &items {
        wire.push(item_to_wire(item, tags_for(&backend, &item.id).await?));
    }
    Ok(Json(wire))
}

async fn list_items_since(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(iso): Path<String>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<Vec<WireItem>>, AppError> {
    let since_ms = from_iso(&iso)?;
    let backend = resolve_backend(&state, &headers, &query)?;
    let items = backend
        .list_items(&ItemFilter {
            since: Some(since_ms),
            sort_by: SortBy::Updated,
            ..Default::default()
        })
        .await?;

    let mut wire = Vec::with_capacity(items.len());
    for item in &items {
        wire.push(item_to_wire(item, tags_for(&backend, &item.id).await?));
    }
    Ok(Json(wire))
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<WireItem>, AppError> {
    let backend = resolve_backend(&state, &headers, &query)?;
    let item = backend
        .get_item(&id)
        .await?
        .ok_or_else(|| peek_datastore::PeekError::not_found("item", id.clone()))?;
    let tags = tags_for(&backend, &item.id).await?;
    Ok(Json(item_to_wire(&item, tags)))
}

#[derive(Debug, Deserialize)]
struct PushBody {
    #[serde(rename = "type")]
    item_type: String,
    content: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    metadata: Option<serde_json::Value>,
    sync_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct PushResponse {
    id: String,
    created: bool,
}

/// spec §4.6: `POST /items` — upsert by `sync_id`.
async fn push_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ProfileQuery>,
    Json(body): Json<PushBody>,
) -> Result<Json<PushResponse>, AppError> {
    let backend = resolve_backend(&state, &headers, &query)?;
    let item_type = ItemType::from_str(&body.item_type)
        .ok_or_else(|| peek_datastore::PeekError::validation(format!("unknown item type {:?}", body.item_type)))?;

    let existing = match &body.sync_id {
        Some(sid) => backend.find_item_by_sync_id(sid).await?,
        None => None,
    };

    let (item_id, created) = match existing {
        Some(item) => {
            let patch = ItemPatch {
                content: body.content.clone(),
                metadata: body.metadata.clone(),
                updated_at: Some(peek_datastore::now_ms()),
                ..Default::default()
            };
            backend.update_item(&item.id, &patch).await?;
            (item.id, false)
        }
        None => {
            let datastore = DatastoreService::new(backend.clone());
            let id = datastore
                .add_item(
                    item_type,
                    AddItemOptions {
                        content: body.content.clone(),
                        metadata: body.metadata.clone(),
                        ..Default::default()
                    },
                )
                .await?;
            let sync_id = body.sync_id.clone().unwrap_or_else(|| id.clone());
            backend
                .update_item(
                    &id,
                    &ItemPatch {
                        sync_id: Some(sync_id),
                        sync_source: Some(SyncSource::Server),
                        ..Default::default()
                    },
                )
                .await?;
            (id, true)
        }
    };

    replace_tag_set(&backend, &item_id, &body.tags).await?;

    Ok(Json(PushResponse {
        id: item_id,
        created,
    }))
}

async fn replace_tag_set(backend: &Arc<SqliteBackend>, item_id: &str, tags: &[String]) -> Result<(), AppError> {
    let datastore = DatastoreService::new(backend.clone());
    backend.clear_for_item(item_id).await?;
    for name in tags {
        let (tag, _) = datastore.get_or_create_tag(name).await?;
        backend.link(item_id, &tag.id).await?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ReplaceTagsBody {
    tags: Vec<String>,
}

async fn replace_tags(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ProfileQuery>,
    Json(body): Json<ReplaceTagsBody>,
) -> Result<StatusCode, AppError> {
    let backend = resolve_backend(&state, &headers, &query)?;
    backend
        .get_item(&id)
        .await?
        .ok_or_else(|| peek_datastore::PeekError::not_found("item", id.clone()))?;
    replace_tag_set(&backend, &id, &body.tags).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ProfileQuery>,
) -> Result<StatusCode, AppError> {
    let backend = resolve_backend(&state, &headers, &query)?;
    backend.soft_delete_item(&id, peek_datastore::now_ms()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct TagOut {
    id: String,
    name: String,
    slug: String,
    frecency_score: f64,
}

async fn list_tags(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<Vec<TagOut>>, AppError> {
    let backend = resolve_backend(&state, &headers, &query)?;
    let datastore = DatastoreService::new(backend);
    let tags = datastore.get_tags_by_frecency().await?;
    Ok(Json(
        tags.into_iter()
            .map(|t| TagOut {
                id: t.id,
                name: t.name,
                slug: t.slug,
                frecency_score: t.frecency_score,
            })
            .collect(),
    ))
}
