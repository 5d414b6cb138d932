//! HTTP API exposing the tree mutation port and item CRUD endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::sse::{self, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use nodeflow_core::events::Event;
use nodeflow_core::storage::{
    ItemRecord, ItemUpdate, NewItem, ParentSuggestion, RecordStore, PARENT_LOOKUP_LIMIT,
};
use nodeflow_core::{DropGesture, Node, NodeId, TreeController, TreeError, ValidationError};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Shared application state: the live tree and the records behind it.
#[derive(Clone)]
pub struct AppState {
    pub controller: TreeController,
    pub store: Arc<RwLock<RecordStore>>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

#[derive(Deserialize)]
struct ToggleRequest {
    id: NodeId,
}

#[derive(Serialize)]
struct ToggleResponse {
    selected: bool,
    selection: Vec<NodeId>,
}

#[derive(Deserialize)]
struct DragStartRequest {
    source: NodeId,
}

#[derive(Serialize)]
struct MovedResponse {
    moved: Vec<NodeId>,
}

#[derive(Deserialize)]
struct ParentQuery {
    #[serde(default)]
    q: String,
}

pub fn router(controller: TreeController, store: Arc<RwLock<RecordStore>>) -> Router {
    let app_state = AppState { controller, store };
    Router::new()
        .route("/tree", get(get_tree))
        .route("/selection", get(get_selection))
        .route("/selection/toggle", post(toggle_selection))
        .route("/drag/start", post(drag_start))
        .route("/drag/end", post(drag_end))
        .route("/drop", post(drop_nodes))
        .route("/items", post(create_item))
        .route(
            "/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/parents", get(lookup_parents))
        .route("/events", get(event_stream))
        .with_state(app_state)
}

async fn get_tree(State(state): State<AppState>) -> Json<Vec<Node>> {
    let tree = state.controller.tree();
    Json(tree.flatten().into_iter().cloned().collect())
}

async fn get_selection(State(state): State<AppState>) -> Json<Vec<NodeId>> {
    Json(state.controller.selection())
}

async fn toggle_selection(
    State(state): State<AppState>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>, ApiError> {
    match state.controller.toggle_select(&req.id) {
        Ok(selected) => Ok(Json(ToggleResponse {
            selected,
            selection: state.controller.selection(),
        })),
        Err(err @ ValidationError::DragInProgress) => Err(api_error(StatusCode::CONFLICT, err)),
        Err(err @ ValidationError::Tree(TreeError::NodeNotFound(_))) => {
            Err(api_error(StatusCode::NOT_FOUND, err))
        }
        Err(err) => Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, err)),
    }
}

async fn drag_start(
    State(state): State<AppState>,
    Json(req): Json<DragStartRequest>,
) -> Result<Json<MovedResponse>, ApiError> {
    state
        .controller
        .on_drag_start(req.source)
        .map(|moved| Json(MovedResponse { moved }))
        .map_err(|err| api_error(StatusCode::NOT_FOUND, err))
}

async fn drag_end(State(state): State<AppState>) -> StatusCode {
    state.controller.on_drag_end();
    StatusCode::NO_CONTENT
}

/// Apply a drop locally and answer at once; the store's verdict arrives on
/// the event stream.
async fn drop_nodes(
    State(state): State<AppState>,
    Json(gesture): Json<DropGesture>,
) -> Result<(StatusCode, Json<MovedResponse>), ApiError> {
    let pending = state
        .controller
        .on_drop(gesture)
        .map_err(|err| api_error(StatusCode::UNPROCESSABLE_ENTITY, err))?;
    let moved = pending.moved().to_vec();
    Ok((StatusCode::ACCEPTED, Json(MovedResponse { moved })))
}

/// Only absolute http(s) links are stored; blank means none.
fn check_resource_link(link: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(link) = link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    let uri: Uri = link
        .parse()
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, format!("invalid resource link '{link}'")))?;
    let web = matches!(uri.scheme_str(), Some("http" | "https"));
    if !web || uri.authority().is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("resource link must be an http(s) URL: '{link}'"),
        ));
    }
    Ok(Some(link))
}

/// Rebuild the live tree from the records, as a page re-fetch would.
fn refresh(state: &AppState, store: &RecordStore) -> Result<(), ApiError> {
    let tree = store.to_tree().map_err(|err| {
        error!(%err, "records no longer form a tree");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, err)
    })?;
    state
        .controller
        .reload(tree)
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err))
}

async fn create_item(
    State(state): State<AppState>,
    Json(mut item): Json<NewItem>,
) -> Result<(StatusCode, Json<ItemRecord>), ApiError> {
    item.resource_link = check_resource_link(item.resource_link)?;
    let mut store = state.store.write().await;
    let record = store
        .create(item)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err))?;
    refresh(&state, &store)?;
    drop(store);
    state.controller.events().send(Event::Created {
        id: record.id.clone(),
    });
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<ItemRecord>, ApiError> {
    let store = state.store.read().await;
    store
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("item {id} not found")))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Json(mut update): Json<ItemUpdate>,
) -> Result<Json<ItemRecord>, ApiError> {
    update.resource_link = check_resource_link(update.resource_link)?;
    let mut store = state.store.write().await;
    if store.get(&id).is_none() {
        return Err(api_error(StatusCode::NOT_FOUND, format!("item {id} not found")));
    }
    let record = store
        .update(&id, update)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err))?;
    refresh(&state, &store)?;
    drop(store);
    state.controller.events().send(Event::Updated { id });
    Ok(Json(record))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<StatusCode, ApiError> {
    let mut store = state.store.write().await;
    if store.get(&id).is_none() {
        return Err(api_error(StatusCode::NOT_FOUND, format!("item {id} not found")));
    }
    let removed = store
        .delete(&id)
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err))?;
    refresh(&state, &store)?;
    drop(store);
    for id in removed {
        state.controller.events().send(Event::Deleted { id });
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn lookup_parents(
    State(state): State<AppState>,
    Query(query): Query<ParentQuery>,
) -> Json<Vec<ParentSuggestion>> {
    let store = state.store.read().await;
    Json(store.lookup_parents(query.q.trim(), PARENT_LOOKUP_LIMIT))
}

async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    debug!("event stream opened");
    let stream = state.controller.events().stream().filter_map(|evt| async move {
        let data = serde_json::to_string(&evt).ok()?;
        Some(Ok(sse::Event::default().data(data)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
