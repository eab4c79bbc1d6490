/*
* Read-only HTTP surface over the accounting engine and snapshot projector
* ------------------------------------------------------------------------
*
* GET {prefix}/accounting/granularity           - configured charge granularity
* GET {prefix}/accounting/elapsed?owner=ID      - rounded minutes of closed intervals
* GET {prefix}/accounting/reserved?owner=ID     - rounded minutes of open intervals, as of now
* GET {prefix}/accounting/total?owner=ID        - both of the above, from one ledger read
* GET {prefix}/accounting/breakdown?owner=ID    - the same pair, unsummed
* GET {prefix}/vms?node=&group_id=&owner=&state=- filtered VM snapshots
* GET {prefix}/vms/{id}                         - one VM snapshot
*
* Owner identities travel as a query parameter because credential subjects
* (e.g. "/O=Grid/CN=Alice") are full of slashes.
*/

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::accounting::{AccountingEngine, ElapsedAndReservedMinutes};
use crate::api::error::{ErrorNumber, ErrorResponse};
use crate::core::{SnapshotFilter, SnapshotProjector, VMSnapshot, VMStatus};

#[derive(Clone)]
pub struct AppState {
    pub engine: AccountingEngine,
    pub projector: SnapshotProjector,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

impl OwnerQuery {
    /// Unwraps the extracted query, turning a missing or undecodable `owner`
    /// into the same JSON error a blank owner gets.
    fn from_request(query: Result<Query<Self>, QueryRejection>) -> Result<Self, ErrorResponse> {
        query.map(|Query(query)| query).map_err(|rejection| {
            ErrorResponse::new(StatusCode::BAD_REQUEST, ErrorNumber::InvalidOwner, rejection.body_text())
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VmListQuery {
    pub node: Option<String>,
    pub group_id: Option<String>,
    pub owner: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MinutesResponse {
    pub owner: String,
    pub minutes: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GranularityResponse {
    pub charge_granularity_minutes: u32,
}

pub fn create_router(app_state: Arc<AppState>, api_prefix: &str) -> Router {
    let api = Router::new()
        .route("/accounting/granularity", get(get_granularity))
        .route("/accounting/elapsed", get(get_elapsed))
        .route("/accounting/reserved", get(get_reserved))
        .route("/accounting/total", get(get_total))
        .route("/accounting/breakdown", get(get_breakdown))
        .route("/vms", get(list_vms))
        .route("/vms/{id}", get(get_vm));

    let prefix = api_prefix.trim_end_matches('/');
    let router = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(prefix, api)
    };

    router
        .fallback(fallback_handler)
        .with_state(app_state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn get_granularity(State(state): State<Arc<AppState>>) -> Json<GranularityResponse> {
    Json(GranularityResponse {
        charge_granularity_minutes: state.engine.charge_granularity().minutes(),
    })
}

async fn get_elapsed(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> Result<Json<MinutesResponse>, ErrorResponse> {
    let query = OwnerQuery::from_request(query)?;
    let minutes = state.engine.total_elapsed_minutes(&query.owner).await?;
    Ok(Json(MinutesResponse {
        owner: query.owner,
        minutes,
    }))
}

async fn get_reserved(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> Result<Json<MinutesResponse>, ErrorResponse> {
    let query = OwnerQuery::from_request(query)?;
    let minutes = state.engine.current_reserved_minutes(&query.owner).await?;
    Ok(Json(MinutesResponse {
        owner: query.owner,
        minutes,
    }))
}

async fn get_total(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> Result<Json<MinutesResponse>, ErrorResponse> {
    let query = OwnerQuery::from_request(query)?;
    let minutes = state
        .engine
        .total_elapsed_and_reserved_minutes(&query.owner)
        .await?;
    Ok(Json(MinutesResponse {
        owner: query.owner,
        minutes,
    }))
}

async fn get_breakdown(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> Result<Json<ElapsedAndReservedMinutes>, ErrorResponse> {
    let query = OwnerQuery::from_request(query)?;
    let tuple = state
        .engine
        .total_elapsed_and_reserved_minutes_tuple(&query.owner)
        .await?;
    Ok(Json(tuple))
}

async fn list_vms(
    State(state): State<Arc<AppState>>,
    query: Result<Query<VmListQuery>, QueryRejection>,
) -> Result<Json<Vec<VMSnapshot>>, ErrorResponse> {
    let Query(query) = query.map_err(|rejection| {
        ErrorResponse::new(StatusCode::BAD_REQUEST, ErrorNumber::InvalidFilter, rejection.body_text())
    })?;
    let status = query
        .state
        .as_deref()
        .map(str::parse::<VMStatus>)
        .transpose()
        .map_err(|e| ErrorResponse::new(StatusCode::BAD_REQUEST, ErrorNumber::InvalidFilter, e.to_string()))?;

    let filter = SnapshotFilter {
        node: query.node,
        group_id: query.group_id,
        owner: query.owner,
        state: status,
    };
    Ok(Json(state.projector.list_snapshots(&filter).await?))
}

async fn get_vm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VMSnapshot>, ErrorResponse> {
    Ok(Json(state.projector.get_snapshot(&id).await?))
}

async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    warn!("No route for {}", uri);
    ErrorResponse::new(
        StatusCode::NOT_FOUND,
        ErrorNumber::NotFound,
        format!("no route for {}", uri.path()),
    )
}
