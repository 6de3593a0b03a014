//! REST API for the load planner.
//!
//! Provides HTTP endpoints for planning clients.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, PlannerConfig, RemoteConfig};
use crate::model::{
    Item, LayoutFragment, RejectedItem, RejectionReason, Section, VehicleSpec, VehicleType,
};
use crate::optimizer::{
    LayoutResult, LayoutSummary, PlanningConfig, compute_layout_with_config,
    compute_layout_with_progress, compute_vehicle_layout,
};
use crate::remote::{RemoteOptimizer, RemoteOptimizerError};
use crate::types::{Category, GridBounds, GridPosition};

#[derive(Clone)]
struct ApiState {
    planning: PlanningConfig,
    remote: Option<RemoteOptimizer>,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>beam_stacker API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the single-section endpoints.
///
/// `section` defaults to `full`.
#[derive(Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "items": [
            { "productId": "HEB-200", "quantity": 25, "length": 6.0, "weight": 61.3 },
            { "productId": "L-50", "quantity": 40, "length": 2.5 }
        ],
        "vehicle": { "type": "SINGLE", "length": 13.6, "maxWeight": 24000.0 },
        "section": "full"
    })
)]
pub struct LayoutRequest {
    pub items: Vec<Item>,
    pub vehicle: VehicleSpec,
    #[serde(default)]
    pub section: Section,
}

/// Request structure for the whole-vehicle endpoint.
#[derive(Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLayoutRequest {
    pub items: Vec<Item>,
    pub vehicle: VehicleSpec,
}

/// Planned layout of one section.
///
/// # Fields
/// * `fragments` - Placed and unplaced item slices
/// * `rejected_items` - Items excluded before planning
/// * `is_complete` - Whether every unit received a cell
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResponse {
    pub fragments: Vec<LayoutFragment>,
    pub rejected_items: Vec<RejectedItem>,
    pub summary: LayoutSummary,
    pub is_complete: bool,
}

impl From<LayoutResult> for LayoutResponse {
    fn from(result: LayoutResult) -> Self {
        let is_complete = result.is_complete();
        let LayoutResult {
            fragments,
            rejected_items,
            summary,
        } = result;
        Self {
            fragments,
            rejected_items,
            summary,
            is_complete,
        }
    }
}

/// Planned layouts of every section of a vehicle.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLayoutResponse {
    pub sections: Vec<LayoutResponse>,
    pub is_complete: bool,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn vehicle_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid vehicle specification",
        details,
    )
}

fn planning_task_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Planning task failed",
        details,
    )
}

fn remote_error(err: RemoteOptimizerError) -> Response {
    let status = match err {
        RemoteOptimizerError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    error_response(status, "Remote optimizer failed", err.to_string())
}

fn parse_layout_request(
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> Result<LayoutRequest, Response> {
    let Json(request) = payload.map_err(json_deserialize_error)?;
    request
        .vehicle
        .validate()
        .map_err(|err| vehicle_config_error(err.to_string()))?;
    Ok(request)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_layout,
        handle_layout_stream,
        handle_vehicle_layout,
        handle_remote_layout
    ),
    components(
        schemas(
            LayoutRequest,
            VehicleLayoutRequest,
            LayoutResponse,
            VehicleLayoutResponse,
            ErrorResponse,
            Item,
            VehicleSpec,
            VehicleType,
            Section,
            LayoutFragment,
            RejectedItem,
            RejectionReason,
            LayoutSummary,
            GridPosition,
            GridBounds,
            Category
        )
    ),
    tags((name = "layout", description = "Endpoints for load-grid planning"))
)]
struct ApiDoc;

fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/layout", post(handle_layout))
        .route("/layout_stream", post(handle_layout_stream))
        .route("/layout/vehicle", post(handle_vehicle_layout))
        .route("/layout/remote", post(handle_remote_layout))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Configures CORS for cross-origin requests.
/// Blocks until the server is terminated.
pub async fn start_api_server(
    config: ApiConfig,
    planner: PlannerConfig,
    remote: RemoteConfig,
) -> std::io::Result<()> {
    let planning = planner.planning_config();
    let remote = if remote.is_enabled() {
        match RemoteOptimizer::from_config(&remote, planning) {
            Ok(optimizer) => Some(optimizer),
            Err(err) => {
                warn!("⚠️ Remote optimizer disabled: {}", err);
                None
            }
        }
    } else {
        None
    };

    let app = build_router(ApiState { planning, remote });

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        error!("❌ Could not bind API server to {}: {}", addr, err);
        err
    })?;

    info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API endpoints: POST /layout, /layout_stream, /layout/vehicle, /layout/remote");
    info!("📑 Documentation: GET /docs, /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /layout endpoint.
///
/// Plans the items onto one section of the vehicle.
#[utoipa::path(
    post,
    path = "/layout",
    request_body = LayoutRequest,
    responses(
        (status = 200, description = "Layout computed", body = LayoutResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or vehicle specification",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_layout(
    State(state): State<ApiState>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> Response {
    let LayoutRequest {
        items,
        vehicle,
        section,
    } = match parse_layout_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        "📥 New layout request: {} items, section {}, row length {:.2}m",
        items.len(),
        section,
        vehicle.section_length(section)
    );
    let planning = state.planning;
    let result = tokio::task::spawn_blocking(move || {
        compute_layout_with_config(&items, &vehicle, section, planning)
    })
    .await;

    match result {
        Ok(result) => {
            info!(
                "📦 Result: {} placed / {} unplaced packages, {} rejected items",
                result.summary.placed_packages,
                result.summary.unplaced_packages,
                result.rejected_items.len()
            );
            (StatusCode::OK, Json(LayoutResponse::from(result))).into_response()
        }
        Err(err) => planning_task_error(err.to_string()),
    }
}

/// Handler for POST /layout_stream endpoint (SSE).
///
/// Streams planning events in real-time as Server-Sent Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/layout_stream",
    request_body = LayoutRequest,
    responses(
        (
            status = 200,
            description = "Streams planning events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or vehicle specification",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_layout_stream(
    State(state): State<ApiState>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> Response {
    let LayoutRequest {
        items,
        vehicle,
        section,
    } = match parse_layout_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);
    let planning = state.planning;

    tokio::task::spawn_blocking(move || {
        let _ = compute_layout_with_progress(&items, &vehicle, section, planning, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver means the client went away; later events are dropped.
                let _ = tx.blocking_send(json);
            }
        });
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /layout/vehicle endpoint.
///
/// Plans every cargo section; articulated vehicles get a front and a rear plan.
#[utoipa::path(
    post,
    path = "/layout/vehicle",
    request_body = VehicleLayoutRequest,
    responses(
        (status = 200, description = "Layouts computed", body = VehicleLayoutResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or vehicle specification",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_vehicle_layout(
    State(state): State<ApiState>,
    payload: Result<Json<VehicleLayoutRequest>, JsonRejection>,
) -> Response {
    let Json(VehicleLayoutRequest { items, vehicle }) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    if let Err(err) = vehicle.validate() {
        return vehicle_config_error(err.to_string());
    }

    info!("📥 New vehicle layout request: {} items", items.len());
    let planning = state.planning;
    let layout =
        tokio::task::spawn_blocking(move || compute_vehicle_layout(&items, &vehicle, planning))
            .await;

    match layout {
        Ok(layout) => {
            let is_complete = layout.is_complete();
            let response = VehicleLayoutResponse {
                sections: layout
                    .sections
                    .into_iter()
                    .map(LayoutResponse::from)
                    .collect(),
                is_complete,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => planning_task_error(err.to_string()),
    }
}

/// Handler for POST /layout/remote endpoint.
///
/// Delegates placement to the configured remote optimizer.
#[utoipa::path(
    post,
    path = "/layout/remote",
    request_body = LayoutRequest,
    responses(
        (status = 200, description = "Remote layout validated and assembled", body = LayoutResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or vehicle specification",
            body = ErrorResponse
        ),
        (status = BAD_GATEWAY, description = "Remote optimizer failed", body = ErrorResponse),
        (
            status = SERVICE_UNAVAILABLE,
            description = "Remote optimizer not configured",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_remote_layout(
    State(state): State<ApiState>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> Response {
    let request = match parse_layout_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let Some(optimizer) = state.remote.as_ref() else {
        return remote_error(RemoteOptimizerError::NotConfigured);
    };

    info!(
        "📥 New remote layout request: {} items, section {}",
        request.items.len(),
        request.section
    );
    match optimizer
        .compute_layout(&request.items, &request.vehicle, request.section)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(LayoutResponse::from(result))).into_response(),
        Err(err) => {
            warn!("⚠️ Remote layout failed: {}", err);
            remote_error(err)
        }
    }
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
