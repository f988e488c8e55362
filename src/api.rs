//! REST API for the loading service.
//!
//! Provides HTTP endpoints for communication with visualisation clients.
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
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, OptimizerConfig};
use crate::genetic::{
    ChromosomeKind, GeneticConfig, GeneticError, GeneticEvent, LoadPlan, optimize_until,
};
use crate::model::{ContainerSpec, ItemRecord, Package, ValidationError, expand_items};
use crate::optimizer::PackingConfig;
use crate::report::{LoadReport, ReportContainer, ReportItem, ReportPosition, ReportSize};

#[derive(Clone)]
struct ApiState {
    optimizer_config: OptimizerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>load-it-now API Docs</title>
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

/// Optional per-request overrides of the genetic search settings.
#[derive(Deserialize, Clone, Debug, Default, ToSchema)]
pub struct GeneticOverrides {
    #[schema(nullable = true)]
    pub population_size: Option<usize>,
    #[schema(nullable = true)]
    pub generations: Option<usize>,
    #[schema(nullable = true)]
    pub mutation_rate: Option<f64>,
    #[schema(nullable = true)]
    pub group_shuffle_rate: Option<f64>,
    #[schema(nullable = true)]
    pub variant: Option<ChromosomeKind>,
    #[schema(nullable = true)]
    pub seed: Option<u64>,
}

impl GeneticOverrides {
    fn apply(self, base: GeneticConfig) -> GeneticConfig {
        GeneticConfig {
            population_size: self.population_size.unwrap_or(base.population_size),
            generations: self.generations.unwrap_or(base.generations),
            mutation_rate: self.mutation_rate.unwrap_or(base.mutation_rate),
            group_shuffle_rate: self.group_shuffle_rate.unwrap_or(base.group_shuffle_rate),
            kind: self.variant.unwrap_or(base.kind),
            seed: self.seed.or(base.seed),
            ..base
        }
    }
}

/// Request structure for the loading endpoints.
#[derive(Deserialize, Clone, ToSchema)]
#[schema(
    example = json!({
        "container": { "length": 13620.0, "width": 2480.0, "height": 2670.0 },
        "items": [
            { "length": 660.0, "width": 940.0, "height": 1203.0, "quantity": 6 },
            { "length": 660.0, "width": 920.0, "height": 1248.0, "quantity": 4 }
        ],
        "genetic": { "generations": 20, "variant": "grouping" }
    })
)]
pub struct LoadRequest {
    pub container: ContainerSpec,
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub genetic: Option<GeneticOverrides>,
}

#[derive(Debug)]
struct ValidatedLoadRequest {
    spec: ContainerSpec,
    packages: Vec<Package>,
    genetic: GeneticConfig,
}

#[derive(Debug)]
enum LoadRequestValidationError {
    MissingItems,
    InvalidContainer(ValidationError),
    InvalidItem(ValidationError),
    InvalidGenetic(GeneticError),
}

impl LoadRequest {
    fn into_validated(
        self,
        base: GeneticConfig,
    ) -> Result<ValidatedLoadRequest, LoadRequestValidationError> {
        if self.items.is_empty() {
            return Err(LoadRequestValidationError::MissingItems);
        }

        self.container
            .validate()
            .map_err(LoadRequestValidationError::InvalidContainer)?;

        let packages =
            expand_items(&self.items).map_err(LoadRequestValidationError::InvalidItem)?;

        let genetic = self.genetic.unwrap_or_default().apply(base);
        genetic
            .validate()
            .map_err(LoadRequestValidationError::InvalidGenetic)?;

        Ok(ValidatedLoadRequest {
            spec: self.container,
            packages,
            genetic,
        })
    }
}

/// Package that could not be loaded.
#[derive(Serialize, Clone, Debug, ToSchema)]
pub struct UnplacedItem {
    pub item_id: usize,
    pub group_id: usize,
    pub size: ReportSize,
    pub reason_code: String,
    pub reason: String,
}

/// Response structure with the viewer payload and search statistics.
#[derive(Serialize, Clone, Debug, ToSchema)]
pub struct LoadResponse {
    pub report: LoadReport,
    pub fitness: f64,
    /// Item ids in the order they were offered to the container
    pub load_order: Vec<usize>,
    pub unplaced: Vec<UnplacedItem>,
    pub is_complete: bool,
    pub utilization_percent: f64,
    pub loading_meters: f64,
}

impl LoadResponse {
    pub fn from_plan(plan: &LoadPlan) -> Self {
        Self {
            report: LoadReport::from_plan(plan),
            fitness: plan.fitness,
            load_order: plan.load_order.clone(),
            unplaced: plan
                .unplaced
                .iter()
                .map(|entry| UnplacedItem {
                    item_id: entry.package.item_id,
                    group_id: entry.package.group_id,
                    size: ReportSize {
                        width: entry.package.width,
                        height: entry.package.height,
                        depth: entry.package.depth,
                    },
                    reason_code: entry.reason.code().to_string(),
                    reason: entry.reason.to_string(),
                })
                .collect(),
            is_complete: plan.is_complete(),
            utilization_percent: plan.container.utilization_percent(),
            loading_meters: plan.container.loading_meters(),
        }
    }
}

/// Terminal messages on the event stream, after the `GeneticEvent`s.
#[derive(Serialize)]
#[serde(tag = "type")]
enum StreamEvent {
    Report { response: LoadResponse },
    Error { details: String },
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

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn container_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid container configuration",
        details,
    )
}

fn genetic_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid genetic search configuration",
        details,
    )
}

fn parse_load_request(
    payload: Result<Json<LoadRequest>, JsonRejection>,
    base: GeneticConfig,
) -> Result<ValidatedLoadRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated(base) {
        Ok(validated) => Ok(validated),
        Err(LoadRequestValidationError::MissingItems) => {
            Err(validation_error("At least one item must be specified"))
        }
        Err(LoadRequestValidationError::InvalidContainer(err)) => {
            Err(container_config_error(err.to_string()))
        }
        Err(LoadRequestValidationError::InvalidItem(err)) => Err(validation_error(err.to_string())),
        Err(LoadRequestValidationError::InvalidGenetic(err)) => {
            Err(genetic_config_error(err.to_string()))
        }
    }
}

fn run_plan(
    request: ValidatedLoadRequest,
    packing: PackingConfig,
    should_stop: impl Fn() -> bool,
    on_event: impl FnMut(&GeneticEvent),
) -> Result<LoadPlan, GeneticError> {
    optimize_until(
        &request.spec,
        &request.packages,
        &packing,
        &request.genetic,
        should_stop,
        on_event,
    )
}

/// Runs a plan on the blocking pool and forwards every event to `tx`.
///
/// The search stops at the next generation once the receiving side is gone.
/// Ends with a `Report` or `Error` message unless the client disconnected.
fn stream_plan(
    request: ValidatedLoadRequest,
    packing: PackingConfig,
    tx: &mpsc::Sender<String>,
) -> Result<LoadPlan, GeneticError> {
    let result = run_plan(
        request,
        packing,
        || tx.is_closed(),
        |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                let _ = tx.blocking_send(json);
            }
        },
    );

    let last = match &result {
        Ok(plan) => Some(StreamEvent::Report {
            response: LoadResponse::from_plan(plan),
        }),
        Err(GeneticError::Cancelled { generation }) => {
            info!(
                "🔌 Stream client disconnected, search stopped before generation {}",
                generation
            );
            None
        }
        Err(err) => {
            error!("❌ Optimization failed: {}", err);
            Some(StreamEvent::Error {
                details: err.to_string(),
            })
        }
    };
    if let Some(json) = last.and_then(|event| serde_json::to_string(&event).ok()) {
        let _ = tx.blocking_send(json);
    }
    result
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_load, handle_load_stream),
    components(
        schemas(
            LoadRequest,
            GeneticOverrides,
            ChromosomeKind,
            ContainerSpec,
            ItemRecord,
            LoadResponse,
            UnplacedItem,
            LoadReport,
            ReportContainer,
            ReportItem,
            ReportSize,
            ReportPosition,
            ErrorResponse
        )
    ),
    tags((name = "loading", description = "Endpoints for container loading optimization"))
)]
struct ApiDoc;

fn router(optimizer_config: OptimizerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { optimizer_config };

    Router::new()
        // API endpoints
        .route("/load", post(handle_load))
        .route("/load_stream", post(handle_load_stream))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Configures CORS for cross-origin requests from visualisation clients.
/// Blocks until the server is terminated.
pub async fn start_api_server(
    config: ApiConfig,
    optimizer_config: OptimizerConfig,
) -> std::io::Result<()> {
    let app = router(optimizer_config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        error!("❌ Could not bind API server to {}: {}", addr, err);
        err
    })?;

    let display_host = config.display_host().to_string();
    info!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API Endpoints: POST /load, POST /load_stream");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /load endpoint.
///
/// Searches a load order for the items and returns the resulting plan.
///
/// # Parameters
/// * `payload` - JSON payload with container dimensions, items and optional search settings
///
/// # Returns
/// JSON response with the viewer payload, fitness and unplaced items
#[utoipa::path(
    post,
    path = "/load",
    request_body = LoadRequest,
    responses(
        (status = 200, description = "Successfully planned the load", body = LoadResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, container or search configuration",
            body = ErrorResponse
        ),
        (status = INTERNAL_SERVER_ERROR, description = "Optimization failed", body = ErrorResponse)
    ),
    tag = "loading"
)]
async fn handle_load(
    State(state): State<ApiState>,
    payload: Result<Json<LoadRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_load_request(payload, state.optimizer_config.genetic_config()) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        "📥 New load request: {} packages, {} generations",
        request.packages.len(),
        request.genetic.generations
    );
    let packing = state.optimizer_config.packing_config();
    let outcome =
        tokio::task::spawn_blocking(move || run_plan(request, packing, || false, |_| {})).await;

    match outcome {
        Ok(Ok(plan)) => {
            info!(
                "📦 Result: {} loaded, {} unplaced, fitness {:.3}",
                plan.loaded.len(),
                plan.unplaced.len(),
                plan.fitness
            );
            (StatusCode::OK, Json(LoadResponse::from_plan(&plan))).into_response()
        }
        Ok(Err(err)) => {
            error!("❌ Optimization failed: {}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Optimization failed",
                err.to_string(),
            )
        }
        Err(err) => {
            error!("❌ Optimization task aborted: {}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Optimization failed",
                err.to_string(),
            )
        }
    }
}

/// Handler for POST /load_stream endpoint (SSE).
///
/// Streams one event per evaluated generation as Server-Sent Events
/// (text/event-stream), then a `Finished` event and a final `Report` event
/// carrying the same body as POST /load.
#[utoipa::path(
    post,
    path = "/load_stream",
    request_body = LoadRequest,
    responses(
        (
            status = 200,
            description = "Streams search progress in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request, container or search configuration",
            body = ErrorResponse
        )
    ),
    tag = "loading"
)]
async fn handle_load_stream(
    State(state): State<ApiState>,
    payload: Result<Json<LoadRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_load_request(payload, state.optimizer_config.genetic_config()) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);
    let packing = state.optimizer_config.packing_config();

    tokio::task::spawn_blocking(move || stream_plan(request, packing, &tx));

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

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
