use crate::aggregate::InspectionPick;
use crate::config::{AppConfig, MapConfig};
use crate::data::Datasets;
use crate::error::ChoroplethError;
use crate::render::styled_features;
use crate::scale::ColorStyle;
use crate::state::compute_render_state;
use crate::tooltip::TooltipModel;
use crate::types::MetricSelection;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info};

pub struct AppState {
    pub datasets: Arc<Datasets>,
    pub style: ColorStyle,
    pub pick: InspectionPick,
    pub map: MapConfig,
}

#[derive(Deserialize)]
pub struct MetricParams {
    #[serde(default)]
    metric: MetricSelection,
}

#[derive(Deserialize)]
pub struct TooltipParams {
    name: String,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct TooltipResponse {
    #[serde(flatten)]
    tooltip: TooltipModel,
    html: String,
}

impl From<TooltipModel> for TooltipResponse {
    fn from(tooltip: TooltipModel) -> Self {
        TooltipResponse { html: tooltip.to_html(), tooltip }
    }
}

pub struct ApiError(ChoroplethError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ChoroplethError::EmptyDataset { .. } | ChoroplethError::NonFiniteScore { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ChoroplethError::UnknownNeighborhood { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/view", get(view_handler))
        .route("/api/choropleth", get(choropleth_handler))
        .route("/api/tooltip", get(tooltip_handler))
        .route("/api/query", get(query_handler))
        .with_state(state)
}

pub async fn start_server(config: AppConfig, datasets: Datasets) -> Result<()> {
    let state = Arc::new(AppState {
        datasets: Arc::new(datasets),
        style: config.style.color_style()?,
        pick: config.aggregation.inspection_pick,
        map: config.map.clone(),
    });

    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    info!("Starting server on http://{}", addr);

    let app = router(state)
        .nest_service("/output", ServeDir::new(&config.output.dir))
        .fallback_service(ServeDir::new("."))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn view_handler(State(state): State<Arc<AppState>>) -> Json<MapConfig> {
    Json(state.map.clone())
}

async fn choropleth_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetricParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let render = compute_render_state(params.metric, &state.datasets, &state.style).map_err(ApiError)?;
    debug!("choropleth {} with {} fills", render.metric, render.fills.len());

    Ok(Json(json!({
        "metric": render.metric,
        "domain": render.domain,
        "legend": render.legend,
        "features": styled_features(&render, &state.datasets),
    })))
}

async fn tooltip_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TooltipParams>,
) -> Json<TooltipResponse> {
    Json(TooltipModel::build(&params.name, &state.datasets.businesses, state.pick).into())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<TooltipResponse>> {
    let tooltip: Option<TooltipResponse> = state
        .datasets
        .boundaries
        .locate(params.lon, params.lat)
        .map(|boundary| TooltipModel::build(&boundary.name, &state.datasets.businesses, state.pick).into());
    Json(tooltip)
}
