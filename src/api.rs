use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::metrics::ANALYSIS_REQUESTS_TOTAL;
use crate::types::{AnalysisRequest, AnalysisResponse};

pub async fn analyze_comments(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("analysis", %request_id);

    async move {
        let validated = match request.validate() {
            Ok(validated) => validated,
            Err(errors) => {
                warn!(errors = ?errors, "Rejected analysis request");
                ANALYSIS_REQUESTS_TOTAL.with_label_values(&["invalid"]).inc();
                return Err(ApiError::Validation(errors));
            }
        };

        info!(
            n_comments = validated.comments.len(),
            algorithm = %validated.options.clustering_algorithm,
            n_clusters = validated.options.num_aspect_clusters,
            use_transformers = validated.options.use_transformers,
            "Analysis request accepted"
        );
        let response = state.orchestrator.analyze(validated).await;
        ANALYSIS_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();
        Ok(Json(response))
    }
    .instrument(span)
    .await
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
