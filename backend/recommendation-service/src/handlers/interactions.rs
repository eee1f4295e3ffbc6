use actix_web::{post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::AppState;
use crate::error::{AppError, Result};
use crate::models::{ActionCode, DeviceType, NewInteraction, ProductId, UserId};
use crate::services::recompute::DEFAULT_LIMIT;

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub action_code: String,
    pub device_type: Option<String>,
}

impl InteractionRequest {
    fn validate(&self) -> Result<NewInteraction> {
        let action: ActionCode = self
            .action_code
            .parse()
            .map_err(|_| AppError::ValidationError("action_code must be one of view, cart, purchase".to_string()))?;

        let device_type = match self.device_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<DeviceType>().map_err(|_| {
                AppError::ValidationError("device_type must be one of desktop, mobile, tablet".to_string())
            })?),
        };

        Ok(NewInteraction {
            user_id: self.user_id,
            product_id: self.product_id,
            action,
            device_type,
        })
    }
}

/// Record an interaction and refresh the user's recommendations in the background
#[post("/interactions")]
pub async fn record_interaction(
    body: web::Json<InteractionRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let interaction = body.validate()?;
    let recorded = state.interactions.record_interaction(&interaction).await?;

    info!(
        user_id = recorded.user_id,
        product_id = recorded.product_id,
        action = %recorded.action,
        "Interaction recorded"
    );

    // Detached: the response never waits for the recomputation
    let _ = state
        .orchestrator
        .spawn_recompute(recorded.user_id, DEFAULT_LIMIT);

    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": recorded })))
}
