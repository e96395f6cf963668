//! Charger DTOs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::domain::{ChargerSummary, PowerOutcome};

/// Charger ids become a URL path segment on the Central System side.
pub fn validate_charger_id(id: &str) -> Result<(), ValidationError> {
    if id.contains('/') {
        let mut err = ValidationError::new("charger_id");
        err.message = Some("must not contain '/'".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateChargerRequest {
    /// Charge point identity, appended to the Central System URL
    #[validate(
        length(min = 1, max = 64),
        custom(function = "validate_charger_id")
    )]
    #[schema(example = "CP-001")]
    pub id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PowerRequest {
    pub on: bool,
}

/// Optional body of `POST /chargers/{id}/start`
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionRequest {
    /// Falls back to `simulation.default_id_tag`
    pub id_tag: Option<String>,
}

/// Charger snapshot as served by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChargerDto {
    pub id: String,
    /// Disconnected, Connecting, Connected or Operational
    pub state: String,
    /// Idle, TransactionPending or TransactionActive
    pub transaction_sub_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    pub energy_wh: f64,
}

impl From<ChargerSummary> for ChargerDto {
    fn from(summary: ChargerSummary) -> Self {
        Self {
            id: summary.id,
            state: summary.state.to_string(),
            transaction_sub_state: summary.transaction_sub_state.to_string(),
            transaction_id: summary.transaction_id,
            id_tag: summary.id_tag,
            energy_wh: summary.energy_wh,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<PowerOutcome> for ActionResponse {
    fn from(outcome: PowerOutcome) -> Self {
        Self::new(outcome.message())
    }
}
