use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::ErrorResponse;
use indexer::AggregationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Wallet address is required")]
    MissingAddress,
    #[error("Invalid Ethereum address format")]
    InvalidAddress,
    #[error("Failed to fetch token balances")]
    Aggregation(#[from] AggregationError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingAddress | ApiError::InvalidAddress => StatusCode::BAD_REQUEST,
            ApiError::Aggregation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Aggregation(ref err) = self {
            tracing::error!(error = %err, "error fetching token balances");
        }
        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
