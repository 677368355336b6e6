//! API request/response models and the JSON error envelope

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::bowl::BowlState;
use crate::error::RigError;
use crate::registry::PeerInfo;
use crate::turntable::TurntableState;

// ============================================================================
// Standard API Response Models
// ============================================================================

/// Standard success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Standard error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// HTTP status
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error with HTTP status code
#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ErrorInfo,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ErrorInfo {
                code: status.as_u16(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 409 Conflict
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// 500 Internal Server Error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 503 Service Unavailable
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// 504 Gateway Timeout
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.error.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: self.error,
            }),
        )
            .into_response()
    }
}

impl From<RigError> for AppError {
    fn from(err: RigError) -> Self {
        let message = err.to_string();
        let app = match &err {
            RigError::InvalidMotorAddress(_)
            | RigError::SpeedTooHigh { .. }
            | RigError::Protocol(_) => AppError::bad_request(message),
            RigError::AtLowerLimit(_)
            | RigError::AtUpperLimit(_)
            | RigError::AxisBusy(_)
            | RigError::UnsafePosition(_) => AppError::conflict(message),
            RigError::SensorUnavailable(_)
            | RigError::NoSuchConnection(_)
            | RigError::Cancelled(_) => AppError::service_unavailable(message),
            RigError::PositionTimeout { .. } => AppError::gateway_timeout(message),
            RigError::UnroutableDevice(_) | RigError::Config(_) | RigError::Io(_) => {
                AppError::internal_error(message)
            },
        };
        if err.is_rejection() {
            app.with_details("No motion was commanded")
        } else {
            app
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMotorRequest {
    /// true = forward (the bowl lift descends)
    pub forward: bool,
    /// 0 runs until stopped
    #[serde(default)]
    pub pulses: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSpeedRequest {
    pub speed: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BowlCheckRequest {
    /// Full reset instead of the lighter continuous check
    #[serde(default)]
    pub initialization: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLogLevelRequest {
    pub level: String,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorCommandResponse {
    pub motor: u8,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoStatusResponse {
    /// Comma-joined pin levels, X1 first, or the not-initialized sentinel
    pub status: String,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionsResponse {
    pub count: usize,
    pub connections: Vec<PeerInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub connections: usize,
    pub io_online: bool,
    pub bowl: BowlState,
    pub turntable: TurntableState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            AppError::from(RigError::InvalidMotorAddress(9)).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(RigError::AtLowerLimit(2)).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(RigError::PositionTimeout { axis: 2, polls: 300 }).status,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::from(RigError::NoSuchConnection("10.0.0.3".to_string())).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_rejections_carry_details() {
        let err = AppError::from(RigError::AxisBusy(2));
        assert_eq!(err.error.code, 409);
        assert!(err.error.details.is_some());

        let err = AppError::from(RigError::PositionTimeout { axis: 2, polls: 300 });
        assert!(err.error.details.is_none());
    }

    #[test]
    fn test_start_request_defaults_pulses() {
        let req: StartMotorRequest = serde_json::from_str(r#"{"forward": true}"#).unwrap();
        assert!(req.forward);
        assert_eq!(req.pulses, 0);
    }
}
