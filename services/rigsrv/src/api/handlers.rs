//! HTTP triggers for motor commands and positioning operations

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use rig_protocol::register_value;
use tracing::{error, info};

use super::dto::{
    AppError, BowlCheckRequest, ConnectionsResponse, HealthResponse, IoStatusResponse,
    LogLevelResponse, MotorCommandResponse, SetLogLevelRequest, SetSpeedRequest,
    StartMotorRequest, SuccessResponse,
};
use super::AppState;
use crate::bowl::BowlState;
use crate::error::RigError;
use crate::turntable::TurntableState;

type ApiResult<T> = Result<Json<SuccessResponse<T>>, AppError>;

fn motor_response(motor: u8, command: &str) -> Json<SuccessResponse<MotorCommandResponse>> {
    Json(SuccessResponse::new(MotorCommandResponse {
        motor,
        command: command.to_string(),
    }))
}

/// Run a positioning operation on its own task so a dropped request cannot
/// abandon a moving motor before its stop
async fn run_operation<F, T>(name: &str, op: F) -> ApiResult<T>
where
    F: Future<Output = Result<T, RigError>> + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let result = tokio::spawn(op).await.map_err(|e| {
        error!("{} task: {}", name, e);
        AppError::internal_error(format!("{} task failed", name))
    })?;
    let elapsed = started.elapsed().as_millis() as u64;

    match result {
        Ok(data) => {
            info!("{} done in {}ms", name, elapsed);
            Ok(Json(
                SuccessResponse::new(data).with_metadata("elapsed_ms", elapsed.into()),
            ))
        },
        Err(e) => {
            error!("{} failed after {}ms: {}", name, elapsed, e);
            Err(e.into())
        },
    }
}

/// Start a motor
///
/// @route POST /api/motors/{no}/start
/// @input Path(no): u32 - Motor address
/// @input Json(req): StartMotorRequest - Direction and pulse count (0 = run until stopped)
/// @output Json<SuccessResponse<MotorCommandResponse>>
/// @status 400 - Invalid motor address or pulse count above 0xFFFF
/// @status 409 - Interlock asserted or axis busy
/// @status 503 - IO status unavailable or motor bridge not connected
pub async fn start_motor(
    State(state): State<Arc<AppState>>,
    Path(no): Path<u32>,
    Json(req): Json<StartMotorRequest>,
) -> ApiResult<MotorCommandResponse> {
    let axis = state.motors.address(no)?;
    let pulses = register_value("pulses", req.pulses).map_err(RigError::from)?;
    state.motors.start(axis, req.forward, pulses).await?;
    Ok(motor_response(axis, "start"))
}

/// Set motor speed
///
/// @route POST /api/motors/{no}/speed
/// @input Json(req): SetSpeedRequest
/// @status 400 - Invalid address or speed not below the maximum
pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Path(no): Path<u32>,
    Json(req): Json<SetSpeedRequest>,
) -> ApiResult<MotorCommandResponse> {
    let axis = state.motors.address(no)?;
    let speed = register_value("speed", req.speed).map_err(RigError::from)?;
    state.motors.set_speed(axis, speed).await?;
    Ok(motor_response(axis, "speed"))
}

/// Stop a motor, also while a positioning operation holds it
///
/// @route POST /api/motors/{no}/stop
pub async fn stop_motor(
    State(state): State<Arc<AppState>>,
    Path(no): Path<u32>,
) -> ApiResult<MotorCommandResponse> {
    let axis = state.motors.address(no)?;
    state.motors.stop(axis).await?;
    Ok(motor_response(axis, "stop"))
}

/// Full bowl reset
///
/// @route POST /api/bowl/reset
/// @output Json<SuccessResponse<BowlState>>
/// @status 409 - Unsafe sensor combination or axis busy
/// @status 504 - Expected sensor edge never seen
/// @side-effects Moves the bowl lift
pub async fn bowl_reset(State(state): State<Arc<AppState>>) -> ApiResult<BowlState> {
    let bowl = Arc::clone(&state.bowl);
    let cancel = state.shutdown.clone();
    run_operation("Bowl reset", async move { bowl.reset(&cancel).await }).await
}

/// Bowl check: reset with `?initialization=true`, continuous check otherwise
///
/// @route POST /api/bowl/check
pub async fn bowl_check(
    State(state): State<Arc<AppState>>,
    Query(req): Query<BowlCheckRequest>,
) -> ApiResult<BowlState> {
    let bowl = Arc::clone(&state.bowl);
    let cancel = state.shutdown.clone();
    run_operation("Bowl check", async move {
        bowl.check(req.initialization, &cancel).await
    })
    .await
}

/// @route POST /api/turntable/reset
/// @side-effects Rotates the turntable to home
pub async fn turntable_reset(State(state): State<Arc<AppState>>) -> ApiResult<TurntableState> {
    let turntable = Arc::clone(&state.turntable);
    let cancel = state.shutdown.clone();
    run_operation("Turntable reset", async move {
        turntable.reset(&cancel).await
    })
    .await
}

/// @route POST /api/turntable/feed
/// @side-effects Homes if needed, then advances one feed slot
pub async fn turntable_feed(State(state): State<Arc<AppState>>) -> ApiResult<TurntableState> {
    let turntable = Arc::clone(&state.turntable);
    let cancel = state.shutdown.clone();
    run_operation("Turntable feed", async move {
        turntable.feed(&cancel).await
    })
    .await
}

/// Latest IO status
///
/// @route GET /api/io/status
/// @side-effects None (read-only operation)
pub async fn io_status(State(state): State<Arc<AppState>>) -> ApiResult<IoStatusResponse> {
    let latest = state.store.latest();
    Ok(Json(SuccessResponse::new(IoStatusResponse {
        status: state.store.render(),
        initialized: latest.is_some(),
        age_ms: latest.map(|s| s.age().as_millis() as u64),
    })))
}

/// @route GET /api/connections
pub async fn list_connections(
    State(state): State<Arc<AppState>>,
) -> ApiResult<ConnectionsResponse> {
    let connections = state.registry.peers();
    Ok(Json(SuccessResponse::new(ConnectionsResponse {
        count: connections.len(),
        connections,
    })))
}

/// @route GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    Ok(Json(SuccessResponse::new(HealthResponse {
        status: "healthy".to_string(),
        service: state.service.name.clone(),
        version: state.service.version.clone(),
        connections: state.registry.peers().len(),
        io_online: state.store.latest().is_some(),
        bowl: state.bowl.state(),
        turntable: state.turntable.state(),
    })))
}

/// @route GET /api/log-level
pub async fn get_log_level() -> ApiResult<LogLevelResponse> {
    Ok(Json(SuccessResponse::new(LogLevelResponse {
        level: common::logging::get_log_level(),
    })))
}

/// Change the log filter at runtime
///
/// @route PUT /api/log-level
/// @input Json(req): SetLogLevelRequest - e.g. "debug" or "info,rigsrv=trace"
/// @status 400 - Invalid filter, or logging not initialized
pub async fn set_log_level(Json(req): Json<SetLogLevelRequest>) -> ApiResult<LogLevelResponse> {
    common::logging::set_log_level(&req.level).map_err(AppError::bad_request)?;
    Ok(Json(SuccessResponse::new(LogLevelResponse { level: req.level })))
}
