//! HTTP trigger surface
//!
//! Central route definition; handlers live in [`handlers`], request and
//! response models in [`dto`].

pub mod dto;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use common::ServiceInfo;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::bowl::BowlMachine;
use crate::io_status::IoStatusStore;
use crate::motor::MotorService;
use crate::registry::ConnectionRegistry;
use crate::turntable::TurntableMachine;

use handlers::{
    bowl_check, bowl_reset, get_log_level, health_check, io_status, list_connections,
    set_log_level, set_speed, start_motor, stop_motor, turntable_feed, turntable_reset,
};

/// Shared state for all handlers
pub struct AppState {
    pub service: ServiceInfo,
    pub store: Arc<IoStatusStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub motors: Arc<MotorService>,
    pub bowl: Arc<BowlMachine>,
    pub turntable: Arc<TurntableMachine>,
    /// Root token; positioning operations stop their motor when it fires
    pub shutdown: CancellationToken,
}

pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Motor commands
        .route("/api/motors/{no}/start", post(start_motor))
        .route("/api/motors/{no}/speed", post(set_speed))
        .route("/api/motors/{no}/stop", post(stop_motor))
        // Positioning
        .route("/api/bowl/reset", post(bowl_reset))
        .route("/api/bowl/check", post(bowl_check))
        .route("/api/turntable/reset", post(turntable_reset))
        .route("/api/turntable/feed", post(turntable_feed))
        // Status
        .route("/api/io/status", get(io_status))
        .route("/api/connections", get(list_connections))
        .route("/api/log-level", get(get_log_level).put(set_log_level))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::bowl::BowlSettings;
    use crate::config::{AxesConfig, DevicesConfig};
    use crate::io_status::StatusSource;
    use crate::motor::tests::{test_motion, RecordingSink, BRIDGE};
    use crate::poll::SensorPoller;
    use crate::relay::LoggingRelayHandler;
    use crate::router::DeviceRouter;
    use crate::turntable::TurntableSettings;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use rig_protocol::{pins, Direction, MotorCommand, PinLevels, SENSOR_RESET_COMMAND};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        store: Arc<IoStatusStore>,
        sink: Arc<RecordingSink>,
    }

    fn harness() -> Harness {
        let devices = DevicesConfig {
            io_ip: "10.0.0.1".to_string(),
            relay_ip: "10.0.0.2".to_string(),
            motor_bridge_ip: BRIDGE.to_string(),
        };
        let store = Arc::new(IoStatusStore::new(None));
        let router = Arc::new(DeviceRouter::new(
            devices,
            Arc::clone(&store),
            Arc::new(LoggingRelayHandler),
        ));
        let registry = Arc::new(ConnectionRegistry::new(router));
        let sink = Arc::new(RecordingSink::default());
        let status: Arc<dyn StatusSource> = store.clone();
        let motors = Arc::new(MotorService::new(
            sink.clone(),
            Arc::clone(&status),
            BRIDGE,
            &test_motion(),
            &AxesConfig::default(),
        ));
        let poller = || {
            SensorPoller::new(
                Arc::clone(&status),
                sink.clone(),
                "10.0.0.1",
                SENSOR_RESET_COMMAND,
                Duration::from_millis(1),
            )
        };
        let bowl = Arc::new(BowlMachine::new(
            Arc::clone(&motors),
            poller(),
            BowlSettings {
                axis: 2,
                max_polls: 3,
                continuous_max_polls: 3,
                creep_speed: None,
            },
        ));
        let turntable = Arc::new(TurntableMachine::new(
            Arc::clone(&motors),
            poller(),
            TurntableSettings {
                axis: 3,
                max_polls: 3,
                feed_pulses: 800,
            },
        ));

        let state = Arc::new(AppState {
            service: ServiceInfo::new("rigsrv", "0.1.0", "test", 8888),
            store: Arc::clone(&store),
            registry,
            motors,
            bowl,
            turntable,
            shutdown: CancellationToken::new(),
        });
        Harness {
            app: create_routes(state),
            store,
            sink,
        }
    }

    fn publish(store: &IoStatusStore, high: &[usize]) {
        let mut levels = vec![false; 32];
        for pin in high {
            levels[*pin] = true;
        }
        store.publish(PinLevels::new(levels));
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            },
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = call(&h.app, Method::GET, "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["io_online"], false);
        assert_eq!(body["data"]["bowl"]["state"], "uninitialized");
    }

    #[tokio::test]
    async fn test_io_status_sentinel_then_levels() {
        let h = harness();
        let (_, body) = call(&h.app, Method::GET, "/api/io/status", None).await;
        assert_eq!(body["data"]["status"], rig_protocol::NOT_INITIALIZED);
        assert_eq!(body["data"]["initialized"], false);

        publish(&h.store, &[pins::TURNTABLE_HOME]);
        let (_, body) = call(&h.app, Method::GET, "/api/io/status", None).await;
        assert!(body["data"]["status"].as_str().unwrap().starts_with("1,0,0,0"));
        assert_eq!(body["data"]["initialized"], true);
    }

    #[tokio::test]
    async fn test_start_motor() {
        let h = harness();
        publish(&h.store, &[]);

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/api/motors/3/start",
            Some(serde_json::json!({"forward": true, "pulses": 800})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["motor"], 3);
        assert_eq!(h.sink.count(MotorCommand::pulse_count(3, 800)), 1);
        assert_eq!(h.sink.count(MotorCommand::direction(3, Direction::Forward)), 1);
    }

    #[tokio::test]
    async fn test_start_motor_rejections() {
        let h = harness();

        // No IO status yet
        let (status, _) = call(
            &h.app,
            Method::POST,
            "/api/motors/2/start",
            Some(serde_json::json!({"forward": true})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        publish(&h.store, &[pins::BOWL_LOWER_LIMIT]);
        let (status, body) = call(
            &h.app,
            Method::POST,
            "/api/motors/2/start",
            Some(serde_json::json!({"forward": true})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], 409);

        let (status, _) = call(&h.app, Method::POST, "/api/motors/0/stop", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(h.sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_wide_motor_number_gets_json_error() {
        let h = harness();
        publish(&h.store, &[]);

        for uri in ["/api/motors/300/stop", "/api/motors/256/stop"] {
            let (status, body) = call(&h.app, Method::POST, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], false);
            assert_eq!(body["error"]["code"], 400);
        }
        let (_, body) = call(&h.app, Method::POST, "/api/motors/300/stop", None).await;
        assert_eq!(body["error"]["message"], "Invalid motor address: 300");

        let (status, _) = call(
            &h.app,
            Method::POST,
            "/api/motors/258/start",
            Some(serde_json::json!({"forward": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_pulses_beyond_register_rejected() {
        let h = harness();
        publish(&h.store, &[]);

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/api/motors/3/start",
            Some(serde_json::json!({"forward": true, "pulses": 70000})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["message"],
            "Protocol error: Value out of range: pulses 70000 exceeds 0xFFFF"
        );
        assert!(h.sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_set_speed_bound() {
        let h = harness();
        let (status, _) = call(
            &h.app,
            Method::POST,
            "/api/motors/4/speed",
            Some(serde_json::json!({"speed": 500})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &h.app,
            Method::POST,
            "/api/motors/4/speed",
            Some(serde_json::json!({"speed": 120})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.sink.frames(), vec![MotorCommand::speed(4, 120).to_hex()]);
    }

    #[tokio::test]
    async fn test_turntable_feed_from_home() {
        let h = harness();
        publish(&h.store, &[pins::TURNTABLE_HOME]);

        let (status, body) = call(&h.app, Method::POST, "/api/turntable/feed", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "fed");
        assert!(body["metadata"]["elapsed_ms"].is_u64());
        assert_eq!(h.sink.count(MotorCommand::pulse_count(3, 800)), 1);
    }

    #[tokio::test]
    async fn test_bowl_reset_timeout_maps_to_gateway_timeout() {
        let h = harness();
        // Bowl present and never clears
        publish(&h.store, &[pins::BOWL_PRESENT]);

        let (status, body) = call(&h.app, Method::POST, "/api/bowl/reset", None).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"]["message"], "Motor 2 position timeout after 3 polls");
        assert_eq!(h.sink.count(MotorCommand::stop(2)), 1);

        let (_, body) = call(&h.app, Method::GET, "/health", None).await;
        assert_eq!(body["data"]["bowl"]["state"], "failed");
        assert_eq!(body["data"]["bowl"]["reason"], "timeout");
    }

    #[tokio::test]
    async fn test_bowl_check_without_bowl() {
        let h = harness();
        publish(&h.store, &[]);

        let (status, body) = call(&h.app, Method::POST, "/api/bowl/check", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "settled");
        assert!(h.sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_connections_empty() {
        let h = harness();
        let (status, body) = call(&h.app, Method::GET, "/api/connections", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["count"], 0);
    }
}
