//! Service wiring and lifecycle
//!
//! Builds the component graph from a [`RigConfig`] and runs the device
//! listener and HTTP API until the root token is cancelled.

use std::sync::Arc;

use axum::serve;
use common::ServiceInfo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::{create_routes, AppState};
use crate::bowl::{BowlMachine, BowlSettings};
use crate::config::RigConfig;
use crate::error::{Result, RigError};
use crate::io_status::{IoStatusStore, StatusSource};
use crate::motor::MotorService;
use crate::poll::SensorPoller;
use crate::registry::{ConnectionRegistry, FrameSink};
use crate::relay::LoggingRelayHandler;
use crate::router::DeviceRouter;
use crate::turntable::{TurntableMachine, TurntableSettings};

pub struct RigService {
    config: RigConfig,
    info: ServiceInfo,
    store: Arc<IoStatusStore>,
    registry: Arc<ConnectionRegistry>,
    motors: Arc<MotorService>,
    bowl: Arc<BowlMachine>,
    turntable: Arc<TurntableMachine>,
}

impl RigService {
    pub fn new(config: RigConfig, info: ServiceInfo) -> Self {
        let motion = &config.motion;
        let store = Arc::new(IoStatusStore::new(motion.snapshot_max_age()));
        let router = Arc::new(DeviceRouter::new(
            config.devices.clone(),
            Arc::clone(&store),
            Arc::new(LoggingRelayHandler),
        ));
        let registry = Arc::new(ConnectionRegistry::new(router));

        let sink: Arc<dyn FrameSink> = registry.clone();
        let status: Arc<dyn StatusSource> = store.clone();
        let motors = Arc::new(MotorService::new(
            Arc::clone(&sink),
            Arc::clone(&status),
            config.devices.motor_bridge_ip.clone(),
            motion,
            &config.axes,
        ));

        let poller = || {
            SensorPoller::new(
                Arc::clone(&status),
                Arc::clone(&sink),
                config.devices.io_ip.clone(),
                motion.sensor_reset_command.clone(),
                motion.poll_interval(),
            )
        };
        let bowl = Arc::new(BowlMachine::new(
            Arc::clone(&motors),
            poller(),
            BowlSettings {
                axis: config.axes.bowl,
                max_polls: motion.max_position_polls,
                continuous_max_polls: motion.continuous_max_polls,
                creep_speed: motion.creep_speed,
            },
        ));
        let turntable = Arc::new(TurntableMachine::new(
            Arc::clone(&motors),
            poller(),
            TurntableSettings {
                axis: config.axes.turntable,
                max_polls: motion.turntable_max_polls,
                feed_pulses: motion.feed_pulses,
            },
        ));

        Self {
            config,
            info,
            store,
            registry,
            motors,
            bowl,
            turntable,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<IoStatusStore> {
        &self.store
    }

    pub fn motors(&self) -> &Arc<MotorService> {
        &self.motors
    }

    pub fn app_state(&self, shutdown: CancellationToken) -> Arc<AppState> {
        Arc::new(AppState {
            service: self.info.clone(),
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            motors: Arc::clone(&self.motors),
            bowl: Arc::clone(&self.bowl),
            turntable: Arc::clone(&self.turntable),
            shutdown,
        })
    }

    /// Bind both listeners and serve until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let device_addr = self.config.device_bind_address();
        let device_listener = TcpListener::bind(&device_addr).await.map_err(|e| {
            RigError::Io(format!("Failed to bind device listener {}: {}", device_addr, e))
        })?;
        info!(
            "Devices: IO {}, relay {}, motor bridge {}",
            self.config.devices.io_ip,
            self.config.devices.relay_ip,
            self.config.devices.motor_bridge_ip
        );

        let registry = Arc::clone(&self.registry);
        let listener_token = shutdown.clone();
        let device_handle = tokio::spawn(async move {
            registry.serve(device_listener, listener_token).await;
        });

        let api_handle = if self.config.api.enabled {
            let api_addr = self.config.api_bind_address();
            let api_listener = TcpListener::bind(&api_addr).await.map_err(|e| {
                RigError::Io(format!("Failed to bind API listener {}: {}", api_addr, e))
            })?;
            info!("API server listening on http://{}", api_addr);
            info!("Health check: http://{}/health", api_addr);

            let app = create_routes(self.app_state(shutdown.clone()));
            let server_token = shutdown.clone();
            Some(tokio::spawn(async move {
                let shutdown = async move { server_token.cancelled().await };
                if let Err(e) = serve(api_listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    error!("Server error: {}", e);
                }
            }))
        } else {
            info!("HTTP API disabled");
            None
        };

        shutdown.cancelled().await;
        info!("Shutting down");

        if let Err(e) = device_handle.await {
            error!("Device listener task: {}", e);
        }
        if let Some(handle) = api_handle {
            if let Err(e) = handle.await {
                error!("API server task: {}", e);
            }
        }

        info!("{} stopped", self.info.name);
        Ok(())
    }
}
