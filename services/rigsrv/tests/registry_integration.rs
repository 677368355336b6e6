//! Device registry over real loopback TCP connections

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;
use std::time::Duration;

use rig_protocol::{pins, MotorCommand};
use rigsrv::config::{DevicesConfig, RigConfig};
use rigsrv::io_status::IoStatusStore;
use rigsrv::registry::{ConnectionRegistry, FrameSink};
use rigsrv::{RigError, RigService};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const LOOPBACK: &str = "127.0.0.1";

/// IO status frame: X1 (turntable home) and X2 (bowl present) high
const IO_FRAME: [u8; 15] = [
    0x48, 0x3A, 0x01, 0x41, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xD5, 0x45, 0x44,
];

struct Gateway {
    service: RigService,
    addr: std::net::SocketAddr,
    cancel: CancellationToken,
}

impl Gateway {
    fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.service.registry()
    }

    fn store(&self) -> &Arc<IoStatusStore> {
        self.service.store()
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Service with only its device listener running, on an ephemeral port
async fn gateway(devices: DevicesConfig) -> Gateway {
    let mut config = RigConfig::default();
    config.devices = devices;
    config.motion.settle_delay_ms = 1;

    let service = RigService::new(config, rigsrv::bootstrap::service_info());
    let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(Arc::clone(service.registry()).serve(listener, cancel.clone()));

    Gateway {
        service,
        addr,
        cancel,
    }
}

fn devices_with_io_on_loopback() -> DevicesConfig {
    DevicesConfig {
        io_ip: LOOPBACK.to_string(),
        relay_ip: "10.0.0.2".to_string(),
        motor_bridge_ip: "10.0.0.3".to_string(),
    }
}

fn devices_with_bridge_on_loopback() -> DevicesConfig {
    DevicesConfig {
        io_ip: "10.0.0.1".to_string(),
        relay_ip: "10.0.0.2".to_string(),
        motor_bridge_ip: LOOPBACK.to_string(),
    }
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_io_frame_updates_snapshot() {
    let gw = gateway(devices_with_io_on_loopback()).await;
    let mut device = TcpStream::connect(gw.addr).await.unwrap();

    assert!(eventually(|| gw.registry().is_connected(LOOPBACK)).await);
    assert!(gw.store().latest().is_none());

    device.write_all(&IO_FRAME).await.unwrap();
    assert!(eventually(|| gw.store().latest().is_some()).await);

    let snapshot = gw.store().latest().unwrap();
    assert!(snapshot.is_high(pins::TURNTABLE_HOME));
    assert!(snapshot.is_high(pins::BOWL_PRESENT));
    assert!(!snapshot.is_high(pins::BOWL_LOWER_LIMIT));
}

#[tokio::test]
async fn test_unconfigured_peer_does_not_update_snapshot() {
    // Loopback is not a configured device here
    let gw = gateway(devices_with_bridge_on_loopback()).await;
    let mut device = TcpStream::connect(gw.addr).await.unwrap();
    assert!(eventually(|| gw.registry().is_connected(LOOPBACK)).await);

    device.write_all(&IO_FRAME).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gw.store().latest().is_none());
}

#[tokio::test]
async fn test_send_to_delivers_decoded_hex() {
    let gw = gateway(devices_with_io_on_loopback()).await;
    let mut device = TcpStream::connect(gw.addr).await.unwrap();
    assert!(eventually(|| gw.registry().is_connected(LOOPBACK)).await);

    gw.registry()
        .send_to(LOOPBACK, "48 3A 01 52", true)
        .await
        .unwrap();
    let mut buf = [0u8; 4];
    device.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x48, 0x3A, 0x01, 0x52]);

    gw.registry().send_to(LOOPBACK, "on", false).await.unwrap();
    let mut buf = [0u8; 2];
    device.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"on");
}

#[tokio::test]
async fn test_motor_stop_reaches_bridge() {
    let gw = gateway(devices_with_bridge_on_loopback()).await;
    let mut bridge = TcpStream::connect(gw.addr).await.unwrap();
    assert!(eventually(|| gw.registry().is_connected(LOOPBACK)).await);

    gw.service.motors().stop(2).await.unwrap();

    let expected = MotorCommand::stop(2).to_bytes();
    let mut buf = vec![0u8; expected.len()];
    bridge.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, expected);
}

#[tokio::test]
async fn test_disconnect_removes_peer() {
    let gw = gateway(devices_with_io_on_loopback()).await;
    let device = TcpStream::connect(gw.addr).await.unwrap();
    assert!(eventually(|| gw.registry().is_connected(LOOPBACK)).await);
    assert_eq!(gw.registry().peers().len(), 1);

    drop(device);
    assert!(eventually(|| !gw.registry().is_connected(LOOPBACK)).await);

    let err = gw
        .registry()
        .send_to(LOOPBACK, "01", true)
        .await
        .unwrap_err();
    assert_eq!(err, RigError::NoSuchConnection(LOOPBACK.to_string()));
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let gw = gateway(devices_with_io_on_loopback()).await;
    let _first = TcpStream::connect(gw.addr).await.unwrap();
    assert!(eventually(|| gw.registry().is_connected(LOOPBACK)).await);
    let first_addr = gw.registry().peers()[0].remote_addr.clone();

    let mut second = TcpStream::connect(gw.addr).await.unwrap();
    let second_local = second.local_addr().unwrap().to_string();
    assert!(eventually(|| gw.registry().peers()[0].remote_addr == second_local).await);
    assert_ne!(first_addr, second_local);
    assert_eq!(gw.registry().peers().len(), 1);

    gw.registry().send_to(LOOPBACK, "AA", true).await.unwrap();
    let mut buf = [0u8; 1];
    second.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0xAA]);
}

#[tokio::test]
async fn test_broadcast_counts_live_connections() {
    let gw = gateway(devices_with_io_on_loopback()).await;
    assert_eq!(gw.registry().broadcast("01", true).await.unwrap(), 0);

    let mut device = TcpStream::connect(gw.addr).await.unwrap();
    assert!(eventually(|| gw.registry().is_connected(LOOPBACK)).await);

    assert_eq!(gw.registry().broadcast("01", true).await.unwrap(), 1);
    let mut buf = [0u8; 1];
    device.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x01]);
}
