//! Rig gateway
//!
//! Bridges a TCP network of field devices (IO sensor board, relay bank,
//! stepper motor bridge) to positioning operations on a bowl lift and a
//! feeder turntable.
//!
//! ```text
//! inbound bytes ─► registry ─► router ─► IO status store / relay handler
//!
//! HTTP trigger ─► bowl / turntable machine ─► motor service ─► registry ─► motor bridge
//!                          ▲                         │
//!                          └──── IO status store ◄───┘ (interlocks)
//! ```

pub mod api;
pub mod bootstrap;
pub mod bowl;
pub mod config;
pub mod error;
pub mod io_status;
pub mod motor;
pub mod poll;
pub mod registry;
pub mod relay;
pub mod router;
pub mod service;
pub mod turntable;

pub use config::RigConfig;
pub use error::{Result, RigError};
pub use service::RigService;
