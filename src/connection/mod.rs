//! Connection lifecycle: initial link establishment with retries and a
//! heartbeat monitor that detects telemetry loss after launch.

mod supervisor;

pub use supervisor::{
    ConnectionConfig, ConnectionState, ConnectionSupervisor, DisconnectCallback,
};
