//! WebSocket gateway: pushes full inbox and conversation snapshots to
//! identified clients.

pub mod connection;
pub mod session;
