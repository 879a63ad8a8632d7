//! HTTP and WebSocket transport
//!
//! REST endpoints expose round history and service status. The WebSocket
//! endpoint is the game transport: it connects each socket to the round
//! engine and relays commands and events.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::ApiServer;
