//! Aura command deck client library: REST client, real-time transport, and the view-models
//! behind the `aura` CLI and console.

pub mod api;
pub mod config;
pub mod deck;
pub mod init;
pub mod models;
pub mod session;
pub mod stream;
pub mod transport;

mod util;
