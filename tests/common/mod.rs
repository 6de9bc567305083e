//! Common test infrastructure
//!
//! Spawns an isolated server per test (own temp data dir, own database,
//! random port) plus a thin typed client over the HTTP surface. Tests should
//! only import from this module.

mod client;
mod fixtures;
mod server;

pub use client::TestClient;
#[allow(unused_imports)]
pub use fixtures::{write_bytes, DupTree};
pub use server::TestServer;
