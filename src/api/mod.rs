//! HTTP API using Axum.
//!
//! One route per policy operation (`/add_block_src_ip`, ...), plus:
//! - `/` service banner
//! - `/healthz` health check

mod handlers;
mod server;

pub use handlers::{health_handler, index_handler, HealthResponse, TOKEN_HEADER};
pub use server::{ApiServer, ApiState};
