//! streamd - serves a file and a flat directory over chunked HTTP(S)
//!
//! This library provides:
//! - `bridge`: axum-backed route table implementing the streamer server operations
//! - `streamers`: owner of the bound file and directory engines
//! - `serve`: the HTTP(S) serving loop and health endpoint
//! - `tls`: self-signed certificate generation and rustls loading
//! - `pull`: download client for both endpoint kinds
//! - `telemetry`: logging setup

pub mod bridge;
pub mod pull;
pub mod serve;
pub mod streamers;
pub mod telemetry;
pub mod tls;
