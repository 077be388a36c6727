//! HTTP layer of the GitHub download proxy.
//!
//! This module provides the axum-based server that decodes a target URL from
//! the request path, checks it against the supported GitHub URL shapes and
//! the access policy, and streams the upstream response back.

pub mod assets;
pub mod dispatch;
pub mod handler;
