//! HTTP control API
//!
//! - `common`: response envelope, error mapping, validated JSON extractor
//! - `modules`: handlers grouped by resource
//! - `router`: route table, OpenAPI document, middleware stack

pub mod common;
pub mod modules;
pub mod router;

pub use router::{create_api_router, ApiDoc, RouterDeps};
