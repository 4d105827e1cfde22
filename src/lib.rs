//! Data-access core for the hours-management dashboard.
//!
//! The layers, leaf first:
//! - [`api::RequestExecutor`] issues one request with timeout, retry and
//!   cancellation, and classifies every failure into an [`api::ApiError`]
//! - [`cache::CacheLayer`] memoizes producers per key with single-flight
//! - [`api::Paginator`] windows a collection endpoint by page/limit
//! - [`api::CrudResource`] exposes CRUD over one resource path and keeps a
//!   local mirror of the last known list

pub mod api;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod models;
pub mod session;
pub mod storage;
pub mod store;
pub mod transport;
