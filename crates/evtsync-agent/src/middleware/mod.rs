//! HTTP middleware for the northbound plugin API.
pub mod auth;
