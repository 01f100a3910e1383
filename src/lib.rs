//! backrest: a response cache in front of a read-only repository REST service.

pub mod cache;
pub mod config;
pub mod error;
pub mod infra;
