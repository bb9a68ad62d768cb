//! cloud-net-apply library
//!
//! Renders cloud instance network metadata (OpenStack `network_data.json`)
//! into distribution network configuration and applies it to the live
//! interfaces.
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code (`#![forbid(unsafe_code)]`)
//! - **One model, many outputs**: the metadata is parsed once into a
//!   canonical model that every renderer and the applier read
//! - **Sequential and retryable**: a run is a fresh, ordered pipeline;
//!   transient failures rerun it from the top

pub mod config;
pub mod datasource;
pub mod distro;
pub mod network;
pub mod paths;
pub mod pipeline;
pub mod restart;
pub mod retry;

mod error;

pub use error::NetApplyError;
