//! Echotap - HTTP request/response capture with live event streaming
//!
//! Every request passing through the server is captured once its handler
//! first emits a response, kept in a bounded history, and pushed to all
//! Server-Sent Events subscribers.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod app;
pub mod broadcast;
pub mod capture;
pub mod config;
pub mod error;
pub mod network;
pub mod record;
pub mod store;

pub use error::{EchotapError, Result};
