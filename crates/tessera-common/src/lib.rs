//! Common utilities for tessera
//!
//! This crate provides the error type shared by every tessera crate.

pub mod error;

pub use error::{Result, TesseraError};
