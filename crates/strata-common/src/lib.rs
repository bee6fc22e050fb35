//! # strata-common
//!
//! Common types and constants for StrataDB.
//!
//! This crate provides the foundational pieces shared by the storage
//! components:
//!
//! - **Types**: core identifiers (`PageId`, `Lsn`)
//! - **Constants**: page geometry and system-wide limits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::{Lsn, PageId};
