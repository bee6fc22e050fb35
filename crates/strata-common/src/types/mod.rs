//! Type definitions for StrataDB.

mod ids;

pub use ids::{Lsn, PageId};
