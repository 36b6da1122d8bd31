//! botfleet-demand — the demand signal that drives scaling.
//!
//! A `DemandSource` answers "how many users are active right now". The
//! `DemandSampler` wraps a source, keeps exactly one previous sample for
//! delta computation, and on failure reuses the last good sample instead
//! of reporting zero.
//!
//! # Pagination
//!
//! ```text
//! offset = 0
//! loop:
//!     rows = fetch(offset, page_size)
//!     total += rows
//!     if rows < page_size: done
//!     offset += page_size
//! ```

pub mod error;
pub mod rest;
pub mod sampler;

pub use error::{DemandError, DemandResult};
pub use rest::{RestDemandConfig, RestDemandSource, count_paginated};
pub use sampler::{DemandSampler, DemandSource};
