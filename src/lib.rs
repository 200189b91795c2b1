//! # mutation-harness
//!
//! `mutation-harness` runs a test suite against a workload of source mutations:
//! - the unmodified suite must pass first (baseline gate)
//! - each mutation is then tested in its own child process, with a bounded number in flight
//! - every outcome is classified as killed, escaped, timeout or error
//! - lifecycle events are published to subscribers as the run progresses
//!
//! Producing mutations and activating them inside the code under test belong to
//! the generator and the test framework adapter; this crate decides when to run
//! what, how many at once, and what each result means.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod mutation;
pub mod prelude;
