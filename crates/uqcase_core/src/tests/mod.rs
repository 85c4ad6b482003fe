//! Cross-module tests
//!
//! Tests are organized by topic:
//! - `study` - Dispatch, failure isolation and cancellation with injected executors
//! - `pipeline` - Materialize, run a shell solver, aggregate the outputs

mod pipeline;
