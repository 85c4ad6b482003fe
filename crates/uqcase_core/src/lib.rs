//! Uncertainty-quantification studies over parametric simulation cases
//!
//! This crate drives a study end to end:
//! - Design-of-experiments sampling over a bounded parameter space
//!   (Latin hypercube, random, full factorial, Plackett–Burman, Box–Behnken,
//!   central composite)
//! - Case materialization: mirror a base case and render `{{ placeholder }}`
//!   templates with each sample's values
//! - Parallel dispatch of one solver process per sample, with per-sample
//!   failure reporting and cooperative cancellation
//! - Parsing of OpenFOAM-style ASCII field files
//! - Aggregation of case outputs into sample × time × cell tensors
//!
//! # Example
//!
//! ```ignore
//! use uqcase_core::{
//!     ParameterSpace, ProcessExecutor, SamplingMethod, SamplingPlan, SolverCommand,
//!     StudyDefinition, StudyProgress, default_sample_name, run_study,
//! };
//!
//! let definition = StudyDefinition {
//!     name: "cavity_uq".into(),
//!     base_case_dir: "cavity".into(),
//!     output_root: "experiments".into(),
//!     solver: SolverCommand::case_script("Allrun").with_launcher("sh"),
//!     space: ParameterSpace::from_ranges([("constant__transportProperties__nu", 1e-5, 1e-4)])?,
//!     concurrency: 4,
//! };
//! let plan = SamplingPlan::new(SamplingMethod::Lhs, 20).with_seed(42);
//! let report = run_study(
//!     &definition,
//!     &plan,
//!     &ProcessExecutor::new(),
//!     default_sample_name,
//!     &StudyProgress::default(),
//!     |outcome| println!("sample {} {:?}", outcome.index, outcome.status),
//! )?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Study pipeline
// ============================================================================

pub mod execute;
pub mod materialize;
pub mod progress;
pub mod sampling;
pub mod space;
pub mod study;
pub mod template;

// ============================================================================
// Output reading
// ============================================================================

pub mod aggregate;
pub mod field;
pub mod mesh;
pub mod tensor;

pub mod error;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use aggregate::{
    CaseAggregator, CaseDataset, StudyDataset, TimeSelector, aggregate,
    aggregate_study,
};
pub use error::{
    AggregateError, ExecutionError, FieldError, MaterializeError, ParameterError, SampleError,
    SamplingError, StudyError, TemplateError,
};
pub use execute::{CapturedOutput, ProcessExecutor, SimulationExecutor, SolverCommand};
pub use field::{FieldArray, read_field};
pub use materialize::{check_templates, materialize};
pub use mesh::{CellCentreField, CellCoordinates, MeshReader};
pub use progress::StudyProgress;
pub use sampling::{DesignMatrix, SamplingMethod, SamplingPlan, generate};
pub use space::{ParameterKey, ParameterRange, ParameterSpace};
pub use study::{
    SampleOutcome, SampleStatus, StudyDefinition, StudyReport, default_sample_name, run_design,
    run_study,
};
pub use template::Template;
pub use tensor::Tensor;
