//! Study orchestration.
//!
//! A study turns a design matrix into one [`SampleTask`] per row, materializes
//! each task into its own case directory and runs the solver there. Tasks are
//! dispatched to a worker pool sized by [`StudyDefinition::concurrency`]; the
//! pool lives for one run only. Outcomes flow back over a channel to the
//! calling thread, where the observer sees each of them exactly once.
//!
//! A failing sample never stops its siblings. It is logged against its index
//! and recorded in the [`StudyReport`].

use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};

use jiff::Timestamp;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{SampleError, SamplingError, StudyError};
use crate::execute::{SimulationExecutor, SolverCommand};
use crate::materialize::materialize;
use crate::progress::StudyProgress;
use crate::sampling::{DesignMatrix, SamplingMethod, SamplingPlan};
use crate::space::{ParameterKey, ParameterSpace};

/// Directory name of a sample: `sample_000`, `sample_001`, ...
pub fn default_sample_name(index: usize) -> String {
    format!("sample_{index:03}")
}

/// Everything needed to run a study, independent of the sampling plan
#[derive(Debug, Clone, PartialEq)]
pub struct StudyDefinition {
    pub name: String,
    pub base_case_dir: PathBuf,
    pub output_root: PathBuf,
    pub solver: SolverCommand,
    pub space: ParameterSpace,
    /// Number of samples run at the same time
    pub concurrency: usize,
}

impl StudyDefinition {
    /// `<output_root>/<name>`
    pub fn study_dir(&self) -> PathBuf {
        self.output_root.join(&self.name)
    }

    pub fn validate(&self) -> Result<(), StudyError> {
        let invalid = |msg: String| Err(StudyError::InvalidDefinition(msg));

        if self.name.is_empty()
            || self.name == "."
            || self.name == ".."
            || self.name.contains(['/', '\\'])
        {
            return invalid(format!("study name '{}' is not a plain directory name", self.name));
        }
        if self.concurrency < 1 {
            return invalid("concurrency must be at least 1".to_string());
        }
        if !self.base_case_dir.is_dir() {
            return invalid(format!(
                "base case directory {} does not exist",
                self.base_case_dir.display()
            ));
        }
        if self.space.is_empty() {
            return Err(SamplingError::EmptyParameterSpace.into());
        }

        let inside_base = match (
            std::path::absolute(self.study_dir()),
            std::path::absolute(&self.base_case_dir),
        ) {
            (Ok(study), Ok(base)) => study.starts_with(base),
            _ => false,
        };
        if inside_base {
            return invalid("study directory must not lie inside the base case".to_string());
        }
        Ok(())
    }
}

/// One design row paired with the ordered parameter keys
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTask {
    pub index: usize,
    pub parameters: Vec<(ParameterKey, f64)>,
}

/// One task per design row, indices `0..n_rows`
pub fn build_tasks(space: &ParameterSpace, design: &DesignMatrix) -> Vec<SampleTask> {
    design
        .rows()
        .enumerate()
        .map(|(index, row)| SampleTask {
            index,
            parameters: space.keys().cloned().zip(row.iter().copied()).collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Succeeded,
    Failed,
    /// Never started because the study was cancelled
    Cancelled,
}

/// Result of one sample as recorded in the study report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleOutcome {
    pub index: usize,
    pub case_dir: PathBuf,
    pub parameters: BTreeMap<String, f64>,
    pub status: SampleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyReport {
    pub study: String,
    pub study_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<SamplingMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Sorted by index
    pub samples: Vec<SampleOutcome>,
}

impl StudyReport {
    fn with_status(&self, status: SampleStatus) -> impl Iterator<Item = &SampleOutcome> {
        self.samples.iter().filter(move |s| s.status == status)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &SampleOutcome> {
        self.with_status(SampleStatus::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &SampleOutcome> {
        self.with_status(SampleStatus::Failed)
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &SampleOutcome> {
        self.with_status(SampleStatus::Cancelled)
    }

    /// Indices of samples whose solver run completed successfully
    pub fn successful_indices(&self) -> Vec<usize> {
        self.succeeded().map(|s| s.index).collect()
    }
}

/// Owned per-task work unit handed to a worker
#[derive(Debug)]
struct SampleJob {
    task: SampleTask,
    base_case_dir: PathBuf,
    case_dir: PathBuf,
    solver: SolverCommand,
}

impl SampleJob {
    fn run<E>(self, executor: &E, progress: &StudyProgress) -> SampleOutcome
    where
        E: SimulationExecutor + ?Sized,
    {
        let index = self.task.index;
        if progress.is_cancelled() {
            tracing::debug!(sample = index, "skipping sample, study cancelled");
            return self.into_outcome(SampleStatus::Cancelled, None);
        }

        let _span = tracing::info_span!("sample", index).entered();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(executor)))
            .unwrap_or_else(|payload| Err(SampleError::Panicked(panic_message(payload.as_ref()))));

        match result {
            Ok(()) => {
                tracing::info!(sample = index, "sample finished");
                self.into_outcome(SampleStatus::Succeeded, None)
            }
            Err(e) => {
                tracing::error!(sample = index, case_dir = %self.case_dir.display(), "sample failed: {e}");
                self.into_outcome(SampleStatus::Failed, Some(e.to_string()))
            }
        }
    }

    fn execute<E>(&self, executor: &E) -> Result<(), SampleError>
    where
        E: SimulationExecutor + ?Sized,
    {
        materialize(&self.base_case_dir, &self.case_dir, &self.task.parameters)?;
        executor.execute(&self.case_dir, &self.solver)?;
        Ok(())
    }

    fn into_outcome(self, status: SampleStatus, error: Option<String>) -> SampleOutcome {
        SampleOutcome {
            index: self.task.index,
            case_dir: self.case_dir,
            parameters: self
                .task
                .parameters
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
            status,
            error,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Generate the plan's design over the study's space and run every sample.
///
/// Only study-level problems (invalid definition, sampling failure, an
/// unusable study directory) are returned as errors; per-sample failures end
/// up in the report.
pub fn run_study<E, N, O>(
    definition: &StudyDefinition,
    plan: &SamplingPlan,
    executor: &E,
    naming: N,
    progress: &StudyProgress,
    observer: O,
) -> Result<StudyReport, StudyError>
where
    E: SimulationExecutor + ?Sized,
    N: Fn(usize) -> String,
    O: FnMut(&SampleOutcome),
{
    definition.validate()?;
    let design = plan.generate(&definition.space)?;
    tracing::info!(
        study = %definition.name,
        method = %plan.method,
        samples = design.n_rows(),
        seed = ?plan.seed,
        "generated design"
    );

    let mut report = run_design(definition, &design, executor, naming, progress, observer)?;
    report.method = Some(plan.method);
    report.seed = plan.seed;
    Ok(report)
}

/// Run one sample per row of an existing design matrix
pub fn run_design<E, N, O>(
    definition: &StudyDefinition,
    design: &DesignMatrix,
    executor: &E,
    naming: N,
    progress: &StudyProgress,
    mut observer: O,
) -> Result<StudyReport, StudyError>
where
    E: SimulationExecutor + ?Sized,
    N: Fn(usize) -> String,
    O: FnMut(&SampleOutcome),
{
    definition.validate()?;
    if design.n_params() != definition.space.len() {
        return Err(StudyError::InvalidDefinition(format!(
            "design has {} columns but the parameter space has {} parameters",
            design.n_params(),
            definition.space.len()
        )));
    }

    let study_dir = definition.study_dir();
    let case_dirs = sample_dirs(&study_dir, design.n_rows(), naming)?;
    fs::create_dir_all(&study_dir).map_err(|source| StudyError::Io {
        path: study_dir.clone(),
        source,
    })?;

    let jobs: Vec<SampleJob> = build_tasks(&definition.space, design)
        .into_iter()
        .zip(case_dirs)
        .map(|(task, case_dir)| SampleJob {
            case_dir,
            base_case_dir: definition.base_case_dir.clone(),
            solver: definition.solver.clone(),
            task,
        })
        .collect();

    progress.reset(jobs.len());
    if progress.is_cancelled() {
        tracing::warn!(study = %definition.name, "study cancelled before dispatch");
    }
    let started_at = Timestamp::now();
    tracing::info!(
        study = %definition.name,
        samples = jobs.len(),
        workers = definition.concurrency,
        study_dir = %study_dir.display(),
        "dispatching samples"
    );

    let mut samples = dispatch(jobs, executor, definition.concurrency, progress, &mut observer)?;
    samples.sort_by_key(|s| s.index);

    let report = StudyReport {
        study: definition.name.clone(),
        study_dir,
        method: None,
        seed: None,
        started_at,
        finished_at: Timestamp::now(),
        samples,
    };
    tracing::info!(
        study = %report.study,
        succeeded = report.succeeded().count(),
        failed = report.failed().count(),
        cancelled = report.cancelled().count(),
        "study finished"
    );
    Ok(report)
}

/// One directory per sample; every name must be a distinct plain component
fn sample_dirs<N>(study_dir: &Path, n_samples: usize, naming: N) -> Result<Vec<PathBuf>, StudyError>
where
    N: Fn(usize) -> String,
{
    let mut seen = FxHashSet::default();
    let mut dirs = Vec::with_capacity(n_samples);
    for index in 0..n_samples {
        let name = naming(index);
        let mut components = Path::new(&name).components();
        let component = match (components.next(), components.next()) {
            (Some(Component::Normal(component)), None) => component,
            _ => {
                return Err(StudyError::InvalidDefinition(format!(
                    "sample {index} name '{name}' is not a plain directory name"
                )));
            }
        };
        if !seen.insert(component.to_os_string()) {
            return Err(StudyError::InvalidDefinition(format!(
                "sample {index} reuses directory name '{name}'"
            )));
        }
        dirs.push(study_dir.join(component));
    }
    Ok(dirs)
}

#[cfg(feature = "parallel")]
fn dispatch<E, O>(
    jobs: Vec<SampleJob>,
    executor: &E,
    concurrency: usize,
    progress: &StudyProgress,
    observer: &mut O,
) -> Result<Vec<SampleOutcome>, StudyError>
where
    E: SimulationExecutor + ?Sized,
    O: FnMut(&SampleOutcome),
{
    use std::sync::mpsc;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("uqcase-worker-{i}"))
        .build()
        .map_err(|e| StudyError::Pool(e.to_string()))?;

    let mut outcomes = Vec::with_capacity(jobs.len());
    let (tx, rx) = mpsc::channel();
    pool.in_place_scope(|scope| {
        for job in jobs {
            let tx = tx.clone();
            scope.spawn(move |_| {
                // receiver outlives the scope body
                let _ = tx.send(job.run(executor, progress));
            });
        }
        drop(tx);

        for outcome in rx {
            progress.record(outcome.status);
            observer(&outcome);
            outcomes.push(outcome);
        }
    });
    Ok(outcomes)
}

#[cfg(not(feature = "parallel"))]
fn dispatch<E, O>(
    jobs: Vec<SampleJob>,
    executor: &E,
    _concurrency: usize,
    progress: &StudyProgress,
    observer: &mut O,
) -> Result<Vec<SampleOutcome>, StudyError>
where
    E: SimulationExecutor + ?Sized,
    O: FnMut(&SampleOutcome),
{
    let mut outcomes = Vec::with_capacity(jobs.len());
    for job in jobs {
        let outcome = job.run(executor, progress);
        progress.record(outcome.status);
        observer(&outcome);
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn definition(base: &Path, output_root: &Path) -> StudyDefinition {
        StudyDefinition {
            name: "study".to_string(),
            base_case_dir: base.to_path_buf(),
            output_root: output_root.to_path_buf(),
            solver: SolverCommand::case_script("Allrun"),
            space: ParameterSpace::from_ranges([("a__x", 0.0, 1.0)]).unwrap(),
            concurrency: 2,
        }
    }

    #[test]
    fn test_default_sample_name() {
        assert_eq!(default_sample_name(0), "sample_000");
        assert_eq!(default_sample_name(42), "sample_042");
        assert_eq!(default_sample_name(1234), "sample_1234");
    }

    #[test]
    fn test_build_tasks_pairs_rows_with_keys() {
        let space = ParameterSpace::from_ranges([("a__x", 0.0, 1.0), ("b__y", 0.0, 10.0)]).unwrap();
        let design = DesignMatrix::from_rows(vec![vec![0.1, 2.0], vec![0.9, 8.0]]).unwrap();
        let tasks = build_tasks(&space, &design);

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].index, 1);
        assert_eq!(tasks[1].parameters[0].0.to_string(), "a__x");
        assert_eq!(tasks[1].parameters[0].1, 0.9);
        assert_eq!(tasks[1].parameters[1].0.to_string(), "b__y");
        assert_eq!(tasks[1].parameters[1].1, 8.0);
    }

    #[test]
    fn test_sample_dirs_rejects_unsafe_names() {
        let root = Path::new("out/study");
        let dirs = sample_dirs(root, 2, default_sample_name).unwrap();
        assert_eq!(dirs, vec![root.join("sample_000"), root.join("sample_001")]);

        let colliding: [fn(usize) -> String; 2] = [
            |_| "same".to_string(),
            |i| if i == 0 { "run/".to_string() } else { "run".to_string() },
        ];
        for naming in colliding {
            assert!(matches!(
                sample_dirs(root, 3, naming),
                Err(StudyError::InvalidDefinition(msg)) if msg.contains("reuses")
            ));
        }
        for bad in ["", "..", ".", "a/b", "../escape", "/abs"] {
            assert!(
                matches!(
                    sample_dirs(root, 1, |_| bad.to_string()),
                    Err(StudyError::InvalidDefinition(_))
                ),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn test_validate() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base");
        fs::create_dir_all(&base).unwrap();
        let out = dir.path().join("out");

        assert!(definition(&base, &out).validate().is_ok());

        let mut def = definition(&base, &out);
        def.concurrency = 0;
        assert!(matches!(def.validate(), Err(StudyError::InvalidDefinition(_))));

        let mut def = definition(&base, &out);
        def.name = "../escape".to_string();
        assert!(matches!(def.validate(), Err(StudyError::InvalidDefinition(_))));

        let def = definition(&dir.path().join("missing"), &out);
        assert!(matches!(def.validate(), Err(StudyError::InvalidDefinition(_))));

        let def = definition(&base, &base);
        assert!(matches!(def.validate(), Err(StudyError::InvalidDefinition(_))));

        let mut def = definition(&base, &out);
        def.space = ParameterSpace::new();
        assert!(matches!(
            def.validate(),
            Err(StudyError::Sampling(SamplingError::EmptyParameterSpace))
        ));
    }
}
