//! Study configuration files.
//!
//! ```yaml
//! experiment:
//!   name: cavity_uq
//!   base_case_dir: ./cavity
//!   output_root: experiments
//! solver: Allrun
//! launcher: sh
//! nthreads: 4
//! parameter_ranges:
//!   constant__transportProperties__nu: [1.0e-5, 1.0e-4]
//! sampling:
//!   method: lhs
//!   n_samples: 20
//!   seed: 42
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use uqcase_core::{
    ParameterSpace, SamplingMethod, SamplingPlan, SolverCommand, StudyDefinition, StudyError,
};

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, message: String },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "failed to parse {}: {}", path.display(), message)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid study configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StudyError> for ConfigError {
    fn from(err: StudyError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

fn default_name() -> String {
    "temp".to_string()
}

fn default_output_root() -> PathBuf {
    PathBuf::from("experiments")
}

fn default_nthreads() -> usize {
    1
}

fn default_n_samples() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentSection {
    #[serde(default = "default_name")]
    pub name: String,
    pub base_case_dir: PathBuf,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
}

/// Default sampling plan, overridable from the command line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingSection {
    #[serde(default)]
    pub method: SamplingMethod,
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SamplingSection {
    fn default() -> Self {
        Self {
            method: SamplingMethod::default(),
            n_samples: default_n_samples(),
            seed: None,
        }
    }
}

/// Command-line overrides of [`SamplingSection`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingOverrides {
    pub method: Option<SamplingMethod>,
    pub n_samples: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyFile {
    pub experiment: ExperimentSection,
    /// Executable inside the case directory
    pub solver: String,
    #[serde(default)]
    pub launcher: Option<String>,
    #[serde(default)]
    pub solver_args: Vec<String>,
    #[serde(default = "default_nthreads", alias = "concurrency")]
    pub nthreads: usize,
    pub parameter_ranges: ParameterSpace,
    #[serde(default)]
    pub sampling: Option<SamplingSection>,
}

impl StudyFile {
    /// Parse without touching the filesystem
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_saphyr::Error> {
        serde_saphyr::from_str(yaml)
    }

    /// Read, parse, resolve relative paths and validate a study file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut study = Self::from_yaml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let config_dir = path.parent().unwrap_or_else(|| Path::new(""));
        study.resolve_paths(config_dir);
        study.validate()?;

        tracing::debug!(
            config = %path.display(),
            study = %study.experiment.name,
            parameters = study.parameter_ranges.len(),
            "loaded study file"
        );
        Ok(study)
    }

    /// Make relative base and output paths relative to `config_dir`
    pub fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = config_dir.join(&*p);
            }
        };
        resolve(&mut self.experiment.base_case_dir);
        resolve(&mut self.experiment.output_root);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solver.trim().is_empty() {
            return Err(ConfigError::Invalid("solver must not be empty".to_string()));
        }
        self.definition().validate()?;
        Ok(())
    }

    pub fn solver_command(&self) -> SolverCommand {
        SolverCommand {
            executable: self.solver.clone(),
            launcher: self.launcher.clone(),
            args: self.solver_args.clone(),
        }
    }

    pub fn definition(&self) -> StudyDefinition {
        StudyDefinition {
            name: self.experiment.name.clone(),
            base_case_dir: self.experiment.base_case_dir.clone(),
            output_root: self.experiment.output_root.clone(),
            solver: self.solver_command(),
            space: self.parameter_ranges.clone(),
            concurrency: self.nthreads,
        }
    }

    pub fn into_definition(self) -> StudyDefinition {
        StudyDefinition {
            solver: self.solver_command(),
            name: self.experiment.name,
            base_case_dir: self.experiment.base_case_dir,
            output_root: self.experiment.output_root,
            space: self.parameter_ranges,
            concurrency: self.nthreads,
        }
    }

    /// Sampling defaults from the file with command-line overrides applied
    pub fn sampling_plan(&self, overrides: &SamplingOverrides) -> SamplingPlan {
        let defaults = self.sampling.clone().unwrap_or_default();
        SamplingPlan {
            method: overrides.method.unwrap_or(defaults.method),
            n_samples: overrides.n_samples.unwrap_or(defaults.n_samples),
            seed: overrides.seed.or(defaults.seed),
        }
    }
}
