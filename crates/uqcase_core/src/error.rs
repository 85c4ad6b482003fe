use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised while building a parameter space
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterError {
    InvalidRange { name: String, min: f64, max: f64 },
    InvalidParameterKey { key: String, reason: &'static str },
    DuplicateParameter(String),
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterError::InvalidRange { name, min, max } => {
                write!(
                    f,
                    "invalid range for parameter '{name}': min ({min}) must be finite and below max ({max})"
                )
            }
            ParameterError::InvalidParameterKey { key, reason } => {
                write!(f, "invalid parameter key '{key}': {reason}")
            }
            ParameterError::DuplicateParameter(name) => {
                write!(f, "parameter '{name}' is defined more than once")
            }
        }
    }
}

impl std::error::Error for ParameterError {}

/// Errors that prevent a design of experiments from being built
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingError {
    UnsupportedMethod(String),
    InvalidSampleCount(usize),
    EmptyParameterSpace,
    /// The design needs more parameters than the space provides
    InsufficientParameters {
        method: &'static str,
        required: usize,
        actual: usize,
    },
    /// The design has no construction for this many parameters
    UnsupportedDesignSize { method: &'static str, n_params: usize },
}

impl fmt::Display for SamplingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingError::UnsupportedMethod(name) => write!(
                f,
                "unsupported sampling method '{name}' (expected one of: lhs, random, grid, plackett_burman, box_behnken, central_composite)"
            ),
            SamplingError::InvalidSampleCount(n) => {
                write!(f, "sample count must be at least 1 (got {n})")
            }
            SamplingError::EmptyParameterSpace => write!(f, "parameter space has no parameters"),
            SamplingError::InsufficientParameters {
                method,
                required,
                actual,
            } => write!(
                f,
                "{method} design needs at least {required} parameters (got {actual})"
            ),
            SamplingError::UnsupportedDesignSize { method, n_params } => {
                write!(f, "{method} design is not available for {n_params} parameters")
            }
        }
    }
}

impl std::error::Error for SamplingError {}

/// Errors raised while parsing or rendering a case template
#[derive(Debug)]
pub enum TemplateError {
    MissingTemplate {
        file: PathBuf,
        source: io::Error,
    },
    Syntax {
        file: PathBuf,
        line: usize,
        message: String,
    },
    /// A placeholder in the template has no supplied value
    UndefinedPlaceholder { file: PathBuf, name: String },
    /// A supplied value has no placeholder in the template
    UnusedParameter { file: PathBuf, name: String },
    /// Required placeholders absent from the template
    MissingPlaceholders { file: PathBuf, names: Vec<String> },
    /// A literal to turn into a placeholder does not occur in the file
    ValueNotFound { file: PathBuf, value: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::MissingTemplate { file, source } => {
                write!(f, "cannot read template {}: {source}", file.display())
            }
            TemplateError::Syntax {
                file,
                line,
                message,
            } => write!(f, "{}:{line}: {message}", file.display()),
            TemplateError::UndefinedPlaceholder { file, name } => write!(
                f,
                "template {} references '{name}' but no value was supplied",
                file.display()
            ),
            TemplateError::UnusedParameter { file, name } => write!(
                f,
                "parameter '{name}' has no placeholder in template {}",
                file.display()
            ),
            TemplateError::MissingPlaceholders { file, names } => write!(
                f,
                "template {} lacks placeholders for {}",
                file.display(),
                names.join(", ")
            ),
            TemplateError::ValueNotFound { file, value } => {
                write!(f, "value '{value}' does not occur in {}", file.display())
            }
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TemplateError::MissingTemplate { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised while building one case directory
#[derive(Debug)]
pub enum MaterializeError {
    Replication { path: PathBuf, message: String },
    Template(TemplateError),
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterializeError::Replication { path, message } => {
                write!(f, "failed to replicate base case into {}: {message}", path.display())
            }
            MaterializeError::Template(e) => write!(f, "{e}"),
            MaterializeError::Io { path, source } => {
                write!(f, "i/o error on {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for MaterializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MaterializeError::Template(e) => Some(e),
            MaterializeError::Io { source, .. } => Some(source),
            MaterializeError::Replication { .. } => None,
        }
    }
}

impl From<TemplateError> for MaterializeError {
    fn from(err: TemplateError) -> Self {
        MaterializeError::Template(err)
    }
}

/// Errors raised by the solver subprocess
#[derive(Debug)]
pub enum ExecutionError {
    Spawn { program: String, source: io::Error },
    /// The solver ran but exited unsuccessfully; `status` is `None` when killed by a signal
    NonZeroExit { status: Option<i32>, stderr: String },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Spawn { program, source } => {
                write!(f, "failed to start solver '{program}': {source}")
            }
            ExecutionError::NonZeroExit { status, stderr } => {
                match status {
                    Some(code) => write!(f, "solver exited with status {code}")?,
                    None => write!(f, "solver terminated by signal")?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::Spawn { source, .. } => Some(source),
            ExecutionError::NonZeroExit { .. } => None,
        }
    }
}

/// Failure of a single sample; never escapes the orchestrator
#[derive(Debug)]
pub enum SampleError {
    Materialize(MaterializeError),
    Execution(ExecutionError),
    Panicked(String),
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::Materialize(e) => write!(f, "{e}"),
            SampleError::Execution(e) => write!(f, "{e}"),
            SampleError::Panicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

impl std::error::Error for SampleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SampleError::Materialize(e) => Some(e),
            SampleError::Execution(e) => Some(e),
            SampleError::Panicked(_) => None,
        }
    }
}

impl From<MaterializeError> for SampleError {
    fn from(err: MaterializeError) -> Self {
        SampleError::Materialize(err)
    }
}

impl From<ExecutionError> for SampleError {
    fn from(err: ExecutionError) -> Self {
        SampleError::Execution(err)
    }
}

/// Study-level errors, raised before any sample is dispatched
#[derive(Debug)]
pub enum StudyError {
    Sampling(SamplingError),
    InvalidDefinition(String),
    Io { path: PathBuf, source: io::Error },
    Pool(String),
}

impl fmt::Display for StudyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudyError::Sampling(e) => write!(f, "{e}"),
            StudyError::InvalidDefinition(msg) => write!(f, "invalid study definition: {msg}"),
            StudyError::Io { path, source } => {
                write!(f, "i/o error on {}: {source}", path.display())
            }
            StudyError::Pool(msg) => write!(f, "failed to start worker pool: {msg}"),
        }
    }
}

impl std::error::Error for StudyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StudyError::Sampling(e) => Some(e),
            StudyError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SamplingError> for StudyError {
    fn from(err: SamplingError) -> Self {
        StudyError::Sampling(err)
    }
}

/// Errors raised while reading a single field file
#[derive(Debug)]
pub enum FieldError {
    Io { path: PathBuf, source: io::Error },
    MissingInternalField,
    MalformedUniform(String),
    InvalidCount(String),
    /// The data block holds fewer entries than the declared count
    Truncated { expected: usize, found: usize },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Io { path, source } => {
                write!(f, "cannot read field file {}: {source}", path.display())
            }
            FieldError::MissingInternalField => write!(f, "no 'internalField' entry found"),
            FieldError::MalformedUniform(value) => {
                write!(f, "cannot parse uniform value '{value}'")
            }
            FieldError::InvalidCount(line) => {
                write!(f, "expected an element count, found '{line}'")
            }
            FieldError::Truncated { expected, found } => {
                write!(f, "field declares {expected} entries but only {found} are present")
            }
        }
    }
}

impl std::error::Error for FieldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FieldError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised while assembling case or study datasets
#[derive(Debug)]
pub enum AggregateError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    InvalidTime(String),
    NoTimeDirectories(PathBuf),
    NoFieldData(PathBuf),
    /// Arrays that must share a shape do not
    ShapeMismatch {
        context: String,
        expected: String,
        found: String,
    },
    Mesh {
        case_dir: PathBuf,
        message: String,
    },
    Sample {
        index: usize,
        source: Box<AggregateError>,
    },
    Pool(String),
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::Io { path, source } => {
                write!(f, "i/o error on {}: {source}", path.display())
            }
            AggregateError::InvalidTime(name) => write!(f, "'{name}' is not a numeric time"),
            AggregateError::NoTimeDirectories(dir) => {
                write!(f, "no time directories found in {}", dir.display())
            }
            AggregateError::NoFieldData(dir) => {
                write!(f, "none of the requested fields could be read in {}", dir.display())
            }
            AggregateError::ShapeMismatch {
                context,
                expected,
                found,
            } => write!(f, "shape mismatch for {context}: expected {expected}, found {found}"),
            AggregateError::Mesh { case_dir, message } => {
                write!(f, "cannot read mesh of {}: {message}", case_dir.display())
            }
            AggregateError::Sample { index, source } => write!(f, "sample {index}: {source}"),
            AggregateError::Pool(msg) => write!(f, "failed to start reader pool: {msg}"),
        }
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AggregateError::Io { source, .. } => Some(source),
            AggregateError::Sample { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
