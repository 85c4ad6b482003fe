//! Design-of-experiments sampling.
//!
//! Every method first builds a unit design in `[0, 1]^n_params` (see
//! [`designs`]) and only then rescales each column onto its parameter range.
//! Factorial-style designs that are natively centred on zero are mapped from
//! `[-1, 1]` and clamped before rescaling.
//!
//! ```ignore
//! use uqcase_core::sampling::{SamplingMethod, generate};
//!
//! let design = generate(SamplingMethod::Lhs, &space, 20, Some(42))?;
//! for row in design.rows() {
//!     println!("{row:?}");
//! }
//! ```

pub mod designs;

use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::SamplingError;
use crate::space::ParameterSpace;

/// Number of candidate Latin hypercubes compared by the maximin criterion
pub const LHS_ITERATIONS: usize = 5;

/// Supported design-of-experiments algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMethod {
    /// Centred Latin hypercube, maximin criterion
    #[default]
    Lhs,
    /// Independent uniform draws
    Random,
    /// Full factorial grid, truncated to the requested sample count
    #[serde(alias = "fullfact")]
    Grid,
    PlackettBurman,
    BoxBehnken,
    CentralComposite,
}

impl SamplingMethod {
    pub const ALL: [SamplingMethod; 6] = [
        SamplingMethod::Lhs,
        SamplingMethod::Random,
        SamplingMethod::Grid,
        SamplingMethod::PlackettBurman,
        SamplingMethod::BoxBehnken,
        SamplingMethod::CentralComposite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingMethod::Lhs => "lhs",
            SamplingMethod::Random => "random",
            SamplingMethod::Grid => "grid",
            SamplingMethod::PlackettBurman => "plackett_burman",
            SamplingMethod::BoxBehnken => "box_behnken",
            SamplingMethod::CentralComposite => "central_composite",
        }
    }

    /// Whether the design depends on the random seed
    pub fn is_stochastic(&self) -> bool {
        matches!(self, SamplingMethod::Lhs | SamplingMethod::Random)
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingMethod {
    type Err = SamplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        if normalized == "fullfact" {
            return Ok(SamplingMethod::Grid);
        }
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| SamplingError::UnsupportedMethod(s.to_string()))
    }
}

/// How a study samples its parameter space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingPlan {
    pub method: SamplingMethod,
    pub n_samples: usize,
    /// Seed for stochastic designs; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl SamplingPlan {
    pub fn new(method: SamplingMethod, n_samples: usize) -> Self {
        Self {
            method,
            n_samples,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn generate(&self, space: &ParameterSpace) -> Result<DesignMatrix, SamplingError> {
        generate(self.method, space, self.n_samples, self.seed)
    }
}

/// Row-major `(n_rows, n_params)` matrix of sample coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_params: usize,
}

impl DesignMatrix {
    pub fn zeros(n_rows: usize, n_params: usize) -> Self {
        Self {
            data: vec![0.0; n_rows * n_params],
            n_rows,
            n_params,
        }
    }

    /// Build from rows; `None` if the rows are ragged
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let n_params = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != n_params) {
            return None;
        }
        Some(Self {
            n_rows: rows.len(),
            n_params,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.n_rows && col < self.n_params).then(|| self.data[row * self.n_params + col])
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.n_params + col] = value;
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        (row < self.n_rows).then(|| &self.data[row * self.n_params..(row + 1) * self.n_params])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.n_params.max(1)).take(self.n_rows)
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        self.rows().map(|r| r[col]).collect()
    }

    fn truncate(&mut self, n_rows: usize) {
        if n_rows < self.n_rows {
            self.n_rows = n_rows;
            self.data.truncate(n_rows * self.n_params);
        }
    }

    fn map_in_place(&mut self, f: impl Fn(f64) -> f64) {
        for v in &mut self.data {
            *v = f(*v);
        }
    }
}

/// Generate a design matrix over `space`.
///
/// # Errors
/// Fails for an empty space, a zero sample count, or a design that cannot be
/// built for the number of parameters.
pub fn generate(
    method: SamplingMethod,
    space: &ParameterSpace,
    n_samples: usize,
    seed: Option<u64>,
) -> Result<DesignMatrix, SamplingError> {
    if space.is_empty() {
        return Err(SamplingError::EmptyParameterSpace);
    }
    if n_samples < 1 {
        return Err(SamplingError::InvalidSampleCount(n_samples));
    }

    let mut design = unit_design(method, space.len(), n_samples, seed)?;
    design.truncate(n_samples);
    if design.n_rows() < n_samples {
        tracing::warn!(
            method = %method,
            requested = n_samples,
            available = design.n_rows(),
            "design has fewer runs than requested samples"
        );
    }

    for (col, range) in space.ranges().iter().enumerate() {
        for row in 0..design.n_rows() {
            let unit = design.data[row * design.n_params + col];
            design.set(row, col, range.scale(unit));
        }
    }

    tracing::debug!(
        method = %method,
        rows = design.n_rows(),
        params = design.n_params(),
        "generated design"
    );
    Ok(design)
}

/// Build the method's design in the unit hypercube
fn unit_design(
    method: SamplingMethod,
    n_params: usize,
    n_samples: usize,
    seed: Option<u64>,
) -> Result<DesignMatrix, SamplingError> {
    let mut design = match method {
        SamplingMethod::Lhs => {
            let mut rng = seeded_rng(seed);
            designs::lhs_maximin(n_params, n_samples, LHS_ITERATIONS, &mut rng)
        }
        SamplingMethod::Random => {
            let mut rng = seeded_rng(seed);
            designs::uniform_random(n_params, n_samples, &mut rng)
        }
        SamplingMethod::Grid => designs::full_factorial(n_params, n_samples),
        SamplingMethod::PlackettBurman => to_unit(designs::plackett_burman(n_params)?),
        SamplingMethod::BoxBehnken => to_unit(designs::box_behnken(n_params)?),
        SamplingMethod::CentralComposite => to_unit(designs::central_composite(n_params)?),
    };
    design.map_in_place(|v| v.clamp(0.0, 1.0));
    Ok(design)
}

/// Map a design centred on zero from `[-1, 1]` onto `[0, 1]`
fn to_unit(mut design: DesignMatrix) -> DesignMatrix {
    design.map_in_place(|v| (v + 1.0) / 2.0);
    design
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
