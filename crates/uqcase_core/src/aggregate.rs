//! Case and study aggregation.
//!
//! A case is read into one tensor per variable with dims
//! `(time, cell[, component])`. A study stacks equally shaped cases on a
//! leading `sample` axis. Single-row (uniform) fields are broadcast to the
//! case's cell count; a field that cannot be read becomes a recorded gap
//! filled with NaN.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AggregateError;
use crate::field::{FieldArray, read_field};
use crate::mesh::{CellCoordinates, MeshReader};
use crate::study::default_sample_name;
use crate::tensor::Tensor;

/// Which time directories to read
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TimeSelector {
    /// Every sub-directory whose name is a number, in numeric order
    #[default]
    All,
    /// Exactly these directories, in this order
    Only(Vec<String>),
}

impl TimeSelector {
    pub fn single(time: impl Into<String>) -> Self {
        TimeSelector::Only(vec![time.into()])
    }
}

/// A field that could not be read at one time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldGap {
    pub time: String,
    pub variable: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseDataset {
    /// Time coordinate values
    pub times: Vec<f64>,
    /// Directory names matching `times`
    pub time_names: Vec<String>,
    pub variables: BTreeMap<String, Tensor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<CellCoordinates>,
    pub gaps: Vec<FieldGap>,
    /// Variables absent at every selected time
    pub missing: Vec<String>,
}

impl CaseDataset {
    pub fn n_cells(&self) -> usize {
        self.variables
            .values()
            .next()
            .and_then(|v| v.dim_len("cell"))
            .unwrap_or(0)
    }

    pub fn variable(&self, name: &str) -> Option<&Tensor> {
        self.variables.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleGap {
    pub sample: usize,
    #[serde(flatten)]
    pub gap: FieldGap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyDataset {
    /// Sample coordinate values (sample indices)
    pub samples: Vec<usize>,
    pub times: Vec<f64>,
    pub variables: BTreeMap<String, Tensor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<CellCoordinates>,
    pub gaps: Vec<SampleGap>,
    pub missing: Vec<String>,
}

impl StudyDataset {
    pub fn variable(&self, name: &str) -> Option<&Tensor> {
        self.variables.get(name)
    }
}

/// Reads cases and studies for a fixed set of variables.
///
/// ```ignore
/// let dataset = CaseAggregator::new(["U", "p"])
///     .times(TimeSelector::single("100"))
///     .mesh(CellCentreField::default())
///     .threads(8)
///     .aggregate_study(&study_dir, 20)?;
/// ```
pub struct CaseAggregator {
    variables: Vec<String>,
    times: TimeSelector,
    mesh: Option<Box<dyn MeshReader>>,
    threads: usize,
}

impl CaseAggregator {
    pub fn new<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            times: TimeSelector::All,
            mesh: None,
            threads: 4,
        }
    }

    pub fn times(mut self, times: TimeSelector) -> Self {
        self.times = times;
        self
    }

    pub fn mesh(mut self, reader: impl MeshReader + 'static) -> Self {
        self.mesh = Some(Box::new(reader));
        self
    }

    /// Worker threads for study aggregation (at least 1)
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Read one case directory
    pub fn aggregate(&self, case_dir: &Path) -> Result<CaseDataset, AggregateError> {
        let time_names = match &self.times {
            TimeSelector::All => discover_times(case_dir)?,
            TimeSelector::Only(names) => names.clone(),
        };
        let times = time_names
            .iter()
            .map(|name| parse_time(name).ok_or_else(|| AggregateError::InvalidTime(name.clone())))
            .collect::<Result<Vec<f64>, _>>()?;

        // fields[var][time]
        let mut gaps = Vec::new();
        let mut fields: Vec<Vec<Option<FieldArray>>> = Vec::with_capacity(self.variables.len());
        for variable in &self.variables {
            let mut per_time = Vec::with_capacity(time_names.len());
            for time in &time_names {
                match read_field(&case_dir.join(time).join(variable)) {
                    Ok(parsed) => per_time.push(Some(parsed.values)),
                    Err(e) => {
                        tracing::debug!(case_dir = %case_dir.display(), %time, %variable, "field gap: {e}");
                        gaps.push(FieldGap {
                            time: time.clone(),
                            variable: variable.clone(),
                            reason: e.to_string(),
                        });
                        per_time.push(None);
                    }
                }
            }
            fields.push(per_time);
        }

        let n_cells = fields
            .iter()
            .flatten()
            .flatten()
            .map(FieldArray::len)
            .max()
            .ok_or_else(|| AggregateError::NoFieldData(case_dir.to_path_buf()))?;

        let mut variables = BTreeMap::new();
        let mut missing = Vec::new();
        for (variable, per_time) in self.variables.iter().zip(fields) {
            if per_time.iter().all(Option::is_none) {
                tracing::warn!(case_dir = %case_dir.display(), %variable, "variable missing at every time");
                missing.push(variable.clone());
                continue;
            }
            let stacked = stack_times(variable, &time_names, per_time, n_cells)?;
            variables.insert(variable.clone(), stacked);
        }

        let coordinates = match &self.mesh {
            Some(reader) => {
                let coords = reader.cell_centres(case_dir)?;
                if coords.len() != n_cells {
                    return Err(AggregateError::ShapeMismatch {
                        context: format!("cell coordinates of {}", case_dir.display()),
                        expected: format!("{n_cells} cells"),
                        found: format!("{} cells", coords.len()),
                    });
                }
                Some(coords)
            }
            None => None,
        };

        Ok(CaseDataset {
            times,
            time_names,
            variables,
            coordinates,
            gaps,
            missing,
        })
    }

    /// Read samples `0..n_samples` named `sample_000`, `sample_001`, ...
    pub fn aggregate_study(
        &self,
        study_dir: &Path,
        n_samples: usize,
    ) -> Result<StudyDataset, AggregateError> {
        let indices: Vec<usize> = (0..n_samples).collect();
        self.aggregate_samples(study_dir, &indices, default_sample_name)
    }

    /// Read an explicit set of samples, e.g. only the successful ones
    pub fn aggregate_samples<N>(
        &self,
        study_dir: &Path,
        indices: &[usize],
        naming: N,
    ) -> Result<StudyDataset, AggregateError>
    where
        N: Fn(usize) -> String,
    {
        if indices.is_empty() {
            return Err(AggregateError::NoFieldData(study_dir.to_path_buf()));
        }
        let jobs: Vec<(usize, PathBuf)> = indices
            .iter()
            .map(|&i| (i, study_dir.join(naming(i))))
            .collect();
        tracing::info!(
            study_dir = %study_dir.display(),
            samples = jobs.len(),
            threads = self.threads,
            "aggregating samples"
        );

        let cases = self
            .read_cases(&jobs)?
            .into_iter()
            .map(|(index, result)| {
                result
                    .map(|ds| (index, ds))
                    .map_err(|e| AggregateError::Sample {
                        index,
                        source: Box::new(e),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        stack_samples(cases)
    }

    #[cfg(feature = "parallel")]
    fn read_cases(
        &self,
        jobs: &[(usize, PathBuf)],
    ) -> Result<Vec<(usize, Result<CaseDataset, AggregateError>)>, AggregateError> {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| AggregateError::Pool(e.to_string()))?;
        Ok(pool.install(|| {
            jobs.par_iter()
                .map(|(index, dir)| (*index, self.aggregate(dir)))
                .collect()
        }))
    }

    #[cfg(not(feature = "parallel"))]
    fn read_cases(
        &self,
        jobs: &[(usize, PathBuf)],
    ) -> Result<Vec<(usize, Result<CaseDataset, AggregateError>)>, AggregateError> {
        Ok(jobs
            .iter()
            .map(|(index, dir)| (*index, self.aggregate(dir)))
            .collect())
    }
}

/// Read one case directory
pub fn aggregate(
    case_dir: &Path,
    variables: &[&str],
    times: &TimeSelector,
) -> Result<CaseDataset, AggregateError> {
    CaseAggregator::new(variables.iter().copied())
        .times(times.clone())
        .aggregate(case_dir)
}

/// Read samples `0..n_samples` of a study directory
pub fn aggregate_study(
    study_dir: &Path,
    variables: &[&str],
    n_samples: usize,
    times: &TimeSelector,
) -> Result<StudyDataset, AggregateError> {
    CaseAggregator::new(variables.iter().copied())
        .times(times.clone())
        .aggregate_study(study_dir, n_samples)
}

fn parse_time(name: &str) -> Option<f64> {
    name.parse::<f64>().ok().filter(|t| t.is_finite())
}

/// Numeric sub-directory names, sorted by value
fn discover_times(case_dir: &Path) -> Result<Vec<String>, AggregateError> {
    let io_err = |source| AggregateError::Io {
        path: case_dir.to_path_buf(),
        source,
    };

    let mut times = Vec::new();
    for entry in fs::read_dir(case_dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if let Some(value) = parse_time(&name) {
            times.push((value, name));
        }
    }
    if times.is_empty() {
        return Err(AggregateError::NoTimeDirectories(case_dir.to_path_buf()));
    }
    times.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(times.into_iter().map(|(_, name)| name).collect())
}

/// Broadcast, shape-check and stack one variable's fields over time
fn stack_times(
    variable: &str,
    time_names: &[String],
    per_time: Vec<Option<FieldArray>>,
    n_cells: usize,
) -> Result<Tensor, AggregateError> {
    let mut components: Option<Option<usize>> = None;
    let mut arrays = Vec::with_capacity(per_time.len());

    for (time, field) in time_names.iter().zip(per_time) {
        let Some(field) = field else {
            arrays.push(None);
            continue;
        };
        let field = if field.len() == 1 && n_cells != 1 {
            field.broadcast(n_cells).unwrap_or(field)
        } else {
            field
        };
        if field.len() != n_cells {
            return Err(AggregateError::ShapeMismatch {
                context: format!("{variable} at time {time}"),
                expected: format!("{n_cells} cells"),
                found: format!("{} cells", field.len()),
            });
        }
        match components {
            None => components = Some(field.components()),
            Some(expected) if expected != field.components() => {
                return Err(AggregateError::ShapeMismatch {
                    context: format!("{variable} at time {time}"),
                    expected: describe_components(expected),
                    found: describe_components(field.components()),
                });
            }
            Some(_) => {}
        }
        arrays.push(Some(field));
    }

    let components = components.flatten();
    let mut inner = vec![n_cells];
    inner.extend(components);
    let row_len: usize = inner.iter().product();

    let mut data = Vec::with_capacity(row_len * arrays.len());
    for array in arrays {
        match array {
            Some(array) => data.extend(array.into_values()),
            None => data.extend(std::iter::repeat_n(f64::NAN, row_len)),
        }
    }

    let mut shape = vec![time_names.len()];
    shape.extend(inner);
    Tensor::from_data(time_dims(shape.len()), shape, data).ok_or_else(|| {
        AggregateError::ShapeMismatch {
            context: variable.to_string(),
            expected: "rectangular data".to_string(),
            found: "ragged rows".to_string(),
        }
    })
}

fn describe_components(components: Option<usize>) -> String {
    match components {
        None => "scalar values".to_string(),
        Some(k) => format!("{k} components"),
    }
}

/// `(time, cell)`, `(time, cell, component)`, else `(time, dim_1, dim_2, ...)`
fn time_dims(ndim: usize) -> Vec<String> {
    match ndim {
        2 => vec!["time".into(), "cell".into()],
        3 => vec!["time".into(), "cell".into(), "component".into()],
        _ => std::iter::once("time".to_string())
            .chain((1..ndim).map(|i| format!("dim_{i}")))
            .collect(),
    }
}

fn stack_samples(cases: Vec<(usize, CaseDataset)>) -> Result<StudyDataset, AggregateError> {
    let Some((first_index, first)) = cases.first() else {
        return Err(AggregateError::NoFieldData(PathBuf::new()));
    };
    let times = first.times.clone();
    let missing = first.missing.clone();
    let coordinates = first.coordinates.clone();
    let shapes: BTreeMap<String, Vec<usize>> = first
        .variables
        .iter()
        .map(|(name, v)| (name.clone(), v.shape().to_vec()))
        .collect();
    let first_index = *first_index;

    for (index, case) in &cases {
        let mismatch = |what: &str, expected: String, found: String| AggregateError::ShapeMismatch {
            context: format!("sample {index} {what} (compared with sample {first_index})"),
            expected,
            found,
        };
        if case.times != times {
            return Err(mismatch("times", format!("{times:?}"), format!("{:?}", case.times)));
        }
        let names: Vec<&String> = case.variables.keys().collect();
        if names != shapes.keys().collect::<Vec<_>>() {
            return Err(mismatch(
                "variables",
                format!("{:?}", shapes.keys().collect::<Vec<_>>()),
                format!("{names:?}"),
            ));
        }
        for (name, variable) in &case.variables {
            if variable.shape() != shapes[name].as_slice() {
                return Err(mismatch(
                    &format!("variable {name}"),
                    format!("{:?}", shapes[name]),
                    format!("{:?}", variable.shape()),
                ));
            }
        }
    }

    let samples: Vec<usize> = cases.iter().map(|(i, _)| *i).collect();
    let mut gaps = Vec::new();
    let mut per_variable: BTreeMap<String, Vec<Tensor>> = BTreeMap::new();
    for (index, case) in cases {
        gaps.extend(case.gaps.into_iter().map(|gap| SampleGap { sample: index, gap }));
        for (name, variable) in case.variables {
            per_variable.entry(name).or_default().push(variable);
        }
    }

    let mut variables = BTreeMap::new();
    for (name, parts) in per_variable {
        let stacked = Tensor::stack("sample", parts).ok_or_else(|| AggregateError::ShapeMismatch {
            context: format!("variable {name}"),
            expected: "equal shapes across samples".to_string(),
            found: "differing shapes".to_string(),
        })?;
        variables.insert(name, stacked);
    }

    Ok(StudyDataset {
        samples,
        times,
        variables,
        coordinates,
        gaps,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scalar_field(values: &[f64]) -> String {
        let body: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        format!(
            "internalField nonuniform List<scalar>\n{}\n(\n{}\n)\n;\n",
            values.len(),
            body.join("\n")
        )
    }

    fn write(case: &Path, time: &str, name: &str, content: &str) {
        let dir = case.join(time);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_numeric_time_order() {
        let dir = tempdir().unwrap();
        for t in ["10", "2", "0.5", "0"] {
            write(dir.path(), t, "p", &scalar_field(&[1.0, 2.0]));
        }
        fs::create_dir_all(dir.path().join("constant")).unwrap();
        fs::create_dir_all(dir.path().join("system")).unwrap();
        fs::write(dir.path().join("7"), "a file, not a time").unwrap();

        let ds = aggregate(dir.path(), &["p"], &TimeSelector::All).unwrap();
        assert_eq!(ds.times, vec![0.0, 0.5, 2.0, 10.0]);
        assert_eq!(ds.time_names, vec!["0", "0.5", "2", "10"]);
        assert_eq!(ds.variable("p").unwrap().shape(), &[4, 2]);
    }

    #[test]
    fn test_uniform_fields_broadcast() {
        let dir = tempdir().unwrap();
        write(dir.path(), "0", "p", "internalField uniform 0;\n");
        write(dir.path(), "0", "U", "internalField uniform (1 0 0);\n");
        write(dir.path(), "1", "p", &scalar_field(&[1.0, 2.0, 3.0]));
        write(
            dir.path(),
            "1",
            "U",
            "internalField nonuniform List<vector>\n3\n(\n(1 0 0)\n(2 0 0)\n(3 0 0)\n)\n;\n",
        );

        let ds = aggregate(dir.path(), &["p", "U"], &TimeSelector::All).unwrap();
        assert_eq!(ds.n_cells(), 3);

        let p = ds.variable("p").unwrap();
        assert_eq!(p.dims(), &["time", "cell"]);
        assert_eq!(p.data(), &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);

        let u = ds.variable("U").unwrap();
        assert_eq!(u.dims(), &["time", "cell", "component"]);
        assert_eq!(u.shape(), &[2, 3, 3]);
        assert_eq!(u.get(&[0, 2, 0]), Some(&1.0));
        assert_eq!(u.get(&[1, 2, 0]), Some(&3.0));
    }

    #[test]
    fn test_gaps_filled_with_nan() {
        let dir = tempdir().unwrap();
        write(dir.path(), "0", "p", &scalar_field(&[1.0, 2.0]));
        fs::create_dir_all(dir.path().join("1")).unwrap();

        let ds = aggregate(dir.path(), &["p", "T"], &TimeSelector::All).unwrap();
        let p = ds.variable("p").unwrap();
        assert_eq!(p.shape(), &[2, 2]);
        assert!(p.get(&[1, 0]).unwrap().is_nan());
        assert_eq!(ds.missing, vec!["T"]);
        assert!(ds.variable("T").is_none());
        // p at 1, T at 0 and 1
        assert_eq!(ds.gaps.len(), 3);
    }

    #[test]
    fn test_cell_count_mismatch() {
        let dir = tempdir().unwrap();
        write(dir.path(), "0", "p", &scalar_field(&[1.0, 2.0, 3.0]));
        write(dir.path(), "1", "p", &scalar_field(&[1.0, 2.0]));

        assert!(matches!(
            aggregate(dir.path(), &["p"], &TimeSelector::All),
            Err(AggregateError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_explicit_times() {
        let dir = tempdir().unwrap();
        for t in ["0", "1", "2"] {
            write(dir.path(), t, "p", &scalar_field(&[1.0]));
        }
        let ds = aggregate(
            dir.path(),
            &["p"],
            &TimeSelector::Only(vec!["2".into(), "0".into()]),
        )
        .unwrap();
        assert_eq!(ds.times, vec![2.0, 0.0]);

        assert!(matches!(
            aggregate(dir.path(), &["p"], &TimeSelector::single("latest")),
            Err(AggregateError::InvalidTime(t)) if t == "latest"
        ));
    }

    #[test]
    fn test_empty_case() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            aggregate(dir.path(), &["p"], &TimeSelector::All),
            Err(AggregateError::NoTimeDirectories(_))
        ));
        fs::create_dir_all(dir.path().join("0")).unwrap();
        assert!(matches!(
            aggregate(dir.path(), &["p"], &TimeSelector::All),
            Err(AggregateError::NoFieldData(_))
        ));
    }

    #[test]
    fn test_time_dims_labels() {
        assert_eq!(time_dims(2), vec!["time", "cell"]);
        assert_eq!(time_dims(4), vec!["time", "dim_1", "dim_2", "dim_3"]);
    }
}
