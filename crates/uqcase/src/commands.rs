//! Implementations of the `sample`, `run`, `aggregate` and `template` subcommands

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{WrapErr, eyre};
use uqcase_core::{
    CaseAggregator, CellCentreField, DesignMatrix, ProcessExecutor, SampleOutcome, StudyDataset,
    StudyProgress, StudyReport, Template, TimeSelector, check_templates, default_sample_name,
    run_study,
};

use crate::config::{SamplingOverrides, StudyFile};
use crate::util::atomic_write;

/// Report file written into the study directory
pub const REPORT_FILE: &str = "study_report.yaml";
/// Design matrix written into the study directory
pub const DESIGN_FILE: &str = "design.csv";

/// `sample,<key>,<key>...` header followed by one line per row
pub fn design_csv<I>(keys: &[String], rows: I) -> String
where
    I: IntoIterator<Item = (usize, Vec<f64>)>,
{
    let mut csv = String::from("sample");
    for key in keys {
        csv.push(',');
        csv.push_str(key);
    }
    csv.push('\n');
    for (index, values) in rows {
        let _ = write!(csv, "{index}");
        for value in values {
            let _ = write!(csv, ",{value}");
        }
        csv.push('\n');
    }
    csv
}

fn matrix_csv(keys: &[String], design: &DesignMatrix) -> String {
    design_csv(keys, design.rows().map(<[f64]>::to_vec).enumerate())
}

fn outcomes_csv(keys: &[String], samples: &[SampleOutcome]) -> String {
    design_csv(
        keys,
        samples.iter().map(|s| {
            let values = keys
                .iter()
                .map(|k| s.parameters.get(k).copied().unwrap_or(f64::NAN))
                .collect();
            (s.index, values)
        }),
    )
}

fn space_keys(study: &StudyFile) -> Vec<String> {
    study.parameter_ranges.keys().map(|k| k.to_string()).collect()
}

/// Generate the design matrix without running anything
pub fn sample(study: &StudyFile, overrides: &SamplingOverrides) -> color_eyre::Result<String> {
    let plan = study.sampling_plan(overrides);
    let design = plan
        .generate(&study.parameter_ranges)
        .wrap_err("Failed to generate design")?;
    Ok(matrix_csv(&space_keys(study), &design))
}

/// Run the study and persist its report and design
pub fn run(study: &StudyFile, overrides: &SamplingOverrides) -> color_eyre::Result<StudyReport> {
    let plan = study.sampling_plan(overrides);
    let definition = study.definition();
    let progress = StudyProgress::default();

    let report = run_study(
        &definition,
        &plan,
        &ProcessExecutor::new(),
        default_sample_name,
        &progress,
        |outcome| {
            tracing::info!(
                sample = outcome.index,
                status = ?outcome.status,
                completed = progress.completed(),
                total = progress.total(),
                "sample finished"
            );
        },
    )
    .wrap_err_with(|| format!("Study '{}' failed", definition.name))?;

    write_report(&report, &space_keys(study))?;
    Ok(report)
}

/// Write `study_report.yaml` and `design.csv` into the study directory
pub fn write_report(report: &StudyReport, keys: &[String]) -> color_eyre::Result<()> {
    let yaml = serde_saphyr::to_string(report)
        .map_err(|e| eyre!("Failed to serialize study report: {e}"))?;
    let report_path = report.study_dir.join(REPORT_FILE);
    atomic_write(&report_path, &yaml)
        .wrap_err_with(|| format!("Failed to write {}", report_path.display()))?;

    let design_path = report.study_dir.join(DESIGN_FILE);
    atomic_write(&design_path, &outcomes_csv(keys, &report.samples))
        .wrap_err_with(|| format!("Failed to write {}", design_path.display()))?;

    tracing::info!(report = %report_path.display(), "study report written");
    Ok(())
}

pub fn read_report(study_dir: &Path) -> color_eyre::Result<StudyReport> {
    let path = study_dir.join(REPORT_FILE);
    let content = fs::read_to_string(&path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    serde_saphyr::from_str(&content).map_err(|e| eyre!("Failed to parse {}: {e}", path.display()))
}

/// One-paragraph summary for the terminal
pub fn summary(report: &StudyReport) -> String {
    let elapsed = report
        .finished_at
        .duration_since(report.started_at)
        .as_secs_f64();
    let mut text = format!(
        "{}: {} succeeded, {} failed, {} cancelled in {:.1}s\n",
        report.study,
        report.succeeded().count(),
        report.failed().count(),
        report.cancelled().count(),
        elapsed
    );
    for failed in report.failed() {
        let error = failed.error.as_deref().unwrap_or("unknown error");
        let first_line = error.lines().next().unwrap_or_default();
        let _ = writeln!(text, "  sample {:03}: {}", failed.index, first_line);
    }
    text
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub study_dir: PathBuf,
    pub variables: Vec<String>,
    /// Samples `0..n`; `None` reads the successful samples from the study report
    pub samples: Option<usize>,
    /// Time directories; empty means all
    pub times: Vec<String>,
    pub threads: usize,
    /// Attach cell centres from `0/C`
    pub mesh: bool,
}

pub fn aggregate(request: &AggregateRequest) -> color_eyre::Result<StudyDataset> {
    let times = if request.times.is_empty() {
        TimeSelector::All
    } else {
        TimeSelector::Only(request.times.clone())
    };
    let mut aggregator = CaseAggregator::new(request.variables.iter().cloned())
        .times(times)
        .threads(request.threads);
    if request.mesh {
        aggregator = aggregator.mesh(CellCentreField::default());
    }

    let dataset = match request.samples {
        Some(n) => aggregator.aggregate_study(&request.study_dir, n),
        None => {
            let report = read_report(&request.study_dir)?;
            let indices = report.successful_indices();
            tracing::info!(
                successful = indices.len(),
                total = report.samples.len(),
                "aggregating successful samples from report"
            );
            aggregator.aggregate_samples(&request.study_dir, &indices, default_sample_name)
        }
    };
    dataset.wrap_err_with(|| format!("Failed to aggregate {}", request.study_dir.display()))
}

/// Pretty JSON; gaps (NaN) become `null`
pub fn dataset_json(dataset: &StudyDataset) -> color_eyre::Result<String> {
    serde_json::to_string_pretty(dataset).wrap_err("Failed to serialize dataset")
}

/// `VALUE=NAME`, split at the last `=`
pub fn parse_replacement(raw: &str) -> Result<(String, String), String> {
    match raw.rsplit_once('=') {
        Some((value, name)) if !value.trim().is_empty() && !name.trim().is_empty() => {
            Ok((value.trim().to_string(), name.trim().to_string()))
        }
        _ => Err(format!("expected VALUE=NAME, got '{raw}'")),
    }
}

/// Turn literal values of a case file into placeholders and write the template
pub fn create_template(
    input: &Path,
    output: &Path,
    replacements: &[(String, String)],
) -> color_eyre::Result<Template> {
    let pairs: Vec<(&str, &str)> = replacements
        .iter()
        .map(|(value, name)| (value.as_str(), name.as_str()))
        .collect();
    let template = Template::from_case_file(input, &pairs)
        .wrap_err_with(|| format!("Failed to create a template from {}", input.display()))?;
    atomic_write(output, &template.to_string())
        .wrap_err_with(|| format!("Failed to write {}", output.display()))?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        placeholders = template.placeholders().len(),
        "template created"
    );
    Ok(template)
}

/// Check every template the study's parameters refer to; returns the file count
pub fn check_study_templates(study: &StudyFile) -> color_eyre::Result<usize> {
    let base = &study.experiment.base_case_dir;
    check_templates(base, &study.parameter_ranges)
        .wrap_err_with(|| format!("Templates in {} are not usable", base.display()))
}

/// Check one template file for the `required` placeholders
pub fn check_template_file(path: &Path, required: &[String]) -> color_eyre::Result<()> {
    Template::load(path)
        .and_then(|t| t.check_placeholders(required.iter().map(String::as_str)))
        .wrap_err_with(|| format!("Template {} is not usable", path.display()))
}
