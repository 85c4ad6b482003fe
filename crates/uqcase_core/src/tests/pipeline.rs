//! Tests for the full study pipeline
//!
//! These tests verify:
//! - A templated `Allrun` run through `sh` produces fields that aggregate
//!   into a `(sample, time, cell)` tensor holding each sample's value
//! - Seeded studies render identical case files
//! - Sample shape mismatches name the offending sample
//! - Aggregating an explicit subset skips samples without output

use std::fs;
use std::path::Path;

use tempfile::tempdir;

use crate::aggregate::{CaseAggregator, TimeSelector, aggregate_study};
use crate::error::AggregateError;
use crate::execute::{ProcessExecutor, SolverCommand};
use crate::progress::StudyProgress;
use crate::sampling::{DesignMatrix, SamplingMethod, SamplingPlan};
use crate::space::ParameterSpace;
use crate::study::{StudyDefinition, default_sample_name, run_design, run_study};

const ALLRUN: &str = r#"#!/bin/sh
scale={{ scale }}
cells={{ cells }}
for t in 0 0.5 1; do
    mkdir -p "$t"
    {
        echo "internalField nonuniform List<scalar>"
        echo "$cells"
        echo "("
        i=0
        while [ "$i" -lt "$cells" ]; do
            echo "$scale"
            i=$((i + 1))
        done
        echo ")"
        echo ";"
    } > "$t/p"
done
echo "internalField uniform (0 0 1);" > 1/U
"#;

fn write_scalar_case(case: &Path, times: &[&str], cells: usize, value: f64) {
    for t in times {
        let dir = case.join(t);
        fs::create_dir_all(&dir).unwrap();
        let rows = vec![value.to_string(); cells].join("\n");
        fs::write(
            dir.join("p"),
            format!("internalField nonuniform List<scalar>\n{cells}\n(\n{rows}\n)\n;\n"),
        )
        .unwrap();
    }
}

#[cfg(unix)]
#[test]
fn test_run_and_aggregate_study() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base");
    fs::create_dir_all(&base).unwrap();
    fs::write(base.join("Allrun"), ALLRUN).unwrap();

    let definition = StudyDefinition {
        name: "shell".to_string(),
        base_case_dir: base,
        output_root: dir.path().join("out"),
        solver: SolverCommand::case_script("Allrun").with_launcher("sh"),
        space: ParameterSpace::from_ranges([
            ("Allrun__scale", 1.0, 2.0),
            ("Allrun__cells", 10.0, 10.5),
        ])
        .unwrap(),
        concurrency: 3,
    };
    // cells must render as an integer, so the design is written by hand
    let design = DesignMatrix::from_rows(
        (0..5).map(|i| vec![1.0 + i as f64 * 0.25, 10.0]).collect(),
    )
    .unwrap();

    let report = run_design(
        &definition,
        &design,
        &ProcessExecutor::new(),
        default_sample_name,
        &StudyProgress::default(),
        |_| {},
    )
    .unwrap();
    assert_eq!(report.failed().count(), 0, "{:?}", report.samples);
    assert!(report.samples[0].case_dir.join("solver.stdout.log").is_file());

    let dataset = CaseAggregator::new(["p", "U"])
        .threads(2)
        .aggregate_study(&definition.study_dir(), 5)
        .unwrap();

    assert_eq!(dataset.samples, vec![0, 1, 2, 3, 4]);
    assert_eq!(dataset.times, vec![0.0, 0.5, 1.0]);

    let p = dataset.variable("p").unwrap();
    assert_eq!(p.dims(), &["sample", "time", "cell"]);
    assert_eq!(p.shape(), &[5, 3, 10]);
    for (s, outcome) in report.samples.iter().enumerate() {
        let scale = outcome.parameters["Allrun__scale"];
        assert_eq!(p.get(&[s, 2, 9]), Some(&scale));
    }

    // U only exists at t=1: broadcast there, gaps elsewhere
    let u = dataset.variable("U").unwrap();
    assert_eq!(u.dims(), &["sample", "time", "cell", "component"]);
    assert_eq!(u.shape(), &[5, 3, 10, 3]);
    assert_eq!(u.get(&[4, 2, 5, 2]), Some(&1.0));
    assert!(u.get(&[4, 0, 5, 2]).unwrap().is_nan());
    assert_eq!(dataset.gaps.len(), 5 * 2);
}

#[cfg(unix)]
#[test]
fn test_seeded_study_is_reproducible() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base");
    fs::create_dir_all(&base).unwrap();
    fs::write(base.join("run.sh"), "echo ok\n").unwrap();
    fs::write(base.join("value"), "{{ v }}\n").unwrap();

    let mut definition = StudyDefinition {
        name: "a".to_string(),
        base_case_dir: base,
        output_root: dir.path().join("out"),
        solver: SolverCommand::case_script("run.sh").with_launcher("sh"),
        space: ParameterSpace::from_ranges([("value__v", 0.0, 1.0)]).unwrap(),
        concurrency: 2,
    };
    let plan = SamplingPlan::new(SamplingMethod::Lhs, 4).with_seed(99);
    let run = |definition: &StudyDefinition| {
        run_study(
            definition,
            &plan,
            &ProcessExecutor::new().without_logs(),
            default_sample_name,
            &StudyProgress::default(),
            |_| {},
        )
        .unwrap()
    };

    let first = run(&definition);
    definition.name = "b".to_string();
    let second = run(&definition);
    for (a, b) in first.samples.iter().zip(&second.samples) {
        assert_eq!(a.parameters, b.parameters);
        assert_eq!(
            fs::read_to_string(a.case_dir.join("value")).unwrap(),
            fs::read_to_string(b.case_dir.join("value")).unwrap()
        );
    }
}

#[test]
fn test_study_shape_five_by_three_by_ten() {
    let dir = tempdir().unwrap();
    for s in 0..5 {
        write_scalar_case(
            &dir.path().join(default_sample_name(s)),
            &["0", "1", "2"],
            10,
            s as f64,
        );
    }

    let dataset = aggregate_study(dir.path(), &["p"], 5, &TimeSelector::All).unwrap();
    let p = dataset.variable("p").unwrap();
    assert_eq!(p.shape(), &[5, 3, 10]);
    assert_eq!(p.get(&[3, 1, 4]), Some(&3.0));
    assert!(dataset.gaps.is_empty());
}

#[test]
fn test_study_cell_mismatch_names_sample() {
    let dir = tempdir().unwrap();
    for s in 0..5 {
        let cells = if s == 3 { 9 } else { 10 };
        write_scalar_case(
            &dir.path().join(default_sample_name(s)),
            &["0", "1", "2"],
            cells,
            1.0,
        );
    }

    match aggregate_study(dir.path(), &["p"], 5, &TimeSelector::All) {
        Err(AggregateError::ShapeMismatch {
            context,
            expected,
            found,
        }) => {
            assert!(context.starts_with("sample 3"), "{context}");
            assert_eq!(expected, "[3, 10]");
            assert_eq!(found, "[3, 9]");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_subset_excludes_failed_sample() {
    let dir = tempdir().unwrap();
    for s in [0, 1, 3] {
        write_scalar_case(&dir.path().join(default_sample_name(s)), &["0"], 4, 2.0);
    }
    // sample_002 never produced output

    let aggregator = CaseAggregator::new(["p"]);
    assert!(matches!(
        aggregator.aggregate_study(dir.path(), 4),
        Err(AggregateError::Sample { index: 2, .. })
    ));

    let dataset = aggregator
        .aggregate_samples(dir.path(), &[0, 1, 3], default_sample_name)
        .unwrap();
    assert_eq!(dataset.samples, vec![0, 1, 3]);
    assert_eq!(dataset.variable("p").unwrap().shape(), &[3, 1, 4]);
}
