//! Criterion benchmarks for uqcase_core sampling, templating and field parsing
//!
//! Run with: cargo bench -p uqcase_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use uqcase_core::field::parse_field;
use uqcase_core::template::Template;
use uqcase_core::{ParameterSpace, SamplingMethod, generate};

fn create_space(n_params: usize) -> ParameterSpace {
    let mut space = ParameterSpace::new();
    for i in 0..n_params {
        space
            .push(&format!("constant__properties__p{i}"), 0.0, 1.0 + i as f64)
            .expect("valid range");
    }
    space
}

fn scalar_field(n_cells: usize) -> String {
    let mut text = format!("internalField nonuniform List<scalar>\n{n_cells}\n(\n");
    for i in 0..n_cells {
        text.push_str(&format!("{}\n", i as f64 * 1.5e-3));
    }
    text.push_str(")\n;\n");
    text
}

fn vector_field(n_cells: usize) -> String {
    let mut text = format!("internalField nonuniform List<vector>\n{n_cells}\n(\n");
    for i in 0..n_cells {
        let v = i as f64 * 1e-2;
        text.push_str(&format!("({v} {} 0)\n", -v));
    }
    text.push_str(")\n;\n");
    text
}

fn bench_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling");
    let space = create_space(8);

    for n_samples in [20, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("lhs", n_samples), n_samples, |b, &n| {
            b.iter(|| generate(SamplingMethod::Lhs, black_box(&space), n, Some(42)))
        });
    }

    group.bench_function("central_composite_8", |b| {
        b.iter(|| generate(SamplingMethod::CentralComposite, black_box(&space), 300, None))
    });
    group.bench_function("plackett_burman_8", |b| {
        b.iter(|| generate(SamplingMethod::PlackettBurman, black_box(&space), 12, None))
    });

    group.finish();
}

fn bench_field_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_parsing");

    for n_cells in [1_000, 100_000].iter() {
        let scalar = scalar_field(*n_cells);
        group.bench_with_input(BenchmarkId::new("scalar", n_cells), &scalar, |b, text| {
            b.iter(|| parse_field(black_box(text)))
        });

        let vector = vector_field(*n_cells);
        group.bench_with_input(BenchmarkId::new("vector", n_cells), &vector, |b, text| {
            b.iter(|| parse_field(black_box(text)))
        });
    }

    group.finish();
}

fn bench_template_render(c: &mut Criterion) {
    let source = "nu [0 2 -1 0 0 0 0] {{ nu | scientific(4) }};\n\
                  inlet {{ u | vector }};\n\
                  turbulence {{ les | foam_bool }};\n"
        .repeat(50);
    let template = Template::parse("constant/transportProperties", &source).expect("valid template");
    let values = [("nu", 1.5e-5), ("u", 2.0), ("les", 1.0)];

    c.bench_function("template_render", |b| {
        b.iter(|| template.render(black_box(&values)))
    });
}

criterion_group!(
    benches,
    bench_sampling,
    bench_field_parsing,
    bench_template_render,
);
criterion_main!(benches);
