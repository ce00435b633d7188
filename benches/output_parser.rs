//! Output parser benchmarks
//!
//! Benchmarks for artifact ingestion:
//! - Whole-artifact parsing
//! - Parsing with a share of rejected rows
//! - Result table assembly and Parquet export

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sweep_orchestrator::parameters::ScalePoint;
use sweep_orchestrator::parser::{ObservableSchema, OutputRecord};
use sweep_orchestrator::storage::ResultTable;

const HEADER: &str =
    "temperature, energy, magnetisation, specific_heat, susceptibility, corr_length:12.5";

/// Create a thermodynamic artifact with `rows` rows, every `bad_every`-th row malformed
fn create_artifact(rows: usize, bad_every: Option<usize>) -> String {
    let mut rng = StdRng::seed_from_u64(42);
    let mut body = String::with_capacity(rows * 64);
    body.push_str(HEADER);
    body.push('\n');
    for idx in 0..rows {
        if bad_every.is_some_and(|n| idx % n == 0) {
            body.push_str("2.0, -1.5, garbage\n");
            continue;
        }
        let values: Vec<String> = (0..6).map(|_| rng.gen_range(-2.0..4.0f64).to_string()).collect();
        body.push_str(&values.join(", "));
        body.push('\n');
    }
    body
}

/// Benchmark whole-artifact parsing
fn bench_parse_artifact(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_artifact");

    for size in [100, 1_000, 10_000].iter() {
        let artifact = create_artifact(*size, None);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let record =
                    OutputRecord::from_reader(ObservableSchema::Thermodynamic, artifact.as_bytes())
                        .unwrap();
                black_box(record);
            });
        });
    }

    group.finish();
}

/// Benchmark parsing when one row in ten is rejected
fn bench_parse_with_rejections(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_with_rejections");

    for size in [1_000, 10_000].iter() {
        let artifact = create_artifact(*size, Some(10));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let record =
                    OutputRecord::from_reader(ObservableSchema::Thermodynamic, artifact.as_bytes())
                        .unwrap();
                black_box(record.rejected_rows().len());
            });
        });
    }

    group.finish();
}

/// Benchmark result table assembly and Parquet export
fn bench_result_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_table");
    let names = vec!["Lx".to_string(), "Ly".to_string()];
    let record =
        OutputRecord::from_reader(ObservableSchema::Thermodynamic, create_artifact(10_000, None).as_bytes())
            .unwrap();
    let dir = tempfile::tempdir().unwrap();

    for points in [1_i64, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("write_parquet", points), points, |b, &points| {
            b.iter(|| {
                let mut table = ResultTable::new(&names, &ObservableSchema::Thermodynamic).unwrap();
                for l in 0..points {
                    table.push_record(&ScalePoint::uniform(8 << l, 2), &record).unwrap();
                }
                table.write_parquet(dir.path().join("bench.parquet")).unwrap();
                black_box(table.num_rows());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_artifact,
    bench_parse_with_rejections,
    bench_result_table
);
criterion_main!(benches);
