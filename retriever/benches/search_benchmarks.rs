use criterion::{black_box, criterion_group, criterion_main, Criterion};
use retriever::{
    Filter, LocationKind, NullProgress, PatternDefinition, ReplaceOperation, ReplaceSession,
    ReplaceTarget, Scope, SearchQuery, SortOrder, ViewModel,
};
use std::{fs::File, io::Write, path::Path};
use tempfile::tempdir;

fn create_test_files(dir: &Path, file_count: usize, lines_per_file: usize) -> std::io::Result<()> {
    for i in 0..file_count {
        let file_path = dir.join(format!("test_{}.rs", i));
        let mut file = File::create(file_path)?;
        for j in 0..lines_per_file {
            writeln!(file, "// TODO: fix bug {} in file {}", j, i)?;
            writeln!(file, "let todo_{} = \"TODO later\";", j)?;
            writeln!(file, "process_todo({});", j)?;
        }
    }
    Ok(())
}

fn query(dir: &Path, pattern: PatternDefinition) -> SearchQuery {
    let scope = Scope::new(vec![dir.to_path_buf()], &["*.rs"], false, false).unwrap();
    SearchQuery::new(pattern, scope).unwrap()
}

fn bench_patterns(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    create_test_files(dir.path(), 10, 100).unwrap();

    let patterns = vec![
        PatternDefinition::literal("todo"),
        PatternDefinition::regex(r"TODO:.*\d+"),
        PatternDefinition::regex(r"process_(\w+)\(\d+\)"),
        PatternDefinition {
            whole_word: true,
            ..PatternDefinition::literal("TODO")
        },
    ];

    let mut group = c.benchmark_group("Patterns");
    for (i, pattern) in patterns.into_iter().enumerate() {
        let query = query(dir.path(), pattern);
        group.bench_function(format!("pattern_{}", i), |b| {
            b.iter(|| black_box(query.run(&NullProgress).unwrap()));
        });
    }
    group.finish();
}

fn bench_file_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("File Scaling");
    for &count in &[1, 10, 100, 500] {
        let dir = tempdir().unwrap();
        create_test_files(dir.path(), count, 10).unwrap();
        let query = query(dir.path(), PatternDefinition::literal("TODO"));

        group.bench_function(format!("files_{}", count), |b| {
            b.iter(|| black_box(query.run(&NullProgress).unwrap()));
        });
    }
    group.finish();
}

fn bench_filter_and_view(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    create_test_files(dir.path(), 50, 50).unwrap();
    let query = query(dir.path(), PatternDefinition::literal("todo"));
    query.run(&NullProgress).unwrap();
    let results = query.results().clone();

    let mut group = c.benchmark_group("Filter and View");
    group.bench_function("toggle_location_filter", |b| {
        b.iter(|| {
            results.apply_filter(Filter::new().accepting(LocationKind::COMMENT));
            results.apply_filter(Filter::new());
        });
    });

    for order in [SortOrder::Flat, SortOrder::Hierarchical] {
        let mut view = ViewModel::new(results.clone(), order);
        group.bench_function(format!("rebuild_{:?}", order).to_lowercase(), |b| {
            b.iter(|| black_box(view.input_changed()));
        });
    }
    group.finish();
}

fn bench_replace_preview(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    create_test_files(dir.path(), 20, 50).unwrap();
    let query = query(dir.path(), PatternDefinition::regex(r"todo_(\d+)"));
    query.run(&NullProgress).unwrap();
    let session = ReplaceSession::new();

    let mut group = c.benchmark_group("Replace");
    group.bench_function("preview_all", |b| {
        b.iter(|| {
            let operation =
                ReplaceOperation::replace(&query, ReplaceTarget::All, "item_$1").unwrap();
            black_box(operation.preview(&session).unwrap())
        });
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_patterns, bench_file_scaling, bench_filter_and_view, bench_replace_preview
}

criterion_main!(benches);
