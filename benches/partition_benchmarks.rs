use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geo::Geometry;
use geoshard::{
    BoundingBox, Config, GeometryHandle, IndexType, JoinEngine, JoinStrategy, PartitionedDataset,
    PartitioningScheme, QueryEngine, SpatialPredicate,
};

fn points(n: u64, first_id: u64, seed: u64) -> Vec<GeometryHandle<Geometry<f64>>> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..n)
        .map(|i| {
            // Half the data falls in a small hot spot.
            let (x, y) = if i % 2 == 0 {
                (rng.f64() * 1000.0, rng.f64() * 1000.0)
            } else {
                (480.0 + rng.f64() * 40.0, 480.0 + rng.f64() * 40.0)
            };
            GeometryHandle::point(first_id + i, x, y).unwrap()
        })
        .collect()
}

fn benchmark_partitioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("partitioning");
    let source = points(50_000, 0, 1);

    for scheme in [
        PartitioningScheme::Grid,
        PartitioningScheme::QuadTree,
        PartitioningScheme::KdbTree,
        PartitioningScheme::Hilbert,
    ] {
        let config = Config::default()
            .with_partitioning_scheme(scheme)
            .with_num_partitions(64)
            .with_seed(7);
        group.bench_with_input(
            BenchmarkId::new("build", format!("{scheme:?}")),
            &config,
            |b, config| b.iter(|| PartitionedDataset::build(black_box(&source), config).unwrap()),
        );
    }

    group.finish();
}

fn benchmark_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let source = points(100_000, 0, 2);

    for index_type in [IndexType::RTree, IndexType::QuadTree] {
        let config = Config::default()
            .with_num_partitions(32)
            .with_index_type(index_type)
            .with_seed(3);
        let dataset = PartitionedDataset::build(&source, &config).unwrap();
        dataset.build_indexes();
        let engine = QueryEngine::new(&dataset);

        group.bench_function(BenchmarkId::new("range_box", format!("{index_type:?}")), |b| {
            let window = BoundingBox::new(450.0, 450.0, 550.0, 550.0);
            b.iter(|| engine.range_box(black_box(&window)).unwrap())
        });

        for k in [1, 10, 100] {
            group.bench_function(
                BenchmarkId::new(format!("knn_{index_type:?}"), k),
                |b| b.iter(|| engine.knn(black_box(500.0), black_box(500.0), k).unwrap()),
            );
        }
    }

    group.finish();
}

fn benchmark_joins(c: &mut Criterion) {
    let mut group = c.benchmark_group("joins");
    group.sample_size(20);

    let left_source = points(20_000, 0, 4);
    let right_source = points(5_000, 1_000_000, 5);
    let distance = 2.0;
    let config = Config::default()
        .with_num_partitions(32)
        .with_predicate(SpatialPredicate::WithinDistance(distance))
        .with_seed(6);
    let left = PartitionedDataset::build(&left_source, &config).unwrap();
    let right = PartitionedDataset::with_boundaries_expanded(
        &right_source,
        left.boundaries().clone(),
        &config,
        distance,
    )
    .unwrap();
    left.build_indexes();
    right.build_indexes();

    for strategy in [JoinStrategy::CoPartitioned, JoinStrategy::Broadcast] {
        let engine = JoinEngine::new(&config.clone().with_join_strategy(strategy)).unwrap();
        group.bench_function(format!("within_distance_{strategy:?}"), |b| {
            b.iter(|| engine.join(black_box(&left), black_box(&right)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_partitioning,
    benchmark_queries,
    benchmark_joins
);

criterion_main!(benches);
