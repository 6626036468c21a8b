use geoshard::prelude::*;
use geoshard::{
    BoundingBoxSamples, PartitionBoundary, PartitionBuildWarning, build_boundaries, sample,
    sample_sharded,
};
use std::sync::Arc;
use std::thread;

type Handle = GeometryHandle<Geometry<f64>>;

fn point(id: GeometryId, x: f64, y: f64) -> Handle {
    GeometryHandle::point(id, x, y).expect("finite point")
}

/// Test 1: four corner points on a 2x2 grid
#[test]
fn test_four_points_equal_grid() {
    let source = vec![
        point(0, 0.0, 0.0),
        point(1, 0.0, 10.0),
        point(2, 10.0, 0.0),
        point(3, 10.0, 10.0),
    ];
    let config = Config::default()
        .with_partitioning_scheme(PartitioningScheme::Grid)
        .with_num_partitions(4)
        .with_seed(1);
    let dataset = PartitionedDataset::build(&source, &config).expect("build");

    assert_eq!(dataset.boundaries().len(), 4);
    for partition in dataset.partitions() {
        let homes: Vec<GeometryId> = partition
            .entries()
            .iter()
            .filter(|e| e.is_home)
            .map(|e| e.handle.id())
            .collect();
        assert_eq!(homes.len(), 1, "partition {} homes {homes:?}", partition.id());
    }
    let stats = dataset.stats();
    assert_eq!(stats.entries, 4);
    assert_eq!(stats.skew, 1.0);
}

/// Test 2: distance join across a KDB split
#[test]
fn test_distance_join_across_kdb_split() {
    let a = point(0, 0.0, 0.0);
    let b = point(1, 0.0, 3.0);

    let config = Config::default()
        .with_partitioning_scheme(PartitioningScheme::KdbTree)
        .with_num_partitions(2)
        .with_seed(7);
    let samples = BoundingBoxSamples::from_boxes(vec![*a.bbox(), *b.bbox()]);
    let boundaries: Arc<[PartitionBoundary]> =
        build_boundaries(&samples, &config).expect("boundaries").into();
    assert_eq!(boundaries.len(), 2);

    let lookup = geoshard::BoundaryLookup::new(&boundaries);
    assert_ne!(lookup.home_of_box(a.bbox()), lookup.home_of_box(b.bbox()));

    for (distance, expected) in [(5.0, vec![(0, 1)]), (2.0, vec![])] {
        let config = config.clone().with_predicate(SpatialPredicate::WithinDistance(distance));
        let left = PartitionedDataset::with_boundaries(&[a.clone()], boundaries.clone(), &config)
            .expect("left");
        let right = PartitionedDataset::with_boundaries_expanded(
            &[b.clone()],
            boundaries.clone(),
            &config,
            distance,
        )
        .expect("right");

        let output = JoinEngine::new(&config)
            .expect("engine")
            .join(&left, &right)
            .expect("join");
        assert_eq!(output.id_pairs(), expected, "within {distance}");
        if let Some(pair) = output.pairs.first() {
            assert_eq!(pair.distance, Some(3.0));
        }
    }
}

/// Test 3: self distance join reports each ordered pair once
#[test]
fn test_self_distance_join() {
    let source: Vec<Handle> = (0..200)
        .map(|i| point(i, (i % 20) as f64, (i / 20) as f64))
        .collect();
    let config = Config::default()
        .with_num_partitions(9)
        .with_predicate(SpatialPredicate::WithinDistance(1.0))
        .with_seed(3);
    let left = PartitionedDataset::build(&source, &config).expect("left");
    let right =
        PartitionedDataset::with_boundaries_expanded(&source, left.boundaries().clone(), &config, 1.0)
            .expect("right");
    let output = JoinEngine::new(&config)
        .expect("engine")
        .join(&left, &right)
        .expect("join");

    // Each point matches itself plus its 4-neighbours on the unit lattice.
    let expected: usize = source
        .iter()
        .map(|p| {
            source
                .iter()
                .filter(|q| p.geometry().distance(q.geometry()) <= 1.0)
                .count()
        })
        .sum();
    assert_eq!(output.pairs.len(), expected);
    let mut unique = output.id_pairs();
    unique.dedup();
    assert_eq!(unique.len(), expected);
}

/// Test 4: identical inputs still yield the requested partition count
#[test]
fn test_degenerate_identical_points() {
    let source: Vec<Handle> = (0..64).map(|i| point(i, 5.0, 5.0)).collect();
    for scheme in [
        PartitioningScheme::Grid,
        PartitioningScheme::QuadTree,
        PartitioningScheme::KdbTree,
        PartitioningScheme::Hilbert,
    ] {
        let config = Config::default()
            .with_partitioning_scheme(scheme)
            .with_num_partitions(6)
            .with_seed(1);
        let dataset = PartitionedDataset::build(&source, &config).expect("build");
        assert_eq!(dataset.num_partitions(), 6, "{scheme:?}");
        assert!(dataset.boundaries().iter().all(|b| !b.bbox.is_degenerate()));
        assert_eq!(dataset.home_handles().count(), 64);

        let hits = QueryEngine::new(&dataset)
            .range_box(&BoundingBox::point(5.0, 5.0))
            .expect("range");
        assert_eq!(hits.len(), 64);
    }
}

/// Test 5: malformed queries fail alone and leave the dataset usable
#[test]
fn test_nan_queries() {
    let source: Vec<Handle> = (0..100).map(|i| point(i, i as f64, 1.0)).collect();
    let dataset = PartitionedDataset::build(&source, &Config::default().with_num_partitions(4))
        .expect("build");
    let engine = QueryEngine::new(&dataset);

    let nan_box = BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0);
    assert!(matches!(
        engine.range_box(&nan_box),
        Err(GeoshardError::IndexQuery(_))
    ));
    assert!(matches!(
        engine.knn(0.0, f64::NAN, 3),
        Err(GeoshardError::IndexQuery(_))
    ));
    assert!(matches!(
        dataset.partitions()[0].index().query(&nan_box),
        Err(GeoshardError::IndexQuery(_))
    ));

    let nearest = engine.knn(10.0, 1.0, 1).expect("knn after failures");
    assert_eq!(nearest[0].handle.id(), 10);
}

/// Test 6: concurrent queries against one dataset
#[test]
fn test_concurrent_queries() {
    let source: Vec<Handle> = (0..5_000)
        .map(|i| point(i, (i % 100) as f64, (i / 100) as f64))
        .collect();
    let dataset = Arc::new(
        PartitionedDataset::build(&source, &Config::default().with_num_partitions(16).with_seed(5))
            .expect("build"),
    );

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let dataset = Arc::clone(&dataset);
            thread::spawn(move || {
                let engine = QueryEngine::new(&dataset);
                let x = (t * 10) as f64;
                let nearest = engine.knn(x, 10.0, 1).expect("knn");
                let window = engine
                    .range_box(&BoundingBox::new(x, 0.0, x + 4.5, 4.5))
                    .expect("range");
                (nearest[0].handle.id(), window.len())
            })
        })
        .collect();

    for (t, handle) in handles.into_iter().enumerate() {
        let (nearest, count) = handle.join().expect("thread");
        assert_eq!(nearest, 1_000 + (t as u64) * 10);
        assert_eq!(count, 25);
    }
}

/// Test 7: empty sources
#[test]
fn test_empty_source() {
    let empty: Vec<Handle> = Vec::new();
    assert!(matches!(
        PartitionedDataset::build(&empty, &Config::default()),
        Err(GeoshardError::InsufficientData)
    ));
    assert!(matches!(
        sample(std::iter::empty(), 10, 0),
        Err(GeoshardError::InsufficientData)
    ));
}

/// Test 8: invalid configuration is rejected before partitioning
#[test]
fn test_invalid_configuration() {
    let source = vec![point(0, 0.0, 0.0), point(1, 1.0, 1.0)];
    let bad = [
        Config::default().with_num_partitions(0),
        Config::default().with_sample_size(0),
        Config::default().with_hilbert_order(0),
        Config::default().with_hilbert_order(40),
        Config::default().with_predicate(SpatialPredicate::WithinDistance(-1.0)),
        Config::default().with_predicate(SpatialPredicate::WithinDistance(f64::NAN)),
    ];
    for config in bad {
        assert!(
            matches!(
                PartitionedDataset::build(&source, &config),
                Err(GeoshardError::InvalidConfiguration(_))
            ),
            "{config:?}"
        );
    }
    assert!(JoinEngine::new(&Config::default().with_num_partitions(0)).is_err());
}

/// Test 9: co-partitioned join over different boundary sets
#[test]
fn test_mismatched_boundaries() {
    let config = Config::default().with_num_partitions(4).with_seed(1);
    let left_source: Vec<Handle> = (0..50).map(|i| point(i, i as f64, i as f64)).collect();
    let right_source: Vec<Handle> = (0..5).map(|i| point(i, i as f64 * 2.0, i as f64 * 2.0)).collect();
    let left = PartitionedDataset::build(&left_source, &config).expect("left");
    let right = PartitionedDataset::build(&right_source, &config).expect("right");

    assert!(matches!(
        JoinEngine::new(&config).expect("engine").join(&left, &right),
        Err(GeoshardError::InvalidConfiguration(_))
    ));
    // Broadcast does not need shared boundaries.
    let broadcast = config.with_join_strategy(JoinStrategy::Broadcast);
    let output = JoinEngine::new(&broadcast)
        .expect("engine")
        .join(&left, &right)
        .expect("broadcast");
    assert_eq!(output.id_pairs(), vec![(0, 0), (2, 1), (4, 2), (6, 3), (8, 4)]);
}

/// Test 10: geometries outside every boundary are dropped and counted
#[test]
fn test_dropped_geometries_warning() {
    let boundaries: Arc<[PartitionBoundary]> = vec![
        PartitionBoundary {
            id: 0,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        },
        PartitionBoundary {
            id: 1,
            bbox: BoundingBox::new(10.0, 0.0, 20.0, 10.0),
        },
    ]
    .into();
    let source = vec![
        point(0, 5.0, 5.0),
        point(1, 15.0, 5.0),
        point(2, 50.0, 50.0),
        point(3, -1.0, 5.0),
    ];
    let dataset = PartitionedDataset::with_boundaries(&source, boundaries, &Config::default())
        .expect("assignment continues past dropped geometries");
    assert_eq!(dataset.len(), 2);
    assert_eq!(
        dataset.report().warning,
        Some(PartitionBuildWarning { dropped: 2 })
    );
    assert_eq!(dataset.stats().dropped, 2);
}

/// Test 11: sharded sampling is reproducible
#[test]
fn test_sharded_sampling_reproducible() {
    let boxes: Vec<BoundingBox> = (0..20_000)
        .map(|i| BoundingBox::point((i % 137) as f64, (i % 71) as f64))
        .collect();
    let shards: Vec<&[BoundingBox]> = boxes.chunks(2_500).collect();
    let a = sample_sharded(&shards, 1_000, 99).expect("sample");
    assert_eq!(a.len(), 1_000);
    assert_eq!(a.population_count(), 20_000);
    assert_eq!(
        a.extent(),
        Some(BoundingBox::new(0.0, 0.0, 136.0, 70.0))
    );
}

/// Test 12: large coordinate magnitudes
#[test]
fn test_large_coordinates() {
    let source: Vec<Handle> = (0..500)
        .map(|i| point(i, 1.0e9 + (i % 25) as f64 * 1.0e3, -1.0e9 + (i / 25) as f64 * 1.0e3))
        .collect();
    for scheme in [PartitioningScheme::Hilbert, PartitioningScheme::QuadTree] {
        let config = Config::default()
            .with_partitioning_scheme(scheme)
            .with_num_partitions(10)
            .with_seed(4);
        let dataset = PartitionedDataset::build(&source, &config).expect("build");
        assert_eq!(dataset.report().dropped(), 0);
        let nearest = QueryEngine::new(&dataset)
            .knn(1.0e9, -1.0e9, 2)
            .expect("knn");
        let ids: Vec<GeometryId> = nearest.iter().map(|r| r.handle.id()).collect();
        assert_eq!(ids, vec![0, 1]);
    }
}
