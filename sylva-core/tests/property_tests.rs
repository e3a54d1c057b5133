use proptest::prelude::*;
use sylva_core::distance::{dot_product, euclidean_distance_squared};
use sylva_core::{
    AnnIndex, DistanceMetric, Filter, IndexConfig, PointId, SearchParams, TagIndex,
};

fn any_metric() -> impl Strategy<Value = DistanceMetric> {
    prop_oneof![Just(DistanceMetric::Angular), Just(DistanceMetric::Euclidean)]
}

fn point_sets(dim: usize, max: usize) -> impl Strategy<Value = Vec<Vec<f32>>> {
    proptest::collection::vec(proptest::collection::vec(-1.0f32..1.0f32, dim), 1..max)
}

fn index_of(points: &[Vec<f32>], metric: DistanceMetric, seed: u64) -> AnnIndex {
    let dim = points[0].len();
    let config = IndexConfig::new(dim).with_metric(metric).with_seed(seed);
    let mut index = AnnIndex::with_config(config).unwrap();
    for (i, p) in points.iter().enumerate() {
        index.add_item(i as PointId, p).unwrap();
    }
    index
}

proptest! {
    #[test]
    fn test_dot_product_matches_naive(
        // Constrain to typical normalized embedding range [-1.0, 1.0]
        a in proptest::collection::vec(-1.0f32..1.0f32, 0..100),
        b in proptest::collection::vec(-1.0f32..1.0f32, 0..100)
    ) {
        let len = std::cmp::min(a.len(), b.len());
        let a = &a[..len];
        let b = &b[..len];

        let fast = dot_product(a, b);
        let naive: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

        prop_assert!((fast - naive).abs() < 1e-4);
    }

    #[test]
    fn test_euclidean_matches_naive(
        a in proptest::collection::vec(-1.0f32..1.0f32, 0..100),
        b in proptest::collection::vec(-1.0f32..1.0f32, 0..100)
    ) {
        let len = std::cmp::min(a.len(), b.len());
        let a = &a[..len];
        let b = &b[..len];

        let fast = euclidean_distance_squared(a, b);
        let naive: f32 = a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let diff = x - y;
                diff * diff
            })
            .sum();

        prop_assert!((fast - naive).abs() < 1e-3);
    }

    #[test]
    fn test_metric_symmetric_and_bounded(
        metric in any_metric(),
        a in proptest::collection::vec(-1.0f32..1.0f32, 1..32),
        b in proptest::collection::vec(-1.0f32..1.0f32, 1..32)
    ) {
        let len = std::cmp::min(a.len(), b.len());
        let a = &a[..len];
        let b = &b[..len];

        let ab = metric.distance(a, b);
        let ba = metric.distance(b, a);
        prop_assert!(ab >= 0.0);
        prop_assert!((ab - ba).abs() < 1e-5);
        if metric == DistanceMetric::Angular {
            prop_assert!(ab <= 2.0 + 1e-5);
        }
    }

    #[test]
    fn test_self_distance_is_zero(
        metric in any_metric(),
        a in proptest::collection::vec(0.1f32..1.0f32, 1..32)
    ) {
        // sqrt amplifies rounding left in 2 - 2cos
        prop_assert!(metric.distance(&a, &a) < 1e-3);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_build_is_deterministic(
        metric in any_metric(),
        points in point_sets(5, 120),
        seed in any::<u64>(),
        threads in 1usize..4
    ) {
        let mut a = index_of(&points, metric, seed);
        let mut b = index_of(&points, metric, seed);
        a.build(4, 1).unwrap();
        b.build(4, threads).unwrap();

        let query = &points[0];
        prop_assert_eq!(
            a.get_nns_by_vector(query, 10, Some(30)).unwrap(),
            b.get_nns_by_vector(query, 10, Some(30)).unwrap()
        );
    }

    #[test]
    fn test_results_sorted_unique_and_in_range(
        metric in any_metric(),
        points in point_sets(4, 80),
        n in 1usize..20
    ) {
        let mut index = index_of(&points, metric, 7);
        index.build(3, 1).unwrap();

        let found = index.get_nns_by_vector(&points[points.len() - 1], n, None).unwrap();
        prop_assert!(found.len() <= n);
        prop_assert!(found.distances.windows(2).all(|w| w[0] <= w[1]));
        let mut ids = found.ids.clone();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), found.len());
        prop_assert!(ids.iter().all(|&id| (id as usize) < points.len()));
    }

    #[test]
    fn test_filtered_results_stay_in_allow_list(
        points in point_sets(3, 100),
        modulus in 2u32..5
    ) {
        let mut index = index_of(&points, DistanceMetric::Euclidean, 3);
        index.build(3, 1).unwrap();

        let mut tags = TagIndex::new();
        for id in 0..points.len() as PointId {
            tags.insert(id, (id % modulus) as i64);
        }
        let allow = Filter::tag(0i64).resolve(&tags, points.len());
        let params = SearchParams::new(points.len()).with_filter(&allow);

        let found = index.search(&points[0], &params).unwrap();
        prop_assert!(found.iter().all(|r| r.id % modulus == 0));
    }
}

proptest! {
    #[test]
    fn test_negation_partitions_universe(
        ids in proptest::collection::btree_set(0u32..200, 0..50),
        n_items in 1usize..200
    ) {
        let tags = TagIndex::new();
        let filter = Filter::ids(ids.iter().copied());
        let inside = filter.resolve(&tags, n_items);
        let outside = filter.clone().negate().resolve(&tags, n_items);

        prop_assert!((&inside & &outside).is_empty());
        prop_assert_eq!(inside.len() + outside.len(), n_items as u64);
        prop_assert!(inside.iter().all(|id| (id as usize) < n_items));
    }

    #[test]
    fn test_and_or_match_set_algebra(
        left in proptest::collection::btree_set(0u32..64, 0..32),
        right in proptest::collection::btree_set(0u32..64, 0..32)
    ) {
        let tags = TagIndex::new();
        let l = Filter::ids(left.iter().copied());
        let r = Filter::ids(right.iter().copied());

        let both = l.clone().and(r.clone()).resolve(&tags, 64);
        let either = l.or(r).resolve(&tags, 64);

        let expect_both: Vec<u32> = left.intersection(&right).copied().collect();
        let expect_either: Vec<u32> = left.union(&right).copied().collect();
        prop_assert_eq!(both.iter().collect::<Vec<_>>(), expect_both);
        prop_assert_eq!(either.iter().collect::<Vec<_>>(), expect_either);
    }
}
