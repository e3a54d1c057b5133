//! Growing an existing tree with points it was not built over.

use std::collections::BTreeMap;

use super::build::TreeBuilder;
use super::{Node, NodeRef, Tree};
use crate::distance::{self, DistanceMetric};
use crate::random::Kiss64Random;
use crate::store::{PointId, Vectors};

/// Routes `new_ids` down `tree` and appends each to the leaf it lands in.
///
/// Leaves that grow past `leaf_capacity` are replaced in place by a subtree
/// built over their combined points, so the capacity bound still holds.
/// `vectors` must cover both the tree's existing points and `new_ids`.
pub fn extend_tree(
    tree: &mut Tree,
    vectors: Vectors<'_>,
    new_ids: &[PointId],
    metric: DistanceMetric,
    leaf_capacity: usize,
    mut rng: Kiss64Random,
) {
    if new_ids.is_empty() || tree.is_empty() {
        return;
    }

    let mut pending: BTreeMap<NodeRef, Vec<PointId>> = BTreeMap::new();
    for &id in new_ids {
        let leaf = descend(tree, vectors.get(id), &mut rng);
        pending.entry(leaf).or_default().push(id);
    }

    let mut overflow = Vec::new();
    for (leaf, added) in pending {
        if let Node::Leaf { ids } = &mut tree.nodes[leaf as usize] {
            ids.extend(added);
            if ids.len() > leaf_capacity {
                overflow.push((leaf, std::mem::take(ids)));
            }
        }
    }

    if !overflow.is_empty() {
        let nodes = std::mem::take(&mut tree.nodes);
        let mut builder = TreeBuilder::with_arena(nodes, vectors, metric, leaf_capacity, rng);
        for (leaf, ids) in overflow {
            builder.rebuild_at(leaf, ids);
        }
        tree.nodes = builder.into_nodes();
    }

    tree.recount();
}

/// Follows the hyperplanes from the root to a leaf.
fn descend(tree: &Tree, v: &[f32], rng: &mut Kiss64Random) -> NodeRef {
    let mut at = tree.root;
    while let Node::Split {
        normal,
        offset,
        left,
        right,
        ..
    } = &tree.nodes[at as usize]
    {
        let m = distance::margin(normal, *offset, v);
        let go_right = if m != 0.0 { m > 0.0 } else { rng.flip() };
        at = if go_right { *right } else { *left };
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::BuildPlan;
    use crate::random::DEFAULT_SEED;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    fn plan() -> BuildPlan {
        BuildPlan {
            num_trees: 1,
            num_threads: 1,
            seed: DEFAULT_SEED,
            leaf_capacity: 6,
            metric: DistanceMetric::Euclidean,
            verbose: false,
        }
    }

    #[test]
    fn test_extend_covers_all_points() {
        let data = random_data(300, 4, 10);
        let all = Vectors::new(4, &data);
        let first = Vectors::new(4, &data[..100 * 4]);

        let mut tree = plan().build_tree(first, 0);
        let new_ids: Vec<PointId> = (100..300).collect();
        extend_tree(
            &mut tree,
            all,
            &new_ids,
            DistanceMetric::Euclidean,
            6,
            Kiss64Random::new(5),
        );

        let mut ids = tree.point_ids();
        ids.sort_unstable();
        assert_eq!(ids, (0..300).collect::<Vec<PointId>>());

        for node in tree.nodes() {
            if let Node::Leaf { ids } = node {
                assert!(ids.len() <= 6);
            }
        }
    }

    #[test]
    fn test_extend_updates_descendant_counts() {
        let data = random_data(80, 3, 11);
        let all = Vectors::new(3, &data);
        let mut tree = plan().build_tree(Vectors::new(3, &data[..40 * 3]), 0);

        let new_ids: Vec<PointId> = (40..80).collect();
        extend_tree(
            &mut tree,
            all,
            &new_ids,
            DistanceMetric::Euclidean,
            6,
            Kiss64Random::default(),
        );

        match &tree.nodes()[tree.root() as usize] {
            Node::Split { n_descendants, .. } => assert_eq!(*n_descendants, 80),
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_extend_single_leaf_tree() {
        let data = random_data(20, 2, 12);
        let all = Vectors::new(2, &data);
        let mut tree = plan().build_tree(Vectors::new(2, &data[..2 * 2]), 0);
        assert_eq!(tree.len(), 1);

        let new_ids: Vec<PointId> = (2..20).collect();
        extend_tree(
            &mut tree,
            all,
            &new_ids,
            DistanceMetric::Euclidean,
            6,
            Kiss64Random::default(),
        );

        let mut ids = tree.point_ids();
        ids.sort_unstable();
        assert_eq!(ids.len(), 20);
        assert!(tree.len() > 1);
    }
}
