//! Single-linkage conflict grouping.
//!
//! Two recommendations land in the same group when a chain of pairwise
//! conflicts connects them. This can merge weakly related conflicts into one
//! large group; the result is still deterministic for a fixed input order.

use std::collections::BTreeMap;

use petgraph::unionfind::UnionFind;

/// Partition `0..n` into groups connected by `edges`.
///
/// Groups are ordered by their smallest member and members are ascending.
/// Indices without edges form singleton groups.
pub fn conflict_groups(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut sets = UnionFind::<usize>::new(n);
    for &(a, b) in edges {
        sets.union(a, b);
    }

    // slot of each representative, assigned in order of first member
    let mut slot_of: BTreeMap<usize, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, root) in sets.into_labeling().into_iter().enumerate() {
        let slot = *slot_of.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_edges_gives_singletons() {
        assert_eq!(conflict_groups(3, &[]), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_transitive_chain_merges() {
        // 0-2 and 2-3 connect 0, 2, 3 even though 0 and 3 never conflict directly
        let groups = conflict_groups(5, &[(2, 3), (0, 2)]);
        assert_eq!(groups, vec![vec![0, 2, 3], vec![1], vec![4]]);
    }

    #[test]
    fn test_edge_order_does_not_matter() {
        let a = conflict_groups(6, &[(4, 5), (1, 4), (0, 3)]);
        let b = conflict_groups(6, &[(0, 3), (1, 4), (4, 5)]);
        assert_eq!(a, b);
        assert_eq!(a, vec![vec![0, 3], vec![1, 4, 5], vec![2]]);
    }

    #[test]
    fn test_empty() {
        assert!(conflict_groups(0, &[]).is_empty());
    }

    #[test]
    fn test_repeated_and_self_edges() {
        let groups = conflict_groups(4, &[(1, 1), (3, 1), (1, 3), (3, 1)]);
        assert_eq!(groups, vec![vec![0], vec![1, 3], vec![2]]);
    }
}
