//! Merges pairwise similarity matches into duplicate groups.
//!
//! Matches arrive as unordered pairs (or pre-grouped clusters) of canonical
//! file paths. They are folded into a disjoint-set and partitioned into
//! connected components. The output is deterministic for any permutation of
//! the input: members are sorted by path, components are sorted by their
//! smallest member, and singleton components are dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Disjoint-set over dense integer ids with union-by-size.
///
/// `find` is iterative with full path compression, so pathological union
/// chains cannot blow the stack.
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new() -> Self {
        Self {
            parent: Vec::new(),
            size: Vec::new(),
        }
    }

    fn make_set(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.size.push(1);
        id
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Second pass: point every node on the walked chain directly at the root.
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

impl Default for DisjointSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates matches and produces the final group partition.
#[derive(Default)]
pub struct ClusterBuilder {
    ids: HashMap<PathBuf, usize>,
    paths: Vec<PathBuf>,
    set: DisjointSet,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, path: &Path) -> usize {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = self.set.make_set();
        self.ids.insert(path.to_path_buf(), id);
        self.paths.push(path.to_path_buf());
        id
    }

    /// Record one pairwise match. Self-pairs are ignored; repeated pairs are
    /// idempotent.
    pub fn add_pair(&mut self, a: &Path, b: &Path) {
        if a == b {
            return;
        }
        let ia = self.intern(a);
        let ib = self.intern(b);
        self.set.union(ia, ib);
    }

    /// Record a pre-grouped cluster by chaining its members pairwise.
    pub fn add_group(&mut self, members: &[PathBuf]) {
        for window in members.windows(2) {
            self.add_pair(&window[0], &window[1]);
        }
    }

    /// Partition the matched universe into connected components of size >= 2.
    ///
    /// Members within a component are sorted by path and components are
    /// sorted by their first (smallest) member, so group ids assigned as
    /// 1..N over the returned order are stable across input permutations.
    pub fn into_groups(mut self) -> Vec<Vec<PathBuf>> {
        let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
        for id in 0..self.paths.len() {
            let root = self.set.find(id);
            components.entry(root).or_default().push(id);
        }

        let mut groups: Vec<Vec<PathBuf>> = components
            .into_values()
            .filter(|members| members.len() > 1)
            .map(|members| {
                let mut paths: Vec<PathBuf> = members
                    .into_iter()
                    .map(|id| self.paths[id].clone())
                    .collect();
                paths.sort();
                paths
            })
            .collect();
        groups.sort_by(|a, b| a[0].cmp(&b[0]));

        debug!(
            "clustered {} matched files into {} groups",
            self.paths.len(),
            groups.len()
        );
        groups
    }
}
