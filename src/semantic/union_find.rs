//! Disjoint sets over class runtime ids

/// Union-find with path compression
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        Self { parent: (0..size).collect() }
    }

    /// Find the representative of `x`
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`; false if they were already one set
    pub fn unite(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        self.parent[rb] = ra;
        true
    }

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unite_and_find() {
        let mut sets = UnionFind::new(6);
        assert!(sets.unite(1, 2));
        assert!(sets.unite(3, 4));
        assert!(!sets.same(2, 3));
        assert!(sets.unite(2, 4));
        assert!(sets.same(1, 3));
        assert!(!sets.unite(4, 1));
        assert_eq!(sets.find(5), 5);
    }
}
