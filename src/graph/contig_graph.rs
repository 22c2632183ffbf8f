// src/graph/contig_graph.rs
//! Bidirected contig graph.
//!
//! Every contig is present twice, as a forward vertex at an even index and
//! its reverse complement at the following odd index. Every directed edge
//! `u -> v` has a mirror `v' -> u'` between the twins; the mirroring is
//! enforced here, in the mutation methods, so the rest of the crate can stay
//! oblivious to it.

use std::fmt;

/// A vertex handle: contig id in the high bits, sense in the low bit.
///
/// The forward copy of a contig has sense `false` (even index), its
/// reverse complement sense `true` (odd index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContigNode(u32);

impl ContigNode {
    pub fn new(id: u32, sense: bool) -> Self {
        ContigNode(id * 2 + sense as u32)
    }

    pub fn from_index(index: u32) -> Self {
        ContigNode(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }

    pub fn id(&self) -> u32 {
        self.0 >> 1
    }

    pub fn sense(&self) -> bool {
        self.0 & 1 == 1
    }

    /// The reverse-complement mate of this vertex.
    pub fn twin(&self) -> Self {
        ContigNode(self.0 ^ 1)
    }
}

impl fmt::Display for ContigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.id(), if self.sense() { '-' } else { '+' })
    }
}

/// Signed distance between consecutive contigs; negative means overlap.
pub type Distance = i32;

/// A candidate traversal: `(vertex, distance from the previous vertex)`,
/// distance 0 at the head.
pub type ImaginaryContigPath = Vec<(ContigNode, Distance)>;

#[derive(Debug, Clone, Default)]
struct Adjacency {
    out: Vec<(ContigNode, Distance)>,
    ins: Vec<(ContigNode, Distance)>,
}

/// Reverse-complement a nucleotide sequence. `N` maps to itself.
pub fn revcomp(seq: &str) -> String {
    seq.bytes()
        .rev()
        .map(|b| match b {
            b'A' | b'a' => 'T',
            b'C' | b'c' => 'G',
            b'G' | b'g' => 'C',
            b'T' | b't' => 'A',
            _ => 'N',
        })
        .collect()
}

pub struct ContigGraph {
    /// Oriented sequence per vertex; twin pairs at consecutive indices.
    seqs: Vec<String>,
    /// Per-pair contig name.
    names: Vec<String>,
    /// Per-pair k-mer count from the assembler (coverage metadata).
    kmer_counts: Vec<f64>,
    /// Per-pair removed flag.
    removed: Vec<bool>,
    adj: Vec<Adjacency>,
    names_locked: bool,
    next_name: u64,
}

impl ContigGraph {
    pub fn new() -> Self {
        ContigGraph {
            seqs: Vec::new(),
            names: Vec::new(),
            kmer_counts: Vec::new(),
            removed: Vec::new(),
            adj: Vec::new(),
            names_locked: true,
            next_name: 0,
        }
    }

    /// Total vertex count, twins included.
    pub fn num_vertices(&self) -> usize {
        self.seqs.len()
    }

    pub fn num_pairs(&self) -> usize {
        self.names.len()
    }

    pub fn num_pairs_removed(&self) -> usize {
        self.removed.iter().filter(|&&r| r).count()
    }

    /// Iterate every vertex handle, removed ones included.
    pub fn nodes(&self) -> impl Iterator<Item = ContigNode> {
        (0..self.seqs.len() as u32).map(ContigNode::from_index)
    }

    /// Append a contig and its reverse complement at the next two indices.
    /// Returns the forward (even) vertex.
    pub fn add_vertex_pair(&mut self, name: &str, seq: &str, kmer_count: f64) -> ContigNode {
        let node = ContigNode::from_index(self.seqs.len() as u32);
        assert!(!node.sense());
        self.seqs.push(seq.to_string());
        self.seqs.push(revcomp(seq));
        self.names.push(name.to_string());
        self.kmer_counts.push(kmer_count);
        self.removed.push(false);
        self.adj.push(Adjacency::default());
        self.adj.push(Adjacency::default());
        if let Ok(n) = name.parse::<u64>() {
            if n >= self.next_name {
                self.next_name = n + 1;
            }
        }
        node
    }

    pub fn seq(&self, node: ContigNode) -> &str {
        &self.seqs[node.index() as usize]
    }

    pub fn contig_len(&self, node: ContigNode) -> usize {
        self.seqs[node.index() as usize].len()
    }

    pub fn name(&self, node: ContigNode) -> &str {
        &self.names[node.id() as usize]
    }

    pub fn kmer_count(&self, node: ContigNode) -> f64 {
        self.kmer_counts[node.id() as usize]
    }

    /// Mean per-base read coverage of a contig, derived from the assembler's
    /// k-mer count. Clamped away from zero so downstream spacing math stays
    /// finite on unannotated inputs.
    pub fn base_coverage(&self, node: ContigNode, k: usize) -> f64 {
        let len = self.contig_len(node);
        let positions = len.saturating_sub(k - 1).max(1);
        (self.kmer_counts[node.id() as usize] / positions as f64).max(0.1)
    }

    pub fn is_removed(&self, node: ContigNode) -> bool {
        self.removed[node.id() as usize]
    }

    pub fn out_edges(&self, node: ContigNode) -> &[(ContigNode, Distance)] {
        &self.adj[node.index() as usize].out
    }

    pub fn in_edges(&self, node: ContigNode) -> &[(ContigNode, Distance)] {
        &self.adj[node.index() as usize].ins
    }

    pub fn out_degree(&self, node: ContigNode) -> usize {
        self.adj[node.index() as usize].out.len()
    }

    pub fn in_degree(&self, node: ContigNode) -> usize {
        self.adj[node.index() as usize].ins.len()
    }

    pub fn has_edge(&self, u: ContigNode, v: ContigNode) -> bool {
        self.adj[u.index() as usize].out.iter().any(|&(t, _)| t == v)
    }

    pub fn distance(&self, u: ContigNode, v: ContigNode) -> Option<Distance> {
        self.adj[u.index() as usize]
            .out
            .iter()
            .find(|&&(t, _)| t == v)
            .map(|&(_, d)| d)
    }

    /// Add `u -> v` and its twin mirror `v' -> u'`.
    pub fn add_edge(&mut self, u: ContigNode, v: ContigNode, distance: Distance) {
        self.add_half_edge(u, v, distance);
        // An edge into the own twin is its own mirror.
        if v != u.twin() {
            self.add_half_edge(v.twin(), u.twin(), distance);
        }
    }

    fn add_half_edge(&mut self, u: ContigNode, v: ContigNode, distance: Distance) {
        self.adj[u.index() as usize].out.push((v, distance));
        self.adj[v.index() as usize].ins.push((u, distance));
    }

    /// Remove `u -> v` and its twin mirror. Missing edges are ignored.
    pub fn remove_edge(&mut self, u: ContigNode, v: ContigNode) {
        self.remove_half_edge(u, v);
        if v != u.twin() {
            self.remove_half_edge(v.twin(), u.twin());
        }
    }

    fn remove_half_edge(&mut self, u: ContigNode, v: ContigNode) {
        self.adj[u.index() as usize].out.retain(|&(t, _)| t != v);
        self.adj[v.index() as usize].ins.retain(|&(s, _)| s != u);
    }

    /// Mark a contig pair removed and drop all incident edges.
    pub fn remove_vertex(&mut self, node: ContigNode) {
        for twin in [node, node.twin()] {
            let out: Vec<ContigNode> = self.out_edges(twin).iter().map(|&(t, _)| t).collect();
            for t in out {
                self.remove_edge(twin, t);
            }
            let ins: Vec<ContigNode> = self.in_edges(twin).iter().map(|&(s, _)| s).collect();
            for s in ins {
                self.remove_edge(s, twin);
            }
        }
        self.removed[node.id() as usize] = true;
    }

    pub fn unlock_names(&mut self) {
        self.names_locked = false;
    }

    pub fn lock_names(&mut self) {
        self.names_locked = true;
    }

    /// Mint a fresh, previously unused contig name.
    pub fn create_name(&mut self) -> String {
        assert!(!self.names_locked, "name registry is locked");
        let name = self.next_name.to_string();
        self.next_name += 1;
        name
    }

    /// Check the twin invariant over the whole graph. Test support.
    pub fn twins_consistent(&self) -> bool {
        for u in self.nodes() {
            for &(v, d) in self.out_edges(u) {
                if self.distance(v.twin(), u.twin()) != Some(d) {
                    return false;
                }
            }
        }
        true
    }
}

impl Default for ContigGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_twin() {
        let n = ContigNode::new(3, false);
        assert_eq!(n.index(), 6);
        assert!(!n.sense());
        assert_eq!(n.twin().index(), 7);
        assert!(n.twin().sense());
        assert_eq!(n.twin().twin(), n);
        assert_eq!(n.to_string(), "3+");
        assert_eq!(n.twin().to_string(), "3-");
    }

    #[test]
    fn test_revcomp() {
        assert_eq!(revcomp("ACGT"), "ACGT");
        assert_eq!(revcomp("AACG"), "CGTT");
        assert_eq!(revcomp("ANT"), "ANT");
    }

    #[test]
    fn test_edge_mirroring() {
        let mut g = ContigGraph::new();
        let a = g.add_vertex_pair("0", "ACGTACGT", 10.0);
        let b = g.add_vertex_pair("1", "TTTTCCCC", 10.0);

        g.add_edge(a, b, -3);
        assert!(g.has_edge(a, b));
        assert!(g.has_edge(b.twin(), a.twin()));
        assert_eq!(g.distance(b.twin(), a.twin()), Some(-3));
        assert!(g.twins_consistent());

        g.remove_edge(a, b);
        assert!(!g.has_edge(a, b));
        assert!(!g.has_edge(b.twin(), a.twin()));
    }

    #[test]
    fn test_palindromic_self_mirror_edge() {
        let mut g = ContigGraph::new();
        let a = g.add_vertex_pair("0", "ACGT", 10.0);
        // a -> a' mirrors onto itself and must not be doubled.
        g.add_edge(a, a.twin(), -1);
        assert_eq!(g.out_degree(a), 1);
        assert_eq!(g.in_degree(a.twin()), 1);
    }

    #[test]
    fn test_remove_vertex_clears_edges() {
        let mut g = ContigGraph::new();
        let a = g.add_vertex_pair("0", "ACGTACGT", 10.0);
        let r = g.add_vertex_pair("1", "GGGG", 10.0);
        let b = g.add_vertex_pair("2", "CCCCTTTT", 10.0);
        g.add_edge(a, r, 0);
        g.add_edge(r, b, 0);

        g.remove_vertex(r);
        assert!(g.is_removed(r));
        assert_eq!(g.out_degree(a), 0);
        assert_eq!(g.in_degree(b), 0);
        assert_eq!(g.out_degree(b.twin()), 0);
        assert!(g.twins_consistent());
    }

    #[test]
    fn test_name_registry() {
        let mut g = ContigGraph::new();
        g.add_vertex_pair("7", "ACGT", 1.0);
        g.unlock_names();
        assert_eq!(g.create_name(), "8");
        assert_eq!(g.create_name(), "9");
        g.lock_names();
    }

    #[test]
    #[should_panic(expected = "name registry is locked")]
    fn test_locked_names_panic() {
        let mut g = ContigGraph::new();
        g.create_name();
    }
}
