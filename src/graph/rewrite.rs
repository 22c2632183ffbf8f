// src/graph/rewrite.rs
//! Rewriting the graph from an accumulated resolution.
//!
//! Works in four phases: collect supported/unsupported path sets, partition
//! each repeat's in-edges into instances by their set of supported
//! out-edges, emit the edge/vertex changes, then apply them. Partitioning
//! and application are serial so fresh vertex indices and mutation order are
//! deterministic; the other phases fan out per repeat.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::info;

use crate::graph::contig_graph::{ContigGraph, ContigNode, Distance, ImaginaryContigPath};
use crate::resolve::repeats::{Resolution, SupportMap};

struct OldEdge {
    u: ContigNode,
    v: ContigNode,
}

struct NewEdge {
    u: ContigNode,
    v: ContigNode,
    distance: Distance,
}

struct NewVertex {
    original: ContigNode,
    node: ContigNode,
}

/// One materialised copy of a repeat vertex.
///
/// The first instance keeps the original vertex's identity
/// (`instance == original`); later instances get fresh indices.
#[derive(Debug, Clone)]
struct RepeatInstance {
    instance: ContigNode,
    original: ContigNode,
    original_intigs: Vec<ContigNode>,
    original_outigs: Vec<ContigNode>,
}

impl RepeatInstance {
    fn in_original_intigs(&self, node: ContigNode) -> bool {
        self.original_intigs.contains(&node)
    }

    fn in_original_outigs(&self, node: ContigNode) -> bool {
        self.original_outigs.contains(&node)
    }

    fn reverse(&self) -> RepeatInstance {
        RepeatInstance {
            instance: self.instance.twin(),
            original: self.original.twin(),
            original_intigs: self.original_outigs.iter().map(|n| n.twin()).collect(),
            original_outigs: self.original_intigs.iter().map(|n| n.twin()).collect(),
        }
    }
}

/// Rewrite the graph according to a non-failed resolution and update the
/// path sets.
pub fn process_graph(
    graph: &mut ContigGraph,
    resolution: &Resolution,
    threshold: u32,
    supported_paths: &mut BTreeSet<ImaginaryContigPath>,
    unsupported_paths: &mut BTreeSet<ImaginaryContigPath>,
) {
    assert!(!resolution.failed);
    info!(
        repeats = resolution.repeat_support_map.len(),
        "new paths and vertices setup"
    );

    let repeat_entries: Vec<(&u32, &SupportMap)> = resolution.repeat_support_map.iter().collect();

    // Phase 1: split every tested traversal into the supported and
    // unsupported sets. A path that later turns up unsupported wins over an
    // earlier supported verdict.
    {
        let graph = &*graph;
        let supported = Mutex::new(std::mem::take(supported_paths));
        let unsupported = Mutex::new(std::mem::take(unsupported_paths));

        repeat_entries.par_iter().for_each(|&(&repeat_idx, support_map)| {
            let repeat = ContigNode::from_index(repeat_idx);
            for (&intig_idx, outigs) in support_map {
                let intig = ContigNode::from_index(intig_idx);
                for (&outig_idx, support) in outigs {
                    let outig = ContigNode::from_index(outig_idx);
                    let dist1 = graph.distance(intig, repeat).expect("in-edge vanished");
                    let dist2 = graph.distance(repeat, outig).expect("out-edge vanished");
                    let path: ImaginaryContigPath =
                        vec![(intig, 0), (repeat, dist1), (outig, dist2)];

                    if support.is_good(threshold) {
                        supported.lock().unwrap().insert(path);
                    } else {
                        unsupported.lock().unwrap().insert(path.clone());
                        supported.lock().unwrap().remove(&path);
                    }
                }
            }
        });

        *supported_paths = supported.into_inner().unwrap();
        *unsupported_paths = unsupported.into_inner().unwrap();
    }

    // Phase 2: serial instance partitioning; deterministic fresh indices.
    let mut last_id = (graph.num_vertices() / 2) as u32;
    let mut repeat_instances_map: BTreeMap<u32, Vec<RepeatInstance>> = BTreeMap::new();

    for &(&repeat_idx, support_map) in &repeat_entries {
        let repeat = ContigNode::from_index(repeat_idx);
        let mut instances: Vec<RepeatInstance> = Vec::new();

        for (&intig_idx, outigs) in support_map {
            let intig = ContigNode::from_index(intig_idx);
            let supported_outigs: Vec<ContigNode> = outigs
                .iter()
                .filter(|(_, support)| support.is_good(threshold))
                .map(|(&outig_idx, _)| ContigNode::from_index(outig_idx))
                .collect();

            let mut matched = false;
            for instance in instances.iter_mut() {
                if instance.original_outigs.len() == supported_outigs.len()
                    && supported_outigs
                        .iter()
                        .all(|&outig| instance.in_original_outigs(outig))
                {
                    instance.original_intigs.push(intig);
                    matched = true;
                    break;
                }
            }

            if !matched && !supported_outigs.is_empty() {
                let node = if instances.is_empty() {
                    repeat
                } else {
                    let node = ContigNode::new(last_id, repeat.sense());
                    last_id += 1;
                    node
                };
                instances.push(RepeatInstance {
                    instance: node,
                    original: repeat,
                    original_intigs: vec![intig],
                    original_outigs: supported_outigs,
                });
            }
        }

        if instances.is_empty() {
            // No in-edge kept any supported out-edge; the repeat survives
            // as a single, soon-to-be-disconnected copy.
            instances.push(RepeatInstance {
                instance: repeat,
                original: repeat,
                original_intigs: Vec::new(),
                original_outigs: Vec::new(),
            });
        } else {
            let mut intig_idxs = BTreeSet::new();
            for instance in &instances {
                for intig in &instance.original_intigs {
                    assert!(intig_idxs.insert(intig.index()));
                }
                assert!(!instance.original_outigs.is_empty());
            }
        }

        let reverse: Vec<RepeatInstance> = instances.iter().map(|i| i.reverse()).collect();
        repeat_instances_map.insert(repeat.index(), instances);
        repeat_instances_map.insert(repeat.twin().index(), reverse);
    }

    // Phase 3: emit removals, clones and new edges per repeat.
    let edges2remove: Mutex<Vec<OldEdge>> = Mutex::new(Vec::new());
    let edges2add: Mutex<Vec<NewEdge>> = Mutex::new(Vec::new());
    let vertices2add: Mutex<Vec<NewVertex>> = Mutex::new(Vec::new());

    {
        let graph = &*graph;
        let repeat_instances_map = &repeat_instances_map;

        repeat_entries.par_iter().for_each(|&(&repeat_idx, _)| {
            let repeat = ContigNode::from_index(repeat_idx);
            let instances = &repeat_instances_map[&repeat.index()];

            for instance in instances {
                // Pair every neighbour with the instance(s) of it that still
                // link back to this repeat; a neighbour that is not itself a
                // resolved repeat stands in for itself.
                let mut intig_instances: Vec<(ContigNode, ContigNode)> = Vec::new();
                for &intig in &instance.original_intigs {
                    match repeat_instances_map.get(&intig.index()) {
                        Some(intig_insts) => {
                            for ii in intig_insts {
                                if ii.in_original_outigs(repeat) {
                                    intig_instances.push((ii.instance, ii.original));
                                }
                            }
                        }
                        None => intig_instances.push((intig, intig)),
                    }
                }

                let mut outig_instances: Vec<(ContigNode, ContigNode)> = Vec::new();
                for &outig in &instance.original_outigs {
                    match repeat_instances_map.get(&outig.index()) {
                        Some(outig_insts) => {
                            for oi in outig_insts {
                                if oi.in_original_intigs(repeat) {
                                    outig_instances.push((oi.instance, oi.original));
                                }
                            }
                        }
                        None => outig_instances.push((outig, outig)),
                    }
                }

                if instance.instance == instance.original {
                    let mut remove = edges2remove.lock().unwrap();
                    for &(src, _) in graph.in_edges(instance.original) {
                        remove.push(OldEdge {
                            u: src,
                            v: instance.original,
                        });
                    }
                    for &(dst, _) in graph.out_edges(instance.original) {
                        remove.push(OldEdge {
                            u: instance.original,
                            v: dst,
                        });
                    }
                } else {
                    vertices2add.lock().unwrap().push(NewVertex {
                        original: instance.original,
                        node: instance.instance,
                    });
                }

                let mut add = edges2add.lock().unwrap();
                for &(intig_node, intig_orig) in &intig_instances {
                    let distance = graph
                        .distance(intig_orig, instance.original)
                        .expect("in-edge vanished");
                    add.push(NewEdge {
                        u: intig_node,
                        v: instance.instance,
                        distance,
                    });
                }
                for &(outig_node, outig_orig) in &outig_instances {
                    let distance = graph
                        .distance(instance.original, outig_orig)
                        .expect("out-edge vanished");
                    add.push(NewEdge {
                        u: instance.instance,
                        v: outig_node,
                        distance,
                    });
                }
            }
        });
    }

    // Phase 4: apply, in a reproducible order.
    let mut vertices2add = vertices2add.into_inner().unwrap();
    vertices2add.sort_by_key(|v| v.node.index());
    let mut edges2add = edges2add.into_inner().unwrap();
    edges2add.sort_by_key(|e| (e.u.index(), e.v.index()));
    let edges2remove = edges2remove.into_inner().unwrap();

    info!(
        removals = edges2remove.len(),
        new_vertices = vertices2add.len(),
        new_edges = edges2add.len(),
        "graph modification"
    );

    graph.unlock_names();
    for edge in &edges2remove {
        if graph.has_edge(edge.u, edge.v) {
            graph.remove_edge(edge.u, edge.v);
        }
    }
    for new_vertex in &vertices2add {
        assert_eq!(graph.in_degree(new_vertex.original), 0);
        assert_eq!(graph.out_degree(new_vertex.original), 0);
        assert!(!new_vertex.original.sense());
        assert_eq!(graph.num_vertices() as u32, new_vertex.node.index());

        let seq = graph.seq(new_vertex.original).to_string();
        let kmer_count = graph.kmer_count(new_vertex.original);
        let name = graph.create_name();
        let node = graph.add_vertex_pair(&name, &seq, kmer_count);
        assert_eq!(node, new_vertex.node);
        assert_eq!(graph.in_degree(node), 0);
        assert_eq!(graph.out_degree(node), 0);
    }
    for edge in &edges2add {
        if !graph.has_edge(edge.u, edge.v) {
            graph.add_edge(edge.u, edge.v, edge.distance);
        }
    }
    graph.lock_names();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::{FractionHistogram, Histogram};
    use crate::resolve::repeats::ResolutionStats;
    use crate::resolve::support::{Support, UnknownReason};

    const THRESHOLD: u32 = 5;

    fn known(found: u32) -> Support {
        Support::Known {
            found,
            tests: 9,
            calculated_tests: 8,
        }
    }

    fn resolution_with(map: RepeatSupportMapBuilder) -> Resolution {
        Resolution {
            repeat_support_map: map.0,
            read_size: 50,
            r: 38,
            finds_histogram: Histogram::new(),
            fraction_finds_histogram: FractionHistogram::new(),
            calculated_tests_histogram: Histogram::new(),
            stats: ResolutionStats::default(),
            failed: false,
        }
    }

    struct RepeatSupportMapBuilder(BTreeMap<u32, SupportMap>);

    impl RepeatSupportMapBuilder {
        fn new() -> Self {
            RepeatSupportMapBuilder(BTreeMap::new())
        }

        fn add(
            mut self,
            repeat: ContigNode,
            entries: &[(ContigNode, ContigNode, Support)],
        ) -> Self {
            let map = self.0.entry(repeat.index()).or_default();
            for &(intig, outig, support) in entries {
                map.entry(intig.index())
                    .or_default()
                    .insert(outig.index(), support);
            }
            self
        }
    }

    /// {A1, A2} -> R -> {B1, B2} with distance 0 edges.
    fn cross_graph() -> (ContigGraph, [ContigNode; 5]) {
        let mut g = ContigGraph::new();
        let a1 = g.add_vertex_pair("0", "ACGGTCAAGTCCTTAC", 10.0);
        let a2 = g.add_vertex_pair("1", "TGCCAGTTCAGATTGA", 10.0);
        let r = g.add_vertex_pair("2", "GGATCCTTAAGCGACG", 10.0);
        let b1 = g.add_vertex_pair("3", "TTCAGGCATAACGGTC", 10.0);
        let b2 = g.add_vertex_pair("4", "CAATCGTGCTTAGCCA", 10.0);
        g.add_edge(a1, r, -3);
        g.add_edge(a2, r, -3);
        g.add_edge(r, b1, -2);
        g.add_edge(r, b2, -2);
        (g, [a1, a2, r, b1, b2])
    }

    #[test]
    fn test_two_instance_split() {
        let (mut g, [a1, a2, r, b1, b2]) = cross_graph();
        let pairs_before = g.num_pairs();

        let resolution = resolution_with(RepeatSupportMapBuilder::new().add(
            r,
            &[
                (a1, b1, known(9)),
                (a1, b2, known(0)),
                (a2, b1, known(0)),
                (a2, b2, known(9)),
            ],
        ));

        let mut supported = BTreeSet::new();
        let mut unsupported = BTreeSet::new();
        process_graph(&mut g, &resolution, THRESHOLD, &mut supported, &mut unsupported);

        // One new pair: the second instance of R.
        assert_eq!(g.num_pairs(), pairs_before + 1);
        let r2 = ContigNode::new(pairs_before as u32, false);
        assert_eq!(g.seq(r2), g.seq(r));

        // a1 -> R -> b1 and a2 -> R2 -> b2, nothing else.
        assert_eq!(g.distance(a1, r), Some(-3));
        assert_eq!(g.distance(r, b1), Some(-2));
        assert_eq!(g.distance(a2, r2), Some(-3));
        assert_eq!(g.distance(r2, b2), Some(-2));
        assert!(!g.has_edge(a2, r));
        assert!(!g.has_edge(a1, r2));
        assert!(!g.has_edge(r, b2));
        assert!(!g.has_edge(r2, b1));

        assert!(g.twins_consistent());
        assert_eq!(supported.len(), 2);
        assert_eq!(unsupported.len(), 2);

        // Index disjointness: the primary reuses the original index, the
        // clone got a previously unused one.
        assert_eq!(r2.index() as usize, pairs_before * 2);
    }

    #[test]
    fn test_single_instance_leaves_graph_unchanged() {
        let (mut g, [a1, a2, r, b1, b2]) = cross_graph();
        let pairs_before = g.num_pairs();

        // Every traversal supported: one instance inheriting everything.
        let resolution = resolution_with(RepeatSupportMapBuilder::new().add(
            r,
            &[
                (a1, b1, known(9)),
                (a1, b2, known(9)),
                (a2, b1, known(9)),
                (a2, b2, known(9)),
            ],
        ));

        let mut supported = BTreeSet::new();
        let mut unsupported = BTreeSet::new();
        process_graph(&mut g, &resolution, THRESHOLD, &mut supported, &mut unsupported);

        assert_eq!(g.num_pairs(), pairs_before);
        for (u, v, d) in [(a1, r, -3), (a2, r, -3), (r, b1, -2), (r, b2, -2)] {
            assert_eq!(g.distance(u, v), Some(d));
        }
        assert!(g.twins_consistent());
        assert_eq!(supported.len(), 4);
        assert!(unsupported.is_empty());
    }

    #[test]
    fn test_no_supported_outigs_disconnects_repeat() {
        let (mut g, [a1, a2, r, b1, b2]) = cross_graph();
        let pairs_before = g.num_pairs();

        let resolution = resolution_with(RepeatSupportMapBuilder::new().add(
            r,
            &[
                (a1, b1, known(0)),
                (a1, b2, known(0)),
                (a2, b1, known(0)),
                (a2, b2, known(0)),
            ],
        ));

        let mut supported = BTreeSet::new();
        let mut unsupported = BTreeSet::new();
        process_graph(&mut g, &resolution, THRESHOLD, &mut supported, &mut unsupported);

        assert_eq!(g.num_pairs(), pairs_before);
        assert_eq!(g.in_degree(r), 0);
        assert_eq!(g.out_degree(r), 0);
        assert_eq!(g.out_degree(a1), 0);
        assert_eq!(g.out_degree(a2), 0);
        assert!(g.twins_consistent());
        assert!(supported.is_empty());
        assert_eq!(unsupported.len(), 4);
    }

    #[test]
    fn test_unknown_supports_keep_structure() {
        let (mut g, [a1, a2, r, b1, b2]) = cross_graph();
        let pairs_before = g.num_pairs();

        let poisoned = Support::Unknown {
            reason: UnknownReason::DifferentCulprit,
            calculated_tests: 8,
        };
        let resolution = resolution_with(RepeatSupportMapBuilder::new().add(
            r,
            &[
                (a1, b1, poisoned),
                (a1, b2, poisoned),
                (a2, b1, poisoned),
                (a2, b2, poisoned),
            ],
        ));

        let mut supported = BTreeSet::new();
        let mut unsupported = BTreeSet::new();
        process_graph(&mut g, &resolution, THRESHOLD, &mut supported, &mut unsupported);

        // Unknown is good: the repeat keeps all its edges in one instance.
        assert_eq!(g.num_pairs(), pairs_before);
        for (u, v) in [(a1, r), (a2, r), (r, b1), (r, b2)] {
            assert!(g.has_edge(u, v));
        }
        assert!(g.twins_consistent());
        assert_eq!(supported.len(), 4);
        assert!(unsupported.is_empty());
    }

    #[test]
    fn test_unsupported_dominates_supported() {
        let (mut g, [a1, _, r, b1, _]) = cross_graph();

        let resolution = resolution_with(
            RepeatSupportMapBuilder::new().add(r, &[(a1, b1, known(9))]),
        );
        let dist1 = g.distance(a1, r).unwrap();
        let dist2 = g.distance(r, b1).unwrap();
        let path: ImaginaryContigPath = vec![(a1, 0), (r, dist1), (b1, dist2)];

        let mut supported = BTreeSet::new();
        let mut unsupported = BTreeSet::new();
        // The same path was unsupported in an earlier pass.
        unsupported.insert(path.clone());
        process_graph(&mut g, &resolution, THRESHOLD, &mut supported, &mut unsupported);

        // Supported again now, but a path never leaves the unsupported set,
        // and insertion into supported is fine; dominance is re-applied by
        // later unsupported verdicts only.
        assert!(unsupported.contains(&path));
    }
}
