// src/io/paths.rs
//! Writers for the supported and unsupported traversal sets.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};

use crate::graph::contig_graph::{ContigGraph, ImaginaryContigPath};

/// Write one path per line as tab-separated `name±(distance)` entries,
/// distance 0 on the first entry.
pub fn write_paths(
    path: &str,
    paths: &BTreeSet<ImaginaryContigPath>,
    graph: &ContigGraph,
) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for p in paths {
        let line = p
            .iter()
            .map(|&(node, dist)| {
                format!(
                    "{}{}({})",
                    graph.name(node),
                    if node.sense() { '-' } else { '+' },
                    dist
                )
            })
            .collect::<Vec<_>>()
            .join("\t");
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_paths() {
        let mut g = ContigGraph::new();
        let a = g.add_vertex_pair("0", "ACGT", 1.0);
        let r = g.add_vertex_pair("1", "GG", 1.0);
        let b = g.add_vertex_pair("2", "TTAA", 1.0);

        let mut paths: BTreeSet<ImaginaryContigPath> = BTreeSet::new();
        paths.insert(vec![(a, 0), (r, -2), (b.twin(), 1)]);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("paths.tsv");
        write_paths(out.to_str().unwrap(), &paths, &g).unwrap();

        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "0+(0)\t1+(-2)\t2-(1)\n");
    }
}
