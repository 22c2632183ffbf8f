// src/io/gfa.rs
//! GFA 1 subset used for the draft-assembly graph.
//!
//! `S` lines carry the contig sequence (or `*` when a companion FASTA
//! supplies it) and an optional `KC:i` k-mer count tag. `L` lines carry the
//! junction: a `<n>M` overlap maps to Distance `-n`, and an optional `dt:i`
//! tag overrides it with an explicit signed distance so positive gaps
//! survive a round-trip.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use crate::graph::contig_graph::{ContigGraph, ContigNode, Distance};

fn parse_orient(field: &str) -> Result<bool, String> {
    match field {
        "+" => Ok(false),
        "-" => Ok(true),
        other => Err(format!("invalid GFA orientation: {}", other)),
    }
}

fn parse_overlap(field: &str) -> Result<Distance, String> {
    if field == "*" {
        return Ok(0);
    }
    field
        .strip_suffix('M')
        .and_then(|n| n.parse::<i32>().ok())
        .map(|n| -n)
        .ok_or_else(|| format!("invalid GFA overlap: {}", field))
}

/// Load a bidirected contig graph from a GFA file.
///
/// `contigs` supplies sequences and k-mer counts for `S` lines that carry
/// `*` instead of a sequence.
pub fn load_graph(
    path: &str,
    contigs: Option<&HashMap<String, (String, f64)>>,
) -> Result<ContigGraph, String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path, e))?;
    let reader = BufReader::new(file);

    let mut graph = ContigGraph::new();
    let mut nodes: HashMap<String, ContigNode> = HashMap::new();
    let mut links: Vec<(String, bool, String, bool, Distance)> = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("{}: {}", path, e))?;
        let mut fields = line.split('\t');
        match fields.next() {
            Some("S") => {
                let name = fields
                    .next()
                    .ok_or_else(|| format!("{}:{}: S line without a name", path, lineno + 1))?
                    .to_string();
                let seq_field = fields
                    .next()
                    .ok_or_else(|| format!("{}:{}: S line without a sequence", path, lineno + 1))?;

                let mut kmer_count = None;
                for tag in fields {
                    if let Some(kc) = tag.strip_prefix("KC:i:") {
                        kmer_count = kc.parse::<f64>().ok();
                    }
                }

                let (seq, kc) = if seq_field == "*" {
                    let (seq, kc) = contigs
                        .and_then(|c| c.get(&name))
                        .ok_or_else(|| format!("no sequence for contig {}", name))?;
                    (seq.clone(), kmer_count.unwrap_or(*kc))
                } else {
                    (seq_field.to_string(), kmer_count.unwrap_or(0.0))
                };

                let node = graph.add_vertex_pair(&name, &seq, kc);
                nodes.insert(name, node);
            }
            Some("L") => {
                let from = fields
                    .next()
                    .ok_or_else(|| format!("{}:{}: truncated L line", path, lineno + 1))?
                    .to_string();
                let from_orient = parse_orient(fields.next().unwrap_or(""))?;
                let to = fields
                    .next()
                    .ok_or_else(|| format!("{}:{}: truncated L line", path, lineno + 1))?
                    .to_string();
                let to_orient = parse_orient(fields.next().unwrap_or(""))?;
                let mut distance = parse_overlap(fields.next().unwrap_or("*"))?;
                for tag in fields {
                    if let Some(d) = tag.strip_prefix("dt:i:") {
                        distance = d
                            .parse::<i32>()
                            .map_err(|_| format!("invalid dt tag: {}", tag))?;
                    }
                }
                links.push((from, from_orient, to, to_orient, distance));
            }
            _ => {}
        }
    }

    for (from, from_orient, to, to_orient, distance) in links {
        let u = *nodes
            .get(&from)
            .ok_or_else(|| format!("link references unknown contig {}", from))?;
        let v = *nodes
            .get(&to)
            .ok_or_else(|| format!("link references unknown contig {}", to))?;
        let u = if from_orient { u.twin() } else { u };
        let v = if to_orient { v.twin() } else { v };
        if !graph.has_edge(u, v) {
            graph.add_edge(u, v, distance);
        }
    }

    Ok(graph)
}

/// Serialize the graph back to GFA, one `S` line per live pair and one `L`
/// line per edge (twin mirrors elided).
pub fn write_graph(path: &str, graph: &ContigGraph) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "H\tVN:Z:1.0")?;

    for node in graph.nodes().filter(|n| !n.sense()) {
        if graph.is_removed(node) {
            continue;
        }
        writeln!(
            writer,
            "S\t{}\t{}\tKC:i:{}",
            graph.name(node),
            graph.seq(node),
            graph.kmer_count(node).round() as i64
        )?;
    }

    for u in graph.nodes() {
        if graph.is_removed(u) {
            continue;
        }
        for &(v, d) in graph.out_edges(u) {
            // Each edge and its twin mirror denote the same link; emit the
            // lexicographically smaller of the two.
            let mirror = (v.twin().index(), u.twin().index());
            if (u.index(), v.index()) > mirror {
                continue;
            }
            let overlap = if d < 0 { -d } else { 0 };
            write!(
                writer,
                "L\t{}\t{}\t{}\t{}\t{}M",
                graph.name(u),
                if u.sense() { '-' } else { '+' },
                graph.name(v),
                if v.sense() { '-' } else { '+' },
                overlap
            )?;
            if d >= 0 {
                write!(writer, "\tdt:i:{}", d)?;
            }
            writeln!(writer)?;
        }
    }
    writer.flush()
}
