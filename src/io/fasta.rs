// src/io/fasta.rs
//! Contig FASTA input and output.
//!
//! Headers follow the assembler convention `>name length kmer_count`; the
//! k-mer count feeds the per-base coverage estimate used by the support
//! engine.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::graph::contig_graph::ContigGraph;

/// Open a FASTA file for reading, handling `.gz` transparently.
pub fn open_fasta(path: &str) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.ends_with(".gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read contigs into `name -> (sequence, kmer_count)`.
pub fn read_contigs(path: &str) -> io::Result<HashMap<String, (String, f64)>> {
    let reader = open_fasta(path)?;
    let mut contigs = HashMap::new();
    let mut name = String::new();
    let mut kmer_count = 0.0;
    let mut seq = String::new();

    for line in reader.lines() {
        let line = line?;
        if let Some(header) = line.strip_prefix('>') {
            if !name.is_empty() {
                contigs.insert(name.clone(), (std::mem::take(&mut seq), kmer_count));
            }
            let mut fields = header.split_ascii_whitespace();
            name = fields
                .next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty FASTA header"))?
                .to_string();
            // Fields after the name: length, then k-mer count.
            let _length = fields.next();
            kmer_count = fields
                .next()
                .and_then(|f| f.parse::<f64>().ok())
                .unwrap_or(0.0);
        } else {
            seq.push_str(line.trim_end());
        }
    }
    if !name.is_empty() {
        contigs.insert(name, (seq, kmer_count));
    }
    Ok(contigs)
}

/// Write every live contig pair once, forward orientation.
pub fn write_contigs(path: &str, graph: &ContigGraph) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer: Box<dyn Write> = if path.ends_with(".gz") {
        Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
    } else {
        Box::new(BufWriter::new(file))
    };

    for node in graph.nodes().filter(|n| !n.sense()) {
        if graph.is_removed(node) {
            continue;
        }
        let seq = graph.seq(node);
        writeln!(
            writer,
            ">{} {} {}",
            graph.name(node),
            seq.len(),
            graph.kmer_count(node)
        )?;
        writeln!(writer, "{}", seq)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_read_contigs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contigs.fa");
        {
            let mut f = File::create(&path).unwrap();
            writeln!(f, ">0 8 24").unwrap();
            writeln!(f, "ACGTACGT").unwrap();
            writeln!(f, ">1 4 7.5").unwrap();
            writeln!(f, "GGCC").unwrap();
        }

        let contigs = read_contigs(path.to_str().unwrap()).unwrap();
        assert_eq!(contigs.len(), 2);
        assert_eq!(contigs["0"], ("ACGTACGT".to_string(), 24.0));
        assert_eq!(contigs["1"], ("GGCC".to_string(), 7.5));
    }

    #[test]
    fn test_write_skips_removed() {
        let mut g = ContigGraph::new();
        g.add_vertex_pair("0", "ACGT", 5.0);
        let dead = g.add_vertex_pair("1", "TTTT", 5.0);
        g.remove_vertex(dead);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fa");
        write_contigs(path.to_str().unwrap(), &g).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(">0 4 5"));
        assert!(!contents.contains(">1"));
    }
}
