// src/io/fastq.rs
//! Streaming short-read input, FASTQ or FASTA, optionally gzipped.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use flate2::read::MultiGzDecoder;

/// One sequencing read. `num` is the 0-based record index within its file.
#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub num: u64,
    pub seq: String,
    pub qual: String,
}

/// Open a read file, handling `.gz` transparently.
pub fn open_reads(path: &str) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.ends_with(".gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Stream records from a FASTQ or FASTA reader.
///
/// The format is sniffed from the first header byte (`@` FASTQ, `>` FASTA).
/// Records are processed one at a time so arbitrarily large files stay in
/// bounded memory.
pub fn stream_reads<R: BufRead>(reader: R) -> ReadStream<R> {
    ReadStream {
        lines: reader.lines(),
        pending_header: None,
        num: 0,
    }
}

pub struct ReadStream<R: BufRead> {
    lines: io::Lines<R>,
    pending_header: Option<String>,
    num: u64,
}

impl<R: BufRead> Iterator for ReadStream<R> {
    type Item = ReadRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                match self.lines.next() {
                    Some(Ok(line)) if line.is_empty() => continue,
                    Some(Ok(line)) => break line,
                    _ => return None,
                }
            },
        };

        if header.starts_with('@') {
            let seq = match self.lines.next() {
                Some(Ok(line)) => line,
                _ => return None,
            };
            // Plus line, then quality.
            match self.lines.next() {
                Some(Ok(_)) => {}
                _ => return None,
            }
            let qual = match self.lines.next() {
                Some(Ok(line)) => line,
                _ => return None,
            };
            let num = self.num;
            self.num += 1;
            Some(ReadRecord { num, seq, qual })
        } else if header.starts_with('>') {
            // FASTA: accumulate sequence lines until the next header.
            let mut seq = String::new();
            loop {
                match self.lines.next() {
                    Some(Ok(line)) => {
                        if line.starts_with('>') {
                            self.pending_header = Some(line);
                            break;
                        }
                        seq.push_str(line.trim_end());
                    }
                    _ => break,
                }
            }
            let num = self.num;
            self.num += 1;
            Some(ReadRecord {
                num,
                seq,
                qual: String::new(),
            })
        } else {
            None
        }
    }
}
