// src/fasta.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{Result, TaxconsError};
use crate::types::SequenceRecord;

/// Upper-cases all sites, folds the `.` gap glyph into `-` and `U` into `T`.
pub fn normalize_sites(sites: &mut [u8]) {
    for c in sites.iter_mut() {
        *c = match c.to_ascii_uppercase() {
            b'.' => b'-',
            b'U' => b'T',
            other => other,
        };
    }
}

/// Streaming FASTA reader that also supports .gz
///
/// Records are produced one at a time, so an alignment with hundreds of
/// thousands of sequences never has to be held in memory.
pub struct FastaReader {
    reader: Box<dyn BufRead>,
    line: String,
    line_no: usize,
    /// Header of the record whose sequence lines are being read next
    pending_header: Option<String>,
    done: bool,
}

impl FastaReader {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path)?;

        // If the file ends with ".gz", wrap it in a MultiGzDecoder
        let is_gz = path
            .extension()
            .map(|ext| ext == "gz")
            .unwrap_or(false);

        let reader: Box<dyn BufRead> = if is_gz {
            Box::new(BufReader::new(MultiGzDecoder::new(f)))
        } else {
            Box::new(BufReader::new(f))
        };
        Ok(Self::new(reader))
    }

    pub fn new(reader: Box<dyn BufRead>) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            pending_header: None,
            done: false,
        }
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line)?;
        if n > 0 {
            self.line_no += 1;
        }
        Ok(n > 0)
    }

    fn next_record(&mut self) -> Result<Option<SequenceRecord>> {
        // 1) find the header, skipping blank lines before the first record
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                if !self.read_line()? {
                    return Ok(None);
                }
                let trimmed = self.line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                match trimmed.strip_prefix('>') {
                    Some(h) => break h.to_string(),
                    None => {
                        return Err(TaxconsError::FastaFormat {
                            line: self.line_no,
                            reason: "sequence data before the first header".to_string(),
                        })
                    }
                }
            },
        };

        // 2) collect sequence lines up to the next header or EOF
        let mut sites = Vec::new();
        while self.read_line()? {
            let trimmed = self.line.trim_end();
            if let Some(next) = trimmed.strip_prefix('>') {
                self.pending_header = Some(next.to_string());
                break;
            }
            sites.extend(trimmed.bytes().filter(|c| !c.is_ascii_whitespace()));
        }
        normalize_sites(&mut sites);

        // 3) split the header into label and metadata
        let (label, metadata) = match header.find([' ', '\t']) {
            Some(delim) => {
                let meta = header[delim + 1..].trim();
                (
                    header[..delim].to_string(),
                    (!meta.is_empty()).then(|| meta.to_string()),
                )
            }
            None => (header.trim().to_string(), None),
        };

        Ok(Some(SequenceRecord::new(label, metadata, sites)))
    }
}

impl Iterator for FastaReader {
    type Item = Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
