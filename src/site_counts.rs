// src/site_counts.rs

use crate::error::{Result, TaxconsError};

/// Marks a byte that is not part of the alphabet.
const NOT_IN_ALPHABET: u8 = u8::MAX;

/// Per-site character frequencies over a fixed alphabet and a fixed number of sites.
///
/// The table is stored site-major: the counts of site `s` live in
/// `counts[s * alphabet_len .. (s + 1) * alphabet_len]`, in alphabet order.
/// Characters outside the alphabet (gaps, `N`, ...) carry no information and are
/// not counted, but the sequence still counts towards `added_sequences`.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteCounts {
    characters: Vec<u8>,
    lookup: [u8; 256],
    length: usize,
    counts: Vec<u32>,
    added_sequences: u64,
}

impl SiteCounts {
    /// Creates an empty matrix for `alphabet` (case-insensitive, e.g. `"ACGT"`) and `length` sites.
    pub fn new(alphabet: &str, length: usize) -> Result<Self> {
        if alphabet.is_empty() {
            return Err(TaxconsError::InvalidAlphabet("alphabet is empty".to_string()));
        }

        let characters: Vec<u8> = alphabet.bytes().map(|c| c.to_ascii_uppercase()).collect();
        let mut lookup = [NOT_IN_ALPHABET; 256];
        for (idx, &c) in characters.iter().enumerate() {
            if !c.is_ascii_alphabetic() {
                return Err(TaxconsError::InvalidAlphabet(format!(
                    "`{}` is not a letter",
                    c as char
                )));
            }
            if lookup[c as usize] != NOT_IN_ALPHABET {
                return Err(TaxconsError::InvalidAlphabet(format!(
                    "`{}` appears twice in `{}`",
                    c as char, alphabet
                )));
            }
            lookup[c as usize] = idx as u8;
            lookup[c.to_ascii_lowercase() as usize] = idx as u8;
        }

        Ok(Self {
            counts: vec![0; length * characters.len()],
            characters,
            lookup,
            length,
            added_sequences: 0,
        })
    }

    /// Adds one aligned sequence. Its length must equal the number of sites.
    pub fn add_sequence(&mut self, sites: &[u8]) -> Result<()> {
        if sites.len() != self.length {
            return Err(TaxconsError::SiteLengthMismatch {
                label: "(unlabelled)".to_string(),
                expected: self.length,
                found: sites.len(),
            });
        }

        let width = self.characters.len();
        for (site, &c) in sites.iter().enumerate() {
            let idx = self.lookup[c as usize];
            if idx != NOT_IN_ALPHABET {
                self.counts[site * width + idx as usize] += 1;
            }
        }
        self.added_sequences += 1;
        Ok(())
    }

    pub fn count_at(&self, site: usize, char_index: usize) -> u32 {
        self.counts[site * self.characters.len() + char_index]
    }

    /// Counts of all alphabet characters at `site`, in alphabet order.
    pub fn site_counts(&self, site: usize) -> &[u32] {
        let width = self.characters.len();
        &self.counts[site * width..(site + 1) * width]
    }

    /// Number of informative characters seen at `site`.
    pub fn site_total(&self, site: usize) -> u64 {
        self.site_counts(site).iter().map(|&c| c as u64).sum()
    }

    /// Number of sites at which no sequence contributed an alphabet character.
    pub fn gap_site_count(&self) -> usize {
        (0..self.length).filter(|&s| self.site_total(s) == 0).count()
    }

    pub fn added_sequences(&self) -> u64 {
        self.added_sequences
    }

    pub fn characters(&self) -> &[u8] {
        &self.characters
    }

    pub fn length(&self) -> usize {
        self.length
    }
}
