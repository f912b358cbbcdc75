// src/taxonomy.rs

use ahash::AHashSet;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Result, TaxconsError};
use crate::resolver::sanitize_key;
use crate::site_counts::SiteCounts;

/// Stable index of a taxon inside its `Taxonomy` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaxonId(pub usize);

/// One node of the taxonomy. The parent link is a plain index, never ownership.
#[derive(Debug, Clone)]
pub struct Taxon {
    pub name: String,
    pub parent: Option<TaxonId>,
    pub children: Vec<TaxonId>,
    pub counts: SiteCounts,
    /// Sequences whose label resolved to exactly this taxon
    pub direct_sequences: u64,
}

impl Taxon {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Whether a pre-order walk continues below the taxon just visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Descend,
    Skip,
}

/// Arena-backed taxonomic hierarchy. Every taxon owns one empty-at-creation
/// `SiteCounts` sized to the alignment width.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    nodes: Vec<Taxon>,
    top_level: Vec<TaxonId>,
    empty_counts: SiteCounts,
}

impl Taxonomy {
    pub fn new(alphabet: &str, site_length: usize) -> Result<Self> {
        Ok(Self {
            nodes: Vec::new(),
            top_level: Vec::new(),
            empty_counts: SiteCounts::new(alphabet, site_length)?,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn top_level(&self) -> &[TaxonId] {
        &self.top_level
    }

    pub fn taxon(&self, id: TaxonId) -> &Taxon {
        &self.nodes[id.0]
    }

    pub fn taxon_mut(&mut self, id: TaxonId) -> &mut Taxon {
        &mut self.nodes[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = TaxonId> {
        (0..self.nodes.len()).map(TaxonId)
    }

    pub fn site_length(&self) -> usize {
        self.empty_counts.length()
    }

    pub fn alphabet(&self) -> &[u8] {
        self.empty_counts.characters()
    }

    /// Child of `parent` (or top-level taxon if `parent` is `None`) named `name`.
    pub fn find_child(&self, parent: Option<TaxonId>, name: &str) -> Option<TaxonId> {
        let siblings = match parent {
            Some(p) => &self.nodes[p.0].children,
            None => &self.top_level,
        };
        siblings
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].name == name)
    }

    /// Adds a new taxon. Sibling names must be unique.
    pub fn add_child(&mut self, parent: Option<TaxonId>, name: &str) -> Result<TaxonId> {
        if self.find_child(parent, name).is_some() {
            let mut path = parent.map(|p| self.taxopath(p)).unwrap_or_default();
            path.push_str(name);
            return Err(TaxconsError::DuplicateTaxon(path));
        }

        let id = TaxonId(self.nodes.len());
        self.nodes.push(Taxon {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            counts: self.empty_counts.clone(),
            direct_sequences: 0,
        });
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.top_level.push(id),
        }
        Ok(id)
    }

    /// Walks `names` from the top level, creating missing taxa, and returns the last one.
    pub fn add_path(&mut self, names: &[&str]) -> Result<TaxonId> {
        if names.is_empty() {
            return Err(TaxconsError::TaxonomyFormat {
                line: 0,
                reason: "empty taxonomic path".to_string(),
            });
        }

        let mut current: Option<TaxonId> = None;
        for name in names {
            current = Some(match self.find_child(current, name) {
                Some(existing) => existing,
                None => self.add_child(current, name)?,
            });
        }
        // `names` is non-empty, so the loop assigned at least once
        current.ok_or_else(|| TaxconsError::TaxonomyFormat {
            line: 0,
            reason: "empty taxonomic path".to_string(),
        })
    }

    /// Orders every child list, and the top level, by taxon name.
    pub fn sort_by_name(&mut self) {
        let names: Vec<String> = self.nodes.iter().map(|t| t.name.clone()).collect();
        for node in &mut self.nodes {
            node.children.sort_by(|a, b| names[a.0].cmp(&names[b.0]));
        }
        self.top_level.sort_by(|a, b| names[a.0].cmp(&names[b.0]));
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: TaxonId) -> impl Iterator<Item = TaxonId> + '_ {
        std::iter::successors(self.nodes[id.0].parent, move |p| self.nodes[p.0].parent)
    }

    /// Depth of `id`; top-level taxa are at level 0.
    pub fn level(&self, id: TaxonId) -> usize {
        self.ancestors(id).count()
    }

    /// Names from the top level down to `id`.
    pub fn path(&self, id: TaxonId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .ancestors(id)
            .map(|a| self.nodes[a.0].name.as_str())
            .collect();
        names.reverse();
        names.push(&self.nodes[id.0].name);
        names
    }

    /// Human readable path, e.g. `Bacteria;Proteobacteria;`.
    pub fn taxopath(&self, id: TaxonId) -> String {
        let mut out = String::new();
        for name in self.path(id) {
            out.push_str(name);
            out.push(';');
        }
        out
    }

    /// Canonical key used for label matching and output, e.g. `Bacteria_Proteobacteria`.
    pub fn path_key(&self, id: TaxonId) -> String {
        sanitize_key(&self.path(id).join(";"))
    }

    /// Pre-order walk over the subtrees rooted at `starts`, driven by an explicit
    /// stack. Children are visited in their stored order; returning `Visit::Skip`
    /// from the visitor leaves the children of that taxon out.
    pub fn traverse_preorder<F>(&self, starts: &[TaxonId], mut visit: F)
    where
        F: FnMut(TaxonId) -> Visit,
    {
        let mut stack: Vec<TaxonId> = starts.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if visit(id) == Visit::Descend {
                stack.extend(self.nodes[id.0].children.iter().rev().copied());
            }
        }
    }

    /// All taxa in pre-order.
    pub fn preorder_ids(&self) -> Vec<TaxonId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        self.traverse_preorder(&self.top_level, |id| {
            order.push(id);
            Visit::Descend
        });
        order
    }

    /// Number of taxa below `id` (excluding `id` itself).
    pub fn total_taxa(&self, id: TaxonId) -> usize {
        let mut count = 0;
        self.traverse_preorder(&[id], |_| {
            count += 1;
            Visit::Descend
        });
        count - 1
    }

    /// Number of leaves in the subtree of `id`; a leaf counts itself.
    pub fn leaf_count(&self, id: TaxonId) -> usize {
        let mut count = 0;
        self.traverse_preorder(&[id], |t| {
            if self.nodes[t.0].is_leaf() {
                count += 1;
            }
            Visit::Descend
        });
        count
    }

    /// For every taxon, the number of sequences resolved to any taxon of its
    /// subtree, the taxon itself included.
    pub fn subtree_sequence_totals(&self) -> Vec<u64> {
        let mut totals: Vec<u64> = self.nodes.iter().map(|n| n.direct_sequences).collect();
        // Reverse pre-order sees every child before its parent.
        for id in self.preorder_ids().into_iter().rev() {
            if let Some(parent) = self.nodes[id.0].parent {
                totals[parent.0] += totals[id.0];
            }
        }
        totals
    }

    /// Number of sequences resolved to some taxon of the whole taxonomy.
    pub fn total_sequences(&self) -> u64 {
        self.nodes.iter().map(|n| n.direct_sequences).sum()
    }

    /// Loads a taxonomy file (plain or `.gz`).
    pub fn from_file<P: AsRef<Path>>(path: P, alphabet: &str, site_length: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);

        let reader: Box<dyn BufRead> = if is_gz {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Self::from_reader(reader, alphabet, site_length)
    }

    /// Parses taxonomy lines in the format:
    /// ```text
    /// <taxon;path;>\t<id>\t<rank>...
    /// ```
    /// Only the first column is used. Listing the same path twice is an error.
    pub fn from_reader<R: BufRead>(reader: R, alphabet: &str, site_length: usize) -> Result<Self> {
        let mut taxonomy = Self::new(alphabet, site_length)?;
        let mut listed: AHashSet<TaxonId> = AHashSet::new();

        for (line_idx, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line_no = line_idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let path_field = trimmed.split('\t').next().unwrap_or("");
            let names: Vec<&str> = path_field
                .split(';')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect();
            if names.is_empty() {
                return Err(TaxconsError::TaxonomyFormat {
                    line: line_no,
                    reason: format!("no taxon names in `{}`", path_field),
                });
            }

            let id = taxonomy.add_path(&names)?;
            if !listed.insert(id) {
                return Err(TaxconsError::DuplicateTaxon(format!(
                    "{} (line {})",
                    path_field, line_no
                )));
            }
        }

        log::info!(
            "Loaded taxonomy with {} taxa ({} top-level)",
            taxonomy.len(),
            taxonomy.top_level.len()
        );
        Ok(taxonomy)
    }
}
