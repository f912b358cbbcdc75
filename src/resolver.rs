//src/resolver.rs

use ahash::AHashMap;

use crate::error::{Result, TaxconsError};
use crate::taxonomy::{TaxonId, Taxonomy};

/// Turns free text into a path key: whitespace, control characters and
/// `:;,()[]'"` become `_`, trailing `_` are dropped.
pub fn sanitize_key(text: &str) -> String {
    let mut key: String = text
        .trim()
        .chars()
        .map(|c| match c {
            ':' | ';' | ',' | '(' | ')' | '[' | ']' | '\'' | '"' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();
    while key.ends_with('_') {
        key.pop();
    }
    key
}

/// Picks the text that carries the taxonomic path of a record: explicit metadata
/// if there is any, otherwise whatever follows the first space or tab of the label,
/// otherwise the label itself.
pub fn candidate_text<'a>(label: &'a str, metadata: Option<&'a str>) -> &'a str {
    if let Some(meta) = metadata.map(str::trim).filter(|m| !m.is_empty()) {
        return meta;
    }
    match label.find([' ', '\t']) {
        Some(delim) => label[delim + 1..].trim(),
        None => label,
    }
}

/// Maps sequence labels to taxa via their sanitized path keys.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    keys: AHashMap<String, TaxonId>,
}

impl LabelResolver {
    /// Indexes every taxon of `taxonomy`. Two taxa sharing a key is an error,
    /// as later lookups could not tell them apart.
    pub fn new(taxonomy: &Taxonomy) -> Result<Self> {
        let mut keys = AHashMap::with_capacity(taxonomy.len());
        for id in taxonomy.ids() {
            let key = taxonomy.path_key(id);
            if let Some(previous) = keys.insert(key.clone(), id) {
                return Err(TaxconsError::DuplicateTaxon(format!(
                    "`{}` and `{}` share the key `{}`",
                    taxonomy.taxopath(previous),
                    taxonomy.taxopath(id),
                    key
                )));
            }
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<TaxonId> {
        self.keys.get(key).copied()
    }

    /// Resolves `text` to a taxon, see `resolve_steps`.
    pub fn resolve(&self, text: &str) -> Option<TaxonId> {
        self.resolve_steps(text).0
    }

    /// Looks up the sanitized `text`; on a miss, cuts the key back at its last `_`
    /// and retries, moving to ever coarser ranks until a key matches or nothing
    /// is left. Also returns how many truncations were made.
    pub fn resolve_steps(&self, text: &str) -> (Option<TaxonId>, usize) {
        let key = sanitize_key(text);
        let mut candidate = key.as_str();
        let mut steps = 0;

        while !candidate.is_empty() {
            if let Some(id) = self.get(candidate) {
                return (Some(id), steps);
            }
            match candidate.rfind('_') {
                Some(last) => {
                    candidate = &candidate[..last];
                    steps += 1;
                }
                None => break,
            }
        }
        (None, steps)
    }
}
