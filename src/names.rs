use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::*;

use crate::errors::{FileError, NameError};
use crate::newick::Phylogeny;

/// The species prefix → anonymized token table.
///
/// Ranger-DTL balks at the species-name-embedded gene identifiers OrthoFinder
/// produces, so every leaf is rewritten to an anonymized namespace before the
/// trees reach it. Patterns are matched anchored at the start of the leaf
/// name; when two patterns share a prefix, the longest one wins.
pub struct NameTable {
    /// (species pattern, anonymized token), most specific pattern first
    entries: Vec<(String, String)>,
}

impl NameTable {
    /// Load a two-column `pattern<TAB>token` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<NameTable> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("while opening {}", path.display()))?;

        let mut entries = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("while reading {}", path.display()))?;
            let pattern = record.get(0).unwrap_or("").trim().to_owned();
            let token = record
                .get(1)
                .with_context(|| format!("{}: no token on line {}", path.display(), i + 1))?
                .trim()
                .to_owned();
            if pattern.is_empty() {
                bail!(NameError::EmptyPattern(i + 1));
            }
            entries.push((pattern, token));
        }
        NameTable::new(entries)
    }

    /// Build a table, validating up front that the mapping can stay bijective:
    /// a duplicated pattern or token could silently fold two species together
    /// at rename time.
    pub fn new(mut entries: Vec<(String, String)>) -> Result<NameTable> {
        let mut patterns = HashSet::new();
        let mut tokens = HashSet::new();
        for (pattern, token) in entries.iter() {
            if !patterns.insert(pattern.clone()) {
                bail!(NameError::DuplicatePattern(pattern.clone()));
            }
            if !tokens.insert(token.clone()) {
                bail!(NameError::DuplicateToken(token.clone()));
            }
        }
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(NameTable { entries })
    }

    /// The longest pattern anchored at the start of `leaf`, with its token.
    pub fn resolve(&self, leaf: &str) -> Option<(&str, &str)> {
        self.entries
            .iter()
            .find(|(pattern, _)| leaf.starts_with(pattern.as_str()))
            .map(|(pattern, token)| (pattern.as_str(), token.as_str()))
    }
}

/// The last two underscore-delimited fields of a leaf name; this is the part
/// of the identifier that is gene-specific rather than species-specific.
fn gene_suffix(leaf: &str) -> String {
    let fields = leaf.split('_').collect::<Vec<_>>();
    fields[fields.len().saturating_sub(2)..].join("_")
}

#[derive(Debug)]
pub struct Anonymized {
    /// The gene tree with every leaf rewritten to `{token}_{gene_suffix}`.
    pub tree: Phylogeny,
    /// anonymized ID → original ID
    pub reverse: BTreeMap<String, String>,
}

/// Rewrite every leaf of `tree` through `table`.
///
/// Fails on the first leaf whose species prefix matches no pattern, and on
/// any two distinct original identifiers landing on the same anonymized one.
pub fn anonymize(tree: &Phylogeny, table: &NameTable) -> Result<Anonymized> {
    let mut reverse = BTreeMap::new();
    let renamed = tree.map_leaf_names(&mut |leaf| {
        let (pattern, token) = table
            .resolve(leaf)
            .ok_or_else(|| NameError::UnresolvableLeaf(leaf.to_owned()))?;
        let suffix = gene_suffix(leaf);
        let original = format!("{}_{}", pattern, suffix);
        let anonymized = format!("{}_{}", token, suffix);
        if let Some(previous) = reverse.insert(anonymized.clone(), original.clone()) {
            if previous != original {
                bail!(NameError::Collision { id: anonymized, first: previous, second: original });
            }
        }
        Ok(anonymized)
    })?;

    Ok(Anonymized { tree: renamed, reverse })
}

/// Persist the reverse mapping so downstream steps can restore the original
/// identifiers in Ranger-DTL's output long after this process is gone.
pub fn write_reverse_map(map: &BTreeMap<String, String>, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path).map_err(|e| FileError::WhileCreating {
        source: e,
        filename: path.display().to_string(),
    })?);
    for (anonymized, original) in map.iter() {
        writeln!(out, "{}\t{}", anonymized, original)?;
    }
    Ok(out.flush()?)
}

/// Read a mapping written by [`write_reverse_map`].
#[allow(dead_code)]
pub fn read_reverse_map(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("while opening {}", path.display()))?;

    let mut map = BTreeMap::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("while reading {}", path.display()))?;
        ensure!(record.len() >= 2, "malformed mapping line in {}", path.display());
        map.insert(record[0].to_owned(), record[1].to_owned());
    }
    Ok(map)
}
