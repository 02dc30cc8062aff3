use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::*;
use itertools::Itertools;
use log::*;
use rayon::prelude::*;

use crate::errors::FileError;

const SIXTEEN_S: &str = "16S ribosomal RNA";
const COUNTED_KINDS: [&str; 2] = ["rRNA", "tRNA"];

/// Tally the annotated rRNA/tRNA products of one GenBank file.
///
/// Pseudogenes are ignored, and 16S rRNAs shorter than `min_len` are dropped:
/// truncated 16S copies are routinely annotated without being flagged pseudo,
/// and they would inflate the ribosomal counts.
fn genbank_stats(path: &Path, min_len: i64) -> Result<BTreeMap<String, usize>> {
    let pseudo: Cow<'static, str> = "pseudo".into();
    let mut counts = BTreeMap::new();

    for record in gb_io::reader::parse_file(path)
        .with_context(|| format!("while parsing {}", path.display()))?
    {
        for feature in record.features.iter() {
            if !COUNTED_KINDS.contains(&feature.kind.to_string().as_str()) {
                continue;
            }
            if feature.qualifiers.iter().any(|(k, _)| *k == pseudo) {
                continue;
            }
            let Some(product) = feature.qualifier_values("product".into()).next() else {
                continue;
            };
            if product == SIXTEEN_S {
                let length = feature
                    .location
                    .find_bounds()
                    .map(|(from, to)| to - from)
                    .unwrap_or(0);
                if length < min_len {
                    info!("{}: {} nt 16S rRNA left out", path.display(), length);
                    continue;
                }
            }
            *counts.entry(product.to_owned()).or_insert(0) += 1;
        }
    }

    Ok(counts)
}

/// Lay per-genome tallies out as a table: one row per genome, one column per
/// product (lexicographic), plus a trailing total over the tRNA columns.
fn write_table(
    tallies: &[(String, BTreeMap<String, usize>)],
    out_file: &Path,
) -> Result<()> {
    let mut columns = BTreeSet::new();
    for (_, counts) in tallies.iter() {
        columns.extend(counts.keys().cloned());
    }

    let mut out = BufWriter::new(File::create(out_file).map_err(|e| FileError::WhileCreating {
        source: e,
        filename: out_file.display().to_string(),
    })?);
    writeln!(out, "Genome_name\t{}\tTotal_tRNAs", columns.iter().join("\t"))?;
    for (genome, counts) in tallies.iter() {
        let total_trnas: usize = counts
            .iter()
            .filter(|(product, _)| product.starts_with("tRNA-"))
            .map(|(_, n)| n)
            .sum();
        write!(out, "{}", genome)?;
        for column in columns.iter() {
            write!(out, "\t{}", counts.get(column).unwrap_or(&0))?;
        }
        writeln!(out, "\t{}", total_trnas)?;
    }

    Ok(out.flush()?)
}

/// Scan `input_dir` for GenBank files and write the merged rRNA/tRNA count
/// table. Genomes without a single countable feature are left out of the
/// table (with a log line) rather than contributing an empty row.
pub fn rnas_table(input_dir: &Path, out_file: &Path, min_len: i64, extension: &str) -> Result<()> {
    let mut files: Vec<PathBuf> = fs::read_dir(input_dir)
        .with_context(|| format!("while listing {}", input_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    files.sort();
    ensure!(!files.is_empty(), "no .{} files under {}", extension, input_dir.display());
    info!("Tallying {} GenBank files", files.len());

    let tallies = files
        .par_iter()
        .map(|f| {
            let genome = f
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| FileError::InvalidFilename(format!("{:?}", f)))?
                .to_owned();
            Ok((genome, genbank_stats(f, min_len)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let tallies = tallies
        .into_iter()
        .filter(|(genome, counts)| {
            if counts.is_empty() {
                warn!("{} has no rRNA or tRNA annotation, leaving it out", genome);
            }
            !counts.is_empty()
        })
        .collect::<Vec<_>>();

    write_table(&tallies, out_file)?;
    info!("rRNA/tRNA table written to {}", out_file.display());

    Ok(())
}
