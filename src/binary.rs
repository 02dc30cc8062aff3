use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::*;

use crate::errors::FileError;

/// OrthoFinder appends a per-orthogroup gene total; it is noise in a
/// presence/absence table.
const TOTAL_COLUMN: &str = "Total";

/// Convert an `Orthogroups.GeneCount.tsv` table into a binary table where 1
/// marks presence of the orthogroup in a genome (count >= 1). Rows with
/// uninterpretable counts are reported and left out.
pub fn counts_to_binary(counts: &Path, out_file: &Path) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(counts)
        .with_context(|| format!("while opening {}", counts.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("while reading headers of {}", counts.display()))?
        .clone();

    let keep = headers
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, h)| *h != TOTAL_COLUMN)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    let mut out = BufWriter::new(File::create(out_file).map_err(|e| FileError::WhileCreating {
        source: e,
        filename: out_file.display().to_string(),
    })?);
    writeln!(out, "Orthogroup\t{}", keep.iter().map(|&i| &headers[i]).join("\t"))?;

    for (i, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: skipping row {}: {}", counts.display(), i + 2, e);
                continue;
            }
        };

        let bits = keep
            .iter()
            .map(|&col| {
                record
                    .get(col)
                    .unwrap_or("")
                    .trim()
                    .parse::<u64>()
                    .map(|n| if n >= 1 { "1" } else { "0" })
            })
            .collect::<std::result::Result<Vec<_>, _>>();
        match bits {
            Ok(bits) => writeln!(out, "{}\t{}", &record[0], bits.iter().join("\t"))?,
            Err(_) => {
                warn!(
                    "{}: row {} ({}) has a non-numeric count; skipping",
                    counts.display(),
                    i + 2,
                    &record[0]
                );
            }
        }
    }
    out.flush()?;
    info!("Binary table written to {}", out_file.display());

    Ok(())
}
