use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use log::*;

use crate::errors::ScogError;

/// Leading columns of the hierarchical-orthogroup table that never hold
/// genome data (HOG, OG, gene tree parent clade).
pub const RESERVED_COLUMNS: usize = 3;

const OG_COLUMN: &str = "OG";

/// Scan an `N0.tsv`-style membership table and return the orthogroups that
/// have exactly one gene in every genome column, in row order.
///
/// A row whose shape cannot be interpreted is reported and excluded rather
/// than aborting the scan; a table with no genome columns yields an empty
/// selection.
pub fn select_single_copy<P: AsRef<Path>>(table: P) -> Result<Vec<String>> {
    let path = table.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("while opening {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("while reading headers of {}", path.display()))?
        .clone();
    let og_column = headers.iter().position(|h| h == OG_COLUMN).ok_or_else(|| {
        ScogError::MissingColumn(OG_COLUMN.to_owned(), path.display().to_string())
    })?;
    let n_genomes = headers.len().saturating_sub(RESERVED_COLUMNS);
    if n_genomes == 0 {
        warn!("{} has no genome columns", path.display());
        return Ok(Vec::new());
    }

    let mut candidates = 0;
    let mut selected = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: skipping row {}: {}", path.display(), i + 2, e);
                continue;
            }
        };
        if record.len() != headers.len() {
            warn!(
                "{}: row {} has {} fields instead of {}; skipping",
                path.display(),
                i + 2,
                record.len(),
                headers.len()
            );
            continue;
        }

        let cells = record.iter().skip(RESERVED_COLUMNS).collect::<Vec<_>>();
        if !cells.iter().all(|cell| !cell.trim().is_empty()) {
            continue;
        }
        candidates += 1;

        let mut single = true;
        for cell in cells {
            // a second paralog anywhere disqualifies the whole orthogroup
            if cell.split(',').count() > 1 {
                single = false;
                break;
            }
        }
        if single {
            selected.push(record[og_column].to_owned());
        }
    }

    info!("{} orthogroups cover all {} genomes", candidates, n_genomes);
    info!("{} of them are single-copy", selected.len());
    debug!("Selected: {}", selected.iter().join(", "));

    Ok(selected)
}

/// Copy the `<og>.fa` sequence files of the selected orthogroups to
/// `out_dir`. Every selected orthogroup is expected to have a sequence file;
/// the ones that do not are an integrity error, reported all together after
/// everything copyable has been copied.
pub fn copy_scogs(table: &Path, seqs_dir: &Path, out_dir: &Path) -> Result<Vec<String>> {
    let selected = select_single_copy(table)?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("while creating {}", out_dir.display()))?;

    let mut missing = Vec::new();
    let mut copied = 0;
    for og in selected.iter() {
        let fasta = seqs_dir.join(format!("{}.fa", og));
        if fasta.is_file() {
            fs::copy(&fasta, out_dir.join(format!("{}.fa", og)))
                .with_context(|| format!("while copying {}", fasta.display()))?;
            copied += 1;
        } else {
            missing.push(og.clone());
        }
    }
    info!("{} sequence files copied to {}", copied, out_dir.display());

    if !missing.is_empty() {
        bail!(ScogError::MissingSequences(missing));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_table(dir: &Path, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.join("N0.tsv");
        let mut fh = fs::File::create(&path).unwrap();
        writeln!(fh, "HOG\tOG\tGene Tree Parent Clade\tA\tB\tC").unwrap();
        for row in rows {
            writeln!(fh, "{}", row).unwrap();
        }
        path
    }

    #[test]
    fn classifies_coverage_and_copy_number() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let table = write_table(
            dir.path(),
            &[
                "N0.HOG1\tOG1\t-\tg1\tg2\tg3",
                "N0.HOG2\tOG2\t-\tg1,g2\tg3\tg4",
                "N0.HOG3\tOG3\t-\tg1\tg2\t",
            ],
        );
        assert_eq!(select_single_copy(&table)?, vec!["OG1"]);
        Ok(())
    }

    #[test]
    fn preserves_row_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let table = write_table(
            dir.path(),
            &[
                "N0.HOG1\tOG3\t-\tg1\tg2\tg3",
                "N0.HOG2\tOG1\t-\tg4\tg5\tg6",
                "N0.HOG3\tOG2\t-\tg7,g8\tg9\tg10",
            ],
        );
        assert_eq!(select_single_copy(&table)?, vec!["OG3", "OG1"]);
        Ok(())
    }

    #[test]
    fn empty_genome_set_is_not_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("N0.tsv");
        fs::write(&path, "HOG\tOG\tGene Tree Parent Clade\nN0.HOG1\tOG1\t-\n")?;
        assert_eq!(select_single_copy(&path)?, Vec::<String>::new());
        Ok(())
    }

    #[test]
    fn malformed_rows_are_excluded_not_fatal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let table = write_table(
            dir.path(),
            &[
                "N0.HOG1\tOG1\t-\tg1\tg2\tg3",
                "N0.HOG2\tOG2\t-\tg4",
                "N0.HOG3\tOG3\t-\tg5\tg6\tg7",
            ],
        );
        assert_eq!(select_single_copy(&table)?, vec!["OG1", "OG3"]);
        Ok(())
    }

    #[test]
    fn copies_and_reports_missing_sequences() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let table = write_table(
            dir.path(),
            &[
                "N0.HOG1\tOG1\t-\tg1\tg2\tg3",
                "N0.HOG2\tOG2\t-\tg4\tg5\tg6",
            ],
        );
        let seqs = dir.path().join("Orthogroup_Sequences");
        fs::create_dir(&seqs)?;
        fs::write(seqs.join("OG1.fa"), ">g1\nATGC\n")?;
        let out = dir.path().join("Single_copy_OGs");

        let err = copy_scogs(&table, &seqs, &out).unwrap_err();
        assert!(err.to_string().contains("OG2"));
        // everything copyable was still copied before the error surfaced
        assert!(out.join("OG1.fa").exists());

        fs::write(seqs.join("OG2.fa"), ">g4\nATGC\n")?;
        assert_eq!(copy_scogs(&table, &seqs, &out)?, vec!["OG1", "OG2"]);
        assert!(out.join("OG2.fa").exists());
        Ok(())
    }
}
