use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::*;
use indicatif::ProgressBar;
use log::*;

use crate::errors::{FileError, RangerError};
use crate::names::{self, NameTable};
use crate::newick::Phylogeny;

/// Root label Ranger-DTL requires on both trees. The species tree is prepared
/// upstream with the same label; the gene tree gets it spliced in here because
/// Newick serialization leaves the root anonymous.
pub const ROOT_LABEL: &str = "n0";

const AGGREGATE_DIR: &str = "AggregateRanger";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Costs {
    pub duplication: u32,
    pub transfer: u32,
    pub loss: u32,
}

impl std::fmt::Display for Costs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.duplication, self.transfer, self.loss)
    }
}

/// The default (D, T, L) grid; one triple per reconciliation flavor, aligned
/// by position rather than cross-producted.
pub const DEFAULT_COSTS: [Costs; 3] = [
    Costs { duplication: 2, transfer: 3, loss: 1 },
    Costs { duplication: 3, transfer: 3, loss: 1 },
    Costs { duplication: 2, transfer: 4, loss: 1 },
];

pub const DEFAULT_SEEDS: (u64, u64) = (1, 10);

pub struct Config {
    pub ranger: PathBuf,
    pub aggregate: PathBuf,
    pub costs: Vec<Costs>,
    /// Inclusive seed range.
    pub seeds: (u64, u64),
}

impl Config {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(ranger: P, aggregate: Q) -> Config {
        Config {
            ranger: ranger.into(),
            aggregate: aggregate.into(),
            costs: DEFAULT_COSTS.to_vec(),
            seeds: DEFAULT_SEEDS,
        }
    }

    fn total_runs(&self) -> usize {
        let (first, last) = self.seeds;
        if last < first {
            0
        } else {
            (last - first + 1) as usize * self.costs.len()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Run {
    pub id: usize,
    pub seed: u64,
    pub costs: Costs,
}

/// The sweep grid, with run identifiers made explicit: seeds in the outer
/// loop, cost triples in the inner one, IDs contiguous from 1. Output file
/// names derive from the IDs, so the same grid always maps runs to the same
/// artifacts.
pub fn runs(config: &Config) -> impl Iterator<Item = Run> + '_ {
    let (first, last) = config.seeds;
    (first..=last)
        .flat_map(move |seed| config.costs.iter().map(move |&costs| (seed, costs)))
        .enumerate()
        .map(|(i, (seed, costs))| Run { id: i + 1, seed, costs })
}

fn stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| FileError::InvalidFilename(format!("{:?}", path)).into())
}

/// Run the whole codec → assemble → sweep → aggregate pipeline for one gene
/// tree; returns the path of the aggregated results file.
pub fn reconcile_family(
    species_tree: &Path,
    gene_tree: &Path,
    table: &NameTable,
    out_dir: &Path,
    config: &Config,
) -> Result<PathBuf> {
    let id = stem(gene_tree)?;
    info!("===== Family {} =====", id);
    fs::create_dir_all(out_dir)
        .with_context(|| format!("while creating {}", out_dir.display()))?;

    let tree = Phylogeny::from_file(gene_tree)
        .with_context(|| format!("while parsing {}", gene_tree.display()))?;
    let anonymized = names::anonymize(&tree, table)?;
    let map_file = out_dir.join(format!("{}.names.tsv", id));
    names::write_reverse_map(&anonymized.reverse, &map_file)?;
    debug!("Reverse mapping written to {:?}", map_file);

    let input_file = assemble_input(species_tree, &anonymized.tree, id, out_dir)?;

    let run_dir = out_dir.join(id);
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("while creating {}", run_dir.display()))?;
    run_sweep(config, &input_file, &run_dir)?;

    let agg_file = aggregate(config, &run_dir, id, out_dir)?;
    fs::remove_file(&input_file)?;

    Ok(agg_file)
}

/// Write the single input file Ranger-DTL expects: the species tree text
/// verbatim, then the renamed gene tree with an explicit root label. The
/// intermediate renamed-tree file only exists for the hand-off and is removed
/// once concatenated.
fn assemble_input(
    species_tree: &Path,
    gene_tree: &Phylogeny,
    id: &str,
    out_dir: &Path,
) -> Result<PathBuf> {
    let gene_file = out_dir.join(format!("new_{}.txt", id));
    fs::write(&gene_file, gene_tree.to_newick()).map_err(|e| FileError::WhileCreating {
        source: e,
        filename: gene_file.display().to_string(),
    })?;

    let species_text = fs::read_to_string(species_tree).map_err(|e| FileError::CannotOpen {
        source: e,
        filename: species_tree.display().to_string(),
    })?;
    let gene_text = fs::read_to_string(&gene_file)?;

    let input_file = out_dir.join(format!("input_{}.nwk", id));
    fs::write(
        &input_file,
        format!(
            "{}{}\n",
            species_text,
            gene_text.replacen(';', &format!("{};", ROOT_LABEL), 1)
        ),
    )
    .map_err(|e| FileError::WhileCreating {
        source: e,
        filename: input_file.display().to_string(),
    })?;
    fs::remove_file(&gene_file)?;

    Ok(input_file)
}

/// Drive Ranger-DTL once per (seed, cost triple) pair, strictly serially.
/// Any failing run aborts the family; everything already produced is left on
/// disk for inspection.
fn run_sweep(config: &Config, input_file: &Path, run_dir: &Path) -> Result<()> {
    let bar = if atty::is(atty::Stream::Stderr) {
        ProgressBar::new(config.total_runs() as u64)
    } else {
        ProgressBar::hidden()
    };

    for run in runs(config) {
        let out_prefix = run_dir.join(format!("out{}", run.id));
        let mut cmd = Command::new(&config.ranger);
        cmd.arg("--seed")
            .arg(run.seed.to_string())
            .arg("-i")
            .arg(input_file)
            .arg("-D")
            .arg(run.costs.duplication.to_string())
            .arg("-T")
            .arg(run.costs.transfer.to_string())
            .arg("-L")
            .arg(run.costs.loss.to_string())
            .arg("-o")
            .arg(&out_prefix);
        debug!("Run {}: {:?}", run.id, cmd);

        let output = cmd
            .output()
            .with_context(|| format!("while spawning {}", config.ranger.display()))?;
        if !output.status.success() {
            warn!("{}", String::from_utf8_lossy(&output.stderr));
            bail!(RangerError::RunFailed {
                run: run.id,
                seed: run.seed,
                duplication: run.costs.duplication,
                transfer: run.costs.transfer,
                loss: run.costs.loss,
                status: output.status,
            });
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(())
}

/// Fold all per-run outputs for one family into a single file under the
/// aggregate directory. AggregateRanger writes its summary to stdout, which
/// is captured verbatim.
fn aggregate(config: &Config, run_dir: &Path, id: &str, out_dir: &Path) -> Result<PathBuf> {
    let agg_dir = out_dir.join(AGGREGATE_DIR);
    fs::create_dir_all(&agg_dir)
        .with_context(|| format!("while creating {}", agg_dir.display()))?;

    let prefix = run_dir.join("out");
    let output = Command::new(&config.aggregate)
        .arg(&prefix)
        .output()
        .with_context(|| format!("while spawning {}", config.aggregate.display()))?;
    if !output.status.success() {
        warn!("{}", String::from_utf8_lossy(&output.stderr));
        bail!(RangerError::AggregationFailed {
            prefix: prefix.display().to_string(),
            status: output.status,
        });
    }

    let agg_file = agg_dir.join(format!("agg_{}.txt", id));
    fs::write(&agg_file, &output.stdout).map_err(|e| FileError::WhileCreating {
        source: e,
        filename: agg_file.display().to_string(),
    })?;

    Ok(agg_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;

    fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    // touches whatever follows the -o flag
    const FAKE_RANGER: &str = r#"while [ "$#" -gt 1 ]; do
  if [ "$1" = "-o" ]; then : > "$2"; fi
  shift
done"#;

    fn config(dir: &Path) -> Config {
        Config::new(
            fake_tool(dir, "ranger", FAKE_RANGER),
            fake_tool(dir, "aggregate", r#"echo "aggregated $1""#),
        )
    }

    #[test]
    fn grid_is_contiguous_and_reproducible() {
        let config = Config::new("ranger", "aggregate");
        let grid = runs(&config).collect::<Vec<_>>();

        assert_eq!(grid.len(), 30);
        assert_eq!(grid.iter().map(|r| r.id).collect::<Vec<_>>(), (1..=30).collect::<Vec<_>>());
        // seeds outer, cost triples inner
        assert_eq!(grid[0], Run { id: 1, seed: 1, costs: DEFAULT_COSTS[0] });
        assert_eq!(grid[2], Run { id: 3, seed: 1, costs: DEFAULT_COSTS[2] });
        assert_eq!(grid[3], Run { id: 4, seed: 2, costs: DEFAULT_COSTS[0] });
        assert_eq!(grid, runs(&config).collect::<Vec<_>>());
    }

    #[test]
    fn assembled_input_is_root_labeled_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let species_file = dir.path().join("species.nwk");
        fs::write(&species_file, "(spA:1.0,spB:1.0)n0;\n")?;
        let gene_tree = Phylogeny::from_string("(spA_g_1:0.000001,spB_g_2:0.5);")?;

        let input_file = assemble_input(&species_file, &gene_tree, "OG0000001", dir.path())?;
        let content = fs::read_to_string(&input_file)?;

        assert!(content.ends_with("n0;\n"));
        assert_eq!(content.matches(';').count(), 2);
        assert_eq!(content.matches("n0;").count(), 2);
        // fixed-point branch, no scientific notation anywhere near Ranger-DTL
        assert!(content.contains("spA_g_1:0.000001"));
        // the intermediate renamed tree is gone
        assert!(!dir.path().join("new_OG0000001.txt").exists());
        Ok(())
    }

    #[test]
    fn sweep_produces_one_artifact_per_run() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = config(dir.path());
        let input_file = dir.path().join("input.nwk");
        fs::write(&input_file, "(spA:1,spB:1)n0;(a_g_1:1,b_g_2:1)n0;\n")?;
        let run_dir = dir.path().join("OG0000001");
        fs::create_dir(&run_dir)?;

        run_sweep(&config, &input_file, &run_dir)?;

        for i in 1..=30 {
            assert!(run_dir.join(format!("out{}", i)).exists(), "missing out{}", i);
        }
        assert!(!run_dir.join("out0").exists());
        assert!(!run_dir.join("out31").exists());
        Ok(())
    }

    #[test]
    fn failing_run_is_surfaced() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = config(dir.path());
        config.ranger = fake_tool(dir.path(), "broken", "exit 3");
        let input_file = dir.path().join("input.nwk");
        fs::write(&input_file, "irrelevant\n")?;

        let err = run_sweep(&config, &input_file, dir.path()).unwrap_err();
        assert!(err.to_string().contains("seed 1"));
        Ok(())
    }

    #[test]
    fn pipeline_lifecycle() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = config(dir.path());
        let table = crate::names::NameTable::new(vec![
            ("ECOLI".to_owned(), "sp01".to_owned()),
            ("SALTY".to_owned(), "sp02".to_owned()),
        ])?;

        let species_file = dir.path().join("species.nwk");
        fs::write(&species_file, "(sp01:1.0,sp02:1.0)n0;\n")?;
        let gene_file = dir.path().join("OG0000042_tree.txt");
        fs::write(&gene_file, "(ECOLI_g_0001:0.1,SALTY_g_0002:0.2);\n")?;
        let out_dir = dir.path().join("results");

        let agg_file =
            reconcile_family(&species_file, &gene_file, &table, &out_dir, &config)?;

        assert_eq!(agg_file, out_dir.join("AggregateRanger/agg_OG0000042_tree.txt"));
        let aggregated = fs::read_to_string(&agg_file)?;
        assert!(aggregated.starts_with("aggregated"));
        assert!(aggregated.contains("OG0000042_tree/out"));

        // reverse mapping persisted, per-run outputs retained, input cleaned up
        assert!(out_dir.join("OG0000042_tree.names.tsv").exists());
        assert!(out_dir.join("OG0000042_tree/out30").exists());
        assert!(!out_dir.join("input_OG0000042_tree.nwk").exists());
        assert!(!out_dir.join("new_OG0000042_tree.txt").exists());
        Ok(())
    }
}
