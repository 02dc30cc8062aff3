use std::path::PathBuf;

use anyhow::*;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use log::*;

mod binary;
mod errors;
mod names;
mod newick;
mod reconcile;
mod rnas;
mod scogs;

use reconcile::{Config, Costs};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile gene trees against a species tree with Ranger-DTL, then
    /// aggregate the per-run reconciliations
    Reconcile {
        /// Species tree with anonymized leaves and an explicit root label
        species_tree: PathBuf,

        /// Gene trees from OrthoFinder, processed one after the other
        #[clap(required = true)]
        gene_trees: Vec<PathBuf>,

        /// Two-column pattern<TAB>token file mapping species prefixes to
        /// anonymized tokens
        #[clap(short, long)]
        names: PathBuf,

        /// Where all artifacts land
        #[clap(short, long)]
        outdir: PathBuf,

        /// Ranger-DTL executable
        #[clap(long, default_value = "Ranger-DTL")]
        ranger: PathBuf,

        /// AggregateRanger executable
        #[clap(long, default_value = "AggregateRanger")]
        aggregate: PathBuf,

        /// Run every cost triple under each seed in 1..=N
        #[clap(long, default_value_t = 10)]
        n_seeds: u64,

        /// Comma-separated D:T:L cost triples
        #[clap(long, default_value = "2:3:1,3:3:1,2:4:1")]
        costs: String,
    },

    /// Select the orthogroups that are single-copy in every genome and copy
    /// their sequence files
    SelectScogs {
        /// Hierarchical orthogroups table (e.g. N0.tsv)
        table: PathBuf,

        /// Directory holding one FASTA file per orthogroup
        #[clap(short, long, default_value = "Orthogroup_Sequences")]
        seqs: PathBuf,

        /// Where the selected sequence files are copied
        #[clap(short, long, default_value = "Single_copy_OGs")]
        outdir: PathBuf,

        /// Print the selection without copying anything
        #[clap(long)]
        dry_run: bool,
    },

    /// Turn an orthogroup gene-count table into a presence/absence table
    CountsToBinary {
        /// Orthogroups.GeneCount.tsv from OrthoFinder
        gene_counts: PathBuf,

        /// Binary table to write
        out_file: PathBuf,
    },

    /// Tally rRNA/tRNA annotations of a directory of GenBank files
    RnasTable {
        /// Directory holding the GenBank files
        input_dir: PathBuf,

        /// Count table to write
        out_file: PathBuf,

        /// Minimum length (nt) for a 16S rRNA to be counted
        #[clap(long, default_value_t = 1400)]
        min_len: i64,

        /// Extension of the GenBank files to scan
        #[clap(long, default_value = "gbk")]
        ext: String,
    },
}

fn parse_costs(text: &str) -> Result<Vec<Costs>> {
    text.split(',')
        .map(|triple| {
            let parts = triple
                .split(':')
                .map(|x| x.trim().parse::<u32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("invalid cost triple `{}`", triple))?;
            ensure!(parts.len() == 3, "cost triple `{}` should read D:T:L", triple);
            Ok(Costs { duplication: parts[0], transfer: parts[1], loss: parts[2] })
        })
        .collect()
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new().filter_level(args.verbose.log_level_filter()).init();

    match args.command {
        Command::Reconcile {
            species_tree,
            gene_trees,
            names,
            outdir,
            ranger,
            aggregate,
            n_seeds,
            costs,
        } => {
            let table = names::NameTable::from_file(&names)
                .with_context(|| format!("while loading {}", names.display()))?;
            let mut config = Config::new(ranger, aggregate);
            config.seeds = (1, n_seeds);
            config.costs = parse_costs(&costs)?;
            info!(
                "Sweeping {} seeds over cost triples {}",
                n_seeds,
                config.costs.iter().join(", ")
            );

            for gene_tree in gene_trees.iter() {
                let agg_file =
                    reconcile::reconcile_family(&species_tree, gene_tree, &table, &outdir, &config)
                        .with_context(|| format!("while processing {}", gene_tree.display()))?;
                info!("Aggregated reconciliations written to {:?}", agg_file);
            }
        }

        Command::SelectScogs { table, seqs, outdir, dry_run } => {
            if dry_run {
                let selected = scogs::select_single_copy(&table)?;
                println!("{}", selected.iter().join("\n"));
            } else {
                scogs::copy_scogs(&table, &seqs, &outdir)?;
            }
        }

        Command::CountsToBinary { gene_counts, out_file } => {
            binary::counts_to_binary(&gene_counts, &out_file)?
        }

        Command::RnasTable { input_dir, out_file, min_len, ext } => {
            rnas::rnas_table(&input_dir, &out_file, min_len, &ext)?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_cost_triples() -> Result<()> {
        assert_eq!(
            parse_costs("2:3:1,3:3:1,2:4:1")?,
            vec![
                Costs { duplication: 2, transfer: 3, loss: 1 },
                Costs { duplication: 3, transfer: 3, loss: 1 },
                Costs { duplication: 2, transfer: 4, loss: 1 },
            ]
        );
        assert!(parse_costs("2:3").is_err());
        assert!(parse_costs("a:b:c").is_err());
        Ok(())
    }
}
