use colored::Colorize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("failed to open {}", .filename.bright_yellow().bold())]
    CannotOpen { source: std::io::Error, filename: String },

    #[error("while creating {filename}")]
    WhileCreating { source: std::io::Error, filename: String },

    #[error("invalid filename: {}", .0.yellow().bold())]
    InvalidFilename(String),
}

#[derive(Error, Debug)]
pub enum NewickError {
    #[error("unbalanced parentheses near byte {0}")]
    UnbalancedParentheses(usize),

    #[error("missing `;` tree terminator")]
    MissingTerminator,

    #[error("unexpected content after `;` at byte {0}")]
    TrailingContent(usize),

    #[error("invalid branch length {}", .0.yellow().bold())]
    InvalidBranchLength(String),
}

#[derive(Error, Debug)]
pub enum NameError {
    #[error("empty species pattern at line {0}")]
    EmptyPattern(usize),

    #[error("species pattern {} listed twice", .0.yellow().bold())]
    DuplicatePattern(String),

    #[error("anonymized token {} assigned to two patterns", .0.yellow().bold())]
    DuplicateToken(String),

    #[error("leaf {} matches no species pattern", .0.yellow().bold())]
    UnresolvableLeaf(String),

    #[error(
        "anonymized ID {} claimed by both {} and {}",
        .id.yellow().bold(),
        .first.yellow().bold(),
        .second.yellow().bold()
    )]
    Collision { id: String, first: String, second: String },
}

#[derive(Error, Debug)]
pub enum RangerError {
    #[error(
        "reconciliation run {} (seed {seed}, D={duplication}, T={transfer}, L={loss}) exited with {status}",
        .run.to_string().yellow().bold()
    )]
    RunFailed {
        run: usize,
        seed: u64,
        duplication: u32,
        transfer: u32,
        loss: u32,
        status: std::process::ExitStatus,
    },

    #[error("aggregation of {} exited with {status}", .prefix.yellow().bold())]
    AggregationFailed { prefix: String, status: std::process::ExitStatus },
}

#[derive(Error, Debug)]
pub enum ScogError {
    #[error("column {} not found in {}", .0.yellow().bold(), .1.yellow().bold())]
    MissingColumn(String, String),

    #[error("{} selected orthogroups have no sequence file: {}", .0.len(), .0.join(", "))]
    MissingSequences(Vec<String>),
}
