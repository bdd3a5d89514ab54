use std::path::PathBuf;

use thiserror::Error;

use crate::models::Round;

/// Failures while reading a round's cutoff tables. All of them are fatal at start-up.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read dataset file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch dataset from {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request to {url} failed with status: {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Dataset {source_name} is not valid JSON: {source}")]
    Json {
        source_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Dataset {source_name} is malformed: {reason}")]
    InvalidStructure { source_name: String, reason: String },

    #[error("No data source configured for {round}")]
    MissingSource { round: Round },
}

/// Failures of a single lookup. None of them are crashes; the caller reports them and stops.
#[derive(Debug, Error, PartialEq)]
pub enum LookupError {
    #[error("Category '{category}' not found in {round} data")]
    CategoryNotFound { category: String, round: Round },

    #[error("Please select at least one branch.")]
    NoBranchesSelected,

    #[error("Too many branches selected: {given} (at most {max})")]
    TooManyBranches { given: usize, max: usize },

    #[error("Rank {rank} is outside 1..={max}")]
    RankOutOfRange { rank: u32, max: u32 },

    #[error("Invalid rank range {low}..={high}")]
    InvalidWindow { low: u32, high: u32 },
}
