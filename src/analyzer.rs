use crate::error::LookupError;
use crate::models::{CutoffTable, DatasetStore, RankWindow, ResultRow, ResultTable, Round, MAX_RANK};
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One "Find Colleges" request.
#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub category: String,
    pub branches: Vec<String>,
    pub rank: u32,
    pub rank_low: Option<u32>,
    pub rank_high: Option<u32>,
}

impl LookupRequest {
    pub fn window(&self) -> RankWindow {
        RankWindow::with_bounds(self.rank, self.rank_low, self.rank_high)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(ResultTable),
    NoCollegesFound,
}

pub struct CollegeFinder<'a> {
    pub store: &'a DatasetStore,
    pub max_branches: usize,
}

impl<'a> CollegeFinder<'a> {
    pub fn new(store: &'a DatasetStore, max_branches: usize) -> Self {
        Self {
            store,
            max_branches,
        }
    }

    /// Validate the request, find qualifying colleges and build the merged table.
    pub fn find_colleges(&self, request: &LookupRequest) -> Result<LookupOutcome, LookupError> {
        if request.branches.is_empty() {
            return Err(LookupError::NoBranchesSelected);
        }
        if request.branches.len() > self.max_branches {
            return Err(LookupError::TooManyBranches {
                given: request.branches.len(),
                max: self.max_branches,
            });
        }
        if request.rank == 0 || request.rank > MAX_RANK {
            return Err(LookupError::RankOutOfRange {
                rank: request.rank,
                max: MAX_RANK,
            });
        }

        let window = request.window();
        if window.low > window.high || window.high > MAX_RANK {
            return Err(LookupError::InvalidWindow {
                low: window.low,
                high: window.high,
            });
        }
        debug!(
            "Looking up category '{}' rank {} in {}..={}",
            request.category, request.rank, window.low, window.high
        );

        let colleges = self.resolve_qualifying_colleges(&request.category, &request.branches, window)?;
        if colleges.is_empty() {
            return Ok(LookupOutcome::NoCollegesFound);
        }

        let table = self.build_result_table(&request.category, &request.branches, &colleges)?;
        Ok(LookupOutcome::Found(table))
    }

    /// Colleges with a cutoff inside `window` for any requested branch in either round.
    pub fn resolve_qualifying_colleges(
        &self,
        category: &str,
        branches: &[String],
        window: RankWindow,
    ) -> Result<BTreeSet<String>, LookupError> {
        let tables = self.category_tables(category)?;
        let mut qualifying = BTreeSet::new();

        for branch in branches {
            for (round, table) in Round::ALL.into_iter().zip(tables) {
                let Some(label) = resolve(table, branch, round) else {
                    continue;
                };

                qualifying.extend(
                    table
                        .branch_cutoffs(label)
                        .filter(|(_, cutoff)| window.contains(*cutoff))
                        .map(|(college, _)| college.to_string()),
                );
            }
        }

        Ok(qualifying)
    }

    /// Round-1/round-2 cutoff columns per branch for `colleges`, outer-joined on college.
    ///
    /// Rows are sorted by the first column ascending; colleges without a value
    /// there go last, and ties fall back to the college identifier.
    pub fn build_result_table(
        &self,
        category: &str,
        branches: &[String],
        colleges: &BTreeSet<String>,
    ) -> Result<ResultTable, LookupError> {
        let tables = self.category_tables(category)?;

        // (column label, table, resolved row label) per output column
        let mut blocks: Vec<(String, &CutoffTable, Option<&str>)> = Vec::new();
        for branch in branches {
            let resolved = [
                resolve(tables[0], branch, Round::First),
                resolve(tables[1], branch, Round::Second),
            ];
            let Some(fallback) = resolved[0].or(resolved[1]) else {
                continue;
            };

            for ((round, table), label) in Round::ALL.into_iter().zip(tables).zip(resolved) {
                let column = format!("{} {}", label.unwrap_or(fallback), round.suffix());
                // a column is kept or skipped on its own, never as part of its branch's pair
                if blocks.iter().any(|(existing, _, _)| *existing == column) {
                    debug!("{}: column '{}' already present, skipping", round, column);
                    continue;
                }
                blocks.push((column, table, label));
            }
        }

        let mut rows: Vec<ResultRow> = colleges
            .iter()
            .map(|college| ResultRow {
                college: college.clone(),
                cells: blocks
                    .iter()
                    .map(|(_, table, label)| label.and_then(|l| table.cutoff(l, college)))
                    .collect(),
            })
            .filter(|row| row.cells.iter().any(Option::is_some))
            .collect();

        rows.sort_by(|a, b| {
            compare_absent_last(a.cells.first().copied().flatten(), b.cells.first().copied().flatten())
                .then_with(|| a.college.cmp(&b.college))
        });

        Ok(ResultTable {
            columns: blocks.into_iter().map(|(column, _, _)| column).collect(),
            rows,
        })
    }

    /// Both rounds' tables for `category`; missing in either is an error.
    fn category_tables(&self, category: &str) -> Result<[&'a CutoffTable; 2], LookupError> {
        let store = self.store;
        let lookup = |round: Round| {
            store
                .round(round)
                .get(category)
                .ok_or_else(|| LookupError::CategoryNotFound {
                    category: category.to_string(),
                    round,
                })
        };
        Ok([lookup(Round::First)?, lookup(Round::Second)?])
    }
}

fn resolve<'t>(table: &'t CutoffTable, branch: &str, round: Round) -> Option<&'t str> {
    let resolved = table.resolve_branch(branch);
    match resolved {
        Some(label) if label != branch => debug!("{}: '{}' resolved to '{}'", round, branch, label),
        Some(_) => {}
        None => warn!("{}: no branch matching '{}', skipping", round, branch),
    }
    resolved
}

fn compare_absent_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
