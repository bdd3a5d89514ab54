use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Highest rank the CET rank lists go up to.
pub const MAX_RANK: u32 = 200_000;

/// Distance on either side of the candidate's rank used when no explicit range is given.
pub const DEFAULT_WINDOW_SPAN: u32 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_password: String,
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub round1_path: Option<String>,
    pub round2_path: Option<String>,
    pub round1_url: Option<String>,
    pub round2_url: Option<String>,
    pub branch_options: Vec<String>,
    pub default_branches: Vec<String>,
    pub max_branches: usize,
    pub output_directory: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_password: "".to_string(),
            data_source_mode: DataSourceMode::Local,
            round1_path: Some("data/category_tables.json".to_string()),
            round2_path: Some("data/category_tables_2ext.json".to_string()),
            round1_url: None,
            round2_url: None,
            branch_options: vec![
                "AI Artificial\nIntelligence".to_string(),
                "CF CS(Artificial\nIntel.)".to_string(),
                "CS Computers".to_string(),
                "DL B.TECH IN CS".to_string(),
                "EC Electronics".to_string(),
                "EE Electrical".to_string(),
                "IE Info.Science".to_string(),
            ],
            default_branches: vec!["CS Computers".to_string()],
            max_branches: 4,
            output_directory: Some("output".to_string()),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    /// Shared-secret gate in front of every lookup.
    pub fn check_password(&self, given: &str) -> bool {
        !self.app_password.is_empty() && given.trim_end_matches(['\r', '\n']) == self.app_password
    }
}

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Round {
    First,
    Second,
}

impl Round {
    pub const ALL: [Round; 2] = [Round::First, Round::Second];

    /// Column suffix used in the result table.
    pub fn suffix(self) -> &'static str {
        match self {
            Round::First => "R1",
            Round::Second => "R2",
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Round::First => write!(f, "round 1"),
            Round::Second => write!(f, "round 2"),
        }
    }
}

// ---------------------------------------------------------------------------
// RankWindow
// ---------------------------------------------------------------------------

/// Inclusive `[low, high]` band of cutoff ranks that count as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankWindow {
    pub low: u32,
    pub high: u32,
}

impl RankWindow {
    /// `[rank - 1000, rank + 1000]` clamped to `[0, MAX_RANK]`.
    pub fn around(rank: u32) -> Self {
        Self {
            low: rank.saturating_sub(DEFAULT_WINDOW_SPAN),
            high: rank.saturating_add(DEFAULT_WINDOW_SPAN).min(MAX_RANK),
        }
    }

    /// Each missing bound falls back to its default independently.
    pub fn with_bounds(rank: u32, low: Option<u32>, high: Option<u32>) -> Self {
        let default = Self::around(rank);
        Self {
            low: low.unwrap_or(default.low),
            high: high.unwrap_or(default.high),
        }
    }

    pub fn contains(&self, cutoff: f64) -> bool {
        cutoff >= self.low as f64 && cutoff <= self.high as f64
    }
}

// ---------------------------------------------------------------------------
// CutoffTable – one (round, category) table
// ---------------------------------------------------------------------------

/// Branch × college grid of cutoff ranks. Row and column order is the stored order.
#[derive(Debug, Clone, PartialEq)]
pub struct CutoffTable {
    branches: Vec<String>,
    colleges: Vec<String>,
    cells: Vec<Vec<Option<f64>>>,
}

impl CutoffTable {
    /// Assemble a table, checking that `cells` is `branches.len()` rows of
    /// `colleges.len()` cells each.
    pub fn from_parts(
        branches: Vec<String>,
        colleges: Vec<String>,
        cells: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, String> {
        if cells.len() != branches.len() {
            return Err(format!(
                "{} branch labels but {} data rows",
                branches.len(),
                cells.len()
            ));
        }
        if let Some((i, row)) = cells
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != colleges.len())
        {
            return Err(format!(
                "data row {i} has {} cells, expected {}",
                row.len(),
                colleges.len()
            ));
        }
        Ok(Self {
            branches,
            colleges,
            cells,
        })
    }

    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    pub fn colleges(&self) -> &[String] {
        &self.colleges
    }

    /// Map a requested branch code onto a row label.
    ///
    /// An exact label wins; otherwise the first label (in stored order) that
    /// contains the query case-insensitively. `None` when nothing matches.
    pub fn resolve_branch(&self, query: &str) -> Option<&str> {
        if let Some(exact) = self.branches.iter().find(|b| b.as_str() == query) {
            return Some(exact.as_str());
        }
        let needle = query.to_lowercase();
        self.branches
            .iter()
            .find(|b| b.to_lowercase().contains(&needle))
            .map(|b| b.as_str())
    }

    /// Numeric cutoffs of one row, absent cells skipped.
    pub fn branch_cutoffs<'a>(&'a self, branch: &str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        let row = self
            .branches
            .iter()
            .position(|b| b == branch)
            .map(|i| self.cells[i].as_slice())
            .unwrap_or(&[]);
        self.colleges
            .iter()
            .zip(row.iter())
            .filter_map(|(college, cell)| cell.map(|v| (college.as_str(), v)))
    }

    pub fn cutoff(&self, branch: &str, college: &str) -> Option<f64> {
        let row = self.branches.iter().position(|b| b == branch)?;
        let col = self.colleges.iter().position(|c| c == college)?;
        self.cells[row][col]
    }
}

// ---------------------------------------------------------------------------
// Dataset / DatasetStore
// ---------------------------------------------------------------------------

/// All category tables of one round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    tables: BTreeMap<String, CutoffTable>,
}

impl Dataset {
    pub fn from_tables(tables: BTreeMap<String, CutoffTable>) -> Self {
        Self { tables }
    }

    pub fn get(&self, category: &str) -> Option<&CutoffTable> {
        self.tables.get(category)
    }

    /// Category names, sorted.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Both rounds, loaded once at start-up and read-only afterwards.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    pub round1: Dataset,
    pub round2: Dataset,
}

impl DatasetStore {
    pub fn new(round1: Dataset, round2: Dataset) -> Self {
        Self { round1, round2 }
    }

    pub fn round(&self, round: Round) -> &Dataset {
        match round {
            Round::First => &self.round1,
            Round::Second => &self.round2,
        }
    }
}

// ---------------------------------------------------------------------------
// ResultTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub college: String,
    /// One cell per entry in `ResultTable::columns`.
    pub cells: Vec<Option<f64>>,
}

/// Per-branch round-1/round-2 cutoffs for the qualifying colleges.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn colleges(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.college.as_str())
    }
}

/// Collapse runs of whitespace (labels in the source tables carry embedded newlines).
pub fn display_label(label: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(label.trim(), " ").into_owned()
}

/// Cutoffs are ranks, so whole numbers print without a fraction.
pub fn format_cutoff(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as u64)
    } else {
        format!("{:.1}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CutoffTable {
        CutoffTable::from_parts(
            vec![
                "AI Artificial\nIntelligence".to_string(),
                "CS Computers".to_string(),
                "DL B.TECH IN CS".to_string(),
            ],
            vec!["E001".to_string(), "E002".to_string()],
            vec![
                vec![Some(1200.0), None],
                vec![Some(4500.0), Some(7000.0)],
                vec![None, Some(5100.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_window_defaults() {
        assert_eq!(RankWindow::around(5000), RankWindow { low: 4000, high: 6000 });
        assert_eq!(RankWindow::around(500), RankWindow { low: 0, high: 1500 });
        assert_eq!(
            RankWindow::around(199_500),
            RankWindow { low: 198_500, high: 200_000 }
        );
    }

    #[test]
    fn test_window_partial_bounds() {
        let w = RankWindow::with_bounds(5000, Some(100), None);
        assert_eq!(w, RankWindow { low: 100, high: 6000 });
        let w = RankWindow::with_bounds(5000, None, Some(9000));
        assert_eq!(w, RankWindow { low: 4000, high: 9000 });
    }

    #[test]
    fn test_window_is_inclusive() {
        let w = RankWindow::around(5000);
        assert!(w.contains(4000.0));
        assert!(w.contains(6000.0));
        assert!(!w.contains(3999.5));
        assert!(!w.contains(6000.5));
    }

    #[test]
    fn test_resolve_exact_label_is_identity() {
        let t = table();
        for label in t.branches() {
            assert_eq!(t.resolve_branch(label), Some(label.as_str()));
        }
    }

    #[test]
    fn test_resolve_substring_case_insensitive() {
        let t = table();
        assert_eq!(t.resolve_branch("computers"), Some("CS Computers"));
        assert_eq!(t.resolve_branch("ARTIFICIAL"), Some("AI Artificial\nIntelligence"));
        assert_eq!(t.resolve_branch("Mechanical"), None);
    }

    #[test]
    fn test_resolve_takes_first_match_in_stored_order() {
        // "cs" is contained in both "CS Computers" and "DL B.TECH IN CS".
        let t = table();
        assert_eq!(t.resolve_branch("cs"), Some("CS Computers"));
    }

    #[test]
    fn test_branch_cutoffs_skip_absent_cells() {
        let t = table();
        let cutoffs: Vec<_> = t.branch_cutoffs("DL B.TECH IN CS").collect();
        assert_eq!(cutoffs, vec![("E002", 5100.0)]);
        assert_eq!(t.branch_cutoffs("missing").count(), 0);
        assert_eq!(t.cutoff("CS Computers", "E002"), Some(7000.0));
        assert_eq!(t.cutoff("AI Artificial\nIntelligence", "E002"), None);
    }

    #[test]
    fn test_from_parts_rejects_ragged_rows() {
        let err = CutoffTable::from_parts(
            vec!["CS".to_string()],
            vec!["E001".to_string(), "E002".to_string()],
            vec![vec![Some(1.0)]],
        )
        .unwrap_err();
        assert!(err.contains("expected 2"));

        let err = CutoffTable::from_parts(vec!["CS".to_string()], vec![], vec![]).unwrap_err();
        assert!(err.contains("1 branch labels but 0 data rows"));
    }

    #[test]
    fn test_password_gate() {
        let mut config = Config::default();
        assert!(!config.check_password(""));
        config.app_password = "s3cret".to_string();
        assert!(config.check_password("s3cret\n"));
        assert!(!config.check_password("S3cret"));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        Config::default().save_to_file(path).unwrap();
        let loaded = Config::load_from_file(path).unwrap();
        assert_eq!(loaded.data_source_mode, DataSourceMode::Local);
        assert_eq!(loaded.max_branches, 4);
        assert_eq!(loaded.branch_options.len(), 7);
        assert_eq!(loaded.default_branches, vec!["CS Computers".to_string()]);
    }

    #[test]
    fn test_display_helpers() {
        assert_eq!(display_label("AI Artificial\nIntelligence"), "AI Artificial Intelligence");
        assert_eq!(format_cutoff(4500.0), "4500");
        assert_eq!(format_cutoff(4500.5), "4500.5");
    }
}
