use crate::error::LoadError;
use crate::models::{Config, CutoffTable, DataSourceMode, Dataset, Round};
use log::{debug, warn};
use regex::{Captures, Regex};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Reads the per-round cutoff documents: `{ category: {index, columns, data} }`,
/// i.e. one pandas "split" payload per category.
pub struct DatasetLoader {
    client: reqwest::Client,
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Load one round from wherever the configuration points.
    pub async fn load_round(&self, config: &Config, round: Round) -> Result<Dataset, LoadError> {
        let (path, url) = match round {
            Round::First => (&config.round1_path, &config.round1_url),
            Round::Second => (&config.round2_path, &config.round2_url),
        };

        let dataset = match config.data_source_mode {
            DataSourceMode::Local => {
                let path = path.as_deref().ok_or(LoadError::MissingSource { round })?;
                println!("📂 Reading {} cutoffs from: {}", round, path);
                self.load_file(Path::new(path))?
            }
            DataSourceMode::Internet => {
                let url = url.as_deref().ok_or(LoadError::MissingSource { round })?;
                self.load_url(url).await?
            }
        };

        if dataset.is_empty() {
            warn!("{} data has no categories", round);
        }
        Ok(dataset)
    }

    pub fn load_file(&self, path: &Path) -> Result<Dataset, LoadError> {
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        parse_content(&content, &path.display().to_string())
    }

    pub async fn load_url(&self, url: &str) -> Result<Dataset, LoadError> {
        println!("🌐 Fetching cutoffs from: {}", url);

        let http_err = |source| LoadError::Http {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(http_err)?;

        if !response.status().is_success() {
            return Err(LoadError::HttpStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let content = response.text().await.map_err(http_err)?;
        parse_content(&content, url)
    }
}

/// Parse a whole round document. `source_name` only feeds error messages.
pub fn parse_content(content: &str, source_name: &str) -> Result<Dataset, LoadError> {
    let content = null_out_non_finite(content);
    let root: JsonValue = serde_json::from_str(&content).map_err(|source| LoadError::Json {
        source_name: source_name.to_string(),
        source,
    })?;

    let invalid = |reason: String| LoadError::InvalidStructure {
        source_name: source_name.to_string(),
        reason,
    };

    let categories = root
        .as_object()
        .ok_or_else(|| invalid("expected a top-level object of category tables".to_string()))?;

    let mut tables = BTreeMap::new();
    for (category, payload) in categories {
        let table = parse_table(payload).map_err(|reason| invalid(format!("category '{category}': {reason}")))?;
        debug!(
            "{}: category '{}' has {} branches × {} colleges",
            source_name,
            category,
            table.branches().len(),
            table.colleges().len()
        );
        tables.insert(category.clone(), table);
    }

    Ok(Dataset::from_tables(tables))
}

fn parse_table(payload: &JsonValue) -> Result<CutoffTable, String> {
    let obj = payload
        .as_object()
        .ok_or_else(|| "payload is not an object".to_string())?;

    let branches = labels(obj, "index")?;
    let colleges = labels(obj, "columns")?;

    let cells = required_array(obj, "data")?
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.as_array()
                .map(|cells| cells.iter().map(coerce_cell).collect::<Vec<_>>())
                .ok_or_else(|| format!("data row {i} is not an array"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    CutoffTable::from_parts(branches, colleges, cells)
}

fn required_array<'a>(obj: &'a Map<String, JsonValue>, key: &str) -> Result<&'a Vec<JsonValue>, String> {
    obj.get(key)
        .ok_or_else(|| format!("missing '{key}'"))?
        .as_array()
        .ok_or_else(|| format!("'{key}' is not an array"))
}

fn labels(obj: &Map<String, JsonValue>, key: &str) -> Result<Vec<String>, String> {
    required_array(obj, key)?
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            JsonValue::String(s) => Ok(s.clone()),
            JsonValue::Number(n) => Ok(n.to_string()),
            other => Err(format!("'{key}'[{i}] is not a label: {other}")),
        })
        .collect()
}

/// Cell → cutoff rank. Numbers and numeric strings count; anything else is "no data".
pub fn coerce_cell(val: &JsonValue) -> Option<f64> {
    let value = match val {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    (value.is_finite() && value >= 0.0).then_some(value)
}

/// `json.dump` writes bare `NaN` / `Infinity` / `-Infinity`, which strict JSON
/// parsers reject. Replace them with `null`, leaving string literals untouched.
fn null_out_non_finite(content: &str) -> std::borrow::Cow<'_, str> {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    let re = TOKENS.get_or_init(|| {
        Regex::new(r#""(?:[^"\\]|\\.)*"|-?Infinity|NaN"#).expect("static regex")
    });

    re.replace_all(content, |caps: &Captures| {
        let token = &caps[0];
        if token.starts_with('"') {
            token.to_string()
        } else {
            "null".to_string()
        }
    })
}
