mod analyzer;
mod error;
mod loader;
mod models;

use analyzer::{CollegeFinder, LookupOutcome, LookupRequest};
use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use error::LookupError;
use loader::DatasetLoader;
use models::{display_label, format_cutoff, Config, DatasetStore, ResultTable, Round, MAX_RANK};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

const RESULTS_CSV: &str = "college_finder_results.csv";

fn cli() -> Command {
    Command::new("college-finder")
        .version("1.0")
        .about("Finds colleges within reach of a CET rank using round 1 and round 2 cutoffs")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .value_name("SECRET")
                .help("Access password; when omitted it is read from stdin, and the typed input is echoed"),
        )
        .arg(
            Arg::new("category")
                .long("category")
                .value_name("NAME")
                .help("Admission category, e.g. GM"),
        )
        .arg(
            Arg::new("rank")
                .short('r')
                .long("rank")
                .value_name("RANK")
                .help("CET rank")
                .value_parser(value_parser!(u32).range(1..=MAX_RANK as i64))
                .default_value("5000"),
        )
        .arg(
            Arg::new("branch")
                .short('b')
                .long("branch")
                .value_name("CODE")
                .help("Branch to look up; repeat for several (defaults to the configured branches)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("rank-low")
                .long("rank-low")
                .value_name("RANK")
                .help("Lower end of the cutoff range (default: rank - 1000)")
                .value_parser(value_parser!(u32).range(0..=MAX_RANK as i64)),
        )
        .arg(
            Arg::new("rank-high")
                .long("rank-high")
                .value_name("RANK")
                .help("Upper end of the cutoff range (default: rank + 1000)")
                .value_parser(value_parser!(u32).range(0..=MAX_RANK as i64)),
        )
        .arg(
            Arg::new("list-categories")
                .long("list-categories")
                .help("Print the known categories and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-branches")
                .long("list-branches")
                .help("Print the configured branch options and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-csv")
                .long("no-csv")
                .help("Do not write the CSV report")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let matches = cli().get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!("⚠️  Please edit {} and set app_password, then run the program again.", config_file);
        return Ok(());
    };

    if config.app_password.is_empty() {
        println!("❌ Error: app_password is empty in configuration file");
        println!("   Please edit {} and set the password", config_file);
        return Ok(());
    }

    // Password gate comes before any data is touched
    let password = match matches.get_one::<String>("password") {
        Some(p) => p.clone(),
        None => prompt_password()?,
    };
    if !config.check_password(&password) {
        bail!("Incorrect password");
    }

    if matches.get_flag("list-branches") {
        println!("🎯 Branch options:");
        for branch in &config.branch_options {
            println!("   - {}", display_label(branch));
        }
        return Ok(());
    }

    let loader = DatasetLoader::new();
    let round1 = loader
        .load_round(&config, Round::First)
        .await
        .context("Failed to load round 1 cutoffs")?;
    let round2 = loader
        .load_round(&config, Round::Second)
        .await
        .context("Failed to load round 2 cutoffs")?;
    println!("   ✅ Loaded {} categories (round 1), {} categories (round 2)", round1.len(), round2.len());
    let store = DatasetStore::new(round1, round2);

    if matches.get_flag("list-categories") {
        print_categories(&store);
        return Ok(());
    }

    let Some(category) = matches.get_one::<String>("category") else {
        println!("❌ Error: no category given (use --category)");
        print_categories(&store);
        return Ok(());
    };

    let branches: Vec<String> = match matches.get_many::<String>("branch") {
        Some(values) => values.cloned().collect(),
        None => config.default_branches.clone(),
    };

    let request = LookupRequest {
        category: category.clone(),
        branches,
        rank: matches
            .get_one::<u32>("rank")
            .copied()
            .expect("--rank has a default value"),
        rank_low: matches.get_one::<u32>("rank-low").copied(),
        rank_high: matches.get_one::<u32>("rank-high").copied(),
    };
    let window = request.window();

    println!(
        "🔍 Finding colleges for category {} at rank {} (cutoffs {}–{})",
        request.category, request.rank, window.low, window.high
    );
    println!(
        "🎯 Branches: {}",
        request
            .branches
            .iter()
            .map(|b| display_label(b))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let finder = CollegeFinder::new(&store, config.max_branches);
    let table = match finder.find_colleges(&request) {
        Ok(LookupOutcome::Found(table)) => table,
        Ok(LookupOutcome::NoCollegesFound) => {
            println!("\nNo colleges found for the given criteria.");
            return Ok(());
        }
        Err(LookupError::NoBranchesSelected) => {
            println!("⚠️  Please select at least one branch.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("\n📊 Matching Colleges Across Branches");
    println!("====================================\n");
    print!("{}", render_result_table(&table));
    println!("\n   {} colleges", table.colleges().count());

    if !matches.get_flag("no-csv") {
        let output_dir = config.output_directory.as_deref().unwrap_or("output");
        let csv_path = generate_results_csv(&table, Path::new(output_dir))?;
        println!("📄 Results written to: {}", csv_path.display());
    }

    Ok(())
}

fn prompt_password() -> Result<String> {
    print!("🔑 Enter password (input is visible): ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line)
}

fn print_categories(store: &DatasetStore) {
    println!("📚 Categories:");
    for category in store.round1.categories() {
        println!("   - {}", category);
    }
}

/// Plain-text grid: one row per college, `-` where there is no cutoff.
fn render_result_table(table: &ResultTable) -> String {
    let mut header = vec!["College".to_string()];
    header.extend(table.columns.iter().map(|c| display_label(c)));

    let body: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            std::iter::once(row.college.clone())
                .chain(row.cells.iter().map(|cell| match cell {
                    Some(v) => format_cutoff(*v),
                    None => "-".to_string(),
                }))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            std::iter::once(&header[i])
                .chain(body.iter().map(|r| &r[i]))
                .map(|s| s.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_line = |cells: &[String]| {
        let line = cells
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                if i == 0 {
                    format!("{:<width$}", cell, width = width)
                } else {
                    format!("{:>width$}", cell, width = width)
                }
            })
            .collect::<Vec<_>>()
            .join("  ");
        format!("{}\n", line.trim_end())
    };

    let mut content = format_line(header.as_slice());
    content.push_str(&format!("{}\n", "-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1))));
    for row in &body {
        content.push_str(&format_line(row.as_slice()));
    }
    content
}

fn generate_results_csv(table: &ResultTable, output_dir: &Path) -> Result<PathBuf> {
    use csv::Writer;

    fs::create_dir_all(output_dir)?;
    let csv_path = output_dir.join(RESULTS_CSV);
    let mut writer = Writer::from_path(&csv_path)?;

    let mut header = vec!["College".to_string()];
    header.extend(table.columns.iter().map(|c| display_label(c)));
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.college.clone()];
        record.extend(row.cells.iter().map(|cell| cell.map(format_cutoff).unwrap_or_default()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(csv_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultRow;

    fn sample_table() -> ResultTable {
        ResultTable {
            columns: vec![
                "AI Artificial\nIntelligence R1".to_string(),
                "AI Artificial\nIntelligence R2".to_string(),
            ],
            rows: vec![
                ResultRow {
                    college: "E001".to_string(),
                    cells: vec![Some(4500.0), None],
                },
                ResultRow {
                    college: "E017".to_string(),
                    cells: vec![None, Some(5900.0)],
                },
            ],
        }
    }

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_cli_parses_lookup_arguments() {
        let matches = cli()
            .try_get_matches_from([
                "college-finder",
                "--category",
                "GM",
                "-r",
                "4200",
                "-b",
                "CS Computers",
                "-b",
                "electronics",
                "--rank-high",
                "9000",
            ])
            .unwrap();

        assert_eq!(matches.get_one::<String>("category").unwrap(), "GM");
        assert_eq!(matches.get_one::<u32>("rank").copied(), Some(4200));
        assert_eq!(
            matches.get_many::<String>("branch").unwrap().collect::<Vec<_>>(),
            vec!["CS Computers", "electronics"]
        );
        assert_eq!(matches.get_one::<u32>("rank-low"), None);
        assert_eq!(matches.get_one::<u32>("rank-high").copied(), Some(9000));
    }

    #[test]
    fn test_cli_rank_defaults_to_5000() {
        let matches = cli().try_get_matches_from(["college-finder"]).unwrap();
        assert_eq!(matches.get_one::<u32>("rank").copied(), Some(5000));
    }

    #[test]
    fn test_password_help_warns_about_echo() {
        let cmd = cli();
        let help = cmd
            .get_arguments()
            .find(|arg| arg.get_id().as_str() == "password")
            .and_then(|arg| arg.get_help())
            .map(|h| h.to_string())
            .unwrap();
        assert!(help.contains("echoed"));
    }

    #[test]
    fn test_cli_rejects_out_of_range_rank() {
        assert!(cli().try_get_matches_from(["college-finder", "-r", "0"]).is_err());
        assert!(cli().try_get_matches_from(["college-finder", "-r", "200001"]).is_err());
        assert!(cli()
            .try_get_matches_from(["college-finder", "--rank-low", "0"])
            .is_ok());
    }

    #[test]
    fn test_render_result_table() {
        let rendered = render_result_table(&sample_table());
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("College"));
        assert!(lines[0].contains("AI Artificial Intelligence R1"));
        assert!(lines[1].chars().all(|c| c == '-'));
        assert!(lines[2].starts_with("E001"));
        assert!(lines[2].contains("4500"));
        assert!(lines[2].trim_end().ends_with('-'));
        assert!(lines[3].trim_end().ends_with("5900"));
    }

    #[test]
    fn test_generate_results_csv() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let path = generate_results_csv(&sample_table(), &out).unwrap();
        assert_eq!(path, out.join(RESULTS_CSV));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["College", "AI Artificial Intelligence R1", "AI Artificial Intelligence R2"]
        );

        let records: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        assert_eq!(records[0], vec!["E001", "4500", ""]);
        assert_eq!(records[1], vec!["E017", "", "5900"]);
    }
}
