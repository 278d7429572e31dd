//! Input table resolution.
//!
//! Paths given on the command line are checked up front. Without any, the
//! user picks from the `*.csv` files found under the working directory:
//! one or more list numbers (`1,3`), `all`, or a typed path.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// How deep below the working directory tables are searched for.
const SEARCH_DEPTH: usize = 4;

/// Directories never searched: build output, VCS data and our own plots.
const SKIPPED_DIRS: [&str; 4] = [".git", "target", "node_modules", "plots"];

/// Validate the given inputs, or ask for them when none were given.
pub fn resolve_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, AppError> {
    if paths.is_empty() {
        return pick_tables();
    }
    paths.iter().map(|p| check_table_path(p)).collect()
}

/// What the user typed at the picker prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    Files(Vec<PathBuf>),
    Path(PathBuf),
    Quit,
    /// Message to show before asking again.
    Retry(String),
}

/// Interpret one line of picker input against the listed files.
pub fn parse_choice(input: &str, listed: &[PathBuf]) -> Choice {
    let input = input.trim();
    if input.is_empty() {
        return Choice::Retry("Nothing selected.".to_string());
    }
    if input.eq_ignore_ascii_case("q") {
        return Choice::Quit;
    }
    if input.eq_ignore_ascii_case("all") {
        return Choice::Files(listed.to_vec());
    }

    let numbers: Result<Vec<usize>, _> = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<usize>)
        .collect();
    match numbers {
        Ok(numbers) => {
            let mut picked = Vec::new();
            for n in numbers {
                let Some(path) = n.checked_sub(1).and_then(|i| listed.get(i)) else {
                    return Choice::Retry(format!("No file numbered {n} (1-{}).", listed.len()));
                };
                if !picked.contains(path) {
                    picked.push(path.clone());
                }
            }
            Choice::Files(picked)
        }
        Err(_) => Choice::Path(PathBuf::from(input)),
    }
}

fn pick_tables() -> Result<Vec<PathBuf>, AppError> {
    let listed = discover_tables(Path::new("."));
    if listed.is_empty() {
        return Err(AppError::new(
            2,
            "No .csv files found. Pass one with `rheo analyze <file.csv>`.",
        ));
    }

    println!("Found {} CSV file(s):", listed.len());
    for (i, path) in listed.iter().enumerate() {
        println!("{:>3}) {}", i + 1, display_path(path));
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("Tables to analyze (e.g. 1,3 or all), a path, or q: ");
        io::stdout()
            .flush()
            .map_err(|e| AppError::new(2, format!("Failed to write prompt: {e}")))?;

        let line = match lines.next() {
            Some(line) => line.map_err(|e| AppError::new(2, format!("Failed to read input: {e}")))?,
            None => {
                return Err(AppError::new(
                    2,
                    "No input received. Pass a CSV path with `rheo analyze <file.csv>`.",
                ));
            }
        };

        match parse_choice(&line, &listed) {
            Choice::Files(files) => return Ok(files),
            Choice::Path(path) => match check_table_path(&path) {
                Ok(path) => return Ok(vec![path]),
                Err(err) => println!("{err}"),
            },
            Choice::Quit => return Err(AppError::new(2, "Canceled.")),
            Choice::Retry(message) => println!("{message}"),
        }
    }
}

/// The path must name an existing `.csv` file.
pub fn check_table_path(path: &Path) -> Result<PathBuf, AppError> {
    if path.is_dir() {
        return Err(AppError::new(2, format!("Expected a file, got a directory: {}", path.display())));
    }
    if !path.is_file() {
        return Err(AppError::new(2, format!("CSV file not found: {}", path.display())));
    }
    if !has_csv_extension(path) {
        return Err(AppError::new(2, format!("Expected a .csv file (got: {}).", path.display())));
    }
    Ok(path.to_path_buf())
}

/// `*.csv` files under `root`, sorted by displayed path.
pub fn discover_tables(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![(root.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = pending.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(kind) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if kind.is_dir() {
                if depth < SEARCH_DEPTH && !is_skipped(&path) {
                    pending.push((path, depth + 1));
                }
            } else if kind.is_file() && has_csv_extension(&path) {
                found.push(path);
            }
        }
    }

    found.sort_by_key(|p| display_path(p));
    found
}

fn has_csv_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn is_skipped(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| SKIPPED_DIRS.contains(&n))
}

fn display_path(path: &Path) -> String {
    path.strip_prefix("./").unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed() -> Vec<PathBuf> {
        vec![PathBuf::from("a.csv"), PathBuf::from("b.csv"), PathBuf::from("c.csv")]
    }

    #[test]
    fn discovery_is_sorted_and_skips_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("runs")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::create_dir_all(root.join("plots")).unwrap();
        fs::write(root.join("runs").join("b.csv"), "").unwrap();
        fs::write(root.join("a.CSV"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();
        fs::write(root.join("target").join("c.csv"), "").unwrap();
        fs::write(root.join("plots").join("d.csv"), "").unwrap();

        let names: Vec<_> = discover_tables(root)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a.CSV", "b.csv"]);
    }

    #[test]
    fn choices_accept_lists_all_and_paths() {
        let files = listed();
        assert_eq!(
            parse_choice("3, 1,3", &files),
            Choice::Files(vec![PathBuf::from("c.csv"), PathBuf::from("a.csv")])
        );
        assert_eq!(parse_choice("ALL", &files), Choice::Files(files.clone()));
        assert_eq!(parse_choice(" q ", &files), Choice::Quit);
        assert_eq!(parse_choice("data/x.csv", &files), Choice::Path(PathBuf::from("data/x.csv")));
        assert!(matches!(parse_choice("0", &files), Choice::Retry(_)));
        assert!(matches!(parse_choice("4", &files), Choice::Retry(_)));
        assert!(matches!(parse_choice("", &files), Choice::Retry(_)));
    }

    #[test]
    fn given_paths_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("data.txt");
        fs::write(&txt, "").unwrap();

        assert_eq!(check_table_path(&dir.path().join("nope.csv")).unwrap_err().exit_code(), 2);
        assert!(check_table_path(&txt).is_err());
        assert!(check_table_path(dir.path()).is_err());

        let csv = dir.path().join("flow.csv");
        fs::write(&csv, "").unwrap();
        assert_eq!(resolve_inputs(&[csv.clone()]).unwrap(), vec![csv]);
    }
}
