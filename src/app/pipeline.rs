//! Shared analysis pipeline used by the `analyze` and `fit` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! metadata -> ingest (units) -> run selection -> batch fit -> results table -> figures
//!
//! The command handlers can then focus on presentation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AnalysisConfig, InputLayout, MeasurementRun, SampleKey, SampleSeries};
use crate::error::AppError;
use crate::fit::{run_batch, BatchItem, BatchSummary, FitOptions, RunSelection, SampleOutcome};
use crate::io::{
    load_long_table, load_paired_table, write_fit_json, FitFile, ResultsRow, ResultsStore, RowError, SampleBook,
    UnitSpec, UnitTable,
};
use crate::math::merge_runs;
use crate::plot::{figure_path, write_png, write_svg, FlowCurvePlot};

/// Temperature assigned to paired-layout series when none is given.
pub const PAIRED_TEMPERATURE: f64 = 20.0;

/// Pixel size of written figures.
pub const FIGURE_SIZE: (u32, u32) = (1000, 750);

/// All outputs of a single `rheo analyze` run.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub outcomes: Vec<SampleOutcome>,
    pub summary: BatchSummary,
    pub results_path: PathBuf,
    /// Rows in the saved results table.
    pub results_rows: usize,
    pub figures: Vec<PathBuf>,
    pub exports: Vec<PathBuf>,
}

/// Metadata file, or an empty book when none is configured.
pub fn load_sample_book(config: &AnalysisConfig) -> Result<SampleBook, AppError> {
    match &config.samples_path {
        Some(path) => Ok(SampleBook::load(path)?),
        None => Ok(SampleBook::default()),
    }
}

pub fn fit_options(config: &AnalysisConfig) -> FitOptions {
    FitOptions {
        weighting: config.weighting,
        max_iterations: config.max_iterations,
    }
}

/// Read every input and group the selected runs per (sample, temperature).
pub fn load_batch(config: &AnalysisConfig, book: &SampleBook) -> Result<Vec<BatchItem>, AppError> {
    let units = book.unit_table(UnitSpec {
        rate: config.default_rate_unit,
        stress: config.default_stress_unit,
    });

    let items = match config.layout {
        InputLayout::Long => load_long_items(config, &units)?,
        InputLayout::Paired => load_paired_items(config, &units)?,
    };

    if items.is_empty() {
        return Err(AppError::new(3, "No samples match the selection."));
    }
    Ok(items)
}

fn load_long_items(config: &AnalysisConfig, units: &UnitTable) -> Result<Vec<BatchItem>, AppError> {
    let mut runs: Vec<MeasurementRun> = Vec::new();
    for path in &config.inputs {
        let table = load_long_table(path, units)?;
        report_row_errors(path, &table.row_errors);
        tracing::info!(
            path = %path.display(),
            rows = table.rows_read,
            used = table.rows_used,
            runs = table.runs.len(),
            "table loaded"
        );
        runs.extend(table.runs);
    }

    let selection = RunSelection {
        sweep_direction: config.sweep_direction.clone(),
        experiment_type: config.experiment_type.clone(),
    };

    let mut keys: Vec<SampleKey> = Vec::new();
    for run in &runs {
        if wanted(config, &run.key) && !keys.contains(&run.key) {
            keys.push(run.key.clone());
        }
    }

    Ok(keys
        .into_iter()
        .map(|key| {
            let selected = selection.select(&runs, &key);
            BatchItem { key, runs: selected }
        })
        .collect())
}

fn load_paired_items(config: &AnalysisConfig, units: &UnitTable) -> Result<Vec<BatchItem>, AppError> {
    let temperature = config.temperature_filter.unwrap_or(PAIRED_TEMPERATURE);
    let mut items = Vec::new();
    for path in &config.inputs {
        // Paired files carry no sample column; metadata units are keyed by file stem.
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let table = load_paired_table(path, units.for_sample(stem))?;
        report_row_errors(path, &table.row_errors);
        tracing::info!(path = %path.display(), series = table.series.len(), "table loaded");
        for series in table.series {
            let key = SampleKey::new(series.label.clone(), temperature);
            if wanted(config, &key) {
                items.push(BatchItem {
                    key,
                    runs: vec![series],
                });
            }
        }
    }
    Ok(items)
}

fn wanted(config: &AnalysisConfig, key: &SampleKey) -> bool {
    config.sample_filter.as_ref().is_none_or(|s| *s == key.sample_id)
        && config.temperature_filter.is_none_or(|t| t == key.temperature)
}

fn report_row_errors(path: &Path, errors: &[RowError]) {
    if errors.is_empty() {
        return;
    }
    tracing::warn!(path = %path.display(), skipped = errors.len(), "rows skipped");
    for e in errors.iter().take(5) {
        tracing::warn!(
            line = e.line,
            id = e.id.as_deref().unwrap_or("-"),
            "{}",
            e.message
        );
    }
}

/// The merged series of one sample (long layout) or one labelled pair
/// (paired layout), for single-curve commands.
pub fn load_single_series(
    config: &AnalysisConfig,
    book: &SampleBook,
    label: Option<&str>,
) -> Result<(SampleKey, SampleSeries), AppError> {
    let items = load_batch(config, book)?;
    let item = match label {
        Some(l) => items
            .into_iter()
            .find(|i| i.key.sample_id == l)
            .ok_or_else(|| AppError::new(3, format!("No series labelled '{l}'.")))?,
        None => {
            let mut items = items.into_iter();
            let first = items.next().ok_or_else(|| AppError::new(3, "No samples match the selection."))?;
            if items.next().is_some() {
                tracing::info!(key = %first.key, "several samples match; using the first");
            }
            first
        }
    };

    let series = merge_runs(&item.runs)?;
    if series.is_empty() {
        return Err(AppError::new(3, format!("No data for {}.", item.key)));
    }
    Ok((item.key, series))
}

/// Execute the full analysis and persist its outputs.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisRun, AppError> {
    let book = load_sample_book(config)?;
    let items = load_batch(config, &book)?;
    tracing::info!(samples = items.len(), "analyzing");

    let outcomes = run_batch(&items, &fit_options(config));
    write_outputs(config, &book, outcomes)
}

/// Persist the results rows, figures and exports of analyzed samples. Only
/// fitted samples produce output.
pub fn write_outputs(
    config: &AnalysisConfig,
    book: &SampleBook,
    outcomes: Vec<SampleOutcome>,
) -> Result<AnalysisRun, AppError> {
    let summary = BatchSummary::from_outcomes(&outcomes);

    let mut store = if config.replace {
        ResultsStore::empty()
    } else {
        ResultsStore::open(&config.results_path)?
    };

    for fits in outcomes.iter().filter_map(SampleOutcome::fitted) {
        let meta = book.get(&fits.key.sample_id);
        if store.append(ResultsRow::from_fits(fits, meta)) {
            tracing::info!(key = %fits.key, "results row replaced");
        }
    }

    // Results go to disk before any figure so a rendering failure loses none.
    store.save(&config.results_path)?;
    tracing::info!(path = %config.results_path.display(), rows = store.len(), "results table written");

    let mut figures = Vec::new();
    let mut exports = Vec::new();
    for fits in outcomes.iter().filter_map(SampleOutcome::fitted) {
        if config.plot {
            fs::create_dir_all(&config.plot_dir).map_err(|e| {
                AppError::new(5, format!("Failed to create '{}': {e}", config.plot_dir.display()))
            })?;
            let plot = FlowCurvePlot::from_fits(fits);
            let svg = figure_path(&config.plot_dir, &fits.key, "svg");
            write_svg(&svg, &plot, FIGURE_SIZE)?;
            let png = figure_path(&config.plot_dir, &fits.key, "png");
            write_png(&png, &plot, FIGURE_SIZE)?;
            figures.push(svg);
            figures.push(png);
        }

        if let Some(dir) = &config.export_dir {
            fs::create_dir_all(dir)
                .map_err(|e| AppError::new(5, format!("Failed to create '{}': {e}", dir.display())))?;
            for (tag, fit) in [("hb", &fits.hb_fit), ("tc", &fits.tc_fit)] {
                let path = dir.join(format!("fit_{}_{tag}.json", fits.key.file_stem()));
                let file = FitFile::new(fits.key.to_string(), &fits.data, fit).with_meta(book.get(&fits.key.sample_id));
                write_fit_json(&path, &file)?;
                exports.push(path);
            }
        }
    }

    Ok(AnalysisRun {
        outcomes,
        summary,
        results_path: config.results_path.clone(),
        results_rows: store.len(),
        figures,
        exports,
    })
}
