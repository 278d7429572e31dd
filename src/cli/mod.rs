//! Command-line parsing for the flow-curve fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{InputLayout, ModelKind, RateUnit, StressUnit, Weighting};

pub mod picker;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "rheo", version, about = "Rheology flow-curve fitter (HB / TC and friends)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HB + TC analysis for every sample, update the results table and write plots.
    Analyze(AnalyzeArgs),
    /// Fit one or more catalog models to a single flow curve.
    Fit(FitArgs),
    /// List the model catalog with starts and bounds.
    Models,
    /// Generate a synthetic flow curve as a long-layout CSV.
    Synth(SynthArgs),
    /// Plot a previously exported fit JSON.
    Plot(PlotArgs),
}

/// Where the data comes from and how to read it.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Input tables. Without any, pick one interactively.
    #[arg(value_name = "CSV")]
    pub inputs: Vec<PathBuf>,

    /// Table layout.
    #[arg(long, value_enum, default_value_t = InputLayout::Long)]
    pub layout: InputLayout,

    /// Sample metadata file (TOML).
    #[arg(long, env = "RHEO_SAMPLES", value_name = "TOML")]
    pub samples: Option<PathBuf>,

    /// Shear-rate unit for samples without a declared one.
    #[arg(long, value_enum, default_value_t = RateUnit::PerSecond)]
    pub unit_x: RateUnit,

    /// Stress unit for samples without a declared one.
    #[arg(long, value_enum, default_value_t = StressUnit::Pascal)]
    pub unit_y: StressUnit,

    /// Only this sample id.
    #[arg(long)]
    pub sample: Option<String>,

    /// Only this temperature (°C). Paired tables are assigned this temperature.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Sweep direction of the runs to analyze.
    #[arg(long, default_value = "inverse")]
    pub sweep_direction: String,

    /// Experiment type of the runs to analyze.
    #[arg(long, default_value = "flow_curve")]
    pub experiment_type: String,

    /// Residual weighting [default: uniform for `analyze`, relative for `fit`].
    #[arg(long, value_enum)]
    pub weighting: Option<Weighting>,

    /// Solver iteration limit per fit.
    #[arg(long, default_value_t = 200)]
    pub max_iter: usize,
}

/// Options for `rheo analyze`.
#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Results table (CSV), appended to unless `--replace`.
    #[arg(long, env = "RHEO_RESULTS", default_value = "results.csv")]
    pub results: PathBuf,

    /// Start from an empty results table.
    #[arg(long)]
    pub replace: bool,

    /// Directory for SVG/PNG figures.
    #[arg(long, env = "RHEO_PLOT_DIR", default_value = "plots")]
    pub plot_dir: PathBuf,

    /// Do not write figures.
    #[arg(long)]
    pub no_plots: bool,

    /// Print an ASCII plot per sample.
    #[arg(long)]
    pub ascii: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Write one fit JSON per model and sample into this directory.
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,
}

/// Options for `rheo fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Model(s) to fit; repeat the flag for several.
    #[arg(short = 'm', long = "model", value_enum, default_values_t = [ModelKind::Hb])]
    pub models: Vec<ModelKind>,

    /// Fit the whole catalog and rank by BIC.
    #[arg(long)]
    pub compare: bool,

    /// Series label to fit (paired layout).
    #[arg(long)]
    pub label: Option<String>,

    /// Override a start value: `name=value`.
    #[arg(long = "start", value_name = "NAME=VALUE")]
    pub starts: Vec<String>,

    /// Hold a parameter fixed: `name=value`.
    #[arg(long = "fix", value_name = "NAME=VALUE")]
    pub fixed: Vec<String>,

    /// Override bounds: `name=lower:upper` (`inf` allowed).
    #[arg(long = "bound", value_name = "NAME=LO:HI")]
    pub bounds: Vec<String>,

    /// Show the points furthest from the best fit.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export the best fit (model + params + fitted grid) to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export per-point residuals of the best fit to CSV.
    #[arg(long, value_name = "CSV")]
    pub residuals: Option<PathBuf>,

    /// Write a figure of the best fit (`.svg` or `.png`).
    #[arg(long, value_name = "FILE")]
    pub figure: Option<PathBuf>,
}

/// Options for `rheo synth`.
#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Model to sample.
    #[arg(short = 'm', long, value_enum, default_value_t = ModelKind::Hb)]
    pub model: ModelKind,

    /// Parameter values in model order (comma separated). Defaults to the catalog starts.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub params: Vec<f64>,

    #[arg(long, default_value_t = 1e-3)]
    pub rate_min: f64,

    #[arg(long, default_value_t = 1e3)]
    pub rate_max: f64,

    /// Points per run.
    #[arg(long, default_value_t = 40)]
    pub points: usize,

    /// Repeated runs of the same sample.
    #[arg(long, default_value_t = 1)]
    pub runs: usize,

    /// Relative noise level.
    #[arg(long, default_value_t = 0.02)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value = "synthetic")]
    pub sample: String,

    #[arg(long, default_value_t = 20.0)]
    pub temperature: f64,

    /// Output CSV.
    #[arg(short = 'o', long, default_value = "synthetic.csv")]
    pub output: PathBuf,
}

/// Options for plotting a saved fit.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Fit JSON file produced by `rheo fit --export`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Split `name=value`.
pub fn parse_assignment(raw: &str) -> Option<(&str, &str)> {
    let (name, value) = raw.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some((name, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_defaults() {
        let cli = Cli::try_parse_from(["rheo", "analyze", "flow.csv"]).unwrap();
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.input.inputs, vec![PathBuf::from("flow.csv")]);
        assert_eq!(args.input.layout, InputLayout::Long);
        assert_eq!(args.input.sweep_direction, "inverse");
        assert!(!args.replace);
    }

    #[test]
    fn fit_accepts_repeated_models_and_units() {
        let cli = Cli::try_parse_from([
            "rheo", "fit", "p.csv", "-m", "bingham", "-m", "tc", "--unit-y", "dynes/cm2", "--unit-x", "0.158s-1",
            "--fix", "n=0.5",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.models, vec![ModelKind::Bingham, ModelKind::Tc]);
        assert_eq!(args.input.unit_y, StressUnit::DynesPerCm2);
        assert_eq!(args.input.unit_x, RateUnit::Normalized0158);
        assert_eq!(args.fixed, vec!["n=0.5".to_string()]);
    }

    #[test]
    fn synth_params_are_comma_separated() {
        let cli = Cli::try_parse_from(["rheo", "synth", "--params", "5,2,0.5"]).unwrap();
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.params, vec![5.0, 2.0, 0.5]);
    }

    #[test]
    fn assignments_split_on_first_equals() {
        assert_eq!(parse_assignment("K = 2"), Some(("K", "2")));
        assert_eq!(parse_assignment("=2"), None);
        assert_eq!(parse_assignment("K"), None);
    }
}
