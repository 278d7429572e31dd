//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs logging
//! - parses CLI arguments
//! - runs the batch analysis or single-curve fits
//! - prints reports/plots
//! - writes optional exports

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{parse_assignment, picker, AnalyzeArgs, Cli, Command, FitArgs, InputArgs, PlotArgs, SynthArgs};
use crate::domain::{AnalysisConfig, SampleKey, Weighting};
use crate::error::AppError;
use crate::fit::FitOptions;
use crate::models::{catalog, ModelDescriptor};

pub mod pipeline;

/// Entry point for the `rheo` binary.
pub fn run() -> Result<(), AppError> {
    // A missing `.env` is the normal case.
    let _ = dotenvy::dotenv();
    crate::logging::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Fit(args) => handle_fit(args),
        Command::Models => handle_models(),
        Command::Synth(args) => handle_synth(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let inputs = picker::resolve_inputs(&args.input.inputs)?;
    let config = analysis_config_from_args(&args, inputs);
    let run = pipeline::run_analysis(&config)?;

    for fits in run.outcomes.iter().filter_map(|o| o.fitted()) {
        println!("{}", crate::report::format_sample(fits));
        if config.ascii_plot {
            let mut markers = vec![fits.tc.gamma_dotc.value];
            markers.extend(fits.crossover_rate);
            let plot = crate::plot::render_fit_plot(
                &fits.data,
                &[&fits.hb_fit, &fits.tc_fit],
                &markers,
                config.plot_width,
                config.plot_height,
            );
            println!("{plot}");
        }
    }

    print!("{}", crate::report::format_batch(&run.summary, &run.outcomes));
    println!(
        "Results: {} ({} rows)",
        run.results_path.display(),
        run.results_rows
    );
    if !run.figures.is_empty() {
        println!("Figures: {} written to {}", run.figures.len(), config.plot_dir.display());
    }
    if !run.exports.is_empty() {
        println!("Fit exports: {}", run.exports.len());
    }

    if run.summary.fitted == 0 {
        return Err(AppError::new(4, "No sample could be fitted."));
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let inputs = picker::resolve_inputs(&args.input.inputs)?;
    let config = input_config(&args.input, inputs);
    let book = pipeline::load_sample_book(&config)?;
    let (key, series) = pipeline::load_single_series(&config, &book, args.label.as_deref())?;

    let base: Vec<ModelDescriptor> = if args.compare {
        catalog()
    } else {
        args.models.iter().map(|k| k.descriptor()).collect()
    };
    let models = apply_overrides(&base, &args)?;

    let comparison = crate::fit::compare_models(&models, &series, &pipeline::fit_options(&config));

    println!("=== {key} ===");
    if let Some(stats) = series.stats() {
        println!(
            "Points: n={} | rate=[{:.3e}, {:.3e}] 1/s | stress=[{:.3e}, {:.3e}] Pa",
            stats.n_points, stats.rate_min, stats.rate_max, stats.stress_min, stats.stress_max
        );
    }

    let Some(best) = comparison.preferred() else {
        for failure in &comparison.failures {
            print!("{}", crate::report::format_failure(failure));
        }
        return Err(AppError::new(4, "No model could be fitted."));
    };

    if models.len() > 1 {
        println!("{}", crate::report::format_comparison(&comparison));
    }
    println!("{}", crate::report::format_fit(best));

    let residuals = crate::io::residuals(&series, best);
    if args.top > 0 {
        println!("{}", crate::report::format_residuals(&residuals, args.top));
    }

    if !args.no_plot {
        let shown: Vec<_> = comparison.fits.iter().take(3).collect();
        let plot = crate::plot::render_fit_plot(&series, &shown, &[], args.width, args.height);
        println!("{plot}");
    }

    if let Some(path) = &args.export {
        let file = crate::io::FitFile::new(key.to_string(), &series, best).with_meta(book.get(&key.sample_id));
        crate::io::write_fit_json(path, &file)?;
        tracing::info!(path = %path.display(), "fit exported");
    }
    if let Some(path) = &args.residuals {
        crate::io::write_residuals_csv(path, &series, best)?;
        tracing::info!(path = %path.display(), "residuals exported");
    }
    if let Some(path) = &args.figure {
        let plot = crate::plot::FlowCurvePlot::from_fit(&series, best);
        let is_png = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if is_png {
            crate::plot::write_png(path, &plot, pipeline::FIGURE_SIZE)?;
        } else {
            crate::plot::write_svg(path, &plot, pipeline::FIGURE_SIZE)?;
        }
        tracing::info!(path = %path.display(), "figure written");
    }

    Ok(())
}

fn handle_models() -> Result<(), AppError> {
    print!("{}", crate::report::format_models(&catalog()));
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    if args.runs == 0 {
        return Err(AppError::new(2, "--runs must be at least 1."));
    }
    let params = if args.params.is_empty() {
        args.model.descriptor().defaults()
    } else {
        args.params.clone()
    };
    let key = SampleKey::new(args.sample.clone(), args.temperature);

    let runs = (1..=args.runs)
        .map(|i| {
            let spec = crate::data::SynthSpec {
                model: args.model,
                params: params.clone(),
                rate_min: args.rate_min,
                rate_max: args.rate_max,
                points: args.points,
                noise: args.noise,
                seed: args.seed,
            };
            crate::data::generate_series(&spec, &format!("{}_run{i}", args.sample))
        })
        .collect::<Result<Vec<_>, _>>()?;

    crate::data::write_long_csv(&args.output, &key, &runs)?;
    println!(
        "Wrote {} run(s) of {} ({}) to {}",
        runs.len(),
        args.model.display_name(),
        crate::report::fmt_vec(&params),
        args.output.display()
    );
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let file = crate::io::read_fit_json(&args.fit)?;
    println!("{}", crate::report::format_fit(&file.fit));
    if let Some(ratio) = file.relative_viscosity() {
        println!("eta_bg / solvent viscosity = {ratio:.4e}");
    }
    println!("{}", crate::plot::render_fit_file(&file, args.width, args.height));
    Ok(())
}

/// Settings shared by every command that reads flow-curve tables.
pub fn input_config(input: &InputArgs, inputs: Vec<PathBuf>) -> AnalysisConfig {
    AnalysisConfig {
        inputs,
        layout: input.layout,
        samples_path: input.samples.clone(),
        results_path: PathBuf::from("results.csv"),
        replace: false,
        default_rate_unit: input.unit_x,
        default_stress_unit: input.unit_y,
        sample_filter: input.sample.clone(),
        temperature_filter: input.temperature,
        sweep_direction: input.sweep_direction.clone(),
        experiment_type: input.experiment_type.clone(),
        weighting: input.weighting.unwrap_or(Weighting::Relative),
        max_iterations: input.max_iter,
        plot: false,
        plot_dir: PathBuf::from("plots"),
        ascii_plot: false,
        plot_width: 100,
        plot_height: 25,
        export_dir: None,
    }
}

pub fn analysis_config_from_args(args: &AnalyzeArgs, inputs: Vec<PathBuf>) -> AnalysisConfig {
    AnalysisConfig {
        results_path: args.results.clone(),
        replace: args.replace,
        plot: !args.no_plots,
        plot_dir: args.plot_dir.clone(),
        ascii_plot: args.ascii,
        plot_width: args.width,
        plot_height: args.height,
        export_dir: args.export_dir.clone(),
        // The HB + TC procedure fits raw stresses unless told otherwise.
        weighting: args.input.weighting.unwrap_or(FitOptions::flow_curve().weighting),
        ..input_config(&args.input, inputs)
    }
}

/// Apply `--start`, `--fix` and `--bound` to every model that has the named
/// parameter. A name no model knows is an error.
fn apply_overrides(models: &[ModelDescriptor], args: &FitArgs) -> Result<Vec<ModelDescriptor>, AppError> {
    let mut out = models.to_vec();

    for raw in &args.starts {
        let (name, value) = parse_value(raw, "--start")?;
        apply_each(&mut out, name, raw, |m| m.with_default(name, value))?;
    }
    for raw in &args.fixed {
        let (name, value) = parse_value(raw, "--fix")?;
        apply_each(&mut out, name, raw, |m| m.with_fixed(name, value))?;
    }
    for raw in &args.bounds {
        let (name, range) =
            parse_assignment(raw).ok_or_else(|| AppError::new(2, format!("Invalid --bound '{raw}'.")))?;
        let (lo, hi) = range
            .split_once(':')
            .ok_or_else(|| AppError::new(2, format!("Invalid --bound '{raw}', expected name=lower:upper.")))?;
        let lower = parse_number(lo, raw)?;
        let upper = parse_number(hi, raw)?;
        apply_each(&mut out, name, raw, |m| m.with_bounds(name, lower, upper))?;
    }
    Ok(out)
}

fn apply_each(
    models: &mut [ModelDescriptor],
    name: &str,
    raw: &str,
    f: impl Fn(&ModelDescriptor) -> Result<ModelDescriptor, crate::models::ModelError>,
) -> Result<(), AppError> {
    let mut applied = false;
    for m in models.iter_mut() {
        if m.param(name).is_some() {
            *m = f(m)?;
            applied = true;
        }
    }
    if !applied {
        return Err(AppError::new(
            2,
            format!("'{raw}': no selected model has a parameter named '{name}'."),
        ));
    }
    Ok(())
}

fn parse_value<'a>(raw: &'a str, flag: &str) -> Result<(&'a str, f64), AppError> {
    let (name, value) =
        parse_assignment(raw).ok_or_else(|| AppError::new(2, format!("Invalid {flag} '{raw}', expected name=value.")))?;
    Ok((name, parse_number(value, raw)?))
}

fn parse_number(s: &str, raw: &str) -> Result<f64, AppError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| AppError::new(2, format!("Invalid number '{s}' in '{raw}'.")))
}
