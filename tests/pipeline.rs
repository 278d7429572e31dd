use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use rheo_fit::app::pipeline::{load_single_series, run_analysis, write_outputs};
use rheo_fit::domain::{
    AnalysisConfig, InputLayout, ModelKind, RateUnit, SampleKey, SampleSeries, StressUnit, Weighting,
};
use rheo_fit::fit::{analyze_with_models, hb_descriptor, log_space, tc_descriptor, FitOptions, SampleOutcome};
use rheo_fit::io::{read_fit_json, ResultsStore, SampleBook};
use rheo_fit::models::predict;

const HEADER: &str = "sample_id,temperature,sweep_direction,experiment_type,run,shear_rate,stress\n";

/// TC curve with a small alternating wobble, `scale` applied to the stress column.
fn tc_rows(out: &mut String, id: &str, scale: f64) {
    let xs = log_space(1e-3, 1e3, 40).unwrap();
    for (i, &x) in xs.iter().enumerate() {
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        let y = predict(ModelKind::Tc, x, &[3.0, 0.05, 0.2]) * (1.0 + 0.005 * sign);
        writeln!(out, "{id},20,inverse,flow_curve,1,{x},{}", y * scale).unwrap();
    }
    // A forward sweep that must be ignored.
    writeln!(out, "{id},20,forward,flow_curve,1,1.0,1000000").unwrap();
}

fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let mut csv = HEADER.to_string();
    // Sample 7 is recorded in dynes/cm², declared in the metadata file.
    tc_rows(&mut csv, "7", 10.0);
    for x in [0.1, 1.0, 10.0, 100.0, 1000.0] {
        writeln!(csv, "0,20,inverse,flow_curve,1,{x},0").unwrap();
    }
    let table = dir.join("flow.csv");
    fs::write(&table, csv).unwrap();

    let samples = dir.join("samples.toml");
    fs::write(
        &samples,
        "[samples.7]\nconcentration = 1.5\nsolvent = \"water\"\nmicrogel_type = \"pNIPAM\"\nsolvent_viscosity = 0.001\nunit_y = \"dynes/cm2\"\n",
    )
    .unwrap();
    (table, samples)
}

fn config(dir: &Path, table: PathBuf, samples: PathBuf) -> AnalysisConfig {
    AnalysisConfig {
        inputs: vec![table],
        layout: InputLayout::Long,
        samples_path: Some(samples),
        results_path: dir.join("out").join("results.csv"),
        replace: false,
        default_rate_unit: RateUnit::PerSecond,
        default_stress_unit: StressUnit::Pascal,
        sample_filter: None,
        temperature_filter: None,
        sweep_direction: "inverse".to_string(),
        experiment_type: "flow_curve".to_string(),
        weighting: Weighting::Relative,
        max_iterations: 200,
        plot: true,
        plot_dir: dir.join("plots"),
        ascii_plot: false,
        plot_width: 60,
        plot_height: 15,
        export_dir: Some(dir.join("fits")),
    }
}

#[test]
fn analysis_writes_results_and_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let (table, samples) = write_inputs(dir.path());
    let config = config(dir.path(), table, samples);

    let run = run_analysis(&config).unwrap();
    assert_eq!(run.summary.total(), 2);
    assert_eq!(run.summary.fitted, 1);
    assert_eq!(run.summary.failed, 1);
    assert_eq!(run.results_rows, 1);

    let store = ResultsStore::open(&config.results_path).unwrap();
    let row = store.get("7", 20.0).expect("row for sample 7");
    assert_eq!(row.w_percent, Some(1.5));
    assert_eq!(row.solvent.as_deref(), Some("water"));
    assert!((row.tauc_tc - 3.0).abs() / 3.0 < 0.05, "tauc_TC = {}", row.tauc_tc);
    assert!((row.etas - 0.05).abs() / 0.05 < 0.05, "etas = {}", row.etas);
    assert!(store.get("0", 20.0).is_none());

    assert!(config.plot_dir.join("fits_sample_7_T20.svg").exists());
    assert!(config.plot_dir.join("fits_sample_7_T20.png").exists());
    assert!(!config.plot_dir.join("fits_sample_0_T20.svg").exists());
    assert_eq!(run.exports.len(), 2);
    assert!(run.exports.iter().all(|p| p.exists()));

    let tc = read_fit_json(&dir.path().join("fits").join("fit_sample_7_T20_tc.json")).unwrap();
    assert_eq!(tc.sample.and_then(|m| m.solvent_viscosity), Some(0.001));
}

#[test]
fn figures_with_text_do_not_block_the_results_table() {
    let dir = tempfile::tempdir().unwrap();
    let (table, samples) = write_inputs(dir.path());
    let mut config = config(dir.path(), table, samples);
    config.export_dir = None;
    assert!(config.plot);

    let run = run_analysis(&config).unwrap();
    assert!(config.results_path.exists());
    assert_eq!(run.figures.len(), 2);
    let png = fs::read(config.plot_dir.join("fits_sample_7_T20.png")).unwrap();
    assert_eq!(&png[1..4], b"PNG");
}

#[test]
fn no_high_shear_regime_writes_no_row_and_no_figure() {
    let dir = tempfile::tempdir().unwrap();
    let (table, samples) = write_inputs(dir.path());
    let config = config(dir.path(), table, samples);

    let xs = log_space(1e-3, 1e3, 40).unwrap();
    let ys: Vec<f64> = xs.iter().map(|&x| predict(ModelKind::Tc, x, &[3.0, 0.05, 0.2])).collect();
    let key = SampleKey::new("5", 20.0);
    let outcome = analyze_with_models(
        key,
        &[SampleSeries::new("5", xs, ys)],
        &FitOptions::flow_curve(),
        &hb_descriptor(),
        &tc_descriptor().with_fixed("eta_bg", 0.0).unwrap(),
    );
    assert!(matches!(outcome, SampleOutcome::NoHighShearRegime { .. }));

    let book = SampleBook::default();
    let run = write_outputs(&config, &book, vec![outcome]).unwrap();
    assert_eq!(run.summary.fitted, 0);
    assert_eq!(run.results_rows, 0);
    assert!(run.figures.is_empty());
    assert!(run.exports.is_empty());
    assert!(!config.plot_dir.join("fits_sample_5_T20.svg").exists());
    assert!(ResultsStore::open(&config.results_path).unwrap().get("5", 20.0).is_none());
}

#[test]
fn paired_files_take_units_from_their_own_metadata_entry() {
    let dir = tempfile::tempdir().unwrap();
    let xs = log_space(1e-2, 1e2, 10).unwrap();
    for (file, label) in [("cup_pa", "a"), ("cup_dyn", "b")] {
        let mut csv = format!("{label},{label}_stress\n");
        for &x in &xs {
            writeln!(csv, "{x},{}", 2.0 + x).unwrap();
        }
        fs::write(dir.path().join(format!("{file}.csv")), csv).unwrap();
    }
    let samples = dir.path().join("samples.toml");
    fs::write(&samples, "[samples.cup_dyn]\nunit_y = \"dynes/cm2\"\n").unwrap();

    let mut config = config(dir.path(), dir.path().join("cup_pa.csv"), samples.clone());
    config.inputs.push(dir.path().join("cup_dyn.csv"));
    config.layout = InputLayout::Paired;
    let book = SampleBook::load(&samples).unwrap();

    let (_, pascal) = load_single_series(&config, &book, Some("a")).unwrap();
    let (key, dynes) = load_single_series(&config, &book, Some("b")).unwrap();
    assert_eq!(key.temperature, 20.0);
    approx::assert_relative_eq!(pascal.stress[0], 2.0 + xs[0], max_relative = 1e-12);
    approx::assert_relative_eq!(dynes.stress[0], 0.1 * (2.0 + xs[0]), max_relative = 1e-12);
}

#[test]
fn rerun_replaces_rows_for_the_same_sample() {
    let dir = tempfile::tempdir().unwrap();
    let (table, samples) = write_inputs(dir.path());
    let mut config = config(dir.path(), table, samples);
    config.plot = false;
    config.export_dir = None;

    run_analysis(&config).unwrap();
    let header = fs::read_to_string(&config.results_path).unwrap();
    assert!(header.starts_with("sample_id,w_percent,solvent,microgel_type,temperature,tauc_HB"));

    let again = run_analysis(&config).unwrap();
    assert_eq!(again.results_rows, 1);

    config.replace = true;
    config.sample_filter = Some("0".to_string());
    let only_zero = run_analysis(&config).unwrap();
    assert_eq!(only_zero.summary.fitted, 0);
    assert_eq!(only_zero.results_rows, 0);
}

#[test]
fn nothing_selected_is_a_no_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let (table, samples) = write_inputs(dir.path());
    let mut config = config(dir.path(), table, samples);
    config.sample_filter = Some("missing".to_string());

    let err = run_analysis(&config).unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn single_series_applies_metadata_units() {
    let dir = tempfile::tempdir().unwrap();
    let (table, samples) = write_inputs(dir.path());
    let config = config(dir.path(), table, samples.clone());
    let book = SampleBook::load(&samples).unwrap();

    let (key, series) = load_single_series(&config, &book, Some("7")).unwrap();
    assert_eq!(key.sample_id, "7");
    assert_eq!(series.len(), 40);
    let expected = predict(ModelKind::Tc, series.shear_rate[0], &[3.0, 0.05, 0.2]) * 1.005;
    approx::assert_relative_eq!(series.stress[0], expected, max_relative = 1e-9);
}
