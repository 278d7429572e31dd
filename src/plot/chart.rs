//! Annotated log-log flow-curve figures rendered with Plotters.
//!
//! One figure per sample: measured points, the HB and TC curves on the fixed
//! curve grid, dashed vertical markers at the critical shear rate and at the
//! crossover rate `σy/ηs`, and a block of rounded values in the corner.
//! The same drawing code feeds the SVG and PNG backends.

use std::path::{Path, PathBuf};

use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;

use crate::domain::{FitResult, ModelKind, SampleKey, SampleSeries};
use crate::error::AppError;
use crate::fit::{curve_grid, evaluate, FlowCurveFits};
use crate::models::predict;
use crate::report::value_label;

use super::fonts::{register_fonts, FONT_FAMILY};

/// Fixed plotting window, shear rate in 1/s.
pub const RATE_WINDOW: (f64, f64) = (1e-4, 2e3);
/// Fixed plotting window, stress in Pa.
pub const STRESS_WINDOW: (f64, f64) = (0.01, 1e4);

const DASH_SEGMENTS: usize = 40;

/// A fitted curve to draw.
#[derive(Debug, Clone)]
pub struct PlotCurve {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    pub color: RGBColor,
}

/// Render-only description of one figure.
///
/// All series and annotations are computed up front so drawing stays a pure
/// function of this struct.
#[derive(Debug, Clone)]
pub struct FlowCurvePlot {
    pub title: String,
    pub data: Vec<(f64, f64)>,
    pub curves: Vec<PlotCurve>,
    /// Vertical dashed markers (shear rates).
    pub markers: Vec<f64>,
    pub annotations: Vec<String>,
}

impl FlowCurvePlot {
    /// Figure for a full HB + TC analysis, curves from the rounded values.
    pub fn from_fits(fits: &FlowCurveFits) -> Self {
        let grid = curve_grid();
        let hb = fits.hb_values();
        let tc = fits.tc_values();
        let sample = |kind: ModelKind, p: &[f64]| -> Vec<(f64, f64)> {
            grid.iter().map(|&x| (x, predict(kind, x, p))).collect()
        };

        let mut markers = vec![fits.tc.gamma_dotc.value];
        markers.extend(fits.crossover_rate);

        Self {
            title: format!("Sample {} at {} °C", fits.key.sample_id, fits.key.temperature),
            data: fits.data.points().collect(),
            curves: vec![
                PlotCurve {
                    label: "HB".to_string(),
                    points: sample(ModelKind::Hb, &hb),
                    color: RED,
                },
                PlotCurve {
                    label: "TC".to_string(),
                    points: sample(ModelKind::Tc, &tc),
                    color: BLUE,
                },
            ],
            markers,
            annotations: vec![
                format!("HB: {}", value_label("σy", &fits.hb.ystress, "Pa")),
                format!("    {}", value_label("K", &fits.hb.k, "Pa·sⁿ")),
                format!("    {}", value_label("n", &fits.hb.n, "")),
                format!("TC: {}", value_label("σy", &fits.tc.ystress, "Pa")),
                format!("    {}", value_label("γ̇c", &fits.tc.gamma_dotc, "1/s")),
                format!("    {}", value_label("ηs", &fits.tc.etas, "Pa·s")),
                format!("    {}", value_label("γc", &fits.gammac, "")),
            ],
        }
    }

    /// Figure for a single fitted model.
    pub fn from_fit(series: &SampleSeries, fit: &FitResult) -> Self {
        let annotations = fit
            .params
            .iter()
            .map(|p| match p.stderr {
                Some(e) => format!("{} = {:.4e} ± {:.1e}", p.name, p.value, e),
                None => format!("{} = {:.4e}", p.name, p.value),
            })
            .collect();
        Self {
            title: format!("{} ({})", series.label, fit.model.display_name()),
            data: series.points().collect(),
            curves: vec![PlotCurve {
                label: fit.model.display_name().to_string(),
                points: evaluate(fit, &curve_grid()),
                color: RED,
            }],
            markers: Vec::new(),
            annotations,
        }
    }
}

/// `fits_sample_<id>_T<temp>` with the given extension.
pub fn figure_path(dir: &Path, key: &SampleKey, ext: &str) -> PathBuf {
    dir.join(format!("fits_{}.{ext}", key.file_stem()))
}

/// Write the figure as SVG.
pub fn write_svg(path: &Path, plot: &FlowCurvePlot, size: (u32, u32)) -> Result<(), AppError> {
    register_fonts()?;
    let root = SVGBackend::new(path, size).into_drawing_area();
    draw_flow_curve(&root, plot)
        .map_err(|e| AppError::new(5, format!("Failed to render SVG '{}': {e}", path.display())))
}

/// Write the figure as PNG, text rasterized from the bundled font.
pub fn write_png(path: &Path, plot: &FlowCurvePlot, size: (u32, u32)) -> Result<(), AppError> {
    register_fonts()?;
    let root = BitMapBackend::new(path, size).into_drawing_area();
    draw_flow_curve(&root, plot)
        .map_err(|e| AppError::new(5, format!("Failed to render PNG '{}': {e}", path.display())))
}

fn in_window((x, y): (f64, f64)) -> bool {
    x >= RATE_WINDOW.0 && x <= RATE_WINDOW.1 && y >= STRESS_WINDOW.0 && y <= STRESS_WINDOW.1
}

fn draw_flow_curve<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    plot: &FlowCurvePlot,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(root)
        .caption(&plot.title, (FONT_FAMILY, 20))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (RATE_WINDOW.0..RATE_WINDOW.1).log_scale(),
            (STRESS_WINDOW.0..STRESS_WINDOW.1).log_scale(),
        )?;

    chart
        .configure_mesh()
        .x_desc("shear rate [1/s]")
        .y_desc("stress [Pa]")
        .label_style((FONT_FAMILY, 12))
        .x_label_formatter(&|x| format!("{x:.0e}"))
        .y_label_formatter(&|y| format!("{y:.0e}"))
        .draw()?;

    let (ly0, ly1) = (STRESS_WINDOW.0.log10(), STRESS_WINDOW.1.log10());
    let dash_y = |k: usize| 10f64.powf(ly0 + (ly1 - ly0) * k as f64 / DASH_SEGMENTS as f64);
    for &m in plot.markers.iter().filter(|&&m| m >= RATE_WINDOW.0 && m <= RATE_WINDOW.1) {
        chart.draw_series(
            (0..DASH_SEGMENTS)
                .step_by(2)
                .map(|k| PathElement::new(vec![(m, dash_y(k)), (m, dash_y(k + 1))], BLACK.stroke_width(1))),
        )?;
    }

    for curve in &plot.curves {
        let color = curve.color;
        // Split at points outside the window so the line never leaves the frame.
        let mut segment: Vec<(f64, f64)> = Vec::new();
        let mut segments = Vec::new();
        for &p in &curve.points {
            if in_window(p) {
                segment.push(p);
            } else if !segment.is_empty() {
                segments.push(std::mem::take(&mut segment));
            }
        }
        if !segment.is_empty() {
            segments.push(segment);
        }
        for (i, seg) in segments.into_iter().enumerate() {
            let anno = chart.draw_series(LineSeries::new(seg, color.stroke_width(2)))?;
            if i == 0 {
                anno.label(curve.label.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
            }
        }
    }

    chart
        .draw_series(
            plot.data
                .iter()
                .copied()
                .filter(|&p| in_window(p))
                .map(|p| Circle::new(p, 3, BLACK.filled())),
        )?
        .label("data")
        .legend(|(x, y)| Circle::new((x, y), 3, BLACK.filled()));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font((FONT_FAMILY, 13))
        .draw()?;

    for (i, line) in plot.annotations.iter().enumerate() {
        root.draw(&Text::new(
            line.clone(),
            (90, 50 + 16 * i as i32),
            (FONT_FAMILY, 13).into_font(),
        ))?;
    }

    root.present()?;
    Ok(())
}
