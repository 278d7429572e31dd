//! ASCII plotting for terminal output.
//!
//! Flow curves span decades on both axes, so everything is drawn on log-log
//! scales. The grid is fixed-size and the output deterministic (helpful for
//! golden tests).
//!
//! Plot elements:
//! - observed points: `o`
//! - fitted curves: `-`, `=`, `+` (in the order given)
//! - vertical markers: `:`
//!
//! Non-positive values have no place on a log axis and are skipped.

use crate::domain::{FitResult, SampleSeries};
use crate::io::FitFile;
use crate::models::predict;

const CURVE_GLYPHS: [char; 3] = ['-', '=', '+'];

/// Render data plus fitted models, each sampled across the data range.
pub fn render_fit_plot(
    series: &SampleSeries,
    fits: &[&FitResult],
    markers: &[f64],
    width: usize,
    height: usize,
) -> String {
    let data: Vec<(f64, f64)> = series.points().collect();
    let Some((lx_min, lx_max)) = log_range(data.iter().map(|p| p.0)) else {
        return "Plot: no positive data\n".to_string();
    };

    let curves: Vec<Vec<(f64, f64)>> = fits
        .iter()
        .map(|fit| sample_curve(fit, lx_min, lx_max, width.max(2)))
        .collect();
    let refs: Vec<&[(f64, f64)]> = curves.iter().map(Vec::as_slice).collect();
    render_plot(&data, &refs, markers, (lx_min, lx_max), width, height)
}

/// Render the fitted grid stored in a fit JSON file (curve only).
pub fn render_fit_file(file: &FitFile, width: usize, height: usize) -> String {
    let curve: Vec<(f64, f64)> = file
        .grid
        .shear_rate
        .iter()
        .zip(file.grid.stress.iter())
        .map(|(&x, &y)| (x, y))
        .collect();
    let Some(x_range) = log_range(curve.iter().map(|p| p.0)) else {
        return "Plot: no positive data\n".to_string();
    };
    render_plot(&[], &[curve.as_slice()], &[], x_range, width, height)
}

fn render_plot(
    data: &[(f64, f64)],
    curves: &[&[(f64, f64)]],
    markers: &[f64],
    (lx_min, lx_max): (f64, f64),
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let ys = data
        .iter()
        .chain(curves.iter().flat_map(|c| c.iter()))
        .map(|p| p.1);
    let (ly_min, ly_max) = log_range(ys).unwrap_or((-1.0, 1.0));
    let (ly_min, ly_max) = pad_range(ly_min, ly_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    for (curve, glyph) in curves.iter().zip(CURVE_GLYPHS.iter().cycle()) {
        draw_curve(&mut grid, curve, (lx_min, lx_max), (ly_min, ly_max), *glyph);
    }

    for &m in markers {
        if !(m > 0.0 && m.is_finite()) {
            continue;
        }
        let lm = m.log10();
        if lm < lx_min || lm > lx_max {
            continue;
        }
        let x = map_x(lm, lx_min, lx_max, width);
        for row in grid.iter_mut() {
            if row[x] == ' ' {
                row[x] = ':';
            }
        }
    }

    for &(x, y) in data {
        if !(x > 0.0 && y > 0.0) {
            continue;
        }
        let col = map_x(x.log10(), lx_min, lx_max, width);
        let row = map_y(y.log10(), ly_min, ly_max, height);
        grid[row][col] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: rate=[{:.1e}, {:.1e}] 1/s | stress=[{:.1e}, {:.1e}] Pa\n",
        10f64.powf(lx_min),
        10f64.powf(lx_max),
        10f64.powf(ly_min),
        10f64.powf(ly_max),
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

/// `(log10 min, log10 max)` over the positive finite values.
fn log_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values.filter(|v| *v > 0.0 && v.is_finite()) {
        let l = v.log10();
        lo = lo.min(l);
        hi = hi.max(l);
    }
    if lo.is_finite() && hi.is_finite() && hi > lo {
        Some((lo, hi))
    } else {
        None
    }
}

fn sample_curve(fit: &FitResult, lx_min: f64, lx_max: f64, n: usize) -> Vec<(f64, f64)> {
    let values = fit.values();
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let x = 10f64.powf(lx_min + u * (lx_max - lx_min));
            (x, predict(fit.model, x, &values))
        })
        .collect()
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(lx: f64, lx_min: f64, lx_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((lx - lx_min) / (lx_max - lx_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(ly: f64, ly_min: f64, ly_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((ly - ly_min) / (ly_max - ly_min)).clamp(0.0, 1.0);
    // top row is the maximum
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_range: (f64, f64), y_range: (f64, f64), ch: char) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        if !(x > 0.0 && y > 0.0 && y.is_finite()) {
            prev = None;
            continue;
        }
        let col = map_x(x.log10(), x_range.0, x_range.1, width);
        let row = map_y(y.log10(), y_range.0, y_range.1, height);
        if let Some((c0, r0)) = prev {
            draw_line(grid, c0, r0, col, row, ch);
        } else if grid[row][col] == ' ' {
            grid[row][col] = ch;
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
