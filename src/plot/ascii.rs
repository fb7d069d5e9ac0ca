//! ASCII plotting for terminal output.
//!
//! Fixed-size grid, deterministic output (golden-testable).
//!
//! Plot elements:
//! - series: `-` line through consecutive defined values, `o` for isolated ones
//! - zero line: `.` when 0 lies inside the value range

use chrono::NaiveDate;

use crate::domain::WideTable;
use crate::error::AppError;

/// Render one column of a wide table against calendar time.
///
/// Undefined values break the line rather than being bridged.
pub fn render_column_plot(table: &WideTable, column: &str, width: usize, height: usize) -> Result<String, AppError> {
    let col = table.column(column).ok_or_else(|| {
        AppError::config(format!(
            "Unknown column '{column}'. Available: {}",
            table.column_names().join(", ")
        ))
    })?;

    let points: Vec<(NaiveDate, Option<f64>)> = table.dates.iter().copied().zip(col.values.iter().copied()).collect();
    if points.iter().all(|(_, v)| v.is_none()) {
        return Err(AppError::no_data(format!("Column '{column}' has no defined values.")));
    }
    Ok(render_series(column, &points, width, height))
}

fn render_series(name: &str, points: &[(NaiveDate, Option<f64>)], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (Some(&(first, _)), Some(&(last, _))) = (points.first(), points.last()) else {
        return String::new();
    };
    let (x_min, x_max) = (0.0, (last - first).num_days().max(1) as f64);

    let (y_min, y_max) = y_range(points).unwrap_or((-1.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Segments of consecutive defined values.
    let mut run: Vec<(usize, usize)> = Vec::new();
    for (d, v) in points {
        match v {
            Some(v) => {
                let x = map_x((*d - first).num_days() as f64, x_min, x_max, width);
                let y = map_y(*v, y_min, y_max, height);
                run.push((x, y));
            }
            None => draw_run(&mut grid, &std::mem::take(&mut run)),
        }
    }
    draw_run(&mut grid, &run);

    if y_min < 0.0 && y_max > 0.0 {
        let zero = map_y(0.0, y_min, y_max, height);
        for cell in grid[zero].iter_mut() {
            if *cell == ' ' {
                *cell = '.';
            }
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {name} dates=[{}, {}] | y=[{y_min:.2}, {y_max:.2}]\n",
        first.format("%Y-%m-%d"),
        last.format("%Y-%m-%d")
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn draw_run(grid: &mut [Vec<char>], run: &[(usize, usize)]) {
    match run {
        [] => {}
        [(x, y)] => grid[*y][*x] = 'o',
        _ => {
            for pair in run.windows(2) {
                let (x0, y0) = pair[0];
                let (x1, y1) = pair[1];
                draw_line(grid, x0, y0, x1, y1, '-');
            }
        }
    }
}

fn y_range(points: &[(NaiveDate, Option<f64>)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for v in points.iter().filter_map(|(_, v)| *v) {
        min_y = min_y.min(v);
        max_y = max_y.max(v);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        // Flat series: centre it.
        Some((min_y - 1.0, min_y + 1.0))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
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
