//! Standalone SVG chart of a backtest run.
//!
//! Top panel: close price, price-scale overlays, buy/sell markers, and the
//! balance trajectory on a secondary right-hand axis. A second panel with
//! histogram bars is added when the strategy produced oscillators (squeeze
//! momentum).

use crate::domain::error::SqzError;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::ohlcv::PriceBar;
use crate::ports::report_port::{ReportContext, ReportPort};
use chrono::NaiveDateTime;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::debug;

const CHART_WIDTH: f64 = 900.0;
const PRICE_HEIGHT: f64 = 360.0;
const OSCILLATOR_HEIGHT: f64 = 160.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 70.0;
const MARGIN_TOP: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 40.0;
const MARKER_SIZE: f64 = 6.0;

const PRICE_COLOR: &str = "#111827";
const BALANCE_COLOR: &str = "#f59e0b";
const BUY_COLOR: &str = "#16a34a";
const SELL_COLOR: &str = "#dc2626";
const OVERLAY_COLORS: [&str; 5] = ["#2563eb", "#dc2626", "#7c3aed", "#0891b2", "#db2777"];

pub struct SvgChartAdapter;

impl ReportPort for SvgChartAdapter {
    fn write(&self, ctx: &ReportContext<'_>, output_path: &Path) -> Result<(), SqzError> {
        let svg = render_chart(ctx);
        if svg.is_empty() {
            return Err(SqzError::NoData {
                product: ctx.product.to_string(),
            });
        }
        fs::write(output_path, svg)?;
        debug!(path = %output_path.display(), "chart written");
        Ok(())
    }
}

/// Vertical mapping of a value range onto a pixel band.
#[derive(Debug, Clone, Copy)]
struct Scale {
    min: f64,
    max: f64,
    top: f64,
    height: f64,
}

impl Scale {
    fn new(values: impl IntoIterator<Item = f64>, top: f64, height: f64) -> Self {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let (min, max) = if min > max { (0.0, 1.0) } else { (min, max) };
        Scale {
            min,
            max,
            top,
            height,
        }
    }

    /// Symmetric around zero, for oscillators.
    fn symmetric(values: impl IntoIterator<Item = f64>, top: f64, height: f64) -> Self {
        let bound = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, |m, v| m.max(v.abs()));
        let bound = if bound > 0.0 { bound } else { 1.0 };
        Scale {
            min: -bound,
            max: bound,
            top,
            height,
        }
    }

    fn y(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range > 0.0 {
            self.top + self.height - ((value - self.min) / range) * self.height
        } else {
            self.top + self.height / 2.0
        }
    }
}

fn x_at(index: usize, count: usize) -> f64 {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    MARGIN_LEFT + (index as f64 / (count.saturating_sub(1)).max(1) as f64) * plot_width
}

/// Path through the defined points; a gap starts a new sub-path.
fn series_path(values: &[Option<f64>], scale: &Scale) -> String {
    let mut path = String::new();
    let mut pen_down = false;
    for (i, value) in values.iter().enumerate() {
        match value {
            Some(v) => {
                let cmd = if pen_down { 'L' } else { 'M' };
                if !path.is_empty() {
                    path.push(' ');
                }
                let _ = write!(path, "{cmd} {:.1} {:.1}", x_at(i, values.len()), scale.y(*v));
                pen_down = true;
            }
            None => pen_down = false,
        }
    }
    path
}

/// Index of the bar at or before `time`.
fn bar_index(bars: &[PriceBar], time: NaiveDateTime) -> usize {
    bars.partition_point(|b| b.time <= time).saturating_sub(1)
}

fn text(svg: &mut String, x: f64, y: f64, anchor: &str, size: u32, fill: &str, content: &str) {
    let _ = writeln!(
        svg,
        "  <text x=\"{x:.1}\" y=\"{y:.1}\" text-anchor=\"{anchor}\" font-size=\"{size}\" fill=\"{fill}\">{content}</text>"
    );
}

fn axis_labels(svg: &mut String, scale: &Scale, x: f64, anchor: &str) {
    for value in [scale.max, (scale.max + scale.min) / 2.0, scale.min] {
        text(svg, x, scale.y(value) + 4.0, anchor, 10, "#666", &format!("{value:.2}"));
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Renders the run as an SVG document; empty when there are no bars.
pub fn render_chart(ctx: &ReportContext<'_>) -> String {
    let bars = ctx.bars;
    if bars.is_empty() {
        return String::new();
    }

    let oscillator = ctx.output.oscillators.first();
    let total_height = PRICE_HEIGHT + oscillator.map_or(0.0, |_| OSCILLATOR_HEIGHT);
    let price_plot_height = PRICE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let right = CHART_WIDTH - MARGIN_RIGHT;
    let bottom = MARGIN_TOP + price_plot_height;

    let price_scale = Scale::new(
        bars.iter().map(|b| b.close).chain(
            ctx.output
                .overlays
                .iter()
                .flat_map(|s| s.values.iter().filter_map(|p| p.value)),
        ),
        MARGIN_TOP,
        price_plot_height,
    );
    let balance_scale = Scale::new(
        std::iter::once(ctx.result.initial_balance)
            .chain(ctx.result.trajectory.iter().map(|p| p.balance)),
        MARGIN_TOP,
        price_plot_height,
    );

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r##"<svg width="{w}" height="{h}" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg">"##,
        w = CHART_WIDTH,
        h = total_height
    );
    svg.push_str("  <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    text(
        &mut svg,
        CHART_WIDTH / 2.0,
        18.0,
        "middle",
        14,
        "#111",
        &escape(&format!("{} {}", ctx.product, ctx.strategy.name)),
    );

    // axes
    for (x1, y1, x2, y2) in [
        (MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, bottom),
        (right, MARGIN_TOP, right, bottom),
        (MARGIN_LEFT, bottom, right, bottom),
    ] {
        let _ = writeln!(
            svg,
            "  <line x1=\"{x1:.1}\" y1=\"{y1:.1}\" x2=\"{x2:.1}\" y2=\"{y2:.1}\" stroke=\"#ccc\" stroke-width=\"1\"/>"
        );
    }
    axis_labels(&mut svg, &price_scale, MARGIN_LEFT - 5.0, "end");
    axis_labels(&mut svg, &balance_scale, right + 5.0, "start");

    let first = bars[0].time.date();
    let last = bars[bars.len() - 1].time.date();
    let mid = bars[bars.len() / 2].time.date();
    for (x, label) in [
        (MARGIN_LEFT, first),
        ((MARGIN_LEFT + right) / 2.0, mid),
        (right, last),
    ] {
        text(&mut svg, x, bottom + 16.0, "middle", 10, "#666", &label.to_string());
    }

    // price and overlays
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    let _ = writeln!(
        svg,
        "  <path d=\"{}\" fill=\"none\" stroke=\"{PRICE_COLOR}\" stroke-width=\"1.5\"/>",
        series_path(&closes, &price_scale)
    );
    let mut legend = vec![("close".to_string(), PRICE_COLOR)];
    for (series, color) in ctx.output.overlays.iter().zip(OVERLAY_COLORS.iter().copied().cycle()) {
        let _ = writeln!(
            svg,
            "  <path d=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"1\"/>",
            series_path(&series.raw_values(), &price_scale)
        );
        legend.push((series.indicator_type.to_string(), color));
    }

    // balance on the secondary axis, stepped between closes
    let mut balance_path = format!(
        "M {:.1} {:.1}",
        x_at(0, bars.len()),
        balance_scale.y(ctx.result.initial_balance)
    );
    let mut last_y = balance_scale.y(ctx.result.initial_balance);
    for point in &ctx.result.trajectory {
        let x = x_at(bar_index(bars, point.time), bars.len());
        let y = balance_scale.y(point.balance);
        let _ = write!(balance_path, " L {x:.1} {last_y:.1} L {x:.1} {y:.1}");
        last_y = y;
    }
    let _ = write!(balance_path, " L {right:.1} {last_y:.1}");
    let _ = writeln!(
        svg,
        "  <path d=\"{balance_path}\" fill=\"none\" stroke=\"{BALANCE_COLOR}\" stroke-width=\"1.5\" stroke-dasharray=\"4 2\"/>"
    );
    legend.push(("balance".to_string(), BALANCE_COLOR));

    // markers
    for (i, point) in ctx.output.signals.iter().enumerate().take(bars.len()) {
        let x = x_at(i, bars.len());
        let y = price_scale.y(bars[i].close);
        if point.is_buy() {
            let _ = writeln!(
                svg,
                "  <polygon points=\"{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}\" fill=\"{BUY_COLOR}\"/>",
                x,
                y + 2.0,
                x - MARKER_SIZE,
                y + 2.0 + MARKER_SIZE * 1.5,
                x + MARKER_SIZE,
                y + 2.0 + MARKER_SIZE * 1.5
            );
        } else if point.is_sell() {
            let _ = writeln!(
                svg,
                "  <polygon points=\"{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}\" fill=\"{SELL_COLOR}\"/>",
                x,
                y - 2.0,
                x - MARKER_SIZE,
                y - 2.0 - MARKER_SIZE * 1.5,
                x + MARKER_SIZE,
                y - 2.0 - MARKER_SIZE * 1.5
            );
        }
    }

    for (i, (label, color)) in legend.iter().enumerate() {
        let y = MARGIN_TOP + 12.0 + i as f64 * 14.0;
        let _ = writeln!(
            svg,
            "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"10\" height=\"3\" fill=\"{color}\"/>",
            MARGIN_LEFT + 8.0,
            y - 4.0
        );
        text(&mut svg, MARGIN_LEFT + 22.0, y, "start", 10, "#333", &escape(label));
    }

    if let Some(series) = oscillator {
        render_oscillator(&mut svg, series, bars.len());
    }

    svg.push_str("</svg>");
    svg
}

fn render_oscillator(svg: &mut String, series: &IndicatorSeries, count: usize) {
    let top = PRICE_HEIGHT + 10.0;
    let height = OSCILLATOR_HEIGHT - 30.0;
    let scale = Scale::symmetric(series.values.iter().filter_map(|p| p.value), top, height);
    let zero = scale.y(0.0);
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let bar_width = (plot_width / count.max(1) as f64).max(1.0);

    let _ = writeln!(
        svg,
        "  <line x1=\"{MARGIN_LEFT:.1}\" y1=\"{zero:.1}\" x2=\"{:.1}\" y2=\"{zero:.1}\" stroke=\"#ccc\" stroke-width=\"1\"/>",
        CHART_WIDTH - MARGIN_RIGHT
    );
    text(
        svg,
        MARGIN_LEFT - 5.0,
        top + 10.0,
        "end",
        10,
        "#666",
        &series.indicator_type.to_string(),
    );

    for (i, point) in series.values.iter().enumerate() {
        let Some(value) = point.value else { continue };
        let y = scale.y(value);
        let color = if value >= 0.0 { BUY_COLOR } else { SELL_COLOR };
        let _ = writeln!(
            svg,
            "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{bar_width:.1}\" height=\"{:.1}\" fill=\"{color}\"/>",
            x_at(i, count) - bar_width / 2.0,
            y.min(zero),
            (y - zero).abs()
        );
    }
}
