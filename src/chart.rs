// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Chart rendering.
//!
//! Charts are drawn as standalone SVG documents so they can be attached to a
//! page and written to disk without a graphics stack. The output depends only
//! on the dataset, which keeps re-publishing byte-stable.

use std::{borrow::Cow, fmt::Write as _};

use crate::{
    error::Error,
    report::{ChartDataset, SeriesStyle}
};

/// Rendered image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedChart {
    /// Chart file stem, independent of the image format.
    pub stem:         &'static str,
    /// Attachment name.
    pub file_name:    String,
    /// MIME type.
    pub content_type: &'static str,
    /// Encoded image.
    pub bytes:        Vec<u8>
}

/// Turns a dataset into an image.
pub trait ChartRenderer {
    /// Renders `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the dataset cannot be drawn.
    fn render(&self, dataset: &ChartDataset) -> Result<RenderedChart, Error>;
}

/// SVG renderer with a fixed canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvgChartRenderer {
    width:  u32,
    height: u32
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self {
            width:  880,
            height: 360
        }
    }
}

const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 48.0;
const MARGIN_BOTTOM: f64 = 72.0;
const GRID_LINES: u32 = 5;
const FONT: &str = "'Segoe UI', Helvetica, Arial, sans-serif";

struct Plot {
    left:   f64,
    top:    f64,
    width:  f64,
    height: f64,
    max:    f64,
    slots:  usize
}

impl Plot {
    fn x_center(&self, index: usize) -> f64 {
        let slot = self.width / self.slots.max(1) as f64;
        self.left + slot * (index as f64 + 0.5)
    }

    fn y(&self, value: f64) -> f64 {
        let clamped = if value.is_finite() { value.clamp(0.0, self.max) } else { 0.0 };
        self.top + self.height - clamped / self.max * self.height
    }
}

impl SvgChartRenderer {
    /// Creates a renderer with a custom canvas size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height
        }
    }

    fn plot(&self, dataset: &ChartDataset) -> Plot {
        let max = nice_ceiling(dataset.max_value());
        Plot {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: f64::from(self.width) - MARGIN_LEFT - MARGIN_RIGHT,
            height: f64::from(self.height) - MARGIN_TOP - MARGIN_BOTTOM,
            max,
            slots: dataset.x_labels.len()
        }
    }

    fn build_svg(&self, dataset: &ChartDataset) -> String {
        let plot = self.plot(dataset);
        let mut buffer = String::with_capacity(4096);
        let title = escape_xml(&dataset.title);

        let _ = writeln!(
            buffer,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\" role=\"img\" aria-label=\"{title}\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
            w = self.width,
            h = self.height
        );
        let _ = writeln!(
            buffer,
            "  <rect width=\"{}\" height=\"{}\" fill=\"#ffffff\"/>",
            self.width, self.height
        );
        let _ = writeln!(
            buffer,
            "  <text x=\"{}\" y=\"28\" text-anchor=\"middle\" font-family=\"{FONT}\" font-size=\"16\" font-weight=\"600\" fill=\"#172B4D\">{title}</text>",
            self.width / 2
        );
        self.write_axes(&mut buffer, &plot, dataset);

        let bars: Vec<_> = dataset
            .series
            .iter()
            .filter(|series| series.style == SeriesStyle::Bar)
            .collect();
        for (position, series) in bars.iter().enumerate() {
            write_bars(&mut buffer, &plot, &series.values, &series.color, position, bars.len());
        }
        for series in dataset.series.iter().filter(|series| series.style != SeriesStyle::Bar) {
            write_line(&mut buffer, &plot, &series.values, &series.color, series.style == SeriesStyle::Dashed);
        }
        self.write_legend(&mut buffer, dataset);

        buffer.push_str("</svg>\n");
        buffer
    }

    fn write_axes(&self, buffer: &mut String, plot: &Plot, dataset: &ChartDataset) {
        for step in 0..=GRID_LINES {
            let value = plot.max * f64::from(step) / f64::from(GRID_LINES);
            let y = plot.y(value);
            let _ = writeln!(
                buffer,
                "  <line x1=\"{:.1}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" stroke=\"#DFE1E6\" stroke-width=\"1\"/>",
                plot.left,
                plot.left + plot.width
            );
            let _ = writeln!(
                buffer,
                "  <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-family=\"{FONT}\" font-size=\"11\" fill=\"#5E6C84\">{}</text>",
                plot.left - 8.0,
                y + 4.0,
                format_tick(value)
            );
        }
        let _ = writeln!(
            buffer,
            "  <text x=\"16\" y=\"{:.1}\" transform=\"rotate(-90 16 {:.1})\" text-anchor=\"middle\" font-family=\"{FONT}\" font-size=\"12\" fill=\"#5E6C84\">{}</text>",
            plot.top + plot.height / 2.0,
            plot.top + plot.height / 2.0,
            escape_xml(&dataset.y_label)
        );
        let baseline = plot.top + plot.height;
        for (index, label) in dataset.x_labels.iter().enumerate() {
            let x = plot.x_center(index);
            let _ = writeln!(
                buffer,
                "  <text x=\"{x:.1}\" y=\"{:.1}\" transform=\"rotate(-35 {x:.1} {:.1})\" text-anchor=\"end\" font-family=\"{FONT}\" font-size=\"11\" fill=\"#5E6C84\">{}</text>",
                baseline + 18.0,
                baseline + 18.0,
                escape_xml(label)
            );
        }
    }

    fn write_legend(&self, buffer: &mut String, dataset: &ChartDataset) {
        let mut x = MARGIN_LEFT;
        let y = f64::from(self.height) - 12.0;
        for series in &dataset.series {
            let _ = writeln!(
                buffer,
                "  <rect x=\"{x:.1}\" y=\"{:.1}\" width=\"12\" height=\"12\" fill=\"{}\"/>",
                y - 10.0,
                escape_xml(&series.color)
            );
            let _ = writeln!(
                buffer,
                "  <text x=\"{:.1}\" y=\"{y:.1}\" font-family=\"{FONT}\" font-size=\"12\" fill=\"#172B4D\">{}</text>",
                x + 18.0,
                escape_xml(&series.name)
            );
            x += 40.0 + 7.0 * series.name.chars().count() as f64;
        }
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render(&self, dataset: &ChartDataset) -> Result<RenderedChart, Error> {
        if dataset.x_labels.is_empty() {
            return Err(Error::validation(format!("chart '{}' has no data points", dataset.title)));
        }
        if let Some(series) = dataset
            .series
            .iter()
            .find(|series| series.values.len() != dataset.x_labels.len())
        {
            return Err(Error::validation(format!(
                "series '{}' of chart '{}' has {} values for {} labels",
                series.name,
                dataset.title,
                series.values.len(),
                dataset.x_labels.len()
            )));
        }
        Ok(RenderedChart {
            stem:         dataset.file_stem(),
            file_name:    dataset.file_name("svg"),
            content_type: "image/svg+xml",
            bytes:        self.build_svg(dataset).into_bytes()
        })
    }
}

fn write_bars(buffer: &mut String, plot: &Plot, values: &[f64], color: &str, position: usize, groups: usize) {
    let slot = plot.width / plot.slots.max(1) as f64;
    let bar = slot * 0.7 / groups.max(1) as f64;
    let baseline = plot.top + plot.height;
    for (index, value) in values.iter().enumerate() {
        let x = plot.x_center(index) - slot * 0.35 + bar * position as f64;
        let y = plot.y(*value);
        let _ = writeln!(
            buffer,
            "  <rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{bar:.1}\" height=\"{:.1}\" fill=\"{}\"/>",
            baseline - y,
            escape_xml(color)
        );
    }
}

fn write_line(buffer: &mut String, plot: &Plot, values: &[f64], color: &str, dashed: bool) {
    let points: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(index, value)| format!("{:.1},{:.1}", plot.x_center(index), plot.y(*value)))
        .collect();
    let dash = if dashed { " stroke-dasharray=\"6 4\"" } else { "" };
    let color = escape_xml(color);
    let _ = writeln!(
        buffer,
        "  <polyline points=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"2\"{dash}/>",
        points.join(" ")
    );
    for point in &points {
        if let Some((x, y)) = point.split_once(',') {
            let _ = writeln!(buffer, "  <circle cx=\"{x}\" cy=\"{y}\" r=\"3\" fill=\"{color}\"/>");
        }
    }
}

/// Rounds `value` up to 1, 2, 5 or 10 times a power of ten; at least 1.
fn nice_ceiling(value: f64) -> f64 {
    if !value.is_finite() || value <= 1.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(value.log10().floor());
    let normalized = value / magnitude;
    let step = [1.0, 2.0, 5.0, 10.0]
        .into_iter()
        .find(|step| normalized <= *step)
        .unwrap_or(10.0);
    step * magnitude
}

fn format_tick(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

pub(crate) fn escape_xml(value: &str) -> Cow<'_, str> {
    if value
        .chars()
        .any(|character| matches!(character, '&' | '<' | '>' | '\"' | '\''))
    {
        let mut escaped = String::with_capacity(value.len());
        for character in value.chars() {
            match character {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '\"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&apos;"),
                other => escaped.push(other)
            }
        }
        Cow::Owned(escaped)
    } else {
        Cow::Borrowed(value)
    }
}
