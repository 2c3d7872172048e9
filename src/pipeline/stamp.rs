//! Stamp rendering: class box plot + the student's own grade → PNG in memory.
//!
//! Every stamp shows the same class-wide box plot (quartiles are computed
//! once per batch) with the record's grade marked on top of it, a small
//! borderless table with points and grade, and a title naming the student.
//!
//! Layout, top to bottom:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │   Individuelle Note von Anna und Noten…      │  title
//! │            Punkte   42.0                     │  key/value table
//! │            Note     5.5                      │
//! │      ├────[███│████]──────┤     ●            │  box plot + marker
//! │  ───┬────┬────┬────┬────┬───                 │  grade axis
//! │     2    3    4    5    6                    │
//! │                 Note                         │  axis caption
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The image is never written to disk; [`StampArtifact`] carries the PNG
//! bytes and pixel size straight to the page annotator.

use crate::config::StampStyle;
use crate::error::{DataError, RecordError};
use crate::model::{format_number, Record};
use crate::pipeline::roster::Dataset;
use crate::pipeline::stats::{BoxSummary, Classification};
use ab_glyph::{FontRef, PxScale};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_text_mut,
    text_size,
};
use imageproc::rect::Rect;
use once_cell::sync::Lazy;
use std::io::Cursor;
use tracing::debug;

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

static FONT: Lazy<Option<FontRef<'static>>> = Lazy::new(|| FontRef::try_from_slice(FONT_DATA).ok());

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GREY: Rgb<u8> = Rgb([90, 90, 90]);
/// Colour of the student's own grade marker.
pub const MARKER_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Opacity of the classification colour inside the box.
const BOX_ALPHA: f32 = 0.6;

/// A rendered stamp: PNG bytes plus the raster size.
#[derive(Debug, Clone, PartialEq)]
pub struct StampArtifact {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl StampArtifact {
    /// `height / width` of the raster.
    pub fn aspect_ratio(&self) -> f32 {
        self.height as f32 / self.width as f32
    }
}

/// Renders stamps for one dataset. Class statistics are computed on
/// construction and shared by every stamp of the batch.
#[derive(Debug, Clone)]
pub struct StampRenderer {
    summary: BoxSummary,
    classification: Classification,
    style: StampStyle,
}

impl StampRenderer {
    pub fn new(dataset: &Dataset, style: StampStyle) -> Result<Self, DataError> {
        let summary = BoxSummary::from_grades(&dataset.grades()).ok_or(DataError::NoGrades)?;
        let classification = summary.classification();
        debug!(
            "Class quartiles Q1={:.3} median={:.3} Q3={:.3} → {:?}",
            summary.q1, summary.median, summary.q3, classification
        );
        Ok(Self {
            summary,
            classification,
            style,
        })
    }

    pub fn summary(&self) -> &BoxSummary {
        &self.summary
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Look `identifier` up in `dataset` and render its stamp.
    pub fn render_for(&self, dataset: &Dataset, identifier: &str) -> Result<StampArtifact, RecordError> {
        let record = dataset.get(identifier).ok_or_else(|| RecordError::Render {
            identifier: identifier.to_string(),
            detail: "identifier not found in roster".into(),
        })?;
        self.render(record)
    }

    /// Render the stamp for one record.
    pub fn render(&self, record: &Record) -> Result<StampArtifact, RecordError> {
        let render_err = |detail: String| RecordError::Render {
            identifier: record.identifier.clone(),
            detail,
        };
        let font = (*FONT)
            .as_ref()
            .ok_or_else(|| render_err("embedded font could not be parsed".into()))?;

        let img = self.draw(record, font);
        let (width, height) = img.dimensions();

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| render_err(format!("PNG encoding failed: {e}")))?;

        debug!(
            "Rendered stamp for {} → {}x{} px, {} bytes",
            record.identifier,
            width,
            height,
            png.len()
        );
        Ok(StampArtifact { png, width, height })
    }

    fn draw(&self, record: &Record, font: &FontRef<'static>) -> RgbImage {
        let w = self.style.width_px;
        let h = self.style.height_px;
        let mut img = RgbImage::from_pixel(w, h, WHITE);

        // Base unit: 1.0 at the 640×480 reference size.
        let unit = (w as f32 / 640.0).min(h as f32 / 480.0);
        let stroke = (1.5 * unit).round().max(1.0) as u32;
        let hf = h as f32;

        let axis = Axis::new(
            self.summary.min.min(record.grade),
            self.summary.max.max(record.grade),
            w as f32 * 0.08,
            w as f32 * 0.95,
        );

        // ── Title ────────────────────────────────────────────────────────
        let title = self.style.title_for(&record.given_name);
        let title_scale = fit_scale(font, &title, 20.0 * unit, w as f32 * 0.94);
        draw_centered(&mut img, font, &title, title_scale, w as f32 / 2.0, hf * 0.03, BLACK);

        // ── Key/value table (no cell borders) ────────────────────────────
        let cell_scale = PxScale::from(18.0 * unit);
        let col_key = w as f32 * 0.30 + 4.0 * unit;
        let col_value = w as f32 * 0.50 + 4.0 * unit;
        let rows = [
            (&self.style.points_label, format_number(record.total)),
            (&self.style.grade_label, format_number(record.grade)),
        ];
        for (i, (key, value)) in rows.iter().enumerate() {
            let y = (hf * (0.12 + 0.075 * i as f32)) as i32;
            draw_text_mut(&mut img, BLACK, col_key as i32, y, cell_scale, font, key);
            draw_text_mut(&mut img, BLACK, col_value as i32, y, cell_scale, font, value);
        }

        // ── Box plot ─────────────────────────────────────────────────────
        let center_y = hf * 0.56;
        let half_box = hf * 0.10;
        let cap = half_box * 0.5;
        let s = &self.summary;
        let (x_q1, x_q3) = (axis.to_px(s.q1), axis.to_px(s.q3));

        // Whiskers and caps.
        hline(&mut img, axis.to_px(s.whisker_low), x_q1, center_y, stroke, BLACK);
        hline(&mut img, x_q3, axis.to_px(s.whisker_high), center_y, stroke, BLACK);
        for x in [axis.to_px(s.whisker_low), axis.to_px(s.whisker_high)] {
            vline(&mut img, x, center_y - cap, center_y + cap, stroke, BLACK);
        }

        // Box filled with the class colour at reduced opacity.
        let fill = blend_on_white(self.classification.rgb(), BOX_ALPHA);
        fill_rect(&mut img, x_q1, center_y - half_box, x_q3, center_y + half_box, fill);
        outline_rect(&mut img, x_q1, center_y - half_box, x_q3, center_y + half_box, stroke, BLACK);

        // Median, emphasised.
        vline(
            &mut img,
            axis.to_px(s.median),
            center_y - half_box,
            center_y + half_box,
            stroke * 3,
            BLACK,
        );

        let outlier_r = (5.0 * unit).round().max(2.0) as i32;
        for &o in &s.outliers {
            draw_hollow_circle_mut(&mut img, (axis.to_px(o) as i32, center_y as i32), outlier_r, BLACK);
        }

        // ── Grade axis ───────────────────────────────────────────────────
        let axis_y = hf * 0.80;
        let tick_scale = PxScale::from(14.0 * unit);
        hline(&mut img, axis.left_px, axis.right_px, axis_y, stroke, BLACK);
        for (value, label) in axis.ticks() {
            let x = axis.to_px(value);
            vline(&mut img, x, axis_y, axis_y + 6.0 * unit, stroke, BLACK);
            draw_centered(&mut img, font, &label, tick_scale, x, axis_y + 9.0 * unit, GREY);
        }
        let label_scale = PxScale::from(16.0 * unit);
        draw_centered(
            &mut img,
            font,
            &self.style.axis_label,
            label_scale,
            (axis.left_px + axis.right_px) / 2.0,
            hf * 0.90,
            BLACK,
        );

        // ── Student marker, front-most ───────────────────────────────────
        let marker_r = (7.0 * unit).round().max(3.0) as i32;
        draw_filled_circle_mut(
            &mut img,
            (axis.to_px(record.grade).round() as i32, center_y.round() as i32),
            marker_r,
            MARKER_COLOR,
        );

        img
    }
}

/// Linear mapping from grade values to pixel columns.
struct Axis {
    lo: f64,
    hi: f64,
    left_px: f32,
    right_px: f32,
}

impl Axis {
    fn new(min: f64, max: f64, left_px: f32, right_px: f32) -> Self {
        let (mut lo, mut hi) = (min, max);
        if hi - lo < 1e-9 {
            lo -= 0.5;
            hi += 0.5;
        }
        let pad = (hi - lo) * 0.05;
        Self {
            lo: lo - pad,
            hi: hi + pad,
            left_px,
            right_px,
        }
    }

    fn to_px(&self, value: f64) -> f32 {
        let t = ((value - self.lo) / (self.hi - self.lo)) as f32;
        self.left_px + t * (self.right_px - self.left_px)
    }

    /// Evenly spaced tick values with their labels.
    fn ticks(&self) -> Vec<(f64, String)> {
        let step = nice_step(self.hi - self.lo);
        let decimals = decimals_for(step);
        let mut ticks = Vec::new();
        let mut i = (self.lo / step).ceil() as i64;
        loop {
            let value = i as f64 * step;
            if value > self.hi + 1e-9 {
                break;
            }
            ticks.push((value, format!("{value:.decimals$}")));
            i += 1;
        }
        ticks
    }
}

/// Round tick spacing (1, 2, 2.5 or 5 × 10ⁿ) giving about six ticks over `span`.
fn nice_step(span: f64) -> f64 {
    let raw = span / 6.0;
    let magnitude = 10f64.powi(raw.log10().floor() as i32);
    for m in [1.0, 2.0, 2.5, 5.0, 10.0] {
        if m * magnitude >= raw {
            return m * magnitude;
        }
    }
    10.0 * magnitude
}

fn decimals_for(step: f64) -> usize {
    (0..4)
        .find(|&d| {
            let scaled = step * 10f64.powi(d as i32);
            (scaled - scaled.round()).abs() < 1e-9
        })
        .unwrap_or(3)
}

/// `color` at opacity `alpha` over a white background.
fn blend_on_white(color: [u8; 3], alpha: f32) -> Rgb<u8> {
    let mix = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
    Rgb([mix(color[0]), mix(color[1]), mix(color[2])])
}

/// Largest scale ≤ `preferred` at which `text` fits into `max_width` pixels.
fn fit_scale(font: &FontRef<'static>, text: &str, preferred: f32, max_width: f32) -> PxScale {
    let (tw, _) = text_size(PxScale::from(preferred), font, text);
    if tw as f32 <= max_width || tw == 0 {
        PxScale::from(preferred)
    } else {
        PxScale::from(preferred * max_width / tw as f32)
    }
}

fn draw_centered(
    img: &mut RgbImage,
    font: &FontRef<'static>,
    text: &str,
    scale: PxScale,
    center_x: f32,
    top_y: f32,
    color: Rgb<u8>,
) {
    let (tw, _) = text_size(scale, font, text);
    let x = (center_x - tw as f32 / 2.0).round() as i32;
    draw_text_mut(img, color, x, top_y.round() as i32, scale, font, text);
}

fn fill_rect(img: &mut RgbImage, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgb<u8>) {
    let (left, right) = (x0.min(x1).round(), x0.max(x1).round());
    let (top, bottom) = (y0.min(y1).round(), y0.max(y1).round());
    let width = ((right - left) as u32).max(1);
    let height = ((bottom - top) as u32).max(1);
    draw_filled_rect_mut(img, Rect::at(left as i32, top as i32).of_size(width, height), color);
}

fn hline(img: &mut RgbImage, x0: f32, x1: f32, y: f32, stroke: u32, color: Rgb<u8>) {
    let half = stroke as f32 / 2.0;
    fill_rect(img, x0, y - half, x1, y - half + stroke as f32, color);
}

fn vline(img: &mut RgbImage, x: f32, y0: f32, y1: f32, stroke: u32, color: Rgb<u8>) {
    let half = stroke as f32 / 2.0;
    fill_rect(img, x - half, y0, x - half + stroke as f32, y1, color);
}

fn outline_rect(img: &mut RgbImage, x0: f32, y0: f32, x1: f32, y1: f32, stroke: u32, color: Rgb<u8>) {
    hline(img, x0, x1, y0, stroke, color);
    hline(img, x0, x1, y1, stroke, color);
    vline(img, x0, y0, y1, stroke, color);
    vline(img, x1, y0, y1, stroke, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageRange;

    fn record(id: &str, grade: f64, total: f64) -> Record {
        Record {
            identifier: id.into(),
            given_name: format!("{id}-given"),
            grade,
            total,
            title: "Aufsatz".into(),
            date: "2024-03-12".into(),
            pages: PageRange::new(1, 1),
        }
    }

    fn dataset() -> Dataset {
        Dataset::from_records(vec![record("A", 2.0, 20.0), record("B", 5.5, 48.0)]).unwrap()
    }

    fn renderer() -> StampRenderer {
        StampRenderer::new(&dataset(), StampStyle::default()).unwrap()
    }

    #[test]
    fn artifact_is_png_of_configured_size() {
        let artifact = renderer().render_for(&dataset(), "A").unwrap();
        assert_eq!((artifact.width, artifact.height), (960, 720));
        assert_eq!(&artifact.png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&artifact.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (960, 720));
        assert!((artifact.aspect_ratio() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn two_record_class_is_mixed() {
        assert_eq!(renderer().classification(), Classification::Mixed);
    }

    #[test]
    fn marker_sits_at_record_grade() {
        let r = renderer();
        let ds = dataset();
        let rec = ds.get("B").unwrap();
        let img = r.draw(rec, (*FONT).as_ref().unwrap());

        let axis = Axis::new(2.0, 5.5, 960.0 * 0.08, 960.0 * 0.95);
        let x = axis.to_px(5.5).round() as u32;
        let y = (720.0f32 * 0.56).round() as u32;
        assert_eq!(*img.get_pixel(x, y), MARKER_COLOR);
    }

    #[test]
    fn each_record_gets_its_own_stamp() {
        let r = renderer();
        let ds = dataset();
        let a = r.render_for(&ds, "A").unwrap();
        let b = r.render_for(&ds, "B").unwrap();
        assert_ne!(a.png, b.png);
    }

    #[test]
    fn unknown_identifier_is_render_error() {
        let err = renderer().render_for(&dataset(), "Nobody").unwrap_err();
        assert!(matches!(err, RecordError::Render { ref identifier, .. } if identifier == "Nobody"));
    }

    #[test]
    fn box_uses_translucent_class_colour() {
        let r = renderer();
        let ds = dataset();
        let img = r.draw(ds.get("A").unwrap(), (*FONT).as_ref().unwrap());

        let s = r.summary();
        let axis = Axis::new(2.0, 5.5, 960.0 * 0.08, 960.0 * 0.95);
        // Between Q1 and the median, away from the marker and the outline.
        let x = ((axis.to_px(s.q1) + axis.to_px(s.median)) / 2.0).round() as u32;
        let y = (720.0f32 * 0.56 - 720.0 * 0.05).round() as u32;
        assert_eq!(*img.get_pixel(x, y), blend_on_white(Classification::Mixed.rgb(), BOX_ALPHA));
    }

    #[test]
    fn identical_grades_still_render() {
        let ds = Dataset::from_records(vec![record("A", 4.0, 30.0), record("B", 4.0, 31.0)]).unwrap();
        let r = StampRenderer::new(&ds, StampStyle::default()).unwrap();
        let artifact = r.render_for(&ds, "B").unwrap();
        assert!(!artifact.png.is_empty());
    }

    #[test]
    fn nice_steps() {
        let approx = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(approx(nice_step(3.85), 1.0));
        assert!(approx(nice_step(1.1), 0.2));
        assert!(approx(nice_step(12.0), 2.0));
        assert_eq!(decimals_for(0.25), 2);
        assert_eq!(decimals_for(0.5), 1);
        assert_eq!(decimals_for(2.0), 0);
    }

    #[test]
    fn ticks_cover_axis() {
        let axis = Axis::new(2.0, 5.5, 0.0, 100.0);
        let ticks = axis.ticks();
        let values: Vec<f64> = ticks.iter().map(|(v, _)| *v).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ticks[0].1, "2");
    }
}
