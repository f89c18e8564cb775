//! Detection overlay.
//!
//! Rendering is split in two steps:
//!
//! 1. `OverlayPlan::build` maps detections from video pixel space onto the
//!    canvas and resolves the per-box style. Pure, no font needed.
//! 2. `OverlayRenderer` rasterises a plan onto a transparent RGBA canvas
//!    (or onto a copy of a frame) with `imageproc`.

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use std::path::Path;

use crate::detect::{ConfidenceTier, Detection};

pub const BADGE_POSITION: (i32, i32) = (10, 10);
pub const CENTER_DOT_RADIUS: i32 = 3;

const LABEL_HEIGHT: u32 = 18;
const LABEL_CHAR_WIDTH: u32 = 9;
const LABEL_PADDING: u32 = 4;
const BADGE_HEIGHT: u32 = 28;
const TEXT_SCALE: f32 = 16.0;
const BADGE_TEXT_SCALE: f32 = 20.0;

const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const YELLOW: Rgba<u8> = Rgba([255, 255, 0, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const LABEL_TEXT: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BADGE_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 180]);
const BADGE_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Size information of the video an overlay sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoGeometry {
    /// Pixel size of the decoded video, when known.
    pub intrinsic: Option<(u32, u32)>,
    /// Size the video is shown at.
    pub displayed: (u32, u32),
}

impl VideoGeometry {
    pub fn new(intrinsic: Option<(u32, u32)>, displayed: (u32, u32)) -> Self {
        Self {
            intrinsic,
            displayed,
        }
    }

    /// Both sizes are the same known value.
    pub fn fixed(width: u32, height: u32) -> Self {
        Self::new(Some((width, height)), (width, height))
    }

    /// Size detection coordinates are expressed in.
    pub fn source_size(&self) -> (u32, u32) {
        self.intrinsic
            .filter(|(w, h)| *w > 0 && *h > 0)
            .unwrap_or(self.displayed)
    }

    /// Canvas size matching the video: intrinsic, else displayed.
    pub fn canvas_size(&self) -> (u32, u32) {
        self.source_size()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierStyle {
    pub color: Rgba<u8>,
    pub thickness: u32,
}

impl TierStyle {
    pub fn of(tier: ConfidenceTier) -> Self {
        match tier {
            ConfidenceTier::High => TierStyle {
                color: GREEN,
                thickness: 3,
            },
            ConfidenceTier::Medium => TierStyle {
                color: YELLOW,
                thickness: 2,
            },
            ConfidenceTier::Low => TierStyle {
                color: RED,
                thickness: 1,
            },
        }
    }
}

/// One detection, in canvas pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    /// `[x1, y1, x2, y2]` scaled to the canvas.
    pub rect: [f32; 4],
    pub tier: ConfidenceTier,
    pub style: TierStyle,
    /// Confidence percentage, e.g. "87%".
    pub label: String,
    /// Label background `(x, y, width, height)`.
    pub label_rect: (i32, i32, u32, u32),
    pub center: (f32, f32),
    pub synthetic: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Badge {
    pub position: (i32, i32),
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayPlan {
    pub canvas: (u32, u32),
    pub boxes: Vec<OverlayBox>,
    /// `None` when box display is disabled.
    pub badge: Option<Badge>,
}

impl OverlayPlan {
    /// Plan for a canvas sized to the video itself.
    pub fn for_video(detections: &[Detection], video: VideoGeometry, show_boxes: bool) -> Self {
        Self::build(detections, video, video.canvas_size(), show_boxes)
    }

    /// Plan for an explicit canvas size. Boxes are scaled by
    /// `canvas / source` independently on each axis.
    pub fn build(
        detections: &[Detection],
        video: VideoGeometry,
        canvas: (u32, u32),
        show_boxes: bool,
    ) -> Self {
        let mut plan = OverlayPlan {
            canvas,
            boxes: Vec::new(),
            badge: None,
        };
        if !show_boxes {
            return plan;
        }
        let (source_w, source_h) = video.source_size();
        let scale_x = if source_w > 0 {
            canvas.0 as f32 / source_w as f32
        } else {
            1.0
        };
        let scale_y = if source_h > 0 {
            canvas.1 as f32 / source_h as f32
        } else {
            1.0
        };

        for detection in detections {
            let [x1, y1, x2, y2] = detection.bbox;
            let scaled = [x1 * scale_x, y1 * scale_y, x2 * scale_x, y2 * scale_y];
            let Some(rect) = clip_to_canvas(scaled, canvas) else {
                continue;
            };
            let tier = detection.tier();
            let label = format!("{:.0}%", detection.confidence * 100.0);
            let label_w = label.len() as u32 * LABEL_CHAR_WIDTH + LABEL_PADDING * 2;
            let label_x = rect[0].min(rect[2]).round() as i32;
            let label_y = (rect[1].min(rect[3]).round() as i32 - LABEL_HEIGHT as i32).max(0);
            plan.boxes.push(OverlayBox {
                rect,
                tier,
                style: TierStyle::of(tier),
                label,
                label_rect: (label_x, label_y, label_w, LABEL_HEIGHT),
                center: ((rect[0] + rect[2]) / 2.0, (rect[1] + rect[3]) / 2.0),
                synthetic: detection.synthetic,
            });
        }
        plan.badge = Some(Badge {
            position: BADGE_POSITION,
            text: format!("People: {}", detections.len()),
        });
        plan
    }
}

/// Intersect `[x1, y1, x2, y2]` with the canvas. `None` when nothing of the
/// box is on the canvas.
fn clip_to_canvas(rect: [f32; 4], canvas: (u32, u32)) -> Option<[f32; 4]> {
    if !rect.iter().all(|v| v.is_finite()) {
        return None;
    }
    let (w, h) = (canvas.0 as f32, canvas.1 as f32);
    let left = rect[0].min(rect[2]).max(0.0);
    let right = rect[0].max(rect[2]).min(w);
    let top = rect[1].min(rect[3]).max(0.0);
    let bottom = rect[1].max(rect[3]).min(h);
    if left > right || top > bottom || left >= w || top >= h {
        return None;
    }
    Some([left, top, right, bottom])
}

/// Rasterises overlay plans. Without a font, label and badge backgrounds
/// are drawn but their text is skipped.
#[derive(Clone, Default)]
pub struct OverlayRenderer {
    font: Option<FontArc>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    pub fn from_font_file(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|_| anyhow!("{} is not a usable font", path.display()))?;
        Ok(Self::with_font(font))
    }

    /// Renderer for an optional configured font; an unusable font is logged
    /// and ignored.
    pub fn from_config(font_path: Option<&Path>) -> Self {
        match font_path {
            Some(path) => match Self::from_font_file(path) {
                Ok(renderer) => renderer,
                Err(err) => {
                    log::warn!("Overlay: {:#}; labels will have no text", err);
                    Self::new()
                }
            },
            None => Self::new(),
        }
    }

    /// Transparent canvas with the plan drawn on it.
    pub fn render(&self, plan: &OverlayPlan) -> RgbaImage {
        let mut canvas = RgbaImage::new(plan.canvas.0, plan.canvas.1);
        self.draw(plan, &mut canvas);
        canvas
    }

    /// The plan drawn over a copy of `frame`. The frame is stretched to the
    /// plan's canvas when sizes differ.
    pub fn composite(&self, frame: &RgbImage, plan: &OverlayPlan) -> RgbaImage {
        let mut canvas = image::DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
        if canvas.dimensions() != plan.canvas && plan.canvas.0 > 0 && plan.canvas.1 > 0 {
            canvas = image::imageops::resize(
                &canvas,
                plan.canvas.0,
                plan.canvas.1,
                image::imageops::FilterType::Triangle,
            );
        }
        self.draw(plan, &mut canvas);
        canvas
    }

    fn draw(&self, plan: &OverlayPlan, canvas: &mut RgbaImage) {
        if canvas.width() == 0 || canvas.height() == 0 {
            return;
        }
        for item in &plan.boxes {
            let [x1, y1, x2, y2] = item.rect;
            let left = x1.min(x2).round() as i32;
            let top = y1.min(y2).round() as i32;
            let width = ((x2 - x1).abs().round() as u32).clamp(1, canvas.width());
            let height = ((y2 - y1).abs().round() as u32).clamp(1, canvas.height());
            for i in 0..item.style.thickness {
                let grow = i.saturating_mul(2);
                let rect = Rect::at(left.saturating_sub(i as i32), top.saturating_sub(i as i32))
                    .of_size(width.saturating_add(grow), height.saturating_add(grow));
                draw_hollow_rect_mut(canvas, rect, item.style.color);
            }

            let (lx, ly, lw, lh) = item.label_rect;
            draw_filled_rect_mut(canvas, Rect::at(lx, ly).of_size(lw, lh), item.style.color);
            if let Some(font) = &self.font {
                draw_text_mut(
                    canvas,
                    LABEL_TEXT,
                    lx + LABEL_PADDING as i32,
                    ly + 1,
                    PxScale::from(TEXT_SCALE),
                    font,
                    &item.label,
                );
            }

            draw_filled_circle_mut(
                canvas,
                (item.center.0.round() as i32, item.center.1.round() as i32),
                CENTER_DOT_RADIUS,
                item.style.color,
            );
        }

        if let Some(badge) = &plan.badge {
            let width = badge.text.len() as u32 * 11 + LABEL_PADDING * 2;
            draw_filled_rect_mut(
                canvas,
                Rect::at(badge.position.0, badge.position.1).of_size(width, BADGE_HEIGHT),
                BADGE_BACKGROUND,
            );
            if let Some(font) = &self.font {
                draw_text_mut(
                    canvas,
                    BADGE_TEXT,
                    badge.position.0 + LABEL_PADDING as i32,
                    badge.position.1 + 4,
                    PxScale::from(BADGE_TEXT_SCALE),
                    font,
                    &badge.text,
                );
            }
        }
    }
}
