use serde::Serialize;

/// Width of a 13.333in x 7.5in (16:9) presentation slide in EMU.
pub const DECK_WIDTH_EMU: i64 = 12_192_000;

/// Where an image lands on a fixed canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub scale: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer rectangle in English Metric Units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmuRect {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

/// Scale `img` uniformly to fit inside `canvas` and center it.
///
/// The scale factor is `min(canvas_w / img_w, canvas_h / img_h)`, so the
/// image is never distorted and one axis is always filled exactly.
pub fn fit_centered(img_w: u32, img_h: u32, canvas_w: u32, canvas_h: u32) -> Placement {
    let (iw, ih) = (img_w.max(1) as f64, img_h.max(1) as f64);
    let (cw, ch) = (canvas_w as f64, canvas_h as f64);

    let scale = (cw / iw).min(ch / ih);
    let width = iw * scale;
    let height = ih * scale;
    Placement {
        scale,
        x: (cw - width) / 2.0,
        y: (ch - height) / 2.0,
        width,
        height,
    }
}

/// Canvas height in EMU for a canvas of the given pixel aspect ratio.
pub fn canvas_height_emu(canvas_w: u32, canvas_h: u32) -> i64 {
    (DECK_WIDTH_EMU as f64 * canvas_h as f64 / canvas_w.max(1) as f64).round() as i64
}

impl Placement {
    /// Convert from canvas pixels to EMU.
    pub fn to_emu(&self, canvas_w: u32) -> EmuRect {
        let emu_per_px = DECK_WIDTH_EMU as f64 / canvas_w.max(1) as f64;
        EmuRect {
            x: (self.x * emu_per_px).round() as i64,
            y: (self.y * emu_per_px).round() as i64,
            cx: (self.width * emu_per_px).round() as i64,
            cy: (self.height * emu_per_px).round() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_aspect_fills_canvas() {
        let p = fit_centered(1920, 1080, 1280, 720);
        assert!((p.scale - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!((p.x, p.y), (0.0, 0.0));
        assert!((p.width - 1280.0).abs() < 1e-9);
        assert!((p.height - 720.0).abs() < 1e-9);
    }

    #[test]
    fn four_by_three_is_pillarboxed() {
        let p = fit_centered(1024, 768, 1280, 720);
        assert!((p.height - 720.0).abs() < 1e-9);
        assert!((p.width - 960.0).abs() < 1e-9);
        assert!((p.x - 160.0).abs() < 1e-9);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn wide_image_is_letterboxed_and_upscaled() {
        let p = fit_centered(400, 100, 1280, 720);
        assert!((p.scale - 3.2).abs() < 1e-9);
        assert!((p.height - 320.0).abs() < 1e-9);
        assert!((p.y - 200.0).abs() < 1e-9);
    }

    #[test]
    fn emu_conversion() {
        assert_eq!(canvas_height_emu(1280, 720), 6_858_000);
        let rect = fit_centered(1024, 768, 1280, 720).to_emu(1280);
        assert_eq!(rect, EmuRect { x: 1_524_000, y: 0, cx: 9_144_000, cy: 6_858_000 });
    }
}
