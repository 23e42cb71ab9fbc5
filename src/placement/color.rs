//! Picks a readable text color from the template pixels under the anchor.
//!
//! Runs once when a placement is edited; the chosen color is then stored like
//! any explicit choice.

use super::Rgb;

/// Edge length of the square sampled around the anchor.
pub const SAMPLE_SIZE: u32 = 50;

/// Average luminance above which the background counts as light.
pub const LUMINANCE_THRESHOLD: f64 = 150.0;

pub const DARK_TEXT: Rgb = Rgb::new(0x11, 0x18, 0x27);
pub const LIGHT_TEXT: Rgb = Rgb::new(0xf5, 0xf7, 0xff);

/// Row-major pixel buffer of the preview surface.
#[derive(Debug, Clone, Copy)]
pub struct Surface<'a> {
    pub width: u32,
    pub height: u32,
    /// 3 for RGB, 4 for RGBA; alpha is ignored.
    pub channels: usize,
    pub pixels: &'a [u8],
}

impl<'a> Surface<'a> {
    /// Infers RGB vs RGBA from the buffer length. `None` if it matches neither.
    pub fn new(width: u32, height: u32, pixels: &'a [u8]) -> Option<Self> {
        let count = width as usize * height as usize;
        if count == 0 {
            return None;
        }
        let channels = match pixels.len() / count {
            3 | 4 if pixels.len() % count == 0 => pixels.len() / count,
            _ => return None,
        };
        Some(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    fn pixel(&self, x: u32, y: u32) -> Rgb {
        let offset = (y as usize * self.width as usize + x as usize) * self.channels;
        Rgb::new(
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        )
    }
}

pub fn luminance(color: Rgb) -> f64 {
    0.299 * f64::from(color.r) + 0.587 * f64::from(color.g) + 0.114 * f64::from(color.b)
}

/// Luminance of the per-channel mean (each mean floored to an integer).
pub fn average_luminance(samples: &[Rgb]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as u64;
    let (r, g, b) = samples.iter().fold((0u64, 0u64, 0u64), |(r, g, b), c| {
        (r + u64::from(c.r), g + u64::from(c.g), b + u64::from(c.b))
    });
    Some(luminance(Rgb::new((r / n) as u8, (g / n) as u8, (b / n) as u8)))
}

pub fn contrasting_text(average_luminance: f64) -> Rgb {
    if average_luminance > LUMINANCE_THRESHOLD {
        DARK_TEXT
    } else {
        LIGHT_TEXT
    }
}

/// Pixels of a `size`-wide square centered on `(center_x, center_y)`,
/// cropped to the surface.
pub fn sample_square(surface: &Surface<'_>, center_x: u32, center_y: u32, size: u32) -> Vec<Rgb> {
    let crop = |center: u32, limit: u32| {
        let start = i64::from(center) - i64::from(size / 2);
        let end = start + i64::from(size);
        (start.max(0) as u32, end.min(i64::from(limit)).max(0) as u32)
    };
    let (x0, x1) = crop(center_x, surface.width);
    let (y0, y1) = crop(center_y, surface.height);

    let mut samples = Vec::with_capacity((x1.saturating_sub(x0) * y1.saturating_sub(y0)) as usize);
    for y in y0..y1 {
        for x in x0..x1 {
            samples.push(surface.pixel(x, y));
        }
    }
    samples
}

/// Suggests a text color for an anchor at `(ratio_x, ratio_y)` on `surface`.
pub fn suggest_text_color(surface: &Surface<'_>, ratio_x: f64, ratio_y: f64) -> Option<Rgb> {
    let center_x = ((f64::from(surface.width) * ratio_x.clamp(0.0, 1.0)).floor() as u32)
        .min(surface.width.saturating_sub(1));
    let center_y = ((f64::from(surface.height) * ratio_y.clamp(0.0, 1.0)).floor() as u32)
        .min(surface.height.saturating_sub(1));
    let samples = sample_square(surface, center_x, center_y, SAMPLE_SIZE);
    average_luminance(&samples).map(contrasting_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        rgba.repeat((width * height) as usize)
    }

    #[test]
    fn luminance_uses_rec601_weights() {
        assert_eq!(luminance(Rgb::new(255, 255, 255)), 255.0);
        assert_eq!(luminance(Rgb::new(0, 0, 0)), 0.0);
        assert!((luminance(Rgb::new(100, 200, 50)) - 153.0).abs() < 1e-9);
    }

    #[test]
    fn threshold_splits_light_and_dark_backgrounds() {
        assert_eq!(contrasting_text(151.0), DARK_TEXT);
        assert_eq!(contrasting_text(150.0), LIGHT_TEXT);
        assert_eq!(contrasting_text(20.0), LIGHT_TEXT);
    }

    #[test]
    fn white_background_gets_dark_text() {
        let pixels = solid(200, 100, [250, 250, 250, 255]);
        let surface = Surface::new(200, 100, &pixels).unwrap();
        assert_eq!(surface.channels, 4);
        assert_eq!(suggest_text_color(&surface, 0.5, 0.5), Some(DARK_TEXT));
    }

    #[test]
    fn navy_background_gets_light_text() {
        let pixels = [10u8, 20, 80].repeat(120 * 80);
        let surface = Surface::new(120, 80, &pixels).unwrap();
        assert_eq!(surface.channels, 3);
        assert_eq!(suggest_text_color(&surface, 0.1, 0.9), Some(LIGHT_TEXT));
    }

    #[test]
    fn only_the_neighbourhood_of_the_anchor_counts() {
        // Left half black, right half white.
        let (w, h) = (200u32, 60u32);
        let mut pixels = Vec::new();
        for _ in 0..h {
            for x in 0..w {
                let v = if x < w / 2 { 0 } else { 255 };
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        let surface = Surface::new(w, h, &pixels).unwrap();
        assert_eq!(suggest_text_color(&surface, 0.1, 0.5), Some(LIGHT_TEXT));
        assert_eq!(suggest_text_color(&surface, 0.9, 0.5), Some(DARK_TEXT));
    }

    #[test]
    fn square_is_cropped_at_the_corner() {
        let pixels = solid(30, 30, [0, 0, 0, 255]);
        let surface = Surface::new(30, 30, &pixels).unwrap();
        assert_eq!(sample_square(&surface, 0, 0, SAMPLE_SIZE).len(), 25 * 25);
        assert_eq!(sample_square(&surface, 29, 29, 10).len(), 6 * 6);
        assert_eq!(sample_square(&surface, 15, 15, 10).len(), 100);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        assert!(Surface::new(10, 10, &[0u8; 250]).is_none());
        assert!(Surface::new(0, 10, &[]).is_none());
    }
}
