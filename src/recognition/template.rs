//! Normalized cross-correlation template matching.
//!
//! Scores follow the mean-subtracted normalized correlation coefficient
//! (OpenCV's `TM_CCOEFF_NORMED`), clamped to `[0, 1]`.

use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use rayon::prelude::*;
use std::path::Path;

/// Best placement of a template inside an image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemplateMatch {
    pub score: f32,
    /// Top-left corner of the best placement, relative to the searched image.
    pub x: u32,
    pub y: u32,
}

/// Slides `template` over every valid placement in `image` and returns the
/// best one. An image smaller than the template has no placement and scores 0.
pub fn match_template(image: &GrayImage, template: &GrayImage) -> TemplateMatch {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    let mut best = TemplateMatch {
        score: 0.0,
        x: 0,
        y: 0,
    };
    if tw == 0 || th == 0 || iw < tw || ih < th {
        return best;
    }

    let n = (tw * th) as f64;
    let t_mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let t_dev: Vec<f64> = template.pixels().map(|p| p[0] as f64 - t_mean).collect();
    let t_energy: f64 = t_dev.iter().map(|d| d * d).sum();
    if t_energy <= f64::EPSILON {
        return best;
    }

    for oy in 0..=(ih - th) {
        for ox in 0..=(iw - tw) {
            let mut sum = 0.0;
            for ty in 0..th {
                for tx in 0..tw {
                    sum += image.get_pixel(ox + tx, oy + ty)[0] as f64;
                }
            }
            let i_mean = sum / n;

            let mut cross = 0.0;
            let mut i_energy = 0.0;
            for ty in 0..th {
                for tx in 0..tw {
                    let d = image.get_pixel(ox + tx, oy + ty)[0] as f64 - i_mean;
                    cross += d * t_dev[(ty * tw + tx) as usize];
                    i_energy += d * d;
                }
            }
            if i_energy <= f64::EPSILON {
                continue;
            }

            let score = (cross / (t_energy * i_energy).sqrt()).clamp(0.0, 1.0) as f32;
            if score > best.score {
                best = TemplateMatch { score, x: ox, y: oy };
            }
        }
    }

    best
}

/// Loads a template image from disk as 8-bit grayscale.
pub fn load_gray(path: &Path) -> Result<GrayImage> {
    let img = image::open(path)
        .with_context(|| format!("Failed to load template {}", path.display()))?;
    Ok(img.to_luma8())
}

/// The ten reference glyphs for digits 0-9. Immutable after load.
pub struct DigitTemplates {
    templates: Vec<GrayImage>,
}

/// Best digit for one glyph window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DigitMatch {
    pub digit: u8,
    pub score: f32,
}

impl DigitTemplates {
    /// Loads `{d}_gray_image.png` for d in 0..=9 from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let templates = (0..10)
            .map(|d| load_gray(&dir.join(format!("{}_gray_image.png", d))))
            .collect::<Result<Vec<_>>>()?;
        Self::from_images(templates)
    }

    pub fn from_images(templates: Vec<GrayImage>) -> Result<Self> {
        if templates.len() != 10 {
            return Err(anyhow!(
                "Expected 10 digit templates, got {}",
                templates.len()
            ));
        }
        Ok(Self { templates })
    }

    /// Scores `window` against all ten templates and returns the best digit.
    ///
    /// The ten comparisons are independent and run on the rayon pool; the
    /// call returns only after all of them finish.
    pub fn best_match(&self, window: &GrayImage) -> DigitMatch {
        let scores: Vec<f32> = self
            .templates
            .par_iter()
            .map(|template| match_template(window, template).score)
            .collect();

        // Sequential pick keeps ties deterministic (lowest digit wins).
        let mut best = DigitMatch {
            digit: 0,
            score: scores[0],
        };
        for (digit, &score) in scores.iter().enumerate().skip(1) {
            if score > best.score {
                best = DigitMatch {
                    digit: digit as u8,
                    score,
                };
            }
        }
        best
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    /// Deterministic high-contrast pattern, distinct per seed.
    pub(crate) fn pattern(seed: u32, width: u32, height: u32) -> GrayImage {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(0x9E37_79B9);
        GrayImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            Luma([if (state >> 24) & 1 == 1 { 230 } else { 20 }])
        })
    }

    pub(crate) fn digit_templates() -> DigitTemplates {
        DigitTemplates::from_images((0..10).map(|d| pattern(d, 11, 17)).collect()).unwrap()
    }

    #[test]
    fn test_identical_images_score_one() {
        let t = pattern(4, 11, 17);
        let m = match_template(&t, &t);
        assert!(m.score > 0.999, "score was {}", m.score);
        assert_eq!((m.x, m.y), (0, 0));
    }

    #[test]
    fn test_match_is_brightness_invariant() {
        let t = pattern(4, 11, 17);
        let brighter = GrayImage::from_fn(11, 17, |x, y| Luma([t.get_pixel(x, y)[0] / 2 + 100]));
        assert!(match_template(&brighter, &t).score > 0.999);
    }

    #[test]
    fn test_finds_offset_placement() {
        let t = pattern(9, 5, 5);
        let mut haystack = GrayImage::from_pixel(20, 10, Luma([128]));
        image::imageops::replace(&mut haystack, &t, 12, 3);
        let m = match_template(&haystack, &t);
        assert!(m.score > 0.999);
        assert_eq!((m.x, m.y), (12, 3));
    }

    #[test]
    fn test_smaller_image_scores_zero() {
        let t = pattern(1, 11, 17);
        let small = pattern(1, 5, 5);
        assert_eq!(match_template(&small, &t).score, 0.0);
    }

    #[test]
    fn test_flat_window_scores_zero() {
        let t = pattern(2, 11, 17);
        let flat = GrayImage::from_pixel(11, 17, Luma([90]));
        assert_eq!(match_template(&flat, &t).score, 0.0);
    }

    #[test]
    fn test_best_match_picks_correct_digit() {
        let templates = digit_templates();
        for d in 0..10 {
            let m = templates.best_match(&pattern(d, 11, 17));
            assert_eq!(m.digit, d as u8);
            assert!(m.score > 0.999);
        }
    }

    #[test]
    fn test_template_count_is_checked() {
        assert!(DigitTemplates::from_images(vec![pattern(0, 3, 3)]).is_err());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        for d in 0..10 {
            pattern(d, 11, 17)
                .save(dir.path().join(format!("{}_gray_image.png", d)))
                .unwrap();
        }
        let templates = DigitTemplates::load(dir.path()).unwrap();
        assert_eq!(templates.best_match(&pattern(6, 11, 17)).digit, 6);
    }

    #[test]
    fn test_load_reports_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DigitTemplates::load(dir.path()).is_err());
    }
}
