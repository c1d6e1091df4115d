//! Cheap visual features for the fallback image search.
//!
//! Every image is scaled to 100x100 before anything is measured, so the
//! numbers are comparable between a phone photo and a catalogue thumbnail.

use anyhow::Context;
use image::imageops::FilterType;

const SIDE: u32 = 100;
const BINS: usize = 256;
const CLUSTERS: usize = 5;
const KMEANS_ROUNDS: usize = 5;

/// Largest variance a channel in `[0, 255]` can have.
const MAX_VARIANCE: f64 = 127.5 * 127.5;
/// Distance between black and white in RGB space.
const MAX_COLOR_DISTANCE: f64 = 441.672_955_930_063_7;

const W_HISTOGRAM: f64 = 0.4;
const W_COLORS: f64 = 0.3;
const W_BRIGHTNESS: f64 = 0.1;
const W_CONTRAST: f64 = 0.1;
const W_VARIANCE: f64 = 0.1;

pub const STRICT_THRESHOLD: f64 = 0.6;
pub const LOOSE_THRESHOLD: f64 = 0.5;
pub const MAX_RESULTS: usize = 8;

type Rgb = [f64; 3];

#[derive(Debug, Clone, PartialEq)]
pub struct ImageFeatures {
    /// Normalized grayscale histogram; sums to 1.
    pub histogram: Vec<f64>,
    /// Mean luma in `[0, 1]`.
    pub brightness: f64,
    /// Luma standard deviation in `[0, 1]`.
    pub contrast: f64,
    /// Per-channel variance in `[0, 1]`.
    pub rgb_variance: Rgb,
    pub dominant_colors: Vec<Rgb>,
}

fn luma([r, g, b]: Rgb) -> f64 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Decodes and measures an encoded image (JPEG, PNG, WebP or GIF).
pub fn extract(bytes: &[u8]) -> anyhow::Result<ImageFeatures> {
    let img = image::load_from_memory(bytes).context("decode image")?;
    let rgb = img.resize_exact(SIDE, SIDE, FilterType::Triangle).to_rgb8();
    let pixels: Vec<Rgb> = rgb
        .pixels()
        .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
        .collect();
    Ok(measure(&pixels))
}

fn measure(pixels: &[Rgb]) -> ImageFeatures {
    let n = pixels.len().max(1) as f64;

    let mut histogram = vec![0.0; BINS];
    let lumas: Vec<f64> = pixels.iter().map(|&p| luma(p)).collect();
    for &l in &lumas {
        let bin = (l.round() as usize).min(BINS - 1);
        histogram[bin] += 1.0;
    }
    for h in &mut histogram {
        *h /= n;
    }

    let mean_luma = lumas.iter().sum::<f64>() / n;
    let luma_var = lumas.iter().map(|l| (l - mean_luma).powi(2)).sum::<f64>() / n;

    let mut rgb_variance = [0.0; 3];
    for (c, slot) in rgb_variance.iter_mut().enumerate() {
        let mean = pixels.iter().map(|p| p[c]).sum::<f64>() / n;
        let var = pixels.iter().map(|p| (p[c] - mean).powi(2)).sum::<f64>() / n;
        *slot = (var / MAX_VARIANCE).min(1.0);
    }

    ImageFeatures {
        histogram,
        brightness: mean_luma / 255.0,
        contrast: luma_var.sqrt() / 255.0,
        rgb_variance,
        dominant_colors: kmeans(pixels, CLUSTERS, KMEANS_ROUNDS),
    }
}

fn distance(a: Rgb, b: Rgb) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Lloyd's k-means seeded with evenly spaced pixels. A cluster that loses
/// all its members keeps its previous centroid.
pub fn kmeans(points: &[Rgb], k: usize, rounds: usize) -> Vec<Rgb> {
    if points.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut centroids: Vec<Rgb> = (0..k).map(|i| points[i * points.len() / k]).collect();

    for _ in 0..rounds {
        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0usize; k];
        for &p in points {
            let nearest = centroids
                .iter()
                .enumerate()
                .map(|(i, &c)| (i, distance(p, c)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);
            for c in 0..3 {
                sums[nearest][c] += p[c];
            }
            counts[nearest] += 1;
        }
        for (i, centroid) in centroids.iter_mut().enumerate() {
            if counts[i] > 0 {
                let n = counts[i] as f64;
                *centroid = [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n];
            }
        }
    }
    centroids
}

fn histogram_intersection(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x.min(*y)).sum()
}

/// Mean over `a`'s colors of how close the nearest color in `b` is.
fn color_similarity(a: &[Rgb], b: &[Rgb]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let total: f64 = a
        .iter()
        .map(|&ca| {
            b.iter()
                .map(|&cb| distance(ca, cb))
                .fold(f64::INFINITY, f64::min)
        })
        .map(|d| 1.0 - (d / MAX_COLOR_DISTANCE).min(1.0))
        .sum();
    total / a.len() as f64
}

/// Weighted similarity in `[0, 1]`; 1 means indistinguishable.
pub fn similarity(a: &ImageFeatures, b: &ImageFeatures) -> f64 {
    let variance = (0..3)
        .map(|c| 1.0 - (a.rgb_variance[c] - b.rgb_variance[c]).abs())
        .sum::<f64>()
        / 3.0;

    W_HISTOGRAM * histogram_intersection(&a.histogram, &b.histogram)
        + W_COLORS * color_similarity(&a.dominant_colors, &b.dominant_colors)
        + W_BRIGHTNESS * (1.0 - (a.brightness - b.brightness).abs())
        + W_CONTRAST * (1.0 - (a.contrast - b.contrast).abs())
        + W_VARIANCE * variance
}

/// Best matches first. Uses the strict threshold when anything clears it,
/// the loose one otherwise, and returns the threshold that applied.
pub fn select<T>(mut scored: Vec<(T, f64)>) -> (Vec<(T, f64)>, f64) {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    let threshold = if scored.iter().any(|(_, s)| *s >= STRICT_THRESHOLD) {
        STRICT_THRESHOLD
    } else {
        LOOSE_THRESHOLD
    };
    scored.retain(|(_, s)| *s >= threshold);
    scored.truncate(MAX_RESULTS);
    (scored, threshold)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb as Pixel, RgbImage};
    use std::io::Cursor;

    /// PNG bytes of an image split into a left and a right color.
    pub(crate) fn two_tone_png(left: [u8; 3], right: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_fn(40, 40, |x, _| {
            if x < 20 {
                Pixel(left)
            } else {
                Pixel(right)
            }
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("encode png");
        out.into_inner()
    }

    #[test]
    fn histogram_is_normalized() {
        let f = extract(&two_tone_png([255, 0, 0], [0, 0, 255])).unwrap();
        assert_eq!(f.histogram.len(), BINS);
        let sum: f64 = f.histogram.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(f.dominant_colors.len(), CLUSTERS);
    }

    #[test]
    fn flat_image_has_no_contrast() {
        let f = extract(&two_tone_png([128, 128, 128], [128, 128, 128])).unwrap();
        assert!(f.contrast < 1e-9);
        assert!((f.brightness - 128.0 / 255.0).abs() < 1e-6);
        assert!(f.rgb_variance.iter().all(|v| *v < 1e-9));
    }

    #[test]
    fn identical_images_score_one() {
        let bytes = two_tone_png([200, 30, 30], [20, 20, 220]);
        let a = extract(&bytes).unwrap();
        let b = extract(&bytes).unwrap();
        assert_eq!(a, b);
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn different_images_score_lower() {
        let red = extract(&two_tone_png([220, 20, 20], [200, 40, 40])).unwrap();
        let near = extract(&two_tone_png([210, 30, 30], [190, 50, 50])).unwrap();
        let white = extract(&two_tone_png([255, 255, 255], [250, 250, 250])).unwrap();
        assert!(similarity(&red, &near) > similarity(&red, &white));
    }

    #[test]
    fn kmeans_separates_obvious_clusters() {
        let mut points = vec![[0.0, 0.0, 0.0]; 50];
        points.extend(vec![[255.0, 255.0, 255.0]; 50]);
        let centroids = kmeans(&points, 2, 5);
        assert_eq!(centroids, vec![[0.0, 0.0, 0.0], [255.0, 255.0, 255.0]]);
        assert!(kmeans(&[], 5, 5).is_empty());
    }

    #[test]
    fn select_prefers_strict_then_loose() {
        let (hits, threshold) = select(vec![("a", 0.55), ("b", 0.72), ("c", 0.61)]);
        assert_eq!(threshold, STRICT_THRESHOLD);
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec!["b", "c"]);

        let (hits, threshold) = select(vec![("a", 0.55), ("b", 0.3)]);
        assert_eq!(threshold, LOOSE_THRESHOLD);
        assert_eq!(hits.len(), 1);

        let many: Vec<_> = (0..12).map(|i| (i, 0.9)).collect();
        assert_eq!(select(many).0.len(), MAX_RESULTS);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(extract(b"definitely not an image").is_err());
    }
}
