//! Image-to-tensor conversion for the two ONNX models.

use image::{DynamicImage, imageops::FilterType};
use ndarray::Array4;

use super::ModelError;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const LOW_PERCENTILE: f32 = 1.0;
const HIGH_PERCENTILE: f32 = 99.0;
const RANGE_EPSILON: f32 = 1e-8;

/// NCHW RGB tensor normalised with ImageNet statistics.
pub(crate) fn classifier_tensor(image: &DynamicImage, size: u32) -> Result<Array4<f32>, ModelError> {
    ensure_non_empty(image)?;
    let rgb = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / 255.0;
            tensor[[0, channel, y as usize, x as usize]] =
                (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
        }
    }
    Ok(tensor)
}

/// NHWC single-channel tensor, percentile clipped and scaled into `[0, 1]`.
pub(crate) fn segmenter_tensor(image: &DynamicImage, size: u32) -> Result<Array4<f32>, ModelError> {
    ensure_non_empty(image)?;
    let gray = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_luma8();
    let mut sorted: Vec<f32> = gray.as_raw().iter().map(|&v| f32::from(v)).collect();
    sorted.sort_by(f32::total_cmp);
    let low = percentile(&sorted, LOW_PERCENTILE);
    let high = percentile(&sorted, HIGH_PERCENTILE);
    let range = high - low + RANGE_EPSILON;

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, side, side, 1));
    for (x, y, pixel) in gray.enumerate_pixels() {
        let clipped = f32::from(pixel[0]).clamp(low, high);
        tensor[[0, y as usize, x as usize, 0]] = (clipped - low) / range;
    }
    Ok(tensor)
}

/// Percentile with linear interpolation between closest ranks.
pub(crate) fn percentile(sorted: &[f32], q: f32) -> f32 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = (q.clamp(0.0, 100.0) / 100.0) * (len - 1) as f32;
            let lower = rank.floor() as usize;
            let upper = (lower + 1).min(len - 1);
            let fraction = rank - lower as f32;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

/// Numerically stable softmax.
pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|v| v / sum).collect()
    } else {
        vec![f32::NAN; logits.len()]
    }
}

fn ensure_non_empty(image: &DynamicImage) -> Result<(), ModelError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ModelError::Preprocess(format!(
            "image has zero size ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}
