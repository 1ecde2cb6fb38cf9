//! Preprocessed renderings of a source image.
//!
//! No single image transform gives good OCR on every photo. Green document
//! backgrounds want a global threshold, shadows want a local threshold, and
//! small photos want upscaling. So we produce several variants and let the
//! ensemble try each of them.

use std::{collections::BTreeMap, fmt, sync::Arc};

use image::{DynamicImage, GrayImage, Luma, imageops::FilterType};
use imageproc::{
    contrast::{ThresholdType, otsu_level, threshold},
    filter::median_filter,
    integral_image::{integral_image, sum_image_pixels},
};
use schemars::JsonSchema;

use crate::prelude::*;

/// The name of an image variant.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VariantTag {
    /// The source image, at working resolution.
    Original,

    /// Luminance only.
    #[serde(alias = "gray")]
    Grayscale,

    /// Global threshold chosen by Otsu's method. Good for high-contrast text
    /// on a uniform colored background.
    Otsu,

    /// Local mean threshold. Good for uneven lighting, but adds speckle to
    /// clean images.
    Adaptive,

    /// Median-filtered grayscale, for especially noisy captures.
    Denoised,
}

impl VariantTag {
    /// Our tag as a lower-case string.
    pub fn as_str(self) -> &'static str {
        match self {
            VariantTag::Original => "original",
            VariantTag::Grayscale => "grayscale",
            VariantTag::Otsu => "otsu",
            VariantTag::Adaptive => "adaptive",
            VariantTag::Denoised => "denoised",
        }
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tuning knobs for variant generation.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantOptions {
    /// Images narrower than this are upscaled before anything else. Wider
    /// images are left alone, since upscaling them only loses sharpness.
    pub upscale_below_width: u32,

    /// How much to upscale small images by.
    pub upscale_factor: u32,

    /// Radius of the local threshold window. A radius of 5 gives an 11x11
    /// window.
    pub adaptive_radius: u32,

    /// Subtracted from the local mean before comparing.
    pub adaptive_bias: i32,

    /// Also generate the [`VariantTag::Denoised`] variant.
    pub denoise: bool,
}

impl Default for VariantOptions {
    fn default() -> Self {
        Self {
            upscale_below_width: 1000,
            upscale_factor: 2,
            adaptive_radius: 5,
            adaptive_bias: 2,
            denoise: false,
        }
    }
}

/// A set of variants generated from one source image.
///
/// Each variant is computed from the source independently, and none of them
/// share pixel data. The buffers are immutable once built, and are wrapped in
/// [`Arc`] so they can be handed to OCR tasks.
#[derive(Debug)]
pub struct ImageVariants {
    variants: BTreeMap<VariantTag, Arc<DynamicImage>>,
}

impl ImageVariants {
    /// Generate all our variants. This is CPU-heavy, so call it from a
    /// blocking task.
    #[instrument(level = "debug", skip_all, fields(width = source.width(), height = source.height()))]
    pub fn generate(source: &DynamicImage, opts: &VariantOptions) -> Self {
        let base = upscale_if_small(source, opts);
        let gray = base.to_luma8();

        let mut variants = BTreeMap::new();
        variants.insert(
            VariantTag::Otsu,
            DynamicImage::ImageLuma8(otsu_threshold(&gray)),
        );
        variants.insert(
            VariantTag::Adaptive,
            DynamicImage::ImageLuma8(mean_adaptive_threshold(
                &gray,
                opts.adaptive_radius,
                opts.adaptive_bias,
            )),
        );
        if opts.denoise {
            variants.insert(
                VariantTag::Denoised,
                DynamicImage::ImageLuma8(median_filter(&gray, 1, 1)),
            );
        }
        variants.insert(VariantTag::Grayscale, DynamicImage::ImageLuma8(gray));
        variants.insert(VariantTag::Original, base);
        Self {
            variants: variants
                .into_iter()
                .map(|(tag, image)| (tag, Arc::new(image)))
                .collect(),
        }
    }

    /// Get a variant by tag.
    pub fn get(&self, tag: VariantTag) -> Option<Arc<DynamicImage>> {
        self.variants.get(&tag).cloned()
    }

    /// Which variants do we have?
    pub fn tags(&self) -> impl Iterator<Item = VariantTag> + '_ {
        self.variants.keys().copied()
    }
}

/// Upscale small images to help with small fonts.
fn upscale_if_small(source: &DynamicImage, opts: &VariantOptions) -> DynamicImage {
    let (width, height) = (source.width(), source.height());
    if width >= opts.upscale_below_width || opts.upscale_factor <= 1 {
        return source.clone();
    }
    debug!(width, height, factor = opts.upscale_factor, "Upscaling small image");
    source.resize_exact(
        width.saturating_mul(opts.upscale_factor),
        height.saturating_mul(opts.upscale_factor),
        FilterType::CatmullRom,
    )
}

/// Binarize with a single threshold picked from the histogram.
pub fn otsu_threshold(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    trace!(level, "Otsu threshold");
    threshold(gray, level, ThresholdType::Binary)
}

/// Binarize each pixel against the mean of its neighborhood, minus `bias`.
///
/// Windows are clipped at the image edges. `imageproc`'s own
/// `adaptive_threshold` has no bias, which leaves flat regions speckled.
pub fn mean_adaptive_threshold(gray: &GrayImage, radius: u32, bias: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let sums = integral_image::<_, u64>(gray);

    GrayImage::from_fn(width, height, |x, y| {
        let left = x.saturating_sub(radius);
        let top = y.saturating_sub(radius);
        let right = x.saturating_add(radius).min(width - 1);
        let bottom = y.saturating_add(radius).min(height - 1);
        let [total] = sum_image_pixels(&sums, left, top, right, bottom);
        let count = u64::from(right - left + 1) * u64::from(bottom - top + 1);
        let mean = i32::try_from(total / count).unwrap_or(i32::MAX);
        if i32::from(gray.get_pixel(x, y)[0]) > mean - bias {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
