//! CDN image transformations.
//!
//! Rendered as the ImageKit-style `tr` query parameter, e.g.
//! `?tr=w-400,h-300,f-webp,q-80`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Auto,
    Webp,
    Avif,
    Jpg,
    Png,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Auto => "auto",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ImageFormat::Auto),
            "webp" => Ok(ImageFormat::Webp),
            "avif" => Ok(ImageFormat::Avif),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "png" => Ok(ImageFormat::Png),
            _ => Err(format!("Unknown image format: {}", s)),
        }
    }
}

/// How the image is fitted to the requested box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    MaintainRatio,
    Force,
    AtMax,
    AtLeast,
}

impl CropMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CropMode::MaintainRatio => "maintain_ratio",
            CropMode::Force => "force",
            CropMode::AtMax => "at_max",
            CropMode::AtLeast => "at_least",
        }
    }
}

impl FromStr for CropMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maintain_ratio" => Ok(CropMode::MaintainRatio),
            "force" => Ok(CropMode::Force),
            "at_max" => Ok(CropMode::AtMax),
            "at_least" => Ok(CropMode::AtLeast),
            _ => Err(format!("Unknown crop mode: {}", s)),
        }
    }
}

/// A set of transformations; unset fields are omitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTransform {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<ImageFormat>,
    /// 1..=100
    pub quality: Option<u8>,
    pub crop: Option<CropMode>,
}

impl ImageTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality.clamp(1, 100));
        self
    }

    pub fn crop(mut self, crop: CropMode) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Comma-separated transformation list, e.g. `w-400,h-300,f-webp,q-80`
    pub fn to_param(&self) -> String {
        let mut parts = Vec::new();
        if let Some(w) = self.width {
            parts.push(format!("w-{}", w));
        }
        if let Some(h) = self.height {
            parts.push(format!("h-{}", h));
        }
        if let Some(f) = self.format {
            parts.push(format!("f-{}", f.as_str()));
        }
        if let Some(q) = self.quality {
            parts.push(format!("q-{}", q));
        }
        if let Some(c) = self.crop {
            parts.push(format!("c-{}", c.as_str()));
        }
        parts.join(",")
    }
}

/// Append the transformation to a CDN URL
pub fn transform_url(url: &str, transform: &ImageTransform) -> String {
    if transform.is_empty() || url.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}tr={}", url, separator, transform.to_param())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_param_order() {
        let t = ImageTransform::new()
            .quality(80)
            .format(ImageFormat::Webp)
            .height(300)
            .width(400);
        assert_eq!(t.to_param(), "w-400,h-300,f-webp,q-80");
    }

    #[test]
    fn test_transform_url() {
        let base = "https://ik.imagekit.io/demo/blog/cover.jpg";
        let t = ImageTransform::new().width(800).crop(CropMode::AtMax);
        assert_eq!(
            transform_url(base, &t),
            "https://ik.imagekit.io/demo/blog/cover.jpg?tr=w-800,c-at_max"
        );
        assert_eq!(
            transform_url(&format!("{}?v=2", base), &t),
            format!("{}?v=2&tr=w-800,c-at_max", base)
        );
        assert_eq!(transform_url(base, &ImageTransform::new()), base);
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(ImageTransform::new().quality(0).quality, Some(1));
        assert_eq!(ImageTransform::new().quality(250).quality, Some(100));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("JPEG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpg);
        assert!("gif".parse::<ImageFormat>().is_err());
        assert_eq!("at_least".parse::<CropMode>().unwrap(), CropMode::AtLeast);
    }
}
