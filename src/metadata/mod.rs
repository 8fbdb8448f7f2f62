//! Metadata document and the typed views the engine needs from it.
//!
//! [`MetadataManager`] owns the container's [`MetadataDocument`] and reads or
//! writes three well-known parts of it:
//!
//! ```text
//! Metadata/Information/Image/ComponentBitCount       intensity range
//! Metadata/DisplaySetting/Channels/Channel[@Id=...]  tint and gradation curve
//! Metadata/Scaling/Items/Distance[@Id=X|Y|Z]/Value   physical pixel size
//! ```
//!
//! Everything else in the document is carried through untouched.

mod display;
mod document;
mod scaling;

use crate::error::MetadataError;
use crate::pixel::PixelType;

pub use display::{ChannelDisplaySetting, GradationCurve, Rgb};
pub use document::{MetadataDocument, XmlNode, ROOT_ELEMENT};
pub use scaling::Scaling;

pub const IMAGE_INFO_PATH: &str = "Metadata/Information/Image";
const BIT_COUNT_PATH: &str = "Metadata/Information/Image/ComponentBitCount";
const PIXEL_TYPE_PATH: &str = "Metadata/Information/Image/PixelType";
const CHANNELS_PATH: &str = "Metadata/DisplaySetting/Channels";

fn channel_path(channel: i32) -> String {
    format!("{}/Channel[@Id=Channel:{}]", CHANNELS_PATH, channel)
}

/// Typed access to a metadata document.
#[derive(Debug, Clone, Default)]
pub struct MetadataManager {
    document: MetadataDocument,
    /// Pixel type of the image data, used when the document declares none
    pixel_type: Option<PixelType>,
}

impl MetadataManager {
    pub fn new(document: MetadataDocument) -> Self {
        Self {
            document,
            pixel_type: None,
        }
    }

    /// Parse `xml`, or start an empty document if `xml` is blank.
    pub fn from_xml(xml: &str) -> Result<Self, MetadataError> {
        if xml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::new(MetadataDocument::parse(xml)?))
    }

    pub fn document(&self) -> &MetadataDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut MetadataDocument {
        &mut self.document
    }

    pub fn to_xml(&self) -> Result<String, MetadataError> {
        self.document.to_xml()
    }

    /// Pixel type of the image data, used as the intensity-range fallback.
    pub fn set_pixel_type(&mut self, pixel_type: PixelType) {
        self.pixel_type = Some(pixel_type);
    }

    /// Pixel type from the document, or the one set with
    /// [`set_pixel_type`](Self::set_pixel_type).
    pub fn pixel_type(&self) -> Option<PixelType> {
        self.document
            .get_text(PIXEL_TYPE_PATH)
            .and_then(|name| PixelType::from_name(name.trim()))
            .or(self.pixel_type)
    }

    /// Largest meaningful intensity value.
    ///
    /// Taken from `ComponentBitCount` when present (`2^bits - 1`), otherwise
    /// from the pixel type. Float data uses 1.0; with nothing known, 255.
    pub fn intensity_range(&self) -> f64 {
        self.known_intensity_range().unwrap_or(u8::MAX as f64)
    }

    /// Intensity range from the document or the pixel type, `None` while
    /// neither is known.
    pub fn known_intensity_range(&self) -> Option<f64> {
        self.declared_intensity_range()
            .or_else(|| self.pixel_type().map(|p| p.max_value() as f64))
    }

    /// Intensity range as declared by the document alone.
    pub fn declared_intensity_range(&self) -> Option<f64> {
        let pixel_type = self
            .document
            .get_text(PIXEL_TYPE_PATH)
            .and_then(|name| PixelType::from_name(name.trim()));
        if pixel_type == Some(PixelType::Gray32Float) {
            return Some(1.0);
        }

        match self.document.get_parsed::<u32>(BIT_COUNT_PATH) {
            Ok(Some(bits)) if (1..=32).contains(&bits) => Some(((1u64 << bits) - 1) as f64),
            _ => pixel_type.map(|p| p.max_value() as f64),
        }
    }

    /// Display setting stored for `channel`, if any.
    ///
    /// `Points` takes precedence; without it, `Low`/`High` (fractions of the
    /// intensity range) define a linear ramp. A stored channel without a
    /// color is white.
    pub fn display_setting(
        &self,
        channel: i32,
    ) -> Result<Option<ChannelDisplaySetting>, MetadataError> {
        let path = channel_path(channel);
        if self.document.node(&path).is_none() {
            return Ok(None);
        }

        let tint = match self.document.get_text(&format!("{}/Color", path)) {
            Some(color) if !color.trim().is_empty() => color.parse()?,
            _ => Rgb::WHITE,
        };

        let range_max = self.intensity_range();
        let curve = match self.document.get_text(&format!("{}/Points", path)) {
            Some(points) if !points.trim().is_empty() => {
                GradationCurve::from_points_string(points)?
            }
            _ => {
                let low = self
                    .document
                    .get_parsed::<f64>(&format!("{}/Low", path))?
                    .unwrap_or(0.0);
                let high = self
                    .document
                    .get_parsed::<f64>(&format!("{}/High", path))?
                    .unwrap_or(1.0);
                GradationCurve::new(vec![(low * range_max, 0.0), (high * range_max, range_max)])?
            }
        };

        Ok(Some(ChannelDisplaySetting { tint, curve }))
    }

    /// Stored setting, or white with an identity curve.
    pub fn display_setting_or_neutral(
        &self,
        channel: i32,
    ) -> Result<ChannelDisplaySetting, MetadataError> {
        Ok(self
            .display_setting(channel)?
            .unwrap_or_else(|| ChannelDisplaySetting::neutral(self.intensity_range())))
    }

    /// Store tint and curve for `channel`.
    ///
    /// While the intensity range is unknown, only negative control points are
    /// rejected; [`check_display_settings`](Self::check_display_settings)
    /// validates against the final range.
    ///
    /// # Errors
    /// `InvalidCurve` if a control point lies outside the intensity range.
    /// Nothing is modified on error.
    pub fn set_display_settings(
        &mut self,
        channel: i32,
        tint: Rgb,
        curve: &GradationCurve,
    ) -> Result<(), MetadataError> {
        curve.check_range(self.known_intensity_range().unwrap_or(f64::INFINITY))?;

        let path = channel_path(channel);
        let node = self.document.ensure(&path)?;
        if node.attribute("Name").is_none() {
            node.set_attribute("Name", format!("C{}", channel));
        }
        self.document.set_text(&format!("{}/Color", path), tint.to_string())?;
        self.document
            .set_text(&format!("{}/Points", path), curve.to_points_string())?;
        self.document.remove(&format!("{}/Low", path));
        self.document.remove(&format!("{}/High", path));
        Ok(())
    }

    /// Check every stored curve against the current intensity range.
    pub fn check_display_settings(&self) -> Result<(), MetadataError> {
        let range_max = self.intensity_range();
        for channel in self.display_channels() {
            if let Some(setting) = self.display_setting(channel)? {
                setting.curve.check_range(range_max).map_err(|e| match e {
                    MetadataError::InvalidCurve(message) => {
                        MetadataError::InvalidCurve(format!("channel {}: {}", channel, message))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    /// Channels with a stored display setting, in document order.
    pub fn display_channels(&self) -> Vec<i32> {
        self.document
            .node(CHANNELS_PATH)
            .map(|node| {
                node.children_named("Channel")
                    .filter_map(|c| c.attribute("Id"))
                    .filter_map(|id| id.strip_prefix("Channel:"))
                    .filter_map(|n| n.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn scaling(&self) -> Result<Scaling, MetadataError> {
        let mut scaling = Scaling::default();
        for axis in Scaling::AXES {
            scaling.set(axis, self.document.get_parsed::<f64>(&Scaling::path(axis))?);
        }
        Ok(scaling)
    }

    /// Store every axis that is `Some`.
    pub fn set_scaling(&mut self, scaling: &Scaling) -> Result<(), MetadataError> {
        for axis in Scaling::AXES {
            if let Some(value) = scaling.get(axis) {
                if !(value.is_finite() && value > 0.0) {
                    return Err(MetadataError::InvalidValue {
                        path: Scaling::path(axis),
                        message: format!("pixel size must be positive, got {}", value),
                    });
                }
            }
        }
        for axis in Scaling::AXES {
            if let Some(value) = scaling.get(axis) {
                self.document
                    .set_text(&Scaling::path(axis), format!("{:e}", value))?;
            }
        }
        Ok(())
    }
}
