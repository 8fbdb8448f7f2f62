//! Channel display settings: tint color and gradation curve.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::MetadataError;

/// An 8-bit RGB tint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    /// `#AARRGGBB` with full alpha.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#FF{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = MetadataError;

    /// Accepts `#AARRGGBB` (alpha ignored) and `#RRGGBB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MetadataError::InvalidValue {
            path: "Color".to_string(),
            message: format!("'{}' is not a #AARRGGBB color", s),
        };

        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let rgb = match hex.len() {
            8 => &hex[2..],
            6 => hex,
            _ => return Err(invalid()),
        };
        let value = u32::from_str_radix(rgb, 16).map_err(|_| invalid())?;
        Ok(Rgb::new(
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ))
    }
}

/// Piecewise-linear mapping from stored intensity to displayed intensity.
///
/// Control points are ordered and non-decreasing in input. Inputs before the
/// first point map to its output, inputs past the last point to the last
/// output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradationCurve {
    points: Vec<(f64, f64)>,
}

impl GradationCurve {
    /// # Errors
    /// `InvalidCurve` for fewer than two points, non-finite values, or inputs
    /// that decrease.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, MetadataError> {
        if points.len() < 2 {
            return Err(MetadataError::InvalidCurve(format!(
                "needs at least 2 control points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(MetadataError::InvalidCurve(
                "control points must be finite".into(),
            ));
        }
        if let Some(w) = points.windows(2).find(|w| w[1].0 < w[0].0) {
            return Err(MetadataError::InvalidCurve(format!(
                "input decreases from {} to {}",
                w[0].0, w[1].0
            )));
        }
        Ok(Self { points })
    }

    /// The identity over `[0, range_max]`.
    pub fn linear(range_max: f64) -> Self {
        Self {
            points: vec![(0.0, 0.0), (range_max, range_max)],
        }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Check every coordinate lies in `[0, range_max]`.
    pub fn check_range(&self, range_max: f64) -> Result<(), MetadataError> {
        let outside = |v: f64| !(0.0..=range_max).contains(&v);
        if let Some((x, y)) = self.points.iter().find(|(x, y)| outside(*x) || outside(*y)) {
            return Err(MetadataError::InvalidCurve(format!(
                "point ({}, {}) outside [0, {}]",
                x, y, range_max
            )));
        }
        Ok(())
    }

    /// Map an input intensity.
    pub fn evaluate(&self, x: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }

        // First segment whose end lies past x
        let i = self.points.partition_point(|p| p.0 <= x);
        let (x0, y0) = self.points[i - 1];
        let (x1, y1) = self.points[i];
        if x1 == x0 {
            return y1;
        }
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }

    /// Serialize as `x,y x,y ...`.
    pub fn to_points_string(&self) -> String {
        self.points
            .iter()
            .map(|(x, y)| format!("{},{}", x, y))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parse `x,y x,y ...`.
    pub fn from_points_string(s: &str) -> Result<Self, MetadataError> {
        let points = s
            .split_whitespace()
            .map(|pair| {
                let (x, y) = pair.split_once(',').ok_or_else(|| {
                    MetadataError::InvalidCurve(format!("'{}' is not an x,y pair", pair))
                })?;
                let parse = |v: &str| {
                    v.trim().parse::<f64>().map_err(|_| {
                        MetadataError::InvalidCurve(format!("'{}' is not a number", v))
                    })
                };
                Ok((parse(x)?, parse(y)?))
            })
            .collect::<Result<Vec<_>, MetadataError>>()?;
        Self::new(points)
    }
}

/// How one channel is rendered in a composite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDisplaySetting {
    pub tint: Rgb,
    pub curve: GradationCurve,
}

impl ChannelDisplaySetting {
    /// White tint, identity curve.
    pub fn neutral(range_max: f64) -> Self {
        Self {
            tint: Rgb::WHITE,
            curve: GradationCurve::linear(range_max),
        }
    }
}
