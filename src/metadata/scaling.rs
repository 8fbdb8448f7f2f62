//! Physical pixel size.

use serde::Serialize;

/// Size of one pixel along each axis, in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scaling {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl Scaling {
    pub(super) const AXES: [char; 3] = ['X', 'Y', 'Z'];

    pub(super) fn path(axis: char) -> String {
        format!("Metadata/Scaling/Items/Distance[@Id={}]/Value", axis)
    }

    pub fn get(&self, axis: char) -> Option<f64> {
        match axis {
            'X' => self.x,
            'Y' => self.y,
            'Z' => self.z,
            _ => None,
        }
    }

    pub(super) fn set(&mut self, axis: char, value: Option<f64>) {
        match axis {
            'X' => self.x = value,
            'Y' => self.y = value,
            'Z' => self.z = value,
            _ => {}
        }
    }
}
