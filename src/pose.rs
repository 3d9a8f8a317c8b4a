//! Cartesian poses in the robot base frame

use serde::{Deserialize, Serialize};

/// Joint angles in degrees [j1..j6]
pub type Joints = [f64; 6];

/// TCP pose: position in millimeters, orientation in degrees.
///
/// Serialized as a flat `[x, y, z, rx, ry, rz]` array so calibration
/// tables read the same way they are taught on the pendant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Self { x, y, z, rx, ry, rz }
    }

    /// Same pose raised (or lowered) along Z
    pub fn offset_z(&self, dz: f64) -> Self {
        Self { z: self.z + dz, ..*self }
    }

    pub fn offset_y(&self, dy: f64) -> Self {
        Self { y: self.y + dy, ..*self }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.rx, self.ry, self.rz]
    }

    /// Euclidean distance between the two positions, ignoring orientation
    pub fn distance_to(&self, other: &Pose) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Round every component to `decimal_places` for display
    pub fn rounded(&self, decimal_places: u32) -> Self {
        let multiplier = 10.0_f64.powi(decimal_places as i32);
        let round_value = |value: f64| (value * multiplier).round() / multiplier;
        let [x, y, z, rx, ry, rz] = self.to_array().map(round_value);
        Self { x, y, z, rx, ry, rz }
    }
}

impl From<[f64; 6]> for Pose {
    fn from(v: [f64; 6]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }
}

impl From<Pose> for [f64; 6] {
    fn from(p: Pose) -> Self {
        p.to_array()
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.2}, {:.2}, {:.2}, {:.2}, {:.2}, {:.2}]",
            self.x, self.y, self.z, self.rx, self.ry, self.rz
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_serializes_as_array() {
        let pose = Pose::new(178.02, 536.38, 213.98, -179.31, -0.71, 133.68);
        let json = serde_json::to_string(&pose).unwrap();
        assert_eq!(json, "[178.02,536.38,213.98,-179.31,-0.71,133.68]");

        let parsed: Pose = serde_yaml::from_str("[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]").unwrap();
        assert_eq!(parsed, Pose::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0));
    }

    #[test]
    fn test_offsets_keep_other_components() {
        let pose = Pose::new(10.0, 20.0, 30.0, 1.0, 2.0, 3.0);
        let raised = pose.offset_z(200.0);
        assert_eq!(raised.z, 230.0);
        assert_eq!((raised.x, raised.y, raised.rx, raised.ry, raised.rz), (10.0, 20.0, 1.0, 2.0, 3.0));
        assert_eq!(pose.offset_y(-25.0).y, -5.0);
    }

    #[test]
    fn test_rounded() {
        let pose = Pose::new(1.23456, -2.98765, 0.0, 0.0, 0.0, 0.0).rounded(2);
        assert_eq!(pose.x, 1.23);
        assert_eq!(pose.y, -2.99);
    }
}
