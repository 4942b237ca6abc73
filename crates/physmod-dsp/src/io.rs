//! Input and output points of a module.
//!
//! Outputs are the taps the instrument sums into the stereo frame. Inputs
//! record where excitation enters; exciters register theirs when attached.

use serde::{Deserialize, Serialize};

use crate::resonator::{Location, OutputKind};

/// Stereo routing of one point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Left,
    Right,
    #[default]
    Both,
}

impl Channel {
    /// (left, right) multipliers.
    pub fn gains(self) -> (f64, f64) {
        match self {
            Self::Left => (1.0, 0.0),
            Self::Right => (0.0, 1.0),
            Self::Both => (1.0, 1.0),
        }
    }
}

fn unit_gain() -> f64 {
    1.0
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IoPoint {
    pub location: Location,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default = "unit_gain")]
    pub gain: f64,
    #[serde(default)]
    pub kind: OutputKind,
}

impl IoPoint {
    pub fn new(location: Location, channel: Channel) -> Self {
        Self {
            location,
            channel,
            gain: 1.0,
            kind: OutputKind::Displacement,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_kind(mut self, kind: OutputKind) -> Self {
        self.kind = kind;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InOutInfo {
    inputs: Vec<IoPoint>,
    outputs: Vec<IoPoint>,
}

impl InOutInfo {
    pub fn inputs(&self) -> &[IoPoint] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[IoPoint] {
        &self.outputs
    }

    pub fn add_input(&mut self, point: IoPoint) {
        self.inputs.push(point);
    }

    pub fn reserve_inputs(&mut self, additional: usize) {
        self.inputs.reserve(additional);
    }

    /// Remove the first input equal to `point`.
    pub fn remove_input(&mut self, point: &IoPoint) -> bool {
        remove_first(&mut self.inputs, point)
    }

    pub fn add_output(&mut self, point: IoPoint) {
        self.outputs.push(point);
    }

    pub fn remove_output(&mut self, point: &IoPoint) -> bool {
        remove_first(&mut self.outputs, point)
    }
}

fn remove_first(points: &mut Vec<IoPoint>, point: &IoPoint) -> bool {
    match points.iter().position(|p| p == point) {
        Some(i) => {
            points.remove(i);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_gains() {
        assert_eq!(Channel::Left.gains(), (1.0, 0.0));
        assert_eq!(Channel::Right.gains(), (0.0, 1.0));
        assert_eq!(Channel::Both.gains(), (1.0, 1.0));
    }

    #[test]
    fn test_add_and_remove_points() {
        let mut io = InOutInfo::default();
        let a = IoPoint::new(Location::along(0.2), Channel::Left);
        let b = IoPoint::new(Location::along(0.8), Channel::Right).with_gain(0.5);
        io.add_output(a);
        io.add_output(b);
        io.add_output(a);
        assert!(io.remove_output(&a));
        assert_eq!(io.outputs(), &[b, a]);
        assert!(!io.remove_output(&IoPoint::new(Location::along(0.9), Channel::Both)));

        io.add_input(a);
        assert!(io.remove_input(&a));
        assert!(io.inputs().is_empty());
    }

    #[test]
    fn test_io_point_json_defaults() {
        let p: IoPoint = serde_json::from_str(r#"{ "location": { "x": 0.3 } }"#).unwrap();
        assert_eq!(p.channel, Channel::Both);
        assert_eq!(p.gain, 1.0);
        assert_eq!(p.kind, OutputKind::Displacement);
    }
}
