use crate::{angle, error::Error};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    num_derive::FromPrimitive,
    num_derive::ToPrimitive,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub(crate) enum KeypointKind {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

pub(crate) const NUM_KEYPOINTS: usize = 17;

/// A position in image space, in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct Point {
    pub(crate) x: f32,
    pub(crate) y: f32,
}

impl Point {
    pub(crate) fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A keypoint in the shape PoseNet's JS API reports it.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Keypoint {
    #[serde(rename = "part")]
    pub(crate) kind: KeypointKind,
    #[serde(rename = "position")]
    pub(crate) point: Point,
    pub(crate) score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Pose {
    #[serde(default)]
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) keypoints: Vec<Keypoint>,
}

impl Pose {
    pub(crate) fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Find the keypoint for `kind`, wherever it sits in the keypoint list.
    pub(crate) fn get(&self, kind: KeypointKind) -> Option<&Keypoint> {
        self.keypoints.iter().find(|keypoint| keypoint.kind == kind)
    }

    pub(crate) fn joint(&self, kind: KeypointKind) -> Result<&Keypoint, Error> {
        self.get(kind).ok_or(Error::MissingJoint(kind))
    }

    pub(crate) fn arm(&self, side: Side) -> Result<Arm, Error> {
        let [shoulder, elbow, wrist] = side.arm();
        Ok(Arm {
            shoulder: *self.joint(shoulder)?,
            elbow: *self.joint(elbow)?,
            wrist: *self.joint(wrist)?,
        })
    }

    /// Keypoints scoring at least `threshold`.
    #[cfg_attr(not(feature = "gui"), allow(dead_code))]
    pub(crate) fn visible_keypoints(&self, threshold: f32) -> impl Iterator<Item = &Keypoint> {
        self.keypoints
            .iter()
            .filter(move |keypoint| keypoint.score >= threshold)
    }

    /// Skeleton edges whose endpoints both score at least `threshold`.
    #[cfg_attr(not(feature = "gui"), allow(dead_code))]
    pub(crate) fn skeleton(&self, threshold: f32) -> impl Iterator<Item = (&Keypoint, &Keypoint)> {
        constants::CONNECTED_PARTS.iter().filter_map(move |&(a, b)| {
            match (self.get(a), self.get(b)) {
                (Some(a), Some(b)) if a.score >= threshold && b.score >= threshold => Some((a, b)),
                _ => None,
            }
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Side {
    /// Shoulder, elbow and wrist on this side.
    pub(crate) fn arm(self) -> [KeypointKind; 3] {
        use KeypointKind::*;

        match self {
            Self::Left => [LeftShoulder, LeftElbow, LeftWrist],
            Self::Right => [RightShoulder, RightElbow, RightWrist],
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(Error::ParseSide(s.to_owned())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// The three joints of one arm, taken from a single pose.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Arm {
    pub(crate) shoulder: Keypoint,
    pub(crate) elbow: Keypoint,
    pub(crate) wrist: Keypoint,
}

impl Arm {
    /// Interior elbow angle in degrees.
    pub(crate) fn elbow_angle(&self) -> f32 {
        angle::joint_angle(self.shoulder.point, self.elbow.point, self.wrist.point)
    }

    /// The least confident of the three joints.
    pub(crate) fn weakest(&self) -> &Keypoint {
        [&self.shoulder, &self.elbow, &self.wrist]
            .iter()
            .copied()
            .fold(&self.shoulder, |weakest, keypoint| {
                if keypoint.score < weakest.score {
                    keypoint
                } else {
                    weakest
                }
            })
    }
}

#[cfg_attr(not(feature = "gui"), allow(dead_code))]
pub(crate) mod constants {
    use crate::pose::KeypointKind::{self, *};

    /// Part pairs PoseNet draws as the skeleton.
    pub(crate) const CONNECTED_PARTS: [(KeypointKind, KeypointKind); 12] = [
        (LeftHip, LeftShoulder),
        (LeftElbow, LeftShoulder),
        (LeftElbow, LeftWrist),
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (RightHip, RightShoulder),
        (RightElbow, RightShoulder),
        (RightElbow, RightWrist),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
        (LeftShoulder, RightShoulder),
        (LeftHip, RightHip),
    ];
}
