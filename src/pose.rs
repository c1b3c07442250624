//! Pose data types shared between the decoder and the renderers.

use nalgebra::{Point2, Point3};

/// Number of body keypoints the network predicts per person.
pub const NUM_KEYPOINTS: usize = 18;

/// The body keypoints detected by the network, in heatmap channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeypointKind {
    Nose = 0,
    Neck,
    RightShoulder,
    RightElbow,
    RightWrist,
    LeftShoulder,
    LeftElbow,
    LeftWrist,
    RightHip,
    RightKnee,
    RightAnkle,
    LeftHip,
    LeftKnee,
    LeftAnkle,
    RightEye,
    LeftEye,
    RightEar,
    LeftEar,
}

impl KeypointKind {
    /// All keypoint kinds, ordered by heatmap channel.
    pub const ALL: [Self; NUM_KEYPOINTS] = [
        Self::Nose,
        Self::Neck,
        Self::RightShoulder,
        Self::RightElbow,
        Self::RightWrist,
        Self::LeftShoulder,
        Self::LeftElbow,
        Self::LeftWrist,
        Self::RightHip,
        Self::RightKnee,
        Self::RightAnkle,
        Self::LeftHip,
        Self::LeftKnee,
        Self::LeftAnkle,
        Self::RightEye,
        Self::LeftEye,
        Self::RightEar,
        Self::LeftEar,
    ];

    /// Returns the heatmap channel index of this keypoint.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Keypoint pairs connected by a skeleton bone, used for drawing.
pub const SKELETON_EDGES: [(KeypointKind, KeypointKind); 17] = {
    use KeypointKind::*;
    [
        (Neck, RightShoulder),
        (Neck, LeftShoulder),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (Neck, RightHip),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
        (Neck, LeftHip),
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (Neck, Nose),
        (Nose, RightEye),
        (RightEye, RightEar),
        (Nose, LeftEye),
        (LeftEye, LeftEar),
    ]
};

/// A single detected keypoint of a pose.
#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    /// Position in source frame coordinates (pixels).
    pub position: Point2<f32>,
    /// Network confidence for this keypoint.
    pub score: f32,
    /// Position in 3D camera space (or world space when camera extrinsics are loaded), in
    /// centimeters.
    pub world: Point3<f32>,
}

/// One detected person.
#[derive(Debug, Clone)]
pub struct Pose {
    pub(crate) id: u32,
    pub(crate) keypoints: [Option<Keypoint>; NUM_KEYPOINTS],
    pub(crate) score: f32,
}

impl Pose {
    /// A tracking ID that is stable across frames for continuous sources.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The mean confidence of all detected keypoints.
    #[inline]
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Returns the given keypoint, if the network detected it.
    #[inline]
    pub fn keypoint(&self, kind: KeypointKind) -> Option<Keypoint> {
        self.keypoints[kind.index()]
    }

    /// Iterates over all detected keypoints of this pose.
    pub fn keypoints(&self) -> impl Iterator<Item = (KeypointKind, Keypoint)> + '_ {
        KeypointKind::ALL
            .iter()
            .filter_map(|&kind| self.keypoint(kind).map(|kp| (kind, kp)))
    }

    /// Number of keypoints the network detected for this pose.
    pub fn num_keypoints(&self) -> usize {
        self.keypoints.iter().filter(|kp| kp.is_some()).count()
    }
}
