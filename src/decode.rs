//! Decoding of raw network outputs into [`Pose`]s.
//!
//! The network has three output heads, all at 1/8th of the input resolution:
//!
//! - 19 keypoint heatmaps (18 body keypoints plus background),
//! - 38 part affinity field channels (an (x, y) vector field per skeleton limb),
//! - 57 feature channels holding root-relative 3D coordinates for 19 panoptic joints.
//!
//! Decoding extracts heatmap peaks, groups them into per-person skeletons along the part
//! affinity fields, and lifts each skeleton to 3D by sampling the feature maps. For continuous
//! sources the decoder additionally tracks poses across frames, keeping their IDs stable and
//! smoothing keypoint motion.

use std::{cmp::Reverse, collections::HashMap};

use anyhow::bail;
use nalgebra::{Point2, Point3, Vector2, Vector3};

use crate::{
    extrinsics::Extrinsics,
    filter::{Ema, EmaState, Filter},
    iter::zip_exact,
    nn::{Outputs, Tensor},
    num::TotalF32,
    pose::{Keypoint, KeypointKind, Pose, NUM_KEYPOINTS},
    timer::Timer,
};

const FEATURE_CHANNELS: usize = 57;
const HEATMAP_CHANNELS: usize = 19;
const PAF_CHANNELS: usize = 38;

/// Minimum heatmap value for a cell to count as a keypoint candidate.
const PEAK_THRESHOLD: f32 = 0.1;
/// Minimum distance between two peaks of the same keypoint, in grid cells.
const MIN_PEAK_DISTANCE: f32 = 3.0;

/// Number of points sampled along a candidate limb when integrating the affinity field.
const PAF_SAMPLES: usize = 10;
/// Minimum alignment between the affinity vector and the limb direction at a sample point.
const PAF_SCORE_THRESHOLD: f32 = 0.05;
/// Fraction of samples that must be aligned for the limb to be accepted.
const MIN_PAF_RATIO: f32 = 0.8;

/// Poses with fewer detected keypoints than this are discarded.
const MIN_KEYPOINTS: usize = 3;

/// Maximum keypoint movement between frames for pose tracking, in source pixels.
const MATCH_RADIUS: f32 = 40.0;
/// Keypoints that have to fall within [`MATCH_RADIUS`] for a pose to keep its ID.
const MIN_MATCHED_KEYPOINTS: usize = 3;

/// Smoothing factor applied to tracked keypoints.
const SMOOTH_ALPHA: f32 = 0.5;

/// Keypoint index pairs forming the limbs used for grouping.
///
/// The last 2 limbs (ear to shoulder) are redundant and only merge existing skeletons, they
/// never start a new one.
const LIMB_KPT_IDS: [(usize, usize); 19] = [
    (1, 2),
    (1, 5),
    (2, 3),
    (3, 4),
    (5, 6),
    (6, 7),
    (1, 8),
    (8, 9),
    (9, 10),
    (1, 11),
    (11, 12),
    (12, 13),
    (1, 0),
    (0, 14),
    (14, 16),
    (0, 15),
    (15, 17),
    (2, 16),
    (5, 17),
];

/// Affinity field channel pairs ((x, y) channel) for each limb in [`LIMB_KPT_IDS`].
const LIMB_PAF_IDS: [(usize, usize); 19] = [
    (12, 13),
    (20, 21),
    (14, 15),
    (16, 17),
    (22, 23),
    (24, 25),
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (8, 9),
    (10, 11),
    (28, 29),
    (30, 31),
    (34, 35),
    (32, 33),
    (36, 37),
    (18, 19),
    (26, 27),
];

/// Maps a keypoint's heatmap channel to its joint index in the 3D feature maps, which use the
/// CMU Panoptic joint order.
const PANOPTIC_IDS: [usize; NUM_KEYPOINTS] =
    [1, 0, 9, 10, 11, 3, 4, 5, 12, 13, 14, 6, 7, 8, 15, 16, 17, 18];

/// Decodes network outputs into 2D/3D poses and tracks them over time.
pub struct PoseDecoder {
    stride: u32,
    extrinsics: Option<Extrinsics>,
    prev_poses: Vec<Pose>,
    next_id: u32,
    smooth: HashMap<u32, KeypointFilters>,
    t_peaks: Timer,
    t_group: Timer,
    t_lift: Timer,
}

// x, y, and world xyz per keypoint.
type KeypointFilters = [[EmaState; 5]; NUM_KEYPOINTS];

impl PoseDecoder {
    /// Creates a decoder for a network with the given output stride.
    ///
    /// If `extrinsics` are given, 3D keypoints are transformed from camera space to world
    /// space.
    pub fn new(stride: u32, extrinsics: Option<Extrinsics>) -> Self {
        Self {
            stride,
            extrinsics,
            prev_poses: Vec::new(),
            next_id: 0,
            smooth: HashMap::new(),
            t_peaks: Timer::new("peaks"),
            t_group: Timer::new("group"),
            t_lift: Timer::new("lift"),
        }
    }

    /// Decodes one set of network outputs.
    ///
    /// `input_scale` is the factor the source frame was scaled by before inference and maps
    /// keypoints back into source coordinates. `fx` is the camera focal length in source
    /// pixels.
    ///
    /// `temporal` enables pose tracking and smoothing and should only be set for continuous
    /// sources. When disabled, pose IDs restart at 0 for every call.
    pub fn decode(
        &mut self,
        outputs: &Outputs,
        input_scale: f32,
        fx: f32,
        temporal: bool,
    ) -> anyhow::Result<Vec<Pose>> {
        let (features, heatmaps, pafs) = identify_outputs(outputs)?;

        let peaks = {
            let _guard = self.t_peaks.start();
            extract_peaks(heatmaps)
        };
        let skeletons = {
            let _guard = self.t_group.start();
            group_peaks(&peaks, pafs)
        };
        let mut poses = {
            let _guard = self.t_lift.start();
            skeletons
                .iter()
                .filter_map(|skeleton| {
                    lift_pose(
                        skeleton,
                        &peaks,
                        features,
                        self.stride,
                        input_scale,
                        fx,
                        self.extrinsics.as_ref(),
                    )
                })
                .collect::<Vec<_>>()
        };

        if temporal {
            self.track(&mut poses);
        } else {
            self.prev_poses.clear();
            self.smooth.clear();
            self.next_id = 0;
            for (i, pose) in poses.iter_mut().enumerate() {
                pose.id = i as u32;
            }
        }
        self.prev_poses = poses.clone();

        Ok(poses)
    }

    /// Returns the phase timers of this decoder.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_peaks, &self.t_group, &self.t_lift].into_iter()
    }

    /// Matches `poses` against the previous frame, carrying over IDs and smoothing keypoints.
    fn track(&mut self, poses: &mut [Pose]) {
        let ema = Ema::new(SMOOTH_ALPHA);
        let mut claimed = vec![false; self.prev_poses.len()];
        for pose in poses.iter_mut() {
            let mut best: Option<(usize, usize)> = None;
            for (i, prev) in self.prev_poses.iter().enumerate() {
                if claimed[i] {
                    continue;
                }
                let matched = KeypointKind::ALL
                    .iter()
                    .filter(|&&kind| match (pose.keypoint(kind), prev.keypoint(kind)) {
                        (Some(a), Some(b)) => (a.position - b.position).norm() <= MATCH_RADIUS,
                        _ => false,
                    })
                    .count();
                if matched >= MIN_MATCHED_KEYPOINTS && best.map_or(true, |(_, n)| matched > n) {
                    best = Some((i, matched));
                }
            }

            match best {
                Some((i, _)) => {
                    claimed[i] = true;
                    pose.id = self.prev_poses[i].id;
                }
                None => {
                    pose.id = self.next_id;
                    self.next_id += 1;
                }
            }

            let states = self.smooth.entry(pose.id).or_default();
            for (kp, state) in zip_exact(pose.keypoints.iter_mut(), states.iter_mut()) {
                if let Some(kp) = kp {
                    kp.position.x = ema.filter(&mut state[0], kp.position.x);
                    kp.position.y = ema.filter(&mut state[1], kp.position.y);
                    kp.world.x = ema.filter(&mut state[2], kp.world.x);
                    kp.world.y = ema.filter(&mut state[3], kp.world.y);
                    kp.world.z = ema.filter(&mut state[4], kp.world.z);
                }
            }
        }

        // Drop filter state of poses that left the scene.
        self.smooth.retain(|id, _| poses.iter().any(|p| p.id == *id));
    }
}

/// Identifies the 3 output heads by their channel count, in any order.
fn identify_outputs(outputs: &Outputs) -> anyhow::Result<(&Tensor, &Tensor, &Tensor)> {
    if outputs.len() != 3 {
        bail!("expected 3 output tensors, model produced {}", outputs.len());
    }

    let mut features = None;
    let mut heatmaps = None;
    let mut pafs = None;
    for tensor in outputs {
        let shape = tensor.shape();
        if shape.len() != 4 || shape[0] != 1 {
            bail!("unexpected output tensor shape {shape:?}");
        }
        match shape[1] {
            FEATURE_CHANNELS => features = Some(tensor),
            HEATMAP_CHANNELS => heatmaps = Some(tensor),
            PAF_CHANNELS => pafs = Some(tensor),
            n => bail!("output with {n} channels does not match any known head"),
        }
    }
    match (features, heatmaps, pafs) {
        (Some(features), Some(heatmaps), Some(pafs)) => {
            if features.shape()[2..] != heatmaps.shape()[2..]
                || features.shape()[2..] != pafs.shape()[2..]
            {
                bail!(
                    "output heads disagree about the grid size ({:?} / {:?} / {:?})",
                    features.shape(),
                    heatmaps.shape(),
                    pafs.shape(),
                );
            }
            Ok((features, heatmaps, pafs))
        }
        _ => bail!("model outputs are missing a required head"),
    }
}

/// A keypoint candidate in heatmap grid coordinates.
#[derive(Debug, Clone, Copy)]
struct Peak {
    pos: Point2<f32>,
    score: f32,
}

/// Extracts local heatmap maxima for each of the 18 keypoint channels.
///
/// Peak positions are refined by a quarter cell towards the stronger neighbor, which recovers
/// some of the precision lost to the output stride.
fn extract_peaks(heatmaps: &Tensor) -> Vec<Vec<Peak>> {
    let (h, w) = (heatmaps.shape()[2], heatmaps.shape()[3]);
    let mut all = Vec::with_capacity(NUM_KEYPOINTS);
    // Channel 18 is the background and has no peaks of interest.
    for channel in 0..NUM_KEYPOINTS {
        let map = heatmaps.index([0, channel]);
        let data = map.as_slice();
        let at = |x: i64, y: i64| -> f32 {
            if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
                f32::NEG_INFINITY
            } else {
                data[y as usize * w + x as usize]
            }
        };

        let mut candidates = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let value = data[y * w + x];
                if value < PEAK_THRESHOLD {
                    continue;
                }
                let (xi, yi) = (x as i64, y as i64);
                let is_max = [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)]
                    .iter()
                    .all(|&(dx, dy)| value >= at(xi + dx, yi + dy));
                if is_max {
                    candidates.push((xi, yi, value));
                }
            }
        }
        candidates.sort_by_key(|&(_, _, value)| Reverse(TotalF32(value)));

        let mut peaks: Vec<Peak> = Vec::new();
        for (x, y, score) in candidates {
            let pos = Point2::new(x as f32, y as f32);
            if peaks
                .iter()
                .any(|peak| (peak.pos - pos).norm() < MIN_PEAK_DISTANCE)
            {
                continue;
            }

            let mut refined = pos;
            if at(x + 1, y) > at(x - 1, y) {
                refined.x += 0.25;
            } else if at(x + 1, y) < at(x - 1, y) {
                refined.x -= 0.25;
            }
            if at(x, y + 1) > at(x, y - 1) {
                refined.y += 0.25;
            } else if at(x, y + 1) < at(x, y - 1) {
                refined.y -= 0.25;
            }
            peaks.push(Peak {
                pos: refined,
                score,
            });
        }
        all.push(peaks);
    }
    all
}

/// A partially assembled skeleton. Entries are indices into the per-keypoint peak lists.
#[derive(Debug)]
struct Skeleton {
    kp: [Option<usize>; NUM_KEYPOINTS],
}

/// Groups keypoint peaks into per-person skeletons along the part affinity fields.
fn group_peaks(peaks: &[Vec<Peak>], pafs: &Tensor) -> Vec<Skeleton> {
    let mut skeletons: Vec<Skeleton> = Vec::new();
    for (limb, (&(kp_a, kp_b), &paf_channels)) in
        zip_exact(LIMB_KPT_IDS.iter(), LIMB_PAF_IDS.iter()).enumerate()
    {
        let peaks_a = &peaks[kp_a];
        let peaks_b = &peaks[kp_b];

        let mut connections = Vec::new();
        for (ai, a) in peaks_a.iter().enumerate() {
            for (bi, b) in peaks_b.iter().enumerate() {
                if let Some(score) = paf_score(pafs, paf_channels, a.pos, b.pos) {
                    connections.push((ai, bi, score));
                }
            }
        }
        connections.sort_by_key(|&(_, _, score)| Reverse(TotalF32(score)));

        let mut used_a = vec![false; peaks_a.len()];
        let mut used_b = vec![false; peaks_b.len()];
        for (ai, bi, _) in connections {
            if used_a[ai] || used_b[bi] {
                continue;
            }
            used_a[ai] = true;
            used_b[bi] = true;

            let at_a = skeletons.iter().position(|s| s.kp[kp_a] == Some(ai));
            let at_b = skeletons.iter().position(|s| s.kp[kp_b] == Some(bi));
            match (at_a, at_b) {
                (Some(i), Some(j)) if i == j => {}
                (Some(i), Some(j)) => {
                    // Two partial skeletons turn out to be the same person. Merge them if they
                    // don't compete for a keypoint slot.
                    let disjoint = zip_exact(skeletons[i].kp.iter(), skeletons[j].kp.iter())
                        .all(|(a, b)| a.is_none() || b.is_none());
                    if disjoint {
                        let donor = skeletons.swap_remove(j.max(i));
                        let target = &mut skeletons[j.min(i)];
                        for (slot, donated) in zip_exact(target.kp.iter_mut(), donor.kp.iter()) {
                            if slot.is_none() {
                                *slot = *donated;
                            }
                        }
                    }
                }
                (Some(i), None) => {
                    if skeletons[i].kp[kp_b].is_none() {
                        skeletons[i].kp[kp_b] = Some(bi);
                    }
                }
                (None, Some(j)) => {
                    if skeletons[j].kp[kp_a].is_none() {
                        skeletons[j].kp[kp_a] = Some(ai);
                    }
                }
                (None, None) => {
                    // The redundant tail limbs never seed a new skeleton.
                    if limb < LIMB_KPT_IDS.len() - 2 {
                        let mut kp = [None; NUM_KEYPOINTS];
                        kp[kp_a] = Some(ai);
                        kp[kp_b] = Some(bi);
                        skeletons.push(Skeleton { kp });
                    }
                }
            }
        }
    }
    skeletons
}

/// Integrates the affinity field along the line from `a` to `b`.
///
/// Returns the mean alignment if enough sample points agree with the limb direction.
fn paf_score(
    pafs: &Tensor,
    (channel_x, channel_y): (usize, usize),
    a: Point2<f32>,
    b: Point2<f32>,
) -> Option<f32> {
    let (h, w) = (pafs.shape()[2], pafs.shape()[3]);
    let dir = b - a;
    let len = dir.norm();
    if len < 1e-4 {
        return None;
    }
    let dir = dir / len;
    let field_x = pafs.index([0, channel_x]);
    let field_x = field_x.as_slice();
    let field_y = pafs.index([0, channel_y]);
    let field_y = field_y.as_slice();

    let mut aligned = 0;
    let mut sum = 0.0;
    for i in 0..PAF_SAMPLES {
        let t = i as f32 / (PAF_SAMPLES - 1) as f32;
        let p = a + (b - a) * t;
        let (x, y) = (p.x.round() as i64, p.y.round() as i64);
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            continue;
        }
        let idx = y as usize * w + x as usize;
        let paf = Vector2::new(field_x[idx], field_y[idx]);
        let dot = paf.dot(&dir);
        if dot > PAF_SCORE_THRESHOLD {
            aligned += 1;
            sum += dot;
        }
    }

    if (aligned as f32) < PAF_SAMPLES as f32 * MIN_PAF_RATIO {
        None
    } else {
        Some(sum / aligned as f32)
    }
}

/// Turns a grouped skeleton into a [`Pose`], mapping keypoints back into source coordinates
/// and lifting them to 3D.
fn lift_pose(
    skeleton: &Skeleton,
    peaks: &[Vec<Peak>],
    features: &Tensor,
    stride: u32,
    input_scale: f32,
    fx: f32,
    extrinsics: Option<&Extrinsics>,
) -> Option<Pose> {
    let num = skeleton.kp.iter().filter(|kp| kp.is_some()).count();
    if num < MIN_KEYPOINTS {
        return None;
    }

    let (grid_h, grid_w) = (features.shape()[2], features.shape()[3]);
    let mut keypoints = [None; NUM_KEYPOINTS];
    let mut relative = [None; NUM_KEYPOINTS];
    let mut score_sum = 0.0;
    for kind in KeypointKind::ALL {
        let Some(peak_index) = skeleton.kp[kind.index()] else {
            continue;
        };
        let peak = peaks[kind.index()][peak_index];
        score_sum += peak.score;

        // The feature maps hold root-relative 3D coordinates (in cm), sampled at the
        // keypoint's own grid cell.
        let gx = (peak.pos.x.max(0.0) as usize).min(grid_w - 1);
        let gy = (peak.pos.y.max(0.0) as usize).min(grid_h - 1);
        let joint = PANOPTIC_IDS[kind.index()];
        let rel = Vector3::new(
            features.index([0, joint * 3, gy, gx]).as_singular(),
            features.index([0, joint * 3 + 1, gy, gx]).as_singular(),
            features.index([0, joint * 3 + 2, gy, gx]).as_singular(),
        );
        relative[kind.index()] = Some(rel);

        keypoints[kind.index()] = Some(Keypoint {
            position: peak.pos * stride as f32 / input_scale,
            score: peak.score,
            world: Point3::origin(),
        });
    }

    // Weak perspective: the ratio of the skeleton's 2D and 3D extents gives its distance from
    // the camera, anchored at the mean keypoint.
    let mut mean2 = Vector2::zeros();
    let mut mean3 = Vector2::zeros();
    for (kp, rel) in zip_exact(keypoints.iter(), relative.iter()) {
        if let (Some(kp), Some(rel)) = (kp, rel) {
            mean2 += kp.position.coords;
            mean3 += rel.xy();
        }
    }
    mean2 /= num as f32;
    mean3 /= num as f32;
    let mut spread2 = 0.0;
    let mut spread3 = 0.0;
    for (kp, rel) in zip_exact(keypoints.iter(), relative.iter()) {
        if let (Some(kp), Some(rel)) = (kp, rel) {
            spread2 += (kp.position.coords - mean2).norm();
            spread3 += (rel.xy() - mean3).norm();
        }
    }
    let translation = if spread2 > f32::EPSILON {
        let ratio = spread3 / spread2;
        Vector3::new(ratio * mean2.x - mean3.x, ratio * mean2.y - mean3.y, ratio * fx)
    } else {
        Vector3::zeros()
    };

    for (kp, rel) in zip_exact(keypoints.iter_mut(), relative.iter()) {
        if let (Some(kp), Some(rel)) = (kp, rel) {
            let world = Point3::from(rel + translation);
            kp.world = match extrinsics {
                Some(extrinsics) => extrinsics.camera_to_world(world),
                None => world,
            };
        }
    }

    Some(Pose {
        id: 0,
        keypoints,
        score: score_sum / num as f32,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn zeros(channels: usize, h: usize, w: usize) -> Tensor {
        Tensor::from_shape_fn([1, channels, h, w], |_| 0.0)
    }

    /// Builds outputs containing a 3 keypoint pose: nose at (2, 1), neck at (2, 2) and right
    /// hip at (2, 4), on an 8x8 grid.
    fn synthetic_outputs() -> Outputs {
        let heatmaps = Tensor::from_shape_fn([1, HEATMAP_CHANNELS, 8, 8], |[_, c, y, x]| {
            match (c, y, x) {
                (0, 1, 2) | (1, 2, 2) | (8, 4, 2) => 0.9,
                _ => 0.0,
            }
        });
        // Fill the affinity channels of the neck-nose and neck-hip limbs with their unit
        // directions so that the line integrals fully align.
        let pafs = Tensor::from_shape_fn([1, PAF_CHANNELS, 8, 8], |[_, c, _, _]| match c {
            29 => -1.0, // neck -> nose points up
            1 => 1.0,   // neck -> right hip points down
            _ => 0.0,
        });
        let features =
            Tensor::from_shape_fn([1, FEATURE_CHANNELS, 8, 8], |[_, c, _, _]| c as f32);
        Outputs::from(vec![pafs, features, heatmaps])
    }

    #[test]
    fn identifies_heads_in_any_order() {
        let outputs = synthetic_outputs();
        let (features, heatmaps, pafs) = identify_outputs(&outputs).unwrap();
        assert_eq!(features.shape()[1], FEATURE_CHANNELS);
        assert_eq!(heatmaps.shape()[1], HEATMAP_CHANNELS);
        assert_eq!(pafs.shape()[1], PAF_CHANNELS);
    }

    #[test]
    fn rejects_malformed_outputs() {
        let outputs = Outputs::from(vec![zeros(19, 8, 8), zeros(38, 8, 8)]);
        assert!(identify_outputs(&outputs).is_err());

        let outputs = Outputs::from(vec![zeros(19, 8, 8), zeros(38, 8, 8), zeros(21, 8, 8)]);
        assert!(identify_outputs(&outputs).is_err());

        // Grid size mismatch between heads.
        let outputs = Outputs::from(vec![zeros(19, 8, 8), zeros(38, 8, 8), zeros(57, 4, 4)]);
        assert!(identify_outputs(&outputs).is_err());
    }

    #[test]
    fn peak_refinement_moves_towards_stronger_neighbor() {
        let heatmaps = Tensor::from_shape_fn([1, HEATMAP_CHANNELS, 8, 8], |[_, c, y, x]| {
            match (c, y, x) {
                (0, 2, 3) => 0.9,
                (0, 2, 4) => 0.5,
                (0, 2, 2) => 0.1,
                (0, 1, 3) => 0.2,
                (0, 3, 3) => 0.1,
                _ => 0.0,
            }
        });
        let peaks = extract_peaks(&heatmaps);
        assert_eq!(peaks[0].len(), 1);
        let peak = peaks[0][0];
        assert_relative_eq!(peak.pos.x, 3.25);
        assert_relative_eq!(peak.pos.y, 1.75);
        assert_relative_eq!(peak.score, 0.9);
        assert!(peaks[1..].iter().all(|p| p.is_empty()));
    }

    #[test]
    fn nearby_duplicate_peaks_are_suppressed() {
        let heatmaps = Tensor::from_shape_fn([1, HEATMAP_CHANNELS, 8, 8], |[_, c, y, x]| {
            match (c, y, x) {
                (0, 2, 2) => 0.9,
                // Local max of its own 3x3 neighborhood, but within suppression range.
                (0, 2, 4) => 0.8,
                (0, 2, 3) => 0.1,
                _ => 0.0,
            }
        });
        let peaks = extract_peaks(&heatmaps);
        assert_eq!(peaks[0].len(), 1);
        assert_relative_eq!(peaks[0][0].score, 0.9);
    }

    #[test]
    fn decodes_single_pose() {
        let mut decoder = PoseDecoder::new(8, None);
        let poses = decoder
            .decode(&synthetic_outputs(), 0.5, 100.0, false)
            .unwrap();
        assert_eq!(poses.len(), 1);
        let pose = &poses[0];
        assert_eq!(pose.id(), 0);
        assert_eq!(pose.num_keypoints(), 3);
        assert_relative_eq!(pose.score(), 0.9, epsilon = 1e-5);

        // Grid coordinates scale by stride / input_scale = 16.
        let nose = pose.keypoint(KeypointKind::Nose).unwrap();
        assert_relative_eq!(nose.position.x, 32.0);
        assert_relative_eq!(nose.position.y, 16.0);
        let neck = pose.keypoint(KeypointKind::Neck).unwrap();
        assert_relative_eq!(neck.position.y, 32.0);
        let hip = pose.keypoint(KeypointKind::RightHip).unwrap();
        assert_relative_eq!(hip.position.y, 64.0);

        // All keypoints share one translation, so world differences equal the differences of
        // the root-relative feature values (channel index in this fixture).
        let nose_joint = (PANOPTIC_IDS[0] * 3) as f32;
        let neck_joint = (PANOPTIC_IDS[1] * 3) as f32;
        assert_relative_eq!(
            nose.world.z - neck.world.z,
            (nose_joint + 2.0) - (neck_joint + 2.0),
            epsilon = 1e-3,
        );
        // Positive focal length puts the pose in front of the camera.
        assert!(neck.world.z > 0.0);
    }

    #[test]
    fn tracking_keeps_ids_for_continuous_sources() {
        let mut decoder = PoseDecoder::new(8, None);
        let first = decoder
            .decode(&synthetic_outputs(), 0.5, 100.0, true)
            .unwrap();
        let second = decoder
            .decode(&synthetic_outputs(), 0.5, 100.0, true)
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id(), second[0].id());

        // Smoothing an unchanged pose must not move it.
        let a = first[0].keypoint(KeypointKind::Nose).unwrap();
        let b = second[0].keypoint(KeypointKind::Nose).unwrap();
        assert_relative_eq!(a.position.x, b.position.x);
        assert_relative_eq!(a.position.y, b.position.y);
    }

    #[test]
    fn discrete_sources_reset_ids() {
        let mut decoder = PoseDecoder::new(8, None);
        decoder
            .decode(&synthetic_outputs(), 0.5, 100.0, true)
            .unwrap();
        decoder
            .decode(&synthetic_outputs(), 0.5, 100.0, true)
            .unwrap();
        let poses = decoder
            .decode(&synthetic_outputs(), 0.5, 100.0, false)
            .unwrap();
        assert_eq!(poses[0].id(), 0);
    }
}
