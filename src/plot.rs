//! 3D skeleton plot.
//!
//! Renders the estimated skeletons into an offscreen [`Frame`] using a simple orthographic
//! projection. The view can be orbited around the scene with the mouse, the camera state lives
//! in [`Orbit`] and is shared with the input handling.

use std::{
    f32::consts::FRAC_PI_2,
    sync::{Arc, Mutex},
};

use nalgebra::{Point2, Point3, Rotation3, Vector3};

use crate::{
    draw,
    image::{Color, Frame},
    pose::{Pose, SKELETON_EDGES},
};

/// Orbit angle change per pixel of mouse movement, in radians.
const SENSITIVITY: f32 = 0.01;

/// Projected pixels per centimeter of world space.
const PLOT_SCALE: f32 = 0.5;

const CANVAS_WIDTH: u32 = 1280;
const CANVAS_HEIGHT: u32 = 720;

/// Ground grid placement below the scene center, in cm.
const GROUND_OFFSET: f32 = 100.0;
const GRID_STEP: f32 = 50.0;
const GRID_LINES: i32 = 4;
const AXIS_LEN: f32 = 50.0;

const GRID_COLOR: Color = Color::from_rgb8(64, 64, 64);

/// Skeletons cycle through these by tracking ID.
const POSE_COLORS: [Color; 5] = [
    Color::GREEN,
    Color::YELLOW,
    Color::CYAN,
    Color::RED,
    Color::BLUE,
];

/// Orbit camera state, controlled by mouse drags.
#[derive(Debug)]
pub struct Orbit {
    yaw: f32,
    pitch: f32,
    drag: Option<(f64, f64)>,
}

impl Orbit {
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            drag: None,
        }
    }

    /// Starts a drag at the given cursor position.
    pub fn begin_drag(&mut self, x: f64, y: f64) {
        self.drag = Some((x, y));
    }

    /// Rotates the camera if a drag is in progress. Ignored otherwise, so all cursor movement
    /// can be forwarded here.
    pub fn drag_to(&mut self, x: f64, y: f64) {
        if let Some((px, py)) = self.drag {
            self.yaw += (x - px) as f32 * SENSITIVITY;
            self.pitch = (self.pitch + (y - py) as f32 * SENSITIVITY).clamp(-FRAC_PI_2, FRAC_PI_2);
            self.drag = Some((x, y));
        }
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Returns the current (yaw, pitch) angles in radians.
    pub fn angles(&self) -> (f32, f32) {
        (self.yaw, self.pitch)
    }
}

impl Default for Orbit {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders poses into a 3D plot canvas.
pub struct Plotter {
    canvas: Frame,
    orbit: Arc<Mutex<Orbit>>,
}

impl Plotter {
    pub fn new(orbit: Arc<Mutex<Orbit>>) -> Self {
        Self {
            canvas: Frame::new(CANVAS_WIDTH, CANVAS_HEIGHT),
            orbit,
        }
    }

    /// Renders `poses` and returns the finished canvas.
    ///
    /// The projection is centered on the scene, so the plot stays usable no matter how far
    /// from the camera the poses are.
    pub fn render(&mut self, poses: &[Pose]) -> &Frame {
        self.canvas.clear(Color::BLACK);

        let (yaw, pitch) = self.orbit.lock().unwrap().angles();
        let rot = Rotation3::from_euler_angles(pitch, yaw, 0.0);
        let centroid = scene_centroid(poses);
        let center = Point2::new(
            self.canvas.width() as f32 / 2.0,
            self.canvas.height() as f32 / 2.0,
        );
        let project = move |local: Vector3<f32>| -> (i32, i32) {
            let q = rot * local;
            (
                (center.x + q.x * PLOT_SCALE) as i32,
                (center.y + q.y * PLOT_SCALE) as i32,
            )
        };

        // Ground grid below the scene.
        let half = GRID_LINES as f32 * GRID_STEP;
        for i in -GRID_LINES..=GRID_LINES {
            let offset = i as f32 * GRID_STEP;
            let (x0, y0) = project(Vector3::new(offset, GROUND_OFFSET, -half));
            let (x1, y1) = project(Vector3::new(offset, GROUND_OFFSET, half));
            draw::line(&mut self.canvas, x0, y0, x1, y1).color(GRID_COLOR);
            let (x0, y0) = project(Vector3::new(-half, GROUND_OFFSET, offset));
            let (x1, y1) = project(Vector3::new(half, GROUND_OFFSET, offset));
            draw::line(&mut self.canvas, x0, y0, x1, y1).color(GRID_COLOR);
        }

        // Axis triad at the scene center.
        let (ox, oy) = project(Vector3::zeros());
        for (axis, color) in [
            (Vector3::new(AXIS_LEN, 0.0, 0.0), Color::RED),
            (Vector3::new(0.0, AXIS_LEN, 0.0), Color::GREEN),
            (Vector3::new(0.0, 0.0, AXIS_LEN), Color::BLUE),
        ] {
            let (x, y) = project(axis);
            draw::line(&mut self.canvas, ox, oy, x, y).color(color);
        }

        for pose in poses {
            let color = POSE_COLORS[pose.id() as usize % POSE_COLORS.len()];
            for (a, b) in SKELETON_EDGES {
                if let (Some(a), Some(b)) = (pose.keypoint(a), pose.keypoint(b)) {
                    let (x0, y0) = project(a.world - centroid);
                    let (x1, y1) = project(b.world - centroid);
                    draw::line(&mut self.canvas, x0, y0, x1, y1).color(color);
                }
            }
            for (_, kp) in pose.keypoints() {
                let (x, y) = project(kp.world - centroid);
                draw::circle(&mut self.canvas, x, y, 5).color(color).fill();
            }
        }

        &self.canvas
    }
}

fn scene_centroid(poses: &[Pose]) -> Point3<f32> {
    let mut sum = Vector3::zeros();
    let mut n = 0;
    for pose in poses {
        for (_, kp) in pose.keypoints() {
            sum += kp.world.coords;
            n += 1;
        }
    }
    if n == 0 {
        Point3::origin()
    } else {
        Point3::from(sum / n as f32)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Point2 as P2;

    use crate::pose::{Keypoint, KeypointKind, NUM_KEYPOINTS};

    use super::*;

    #[test]
    fn drag_rotates_camera() {
        let mut orbit = Orbit::new();
        orbit.begin_drag(0.0, 0.0);
        orbit.drag_to(100.0, 50.0);
        let (yaw, pitch) = orbit.angles();
        assert_relative_eq!(yaw, 1.0);
        assert_relative_eq!(pitch, 0.5);

        // Dragging accumulates from the last cursor position.
        orbit.drag_to(100.0, 50.0);
        assert_relative_eq!(orbit.angles().0, 1.0);
    }

    #[test]
    fn cursor_movement_without_drag_is_ignored() {
        let mut orbit = Orbit::new();
        orbit.drag_to(500.0, 500.0);
        assert_eq!(orbit.angles(), (0.0, 0.0));

        orbit.begin_drag(0.0, 0.0);
        orbit.end_drag();
        orbit.drag_to(500.0, 500.0);
        assert_eq!(orbit.angles(), (0.0, 0.0));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut orbit = Orbit::new();
        orbit.begin_drag(0.0, 0.0);
        orbit.drag_to(0.0, 100000.0);
        assert_relative_eq!(orbit.angles().1, FRAC_PI_2);
    }

    fn test_pose() -> Pose {
        let mut keypoints = [None; NUM_KEYPOINTS];
        for (kind, world) in [
            (KeypointKind::Neck, Point3::new(0.0, 0.0, 0.0)),
            (KeypointKind::Nose, Point3::new(0.0, -50.0, 0.0)),
        ] {
            keypoints[kind.index()] = Some(Keypoint {
                position: P2::origin(),
                score: 1.0,
                world,
            });
        }
        Pose {
            id: 0,
            keypoints,
            score: 1.0,
        }
    }

    #[test]
    fn skeleton_is_projected_around_scene_center() {
        let mut plotter = Plotter::new(Arc::new(Mutex::new(Orbit::new())));
        let canvas = plotter.render(&[test_pose()]);
        assert_eq!(canvas.width(), 1280);
        // The neck-nose bone is vertical and centered: centroid is (0, -25, 0), so it spans
        // 12.5 scaled units up and down from the canvas center.
        assert_eq!(canvas.get(640, 350), POSE_COLORS[0]);
    }

    #[test]
    fn empty_scene_still_draws_grid() {
        let mut plotter = Plotter::new(Arc::new(Mutex::new(Orbit::new())));
        let canvas = plotter.render(&[]);
        let grid_y = 360 + (GROUND_OFFSET * PLOT_SCALE) as u32;
        assert_eq!(canvas.get(640, grid_y), GRID_COLOR);
    }
}
