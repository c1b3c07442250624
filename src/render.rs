//! Overlay drawing and window presentation.

use std::sync::{Arc, Mutex};

use crate::{
    draw, gui,
    image::{Color, Frame},
    plot::{Orbit, Plotter},
    pose::{Pose, SKELETON_EDGES},
};

const POSE_WINDOW: &str = "Pose Estimation";
const SCENE_WINDOW: &str = "3D Canvas";

/// Output seam of the pipeline.
///
/// The pipeline drives this after every cycle; implementations decide whether anything ends up
/// on screen.
pub trait Render {
    /// Draws the detected poses over the source frame.
    fn draw_overlay(&mut self, frame: &mut Frame, poses: &[Pose]);
    /// Draws the smoothed cycle rate onto the frame.
    fn draw_fps(&mut self, frame: &mut Frame, fps: f32);
    /// Presents the finished frame.
    fn present(&mut self, frame: &Frame);
    /// Renders and presents the 3D scene.
    fn present_scene(&mut self, poses: &[Pose]);
}

/// Presents frames and the 3D plot in GUI windows.
pub struct Viewer {
    plotter: Plotter,
}

impl Viewer {
    /// Creates a viewer whose 3D plot is orbited through the shared `orbit` handle.
    pub fn new(orbit: Arc<Mutex<Orbit>>) -> Self {
        Self {
            plotter: Plotter::new(orbit),
        }
    }
}

impl Render for Viewer {
    fn draw_overlay(&mut self, frame: &mut Frame, poses: &[Pose]) {
        for pose in poses {
            for (a, b) in SKELETON_EDGES {
                if let (Some(a), Some(b)) = (pose.keypoint(a), pose.keypoint(b)) {
                    draw::line(
                        frame,
                        a.position.x as i32,
                        a.position.y as i32,
                        b.position.x as i32,
                        b.position.y as i32,
                    )
                    .color(Color::GREEN);
                }
            }
            for (_, kp) in pose.keypoints() {
                draw::circle(frame, kp.position.x as i32, kp.position.y as i32, 7)
                    .color(Color::YELLOW)
                    .fill();
            }
        }
    }

    fn draw_fps(&mut self, frame: &mut Frame, fps: f32) {
        let text = format!("FPS: {fps:.1}");
        draw::text(frame, 40, 80, &text)
            .align_left()
            .align_bottom()
            .color(Color::RED);
    }

    fn present(&mut self, frame: &Frame) {
        gui::show_image(POSE_WINDOW, frame);
    }

    fn present_scene(&mut self, poses: &[Pose]) {
        let canvas = self.plotter.render(poses);
        gui::show_image(SCENE_WINDOW, canvas);
    }
}

/// Discards all output. Used when running with `--no-show`.
pub struct NullRenderer;

impl Render for NullRenderer {
    fn draw_overlay(&mut self, _frame: &mut Frame, _poses: &[Pose]) {}
    fn draw_fps(&mut self, _frame: &mut Frame, _fps: f32) {}
    fn present(&mut self, _frame: &Frame) {}
    fn present_scene(&mut self, _poses: &[Pose]) {}
}

#[cfg(test)]
mod tests {
    use nalgebra::{Point2, Point3};

    use crate::pose::{Keypoint, KeypointKind, NUM_KEYPOINTS};

    use super::*;

    fn viewer() -> Viewer {
        Viewer::new(Arc::new(Mutex::new(Orbit::new())))
    }

    fn pose_with(kps: &[(KeypointKind, f32, f32)]) -> Pose {
        let mut keypoints = [None; NUM_KEYPOINTS];
        for &(kind, x, y) in kps {
            keypoints[kind.index()] = Some(Keypoint {
                position: Point2::new(x, y),
                score: 1.0,
                world: Point3::origin(),
            });
        }
        Pose {
            id: 0,
            keypoints,
            score: 1.0,
        }
    }

    #[test]
    fn overlay_connects_keypoints() {
        let mut frame = Frame::new(64, 64);
        let pose = pose_with(&[(KeypointKind::Neck, 10.0, 10.0), (KeypointKind::Nose, 10.0, 30.0)]);
        viewer().draw_overlay(&mut frame, &[pose]);
        // The neck-nose bone passes through (10, 20), clear of both joint circles.
        assert_eq!(frame.get(10, 20), Color::GREEN);
        assert_eq!(frame.get(10, 10), Color::YELLOW);
    }

    #[test]
    fn overlay_skips_missing_keypoints() {
        let mut frame = Frame::new(64, 64);
        let pose = pose_with(&[(KeypointKind::Neck, 10.0, 10.0)]);
        viewer().draw_overlay(&mut frame, &[pose]);
        assert_eq!(frame.get(10, 20), Color([0, 0, 0, 0]));
    }

    #[test]
    fn fps_text_is_drawn_in_red() {
        let mut frame = Frame::new(256, 128);
        viewer().draw_fps(&mut frame, 9.5);
        let mut red = 0;
        for y in 55..85 {
            for x in 35..160 {
                if frame.get(x, y) == Color::RED {
                    red += 1;
                }
            }
        }
        assert!(red > 0, "no text pixels found near (40, 80)");
    }
}
