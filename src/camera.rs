use glam::{Mat3, Mat4, Vec3};
use winit::event::{ElementState, KeyboardInput, VirtualKeyCode, WindowEvent};

use crate::frame::PoseSnapshot;
use crate::util::math::degree_to_radian;

pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub aspect: f32,
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 150.0, 450.0),
            target: Vec3::new(0.0, 20.0, 0.0),
            up: Vec3::Y,
            aspect: 16.0 / 9.0,
            fov_y: degree_to_radian(45.0),
            z_near: 0.1,
            z_far: 2000.0,
        }
    }
}

impl Camera {
    /// World-from-view matrix handed to the kernel for ray origins.
    pub fn camera_to_world(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up).inverse()
    }

    /// Clip-to-view matrix handed to the kernel for ray directions.
    pub fn inverse_projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far).inverse()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize()
    }
}

/// Directional (sun) light: a forward vector plus intensity.
pub struct DirectionalLight {
    pub forward: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            forward: Vec3::new(-0.5, -1.0, -0.3).normalize(),
            intensity: 1.2,
        }
    }
}

/// Assemble the pose snapshot the invalidation check compares each frame.
pub fn pose_snapshot(camera: &Camera, light: &DirectionalLight) -> PoseSnapshot {
    PoseSnapshot {
        camera_eye: camera.eye,
        camera_target: camera.target,
        camera_up: camera.up,
        light_forward: light.forward,
        light_intensity: light.intensity,
    }
}

pub struct CameraController {
    pub move_speed: f32,
    pub light_turn_speed: f32,
}

impl CameraController {
    pub fn new(move_speed: f32) -> Self {
        Self {
            move_speed,
            light_turn_speed: degree_to_radian(5.0),
        }
    }

    /// Translate key presses into camera and light pose changes. Returns
    /// whether a pose was touched; the per-frame snapshot comparison picks
    /// the change up either way.
    pub fn process_events(
        &self,
        camera: &mut Camera,
        light: &mut DirectionalLight,
        event: &WindowEvent,
    ) -> bool {
        match event {
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state,
                        virtual_keycode: Some(keycode),
                        ..
                    },
                ..
            } if *state == ElementState::Pressed => match keycode {
                VirtualKeyCode::W => {
                    let forward = camera.forward();
                    self.translate(camera, forward);
                    true
                }
                VirtualKeyCode::S => {
                    let forward = camera.forward();
                    self.translate(camera, -forward);
                    true
                }
                VirtualKeyCode::A => {
                    let right = camera.forward().cross(camera.up).normalize();
                    self.translate(camera, -right);
                    true
                }
                VirtualKeyCode::D => {
                    let right = camera.forward().cross(camera.up).normalize();
                    self.translate(camera, right);
                    true
                }
                VirtualKeyCode::Q => {
                    let up = camera.up;
                    self.translate(camera, -up);
                    true
                }
                VirtualKeyCode::E => {
                    let up = camera.up;
                    self.translate(camera, up);
                    true
                }
                VirtualKeyCode::Left => {
                    light.forward =
                        (Mat3::from_rotation_y(self.light_turn_speed) * light.forward).normalize();
                    true
                }
                VirtualKeyCode::Right => {
                    light.forward =
                        (Mat3::from_rotation_y(-self.light_turn_speed) * light.forward).normalize();
                    true
                }
                VirtualKeyCode::Up => {
                    light.intensity += 0.1;
                    true
                }
                VirtualKeyCode::Down => {
                    light.intensity = (light.intensity - 0.1).max(0.0);
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn translate(&self, camera: &mut Camera, direction: Vec3) {
        let step = direction * self.move_speed;
        camera.eye += step;
        camera.target += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_to_world_inverts_view() {
        let camera = Camera::default();
        let view = Mat4::look_at_rh(camera.eye, camera.target, camera.up);
        let round_trip = camera.camera_to_world() * view;
        assert!(round_trip.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_inverse_projection_inverts_projection() {
        let camera = Camera::default();
        let proj =
            Mat4::perspective_rh(camera.fov_y, camera.aspect, camera.z_near, camera.z_far);
        let round_trip = camera.inverse_projection() * proj;
        assert!(round_trip.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_snapshot_tracks_light_pose() {
        let camera = Camera::default();
        let mut light = DirectionalLight::default();
        let before = pose_snapshot(&camera, &light);

        light.intensity += 0.5;
        let after = pose_snapshot(&camera, &light);
        assert_ne!(before, after);
    }

    #[test]
    #[allow(deprecated)]
    fn test_light_rotation_preserves_length() {
        let controller = CameraController::new(10.0);
        let camera = &mut Camera::default();
        let light = &mut DirectionalLight::default();

        let event = WindowEvent::KeyboardInput {
            device_id: unsafe { winit::event::DeviceId::dummy() },
            input: KeyboardInput {
                scancode: 0,
                state: ElementState::Pressed,
                virtual_keycode: Some(VirtualKeyCode::Left),
                modifiers: Default::default(),
            },
            is_synthetic: false,
        };
        assert!(controller.process_events(camera, light, &event));
        assert!((light.forward.length() - 1.0).abs() < 1e-5);
    }
}
