//! Per-frame transient state: the packed kernel parameter block, pose
//! snapshots driving invalidation, and the running-average accumulation
//! counter.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Kernel parameter block, rebuilt every frame.
///
/// Matches the WGSL `FrameUniform` layout: two column-major matrices, the
/// light vector, then the 16-byte tail holding jitter, seed and bounce limit.
/// Jitter and seed are re-randomized every frame even when the scene and
/// camera are static; identical samples would average to the same noise.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniform {
    pub camera_to_world: [[f32; 4]; 4],
    pub camera_inverse_projection: [[f32; 4]; 4],
    /// Directional light forward vector (xyz) and intensity (w).
    pub directional_light: [f32; 4],
    /// Sub-pixel jitter in [0, 1)².
    pub pixel_offset: [f32; 2],
    /// Noise seed in [0, 1).
    pub seed: f32,
    pub bounce_limit: u32,
}

/// Immutable snapshot of every pose component whose change invalidates the
/// accumulated image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSnapshot {
    pub camera_eye: Vec3,
    pub camera_target: Vec3,
    pub camera_up: Vec3,
    pub light_forward: Vec3,
    pub light_intensity: f32,
}

/// Whether any pose component differs between two frames.
///
/// Exact comparison: accumulated samples are only valid while viewpoint and
/// lighting are bit-identical, so even the smallest drift restarts
/// convergence. Cheap enough to run every frame.
pub fn poses_changed(previous: &PoseSnapshot, current: &PoseSnapshot) -> bool {
    previous != current
}

/// Sample counter for progressive accumulation.
///
/// The converged image is a running average: sample `n` enters with weight
/// `1 / (n + 1)` against `n / (n + 1)` of accumulated history, which equals
/// the cumulative mean as long as no invalidation occurs in between.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccumulationState {
    sample_count: u32,
}

impl AccumulationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Weight of the incoming sample in the running average.
    pub fn blend_factor(&self) -> f32 {
        1.0 / (self.sample_count + 1) as f32
    }

    /// Record one successfully accumulated sample. Called only after the
    /// frame's GPU work has been submitted, so a failed frame leaves the
    /// counter untouched.
    pub fn advance(&mut self) {
        self.sample_count += 1;
    }

    /// Discard all accumulated history.
    pub fn reset(&mut self) {
        self.sample_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PoseSnapshot {
        PoseSnapshot {
            camera_eye: Vec3::new(0.0, 150.0, 450.0),
            camera_target: Vec3::ZERO,
            camera_up: Vec3::Y,
            light_forward: Vec3::new(-0.5, -1.0, -0.3).normalize(),
            light_intensity: 1.2,
        }
    }

    /// CPU model of the accumulate pass: SrcAlpha/OneMinusSrcAlpha blending
    /// with the state's blend factor as the source alpha.
    fn blend(converged: f32, raw: f32, state: &AccumulationState) -> f32 {
        let f = state.blend_factor();
        converged * (1.0 - f) + raw * f
    }

    #[test]
    fn test_blend_factor_schedule() {
        let mut state = AccumulationState::new();
        assert_eq!(state.blend_factor(), 1.0);
        state.advance();
        assert_eq!(state.blend_factor(), 0.5);
        state.advance();
        state.advance();
        assert_eq!(state.blend_factor(), 0.25);
        assert_eq!(state.sample_count(), 3);
    }

    #[test]
    fn test_constant_samples_converge_immediately() {
        // A kernel that always returns the same value must leave the running
        // average fixed at that value.
        let raw = 0.7;
        let mut state = AccumulationState::new();
        let mut converged = 0.0;
        for _ in 0..32 {
            converged = blend(converged, raw, &state);
            state.advance();
            assert!((converged - raw).abs() < 1e-6);
        }
    }

    #[test]
    fn test_running_average_matches_cumulative_mean() {
        let samples = [0.1, 0.9, 0.4, 0.6, 0.2, 0.8];
        let mut state = AccumulationState::new();
        let mut converged = 0.0;
        for &raw in &samples {
            converged = blend(converged, raw, &state);
            state.advance();
        }
        let mean: f32 = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!((converged - mean).abs() < 1e-5);
    }

    #[test]
    fn test_invalidation_resets_to_single_sample() {
        let mut state = AccumulationState::new();
        let mut converged = 0.0;
        for _ in 0..5 {
            converged = blend(converged, 0.2, &state);
            state.advance();
        }
        assert!(state.sample_count() > 0);

        // Pose change: discard history, not graft onto it.
        state.reset();
        assert_eq!(state.sample_count(), 0);
        converged = blend(converged, 0.9, &state);
        state.advance();
        assert_eq!(converged, 0.9);
    }

    #[test]
    fn test_failed_frame_leaves_state_untouched() {
        let mut state = AccumulationState::new();
        state.advance();
        state.advance();
        let before = state.sample_count();
        // A failed frame never reaches advance(); the next attempt sees the
        // same weights.
        assert_eq!(state.sample_count(), before);
        assert_eq!(state.blend_factor(), 1.0 / 3.0);
    }

    #[test]
    fn test_identical_poses_do_not_invalidate() {
        let a = snapshot();
        let b = snapshot();
        assert!(!poses_changed(&a, &b));
    }

    #[test]
    fn test_any_pose_component_invalidates() {
        let base = snapshot();

        let mut moved = base;
        moved.camera_eye.x += 0.001;
        assert!(poses_changed(&base, &moved));

        let mut retargeted = base;
        retargeted.camera_target.z -= 1.0;
        assert!(poses_changed(&base, &retargeted));

        let mut rolled = base;
        rolled.camera_up = Vec3::new(0.1, 1.0, 0.0).normalize();
        assert!(poses_changed(&base, &rolled));

        let mut relit = base;
        relit.light_forward = Vec3::new(0.0, -1.0, 0.0);
        assert!(poses_changed(&base, &relit));

        let mut dimmed = base;
        dimmed.light_intensity += 0.1;
        assert!(poses_changed(&base, &dimmed));
    }

    #[test]
    fn test_frame_uniform_layout() {
        // Two mat4s + light vec4 + jitter/seed/bounce tail.
        assert_eq!(std::mem::size_of::<FrameUniform>(), 160);
    }
}
