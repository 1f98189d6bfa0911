//! Procedural sphere scene: seeded placement with overlap rejection and
//! randomized materials.

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Settings;
use crate::error::Result;
use crate::util::color::hsv_to_rgb;

#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    /// Center of the sphere; `y` equals the radius so it rests on the ground
    /// plane at y = 0.
    pub position: Vec3,
    pub radius: f32,

    /// Diffuse color; zero for metals.
    pub albedo: Vec3,
    /// Specular color; the base color for metals, a broadcast amplitude
    /// otherwise.
    pub specular: Vec3,
    pub smoothness: f32,
    /// Emitted radiance; zero unless the sphere was drawn as emissive.
    pub emission: Vec3,
}

impl Sphere {
    fn to_gpu(&self) -> GpuSphere {
        GpuSphere {
            position: self.position.to_array(),
            radius: self.radius,
            albedo: self.albedo.to_array(),
            specular: self.specular.to_array(),
            smoothness: self.smoothness,
            emission: self.emission.to_array(),
        }
    }
}

/// Packed sphere record matching the kernel's storage-buffer layout.
/// 14 floats, 56 bytes, no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSphere {
    pub position: [f32; 3],
    pub radius: f32,
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
    pub smoothness: f32,
    pub emission: [f32; 3],
}

/// An immutable generated scene. Replaced wholesale on regeneration.
#[derive(Debug, Default)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
    /// The seed this scene was generated from.
    pub seed: u64,
}

impl Scene {
    /// Generate a sphere field from the settings.
    ///
    /// Placement is rejection sampling: each slot draws one candidate, and a
    /// candidate touching any already-accepted sphere is discarded without a
    /// retry, so the result may hold fewer than `spheres_max` spheres. The
    /// overlap test is quadratic over the accepted set, which is fine at the
    /// few-hundred-sphere scale this runs at, once per build.
    ///
    /// The same seed and settings produce the identical sphere list.
    pub fn generate(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let mut rng = StdRng::seed_from_u64(settings.sphere_seed);
        let mut spheres: Vec<Sphere> = Vec::new();

        'slots: for _ in 0..settings.spheres_max {
            let radius =
                rng.gen_range(settings.sphere_radius_min..=settings.sphere_radius_max);
            let disk = sample_disk(&mut rng) * settings.sphere_placement_radius;
            let position = Vec3::new(disk.x, radius, disk.y);

            for other in &spheres {
                let min_dist = radius + other.radius;
                if position.distance_squared(other.position) < min_dist * min_dist {
                    continue 'slots;
                }
            }

            // Material draws happen only for accepted candidates; rejected
            // slots consume only the radius and position draws.
            let base = hsv_to_rgb(rng.gen(), rng.gen(), rng.gen());
            let glow = hsv_to_rgb(
                rng.gen_range(settings.hue_min..=settings.hue_max),
                rng.gen_range(settings.saturation_min..=settings.saturation_max),
                rng.gen_range(settings.brightness_min..=settings.brightness_max),
            );
            let metal = rng.gen::<f32>() < settings.metal_chance;
            let emissive = rng.gen::<f32>() < settings.emissive_chance;

            spheres.push(Sphere {
                position,
                radius,
                albedo: if metal { Vec3::ZERO } else { base },
                specular: if metal {
                    base
                } else {
                    Vec3::splat(settings.specular_amplitude)
                },
                smoothness: rng
                    .gen_range(settings.smoothness_min..=settings.smoothness_max),
                emission: if emissive { glow } else { Vec3::ZERO },
            });
        }

        tracing::info!(
            seed = settings.sphere_seed,
            accepted = spheres.len(),
            slots = settings.spheres_max,
            "generated sphere scene"
        );
        Ok(Self {
            spheres,
            seed: settings.sphere_seed,
        })
    }

    /// Pack the sphere list for GPU upload.
    pub fn gpu_spheres(&self) -> Vec<GpuSphere> {
        self.spheres.iter().map(Sphere::to_gpu).collect()
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }
}

/// Uniform point on the unit disk (polar sampling).
fn sample_disk(rng: &mut StdRng) -> Vec2 {
    let r = rng.gen::<f32>().sqrt();
    let theta = rng.gen::<f32>() * std::f32::consts::TAU;
    Vec2::new(r * theta.cos(), r * theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn small_settings() -> Settings {
        Settings {
            sphere_seed: 42,
            spheres_max: 100,
            sphere_radius_min: 3.0,
            sphere_radius_max: 8.0,
            sphere_placement_radius: 60.0,
            ..Settings::default()
        }
    }

    fn assert_no_overlap(scene: &Scene) {
        for (i, a) in scene.spheres.iter().enumerate() {
            for b in &scene.spheres[i + 1..] {
                let dist = a.position.distance(b.position);
                let min_dist = a.radius + b.radius;
                assert!(
                    dist >= min_dist - 1e-3,
                    "spheres overlap: dist {dist} < {min_dist}"
                );
            }
        }
    }

    #[test]
    fn test_no_overlap_for_any_seed() {
        for seed in [0, 1, 7, 42, 1337, 8675309] {
            let settings = Settings {
                sphere_seed: seed,
                ..small_settings()
            };
            let scene = Scene::generate(&settings).unwrap();
            assert!(!scene.is_empty());
            assert_no_overlap(&scene);
        }
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let settings = small_settings();
        let a = Scene::generate(&settings).unwrap();
        let b = Scene::generate(&settings).unwrap();
        assert_eq!(a.spheres, b.spheres);
        assert_eq!(a.seed, b.seed);
    }

    #[test]
    fn test_count_bounded_and_density_limited() {
        let roomy = Scene::generate(&small_settings()).unwrap();
        assert!(roomy.len() <= 100);

        // Shrinking the disk forces more rejections.
        let cramped = Scene::generate(&Settings {
            sphere_placement_radius: 20.0,
            ..small_settings()
        })
        .unwrap();
        assert!(cramped.len() <= 100);
        assert!(
            cramped.len() < roomy.len(),
            "denser packing should reject more: {} vs {}",
            cramped.len(),
            roomy.len()
        );
    }

    #[test]
    fn test_spheres_rest_on_ground_plane() {
        let scene = Scene::generate(&small_settings()).unwrap();
        for sphere in &scene.spheres {
            assert_eq!(sphere.position.y, sphere.radius);
        }
    }

    #[test]
    fn test_material_consistency() {
        let settings = Settings {
            metal_chance: 0.5,
            emissive_chance: 0.3,
            ..small_settings()
        };
        let scene = Scene::generate(&settings).unwrap();
        let amplitude = Vec3::splat(settings.specular_amplitude);

        let mut metals = 0;
        for sphere in &scene.spheres {
            if sphere.albedo == Vec3::ZERO {
                metals += 1;
                assert_ne!(sphere.specular, amplitude);
            } else {
                assert_eq!(sphere.specular, amplitude);
            }
            assert!(sphere.smoothness >= settings.smoothness_min);
            assert!(sphere.smoothness <= settings.smoothness_max);
        }
        assert!(metals > 0, "metal_chance 0.5 over {} spheres", scene.len());
    }

    #[test]
    fn test_plain_diffuse_field() {
        // seed=1, 10 slots, disk 50, radii [5, 10], no metals, no emissives.
        let settings = Settings {
            sphere_seed: 1,
            spheres_max: 10,
            sphere_placement_radius: 50.0,
            sphere_radius_min: 5.0,
            sphere_radius_max: 10.0,
            metal_chance: 0.0,
            emissive_chance: 0.0,
            ..Settings::default()
        };
        let scene = Scene::generate(&settings).unwrap();
        assert!(!scene.is_empty());
        assert!(scene.len() <= 10);

        let amplitude = Vec3::splat(settings.specular_amplitude);
        for sphere in &scene.spheres {
            assert_ne!(sphere.albedo, Vec3::ZERO);
            assert_eq!(sphere.emission, Vec3::ZERO);
            assert_eq!(sphere.specular, amplitude);
        }
        assert_no_overlap(&scene);
    }

    #[test]
    fn test_invalid_settings_fail_fast() {
        let settings = Settings {
            sphere_radius_min: 9.0,
            sphere_radius_max: 3.0,
            ..small_settings()
        };
        assert!(matches!(
            Scene::generate(&settings),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_placement_stays_on_disk() {
        let settings = small_settings();
        let scene = Scene::generate(&settings).unwrap();
        for sphere in &scene.spheres {
            let planar = Vec2::new(sphere.position.x, sphere.position.z);
            assert!(planar.length() <= settings.sphere_placement_radius + 1e-3);
        }
    }

    #[test]
    fn test_gpu_sphere_packing() {
        assert_eq!(std::mem::size_of::<GpuSphere>(), 56);

        let sphere = Sphere {
            position: Vec3::new(1.0, 2.0, 3.0),
            radius: 4.0,
            albedo: Vec3::new(5.0, 6.0, 7.0),
            specular: Vec3::new(8.0, 9.0, 10.0),
            smoothness: 11.0,
            emission: Vec3::new(12.0, 13.0, 14.0),
        };
        let packed = sphere.to_gpu();
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&packed));
        let expected: Vec<f32> = (1..=14).map(|v| v as f32).collect();
        assert_eq!(floats, expected.as_slice());
    }
}
