use std::path::PathBuf;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sphere_tracer_lib::{
    application::{AppState, Application, Layer, Screen},
    camera::{pose_snapshot, Camera, CameraController, DirectionalLight},
    config::Settings,
    error::Result,
    frame::{poses_changed, FrameUniform, PoseSnapshot},
    renderer::ProgressiveRenderer,
    scene::Scene,
    texture::Texture,
};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
};

/// The render controller: owns the scene, the camera and light poses, and
/// the progressive renderer, and implements the host lifecycle.
struct SphereTracer {
    settings: Settings,
    camera: Camera,
    camera_controller: CameraController,
    light: DirectionalLight,
    scene: Scene,
    renderer: ProgressiveRenderer,
    previous_pose: PoseSnapshot,
    frame_rng: SmallRng,
}

impl SphereTracer {
    /// Per-frame kernel parameters. Jitter and seed are redrawn every call;
    /// static frames must still sample differently for accumulation to
    /// reduce noise.
    fn frame_uniform(&mut self) -> FrameUniform {
        FrameUniform {
            camera_to_world: self.camera.camera_to_world().to_cols_array_2d(),
            camera_inverse_projection: self.camera.inverse_projection().to_cols_array_2d(),
            directional_light: [
                self.light.forward.x,
                self.light.forward.y,
                self.light.forward.z,
                self.light.intensity,
            ],
            pixel_offset: [self.frame_rng.gen(), self.frame_rng.gen()],
            seed: self.frame_rng.gen(),
            bounce_limit: self.settings.bounce_limit,
        }
    }

    /// Rebuild the scene under the next seed. A new scene invalidates the
    /// accumulated image, so the upload resets the sample counter.
    fn regenerate_scene(&mut self, screen: &Screen) {
        self.settings.sphere_seed = self.settings.sphere_seed.wrapping_add(1);
        match Scene::generate(&self.settings) {
            Ok(scene) => {
                self.scene = scene;
                self.renderer.upload_scene(&screen.device, &self.scene);
            }
            Err(e) => tracing::error!("scene regeneration failed: {e}"),
        }
    }
}

impl Layer for SphereTracer {
    fn start(screen: &mut Screen, _app: &AppState) -> Result<Self> {
        let settings = Settings::load_or_default(&settings_path());
        settings.validate()?;

        let scene = Scene::generate(&settings)?;

        let skybox = match &settings.skybox_path {
            Some(path) => Texture::load_skybox(&screen.device, &screen.queue, path)
                .unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "skybox load failed");
                    Texture::placeholder(&screen.device, &screen.queue)
                }),
            None => Texture::placeholder(&screen.device, &screen.queue),
        };

        let mut renderer = ProgressiveRenderer::new(&screen.device, screen.config.format, skybox);
        renderer.upload_scene(&screen.device, &scene);

        let mut camera = Camera::default();
        camera.aspect = screen.config.width as f32 / screen.config.height as f32;
        let light = DirectionalLight::default();
        let previous_pose = pose_snapshot(&camera, &light);

        Ok(Self {
            settings,
            camera,
            camera_controller: CameraController::new(10.0),
            light,
            scene,
            renderer,
            previous_pose,
            frame_rng: SmallRng::from_entropy(),
        })
    }

    fn process_event(&mut self, event: &Event<()>, screen: &mut Screen) {
        if let Event::WindowEvent { ref event, .. } = event {
            self.camera_controller
                .process_events(&mut self.camera, &mut self.light, event);

            if let WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state: ElementState::Pressed,
                        virtual_keycode: Some(VirtualKeyCode::R),
                        ..
                    },
                ..
            } = event
            {
                self.regenerate_scene(screen);
            }
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>, _app: &AppState, _screen: &mut Screen) {
        // The render targets reallocate lazily on the next frame.
        self.camera.aspect = new_size.width as f32 / new_size.height as f32;
    }

    fn update(&mut self, _app: &AppState, _screen: &mut Screen) {
        // Accumulated samples are only valid while both poses hold still.
        let current_pose = pose_snapshot(&self.camera, &self.light);
        if poses_changed(&self.previous_pose, &current_pose) {
            self.renderer.reset_accumulation();
            self.previous_pose = current_pose;
        }
    }

    fn render(&mut self, _app: &AppState, screen: &mut Screen) -> Result<()> {
        let output = screen.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let params = self.frame_uniform();
        self.renderer.render_frame(
            &screen.device,
            &screen.queue,
            &params,
            screen.config.width,
            screen.config.height,
            &view,
        )?;

        output.present();
        Ok(())
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> Result<()> {
        if let Err(e) = self.settings.save(&settings_path()) {
            tracing::warn!("settings save failed: {e}");
        }
        tracing::info!(
            samples = self.renderer.sample_count(),
            spheres = self.scene.len(),
            "exiting"
        );
        Ok(())
    }
}

fn settings_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("settings.json"))
}

fn main() {
    tracing_subscriber::fmt::init();
    pollster::block_on(Application::<SphereTracer>::init());
}
