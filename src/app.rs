//! Interactive viewer.
//!
//! Each redraw reads the input state, steps the solver once (unless paused),
//! then draws the scene and the control panel. The solver holds the cloth
//! buffers only inside [`ClothBackend::step`]; by the time the renderer
//! records its pass they are back with the renderer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::camera::{Camera, KEY_ORBIT_SPEED, MOUSE_ORBIT_SPEED};
use crate::error::{AppError, GpuError};
use crate::gpu::{GpuContext, GpuSolver, Renderer};
use crate::input::{Input, KeyCode, MouseButton};
use crate::interaction::Interaction;
use crate::params::ClothSimParams;
use crate::scene::{LightsGpu, Scene, TextureCache};
use crate::solver::ClothBackend;
use crate::time::FrameTimer;
use crate::ui::{ControlPanel, Status, UiAction};

#[cfg(feature = "egui")]
use crate::gpu::egui_integration::EguiOverlay;

/// Kernel file picked up by "Reload kernels" when it exists.
const KERNEL_SOURCE_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/src/gpu/cloth.wgsl");

/// Command line configuration.
#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub scene: Option<PathBuf>,
    pub params: Option<PathBuf>,
}

/// Open the window and run until it closes.
pub fn run(config: AppConfig) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct App {
    textures: TextureCache,
    params: ClothSimParams,
    /// Scene waiting for the device to exist.
    pending_scene: Option<Scene>,
    startup_status: Option<Status>,
    viewer: Option<Viewer>,
    error: Option<AppError>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        let mut textures = TextureCache::new();
        let mut startup_status = None;

        let params = match &config.params {
            Some(path) => ClothSimParams::load(path).unwrap_or_else(|e| {
                startup_status = Some(Status::error(format!("{}: {}", path.display(), e)));
                ClothSimParams::default()
            }),
            None => ClothSimParams::default(),
        };

        let scene = match &config.scene {
            Some(path) => Scene::load(path, &mut textures)
                .map_err(|e| startup_status = Some(Status::error(e.to_string())))
                .ok(),
            None => None,
        };
        let scene = match scene {
            Some(scene) => Some(scene),
            None => Scene::default_scene(&mut textures)
                .map_err(|e| log::error!("Built-in scene is invalid: {}", e))
                .ok(),
        };

        Self { textures, params, pending_scene: scene, startup_status, viewer: None, error: None }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("PBD Cloth")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.error = Some(AppError::from(e));
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(Viewer::new(window)) {
            Ok(mut viewer) => {
                if let Some(scene) = self.pending_scene.take() {
                    viewer.install_scene(scene);
                }
                if let Some(status) = self.startup_status.take() {
                    viewer.panel.set_status(status);
                }
                viewer.window.request_redraw();
                self.viewer = Some(viewer);
            }
            Err(e) => {
                self.error = Some(AppError::from(e));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(viewer) = self.viewer.as_mut() else { return };

        #[cfg(feature = "egui")]
        let consumed = viewer.egui.on_window_event(&viewer.window, &event);
        #[cfg(not(feature = "egui"))]
        let consumed = false;

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                viewer.gpu.resize(size.width, size.height);
                viewer.camera.set_viewport(size.width, size.height);
                viewer.input.set_window_size(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                viewer.frame(&mut self.params, &mut self.textures);
                viewer.window.request_redraw();
            }
            WindowEvent::MouseInput { state: ElementState::Released, .. } => viewer.input.handle_event(&event),
            _ if consumed => {}
            _ => viewer.input.handle_event(&event),
        }
    }
}

struct Viewer {
    window: Arc<Window>,
    gpu: GpuContext,
    solver: GpuSolver,
    renderer: Renderer,
    scene: Option<Scene>,
    lights: LightsGpu,
    camera: Camera,
    input: Input,
    interaction: Interaction,
    timer: FrameTimer,
    panel: ControlPanel,
    #[cfg(feature = "egui")]
    egui: EguiOverlay,
}

impl Viewer {
    async fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let gpu = GpuContext::new(Arc::clone(&window)).await?;
        let renderer = Renderer::new(&gpu.device, &gpu.queue, gpu.surface_format())?;
        let mut solver = GpuSolver::new(Arc::clone(&gpu.device), Arc::clone(&gpu.queue));
        if Path::new(KERNEL_SOURCE_PATH).exists() {
            solver = solver.with_kernel_path(KERNEL_SOURCE_PATH);
        }

        let size = window.inner_size();
        let mut camera = Camera::new();
        camera.set_viewport(size.width, size.height);
        let mut input = Input::new();
        input.set_window_size(size.width, size.height);

        let mut panel = ControlPanel::new();
        if let Some(msg) = solver_fault(&solver) {
            panel.set_status(Status::error(msg));
        }

        #[cfg(feature = "egui")]
        let egui = EguiOverlay::new(&gpu.device, gpu.surface_format(), &window);

        Ok(Self {
            window,
            gpu,
            solver,
            renderer,
            scene: None,
            lights: LightsGpu::default(),
            camera,
            input,
            interaction: Interaction::new(),
            timer: FrameTimer::new(),
            panel,
            #[cfg(feature = "egui")]
            egui,
        })
    }

    /// Replace the running scene. Cloth buffers are rebuilt from scratch.
    fn install_scene(&mut self, mut scene: Scene) {
        self.renderer.set_scene(&self.gpu.device, &self.gpu.queue, &scene);
        self.solver.clear();
        for entry in scene.take_cloths() {
            if let Err(e) = self.solver.add(entry.cloth) {
                log::error!("{}", e);
                self.panel.set_status(Status::error(e.to_string()));
            }
        }

        self.lights = LightsGpu::from_entities(&scene.entities);
        self.camera = scene.camera.clone();
        self.camera.set_viewport(self.gpu.config.width, self.gpu.config.height);
        self.interaction.release();
        self.window.set_title(&format!("PBD Cloth: {}", scene.name));
        log::info!("Scene '{}' running with {} cloth instances", scene.name, self.solver.num_instances());
        self.scene = Some(scene);
    }

    fn frame(&mut self, params: &mut ClothSimParams, textures: &mut TextureCache) {
        self.timer.frame();
        self.handle_input();

        if !self.panel.paused && !self.solver.state().is_faulted() {
            if let Some(scene) = &self.scene {
                let grab = self.interaction.grab_request();
                let start = Instant::now();
                match self.solver.step(params, &scene.planes, grab.as_ref()) {
                    Ok(()) => self.timer.record_sim(start.elapsed()),
                    Err(e) => {
                        self.panel.set_status(Status::error(e.to_string()));
                        self.panel.paused = true;
                    }
                }
            }
        }

        let actions = self.render(params);
        for action in actions {
            self.apply(action, params, textures);
        }
        self.input.begin_frame();
    }

    fn handle_input(&mut self) {
        let keys = self.input.orbit_keys();
        if keys != glam::Vec2::ZERO {
            self.camera.orbit(keys.x * KEY_ORBIT_SPEED, keys.y * KEY_ORBIT_SPEED);
        }
        if self.input.scroll_delta() != 0.0 {
            self.camera.zoom(self.input.scroll_delta());
        }
        if self.input.key_pressed(KeyCode::Space) {
            self.panel.paused = !self.panel.paused;
        }

        #[cfg(feature = "egui")]
        let over_panel = self.egui.wants_pointer();
        #[cfg(not(feature = "egui"))]
        let over_panel = false;

        let ray = self.camera.cursor_ray(self.input.mouse_ndc());
        if self.input.alt() {
            if self.input.mouse_held(MouseButton::Left) {
                let d = self.input.mouse_delta();
                self.camera.orbit(-d.x * MOUSE_ORBIT_SPEED, d.y * MOUSE_ORBIT_SPEED);
            }
        } else if self.input.mouse_pressed(MouseButton::Left) && !over_panel {
            if let Err(e) = self.interaction.begin(&mut self.solver, ray, self.input.shift()) {
                log::warn!("Pick rejected: {}", e);
            }
        } else if self.input.mouse_held(MouseButton::Left) {
            self.interaction.drag(ray);
        }
        if self.input.mouse_released(MouseButton::Left) {
            self.interaction.release();
        }
    }

    fn render(&mut self, params: &mut ClothSimParams) -> Vec<UiAction> {
        let frame = match self.gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (w, h) = (self.gpu.config.width, self.gpu.config.height);
                self.gpu.resize(w, h);
                return Vec::new();
            }
            Err(e) => {
                log::error!("Surface error: {}", e);
                return Vec::new();
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let viewport = (self.gpu.config.width, self.gpu.config.height);

        let grabbed = self.interaction.grabbed();
        self.renderer.prepare(&self.gpu.queue, &self.camera, &self.lights, viewport, grabbed.map(|h| h.vertex));

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        self.renderer.render(
            &self.gpu.device,
            &mut encoder,
            &view,
            &self.gpu.depth_view,
            self.solver.cloths(),
            grabbed.map(|h| h.instance),
        );

        #[cfg(feature = "egui")]
        let actions = {
            let mut actions = Vec::new();
            self.egui.run(&self.window, |ctx| {
                actions = self.panel.show(ctx, params, &self.timer, self.solver.state());
            });
            self.egui.paint(&self.gpu.device, &self.gpu.queue, &mut encoder, &view, [viewport.0, viewport.1]);
            actions
        };
        #[cfg(not(feature = "egui"))]
        let actions = {
            let _ = params;
            if self.input.key_pressed(KeyCode::R) {
                vec![UiAction::ResetScene]
            } else {
                Vec::new()
            }
        };

        self.gpu.queue.submit(Some(encoder.finish()));
        frame.present();
        actions
    }

    fn apply(&mut self, action: UiAction, params: &mut ClothSimParams, textures: &mut TextureCache) {
        match action {
            UiAction::ReloadShaders => {
                let programs = self.scene.as_ref().map_or(&[][..], |s| s.shaders.as_slice());
                let failed = self.renderer.reload_programs(&self.gpu.device, programs);
                if failed == 0 {
                    self.panel.set_status(Status::info("Shaders reloaded"));
                } else {
                    self.panel.set_status(Status::error(format!("{} shader programs failed; see log", failed)));
                }
            }
            UiAction::ReloadKernels => {
                let result = self.solver.reload_kernels();
                self.panel.report(result, "Kernels rebuilt");
            }
            UiAction::ResetScene => {
                let Some(scene) = &self.scene else { return };
                match scene.rebuild(textures) {
                    Ok(scene) => {
                        self.install_scene(scene);
                        self.panel.set_status(Status::info("Scene reset"));
                    }
                    Err(e) => self.panel.set_status(Status::error(e.to_string())),
                }
            }
            UiAction::LoadScene(path) => match Scene::load(&path, textures) {
                Ok(scene) => {
                    self.install_scene(scene);
                    self.panel.set_status(Status::info(format!("Loaded {}", path.display())));
                }
                Err(e) => self.panel.set_status(Status::error(e.to_string())),
            },
            UiAction::SaveScene(path) => {
                let Some(scene) = &self.scene else { return };
                let result = scene.save(&path);
                self.panel.report(result, format!("Saved {}", path.display()));
            }
            UiAction::LoadParams(path) => match ClothSimParams::load(&path) {
                Ok(loaded) => {
                    *params = loaded;
                    self.panel.set_status(Status::info(format!("Loaded {}", path.display())));
                }
                Err(e) => self.panel.set_status(Status::error(e.to_string())),
            },
            UiAction::SaveParams(path) => {
                let result = params.save(&path);
                self.panel.report(result, format!("Saved {}", path.display()));
            }
        }
    }
}

fn solver_fault(solver: &GpuSolver) -> Option<String> {
    match solver.state() {
        crate::solver::SolverState::Faulted(msg) => Some(msg.clone()),
        _ => None,
    }
}
