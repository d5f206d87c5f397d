//! Control panel overlay (`egui` feature).
//!
//! A frame is two calls: [`EguiOverlay::run`] lays out the panel and keeps
//! the tessellated result, [`EguiOverlay::paint`] uploads it and draws it in
//! a pass that loads the scene's color output.

use std::sync::Arc;

use winit::event::WindowEvent;
use winit::window::Window;

/// Laid-out panel waiting to be painted.
struct PendingPaint {
    primitives: Vec<egui::ClippedPrimitive>,
    textures: egui::TexturesDelta,
    pixels_per_point: f32,
}

pub struct EguiOverlay {
    ctx: egui::Context,
    winit_state: egui_winit::State,
    painter: egui_wgpu::Renderer,
    pending: Option<PendingPaint>,
}

impl EguiOverlay {
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat, window: &Arc<Window>) -> Self {
        let ctx = egui::Context::default();
        ctx.set_visuals(egui::Visuals {
            window_shadow: egui::Shadow::NONE,
            popup_shadow: egui::Shadow::NONE,
            ..egui::Visuals::dark()
        });

        let winit_state = egui_winit::State::new(
            ctx.clone(),
            egui::ViewportId::ROOT,
            window.as_ref(),
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        // No depth attachment, no MSAA, no dithering.
        let painter = egui_wgpu::Renderer::new(device, target_format, None, 1, false);

        Self { ctx, winit_state, painter, pending: None }
    }

    /// Returns true when the panel consumed the event.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    /// Pointer is over the panel or dragging one of its widgets.
    pub fn wants_pointer(&self) -> bool {
        self.ctx.wants_pointer_input() || self.ctx.is_pointer_over_area()
    }

    /// Lay out one UI frame.
    pub fn run(&mut self, window: &Window, build: impl FnMut(&egui::Context)) {
        let input = self.winit_state.take_egui_input(window);
        let output = self.ctx.run(input, build);
        self.winit_state.handle_platform_output(window, output.platform_output);

        self.pending = Some(PendingPaint {
            primitives: self.ctx.tessellate(output.shapes, output.pixels_per_point),
            textures: output.textures_delta,
            pixels_per_point: output.pixels_per_point,
        });
    }

    /// Record the overlay pass for the last [`run`](Self::run). Does nothing
    /// if there is no laid-out frame.
    pub fn paint(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        size_in_pixels: [u32; 2],
    ) {
        let Some(frame) = self.pending.take() else { return };
        let screen = egui_wgpu::ScreenDescriptor { size_in_pixels, pixels_per_point: frame.pixels_per_point };

        for (id, delta) in &frame.textures.set {
            self.painter.update_texture(device, queue, *id, delta);
        }
        self.painter.update_buffers(device, queue, encoder, &frame.primitives, &screen);

        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Panel Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.painter.render(&mut pass, &frame.primitives, &screen);
        drop(pass);

        for id in &frame.textures.free {
            self.painter.free_texture(id);
        }
    }
}
