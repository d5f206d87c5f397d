//! Control panel: live parameters, reload buttons, file dialogs and the
//! status label.
//!
//! The panel never touches the solver or the scene directly. It edits the
//! parameters in place and returns [`UiAction`]s for the app to carry out.

use std::path::PathBuf;

#[cfg(feature = "egui")]
use crate::{params::ClothSimParams, solver::SolverState, time::FrameTimer};

/// Requests from the panel.
#[derive(Clone, Debug, PartialEq)]
pub enum UiAction {
    ReloadShaders,
    ReloadKernels,
    ResetScene,
    LoadScene(PathBuf),
    SaveScene(PathBuf),
    LoadParams(PathBuf),
    SaveParams(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

/// One-line message shown under the panel.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: StatusLevel::Info, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: StatusLevel::Error, message: message.into() }
    }
}

#[derive(Debug)]
pub struct ControlPanel {
    pub status: Option<Status>,
    pub paused: bool,
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPanel {
    pub fn new() -> Self {
        Self { status: None, paused: false }
    }

    pub fn set_status(&mut self, status: Status) {
        match status.level {
            StatusLevel::Info => log::info!("{}", status.message),
            StatusLevel::Error => log::error!("{}", status.message),
        }
        self.status = Some(status);
    }

    /// Report the outcome of an action: `Ok` shows `done`, `Err` shows the error.
    pub fn report<E: std::fmt::Display>(&mut self, result: Result<(), E>, done: impl Into<String>) {
        match result {
            Ok(()) => self.set_status(Status::info(done)),
            Err(e) => self.set_status(Status::error(e.to_string())),
        }
    }

    #[cfg(feature = "egui")]
    pub fn show(
        &mut self,
        ctx: &egui::Context,
        params: &mut ClothSimParams,
        timer: &FrameTimer,
        solver_state: &SolverState,
    ) -> Vec<UiAction> {
        let mut actions = Vec::new();

        egui::Window::new("Cloth")
            .default_pos([10.0, 10.0])
            .resizable(false)
            .show(ctx, |ui| {
                ui.heading("Simulation");
                ui.add(egui::Slider::new(&mut params.num_sub_steps, 1..=100).text("substeps"));
                ui.add(
                    egui::Slider::new(&mut params.delta_time, 0.001..=0.05)
                        .text("time step (s)")
                        .logarithmic(true),
                );
                ui.add(egui::Slider::new(&mut params.k_stretch, 0.0..=1.0).text("stretch stiffness"));
                ui.add(egui::Slider::new(&mut params.k_bend, 0.0..=1.0).text("bend stiffness"));
                ui.horizontal(|ui| {
                    ui.checkbox(&mut self.paused, "Paused");
                    if ui.button("Reset").clicked() {
                        actions.push(UiAction::ResetScene);
                    }
                });

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Reload shaders").clicked() {
                        actions.push(UiAction::ReloadShaders);
                    }
                    if ui.button("Reload kernels").clicked() {
                        actions.push(UiAction::ReloadKernels);
                    }
                });

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Load scene…").clicked() {
                        actions.extend(dialogs::open_json("Load scene").map(UiAction::LoadScene));
                    }
                    if ui.button("Save scene…").clicked() {
                        actions.extend(dialogs::save_json("Save scene", "scene.json").map(UiAction::SaveScene));
                    }
                });
                ui.horizontal(|ui| {
                    if ui.button("Load params…").clicked() {
                        actions.extend(dialogs::open_json("Load parameters").map(UiAction::LoadParams));
                    }
                    if ui.button("Save params…").clicked() {
                        actions.extend(dialogs::save_json("Save parameters", "params.json").map(UiAction::SaveParams));
                    }
                });

                ui.separator();
                ui.label(format!("Simulation: {:.2} ms/frame", timer.sim_ms()));
                ui.label(format!("Rendering: {:.1} fps", timer.fps()));
                if let SolverState::Faulted(msg) = solver_state {
                    ui.colored_label(egui::Color32::LIGHT_RED, format!("Solver faulted: {}", msg));
                }
                if let Some(status) = &self.status {
                    let color = match status.level {
                        StatusLevel::Info => ui.visuals().text_color(),
                        StatusLevel::Error => egui::Color32::LIGHT_RED,
                    };
                    ui.colored_label(color, &status.message);
                }
            });

        actions
    }
}

#[cfg(feature = "egui")]
mod dialogs {
    use std::path::PathBuf;

    #[cfg(not(target_arch = "wasm32"))]
    pub fn open_json(title: &str) -> Option<PathBuf> {
        rfd::FileDialog::new().set_title(title).add_filter("JSON", &["json"]).pick_file()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_json(title: &str, default_name: &str) -> Option<PathBuf> {
        rfd::FileDialog::new()
            .set_title(title)
            .set_file_name(default_name)
            .add_filter("JSON", &["json"])
            .save_file()
    }

    #[cfg(target_arch = "wasm32")]
    pub fn open_json(_title: &str) -> Option<PathBuf> {
        None
    }

    #[cfg(target_arch = "wasm32")]
    pub fn save_json(_title: &str, _default_name: &str) -> Option<PathBuf> {
        None
    }
}
