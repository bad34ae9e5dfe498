// src/visualization/window.rs

use std::sync::Arc;

use eframe::egui;

use super::plotter::ConfidenceTrace;
use super::VisualizationConfig;
use crate::feedback::{FrameSlot, ManualOverride};

/// Paints the latest rendered frame plus a trace of target and smoothed confidence.
pub struct FeedbackWindow {
    frames: FrameSlot,
    manual_override: Arc<ManualOverride>,
    config: VisualizationConfig,
    trace: ConfidenceTrace,
    texture: Option<egui::TextureHandle>,
    manual: bool,
    manual_value: f64,
}

impl FeedbackWindow {
    pub fn new(frames: FrameSlot, manual_override: Arc<ManualOverride>, config: VisualizationConfig) -> Self {
        let manual_value = manual_override.value();
        Self {
            frames,
            manual_override,
            trace: ConfidenceTrace::new(config.buffer_size),
            config,
            texture: None,
            manual: false,
            manual_value,
        }
    }

    /// Blocks the calling thread (must be the main thread) until the window is closed.
    pub fn run(
        frames: FrameSlot,
        manual_override: Arc<ManualOverride>,
        config: VisualizationConfig,
    ) -> Result<(), eframe::Error> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([config.window_width as f32, config.window_height as f32])
                .with_title("Intent Feedback"),
            ..Default::default()
        };

        eframe::run_native(
            "Intent Feedback",
            options,
            Box::new(|_cc| Ok(Box::new(FeedbackWindow::new(frames, manual_override, config)))),
        )
    }

    // Uploads the newest frame, if any, and records it in the trace.
    fn pull_frame(&mut self, ctx: &egui::Context) -> Option<(f64, f64)> {
        let frame = match self.frames.lock() {
            Ok(slot) => slot.clone()?,
            Err(_) => return None,
        };
        if self.trace.add_frame(&frame) {
            let size = [frame.image.width() as usize, frame.image.height() as usize];
            let image = egui::ColorImage::from_rgba_unmultiplied(size, frame.image.as_raw());
            match &mut self.texture {
                Some(texture) => texture.set(image, egui::TextureOptions::NEAREST),
                None => {
                    self.texture =
                        Some(ctx.load_texture("feedback-frame", image, egui::TextureOptions::NEAREST))
                }
            }
        }
        Some((frame.target, frame.smoothed))
    }
}

impl eframe::App for FeedbackWindow {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();
        let latest = self.pull_frame(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::default().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let Some(texture) = &self.texture else {
                    ui.label("Waiting for the render loop...");
                    return;
                };

                let side = ui.available_width().min(texture.size_vec2().x).max(1.0);
                let sized = egui::load::SizedTexture::new(texture.id(), egui::vec2(side, side));
                ui.vertical_centered(|ui| {
                    ui.add(egui::Image::new(sized));
                });

                if let Some((target, smoothed)) = latest {
                    ui.label(
                        egui::RichText::new(format!("target {:.2}   smoothed {:.2}", target, smoothed))
                            .color(egui::Color32::LIGHT_GRAY),
                    );
                }

                if self.config.allow_manual_override {
                    ui.horizontal(|ui| {
                        ui.checkbox(&mut self.manual, "manual");
                        ui.add_enabled(
                            self.manual,
                            egui::Slider::new(&mut self.manual_value, 0.0..=1.0).text("confidence"),
                        );
                    });
                    self.manual_override.set(self.manual_value);
                    self.manual_override.engage(self.manual);
                }

                if self.config.show_trace && !self.trace.is_empty() {
                    self.plot_trace(ui);
                }
            });
    }
}

impl FeedbackWindow {
    fn plot_trace(&self, ui: &mut egui::Ui) {
        use egui_plot::{Legend, Line, Plot, PlotPoints};

        let target: PlotPoints = self.trace.target_points().into();
        let smoothed: PlotPoints = self.trace.smoothed_points().into();

        Plot::new("confidence_trace")
            .height(self.config.plot_height as f32)
            .include_y(0.0)
            .include_y(1.0)
            .legend(Legend::default())
            .allow_zoom(false)
            .allow_drag(false)
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.line(
                    Line::new(target)
                        .color(egui::Color32::LIGHT_BLUE)
                        .width(1.0)
                        .name("target"),
                );
                plot_ui.line(
                    Line::new(smoothed)
                        .color(egui::Color32::LIGHT_GREEN)
                        .width(1.5)
                        .name("smoothed"),
                );
            });
    }
}
