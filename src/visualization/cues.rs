// src/visualization/cues.rs

use eframe::egui;

use super::VisualizationConfig;
use crate::recording::CueView;

/// Paints the recorder's current cue on black and closes once the session is over.
pub struct CueWindow {
    view: CueView,
    texture: Option<egui::TextureHandle>,
    painted: Option<u64>,
}

impl CueWindow {
    pub fn new(view: CueView) -> Self {
        Self {
            view,
            texture: None,
            painted: None,
        }
    }

    /// Blocks the calling thread (must be the main thread) until the window is closed.
    pub fn run(view: CueView, config: &VisualizationConfig) -> Result<(), eframe::Error> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([config.window_width as f32, config.window_width as f32])
                .with_title("Intent Recording"),
            ..Default::default()
        };

        eframe::run_native(
            "Intent Recording",
            options,
            Box::new(|_cc| Ok(Box::new(CueWindow::new(view)))),
        )
    }

    fn sync_texture(&mut self, ctx: &egui::Context) {
        let (cue, serial) = self.view.current();
        if self.painted == Some(serial) {
            return;
        }
        let image = self.view.image(cue);
        let size = [image.width() as usize, image.height() as usize];
        let colour = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());
        match &mut self.texture {
            Some(texture) => texture.set(colour, egui::TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("cue", colour, egui::TextureOptions::LINEAR)),
        }
        self.painted = Some(serial);
    }
}

impl eframe::App for CueWindow {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.view.is_finished() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        ctx.request_repaint_after(std::time::Duration::from_millis(30));
        self.sync_texture(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::default().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let Some(texture) = &self.texture else {
                    return;
                };
                let side = ui.available_width().min(ui.available_height()).max(1.0);
                let sized = egui::load::SizedTexture::new(texture.id(), egui::vec2(side, side));
                ui.centered_and_justified(|ui| {
                    ui.add(egui::Image::new(sized));
                });
            });
    }
}
