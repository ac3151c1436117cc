// src/gui.rs
use std::time::Instant;

use eframe::egui;
use egui::{Color32, RichText};
use egui_plot::{Line, Plot, PlotPoints};
use serial_scope::types::{sample_to_volts, MAX_SAMPLE};
use serial_scope::{AcquisitionState, Fault, Sample, ScopeConfig, ScopeStatus, Supervisor};

pub struct ScopeApp {
    supervisor: Supervisor,
    // frozen while held; refreshed every frame otherwise
    trace: Vec<Sample>,
    hold: bool,
    window_len: usize,
    full_scale_volts: f32,
}

impl ScopeApp {
    pub fn new(supervisor: Supervisor, config: &ScopeConfig) -> Self {
        Self {
            supervisor,
            trace: vec![0; config.window_len],
            hold: false,
            window_len: config.window_len,
            full_scale_volts: config.full_scale_volts,
        }
    }

    fn status_text(status: &ScopeStatus) -> String {
        match (&status.state, &status.fault) {
            (AcquisitionState::Discovering, Some(Fault::DeviceNotFound)) => {
                "Device not found, retrying...".to_owned()
            }
            (AcquisitionState::Error, Some(Fault::Link(msg)))
            | (AcquisitionState::Discovering, Some(Fault::Link(msg))) => {
                format!("Connection lost ({msg}), retrying...")
            }
            (AcquisitionState::Stopped, _) => "Stopped".to_owned(),
            _ => "Connecting...".to_owned(),
        }
    }

    fn draw_trace(&self, ui: &mut egui::Ui) {
        let points: Vec<[f64; 2]> = self
            .trace
            .iter()
            .enumerate()
            .map(|(i, &v)| [i as f64, v as f64])
            .collect();
        Plot::new("trace")
            .include_x(0.0)
            .include_x(self.window_len as f64)
            .include_y(0.0)
            .include_y(MAX_SAMPLE as f64 + 1.0)
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.line(Line::new(PlotPoints::new(points)).color(Color32::from_rgb(0, 255, 255)));
            });
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // P holds the trace, O toggles the noise filter
        if ctx.input(|i| i.key_pressed(egui::Key::P)) {
            self.hold = !self.hold;
        }
        if ctx.input(|i| i.key_pressed(egui::Key::O)) {
            self.supervisor.toggle_filter();
        }

        let status = self.supervisor.poll(Instant::now());
        if !self.hold {
            if let Some(snapshot) = self.supervisor.snapshot() {
                self.trace = snapshot;
            }
        }

        egui::TopBottomPanel::bottom("readout").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if status.filter_enabled {
                    ui.label(RichText::new("FILTERING").strong());
                }
                if self.hold {
                    ui.label(RichText::new("HOLD").strong());
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if let Some(latest) = self.supervisor.latest() {
                        let volts = sample_to_volts(latest, self.full_scale_volts);
                        ui.monospace(format!("{volts:.3} V"));
                    }
                });
            });
            ui.small("P: hold   O: filter");
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if status.state == AcquisitionState::Running {
                self.draw_trace(ui);
            } else {
                ui.centered_and_justified(|ui| {
                    ui.heading(Self::status_text(&status));
                });
            }
        });

        ctx.request_repaint();
    }
}

impl Drop for ScopeApp {
    fn drop(&mut self) {
        self.supervisor.stop();
    }
}
