// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
mod gui;

use anyhow::{anyhow, Context, Result};
use eframe::egui;
use log::error;
use serial_scope::drivers::{Connector, SerialConnector, SimulatedConnector};
use serial_scope::{ScopeConfig, Supervisor};

fn main() -> Result<()> {
    env_logger::init();
    let config = ScopeConfig::load().unwrap_or_else(|e| {
        error!("{e:#}; falling back to defaults");
        ScopeConfig::default()
    });
    let connector: Box<dyn Connector> = if config.simulate {
        Box::new(SimulatedConnector)
    } else {
        Box::new(SerialConnector::new(
            config.port_pattern.clone(),
            config.baud_rate,
            config.read_timeout(),
        ))
    };
    let supervisor =
        Supervisor::new(connector, config.clone()).context("invalid acquisition settings")?;

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([773.0, 580.0])
        .with_min_inner_size([400.0, 300.0])
        .with_title("Serial Scope");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "serial-scope",
        options,
        Box::new(move |_cc| Box::new(gui::ScopeApp::new(supervisor, &config))),
    )
    .map_err(|e| anyhow!("viewer exited with error: {e}"))
}
