//! Settings panel: backend address, access token, polling delays.
//! Includes an explicit Save button with visual feedback.

use egui::{self, RichText, Vec2};
use trainer_types::config::ClientConfig;
use crate::theme::*;

/// What the caller should do after rendering the settings panel
pub enum SettingsAction {
    /// Nothing changed
    None,
    /// A field was edited
    Changed,
    /// The user clicked the explicit Save button
    SaveClicked,
}

/// Save feedback passed in from the app layer
#[derive(Clone)]
pub struct SaveFeedback {
    pub message: String,
    pub success: bool,
}

/// Render the settings panel. `session_active` shows that new settings
/// wait until the current session is finished.
pub fn settings_panel(
    ui: &mut egui::Ui,
    config: &mut ClientConfig,
    session_active: bool,
    save_feedback: Option<&SaveFeedback>,
) -> SettingsAction {
    let mut changed = false;
    let mut save_clicked = false;

    egui::Frame::default()
        .fill(BG_SECONDARY)
        .inner_margin(PANEL_PADDING)
        .corner_radius(PANEL_ROUNDING)
        .show(ui, |ui| {
            ui.heading(RichText::new("Settings").color(TEXT_PRIMARY));
            ui.separator();

            // ── Backend Section ──────────────────────────────
            ui.label(RichText::new("Backend").color(ACCENT).strong());
            ui.add_space(2.0);

            ui.label(RichText::new("Server URL").color(TEXT_SECONDARY).small());
            if ui
                .add(egui::TextEdit::singleline(&mut config.api.base_url).hint_text("http://localhost:8000"))
                .changed()
            {
                changed = true;
            }

            ui.add_space(4.0);

            // Access token (masked)
            ui.label(RichText::new("Access Token (optional)").color(TEXT_SECONDARY).small());
            let mut token = config.api.auth_token.clone().unwrap_or_default();
            if ui
                .add(egui::TextEdit::singleline(&mut token).password(true))
                .changed()
            {
                config.api.auth_token = if token.is_empty() { None } else { Some(token) };
                changed = true;
            }

            ui.add_space(12.0);
            ui.separator();
            ui.add_space(4.0);

            // ── Polling Section ──────────────────────────────
            ui.label(RichText::new("Polling").color(ACCENT).strong());
            ui.add_space(2.0);

            let polling = &mut config.polling;
            ui.label(RichText::new("Base delay (ms)").color(TEXT_SECONDARY).small());
            if ui
                .add(egui::Slider::new(&mut polling.base_delay_ms, 500..=10_000))
                .changed()
            {
                changed = true;
            }
            ui.label(RichText::new("Added per failure (ms)").color(TEXT_SECONDARY).small());
            if ui
                .add(egui::Slider::new(&mut polling.step_ms, 0..=5_000))
                .changed()
            {
                changed = true;
            }
            ui.label(RichText::new("Maximum delay (ms)").color(TEXT_SECONDARY).small());
            if ui
                .add(egui::Slider::new(&mut polling.max_delay_ms, 1_000..=60_000))
                .changed()
            {
                changed = true;
            }

            if session_active {
                ui.add_space(4.0);
                ui.label(
                    RichText::new("Changes apply once the current session is finished.")
                        .color(WARNING)
                        .small()
                        .italics(),
                );
            }

            // ── Save Button ──────────────────────────────────
            ui.add_space(16.0);
            ui.separator();
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                let btn = ui.add(
                    egui::Button::new(
                        RichText::new("Save Settings")
                            .color(TEXT_PRIMARY)
                            .strong(),
                    )
                    .fill(ACCENT)
                    .corner_radius(PANEL_ROUNDING)
                    .min_size(Vec2::new(120.0, 28.0)),
                );
                if btn.clicked() {
                    save_clicked = true;
                }

                if let Some(fb) = save_feedback {
                    let color = if fb.success { SUCCESS } else { ERROR };
                    ui.label(
                        RichText::new(&fb.message)
                            .color(color)
                            .small(),
                    );
                }
            });
        });

    if save_clicked {
        SettingsAction::SaveClicked
    } else if changed {
        SettingsAction::Changed
    } else {
        SettingsAction::None
    }
}
