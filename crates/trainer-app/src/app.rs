//! Main egui application: composes the panels and owns the session controller.

use std::rc::Rc;
use std::time::Duration;

use egui::{self, CentralPanel, RichText, SidePanel, TopBottomPanel};

use trainer_core::controller::SessionController;
use trainer_core::event_bus::EventBus;
use trainer_platform::{BrowserSpawner, GlooTimer, HttpSessionGateway};
use trainer_types::config::ClientConfig;
use trainer_ui::panels::session::{self, SessionAction};
use trainer_ui::panels::settings::{self, SaveFeedback, SettingsAction};
use trainer_ui::state::UiState;
use trainer_ui::theme;

const CONFIG_STORAGE_KEY: &str = "trainer:config";
const WAITING_REPAINT: Duration = Duration::from_millis(250);

/// The main application state
pub struct TrainerApp {
    ui_state: UiState,
    /// Being edited in the settings panel
    config: ClientConfig,
    /// Saved but not yet applied; waits for the current session to end
    pending_config: Option<ClientConfig>,
    event_bus: EventBus,
    controller: Rc<SessionController>,
    save_feedback: Option<SaveFeedback>,
    first_frame: bool,
}

impl TrainerApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let config = load_config().unwrap_or_default();
        let event_bus = EventBus::new();
        let controller = Rc::new(build_controller(&config, event_bus.clone()));
        log::info!("Using backend at {}", config.api.base_url);

        Self {
            ui_state: UiState::new(),
            config,
            pending_config: None,
            event_bus,
            controller,
            save_feedback: None,
            first_frame: true,
        }
    }

    /// Swap in a controller built from saved settings once nothing is in flight.
    fn apply_pending_config(&mut self) {
        if self.pending_config.is_none()
            || self.controller.session().is_some()
            || self.controller.is_loading()
        {
            return;
        }
        let Some(config) = self.pending_config.take() else {
            return;
        };
        self.controller.dispose();
        self.controller = Rc::new(build_controller(&config, self.event_bus.clone()));
        log::info!("Session controller rebuilt for {}", config.api.base_url);
    }

    fn handle_save(&mut self) {
        self.save_feedback = Some(match save_config(&self.config) {
            Ok(()) => {
                self.pending_config = Some(self.config.clone());
                let message = if self.controller.session().is_some() {
                    "Saved; applies after this session"
                } else {
                    "Saved"
                };
                SaveFeedback {
                    message: message.to_string(),
                    success: true,
                }
            }
            Err(message) => {
                log::warn!("Settings not saved: {}", message);
                SaveFeedback {
                    message,
                    success: false,
                }
            }
        });
    }

    /// Hand a panel action to the controller (async)
    fn dispatch(&mut self, action: SessionAction, ctx: &egui::Context) {
        match action {
            SessionAction::None => return,
            SessionAction::NewSession => {
                self.controller.reset();
                self.ui_state.create_form.clear();
                return;
            }
            _ => {}
        }

        let controller = self.controller.clone();
        let ctx = ctx.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let result = match action {
                SessionAction::Create(payload) => controller.create(payload).await.map(|_| ()),
                SessionAction::Start => controller.request_start().await.map(|_| ()),
                SessionAction::ContinueToSurvey => {
                    controller.request_continue_to_survey().await.map(|_| ())
                }
                SessionAction::SubmitSurvey(answers) => {
                    controller.submit_survey(answers).await.map(|_| ())
                }
                SessionAction::None | SessionAction::NewSession => Ok(()),
            };
            // The controller has already published the failure as a status message.
            if let Err(e) = result {
                log::debug!("Session action ended with error: {}", e);
            }
            ctx.request_repaint();
        });
    }
}

impl eframe::App for TrainerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.first_frame {
            theme::apply_theme(ctx);
            self.first_frame = false;
        }

        // Drain events from the session controller
        let events = self.event_bus.drain();
        if !events.is_empty() {
            self.ui_state.process_events(events);
            ctx.request_repaint();
        }
        self.apply_pending_config();

        // Polling results arrive outside of any input event
        if self.ui_state.is_busy() || self.ui_state.is_waiting_for_audio() {
            ctx.request_repaint_after(WAITING_REPAINT);
        }

        // ── Top bar ──────────────────────────────────────────
        TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    RichText::new("Speech Trainer")
                        .strong()
                        .color(theme::ACCENT)
                        .size(16.0),
                );
                ui.separator();
                ui.label(
                    RichText::new(format!("Server: {}", self.config.api.base_url))
                        .color(theme::TEXT_SECONDARY)
                        .small(),
                );
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui
                        .selectable_label(self.ui_state.show_settings, "Settings")
                        .clicked()
                    {
                        self.ui_state.show_settings = !self.ui_state.show_settings;
                    }
                });
            });
        });

        // ── Settings side panel ──────────────────────────────
        if self.ui_state.show_settings {
            let session_active = self.ui_state.has_session();
            let action = SidePanel::right("settings_panel")
                .min_width(280.0)
                .max_width(350.0)
                .show(ctx, |ui| {
                    settings::settings_panel(
                        ui,
                        &mut self.config,
                        session_active,
                        self.save_feedback.as_ref(),
                    )
                })
                .inner;
            match action {
                SettingsAction::SaveClicked => self.handle_save(),
                SettingsAction::Changed => self.save_feedback = None,
                SettingsAction::None => {}
            }
        }

        // ── Main content ─────────────────────────────────────
        let action = CentralPanel::default()
            .show(ctx, |ui| session::session_panel(ui, &mut self.ui_state))
            .inner;
        self.dispatch(action, ctx);
    }
}

fn build_controller(config: &ClientConfig, event_bus: EventBus) -> SessionController {
    SessionController::new(
        Rc::new(HttpSessionGateway::new(config.api.clone())),
        Rc::new(GlooTimer::new()),
        Rc::new(BrowserSpawner),
        &config.polling,
        event_bus,
    )
}

/// Restore settings from localStorage
fn load_config() -> Option<ClientConfig> {
    let storage = web_sys::window()?.local_storage().ok()??;
    let json = storage.get_item(CONFIG_STORAGE_KEY).ok()??;
    match ClientConfig::from_json(&json) {
        Ok(config) => {
            log::info!("Config restored from storage");
            Some(config)
        }
        Err(e) => {
            log::warn!("Ignoring stored config: {}", e);
            None
        }
    }
}

fn save_config(config: &ClientConfig) -> Result<(), String> {
    config.validate().map_err(|e| e.to_string())?;
    let json = serde_json::to_string(config).map_err(|e| e.to_string())?;
    let storage = web_sys::window()
        .and_then(|w| w.local_storage().ok().flatten())
        .ok_or_else(|| "Browser storage is unavailable".to_string())?;
    storage
        .set_item(CONFIG_STORAGE_KEY, &json)
        .map_err(|_| "Could not write browser storage".to_string())?;
    log::info!("Config saved to storage");
    Ok(())
}
