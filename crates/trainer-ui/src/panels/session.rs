//! Session panel: one view per lifecycle state.

use egui::{self, RichText, Vec2};
use trainer_types::{
    event::MessageKind,
    session::{CreateSessionPayload, Session, SurveyAnswers},
};

use crate::state::{SessionView, UiState, SURVEY_QUESTIONS};
use crate::theme::*;

/// What the caller should do after rendering the session panel
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    None,
    Create(CreateSessionPayload),
    /// Also resumes a session left in `ReadyToStart`
    Start,
    ContinueToSurvey,
    SubmitSurvey(SurveyAnswers),
    /// Forget the finished session
    NewSession,
}

pub fn session_panel(ui: &mut egui::Ui, state: &mut UiState) -> SessionAction {
    let mut action = SessionAction::None;

    egui::Frame::default()
        .fill(BG_PRIMARY)
        .inner_margin(PANEL_PADDING)
        .show(ui, |ui| {
            ui.vertical(|ui| {
                status_line(ui, state);
                ui.separator();

                if let Some(session) = &state.session {
                    let copied = session_header(ui, session, state.can_copy_code());
                    if copied {
                        state.mark_code_copied();
                    }
                    ui.add_space(8.0);
                }

                action = match state.view() {
                    SessionView::NoSession => create_view(ui, state),
                    SessionView::Created => start_view(ui, state, "Start Session", None),
                    SessionView::ReadyToStart => start_view(
                        ui,
                        state,
                        "Resume Start",
                        Some("The session is ready but was not started. Resume to begin recording."),
                    ),
                    SessionView::Running => {
                        running_view(ui, state);
                        SessionAction::None
                    }
                    SessionView::AudioUploaded => {
                        ui.label(RichText::new("The recording has been received.").color(TEXT_PRIMARY));
                        ui.add_space(4.0);
                        if primary_button(ui, "Continue to Survey", !state.is_busy()) {
                            SessionAction::ContinueToSurvey
                        } else {
                            SessionAction::None
                        }
                    }
                    SessionView::SurveyPending => survey_view(ui, state),
                    SessionView::Completed => {
                        ui.label(RichText::new("Thank you! This session is complete.").color(SUCCESS));
                        ui.add_space(4.0);
                        if primary_button(ui, "New Session", true) {
                            SessionAction::NewSession
                        } else {
                            SessionAction::None
                        }
                    }
                    SessionView::Unknown(raw) => {
                        ui.label(
                            RichText::new(format!("The server reports an unrecognized state: {}", raw))
                                .color(WARNING),
                        );
                        if ui.button("Forget Session").clicked() {
                            SessionAction::NewSession
                        } else {
                            SessionAction::None
                        }
                    }
                };
            });
        });

    action
}

fn status_line(ui: &mut egui::Ui, state: &UiState) {
    ui.horizontal(|ui| {
        ui.heading(RichText::new("Training Session").color(TEXT_PRIMARY).strong());
        if state.is_busy() {
            ui.spinner();
        }
    });
    if let Some(message) = &state.status {
        let color = match message.kind {
            MessageKind::Info => TEXT_SECONDARY,
            MessageKind::Success => SUCCESS,
            MessageKind::Error => ERROR,
        };
        ui.label(RichText::new(&message.text).color(color));
    }
}

/// Returns true when the code was copied to the clipboard
fn session_header(ui: &mut egui::Ui, session: &Session, copyable: bool) -> bool {
    let mut copied = false;
    egui::Frame::default()
        .fill(BG_SECONDARY)
        .corner_radius(PANEL_ROUNDING)
        .inner_margin(8.0)
        .show(ui, |ui| {
            egui::Grid::new("session_header").num_columns(2).show(ui, |ui| {
                ui.label(RichText::new("Code").color(TEXT_SECONDARY).small());
                ui.horizontal(|ui| {
                    ui.label(RichText::new(&session.code).color(TEXT_PRIMARY).monospace());
                    if copyable && ui.small_button("Copy").clicked() {
                        ui.ctx().copy_text(session.code.clone());
                        copied = true;
                    }
                });
                ui.end_row();
                field(ui, "Participant", &session.participant.name);
                field(ui, "Text", &session.selected_text.title);
                field(ui, "State", &session.state.label());
            });
        });
    copied
}

fn field(ui: &mut egui::Ui, label: &str, value: &str) {
    ui.label(RichText::new(label).color(TEXT_SECONDARY).small());
    ui.label(RichText::new(value).color(TEXT_PRIMARY));
    ui.end_row();
}

fn primary_button(ui: &mut egui::Ui, text: &str, enabled: bool) -> bool {
    ui.add_enabled(
        enabled,
        egui::Button::new(RichText::new(text).color(TEXT_PRIMARY).strong())
            .fill(if enabled { ACCENT } else { BG_SURFACE })
            .corner_radius(PANEL_ROUNDING)
            .min_size(Vec2::new(140.0, 28.0)),
    )
    .clicked()
}

fn create_view(ui: &mut egui::Ui, state: &mut UiState) -> SessionAction {
    ui.label(RichText::new("New Session").color(ACCENT).strong());
    ui.add_space(2.0);

    let form = &mut state.create_form;
    ui.label(RichText::new("Name / Alias *").color(TEXT_SECONDARY).small());
    ui.text_edit_singleline(&mut form.name);
    ui.label(RichText::new("Approximate age").color(TEXT_SECONDARY).small());
    ui.add(egui::TextEdit::singleline(&mut form.age).hint_text("1-120"));
    ui.label(RichText::new("Email (optional)").color(TEXT_SECONDARY).small());
    ui.text_edit_singleline(&mut form.email);
    ui.label(RichText::new("Training text *").color(TEXT_SECONDARY).small());
    ui.text_edit_singleline(&mut form.text_id);

    ui.add_space(8.0);
    if !primary_button(ui, "Create Session", !state.is_busy()) {
        return SessionAction::None;
    }
    match state.create_form.to_payload() {
        Ok(payload) => SessionAction::Create(payload),
        Err(e) => {
            state.show_error(&e);
            SessionAction::None
        }
    }
}

fn start_view(ui: &mut egui::Ui, state: &UiState, label: &str, note: Option<&str>) -> SessionAction {
    if let Some(note) = note {
        ui.label(RichText::new(note).color(WARNING));
        ui.add_space(4.0);
    }
    if primary_button(ui, label, !state.is_busy()) {
        SessionAction::Start
    } else {
        SessionAction::None
    }
}

fn running_view(ui: &mut egui::Ui, state: &UiState) {
    ui.horizontal(|ui| {
        ui.spinner();
        ui.label(RichText::new("Waiting for the audio upload...").color(TEXT_PRIMARY));
    });
    let checked = state
        .last_check_label()
        .unwrap_or_else(|| "not yet".to_string());
    ui.label(RichText::new(format!("Last check: {}", checked)).color(TEXT_SECONDARY).small());
    if state.poll_failures > 0 {
        let detail = state.poll_error.as_deref().unwrap_or("unknown error");
        ui.label(
            RichText::new(format!(
                "Could not reach the server ({} in a row): {}",
                state.poll_failures, detail
            ))
            .color(WARNING)
            .small(),
        );
    }
}

fn survey_view(ui: &mut egui::Ui, state: &mut UiState) -> SessionAction {
    ui.label(RichText::new("Training Feedback Survey").color(ACCENT).strong());
    ui.add_space(2.0);

    let form = &mut state.survey_form;
    for question in &SURVEY_QUESTIONS {
        ui.label(RichText::new(format!("{} *", question.label)).color(TEXT_SECONDARY).small());
        let answer = form.choices.entry(question.key).or_default();
        let selected = question
            .options
            .iter()
            .find(|(value, _)| *value == answer.as_str())
            .map_or("Select an option", |(_, label)| *label);
        egui::ComboBox::from_id_salt(question.key)
            .selected_text(selected)
            .show_ui(ui, |ui| {
                for (value, label) in question.options {
                    ui.selectable_value(answer, value.to_string(), *label);
                }
            });
        ui.add_space(4.0);
    }
    ui.label(RichText::new("Suggested improvements").color(TEXT_SECONDARY).small());
    ui.add(
        egui::TextEdit::multiline(&mut form.suggestions)
            .hint_text("Tell us how we can improve...")
            .desired_rows(3),
    );

    ui.add_space(8.0);
    let enabled = !state.is_busy() && state.survey_form.is_complete();
    if !primary_button(ui, "Submit Survey", enabled) {
        return SessionAction::None;
    }
    match state.survey_form.to_answers() {
        Ok(answers) => SessionAction::SubmitSurvey(answers),
        Err(e) => {
            state.show_error(&e);
            SessionAction::None
        }
    }
}
