use crate::catalog::{ScreenAppearance, ScreenKey};
use crate::config::SessionMode;
use crate::error::GenerationError;
use crate::frame::ImageData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Screens a session visits, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Step {
    #[default]
    Styles,
    Camera,
    PhotoPreview,
    Countdown,
    Loading,
    Result,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Styles,
        Step::Camera,
        Step::PhotoPreview,
        Step::Countdown,
        Step::Loading,
        Step::Result,
    ];

    /// Screens that own the camera stream while shown
    pub fn is_camera_bearing(&self) -> bool {
        matches!(self, Step::Camera | Step::PhotoPreview)
    }

    /// Appearance settings key; the photo preview shares the camera screen's
    pub fn screen_key(&self) -> ScreenKey {
        match self {
            Step::Styles => ScreenKey::Styles,
            Step::Camera | Step::PhotoPreview => ScreenKey::Camera,
            Step::Countdown => ScreenKey::Countdown,
            Step::Loading => ScreenKey::Loading,
            Step::Result => ScreenKey::Result,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Styles => "styles",
            Step::Camera => "camera",
            Step::PhotoPreview => "photo-preview",
            Step::Countdown => "countdown",
            Step::Loading => "loading",
            Step::Result => "result",
        };
        f.write_str(name)
    }
}

/// The mutable aggregate for one kiosk visit
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub step: Step,
    pub selected_style: Option<String>,
    pub captured_photo: Option<ImageData>,
    pub generated_avatar: Option<ImageData>,
    pub generation_error: Option<GenerationError>,
    pub countdown_value: u32,
    pub is_generating: bool,
    pub is_sending_delivery: bool,
    pub generation_attempts: u32,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            step: Step::Styles,
            selected_style: None,
            captured_photo: None,
            generated_avatar: None,
            generation_error: None,
            countdown_value: 0,
            is_generating: false,
            is_sending_delivery: false,
            generation_attempts: 0,
            started_at: Utc::now(),
        }
    }

    /// Image shown on the result screen: the avatar, else the original photo
    pub fn result_image(&self) -> Option<&ImageData> {
        self.generated_avatar
            .as_ref()
            .or(self.captured_photo.as_ref())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only snapshot of the controller handed to rendering
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub mode: SessionMode,
    pub step: Step,
    pub style_id: Option<String>,
    pub style_name: Option<String>,
    pub countdown_value: u32,
    pub has_photo: bool,
    pub has_avatar: bool,
    pub is_generating: bool,
    pub is_sending_delivery: bool,
    pub camera_active: bool,
    pub camera_starting: bool,
    pub camera_error: Option<String>,
    /// Whether the camera screen should offer its retry button
    pub camera_retryable: bool,
    pub generation_error: Option<String>,
    pub delivery_error: Option<String>,
    pub last_message_id: Option<String>,
    pub appearance: ScreenAppearance,
    pub summary: String,
}

/// One-line description of where the session stands
pub(crate) fn summary_line(session: &Session, style_name: Option<&str>) -> String {
    let style = style_name.unwrap_or("your");
    match session.step {
        Step::Styles => match style_name {
            Some(name) => format!("{} style selected", name),
            None => "Choose a style".to_string(),
        },
        Step::Camera => "Strike a pose".to_string(),
        Step::PhotoPreview => "Happy with this photo?".to_string(),
        Step::Countdown => format!("Get ready... {}", session.countdown_value),
        Step::Loading => format!("Creating your {} avatar", style),
        Step::Result => match (&session.generated_avatar, &session.generation_error) {
            (Some(_), _) => format!("Your {} avatar is ready!", style),
            (None, Some(_)) => "Showing your original photo".to_string(),
            (None, None) => "Your photo is ready".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_bearing_steps() {
        let bearing: Vec<_> = Step::ALL
            .iter()
            .filter(|step| step.is_camera_bearing())
            .collect();
        assert_eq!(bearing, vec![&Step::Camera, &Step::PhotoPreview]);
    }

    #[test]
    fn test_preview_uses_camera_appearance() {
        assert_eq!(Step::PhotoPreview.screen_key(), ScreenKey::Camera);
        assert_eq!(Step::Result.screen_key(), ScreenKey::Result);
    }

    #[test]
    fn test_new_session_is_blank() {
        let session = Session::new();
        assert_eq!(session.step, Step::Styles);
        assert!(session.selected_style.is_none());
        assert!(session.captured_photo.is_none());
        assert!(session.result_image().is_none());
        assert_ne!(session.id, Session::new().id);
    }

    #[test]
    fn test_result_falls_back_to_photo() {
        let mut session = Session::new();
        let photo = ImageData::from_bytes("image/jpeg", &[1, 2, 3]);
        session.captured_photo = Some(photo.clone());
        session.generation_error = Some(GenerationError::EmptyResponse);
        session.step = Step::Result;

        assert_eq!(session.result_image(), Some(&photo));
        assert_eq!(
            summary_line(&session, Some("Pixar")),
            "Showing your original photo"
        );

        let avatar = ImageData::from_bytes("image/png", &[4, 5, 6]);
        session.generated_avatar = Some(avatar.clone());
        session.generation_error = None;
        assert_eq!(session.result_image(), Some(&avatar));
        assert_eq!(
            summary_line(&session, Some("Pixar")),
            "Your Pixar avatar is ready!"
        );
    }
}
