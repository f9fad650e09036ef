//! Read-only views of the event configuration: the style catalog and the
//! per-screen appearance values. Both are owned by the settings collaborator;
//! the session core only reads them and passes appearance through untouched.

use crate::config::ScreenSettings;
use serde::{Deserialize, Serialize};

/// One entry of the style catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    /// Identifier sent to the avatar generation service
    pub id: String,
    /// Name shown on the result summary line
    pub display_name: String,
    #[serde(default)]
    pub preview_glyph: String,
    #[serde(default)]
    pub description: String,
}

impl Style {
    pub fn new(id: &str, display_name: &str, preview_glyph: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            preview_glyph: preview_glyph.to_string(),
            description: description.to_string(),
        }
    }
}

/// Screen keys the appearance settings are indexed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenKey {
    Styles,
    Camera,
    Countdown,
    Loading,
    Result,
}

impl ScreenKey {
    pub const ALL: [ScreenKey; 5] = [
        ScreenKey::Styles,
        ScreenKey::Camera,
        ScreenKey::Countdown,
        ScreenKey::Loading,
        ScreenKey::Result,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenKey::Styles => "styles",
            ScreenKey::Camera => "camera",
            ScreenKey::Countdown => "countdown",
            ScreenKey::Loading => "loading",
            ScreenKey::Result => "result",
        }
    }
}

/// Appearance values for one screen, passed through to rendering unvalidated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenAppearance {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default)]
    pub overlay_opacity: Option<f32>,
}

pub trait StyleCatalog: Send + Sync {
    /// Styles in display order
    fn styles(&self) -> &[Style];

    fn find(&self, id: &str) -> Option<&Style> {
        self.styles().iter().find(|style| style.id == id)
    }
}

pub trait AppearanceSource: Send + Sync {
    fn appearance(&self, screen: ScreenKey) -> ScreenAppearance;
}

/// Catalog and appearance values loaded once from the kiosk configuration
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    styles: Vec<Style>,
    screens: ScreenSettings,
}

impl StaticCatalog {
    pub fn new(styles: Vec<Style>, screens: ScreenSettings) -> Self {
        Self { styles, screens }
    }
}

impl StyleCatalog for StaticCatalog {
    fn styles(&self) -> &[Style] {
        &self.styles
    }
}

impl AppearanceSource for StaticCatalog {
    fn appearance(&self, screen: ScreenKey) -> ScreenAppearance {
        self.screens.get(screen).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_style() {
        let catalog = StaticCatalog::new(
            vec![
                Style::new("pixar", "Pixar", "🎬", ""),
                Style::new("anime", "Anime", "🌸", ""),
            ],
            ScreenSettings::default(),
        );

        assert_eq!(catalog.find("anime").map(|s| s.display_name.as_str()), Some("Anime"));
        assert!(catalog.find("cubism").is_none());
        assert_eq!(catalog.styles()[0].id, "pixar");
    }

    #[test]
    fn test_appearance_passthrough() {
        let mut screens = ScreenSettings::default();
        screens.loading.title = Some("Painting...".to_string());
        screens.loading.overlay_opacity = Some(0.25);
        let catalog = StaticCatalog::new(Vec::new(), screens);

        let loading = catalog.appearance(ScreenKey::Loading);
        assert_eq!(loading.title.as_deref(), Some("Painting..."));
        assert_eq!(loading.overlay_opacity, Some(0.25));
        assert_eq!(catalog.appearance(ScreenKey::Styles), ScreenAppearance::default());
    }
}
