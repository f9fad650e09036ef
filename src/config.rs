use crate::catalog::{ScreenAppearance, ScreenKey, Style};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KioskConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub countdown: CountdownConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Ordered style catalog offered on the first screen
    #[serde(default = "default_styles")]
    pub styles: Vec<Style>,
    #[serde(default)]
    pub screens: ScreenSettings,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Whether the controller drives a real walk-up session or only renders screens
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Kiosk,
    Preview,
}

impl SessionMode {
    pub fn is_interactive(&self) -> bool {
        matches!(self, SessionMode::Kiosk)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub mode: SessionMode,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// Synthetic frames, no hardware required
    #[default]
    Mock,
    /// V4L2 device through GStreamer (requires the `camera` feature)
    Gstreamer,
}

/// One rung of the acquisition fallback ladder
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    /// Requested resolution; `None` accepts whatever the device offers
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,
    #[serde(default)]
    pub fps: Option<u32>,
}

impl StreamConstraints {
    pub fn any() -> Self {
        Self {
            resolution: None,
            fps: None,
        }
    }

    pub fn resolution(width: u32, height: u32) -> Self {
        Self {
            resolution: Some((width, height)),
            fps: None,
        }
    }

    pub fn describe(&self) -> String {
        match (self.resolution, self.fps) {
            (Some((w, h)), Some(fps)) => format!("{}x{}@{}", w, h, fps),
            (Some((w, h)), None) => format!("{}x{}", w, h),
            (None, Some(fps)) => format!("any@{}", fps),
            (None, None) => "any".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub backend: CameraBackend,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Constraint fallback ladder, tried in order
    #[serde(default = "default_constraints")]
    pub constraints: Vec<StreamConstraints>,

    /// Bounded wait for the stream to report usable dimensions
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,

    /// Interval between readiness probes
    #[serde(default = "default_readiness_poll_ms")]
    pub readiness_poll_ms: u64,

    /// Delay between stop and start when retrying, lets the OS release device locks
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Encoded stills smaller than this are treated as empty frames
    #[serde(default = "default_min_still_bytes")]
    pub min_still_bytes: usize,

    /// JPEG quality for stills encoded from raw frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl CameraConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::default(),
            index: default_camera_index(),
            constraints: default_constraints(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            readiness_poll_ms: default_readiness_poll_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            min_still_bytes: default_min_still_bytes(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CountdownConfig {
    /// Seconds counted down before the photo is taken
    #[serde(default = "default_countdown_seconds")]
    pub seconds: u32,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl CountdownConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            seconds: default_countdown_seconds(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    /// Avatar generation endpoint accepting `{image, style}`
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// Optional transport timeout; absent means none beyond the transport's own
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeliveryConfig {
    /// Messaging gateway endpoint
    #[serde(default = "default_gateway_endpoint")]
    pub gateway_endpoint: String,

    /// Channel identifier sent with every message
    #[serde(default = "default_channel_id")]
    pub channel_id: String,

    /// Destination used by the operator console's send key
    #[serde(default)]
    pub default_destination: Option<String>,

    #[serde(default)]
    pub default_caption: Option<String>,

    /// Directory print jobs are spooled to
    #[serde(default = "default_print_spool_dir")]
    pub print_spool_dir: String,

    /// Command invoked with the spooled file path (e.g. "lp")
    #[serde(default)]
    pub print_command: Option<String>,

    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            gateway_endpoint: default_gateway_endpoint(),
            channel_id: default_channel_id(),
            default_destination: None,
            default_caption: None,
            print_spool_dir: default_print_spool_dir(),
            print_command: None,
            request_timeout_secs: None,
        }
    }
}

/// Per-screen appearance values supplied by the event configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScreenSettings {
    #[serde(default)]
    pub styles: ScreenAppearance,
    #[serde(default)]
    pub camera: ScreenAppearance,
    #[serde(default)]
    pub countdown: ScreenAppearance,
    #[serde(default)]
    pub loading: ScreenAppearance,
    #[serde(default)]
    pub result: ScreenAppearance,
}

impl ScreenSettings {
    pub fn get(&self, key: ScreenKey) -> &ScreenAppearance {
        match key {
            ScreenKey::Styles => &self.styles,
            ScreenKey::Camera => &self.camera,
            ScreenKey::Countdown => &self.countdown,
            ScreenKey::Loading => &self.loading,
            ScreenKey::Result => &self.result,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArtifactsConfig {
    /// Write a JSON record for every finished session
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_artifacts_directory")]
    pub directory: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_artifacts_directory(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Directory for daily rotated log files; console only when unset
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_log_file_prefix(),
        }
    }
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            camera: CameraConfig::default(),
            countdown: CountdownConfig::default(),
            generation: GenerationConfig::default(),
            delivery: DeliveryConfig::default(),
            styles: default_styles(),
            screens: ScreenSettings::default(),
            artifacts: ArtifactsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl KioskConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("kiosk.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.index", default_camera_index())?
            .set_default("camera.readiness_timeout_ms", default_readiness_timeout_ms())?
            .set_default("camera.settle_delay_ms", default_settle_delay_ms())?
            .set_default("countdown.seconds", default_countdown_seconds())?
            .set_default("countdown.tick_interval_ms", default_tick_interval_ms())?
            .set_default("generation.endpoint", default_generation_endpoint())?
            .set_default("delivery.gateway_endpoint", default_gateway_endpoint())?
            .set_default("delivery.channel_id", default_channel_id())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. KIOSK_CAMERA__INDEX=1
            .add_source(
                Environment::with_prefix("KIOSK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: KioskConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.constraints.is_empty() {
            return Err(ConfigError::Message(
                "Camera constraint ladder must contain at least one entry".to_string(),
            ));
        }

        if self
            .camera
            .constraints
            .iter()
            .filter_map(|c| c.resolution)
            .any(|(w, h)| w == 0 || h == 0)
        {
            return Err(ConfigError::Message(
                "Camera constraint resolutions must be greater than 0".to_string(),
            ));
        }

        if self.camera.readiness_timeout_ms == 0 || self.camera.readiness_poll_ms == 0 {
            return Err(ConfigError::Message(
                "Camera readiness timeout and poll interval must be greater than 0".to_string(),
            ));
        }

        if self.camera.jpeg_quality == 0 || self.camera.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Camera jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.countdown.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Countdown tick interval must be greater than 0".to_string(),
            ));
        }

        if self.styles.is_empty() {
            return Err(ConfigError::Message(
                "Style catalog must contain at least one style".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for style in &self.styles {
            if style.id.trim().is_empty() {
                return Err(ConfigError::Message("Style ids must not be empty".to_string()));
            }
            if !seen.insert(style.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate style id '{}'",
                    style.id
                )));
            }
        }

        for key in ScreenKey::ALL {
            if let Some(opacity) = self.screens.get(key).overlay_opacity {
                if !(0.0..=1.0).contains(&opacity) {
                    return Err(ConfigError::Message(format!(
                        "Overlay opacity for screen '{}' must be between 0 and 1",
                        key.as_str()
                    )));
                }
            }
        }

        for (name, endpoint) in [
            ("generation.endpoint", &self.generation.endpoint),
            ("delivery.gateway_endpoint", &self.delivery.gateway_endpoint),
        ] {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Message(format!(
                    "{} must be an http(s) URL",
                    name
                )));
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_constraints() -> Vec<StreamConstraints> {
    vec![
        StreamConstraints::resolution(1920, 1080),
        StreamConstraints::resolution(1280, 720),
        StreamConstraints::any(),
    ]
}
fn default_readiness_timeout_ms() -> u64 {
    10_000
}
fn default_readiness_poll_ms() -> u64 {
    50
}
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_min_still_bytes() -> usize {
    1000
}
fn default_jpeg_quality() -> u8 {
    90
}

fn default_countdown_seconds() -> u32 {
    3
}
fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_generation_endpoint() -> String {
    "http://localhost:3000/api/generate-avatar".to_string()
}

fn default_gateway_endpoint() -> String {
    "http://localhost:3000/api/send-message".to_string()
}
fn default_channel_id() -> String {
    "kiosk".to_string()
}
fn default_print_spool_dir() -> String {
    "./print-spool".to_string()
}

fn default_artifacts_directory() -> String {
    "./sessions".to_string()
}
fn default_log_file_prefix() -> String {
    "kiosk.log".to_string()
}

fn default_styles() -> Vec<Style> {
    vec![
        Style::new("pixar", "Pixar", "🎬", "3D animated movie character"),
        Style::new("anime", "Anime", "🌸", "Japanese animation style"),
        Style::new("comic", "Comic Book", "💥", "Bold ink and halftone colors"),
        Style::new("watercolor", "Watercolor", "🎨", "Soft painted portrait"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = KioskConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.camera.constraints.len(), 3);
        assert_eq!(config.camera.readiness_timeout(), Duration::from_secs(10));
        assert_eq!(config.camera.settle_delay(), Duration::from_millis(500));
        assert!(config.session.mode.is_interactive());
    }

    #[test]
    fn test_config_validation() {
        let mut config = KioskConfig::default();

        config.camera.constraints.clear();
        assert!(config.validate().is_err());
        config.camera.constraints = default_constraints();

        config.countdown.tick_interval_ms = 0;
        assert!(config.validate().is_err());
        config.countdown.tick_interval_ms = 1000;

        config.styles.push(Style::new("pixar", "Again", "", ""));
        assert!(config.validate().is_err());
        config.styles.pop();

        config.screens.result.overlay_opacity = Some(1.5);
        assert!(config.validate().is_err());
        config.screens.result.overlay_opacity = Some(0.4);

        config.generation.endpoint = "ftp://nope".to_string();
        assert!(config.validate().is_err());
        config.generation.endpoint = default_generation_endpoint();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let mut config = KioskConfig::default();
        config.styles.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[session]
mode = "preview"

[camera]
index = 2
readiness_timeout_ms = 2500

[countdown]
seconds = 5

[[styles]]
id = "pixar"
display_name = "Pixar"

[screens.result]
title = "Your avatar"
overlay_opacity = 0.5
"#
        )
        .unwrap();

        let config = KioskConfig::load_from_file(&path).unwrap();
        assert_eq!(config.session.mode, SessionMode::Preview);
        assert_eq!(config.camera.index, 2);
        assert_eq!(config.camera.readiness_timeout_ms, 2500);
        assert_eq!(config.camera.settle_delay_ms, 500);
        assert_eq!(config.countdown.seconds, 5);
        assert_eq!(config.styles.len(), 1);
        assert_eq!(config.styles[0].display_name, "Pixar");
        assert_eq!(
            config.screens.get(ScreenKey::Result).title.as_deref(),
            Some("Your avatar")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = KioskConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.countdown.seconds, 3);
        assert_eq!(config.styles.len(), 4);
        assert!(config.validate().is_ok());
    }
}
