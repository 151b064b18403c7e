use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_PAGE_PATH: &str = "/attendance";
const DEFAULT_CAMERA_URL: &str = "stub://classroom";
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_RETRY_ATTEMPTS: u32 = 5;
const DEFAULT_FRAME_SKIP: u32 = 2;
const DEFAULT_MAX_WIDTH: u32 = 800;
const DEFAULT_JPEG_QUALITY: u8 = 70;
const DEFAULT_ERROR_BACKOFF_MS: u64 = 500;
const DEFAULT_STALE_MS: u64 = 3000;
const DEFAULT_DISPLAY_FPS: u32 = 60;
const DEFAULT_DURATION_MINUTES: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct KioskConfigFile {
    base_url: Option<String>,
    page_path: Option<String>,
    csrf_token: Option<String>,
    session_cookie: Option<String>,
    camera: Option<CameraConfigFile>,
    recognition: Option<RecognitionConfigFile>,
    overlay: Option<OverlayConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    retry_attempts: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecognitionConfigFile {
    frame_skip: Option<u32>,
    max_width: Option<u32>,
    jpeg_quality: Option<u8>,
    error_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    smoothing: Option<bool>,
    stale_ms: Option<u64>,
    display_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    default_duration_minutes: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct KioskConfig {
    pub base_url: String,
    pub page_path: String,
    pub csrf_token: Option<String>,
    pub session_cookie: Option<String>,
    pub camera: CameraSettings,
    pub recognition: RecognitionSettings,
    pub overlay: OverlaySettings,
    pub default_duration_minutes: u32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Automatic restarts allowed after camera loss while a session is live.
    pub retry_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    /// Capture on every Nth poll tick.
    pub frame_skip: u32,
    /// Frames wider than this are downscaled proportionally before upload.
    pub max_width: u32,
    pub jpeg_quality: u8,
    pub error_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub smoothing: bool,
    pub stale_after: Duration,
    pub display_fps: u32,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self::from_file(KioskConfigFile::default())
    }
}

impl KioskConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KIOSK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: KioskConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let recognition = file.recognition.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        Self {
            base_url: file
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            page_path: file
                .page_path
                .unwrap_or_else(|| DEFAULT_PAGE_PATH.to_string()),
            csrf_token: file.csrf_token.filter(|t| !t.trim().is_empty()),
            session_cookie: file.session_cookie.filter(|c| !c.trim().is_empty()),
            camera: CameraSettings {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                retry_attempts: camera
                    .retry_attempts
                    .unwrap_or(DEFAULT_CAMERA_RETRY_ATTEMPTS),
            },
            recognition: RecognitionSettings {
                frame_skip: recognition.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
                max_width: recognition.max_width.unwrap_or(DEFAULT_MAX_WIDTH),
                jpeg_quality: recognition.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                error_backoff: Duration::from_millis(
                    recognition
                        .error_backoff_ms
                        .unwrap_or(DEFAULT_ERROR_BACKOFF_MS),
                ),
            },
            overlay: OverlaySettings {
                smoothing: overlay.smoothing.unwrap_or(true),
                stale_after: Duration::from_millis(overlay.stale_ms.unwrap_or(DEFAULT_STALE_MS)),
                display_fps: overlay.display_fps.unwrap_or(DEFAULT_DISPLAY_FPS),
            },
            default_duration_minutes: file
                .session
                .and_then(|session| session.default_duration_minutes)
                .unwrap_or(DEFAULT_DURATION_MINUTES),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("KIOSK_BASE_URL") {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(token) = std::env::var("KIOSK_CSRF_TOKEN") {
            if !token.trim().is_empty() {
                self.csrf_token = Some(token);
            }
        }
        if let Ok(cookie) = std::env::var("KIOSK_SESSION_COOKIE") {
            if !cookie.trim().is_empty() {
                self.session_cookie = Some(cookie);
            }
        }
        if let Ok(url) = std::env::var("KIOSK_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(smoothing) = std::env::var("KIOSK_SMOOTHING") {
            if !smoothing.trim().is_empty() {
                self.overlay.smoothing = parse_bool(&smoothing)
                    .ok_or_else(|| anyhow!("KIOSK_SMOOTHING must be true or false"))?;
            }
        }
        if let Ok(skip) = std::env::var("KIOSK_FRAME_SKIP") {
            if !skip.trim().is_empty() {
                self.recognition.frame_skip = skip
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("KIOSK_FRAME_SKIP must be a positive integer"))?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| anyhow!("invalid base_url '{}': {}", self.base_url, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!("base_url must use http or https"));
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        if !self.page_path.starts_with('/') {
            self.page_path = format!("/{}", self.page_path);
        }
        if self.recognition.frame_skip == 0 {
            return Err(anyhow!("recognition.frame_skip must be at least 1"));
        }
        if self.recognition.max_width == 0 {
            return Err(anyhow!("recognition.max_width must be greater than zero"));
        }
        if !(1..=100).contains(&self.recognition.jpeg_quality) {
            return Err(anyhow!("recognition.jpeg_quality must be within 1..=100"));
        }
        if self.overlay.display_fps == 0 {
            return Err(anyhow!("overlay.display_fps must be greater than zero"));
        }
        if self.overlay.stale_after.is_zero() {
            return Err(anyhow!("overlay.stale_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Interval between display frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis((1000 / self.overlay.display_fps.max(1)).max(1) as u64)
    }
}

fn read_config_file(path: &Path) -> Result<KioskConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
