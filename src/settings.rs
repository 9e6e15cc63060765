// ============================================================================
// SETTINGS: persistent `key=value` configuration
// ============================================================================

use std::path::PathBuf;

use crate::geometry::MAX_DISPLAY_SIZE;
use crate::log_warn;

const SETTINGS_FILE: &str = "segmentfe_settings.cfg";

/// Set to `1` to force the software-only path regardless of settings.
pub const DISABLE_GPU_ENV: &str = "SEGMENTFE_DISABLE_GPU";

/// Application settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Initialise the GPU renderer at all
    pub gpu_acceleration: bool,
    /// Adapter power preference: "Auto", "Low Power" or "High Performance"
    pub preferred_gpu: String,
    /// Canvas-fit bound on the longer axis
    pub max_display_size: u32,
    /// Initial brush size in display pixels
    pub default_brush_size: u32,
    /// Eraser samples are joined with capsules like the pencil
    pub connect_eraser_strokes: bool,
    /// Seconds before an empty result resets the session
    pub empty_reset_secs: u64,
    /// Mask source for the built-in directory provider
    pub masks_dir: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            gpu_acceleration: true,
            preferred_gpu: "Auto".to_string(),
            max_display_size: MAX_DISPLAY_SIZE,
            default_brush_size: 10,
            connect_eraser_strokes: false,
            empty_reset_secs: 3,
            masks_dir: String::new(),
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/segmentfe/segmentfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\SegmentFE\segmentfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/SegmentFE/segmentfe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("segmentfe");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_else(|_| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                    .unwrap_or_default()
            });
            let config_dir = PathBuf::from(appdata).join("SegmentFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("SegmentFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// True when settings or the environment rule out GPU rendering.
    pub fn gpu_disabled(&self) -> bool {
        !self.gpu_acceleration || env_disables_gpu()
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "gpu_acceleration={}\n\
             preferred_gpu={}\n\
             max_display_size={}\n\
             default_brush_size={}\n\
             connect_eraser_strokes={}\n\
             empty_reset_secs={}\n\
             masks_dir={}\n",
            self.gpu_acceleration,
            self.preferred_gpu,
            self.max_display_size,
            self.default_brush_size,
            self.connect_eraser_strokes,
            self.empty_reset_secs,
            self.masks_dir,
        )
    }

    /// Parse settings text.  Unknown keys and unparsable values fall back to
    /// defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "gpu_acceleration" => {
                    s.gpu_acceleration = val == "true";
                }
                "preferred_gpu" => {
                    s.preferred_gpu = val.to_string();
                }
                "max_display_size" => {
                    s.max_display_size = val.parse().ok().filter(|&v| v > 0).unwrap_or(MAX_DISPLAY_SIZE);
                }
                "default_brush_size" => {
                    s.default_brush_size = val.parse().unwrap_or(10).clamp(1, 100);
                }
                "connect_eraser_strokes" => {
                    s.connect_eraser_strokes = val == "true";
                }
                "empty_reset_secs" => {
                    s.empty_reset_secs = val.parse().unwrap_or(3);
                }
                "masks_dir" => {
                    s.masks_dir = val.to_string();
                }
                _ => {}
            }
        }
        s
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            log_warn!("Failed to save settings to {}: {}", path.display(), e);
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }
}

pub fn env_disables_gpu() -> bool {
    std::env::var(DISABLE_GPU_ENV).map(|v| v.trim() == "1").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_keep_defaults() {
        let s = AppSettings::parse("garbage\nunknown=1\n");
        assert_eq!(s, AppSettings::default());
    }

    #[test]
    fn parses_written_config() {
        let mut s = AppSettings::default();
        s.gpu_acceleration = false;
        s.preferred_gpu = "High Performance".into();
        s.max_display_size = 640;
        s.default_brush_size = 25;
        s.connect_eraser_strokes = true;
        s.empty_reset_secs = 5;
        s.masks_dir = "/tmp/masks".into();
        assert_eq!(AppSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn bad_values_fall_back() {
        let s = AppSettings::parse("max_display_size=0\ndefault_brush_size=900\nempty_reset_secs=x\n");
        assert_eq!(s.max_display_size, MAX_DISPLAY_SIZE);
        assert_eq!(s.default_brush_size, 100);
        assert_eq!(s.empty_reset_secs, 3);
    }

    #[test]
    fn gpu_disabled_by_setting() {
        let mut s = AppSettings::default();
        s.gpu_acceleration = false;
        assert!(s.gpu_disabled());
    }
}
