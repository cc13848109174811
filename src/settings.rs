use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::PeelError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
    #[serde(default)]
    pub peel: PeelSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            present_mode: PresentModeSetting::default(),
            peel: PeelSettings::default(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if let Err(err) = PeelSettings::check_layer_count(self.peel.layer_count) {
            warn!("{err}. Using {} layers.", PeelSettings::default_layer_count());
            self.peel.layer_count = PeelSettings::default_layer_count();
        }

        if let Err(err) = PeelSettings::check_opacity(self.peel.opacity) {
            warn!("{err}. Clamping into [0, 1].");
            self.peel.opacity = if self.peel.opacity.is_nan() {
                1.0
            } else {
                self.peel.opacity.clamp(0.0, 1.0)
            };
        }

        self
    }

    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }
}

/// Options recognised by the depth-peel coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeelSettings {
    #[serde(default)]
    pub peeling_enabled: bool,
    #[serde(default = "PeelSettings::default_layer_count")]
    pub layer_count: usize,
    #[serde(default = "PeelSettings::default_opacity")]
    pub opacity: f32,
    #[serde(default = "PeelSettings::default_double_sided")]
    pub double_sided: bool,
    #[serde(default = "PeelSettings::default_background_color")]
    pub background_color: [f32; 3],
}

impl Default for PeelSettings {
    fn default() -> Self {
        Self {
            peeling_enabled: false,
            layer_count: Self::default_layer_count(),
            opacity: Self::default_opacity(),
            double_sided: Self::default_double_sided(),
            background_color: Self::default_background_color(),
        }
    }
}

impl PeelSettings {
    pub fn check_layer_count(layer_count: usize) -> Result<(), PeelError> {
        if layer_count < 1 {
            return Err(PeelError::InvalidConfiguration(format!(
                "layer_count must be at least 1, got {layer_count}"
            )));
        }
        Ok(())
    }

    pub fn check_opacity(opacity: f32) -> Result<(), PeelError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(PeelError::InvalidConfiguration(format!(
                "opacity must be within [0, 1], got {opacity}"
            )));
        }
        Ok(())
    }

    pub fn background(&self) -> wgpu::Color {
        let [r, g, b] = self.background_color;
        wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        }
    }

    const fn default_layer_count() -> usize {
        5
    }

    const fn default_opacity() -> f32 {
        1.0
    }

    const fn default_double_sided() -> bool {
        true
    }

    // #1d1f2a
    fn default_background_color() -> [f32; 3] {
        [29.0 / 255.0, 31.0 / 255.0, 42.0 / 255.0]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

impl Default for PresentModeSetting {
    fn default() -> Self {
        PresentModeSetting::Fifo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            present_mode: PresentModeSetting::Immediate,
            peel: PeelSettings {
                layer_count: 0,
                opacity: 3.5,
                ..PeelSettings::default()
            },
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();

        assert_eq!(validated.resolution.width, Resolution::default().width);
        assert_eq!(validated.resolution.height, Resolution::default().height);
        assert_eq!(validated.peel.layer_count, 5);
        assert_eq!(validated.peel.opacity, 1.0);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            present_mode: PresentModeSetting::Mailbox,
            peel: PeelSettings {
                peeling_enabled: true,
                layer_count: 8,
                opacity: 0.35,
                double_sided: false,
                background_color: [0.0, 0.5, 1.0],
            },
        };

        let validated = valid.clone().validate();

        assert_eq!(validated.resolution.width, valid.resolution.width);
        assert_eq!(validated.resolution.height, valid.resolution.height);
        assert_eq!(validated.peel, valid.peel);
    }

    #[test]
    fn peel_section_defaults_when_missing() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "resolution": { "width": 800, "height": 600 } }"#)
                .expect("settings parse");

        assert_eq!(settings.peel, PeelSettings::default());
        assert!(!settings.peel.peeling_enabled);
        assert_eq!(settings.peel.layer_count, 5);
        assert!(settings.peel.double_sided);
    }

    #[test]
    fn partial_peel_section_keeps_other_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "peel": { "peeling_enabled": true, "layer_count": 3 } }"#)
                .expect("settings parse");

        assert!(settings.peel.peeling_enabled);
        assert_eq!(settings.peel.layer_count, 3);
        assert_eq!(settings.peel.opacity, 1.0);
    }

    #[test]
    fn layer_count_and_opacity_checks() {
        assert!(PeelSettings::check_layer_count(0).is_err());
        assert!(PeelSettings::check_layer_count(1).is_ok());
        assert!(PeelSettings::check_opacity(-0.01).is_err());
        assert!(PeelSettings::check_opacity(f32::NAN).is_err());
        assert!(PeelSettings::check_opacity(0.0).is_ok());
        assert!(PeelSettings::check_opacity(1.0).is_ok());
    }

    #[test]
    fn present_mode_returns_desired_when_available() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
        ];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Mailbox
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }
}
