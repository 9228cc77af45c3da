//! Configuration surface for the Sp3ctra engine.
//!
//! The whole runtime surface as nested serde structs with defaults, TOML
//! loading and range validation. Validation runs before an engine is
//! built: a `Config` that passes [`Config::validate`] constructs without
//! further checks.
//!
//! Structural parameters (sensor DPI, pixels per note, buffer size, worker
//! count) live here and only here: changing one means rebuilding the
//! engine, which is how "apply at a safe boundary" is enforced.

mod error;

pub use error::{ConfigError, Result};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pixels per line at 200 DPI.
pub const PIXELS_200DPI: usize = 1728;

/// Pixels per line at 400 DPI.
pub const PIXELS_400DPI: usize = 3456;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Audio output settings.
    pub audio: AudioConfig,
    /// Scanner feed settings.
    pub network: NetworkConfig,
    /// Sensor geometry.
    pub scanner: ScannerConfig,
    /// Auto-volume controller settings.
    pub auto_volume: AutoVolumeConfig,
    /// Chromatic stereo settings.
    pub stereo: StereoConfig,
    /// Additive engine settings.
    pub luxstral: LuxStralConfig,
    /// Wavetable engine settings.
    pub luxwave: LuxWaveConfig,
    /// Reverb settings.
    pub reverb: ReverbConfig,
    /// MIDI input settings.
    pub midi: MidiConfig,
    /// Log filter (tracing `EnvFilter` syntax), e.g. `"info"`.
    pub log_level: Option<String>,
}

/// Audio output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sampling_frequency: u32,
    /// Block size in frames.
    pub buffer_size: u32,
    /// Output channels; the stereo pair lands in the first two.
    pub channels: u16,
    /// Output device name substring; `None` is the default device.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sampling_frequency: 48000,
            buffer_size: 128,
            channels: 2,
            device: None,
        }
    }
}

/// Scanner feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bind or multicast group address.
    pub udp_address: String,
    /// UDP port.
    pub udp_port: u16,
    /// Interface address for multicast membership.
    pub multicast_interface: Option<String>,
    /// IIR smoothing factor for raw IMU samples, (0, 1].
    pub imu_filter_alpha: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            udp_address: "0.0.0.0".to_string(),
            udp_port: 55151,
            multicast_interface: None,
            imu_filter_alpha: 0.2,
        }
    }
}

/// Sensor geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Sensor resolution; 200 or 400 DPI.
    pub sensor_dpi: u32,
    /// Contiguous pixels averaged into one note.
    pub pixels_per_note: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            sensor_dpi: 200,
            pixels_per_note: 2,
        }
    }
}

impl ScannerConfig {
    /// Pixels per line for the configured DPI.
    pub fn pixel_count(&self) -> usize {
        match self.sensor_dpi {
            400 => PIXELS_400DPI,
            _ => PIXELS_200DPI,
        }
    }

    /// Notes per line.
    pub fn note_count(&self) -> usize {
        self.pixel_count() / self.pixels_per_note.max(1)
    }
}

/// Auto-volume controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoVolumeConfig {
    /// Master switch.
    pub enabled: bool,
    /// Volume reached after the inactivity timeout.
    pub inactive_level: f32,
    /// Fade time constant in milliseconds.
    pub fade_ms: f32,
    /// Polling period in milliseconds.
    pub poll_ms: u64,
    /// Sensitivity divisor for the IMU threshold.
    pub imu_sensitivity: f32,
    /// Base IMU activity threshold.
    pub imu_base_threshold: f32,
    /// Seconds of inactivity before fading out.
    pub imu_inactivity_timeout_s: f32,
    /// Contrast-delta needed to validate activity on busy material.
    pub contrast_change_threshold: f32,
}

impl Default for AutoVolumeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inactive_level: 0.0,
            fade_ms: 300.0,
            poll_ms: 50,
            imu_sensitivity: 1.0,
            imu_base_threshold: 0.05,
            imu_inactivity_timeout_s: 30.0,
            contrast_change_threshold: 0.02,
        }
    }
}

/// Chromatic stereo settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    /// Enable chromatic panning.
    pub enabled: bool,
    /// Weight of the blue-minus-red temperature axis.
    pub blue_red_weight: f32,
    /// Weight of the cyan-minus-yellow temperature axis.
    pub cyan_yellow_weight: f32,
    /// Gain on the raw temperature.
    pub temperature_amplification: f32,
    /// Signed power-curve exponent.
    pub temperature_curve_exponent: f32,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blue_red_weight: 1.0,
            cyan_yellow_weight: 0.5,
            temperature_amplification: 2.0,
            temperature_curve_exponent: 0.7,
        }
    }
}

/// Additive engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuxStralConfig {
    /// Lowest oscillator fundamental in Hz.
    pub low_freq: f32,
    /// Highest oscillator fundamental in Hz.
    pub high_freq: f32,
    /// Volume-ramp attack time constant in ms.
    pub attack_ms: f32,
    /// Volume-ramp release time constant in ms.
    pub release_ms: f32,
    /// Worker threads; 0 means automatic.
    pub num_workers: usize,
    /// Enable gamma correction.
    pub gamma_enable: bool,
    /// Gamma exponent when enabled.
    pub gamma_value: f32,
    /// Relative mode (subtract the bank minimum).
    pub relative_mode: bool,
    /// Contrast floor below which relative mode stands down.
    pub contrast_min: f32,
    /// White-background inversion.
    pub invert_background: bool,
    /// Perceptual volume-weighting exponent.
    pub volume_weighting_exp: f32,
    /// Soft limiter threshold.
    pub soft_limit_threshold: f32,
    /// Soft limiter knee width.
    pub soft_limit_knee: f32,
}

impl Default for LuxStralConfig {
    fn default() -> Self {
        Self {
            low_freq: 65.41,
            high_freq: 12000.0,
            attack_ms: 10.0,
            release_ms: 50.0,
            num_workers: 0,
            gamma_enable: false,
            gamma_value: 1.8,
            relative_mode: false,
            contrast_min: 0.05,
            invert_background: false,
            volume_weighting_exp: 1.0,
            soft_limit_threshold: 0.8,
            soft_limit_knee: 0.2,
        }
    }
}

/// ADSR times for the wavetable engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsrConfig {
    /// Attack time in ms.
    pub attack_ms: f32,
    /// Decay time in ms.
    pub decay_ms: f32,
    /// Sustain level in [0, 1].
    pub sustain: f32,
    /// Release time in ms.
    pub release_ms: f32,
}

impl Default for AdsrConfig {
    fn default() -> Self {
        Self {
            attack_ms: 10.0,
            decay_ms: 100.0,
            sustain: 0.7,
            release_ms: 200.0,
        }
    }
}

/// Wavetable engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuxWaveConfig {
    /// Scan mode: `"left_to_right"`, `"right_to_left"` or `"dual"`.
    pub scan_mode: String,
    /// Interpolation: `"linear"` or `"cubic"`.
    pub interp_mode: String,
    /// Master amplitude in [0, 1].
    pub amplitude: f32,
    /// Volume envelope.
    pub volume_adsr: AdsrConfig,
    /// Filter envelope.
    pub filter_adsr: AdsrConfig,
    /// Vibrato rate in Hz.
    pub vibrato_rate: f32,
    /// Vibrato depth in semitones.
    pub vibrato_depth: f32,
    /// Base lowpass cutoff in Hz.
    pub filter_cutoff: f32,
    /// Filter-envelope depth in Hz.
    pub filter_env_depth: f32,
}

impl Default for LuxWaveConfig {
    fn default() -> Self {
        Self {
            scan_mode: "left_to_right".to_string(),
            interp_mode: "linear".to_string(),
            amplitude: 0.8,
            volume_adsr: AdsrConfig::default(),
            filter_adsr: AdsrConfig::default(),
            vibrato_rate: 5.0,
            vibrato_depth: 0.0,
            filter_cutoff: 8000.0,
            filter_env_depth: 0.0,
        }
    }
}

/// Reverb settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    /// Bypass switch.
    pub enabled: bool,
    /// Dry/wet mix in [0, 1].
    pub mix: f32,
    /// Room size in [0, 1].
    pub roomsize: f32,
    /// Damping in [0, 1].
    pub damping: f32,
    /// Stereo width in [0, 1].
    pub width: f32,
    /// Predelay as a fraction of 100 ms.
    pub predelay: f32,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mix: 0.3,
            roomsize: 0.5,
            damping: 0.5,
            width: 1.0,
            predelay: 0.1,
        }
    }
}

/// MIDI input settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Port name substring; `None` takes the first port.
    pub port: Option<String>,
}

fn check_range(
    param: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> std::result::Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            param,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl Config {
    /// Load and parse a TOML configuration file. Does not validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every range and enumeration constraint.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.scanner.sensor_dpi, 200 | 400) {
            return Err(ConfigError::NotInSet {
                param: "scanner.sensor_dpi",
                value: self.scanner.sensor_dpi,
                allowed: "{200, 400}",
            });
        }
        let pixels = self.scanner.pixel_count();
        if self.scanner.pixels_per_note == 0 || !pixels.is_multiple_of(self.scanner.pixels_per_note)
        {
            return Err(ConfigError::Inconsistent(format!(
                "scanner.pixels_per_note {} must divide the line length {}",
                self.scanner.pixels_per_note, pixels
            )));
        }

        check_range(
            "audio.sampling_frequency",
            self.audio.sampling_frequency as f64,
            8000.0,
            192000.0,
        )?;
        check_range(
            "audio.buffer_size",
            self.audio.buffer_size as f64,
            16.0,
            8192.0,
        )?;
        check_range("audio.channels", self.audio.channels as f64, 1.0, 32.0)?;

        check_range(
            "network.imu_filter_alpha",
            self.network.imu_filter_alpha as f64,
            1e-3,
            1.0,
        )?;

        let nyquist = self.audio.sampling_frequency as f64 / 2.0;
        check_range(
            "luxstral.low_freq",
            self.luxstral.low_freq as f64,
            1.0,
            nyquist,
        )?;
        check_range(
            "luxstral.high_freq",
            self.luxstral.high_freq as f64,
            self.luxstral.low_freq as f64,
            nyquist,
        )?;
        check_range(
            "luxstral.attack_ms",
            self.luxstral.attack_ms as f64,
            0.1,
            10000.0,
        )?;
        check_range(
            "luxstral.release_ms",
            self.luxstral.release_ms as f64,
            0.1,
            10000.0,
        )?;
        check_range(
            "luxstral.contrast_min",
            self.luxstral.contrast_min as f64,
            0.0,
            1.0,
        )?;
        check_range(
            "luxstral.volume_weighting_exp",
            self.luxstral.volume_weighting_exp as f64,
            0.1,
            4.0,
        )?;
        check_range(
            "luxstral.soft_limit_threshold",
            self.luxstral.soft_limit_threshold as f64,
            0.1,
            1.0,
        )?;
        check_range(
            "luxstral.soft_limit_knee",
            self.luxstral.soft_limit_knee as f64,
            0.01,
            1.0,
        )?;
        if self.luxstral.gamma_enable {
            check_range(
                "luxstral.gamma_value",
                self.luxstral.gamma_value as f64,
                0.1,
                8.0,
            )?;
        }

        if !matches!(
            self.luxwave.scan_mode.as_str(),
            "left_to_right" | "right_to_left" | "dual"
        ) {
            return Err(ConfigError::Inconsistent(format!(
                "luxwave.scan_mode '{}' must be left_to_right, right_to_left or dual",
                self.luxwave.scan_mode
            )));
        }
        if !matches!(self.luxwave.interp_mode.as_str(), "linear" | "cubic") {
            return Err(ConfigError::Inconsistent(format!(
                "luxwave.interp_mode '{}' must be linear or cubic",
                self.luxwave.interp_mode
            )));
        }
        check_range("luxwave.amplitude", self.luxwave.amplitude as f64, 0.0, 1.0)?;
        check_range(
            "luxwave.filter_cutoff",
            self.luxwave.filter_cutoff as f64,
            20.0,
            nyquist,
        )?;
        for adsr in [&self.luxwave.volume_adsr, &self.luxwave.filter_adsr] {
            check_range("luxwave.adsr.attack_ms", adsr.attack_ms as f64, 0.1, 30000.0)?;
            check_range("luxwave.adsr.decay_ms", adsr.decay_ms as f64, 0.1, 30000.0)?;
            check_range("luxwave.adsr.sustain", adsr.sustain as f64, 0.0, 1.0)?;
            check_range(
                "luxwave.adsr.release_ms",
                adsr.release_ms as f64,
                0.1,
                30000.0,
            )?;
        }

        for (param, value) in [
            ("reverb.mix", self.reverb.mix),
            ("reverb.roomsize", self.reverb.roomsize),
            ("reverb.damping", self.reverb.damping),
            ("reverb.width", self.reverb.width),
            ("reverb.predelay", self.reverb.predelay),
        ] {
            check_range(param, value as f64, 0.0, 1.0)?;
        }

        check_range(
            "auto_volume.inactive_level",
            self.auto_volume.inactive_level as f64,
            0.0,
            1.0,
        )?;
        check_range(
            "auto_volume.fade_ms",
            self.auto_volume.fade_ms as f64,
            1.0,
            60000.0,
        )?;
        check_range(
            "auto_volume.poll_ms",
            self.auto_volume.poll_ms as f64,
            1.0,
            1000.0,
        )?;
        check_range(
            "auto_volume.imu_sensitivity",
            self.auto_volume.imu_sensitivity as f64,
            1e-3,
            1000.0,
        )?;
        check_range(
            "auto_volume.imu_inactivity_timeout_s",
            self.auto_volume.imu_inactivity_timeout_s as f64,
            0.1,
            3600.0,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("defaults must validate");
        assert_eq!(config.scanner.pixel_count(), PIXELS_200DPI);
        assert_eq!(config.scanner.note_count(), 864);
    }

    #[test]
    fn dpi_400_doubles_the_line() {
        let config = Config {
            scanner: ScannerConfig {
                sensor_dpi: 400,
                pixels_per_note: 4,
            },
            ..Config::default()
        };
        config.validate().unwrap();
        assert_eq!(config.scanner.pixel_count(), PIXELS_400DPI);
        assert_eq!(config.scanner.note_count(), 864);
    }

    #[test]
    fn rejects_unknown_dpi() {
        let config = Config {
            scanner: ScannerConfig {
                sensor_dpi: 300,
                pixels_per_note: 2,
            },
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotInSet { param: "scanner.sensor_dpi", .. })
        ));
    }

    #[test]
    fn rejects_non_dividing_pixels_per_note() {
        let config = Config {
            scanner: ScannerConfig {
                sensor_dpi: 200,
                pixels_per_note: 5, // 1728 % 5 != 0
            },
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Inconsistent(_))
        ));
    }

    #[test]
    fn rejects_inverted_frequency_range() {
        let mut config = Config::default();
        config.luxstral.low_freq = 8000.0;
        config.luxstral.high_freq = 100.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { param: "luxstral.high_freq", .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_reverb() {
        let mut config = Config::default();
        config.reverb.roomsize = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { param: "reverb.roomsize", .. })
        ));
    }

    #[test]
    fn rejects_bad_scan_mode() {
        let mut config = Config::default();
        config.luxwave.scan_mode = "sideways".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Inconsistent(_))
        ));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = Config::default();
        config.audio.buffer_size = 256;
        config.reverb.mix = 0.42;
        config.luxwave.scan_mode = "dual".to_string();

        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn loads_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[audio]
buffer_size = 512

[reverb]
mix = 0.9
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.audio.buffer_size, 512);
        assert_eq!(config.reverb.mix, 0.9);
        // Everything else keeps its default.
        assert_eq!(config.audio.sampling_frequency, 48000);
        assert_eq!(config.scanner.sensor_dpi, 200);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let error = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(error, ConfigError::ReadFile { .. }));
    }
}
