use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AcquisitionError;
use crate::reconcile::TrailingSample;
use crate::serial::AcquisitionParams;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub device: DeviceConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "epg-acquire".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// A port whose manufacturer equals one of these, ignoring ASCII case, is
    /// taken as the device
    pub manufacturers: Vec<String>,
    pub baud_rate: u32,
    pub sample_rate: u32,
    pub params: AcquisitionParams,
    /// Per handshake step
    pub handshake_timeout_secs: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            manufacturers: vec!["Teensyduino".to_string(), "Microsoft".to_string()],
            baud_rate: 9600,
            sample_rate: 100,
            params: AcquisitionParams::default(),
            handshake_timeout_secs: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    /// Base name for logs of sessions that do not name their own
    pub file_name: String,
    /// Drop the last sample of every processed series
    pub drop_final_sample: bool,
    /// Announce the processed series for review once a session stops
    pub review_processed: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            file_name: "epgOutput.csv".to_string(),
            drop_final_sample: false,
            review_processed: true,
        }
    }
}

impl RecordingConfig {
    /// Event log path for a new session.
    ///
    /// `file_name` must be a bare file name; `.csv` is added when it has no
    /// extension. Without one, the configured base name gets a timestamp, e.g.
    /// `epgOutput_20240301_142501.csv`.
    pub fn log_path(
        &self,
        file_name: Option<&str>,
        now: DateTime<Local>,
    ) -> std::result::Result<PathBuf, AcquisitionError> {
        let name = match file_name.map(str::trim) {
            Some(name) => validate_file_name(name)?,
            None => {
                let stem = Path::new(&self.file_name)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or("epgOutput");
                format!("{}_{}.csv", stem, now.format("%Y%m%d_%H%M%S"))
            }
        };
        Ok(self.output_dir.join(name))
    }

    pub fn trailing_sample(&self) -> TrailingSample {
        if self.drop_final_sample {
            TrailingSample::Drop
        } else {
            TrailingSample::Keep
        }
    }
}

impl Config {
    /// Loads defaults, then `path` if it exists, then `EPG__*` environment
    /// overrides (e.g. `EPG__DEVICE__BAUD_RATE=115200`).
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("EPG").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }

    /// Settings for a new session with a fresh id, logging to `file_name`
    /// under the output directory.
    pub fn session_config(
        &self,
        file_name: Option<&str>,
    ) -> std::result::Result<SessionConfig, AcquisitionError> {
        Ok(SessionConfig {
            log_path: self.recording.log_path(file_name, Local::now())?,
            sample_rate: self.device.sample_rate,
            params: self.device.params,
            handshake_timeout_secs: self.device.handshake_timeout_secs,
            trailing_sample: self.recording.trailing_sample(),
            ..SessionConfig::default()
        })
    }
}

fn validate_file_name(name: &str) -> std::result::Result<String, AcquisitionError> {
    let invalid = |reason| AcquisitionError::InvalidFileName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    let path = Path::new(name);
    if path.file_name().and_then(|n| n.to_str()) != Some(name) {
        return Err(invalid("must not contain a directory"));
    }
    match path.extension() {
        Some(_) => Ok(name.to_string()),
        None => Ok(format!("{}.csv", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load("does/not/exist/epg-acquire").unwrap();

        assert_eq!(cfg.device.manufacturers, vec!["Teensyduino", "Microsoft"]);
        assert_eq!(cfg.device.baud_rate, 9600);
        assert_eq!(cfg.device.params.to_string(), "PARAM,1,100000,0,1,1000,0");
        assert_eq!(cfg.http_addr(), "127.0.0.1:8765");
        assert_eq!(cfg.device.handshake_timeout_secs, 10.0);
    }

    #[test]
    fn test_log_path_is_unique_per_session() {
        let recording = RecordingConfig::default();
        let now = Local.with_ymd_and_hms(2024, 3, 1, 14, 25, 1).unwrap();
        let later = Local.with_ymd_and_hms(2024, 3, 1, 14, 40, 0).unwrap();

        assert_eq!(
            recording.log_path(None, now).unwrap(),
            PathBuf::from("recordings/epgOutput_20240301_142501.csv")
        );
        assert_ne!(
            recording.log_path(None, now).unwrap(),
            recording.log_path(None, later).unwrap()
        );
    }

    #[test]
    fn test_log_path_with_operator_file_name() {
        let recording = RecordingConfig::default();
        let now = Local::now();

        assert_eq!(
            recording.log_path(Some("plant3"), now).unwrap(),
            PathBuf::from("recordings/plant3.csv")
        );
        assert_eq!(
            recording.log_path(Some(" trial.csv "), now).unwrap(),
            PathBuf::from("recordings/trial.csv")
        );
        for bad in ["", "../trial.csv", "a/b.csv", ".."] {
            assert!(
                matches!(
                    recording.log_path(Some(bad), now),
                    Err(AcquisitionError::InvalidFileName { .. })
                ),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("epg-acquire.toml");
        fs::write(
            &path,
            r#"
[device]
sample_rate = 250

[device.params]
gain = 3

[recording]
output_dir = "/data/epg"
drop_final_sample = true
"#,
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        let session = cfg.session_config(Some("trial.csv")).unwrap();

        assert_eq!(session.sample_rate, 250);
        assert_eq!(session.params.gain, 3.0);
        assert_eq!(session.params.input_resistance, 100000);
        assert_eq!(session.trailing_sample, TrailingSample::Drop);
        assert_eq!(session.log_path, PathBuf::from("/data/epg/trial.csv"));
        assert_eq!(cfg.device.baud_rate, 9600);
    }
}
