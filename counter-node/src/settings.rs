//! Runtime settings: the flat key/value surface edited from the dashboard and
//! persisted as a JSON map of strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use trafficount_common::{utils::validate_url, Region};
use validator::Validate;

use crate::error::{CounterError, Result, ValidationError};

pub mod keys {
    pub const DATABASE_URL: &str = "database_url";
    pub const DATABASE_KEY: &str = "database_key";
    pub const DATABASE_BUFFER_SIZE: &str = "database_buffer_size";
    pub const DATABASE_INSERT_DELAY: &str = "database_insert_delay";
    pub const DATABASE_ERROR_DELAY: &str = "database_error_delay";
    pub const DATABASE_DEVICE_NAME: &str = "database_device_name";
    pub const DATABASE_LOCATION_NAME: &str = "database_location_name";
    pub const DATABASE_RESOLUTION_WIDTH: &str = "database_resolution_width";
    pub const DATABASE_RESOLUTION_HEIGHT: &str = "database_resolution_height";

    pub const COUNTING_CONFIDENCE: &str = "counting_confidence";
    pub const COUNTING_DELAY: &str = "counting_delay";
    pub const COUNTING_AGGREGATED_FRAMES_NUMBER: &str = "counting_aggregated_frames_number";
    pub const COUNTING_LINE_P1_X: &str = "counting_line_first_point_x";
    pub const COUNTING_LINE_P1_Y: &str = "counting_line_first_point_y";
    pub const COUNTING_LINE_P2_X: &str = "counting_line_second_point_x";
    pub const COUNTING_LINE_P2_Y: &str = "counting_line_second_point_y";

    pub const ACTIVATE_COUNTING: &str = "activate_counting";
    pub const ACTIVATE_IMAGE_ANNOTATION: &str = "activate_image_annotation";
    pub const ACTIVATE_DATABASE_INSERTION: &str = "activate_database_insertion";
    pub const ACTIVATE_VIDEO_RECORDING: &str = "activate_video_recording";
}

fn validate_database_url(url: &str) -> std::result::Result<(), validator::ValidationError> {
    if url.is_empty() {
        return Ok(());
    }
    validate_url(url).map_err(|_| validator::ValidationError::new("url"))
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CountingSettings {
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: f32,
    /// Target seconds between two frames.
    #[validate(range(min = 0.0, max = 3600.0))]
    pub delay_sec: f64,
    #[validate(range(min = 1))]
    pub aggregated_frames_number: u32,
    #[validate]
    pub region: Region,
}

impl CountingSettings {
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_sec).unwrap_or(Duration::ZERO)
    }
}

impl Default for CountingSettings {
    fn default() -> Self {
        Self {
            confidence: 0.2,
            delay_sec: 1.0,
            aggregated_frames_number: 1,
            region: Region::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct DatabaseSettings {
    /// PostgREST endpoint; empty means persistence is not configured.
    #[validate(custom = "validate_database_url")]
    pub url: String,
    pub key: String,
    #[validate(range(min = 1, max = 1000000))]
    pub buffer_size: u32,
    #[validate(range(min = 1))]
    pub insert_delay_sec: u32,
    #[validate(range(min = 1))]
    pub error_delay_sec: u32,
    pub device_name: String,
    pub location_name: String,
    #[validate(range(min = 1))]
    pub resolution_width: u32,
    #[validate(range(min = 1))]
    pub resolution_height: u32,
}

impl DatabaseSettings {
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.key.is_empty()
    }

    pub fn insert_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.insert_delay_sec))
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.error_delay_sec))
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            key: String::new(),
            buffer_size: 3600,
            insert_delay_sec: 60,
            error_delay_sec: 60,
            device_name: String::new(),
            location_name: String::new(),
            resolution_width: 640,
            resolution_height: 480,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Toggles {
    pub counting: bool,
    pub image_annotation: bool,
    pub database_insertion: bool,
    pub video_recording: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            counting: false,
            image_annotation: false,
            database_insertion: true,
            video_recording: false,
        }
    }
}

/// A toggle addressable from `POST /toggle/{name}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Counting,
    Annotation,
    Insertion,
    Recording,
}

impl std::str::FromStr for Toggle {
    type Err = ValidationError;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "counting" => Ok(Toggle::Counting),
            "annotation" => Ok(Toggle::Annotation),
            "insertion" => Ok(Toggle::Insertion),
            "recording" => Ok(Toggle::Recording),
            _ => Err(ValidationError::new(name, "unknown toggle")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub counting: CountingSettings,
    pub database: DatabaseSettings,
    pub toggles: Toggles,
}

fn parse<T: std::str::FromStr>(key: &str, value: &str, expected: &str) -> std::result::Result<T, ValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ValidationError::new(key, format!("`{}` is not {}", value, expected)))
}

fn parse_finite(key: &str, value: &str) -> std::result::Result<f64, ValidationError> {
    let number: f64 = parse(key, value, "a number")?;
    if !number.is_finite() {
        return Err(ValidationError::new(key, format!("`{}` is not a finite number", value)));
    }
    Ok(number)
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, ValidationError> {
    match value.trim() {
        "True" | "true" => Ok(true),
        "False" | "false" => Ok(false),
        _ => Err(ValidationError::new(key, format!("`{}` is not True or False", value))),
    }
}

fn check(key: &str, result: std::result::Result<(), validator::ValidationErrors>) -> std::result::Result<(), ValidationError> {
    result.map_err(|errors| {
        let fields: Vec<_> = errors.errors().keys().copied().collect();
        ValidationError::new(key, format!("out of range ({})", fields.join(", ")))
    })
}

impl Settings {
    pub fn toggle(&mut self, toggle: Toggle) -> bool {
        let flag = match toggle {
            Toggle::Counting => &mut self.toggles.counting,
            Toggle::Annotation => &mut self.toggles.image_annotation,
            Toggle::Insertion => &mut self.toggles.database_insertion,
            Toggle::Recording => &mut self.toggles.video_recording,
        };
        *flag = !*flag;
        *flag
    }

    /// Flat map of every persisted key. Video recording is never persisted.
    pub fn generate(&self) -> BTreeMap<String, String> {
        let counting = &self.counting;
        let database = &self.database;
        let capitalize = |flag: bool| if flag { "True" } else { "False" }.to_string();

        [
            (keys::DATABASE_URL, database.url.clone()),
            (keys::DATABASE_KEY, database.key.clone()),
            (keys::DATABASE_BUFFER_SIZE, database.buffer_size.to_string()),
            (keys::DATABASE_INSERT_DELAY, database.insert_delay_sec.to_string()),
            (keys::DATABASE_ERROR_DELAY, database.error_delay_sec.to_string()),
            (keys::DATABASE_DEVICE_NAME, database.device_name.clone()),
            (keys::DATABASE_LOCATION_NAME, database.location_name.clone()),
            (keys::DATABASE_RESOLUTION_WIDTH, database.resolution_width.to_string()),
            (keys::DATABASE_RESOLUTION_HEIGHT, database.resolution_height.to_string()),
            (keys::COUNTING_CONFIDENCE, counting.confidence.to_string()),
            (keys::COUNTING_DELAY, counting.delay_sec.to_string()),
            (keys::COUNTING_AGGREGATED_FRAMES_NUMBER, counting.aggregated_frames_number.to_string()),
            (keys::COUNTING_LINE_P1_X, counting.region.p1.x.to_string()),
            (keys::COUNTING_LINE_P1_Y, counting.region.p1.y.to_string()),
            (keys::COUNTING_LINE_P2_X, counting.region.p2.x.to_string()),
            (keys::COUNTING_LINE_P2_Y, counting.region.p2.y.to_string()),
            (keys::ACTIVATE_COUNTING, capitalize(self.toggles.counting)),
            (keys::ACTIVATE_IMAGE_ANNOTATION, capitalize(self.toggles.image_annotation)),
            (keys::ACTIVATE_DATABASE_INSERTION, capitalize(self.toggles.database_insertion)),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }

    /// Applies every key of `values` independently. A refused key leaves its
    /// previous value in place and does not stop the others from applying.
    pub fn apply(&mut self, values: &BTreeMap<String, String>) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (key, value) in values {
            if value.trim().is_empty() {
                continue;
            }
            match self.apply_one(key, value) {
                Ok(()) => info!("Set {}", key),
                Err(error) => {
                    warn!("Refused setting {}", error);
                    errors.push(error);
                }
            }
        }

        errors
    }

    fn apply_one(&mut self, key: &str, value: &str) -> std::result::Result<(), ValidationError> {
        let mut counting = self.counting.clone();
        let mut database = self.database.clone();

        match key {
            keys::DATABASE_URL => database.url = value.trim().to_string(),
            keys::DATABASE_KEY => database.key = value.trim().to_string(),
            keys::DATABASE_BUFFER_SIZE => database.buffer_size = parse(key, value, "a positive integer")?,
            keys::DATABASE_INSERT_DELAY => database.insert_delay_sec = parse(key, value, "a positive integer")?,
            keys::DATABASE_ERROR_DELAY => database.error_delay_sec = parse(key, value, "a positive integer")?,
            keys::DATABASE_DEVICE_NAME => database.device_name = value.trim().to_string(),
            keys::DATABASE_LOCATION_NAME => database.location_name = value.trim().to_string(),
            keys::DATABASE_RESOLUTION_WIDTH => database.resolution_width = parse(key, value, "a positive integer")?,
            keys::DATABASE_RESOLUTION_HEIGHT => database.resolution_height = parse(key, value, "a positive integer")?,

            keys::COUNTING_CONFIDENCE => counting.confidence = parse_finite(key, value)? as f32,
            keys::COUNTING_DELAY => counting.delay_sec = parse_finite(key, value)?,
            keys::COUNTING_AGGREGATED_FRAMES_NUMBER => {
                counting.aggregated_frames_number = parse(key, value, "a positive integer")?
            }
            keys::COUNTING_LINE_P1_X => counting.region.p1.x = parse(key, value, "an integer")?,
            keys::COUNTING_LINE_P1_Y => counting.region.p1.y = parse(key, value, "an integer")?,
            keys::COUNTING_LINE_P2_X => counting.region.p2.x = parse(key, value, "an integer")?,
            keys::COUNTING_LINE_P2_Y => counting.region.p2.y = parse(key, value, "an integer")?,

            keys::ACTIVATE_COUNTING => {
                self.toggles.counting = parse_bool(key, value)?;
                return Ok(());
            }
            keys::ACTIVATE_IMAGE_ANNOTATION => {
                self.toggles.image_annotation = parse_bool(key, value)?;
                return Ok(());
            }
            keys::ACTIVATE_DATABASE_INSERTION => {
                self.toggles.database_insertion = parse_bool(key, value)?;
                return Ok(());
            }
            keys::ACTIVATE_VIDEO_RECORDING => {
                self.toggles.video_recording = parse_bool(key, value)?;
                return Ok(());
            }

            _ => return Err(ValidationError::new(key, "unknown setting")),
        }

        check(key, counting.validate())?;
        check(key, database.validate())?;
        self.counting = counting;
        self.database = database;
        Ok(())
    }
}

pub async fn save_to_file(path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(values)?;
    tokio::fs::write(path, json).await?;
    info!("Settings written to {}", path.display());
    Ok(())
}

pub async fn load_from_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let json = tokio::fs::read_to_string(path).await?;
    let values: BTreeMap<String, String> = serde_json::from_str(&json)
        .map_err(|e| CounterError::Config(format!("{} is not a flat JSON map of strings: {}", path.display(), e)))?;
    info!("Settings read from {}", path.display());
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficount_common::Point;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn valid_values_are_applied() {
        let mut settings = Settings::default();

        let errors = settings.apply(&values(&[
            (keys::COUNTING_CONFIDENCE, "0.5"),
            (keys::COUNTING_DELAY, "0.25"),
            (keys::COUNTING_AGGREGATED_FRAMES_NUMBER, "10"),
            (keys::COUNTING_LINE_P1_X, "0"),
            (keys::COUNTING_LINE_P1_Y, "240"),
            (keys::ACTIVATE_COUNTING, "True"),
            (keys::DATABASE_URL, "https://db.example.org"),
        ]));

        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(settings.counting.confidence, 0.5);
        assert_eq!(settings.counting.delay(), Duration::from_millis(250));
        assert_eq!(settings.counting.aggregated_frames_number, 10);
        assert_eq!(settings.counting.region.p1, Point::new(0, 240));
        assert!(settings.toggles.counting);
        assert_eq!(settings.database.url, "https://db.example.org");
    }

    #[test]
    fn refused_values_keep_previous_and_others_still_apply() {
        let mut settings = Settings::default();

        let errors = settings.apply(&values(&[
            (keys::COUNTING_CONFIDENCE, "1.5"),
            (keys::COUNTING_DELAY, "-1"),
            (keys::COUNTING_AGGREGATED_FRAMES_NUMBER, "0"),
            (keys::COUNTING_LINE_P2_X, "-4"),
            (keys::ACTIVATE_IMAGE_ANNOTATION, "yes"),
            (keys::DATABASE_BUFFER_SIZE, "abc"),
            (keys::DATABASE_DEVICE_NAME, "entrance"),
        ]));

        let refused: Vec<_> = errors.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(refused.len(), 6);
        assert!(refused.contains(&keys::COUNTING_CONFIDENCE));
        assert!(refused.contains(&keys::COUNTING_LINE_P2_X));
        assert_eq!(settings.counting, CountingSettings::default());
        assert!(!settings.toggles.image_annotation);
        assert_eq!(settings.database.buffer_size, 3600);
        assert_eq!(settings.database.device_name, "entrance");
    }

    #[test]
    fn empty_values_are_ignored_and_unknown_keys_refused() {
        let mut settings = Settings::default();

        let errors = settings.apply(&values(&[(keys::COUNTING_CONFIDENCE, ""), ("colour", "blue")]));

        assert_eq!(errors, vec![ValidationError::new("colour", "unknown setting")]);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn non_finite_numbers_are_refused() {
        let mut settings = Settings::default();
        let errors = settings.apply(&values(&[(keys::COUNTING_DELAY, "NaN")]));
        assert_eq!(errors.len(), 1);
        assert_eq!(settings.counting.delay_sec, 1.0);
    }

    #[test]
    fn invalid_database_url_is_refused() {
        let mut settings = Settings::default();
        let errors = settings.apply(&values(&[(keys::DATABASE_URL, "ftp://db")]));
        assert_eq!(errors.len(), 1);
        assert!(settings.database.url.is_empty());
    }

    #[test]
    fn generated_map_applies_back_to_the_same_settings() {
        let mut saved = Settings::default();
        saved.toggles.counting = true;
        saved.counting.region = Region::new(Point::new(0, 100), Point::new(640, 100));
        saved.database.location_name = "hall".to_string();

        let mut restored = Settings::default();
        let errors = restored.apply(&saved.generate());

        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(restored, saved);
    }

    #[test]
    fn recording_is_not_persisted() {
        let mut settings = Settings::default();
        settings.toggle(Toggle::Recording);
        assert!(!settings.generate().contains_key(keys::ACTIVATE_VIDEO_RECORDING));
    }

    #[test]
    fn toggles_parse_from_route_names() {
        assert_eq!("insertion".parse::<Toggle>().unwrap(), Toggle::Insertion);
        assert!("lights".parse::<Toggle>().is_err());

        let mut settings = Settings::default();
        assert!(settings.toggle(Toggle::Counting));
        assert!(!settings.toggle(Toggle::Counting));
    }

    #[tokio::test]
    async fn settings_file_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("trafficount-settings-{}", std::process::id()))
            .join("trafficount.json");
        let written = Settings::default().generate();

        save_to_file(&path, &written).await.unwrap();
        let read = load_from_file(&path).await.unwrap();

        assert_eq!(read, written);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn malformed_settings_file_is_a_config_error() {
        let path = std::env::temp_dir().join(format!("trafficount-bad-{}.json", std::process::id()));
        tokio::fs::write(&path, "[1, 2]").await.unwrap();

        assert!(matches!(load_from_file(&path).await, Err(CounterError::Config(_))));
        let _ = std::fs::remove_file(&path);
    }
}
