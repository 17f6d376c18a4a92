use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use trafficount_simulator::SceneConfig;

/// Start-up configuration of the node. Runtime-tunable values live in
/// [`crate::settings`] instead.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub lifecycle: LifecycleConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic pedestrians, no hardware needed.
    Simulated,
    /// Snapshot camera and remote tracking server over HTTP.
    Http,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub camera_url: String,
    pub tracker_url: String,
    /// Class index of "person" in the tracker's model.
    pub person_class: u32,
    pub request_timeout_ms: u64,
    pub jpeg_quality: u8,
    pub scene: SceneConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LifecycleConfig {
    pub model_retry_sec: u64,
    pub camera_retry_sec: u64,
    pub camera_lost_backoff_sec: u64,
    pub track_capacity: usize,
    pub trajectory_capacity: usize,
}

impl LifecycleConfig {
    pub fn model_retry(&self) -> Duration {
        Duration::from_secs(self.model_retry_sec)
    }

    pub fn camera_retry(&self) -> Duration {
        Duration::from_secs(self.camera_retry_sec)
    }

    pub fn camera_lost_backoff(&self) -> Duration {
        Duration::from_secs(self.camera_lost_backoff_sec)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Poll interval while no URL/key has been configured.
    pub unconfigured_poll_sec: u64,
    pub request_timeout_ms: u64,
    /// Path of the REST API under the database URL (`/rest/v1` on Supabase).
    pub rest_path: String,
    pub schema: SchemaConfig,
}

/// Table and column names of the remote PostgREST schema.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SchemaConfig {
    pub detection_table: String,
    pub detection_time_column: String,
    pub detection_people_column: String,
    pub detection_in_column: String,
    pub detection_out_column: String,

    pub device_table: String,
    pub device_id_column: String,
    pub device_name_column: String,

    pub location_table: String,
    pub location_id_column: String,
    pub location_name_column: String,

    pub resolution_table: String,
    pub resolution_id_column: String,
    pub resolution_width_column: String,
    pub resolution_height_column: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub settings_path: PathBuf,
    pub recordings_dir: PathBuf,
    /// TrueType font for the totals overlay on annotated frames.
    pub font_path: PathBuf,
}

impl DatabaseConfig {
    pub fn unconfigured_poll(&self) -> Duration {
        Duration::from_secs(self.unconfigured_poll_sec)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulated,
            camera_url: "http://127.0.0.1:8554/snapshot.jpg".to_string(),
            tracker_url: "http://127.0.0.1:9000".to_string(),
            person_class: 0,
            request_timeout_ms: 5000,
            jpeg_quality: 80,
            scene: SceneConfig::default(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            model_retry_sec: 10,
            camera_retry_sec: 60,
            camera_lost_backoff_sec: 10,
            track_capacity: 500,
            trajectory_capacity: 50,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            unconfigured_poll_sec: 10,
            request_timeout_ms: 10_000,
            rest_path: "/rest/v1".to_string(),
            schema: SchemaConfig::default(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            detection_table: "detections".to_string(),
            detection_time_column: "timestamp".to_string(),
            detection_people_column: "nombre_personnes".to_string(),
            detection_in_column: "nombre_entrees".to_string(),
            detection_out_column: "nombre_sorties".to_string(),

            device_table: "appareils".to_string(),
            device_id_column: "id_appareil".to_string(),
            device_name_column: "nom_appareil".to_string(),

            location_table: "lieux".to_string(),
            location_id_column: "id_lieu".to_string(),
            location_name_column: "nom_lieu".to_string(),

            resolution_table: "resolutions".to_string(),
            resolution_id_column: "id_resolution".to_string(),
            resolution_width_column: "largeur".to_string(),
            resolution_height_column: "hauteur".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            settings_path: PathBuf::from("configuration/trafficount.json"),
            recordings_dir: PathBuf::from("recordings"),
            font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
        }
    }
}
