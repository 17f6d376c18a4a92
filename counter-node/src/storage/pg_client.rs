use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use trafficount_common::{utils::format_duration, ComponentStatus, DetectionRecord};

use super::tables::{ForeignKeyCache, ForeignKeys};
use super::DetectionSink;
use crate::config::{DatabaseConfig, SchemaConfig};
use crate::counting::FrameCounts;
use crate::error::{CounterError, Result};
use crate::state::CounterState;

/// Thin PostgREST client: one endpoint, one API key.
pub struct PostgrestClient {
    http: reqwest::Client,
    endpoint: String,
    key: String,
}

impl PostgrestClient {
    pub fn new(http: reqwest::Client, url: &str, rest_path: &str, key: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}{}", url.trim_end_matches('/'), rest_path),
            key: key.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.endpoint, table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    pub async fn select(&self, table: &str, column: &str, filters: &[(String, String)]) -> Result<Vec<Value>> {
        let response = self
            .request(reqwest::Method::GET, table)
            .query(&[("select", column), ("limit", "1")])
            .query(filters)
            .send()
            .await
            .map_err(|e| CounterError::Persistence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CounterError::Persistence(format!("select on {} answered {}", table, status)));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| CounterError::Persistence(e.to_string()))
    }

    pub async fn insert(&self, table: &str, rows: &[Value]) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(|e| CounterError::Persistence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CounterError::Persistence(format!(
                "insert into {} answered {}: {}",
                table, status, body
            )));
        }
        Ok(())
    }
}

/// Buffered records, each tagged with an increasing sequence number so a flush
/// removes exactly the rows it sent.
#[derive(Debug, Default)]
struct RecordBuffer {
    rows: VecDeque<(u64, DetectionRecord)>,
    next_seq: u64,
}

impl RecordBuffer {
    fn push(&mut self, record: DetectionRecord, capacity: usize) -> usize {
        let mut dropped = 0;
        while self.rows.len() >= capacity.max(1) {
            self.rows.pop_front();
            dropped += 1;
        }
        self.rows.push_back((self.next_seq, record));
        self.next_seq += 1;
        dropped
    }

    fn remove_through(&mut self, last_sent: u64) {
        self.rows.retain(|(seq, _)| *seq > last_sent);
    }
}

fn detection_row(schema: &SchemaConfig, keys: &ForeignKeys, record: &DetectionRecord) -> Value {
    let mut row = Map::new();
    row.insert(schema.device_id_column.clone(), keys.device.into());
    row.insert(schema.location_id_column.clone(), keys.location.into());
    row.insert(schema.resolution_id_column.clone(), keys.resolution.into());
    row.insert(schema.detection_time_column.clone(), record.timestamp.to_rfc3339().into());
    row.insert(schema.detection_people_column.clone(), record.people_image_count.into());
    row.insert(schema.detection_in_column.clone(), record.in_count.into());
    row.insert(schema.detection_out_column.clone(), record.out_count.into());
    Value::Object(row)
}

/// Buffers detection records and flushes them periodically to the remote
/// database.
pub struct PgClient {
    state: Arc<CounterState>,
    config: DatabaseConfig,
    http: reqwest::Client,
    buffer: Mutex<RecordBuffer>,
    keys: Mutex<ForeignKeyCache>,
}

impl PgClient {
    pub fn new(state: Arc<CounterState>, config: DatabaseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CounterError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            state,
            config,
            http,
            buffer: Mutex::new(RecordBuffer::default()),
            keys: Mutex::new(ForeignKeyCache::default()),
        })
    }

    pub async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.rows.len()
    }

    pub async fn buffered(&self) -> Vec<DetectionRecord> {
        self.buffer.lock().await.rows.iter().map(|(_, record)| *record).collect()
    }

    pub async fn push_record(&self, record: DetectionRecord) {
        let capacity = self.state.settings.read().await.database.buffer_size as usize;
        let mut buffer = self.buffer.lock().await;
        let dropped = buffer.push(record, capacity);
        if dropped > 0 {
            warn!("Detection buffer full, dropped {} oldest records", dropped);
        }
        self.state.metrics.set_buffered_records(buffer.rows.len());
    }

    /// Sends every buffered record. Returns how many were sent; on failure the
    /// buffer is left as it was.
    pub async fn flush(&self) -> Result<usize> {
        let settings = self.state.settings().await.database;
        if !settings.is_configured() {
            return Err(CounterError::Persistence("database URL or key not set".to_string()));
        }

        let pending: Vec<(u64, DetectionRecord)> = self.buffer.lock().await.rows.iter().copied().collect();
        let Some(&(last_sent, _)) = pending.last() else {
            debug!("Nothing to flush");
            return Ok(0);
        };

        let client = PostgrestClient::new(self.http.clone(), &settings.url, &self.config.rest_path, &settings.key);
        let keys = self
            .keys
            .lock()
            .await
            .resolve(&client, &self.config.schema, &settings)
            .await
            .map_err(|e| CounterError::Persistence(e.to_string()))?;

        let rows: Vec<Value> = pending
            .iter()
            .map(|(_, record)| detection_row(&self.config.schema, &keys, record))
            .collect();
        client.insert(&self.config.schema.detection_table, &rows).await?;

        let mut buffer = self.buffer.lock().await;
        buffer.remove_through(last_sent);
        self.state.metrics.set_buffered_records(buffer.rows.len());
        Ok(rows.len())
    }

    /// Flush loop. Polls until the database is configured, then flushes every
    /// insert delay and backs off by the error delay after a failure.
    pub async fn run(self: Arc<Self>) {
        info!("Database flush loop started");
        loop {
            let settings = self.state.settings().await.database;
            if !settings.is_configured() {
                self.state.set_database_status(ComponentStatus::Down).await;
                tokio::time::sleep(self.config.unconfigured_poll()).await;
                continue;
            }

            tokio::time::sleep(settings.insert_delay()).await;

            match self.flush().await {
                Ok(0) => {}
                Ok(sent) => {
                    info!("Inserted {} detections into {}", sent, self.config.schema.detection_table);
                    self.state.metrics.record_flush(true);
                    self.state.set_database_status(ComponentStatus::Up).await;
                }
                Err(e) => {
                    let backoff: Duration = self.state.settings().await.database.error_delay();
                    error!("Failed to insert the buffer, retrying in {}: {}", format_duration(backoff), e);
                    self.state.metrics.record_flush(false);
                    self.state.set_database_status(ComponentStatus::Down).await;
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl DetectionSink for PgClient {
    async fn insert_detection(&self, counts: FrameCounts) {
        if !self.state.settings.read().await.toggles.database_insertion {
            return;
        }
        self.push_record(DetectionRecord::now(counts.people_image_count, counts.in_count, counts.out_count))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::settings::Settings;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeDatabase {
        inserted: StdMutex<Vec<Value>>,
        lookups: StdMutex<usize>,
        failing: StdMutex<bool>,
    }

    async fn select(
        db: web::Data<FakeDatabase>,
        table: web::Path<String>,
        query: web::Query<HashMap<String, String>>,
    ) -> HttpResponse {
        *db.lookups.lock().unwrap() += 1;
        let body = match table.as_str() {
            "appareils" if query.get("nom_appareil").map(String::as_str) == Some("like.entrance") => {
                serde_json::json!([{ "id_appareil": 3 }])
            }
            "lieux" => serde_json::json!([{ "id_lieu": 5 }]),
            "resolutions" => serde_json::json!([{ "id_resolution": 7 }]),
            _ => serde_json::json!([]),
        };
        HttpResponse::Ok().json(body)
    }

    async fn insert(db: web::Data<FakeDatabase>, rows: web::Json<Vec<Value>>) -> HttpResponse {
        if *db.failing.lock().unwrap() {
            return HttpResponse::ServiceUnavailable().finish();
        }
        db.inserted.lock().unwrap().extend(rows.into_inner());
        HttpResponse::Created().finish()
    }

    async fn start_fake_database(db: web::Data<FakeDatabase>) -> String {
        let server = HttpServer::new(move || {
            App::new()
                .app_data(db.clone())
                .route("/rest/v1/detections", web::post().to(insert))
                .route("/rest/v1/{table}", web::get().to(select))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_rt::spawn(server.run());
        format!("http://{}", addr)
    }

    async fn client_for(url: &str, device: &str) -> PgClient {
        let mut settings = Settings::default();
        settings.database.url = url.to_string();
        settings.database.key = "secret".to_string();
        settings.database.device_name = device.to_string();
        settings.database.location_name = "hall".to_string();
        let state = CounterState::new(settings, Metrics::new().unwrap());
        PgClient::new(state, DatabaseConfig::default()).unwrap()
    }

    fn counts(people: u32, inside: u32, outside: u32) -> FrameCounts {
        FrameCounts {
            people_image_count: people,
            in_count: inside,
            out_count: outside,
        }
    }

    #[test]
    fn full_buffer_drops_the_oldest_records() {
        let mut buffer = RecordBuffer::default();
        for people in 0..5 {
            buffer.push(DetectionRecord::now(people, 0, 0), 3);
        }

        let kept: Vec<u32> = buffer.rows.iter().map(|(_, r)| r.people_image_count).collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn removing_sent_rows_keeps_later_ones() {
        let mut buffer = RecordBuffer::default();
        for people in 0..4 {
            buffer.push(DetectionRecord::now(people, 0, 0), 10);
        }

        buffer.remove_through(1);

        let kept: Vec<u32> = buffer.rows.iter().map(|(_, r)| r.people_image_count).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[actix_rt::test]
    async fn insertion_toggle_gates_buffering() {
        let client = client_for("http://127.0.0.1:9", "entrance").await;

        client.insert_detection(counts(1, 0, 0)).await;
        client.state.settings.write().await.toggles.database_insertion = false;
        client.insert_detection(counts(2, 0, 0)).await;

        assert_eq!(client.buffered_len().await, 1);
    }

    #[actix_rt::test]
    async fn flush_sends_rows_with_resolved_foreign_keys() {
        let db = web::Data::new(FakeDatabase::default());
        let url = start_fake_database(db.clone()).await;
        let client = client_for(&url, "entrance").await;

        client.insert_detection(counts(4, 1, 2)).await;
        client.insert_detection(counts(6, 0, 1)).await;
        let sent = client.flush().await.unwrap();

        assert_eq!(sent, 2);
        assert_eq!(client.buffered_len().await, 0);
        let inserted = db.inserted.lock().unwrap().clone();
        assert_eq!(inserted[0]["id_appareil"], 3);
        assert_eq!(inserted[0]["id_lieu"], 5);
        assert_eq!(inserted[0]["id_resolution"], 7);
        assert_eq!(inserted[0]["nombre_personnes"], 4);
        assert_eq!(inserted[1]["nombre_sorties"], 1);

        // Ids are cached after the first flush
        client.insert_detection(counts(1, 0, 0)).await;
        client.flush().await.unwrap();
        assert_eq!(*db.lookups.lock().unwrap(), 3);
    }

    #[actix_rt::test]
    async fn failed_insert_keeps_the_buffer() {
        let db = web::Data::new(FakeDatabase::default());
        *db.failing.lock().unwrap() = true;
        let url = start_fake_database(db.clone()).await;
        let client = client_for(&url, "entrance").await;

        client.insert_detection(counts(4, 1, 2)).await;
        let result = client.flush().await;

        assert!(matches!(result, Err(CounterError::Persistence(_))));
        assert_eq!(client.buffered_len().await, 1);
    }

    #[actix_rt::test]
    async fn unknown_device_fails_the_flush() {
        let db = web::Data::new(FakeDatabase::default());
        let url = start_fake_database(db.clone()).await;
        let client = client_for(&url, "basement").await;

        client.insert_detection(counts(1, 0, 0)).await;

        let error = client.flush().await.unwrap_err();
        assert!(error.to_string().contains("device `basement` not found"));
        assert_eq!(client.buffered_len().await, 1);
    }

    #[actix_rt::test]
    async fn unconfigured_database_refuses_to_flush() {
        let client = client_for("", "entrance").await;
        client.insert_detection(counts(1, 0, 0)).await;

        assert!(client.flush().await.is_err());
        assert_eq!(client.buffered_len().await, 1);
    }
}
