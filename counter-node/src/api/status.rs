use actix_web::{get, http::header, web, HttpResponse};
use serde::Serialize;
use trafficount_common::Region;

use crate::imaging;
use crate::settings::Toggles;
use crate::state::{ComponentStatuses, LifecycleState, LiveCounts};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub lifecycle: LifecycleState,
    pub components: ComponentStatuses,
    pub toggles: Toggles,
    pub counts: LiveCounts,
    pub buffered_records: usize,
    pub region: Region,
    pub confidence: f32,
    pub delay_sec: f64,
    pub aggregated_frames_number: u32,
}

pub async fn snapshot(app: &AppState) -> StatusSnapshot {
    let settings = app.state.settings().await;
    StatusSnapshot {
        lifecycle: app.state.lifecycle().await,
        components: *app.state.statuses.read().await,
        toggles: settings.toggles,
        counts: app.state.live.read().await.clone(),
        buffered_records: app.pg.buffered_len().await,
        region: settings.counting.region,
        confidence: settings.counting.confidence,
        delay_sec: settings.counting.delay_sec,
        aggregated_frames_number: settings.counting.aggregated_frames_number,
    }
}

#[get("/api/status")]
async fn get_status(app: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(snapshot(&app).await)
}

#[get("/api/failure")]
async fn get_failure(app: web::Data<AppState>) -> HttpResponse {
    match app.state.failure.read().await.as_deref() {
        Some(failure) => HttpResponse::Ok()
            .content_type(mime::TEXT_PLAIN_UTF_8)
            .body(failure.to_string()),
        None => HttpResponse::NotFound().body("No failure recorded"),
    }
}

#[get("/api/buffer.csv")]
async fn get_buffer_csv(app: web::Data<AppState>) -> Result<HttpResponse, actix_web::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in app.pg.buffered().await {
        writer
            .serialize(record)
            .map_err(actix_web::error::ErrorInternalServerError)?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type(mime::TEXT_CSV_UTF_8)
        .insert_header((header::CONTENT_DISPOSITION, "inline; filename=\"buffer.csv\""))
        .body(body))
}

#[get("/image.jpg")]
async fn get_image(app: web::Data<AppState>) -> Result<HttpResponse, actix_web::Error> {
    let jpeg = {
        let frame = app.state.last_frame.read().await;
        let Some(image) = frame.as_ref() else {
            return Ok(HttpResponse::NotFound().body("No frame captured yet"));
        };
        imaging::encode_jpeg(image, app.jpeg_quality).map_err(actix_web::error::ErrorInternalServerError)?
    };

    Ok(HttpResponse::Ok()
        .content_type(mime::IMAGE_JPEG)
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .body(jpeg))
}

#[get("/metrics")]
async fn get_metrics(app: web::Data<AppState>) -> Result<HttpResponse, actix_web::Error> {
    app.state.metrics.set_buffered_records(app.pg.buffered_len().await);
    let text = app
        .state
        .metrics
        .render()
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(text))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_status)
        .service(get_failure)
        .service(get_buffer_csv)
        .service(get_image)
        .service(get_metrics);
}
