use actix_web::{get, post, web, HttpResponse};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

use super::{redirect_home, MASKED_KEY};
use crate::error::ValidationError;
use crate::settings::{self, keys, Toggle};
use crate::AppState;

fn refused(errors: Vec<ValidationError>) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "errors": errors }))
}

#[get("/api/settings")]
async fn get_settings(app: web::Data<AppState>) -> HttpResponse {
    let settings = app.state.settings().await;
    let mut values = settings.generate();
    if let Some(key) = values.get_mut(keys::DATABASE_KEY) {
        if !key.is_empty() {
            *key = MASKED_KEY.to_string();
        }
    }
    values.insert(
        keys::ACTIVATE_VIDEO_RECORDING.to_string(),
        if settings.toggles.video_recording { "True" } else { "False" }.to_string(),
    );

    HttpResponse::Ok().json(values)
}

#[post("/settings")]
async fn update_settings(
    app: web::Data<AppState>,
    form: web::Form<BTreeMap<String, String>>,
) -> HttpResponse {
    let mut values = form.into_inner();
    // The dashboard echoes the masked key back
    if values.get(keys::DATABASE_KEY).map(String::as_str) == Some(MASKED_KEY) {
        values.remove(keys::DATABASE_KEY);
    }

    let errors = app.state.settings.write().await.apply(&values);
    if errors.is_empty() {
        redirect_home()
    } else {
        refused(errors)
    }
}

#[post("/toggle/{name}")]
async fn toggle(app: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let toggle: Toggle = match path.parse() {
        Ok(toggle) => toggle,
        Err(error) => return refused(vec![error]),
    };

    let enabled = app.state.settings.write().await.toggle(toggle);
    info!("Toggled {:?} {}", toggle, if enabled { "on" } else { "off" });
    redirect_home()
}

#[post("/settings/save")]
async fn save_settings(app: web::Data<AppState>) -> Result<HttpResponse, actix_web::Error> {
    let values = app.state.settings().await.generate();
    settings::save_to_file(&app.settings_path, &values)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(redirect_home())
}

#[post("/settings/reload")]
async fn reload_settings(app: web::Data<AppState>) -> Result<HttpResponse, actix_web::Error> {
    let values = settings::load_from_file(&app.settings_path)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let errors = app.state.settings.write().await.apply(&values);
    if errors.is_empty() {
        Ok(redirect_home())
    } else {
        Ok(refused(errors))
    }
}

#[post("/totals/reset")]
async fn reset_totals(app: web::Data<AppState>) -> HttpResponse {
    app.state.reset_totals().await;
    info!("Total counts reset");
    redirect_home()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_settings)
        .service(update_settings)
        .service(toggle)
        .service(save_settings)
        .service(reload_settings)
        .service(reset_totals);
}
