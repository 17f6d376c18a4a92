mod dashboard;
mod settings;
mod status;

use actix_web::{http::header, web, HttpResponse};

/// Shown in place of a configured database key.
const MASKED_KEY: &str = "********";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(dashboard::configure)
        .configure(status::configure)
        .configure(settings::configure);
}

/// GET-after-POST answer of every successful form.
fn redirect_home() -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .finish()
}
