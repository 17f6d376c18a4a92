use actix_web::{get, web, HttpResponse};
use std::fmt::Write;

use super::status::{snapshot, StatusSnapshot};
use super::MASKED_KEY;
use crate::settings::keys;
use crate::AppState;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}

fn render(status: &StatusSnapshot, settings: &[(String, String)], failure: Option<&str>) -> String {
    let counts = &status.counts;
    let toggles = &status.toggles;
    let mut html = String::with_capacity(8 * 1024);

    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>Trafficount</title>
<meta http-equiv="refresh" content="10">
<style>body{{font-family:sans-serif;margin:1em}}td,th{{padding:2px 8px;text-align:left}}.DOWN{{color:#b00}}.UP{{color:#080}}</style>
</head><body>
<h1>Trafficount</h1>
<h2>Status</h2>
<table>
<tr><th>Lifecycle</th><td>{lifecycle:?}</td></tr>
<tr><th>Model</th><td class="{model}">{model}</td></tr>
<tr><th>Camera</th><td class="{camera}">{camera}</td></tr>
<tr><th>Database</th><td class="{database}">{database}</td></tr>
<tr><th>Buffered records</th><td>{buffered}</td></tr>
</table>
<h2>Counts</h2>
<table>
<tr><th>People in image</th><td>{people}</td></tr>
<tr><th>In / out (last frame)</th><td>{inside} / {outside}</td></tr>
<tr><th>Total in / out</th><td>{total_in} / {total_out}</td></tr>
<tr><th>Greatest track id</th><td>{greatest_id}</td></tr>
<tr><th>Active tracks</th><td>{tracks}</td></tr>
<tr><th>Frames / lag events / camera losses</th><td>{frames} / {lags} / {losses}</td></tr>
<tr><th>Remaining time (ms)</th><td>{remaining}</td></tr>
</table>
<form method="post" action="/totals/reset"><button>Reset totals</button></form>
<h2>Modes</h2>
<form method="post" action="/toggle/counting"><button>Counting: {counting}</button></form>
<form method="post" action="/toggle/annotation"><button>Image annotation: {annotation}</button></form>
<form method="post" action="/toggle/insertion"><button>Database insertion: {insertion}</button></form>
<form method="post" action="/toggle/recording"><button>Video recording: {recording}</button></form>
<h2>Last image</h2>
<img src="/image.jpg" alt="No frame captured yet">
"#,
        lifecycle = status.lifecycle,
        model = status.components.model.as_str(),
        camera = status.components.camera.as_str(),
        database = status.components.database.as_str(),
        buffered = status.buffered_records,
        people = counts.people_image_count,
        inside = counts.in_count,
        outside = counts.out_count,
        total_in = counts.total_in_count,
        total_out = counts.total_out_count,
        greatest_id = counts.greatest_id,
        tracks = counts.active_tracks,
        frames = counts.frames_processed,
        lags = counts.lag_events,
        losses = counts.camera_losses,
        remaining = counts.remaining_ms,
        counting = on_off(toggles.counting),
        annotation = on_off(toggles.image_annotation),
        insertion = on_off(toggles.database_insertion),
        recording = on_off(toggles.video_recording),
    );

    html.push_str("<h2>Settings</h2>\n<form method=\"post\" action=\"/settings\"><table>\n");
    for (key, value) in settings {
        if key.starts_with("activate_") {
            continue;
        }
        let kind = if key == keys::DATABASE_KEY { "password" } else { "text" };
        let _ = writeln!(
            html,
            r#"<tr><th><label for="{key}">{key}</label></th><td><input type="{kind}" id="{key}" name="{key}" value="{value}"></td></tr>"#,
            key = escape(key),
            kind = kind,
            value = escape(value),
        );
    }
    html.push_str(
        r#"</table><button>Apply</button></form>
<form method="post" action="/settings/save"><button>Save to file</button></form>
<form method="post" action="/settings/reload"><button>Reload from file</button></form>
<p><a href="/api/status">status</a> | <a href="/api/settings">settings</a> | <a href="/api/buffer.csv">buffer</a> | <a href="/metrics">metrics</a></p>
"#,
    );

    if let Some(failure) = failure {
        let _ = write!(html, "<h2>Failure</h2>\n<pre>{}</pre>\n", escape(failure));
    }
    html.push_str("</body></html>\n");
    html
}

#[get("/")]
async fn index(app: web::Data<AppState>) -> HttpResponse {
    let status = snapshot(&app).await;
    let mut settings: Vec<(String, String)> = app.state.settings().await.generate().into_iter().collect();
    for (key, value) in settings.iter_mut() {
        if key == keys::DATABASE_KEY && !value.is_empty() {
            *value = MASKED_KEY.to_string();
        }
    }
    let failure = app.state.failure.read().await.clone();

    HttpResponse::Ok()
        .content_type(mime::TEXT_HTML_UTF_8)
        .body(render(&status, &settings, failure.as_deref()))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index);
}
