use crate::pipeline::types::Thresholds;
use crate::video::processor::StreamStats;
use crate::video::MediaKind;
use crate::web::server::AppState;
use axum::{extract::State, response::Html};
use std::sync::Arc;

const STYLE: &str = "body{font-family:sans-serif;max-width:48rem;margin:2rem auto}\
label{display:block;margin:.5rem 0}img,video{max-width:100%}";

pub async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(index_page(state.defaults))
}

pub fn index_page(defaults: Thresholds) -> String {
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Subject Boxes</title><style>{style}</style></head>
<body>
<h1>Subject Boxes</h1>
<form method="post" action="/" enctype="multipart/form-data">
  <label>File <input type="file" name="file" required></label>
  <label>Type
    <select name="file_type">
      <option value="image">Image</option>
      <option value="video">Video</option>
    </select>
  </label>
  <label>Subject threshold
    <input type="number" name="threshold_subject" min="0" max="1" step="0.01" value="{subject}">
  </label>
  <label>Region threshold
    <input type="number" name="threshold_region" min="0" max="1" step="0.01" value="{region}">
  </label>
  <button type="submit">Upload</button>
</form>
<p><a href="/api/processed">Processed files</a></p>
</body>
</html>
"#,
        style = STYLE,
        subject = defaults.subject,
        region = defaults.region,
    )
}

/// `name` must be a sanitised file name.
pub fn result_page(name: &str, kind: MediaKind, stats: &StreamStats) -> String {
    let url = format!("/processed/{}", name);
    let preview = match kind {
        MediaKind::Image => format!(r#"<img src="{}" alt="{}">"#, url, name),
        MediaKind::Video => format!(r#"<video src="{}" controls></video>"#, url),
    };
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>{name} processed</title><style>{style}</style></head>
<body>
<h1>{name}</h1>
<p>{frames} frame(s) in {secs:.2}s ({fps:.3} FPS)</p>
{preview}
<p><a href="{url}" download>Download</a> | <a href="/">Upload another</a></p>
</body>
</html>
"#,
        name = name,
        style = STYLE,
        frames = stats.processed_frames,
        secs = stats.elapsed.as_secs_f64(),
        fps = stats.fps,
        preview = preview,
        url = url,
    )
}
