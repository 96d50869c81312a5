// Browser front end: a title form, a JSON endpoint, and spreadsheet upload.

use crate::batch::{self, BatchDriver, SheetFormat};
use crate::lookup::{Lookup, LookupError, LookupResult};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::{Filter, Reply};

const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct LookupForm {
    title: String,
}

#[derive(Debug, Serialize)]
struct StatusMessage {
    status: String,
    message: String,
}

pub async fn start_web_server(port: u16, lookup: Lookup, workers: usize) {
    let driver = Arc::new(BatchDriver::new(lookup.clone(), workers));

    let lookup_filter = warp::any().map(move || lookup.clone());
    let driver_filter = warp::any().map(move || driver.clone());

    let index = warp::get()
        .and(warp::path::end())
        .map(|| warp::reply::html(index_html()));

    let lookup_page = warp::post()
        .and(warp::path("lookup"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::form::<LookupForm>())
        .and(lookup_filter.clone())
        .and_then(lookup_html);

    let lookup_api = warp::get()
        .and(warp::path!("api" / "lookup"))
        .and(warp::query::<LookupForm>())
        .and(lookup_filter.clone())
        .and_then(lookup_json);

    let upload = warp::post()
        .and(warp::path("batch"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_UPLOAD_BYTES))
        .and(warp::body::bytes())
        .and(driver_filter)
        .and_then(upload_batch);

    let routes = index.or(lookup_page).or(lookup_api).or(upload);

    info!(port, "Web interface running on http://localhost:{}", port);
    warp::serve(routes).run(([127, 0, 0, 1], port)).await;
}

async fn lookup_html(form: LookupForm, lookup: Lookup) -> Result<warp::reply::Response, warp::Rejection> {
    match lookup.run(&form.title).await {
        Ok(result) => Ok(warp::reply::html(report_html(&result)).into_response()),
        Err(LookupError::BlankTitle) => Ok(warp::reply::with_status(
            warp::reply::html(page("Quartile Finder", "<p>Please enter an article title.</p>")),
            StatusCode::BAD_REQUEST,
        )
        .into_response()),
    }
}

async fn lookup_json(query: LookupForm, lookup: Lookup) -> Result<warp::reply::Response, warp::Rejection> {
    match lookup.run(&query.title).await {
        Ok(result) => Ok(warp::reply::json(&result).into_response()),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&StatusMessage {
                status: "error".to_string(),
                message: e.to_string(),
            }),
            StatusCode::BAD_REQUEST,
        )
        .into_response()),
    }
}

async fn upload_batch(body: bytes::Bytes, driver: Arc<BatchDriver>) -> Result<warp::reply::Response, warp::Rejection> {
    let format = SheetFormat::sniff(&body);
    let titles = match batch::read_titles_from(format, &body) {
        Ok(titles) => titles,
        Err(e) => {
            warn!(error = %e, "Rejected uploaded spreadsheet");
            return Ok(warp::reply::with_status(e.to_string(), StatusCode::BAD_REQUEST).into_response());
        }
    };

    info!(titles = titles.len(), ?format, "Spreadsheet uploaded");
    let report = driver.run(titles, &CancellationToken::new()).await;

    let sheet = match batch::encode_rows(format, &report.rows) {
        Ok(sheet) => sheet,
        Err(e) => {
            warn!(error = %e, "Could not build result spreadsheet");
            return Ok(warp::reply::with_status(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response());
        }
    };

    let filename = format!(
        "quartile_results_{}.{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    );
    let reply = warp::reply::with_header(sheet, "content-type", format.content_type());
    let reply = warp::reply::with_header(
        reply,
        "content-disposition",
        format!("attachment; filename=\"{}\"", filename),
    );
    Ok(reply.into_response())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn or_not_found(value: Option<String>) -> String {
    value.map_or_else(|| batch::NOT_FOUND.to_string(), |v| escape(&v))
}

fn report_html(result: &LookupResult) -> String {
    let metadata = &result.metadata;
    let latest = result
        .latest
        .as_ref()
        .map(|r| format!("{} ({}, {})", r.quartile, r.year, r.category));

    let source = match result.source_url() {
        Some(url) => format!(r#"<a href="{0}" target="_blank">{0}</a>"#, escape(url)),
        None => batch::NOT_FOUND.to_string(),
    };

    let mut body = format!(
        r#"<h2>{title}</h2>
        <table class="meta">
          <tr><th>Journal</th><td>{journal}</td></tr>
          <tr><th>ISSN</th><td>{issn}</td></tr>
          <tr><th>Publication year</th><td>{year}</td></tr>
          <tr><th>Latest quartile</th><td>{latest}</td></tr>
          <tr><th>SCImago</th><td>{source}</td></tr>
        </table>"#,
        title = escape(&result.title),
        journal = or_not_found(metadata.journal.clone()),
        issn = or_not_found(metadata.issn.clone()),
        year = or_not_found(metadata.year.map(|y| y.to_string())),
        latest = or_not_found(latest),
        source = source,
    );

    if result.year_matches.is_empty() {
        body.push_str("<p>No quartile history found for this journal.</p>");
    } else {
        body.push_str(
            "<table class=\"categories\"><tr><th>Category</th><th>At publication year</th>\
             <th>First known</th><th>Last known</th></tr>",
        );
        for m in &result.year_matches {
            let span = result.span(&m.category);
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&m.category),
                escape(&batch::describe_match(m, metadata.year)),
                or_not_found(span.map(|s| format!("{} - {}", s.earliest.year, s.earliest.quartile))),
                or_not_found(span.map(|s| format!("{} - {}", s.latest.year, s.latest.quartile))),
            ));
        }
        body.push_str("</table>");
    }

    body.push_str(r#"<p><a href="/">New search</a></p>"#);
    page("Quartile Finder", &body)
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, sans-serif; max-width: 900px; margin: 40px auto; color: #222; }}
        table {{ border-collapse: collapse; margin: 16px 0; width: 100%; }}
        th, td {{ border: 1px solid #ddd; padding: 6px 10px; text-align: left; }}
        th {{ background: #f4f4f4; }}
        input[type=text] {{ width: 70%; padding: 8px; }}
        button {{ background: #4CAF50; color: white; padding: 8px 18px; border: none; border-radius: 4px; cursor: pointer; }}
        button:hover {{ background: #45a049; }}
        .info {{ color: #666; }}
    </style>
</head>
<body>
{body}
</body>
</html>"#,
        title = escape(title),
        body = body,
    )
}

fn index_html() -> String {
    let body = r#"
    <h1>Quartile Finder</h1>
    <form method="post" action="/lookup">
        <input type="text" name="title" placeholder="Article title" required>
        <button type="submit">Search</button>
    </form>

    <h2>Spreadsheet</h2>
    <p class="info">Upload an Excel workbook (.xlsx, .xls) or a CSV file with a header row and one
    article title per row in the first column. Results come back in the same format.</p>
    <input type="file" id="sheet" accept=".xlsx,.xls,.csv">
    <button id="upload">Upload and process</button>
    <p id="upload-status" class="info"></p>

    <script>
        document.getElementById('upload').addEventListener('click', async () => {
            const input = document.getElementById('sheet');
            const status = document.getElementById('upload-status');
            if (!input.files.length) {
                status.textContent = 'Choose a file first.';
                return;
            }
            status.textContent = 'Processing, this can take a while for long lists...';
            const response = await fetch('/batch', { method: 'POST', body: input.files[0] });
            if (!response.ok) {
                status.textContent = 'Error: ' + await response.text();
                return;
            }
            const disposition = response.headers.get('content-disposition') || '';
            const match = disposition.match(/filename="([^"]+)"/);
            const blob = await response.blob();
            const link = document.createElement('a');
            link.href = URL.createObjectURL(blob);
            link.download = match ? match[1] : 'quartile_results';
            link.click();
            status.textContent = 'Done.';
        });
    </script>"#;

    page("Quartile Finder", body)
}
