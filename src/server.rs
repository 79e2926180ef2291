//! HTTP front end: serves any [`FileSystem`] the way a static file server
//! would, directory listings included.
//!
//! The filesystem contract is synchronous, so every request is resolved on
//! tokio's blocking pool. A request never holds anything open once its
//! response has been built: the file stream (and with it every archive view
//! it had to open) is closed before the bytes go out.

use std::future::Future;
use std::io::{self, Read, SeekFrom};
use std::sync::Arc;
use std::time::SystemTime;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::io::FileHandle;
use crate::vfs::{FileSystem, Metadata, path};

/// Characters escaped in a single path segment of an href or a redirect.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'\'')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const INDEX: &str = "index.html";

/// What the blocking side needs to know about a request.
struct Lookup {
    /// Decoded and cleaned, always rooted.
    path: String,
    trailing_slash: bool,
    head: bool,
    range: Option<String>,
}

/// Builds the application: every path goes to the same handler.
pub fn router(fs: Arc<dyn FileSystem>) -> Router {
    Router::new().fallback(handle).with_state(fs)
}

/// Serves `fs` on `listener` until `shutdown` resolves, then waits for
/// in-flight requests to finish.
pub async fn serve<F>(listener: TcpListener, fs: Arc<dyn FileSystem>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(fs))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn handle(
    State(fs): State<Arc<dyn FileSystem>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let response = if method != Method::GET && method != Method::HEAD {
        let mut headers = HeaderMap::new();
        headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        (StatusCode::METHOD_NOT_ALLOWED, headers).into_response()
    } else {
        match percent_decode_str(uri.path()).decode_utf8() {
            Ok(decoded) => {
                let lookup = Lookup {
                    path: path::clean(&decoded),
                    trailing_slash: decoded.ends_with('/'),
                    head: method == Method::HEAD,
                    range: headers
                        .get(header::RANGE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                };
                match tokio::task::spawn_blocking(move || respond(&*fs, &lookup)).await {
                    Ok(response) => response,
                    Err(err) => {
                        error!(error = %err, "request handler panicked");
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                }
            }
            Err(_) => (StatusCode::BAD_REQUEST, "path is not valid UTF-8").into_response(),
        }
    };

    info!(%method, path = uri.path(), status = response.status().as_u16(), "request");
    response
}

fn respond(fs: &dyn FileSystem, lookup: &Lookup) -> Response {
    match resolve(fs, lookup) {
        Ok(response) => response,
        Err(err) => error_response(&lookup.path, &err),
    }
}

fn resolve(fs: &dyn FileSystem, lookup: &Lookup) -> Result<Response> {
    let meta = fs.stat(&lookup.path)?;

    if meta.is_dir {
        if !lookup.trailing_slash {
            return Ok(redirect(&format!("{}/", encode_path(&lookup.path))));
        }
        let index = path::join(&lookup.path, INDEX);
        if let Ok(index_meta) = fs.stat(&index)
            && !index_meta.is_dir
        {
            return serve_file(fs, &index, &index_meta, lookup);
        }
        let entries = fs.list(&lookup.path)?;
        return Ok(listing(&lookup.path, &entries, lookup.head));
    }

    if lookup.trailing_slash {
        return Ok(redirect(&encode_path(&lookup.path)));
    }
    serve_file(fs, &lookup.path, &meta, lookup)
}

fn error_response(path: &str, err: &Error) -> Response {
    if err.is_not_found() {
        (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
    } else {
        error!(path, error = %err, "failed to serve");
        (StatusCode::INTERNAL_SERVER_ERROR, "500 internal server error\n").into_response()
    }
}

fn redirect(location: &str) -> Response {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
        }
        Err(err) => warn!(location, error = %err, "unencodable redirect target"),
    }
    (StatusCode::MOVED_PERMANENTLY, headers).into_response()
}

fn encode_path(path: &str) -> String {
    path::split(path)
        .iter()
        .map(|segment| format!("/{}", utf8_percent_encode(segment, SEGMENT)))
        .collect()
}

/// A parsed `Range` header, resolved against the size of the file.
#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    /// No usable range: serve everything.
    Whole,
    /// Inclusive bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Understands a single `bytes=` range. Multiple ranges and anything
/// malformed fall back to the whole file.
fn parse_range(header: &str, size: u64) -> ByteRange {
    let Some(ranges) = header.trim().strip_prefix("bytes=") else {
        return ByteRange::Whole;
    };
    if ranges.contains(',') {
        return ByteRange::Whole;
    }
    let Some((first, last)) = ranges.split_once('-') else {
        return ByteRange::Whole;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        let Ok(suffix) = last.parse::<u64>() else {
            return ByteRange::Whole;
        };
        if suffix == 0 || size == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Partial {
            start: size - suffix.min(size),
            end: size - 1,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return ByteRange::Whole;
    };
    if start >= size {
        return ByteRange::Unsatisfiable;
    }
    let end = if last.is_empty() {
        size - 1
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return ByteRange::Whole,
        }
    };
    ByteRange::Partial { start, end }
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn serve_file(fs: &dyn FileSystem, file: &str, meta: &Metadata, lookup: &Lookup) -> Result<Response> {
    let size = meta.size;
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    let mime = mime_guess::from_path(file).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(modified) = meta.modified
        && let Ok(value) = HeaderValue::from_str(&http_date(modified))
    {
        headers.insert(header::LAST_MODIFIED, value);
    }

    let (status, start, len) = match lookup.range.as_deref().map(|h| parse_range(h, size)) {
        None | Some(ByteRange::Whole) => (StatusCode::OK, 0, size),
        Some(ByteRange::Partial { start, end }) => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
        }
        Some(ByteRange::Unsatisfiable) => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            return Ok((StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response());
        }
    };

    if lookup.head {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        return Ok((status, headers).into_response());
    }

    let mut stream = fs.open(file)?;
    let body = read_span(&mut *stream, start, len);
    if let Err(err) = stream.close() {
        warn!(path = file, error = %err, "failed to close served file");
    }
    Ok((status, headers, Body::from(body?)).into_response())
}

fn read_span(stream: &mut dyn FileHandle, start: u64, len: u64) -> Result<Vec<u8>> {
    if start > 0 {
        stream.seek(SeekFrom::Start(start))?;
    }
    let mut body = Vec::with_capacity(usize::try_from(len).unwrap_or(0).min(1 << 20));
    stream.take(len).read_to_end(&mut body)?;
    Ok(body)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn listing(dir: &str, entries: &[Metadata], head: bool) -> Response {
    let mut entries: Vec<&Metadata> = entries.iter().collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let title = escape_html(dir);
    let mut html = format!(
        "<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<title>{title}</title>\n<h1>{title}</h1>\n<pre>\n"
    );
    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        html.push_str(&format!(
            "<a href=\"{}{suffix}\">{}{suffix}</a>\n",
            utf8_percent_encode(&entry.name, SEGMENT),
            escape_html(&entry.name),
        ));
    }
    html.push_str("</pre>\n");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    if head {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(html.len()));
        return (StatusCode::OK, headers).into_response();
    }
    (StatusCode::OK, headers, html).into_response()
}
