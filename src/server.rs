//! HTTP conversion service.
//!
//! One route: `POST /api/convert`, multipart form with fields
//!
//! | Field | Required | Meaning |
//! |---|---|---|
//! | `image` | yes | the file to convert |
//! | `quality` | no | 1-100, default from config |
//! | `scale` | no | 1-200, default from config |
//! | `lossless` | no | `true`/`1`/`on` |
//!
//! Numeric fields that are missing, unparsable or zero fall back to the
//! default; anything else is rounded and clamped.
//!
//! Upload checks run in order: missing file, size, MIME type. Each fails with
//! `400` and `{"error": "..."}`. Codec initialization or conversion failures
//! give `500` with an extra `details` field. A successful conversion returns
//! the WebP bytes with dimension and size headers:
//!
//! ```text
//! Content-Type: image/webp
//! X-Original-Width: 1920      X-Converted-Width: 960
//! X-Original-Height: 1080     X-Converted-Height: 540
//! X-Original-Size: 482113     X-Converted-Size: 61204
//! X-Original-Format: image/jpeg
//! ```
//!
//! Every `/api/*` response carries permissive CORS headers, and `OPTIONS`
//! preflights are answered with `204`.
//!
//! ## Threading
//!
//! tiny_http accepts connections on the calling thread. Each request becomes a
//! task on the tokio runtime; body reading, codec work and response writing
//! happen on the blocking pool.
//!
//! The body is streamed into the multipart parser in chunks rather than
//! buffered whole. Only the `image` part is held in memory and it is capped at
//! `max_upload_bytes`. Unknown fields are skipped as they stream past.

use crate::config::{ServerConfig, WebpifyConfig};
use crate::imaging::{
    Codec, Conversion, ConvertError, ConvertOptions, Converter, InitError, Quality, ScalePercent,
};
use crate::output::format_bytes;
use crate::types::SourceFormat;
use bytes::Bytes;
use serde_json::json;
use futures::Stream;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server};

/// Headers the browser may read from a cross-origin conversion response.
const EXPOSED_HEADERS: &str = "X-Original-Width, X-Original-Height, X-Converted-Width, \
X-Converted-Height, X-Original-Size, X-Converted-Size, X-Original-Format";

/// Cap on each of the `quality`, `scale` and `lossless` text fields.
const TEXT_FIELD_LIMIT_BYTES: u64 = 1024;

/// Size of the chunks the body reader hands to the multipart parser.
const BODY_CHUNK_BYTES: usize = 64 * 1024;

/// Chunks buffered between the body reader and the parser.
const BODY_QUEUE_CHUNKS: usize = 4;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("cannot listen on {addr}: {message}")]
    Bind { addr: String, message: String },
    #[error("server has no IP listen address")]
    NoAddress,
}

/// Why a conversion request was rejected or failed.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("No image file provided")]
    MissingFile,
    #[error("File size exceeds {limit} limit")]
    FileTooLarge { limit: String },
    #[error("Unsupported file type")]
    DisallowedMimeType(String),
    #[error("Invalid form data")]
    Multipart(#[from] multer::Error),
    #[error("Failed to process image")]
    Init(#[from] InitError),
    #[error("Failed to process image")]
    Convert(#[from] ConvertError),
    #[error("Failed to read request body")]
    Body(#[from] std::io::Error),
}

impl RequestError {
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingFile
            | Self::FileTooLarge { .. }
            | Self::DisallowedMimeType(_)
            | Self::Multipart(_) => 400,
            Self::Init(_) | Self::Convert(_) | Self::Body(_) => 500,
        }
    }

    /// JSON body: the message, plus the underlying diagnostic for server-side failures.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Multipart(e) => json!({ "error": self.to_string(), "details": e.to_string() }),
            Self::Init(e) => json!({ "error": self.to_string(), "details": e.to_string() }),
            Self::Convert(e) => json!({ "error": self.to_string(), "details": e.to_string() }),
            Self::Body(e) => json!({ "error": self.to_string(), "details": e.to_string() }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

/// A response before it is handed to tiny_http.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: value.to_string().into_bytes(),
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn error(err: &RequestError) -> Self {
        Self::json(err.status(), err.to_json())
    }

    fn converted(conversion: Conversion, mime: &str) -> Self {
        let headers = vec![
            ("Content-Type".to_string(), "image/webp".to_string()),
            (
                "X-Original-Width".to_string(),
                conversion.original.width.to_string(),
            ),
            (
                "X-Original-Height".to_string(),
                conversion.original.height.to_string(),
            ),
            (
                "X-Converted-Width".to_string(),
                conversion.converted.width.to_string(),
            ),
            (
                "X-Converted-Height".to_string(),
                conversion.converted.height.to_string(),
            ),
            (
                "X-Original-Size".to_string(),
                conversion.original_size.to_string(),
            ),
            (
                "X-Converted-Size".to_string(),
                conversion.converted_size.to_string(),
            ),
            ("X-Original-Format".to_string(), mime.to_string()),
        ];
        Self {
            status: 200,
            headers,
            body: conversion.encoded,
        }
    }

    fn with_cors(mut self) -> Self {
        self.headers.extend([
            ("Access-Control-Allow-Origin".into(), "*".into()),
            (
                "Access-Control-Expose-Headers".into(),
                EXPOSED_HEADERS.into(),
            ),
        ]);
        self
    }
}

/// Which handler a request goes to.
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Convert,
    Preflight,
    MethodNotAllowed,
    NotFound,
}

fn route(method: &Method, url: &str) -> Route {
    let path = url.split('?').next().unwrap_or(url);
    let is_api = path == "/api" || path.starts_with("/api/");
    match (method, path) {
        (Method::Options, _) if is_api => Route::Preflight,
        (Method::Post, "/api/convert") => Route::Convert,
        (_, "/api/convert") => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

/// Parse a numeric form field; missing, unparsable, non-finite or zero means `default`.
fn parse_number_field(value: Option<&str>, default: u32) -> u32 {
    let parsed = value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v != 0.0);
    match parsed {
        // Negative values clamp up later; the cast saturates at 0 and u32::MAX.
        Some(v) => v.round() as u32,
        None => default,
    }
}

fn parse_bool_field(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "on" | "yes") => true,
        Some(v) if matches!(v.as_str(), "false" | "0" | "off" | "no") => false,
        _ => default,
    }
}

fn upload_limit_label(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format_bytes(bytes)
    }
}

struct Upload {
    bytes: Bytes,
    mime: String,
}

#[derive(Default)]
struct ConvertForm {
    image: Option<Upload>,
    quality: Option<String>,
    scale: Option<String>,
    lossless: Option<String>,
}

/// Parse the form, keeping the `image` part and the known text fields.
///
/// An `image` part over `max_upload` fails as soon as the limit is crossed.
async fn parse_form<S>(body: S, boundary: String, max_upload: u64) -> Result<ConvertForm, RequestError>
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    read_fields(body, boundary, max_upload)
        .await
        .map_err(|e| form_error(e, max_upload))
}

async fn read_fields<S>(body: S, boundary: String, max_upload: u64) -> Result<ConvertForm, multer::Error>
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    let limits = multer::SizeLimit::new()
        .for_field("image", max_upload)
        .for_field("quality", TEXT_FIELD_LIMIT_BYTES)
        .for_field("scale", TEXT_FIELD_LIMIT_BYTES)
        .for_field("lossless", TEXT_FIELD_LIMIT_BYTES);
    let constraints = multer::Constraints::new().size_limit(limits);
    let mut multipart = multer::Multipart::with_constraints(body, boundary, constraints);
    let mut form = ConvertForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            // A text field named "image" is not a file.
            Some("image") if field.file_name().is_some() => {
                let mime = field
                    .content_type()
                    .map(|m| m.essence_str().to_string())
                    .unwrap_or_default();
                let bytes = field.bytes().await?;
                form.image = Some(Upload { bytes, mime });
            }
            Some("quality") => form.quality = Some(field.text().await?),
            Some("scale") => form.scale = Some(field.text().await?),
            Some("lossless") => form.lossless = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(form)
}

fn form_error(err: multer::Error, max_upload: u64) -> RequestError {
    match err {
        multer::Error::FieldSizeExceeded {
            field_name: Some(name),
            ..
        } if name == "image" => RequestError::FileTooLarge {
            limit: upload_limit_label(max_upload),
        },
        multer::Error::StreamReadFailed(e) => RequestError::Body(std::io::Error::other(e)),
        other => RequestError::Multipart(other),
    }
}

/// Copy the request body into `tx` chunk by chunk until EOF, a read error, or
/// the parser hanging up.
fn pump_body(reader: &mut dyn Read, tx: &tokio::sync::mpsc::Sender<std::io::Result<Bytes>>) {
    let mut buf = vec![0u8; BODY_CHUNK_BYTES];
    loop {
        let chunk = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() || failed {
            return;
        }
    }
}

fn receiver_stream(
    rx: tokio::sync::mpsc::Receiver<std::io::Result<Bytes>>,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
}

fn header_value<'a>(request: &'a Request, name: &'static str) -> Option<&'a str> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str())
}

struct AppState<C> {
    converter: Arc<Converter<C>>,
    server: ServerConfig,
    defaults: ConvertOptions,
}

/// The conversion service, bound and ready to [`run`](Self::run).
pub struct ConvertServer<C> {
    http: Server,
    local_addr: SocketAddr,
    state: Arc<AppState<C>>,
}

impl<C: Codec + 'static> ConvertServer<C> {
    /// Bind to `config.server.host:config.server.port`. Port 0 picks a free port.
    pub fn bind(converter: Arc<Converter<C>>, config: &WebpifyConfig) -> Result<Self, ServeError> {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let http = Server::http(addr.as_str()).map_err(|e| ServeError::Bind {
            addr: addr.clone(),
            message: e.to_string(),
        })?;
        let local_addr = http.server_addr().to_ip().ok_or(ServeError::NoAddress)?;
        Ok(Self {
            http,
            local_addr,
            state: Arc::new(AppState {
                converter,
                server: config.server.clone(),
                defaults: config.conversion.convert_options(),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept requests until the listener fails. Blocks the calling thread.
    ///
    /// Must not be called from inside the runtime `handle` belongs to.
    pub fn run(self, handle: tokio::runtime::Handle) {
        log::info!("listening on http://{}", self.local_addr);

        // Warm the codec up front; a failure here is retried on the first request.
        let state = Arc::clone(&self.state);
        handle.spawn(async move {
            if let Err(e) = state.converter.ensure_ready().await {
                log::warn!("codec initialization failed: {e}");
            }
        });

        for request in self.http.incoming_requests() {
            let state = Arc::clone(&self.state);
            handle.spawn(handle_request(state, request));
        }
    }
}

async fn handle_request<C: Codec + 'static>(state: Arc<AppState<C>>, request: Request) {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.url().to_string();

    let (request, reply) = match route(&method, &url) {
        Route::Convert => {
            let (request, result) = convert_request(&state, request).await;
            let reply = match result {
                Ok(reply) => reply,
                Err(err) => {
                    match err.status() {
                        500 => log::error!("{method} {url}: {err}: {:?}", err),
                        _ => log::debug!("{method} {url} rejected: {err}"),
                    }
                    Reply::error(&err)
                }
            };
            (request, reply.with_cors())
        }
        Route::Preflight => {
            let mut reply = Reply::empty(204).with_cors();
            reply.headers.extend([
                (
                    "Access-Control-Allow-Methods".into(),
                    "GET, HEAD, PUT, POST, DELETE, PATCH".into(),
                ),
                (
                    "Access-Control-Allow-Headers".into(),
                    header_value(&request, "Access-Control-Request-Headers")
                        .unwrap_or("Content-Type")
                        .to_string(),
                ),
            ]);
            (request, reply)
        }
        Route::MethodNotAllowed => (
            request,
            Reply::json(405, json!({ "error": "Method not allowed" })).with_cors(),
        ),
        Route::NotFound => (request, Reply::json(404, json!({ "error": "Not found" }))),
    };

    let status = reply.status;
    let written = tokio::task::spawn_blocking(move || respond(request, reply)).await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("{method} {url}: failed to write response: {e}"),
        Err(e) => log::error!("{method} {url}: response task failed: {e}"),
    }
    log::info!("{method} {url} {status} {:?}", started.elapsed());
}

fn respond(request: Request, reply: Reply) -> std::io::Result<()> {
    let mut response = Response::from_data(reply.body).with_status_code(reply.status);
    for (name, value) in &reply.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => log::warn!("dropping invalid header {name}"),
        }
    }
    request.respond(response)
}

/// Read, validate and convert one upload. Gives the request back so the caller can answer it.
async fn convert_request<C: Codec + 'static>(
    state: &AppState<C>,
    request: Request,
) -> (Request, Result<Reply, RequestError>) {
    let boundary = header_value(&request, "Content-Type").and_then(|ct| multer::parse_boundary(ct).ok());
    let Some(boundary) = boundary else {
        return (request, Err(RequestError::MissingFile));
    };

    let (tx, rx) = tokio::sync::mpsc::channel(BODY_QUEUE_CHUNKS);
    let reader = tokio::task::spawn_blocking(move || {
        let mut request = request;
        pump_body(request.as_reader(), &tx);
        request
    });

    // The stream is dropped once the form is parsed, which releases the reader.
    let result = convert_form(state, receiver_stream(rx), boundary).await;
    let request = match reader.await {
        Ok(request) => request,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    };
    (request, result)
}

async fn convert_form<C: Codec + 'static, S>(
    state: &AppState<C>,
    body: S,
    boundary: String,
) -> Result<Reply, RequestError>
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    let form = parse_form(body, boundary, state.server.max_upload_bytes).await?;

    let upload = form.image.ok_or(RequestError::MissingFile)?;
    let format = state
        .server
        .allows(&upload.mime)
        .then(|| SourceFormat::from_mime(&upload.mime))
        .flatten()
        .ok_or_else(|| RequestError::DisallowedMimeType(upload.mime.clone()))?;

    let options = ConvertOptions {
        quality: Quality::new(parse_number_field(
            form.quality.as_deref(),
            state.defaults.quality.value(),
        )),
        scale: ScalePercent::new(parse_number_field(
            form.scale.as_deref(),
            state.defaults.scale.value(),
        )),
        lossless: parse_bool_field(form.lossless.as_deref(), state.defaults.lossless),
        max_dimension: state.defaults.max_dimension,
    };

    state.converter.ensure_ready().await?;
    let conversion = state
        .converter
        .convert(upload.bytes, format, options, None)
        .await?;
    log::debug!(
        "converted {} upload {} -> {} ({} -> {} bytes)",
        upload.mime,
        conversion.original,
        conversion.converted,
        conversion.original_size,
        conversion.converted_size
    );
    Ok(Reply::converted(conversion, &upload.mime))
}
