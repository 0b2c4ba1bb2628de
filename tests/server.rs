//! The HTTP service against real codecs and a real client.

use image::{ImageFormat, RgbImage};
use reqwest::blocking::{Client, multipart};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use webpify::config::WebpifyConfig;
use webpify::imaging::{CodecBackend, Converter};
use webpify::server::ConvertServer;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let n = (x.wrapping_mul(31) ^ y.wrapping_mul(17)) as u8;
        image::Rgb([n, n.wrapping_add(x as u8), n.wrapping_sub(y as u8)])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Start a server on a free port and return its base URL.
fn start_server(config: WebpifyConfig) -> String {
    let (tx, rx) = std::sync::mpsc::channel::<SocketAddr>();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let converter = Arc::new(Converter::new(CodecBackend::from_kind(
            config.conversion.codec,
        )));
        let server = ConvertServer::bind(converter, &config).unwrap();
        tx.send(server.local_addr()).unwrap();
        server.run(runtime.handle().clone());
    });
    let addr = rx.recv().unwrap();
    format!("http://{addr}")
}

fn default_server() -> String {
    let mut config = WebpifyConfig::default();
    config.server.port = 0;
    start_server(config)
}

fn image_part(bytes: Vec<u8>, mime: &str) -> multipart::Part {
    multipart::Part::bytes(bytes)
        .file_name("upload")
        .mime_str(mime)
        .unwrap()
}

fn header(response: &reqwest::blocking::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn json_body(response: reqwest::blocking::Response) -> serde_json::Value {
    serde_json::from_slice(&response.bytes().unwrap()).unwrap()
}

fn convert(base: &str, form: multipart::Form) -> reqwest::blocking::Response {
    Client::new()
        .post(format!("{base}/api/convert"))
        .multipart(form)
        .send()
        .unwrap()
}

// =========================================================================
// Successful conversions
// =========================================================================

#[test]
fn converts_png_upload() {
    let base = default_server();
    let source = png(200, 100);
    let source_len = source.len();

    let response = convert(
        &base,
        multipart::Form::new().part("image", image_part(source, "image/png")),
    );

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(header(&response, "content-type"), "image/webp");
    assert_eq!(header(&response, "x-original-width"), "200");
    assert_eq!(header(&response, "x-original-height"), "100");
    assert_eq!(header(&response, "x-converted-width"), "200");
    assert_eq!(header(&response, "x-converted-height"), "100");
    assert_eq!(header(&response, "x-original-size"), source_len.to_string());
    assert_eq!(header(&response, "x-original-format"), "image/png");
    assert_eq!(header(&response, "access-control-allow-origin"), "*");

    let converted_size = header(&response, "x-converted-size");
    let body = response.bytes().unwrap();
    assert_eq!(converted_size, body.len().to_string());
    let decoded = image::load_from_memory_with_format(&body, ImageFormat::WebP).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 100));
}

#[test]
fn scale_field_resizes() {
    let base = default_server();
    let form = multipart::Form::new()
        .part("image", image_part(png(400, 200), "image/png"))
        .text("scale", "50");

    let response = convert(&base, form);

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(header(&response, "x-converted-width"), "200");
    assert_eq!(header(&response, "x-converted-height"), "100");
}

#[test]
fn lower_quality_is_smaller() {
    let base = default_server();
    let size_at = |quality: &str| {
        let form = multipart::Form::new()
            .part("image", image_part(png(256, 256), "image/png"))
            .text("quality", quality.to_string());
        let response = convert(&base, form);
        assert_eq!(response.status().as_u16(), 200);
        response.bytes().unwrap().len()
    };

    assert!(size_at("10") < size_at("90"));
}

#[test]
fn out_of_range_quality_is_clamped() {
    let base = default_server();
    let form = multipart::Form::new()
        .part("image", image_part(png(32, 32), "image/png"))
        .text("quality", "999")
        .text("scale", "-5");

    let response = convert(&base, form);

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(header(&response, "x-converted-width"), "1");
}

// =========================================================================
// Rejections
// =========================================================================

#[test]
fn missing_image_is_bad_request() {
    let base = default_server();
    let form = multipart::Form::new().text("quality", "80");

    let response = convert(&base, form);

    assert_eq!(response.status().as_u16(), 400);
    let body = json_body(response);
    assert_eq!(body["error"], "No image file provided");
}

#[test]
fn disallowed_type_is_bad_request() {
    let base = default_server();
    let form = multipart::Form::new().part("image", image_part(b"GIF89a".to_vec(), "image/gif"));

    let response = convert(&base, form);

    assert_eq!(response.status().as_u16(), 400);
    let body = json_body(response);
    assert!(body["error"].as_str().unwrap().starts_with("Unsupported file type"));
}

#[test]
fn oversized_upload_is_bad_request() {
    let mut config = WebpifyConfig::default();
    config.server.port = 0;
    config.server.max_upload_bytes = 1024;
    let base = start_server(config);
    let form = multipart::Form::new().part("image", image_part(vec![0u8; 4096], "image/png"));

    let response = convert(&base, form);

    assert_eq!(response.status().as_u16(), 400);
    let body = json_body(response);
    assert!(body["error"].as_str().unwrap().starts_with("File size exceeds"));
}

#[test]
fn large_form_without_image_is_missing_file() {
    let mut config = WebpifyConfig::default();
    config.server.port = 0;
    config.server.max_upload_bytes = 1024;
    let base = start_server(config);
    let form = multipart::Form::new()
        .text("notes", "x".repeat(200 * 1024))
        .text("quality", "80");

    let response = convert(&base, form);

    assert_eq!(response.status().as_u16(), 400);
    let body = json_body(response);
    assert_eq!(body["error"], "No image file provided");
}

#[test]
fn undecodable_upload_is_server_error() {
    let base = default_server();
    let form =
        multipart::Form::new().part("image", image_part(b"not a png".to_vec(), "image/png"));

    let response = convert(&base, form);

    assert_eq!(response.status().as_u16(), 500);
    let body = json_body(response);
    assert!(body["details"].is_string());
}

// =========================================================================
// Routing and CORS
// =========================================================================

#[test]
fn unknown_path_is_not_found() {
    let base = default_server();
    let response = Client::new().get(format!("{base}/nope")).send().unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[test]
fn get_on_convert_is_method_not_allowed() {
    let base = default_server();
    let response = Client::new()
        .get(format!("{base}/api/convert"))
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 405);
}

#[test]
fn preflight_answers_with_cors_headers() {
    let base = default_server();
    let response = Client::new()
        .request(reqwest::Method::OPTIONS, format!("{base}/api/convert"))
        .header("Origin", "http://example.test")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .unwrap();

    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
    assert!(header(&response, "access-control-allow-methods").contains("POST"));
}
