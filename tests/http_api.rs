use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use crowdwatch::api::{HttpApi, InferenceApi, VideoUpload};
use crowdwatch::{DetectionConfig, FeedId};

struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Serve exactly one request with a canned response.
fn serve_once(
    status: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let status = status.to_string();
    let headers: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");

        let mut captured_headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("header line");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                captured_headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        let length = captured_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        let mut request_body = vec![0u8; length];
        reader.read_exact(&mut request_body).expect("body");

        let mut response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            body.len()
        );
        for (key, value) in &headers {
            response.push_str(&format!("{}: {}\r\n", key, value));
        }
        response.push_str("\r\n");
        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).expect("write head");
        stream.write_all(&body).expect("write body");
        stream.flush().expect("flush");

        Captured {
            request_line: request_line.trim_end().to_string(),
            headers: captured_headers,
            body: request_body,
        }
    });
    (base, handle)
}

#[test]
fn health_reports_detector_type() {
    let (base, server) = serve_once(
        "200 OK",
        &[("Content-Type", "application/json")],
        br#"{"status":"healthy","detector_type":"yolov8"}"#.to_vec(),
    );
    let api = HttpApi::new(&base);
    let status = api.health().expect("health");
    assert_eq!(status.detector_type, "yolov8");
    assert_eq!(server.join().unwrap().request_line, "GET /health HTTP/1.1");
}

#[test]
fn video_analysis_uploads_multipart_form() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("entrance.mp4");
    std::fs::write(&clip, b"\x00\x00\x00\x18ftypmp42").unwrap();

    let response = br#"{
        "detection_timeline": [
            {"timestamp": 0.0, "people_count": 1, "avg_confidence": 0.9},
            {"timestamp": 2.0, "people_count": 3, "avg_confidence": 0.7}
        ],
        "total_detections": 4,
        "peak_occupancy": 3,
        "avg_confidence": 0.75,
        "confidence_distribution": {"high": 3, "medium": 1, "low": 0},
        "processing_stats": {"avg_processing_time": 0.02, "processing_fps": 50.0},
        "frames_processed": 60
    }"#;
    let (base, server) = serve_once(
        "200 OK",
        &[("Content-Type", "application/json")],
        response.to_vec(),
    );
    let api = HttpApi::new(&base);
    let analysis = api
        .analyze_video(&VideoUpload {
            feed_id: FeedId::new("feed2"),
            path: clip,
            mime: "video/mp4".to_string(),
            confidence: 0.45,
        })
        .expect("analysis");
    assert_eq!(analysis.peak_occupancy, 3);
    assert_eq!(analysis.detection_timeline.len(), 2);
    assert_eq!(analysis.duration(), Some(2.0));
    assert_eq!(analysis.confidence_distribution.high, 3);

    let captured = server.join().unwrap();
    assert_eq!(
        captured.request_line,
        "POST /detect/video/analyze HTTP/1.1"
    );
    assert!(captured
        .header("content-type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));
    let body = captured.body_text();
    assert!(body.contains("name=\"file\"; filename=\"entrance.mp4\""));
    assert!(body.contains("Content-Type: video/mp4"));
    assert!(body.contains("name=\"confidence\"\r\n\r\n0.45\r\n"));
    assert!(body.contains("name=\"feed_id\"\r\n\r\nfeed2\r\n"));
}

#[test]
fn server_error_detail_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("broken.mp4");
    std::fs::write(&clip, b"garbage").unwrap();

    let (base, server) = serve_once(
        "500 Internal Server Error",
        &[("Content-Type", "application/json")],
        br#"{"detail":"could not decode video"}"#.to_vec(),
    );
    let api = HttpApi::new(&base);
    let err = api
        .analyze_video(&VideoUpload {
            feed_id: FeedId::new("feed1"),
            path: clip,
            mime: "video/mp4".to_string(),
            confidence: 0.5,
        })
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("500"), "{message}");
    assert!(message.contains("could not decode video"), "{message}");
    server.join().unwrap();
}

#[test]
fn annotated_image_reads_people_count_header() {
    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("lobby.jpg");
    std::fs::write(&photo, b"\xff\xd8\xff\xe0jpeg").unwrap();

    let (base, server) = serve_once(
        "200 OK",
        &[("Content-Type", "image/jpeg"), ("X-People-Count", "7")],
        b"\xff\xd8annotated".to_vec(),
    );
    let api = HttpApi::new(&base);
    let annotated = api.annotate_image(&photo, 0.3).expect("annotate");
    assert_eq!(annotated.people_count, Some(7));
    assert_eq!(annotated.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(annotated.bytes, b"\xff\xd8annotated".to_vec());

    let captured = server.join().unwrap();
    assert_eq!(
        captured.request_line,
        "POST /detect/image/annotated HTTP/1.1"
    );
    assert!(captured.body_text().contains("Content-Type: image/jpeg"));
}

#[test]
fn stream_config_posts_json() {
    let (base, server) = serve_once(
        "200 OK",
        &[("Content-Type", "application/json")],
        br#"{"status":"updated"}"#.to_vec(),
    );
    let api = HttpApi::new(&base);
    api.push_stream_config(&DetectionConfig {
        confidence: 0.65,
        max_people: 12,
        alert_enabled: false,
        ..DetectionConfig::default()
    })
    .expect("push config");

    let captured = server.join().unwrap();
    assert_eq!(captured.request_line, "POST /stream/config HTTP/1.1");
    let body: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(body["alert_config"]["max_people"], 12);
    assert_eq!(body["alert_config"]["alert_enabled"], false);
    assert_eq!(body["realtime_mode"], true);
    assert!((body["confidence"].as_f64().unwrap() - 0.65).abs() < 1e-6);
}

#[test]
fn unreachable_service_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let api = HttpApi::new(&base);
    assert!(api.health().is_err());
}
