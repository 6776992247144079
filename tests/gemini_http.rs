//! Gemini backend against a local fake `generateContent` endpoint.
//!
//! A one-shot TCP server captures the HTTP request and answers with a canned
//! body, so the exact wire format can be checked without network access.

use edgequake_landcover::{
    AnalysisError, AnalyzerConfig, Category, UploadedFile, Workspace, WorkspaceError,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Value,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serve exactly one request, answer with `status` and `reply`.
async fn serve_once(status: u16, reply: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/v1beta", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers were complete");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8(buf[..header_end].to_vec()).unwrap();
        let mut lines = head.split("\r\n").filter(|l| !l.is_empty());
        let request_line = lines.next().unwrap().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        let content_length: usize = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.parse().unwrap())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body was complete");
            buf.extend_from_slice(&chunk[..n]);
        }
        let body: Value = serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap();

        let reason = if status == 200 { "OK" } else { "Error" };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
            reply.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        Captured {
            request_line,
            headers,
            body,
        }
    });

    (base_url, handle)
}

fn candidate(text: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 1290, "candidatesTokenCount": 96}
    })
    .to_string()
}

fn workspace(base_url: &str) -> Workspace {
    let config = AnalyzerConfig::builder()
        .api_key("test-key")
        .gemini_base_url(base_url)
        .build()
        .unwrap();
    Workspace::new(config).unwrap()
}

fn plan() -> UploadedFile {
    UploadedFile::new("plan.png", "image/png", vec![0x89, b'P', b'N', b'G'])
}

#[tokio::test]
async fn request_carries_key_prompt_image_and_schema() {
    let reply = r#"[{"category":"GREEN_OPEN_SPACE","description":"lawn","percentage":60},
                    {"category":"TREES_AND_SHRUBS","description":"trees","percentage":40}]"#;
    let (base_url, server) = serve_once(200, candidate(reply)).await;

    let ws = workspace(&base_url);
    ws.upload_file(plan()).await.unwrap();
    let breakdown = ws.analyze().await.unwrap();
    assert_eq!(breakdown.entries[0].category, Category::GreenOpenSpace);
    assert_eq!(breakdown.total_percentage, 100.0);

    let req = server.await.unwrap();
    assert_eq!(
        req.request_line,
        "POST /v1beta/models/gemini-2.5-flash:generateContent HTTP/1.1"
    );
    assert_eq!(req.header("x-goog-api-key"), Some("test-key"));

    let parts = req.body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert!(parts[0]["text"].as_str().unwrap().contains("TREES_AND_SHRUBS"));
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    assert_eq!(parts[1]["inlineData"]["data"], "iVBORw==");

    let gc = &req.body["generationConfig"];
    assert!((gc["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    assert_eq!(gc["responseMimeType"], "application/json");
    let required: Vec<&str> = gc["responseSchema"]["items"]["required"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(required, vec!["category", "description", "percentage"]);
}

#[tokio::test]
async fn http_error_is_classification_failure() {
    let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
    let (base_url, server) = serve_once(403, body.to_string()).await;

    let ws = workspace(&base_url);
    ws.upload_file(plan()).await.unwrap();
    let err = ws.analyze().await.unwrap_err();
    server.await.unwrap();

    match err {
        WorkspaceError::Analysis(AnalysisError::ClassificationFailed { message }) => {
            assert!(message.contains("403"), "got: {message}");
            assert!(message.contains("API key not valid"), "got: {message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        ws.snapshot().error(),
        Some("Analysis failed. Please try another file.")
    );
}

#[tokio::test]
async fn non_array_reply_is_invalid_format() {
    let (base_url, server) = serve_once(200, candidate(r#"{"category":"GREEN_OPEN_SPACE"}"#)).await;

    let ws = workspace(&base_url);
    ws.upload_file(plan()).await.unwrap();
    let err = ws.analyze().await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(
        err,
        WorkspaceError::Analysis(AnalysisError::InvalidResponseFormat { .. })
    ));
}

#[test]
fn missing_key_is_a_startup_error() {
    let err = AnalyzerConfig::from_lookup(|_| None).unwrap_err();
    assert!(matches!(err, AnalysisError::MissingApiKey { ref var } if var == "GEMINI_API_KEY"));

    let err = AnalyzerConfig::from_lookup(|var| (var == "GEMINI_API_KEY").then(|| "  ".to_string())).unwrap_err();
    assert!(matches!(err, AnalysisError::MissingApiKey { .. }));
}
