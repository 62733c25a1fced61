//! Integration tests for SafetyClient against a local stub server.
//!
//! The stub accepts one connection per canned response, records the raw
//! request, and answers with a fixed JSON body.

use std::sync::{Arc, Mutex};

use guardian_core::{AlertStatus, GeoPoint, TriggerMethod};
use safety_api::{ApiError, BackendConfig, ContactPayload, NewAlert, SafetyBackend, SafetyClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct Stub {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

async fn stub(responses: Vec<(u16, &'static str)>) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            recorded.lock().unwrap().push(request);

            let reply = format!(
                "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });

    Stub {
        base_url: format!("http://{addr}/safewomen/api"),
        requests,
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let lower = line.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return text;
            }
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

fn client(stub: &Stub) -> SafetyClient {
    SafetyClient::new(BackendConfig::new(stub.base_url.clone()).with_token("tok-123")).unwrap()
}

#[tokio::test]
async fn test_create_alert_sends_form_and_reads_id() {
    let stub = stub(vec![(200, r#"{"success": true, "message": "ok", "alert": {"id": "A1"}}"#)]).await;
    let client = client(&stub);

    let alert = NewAlert::active(
        TriggerMethod::Shake,
        Some(GeoPoint::new(40.5, -74.25)),
        Some("1 Main St".to_string()),
    );
    let id = client.create_alert("user-7", &alert).await.unwrap();
    assert_eq!(id, "A1");

    let requests = stub.requests.lock().unwrap();
    let request = &requests[0];
    assert!(request.starts_with("POST /safewomen/api/create_alert.php"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer tok-123"));
    assert!(request.contains("type=shake_detection"));
    assert!(request.contains("status=active"));
    assert!(request.contains("user_id=user-7"));
    assert!(request.contains("latitude=40.5"));
}

#[tokio::test]
async fn test_rejection_and_server_error() {
    let stub = stub(vec![
        (200, r#"{"success": false, "message": "Unknown alert"}"#),
        (503, r#"{"success": false}"#),
    ])
    .await;
    let client = client(&stub);

    let rejected = client
        .update_alert_status("A9", AlertStatus::Cancelled, "user-7")
        .await
        .unwrap_err();
    assert!(matches!(rejected, ApiError::Rejected { .. }));
    assert!(!rejected.is_transient());

    let unavailable = client.delete_contact("5").await.unwrap_err();
    assert!(matches!(unavailable, ApiError::Status { code: 503, .. }));
    assert!(unavailable.is_transient());
}

#[tokio::test]
async fn test_contact_round_trip_uses_flag_encoding() {
    let stub = stub(vec![
        (200, r#"{"success": true, "contact": {"id": 31}}"#),
        (
            200,
            r#"{"success": true, "contacts": [{"id": "31", "name": "Maya", "phone": "+1555", "relationship": "Sister", "is_primary": "1"}]}"#,
        ),
    ])
    .await;
    let client = client(&stub);

    let payload = ContactPayload {
        name: "Maya".to_string(),
        phone: "+1555".to_string(),
        relationship: "Sister".to_string(),
        is_primary: true,
    };
    assert_eq!(client.add_contact(&payload).await.unwrap(), "31");

    let contacts = client.contacts().await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert!(contacts[0].is_primary);

    let requests = stub.requests.lock().unwrap();
    assert!(requests[0].contains("is_primary=1"));
    assert!(requests[1].starts_with("GET /safewomen/api/get_contacts.php"));
}

#[tokio::test]
async fn test_unreachable_backend_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = SafetyClient::new(BackendConfig::new(format!("http://{addr}/api"))).unwrap();
    let err = client.health_check().await.unwrap_err();
    assert!(err.is_transient());
}
