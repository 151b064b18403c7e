use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

use attendance_kiosk::api::{ApiError, AttendanceApi, HttpApi, RecognizeRequest, StartSessionRequest};
use attendance_kiosk::{KioskConfig, ReportFilter};

struct Reply {
    status: u16,
    content_type: &'static str,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl Reply {
    fn json(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            headers: Vec::new(),
            body: format!("status {}", status),
        }
    }

    fn redirect(location: String) -> Self {
        Self {
            status: 302,
            content_type: "text/html",
            headers: vec![("Location", location)],
            body: String::new(),
        }
    }
}

/// Raw request text (request line, headers, body) as received.
type Log = Arc<Mutex<Vec<String>>>;

struct FakeServer {
    base: String,
    log: Log,
}

impl FakeServer {
    fn start<F>(route: F) -> Self
    where
        F: Fn(&str, &str, &str) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&log);
        let origin = base.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    continue;
                };
                handle(stream, &origin, &route, &seen);
            }
        });
        Self { base, log }
    }

    fn config(&self) -> KioskConfig {
        let mut cfg = KioskConfig::default();
        cfg.base_url = self.base.clone();
        cfg
    }

    fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

fn handle<F>(mut stream: TcpStream, origin: &str, route: &F, log: &Log)
where
    F: Fn(&str, &str, &str) -> Reply,
{
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut head = String::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        if line == "\r\n" {
            break;
        }
        if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        head.push_str(&line);
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).expect("read body");
    let body = String::from_utf8_lossy(&body).to_string();

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    log.lock().unwrap().push(format!("{}\r\n{}", head, body));

    let mut reply = route(&method, &target, &body);
    for (_, value) in reply.headers.iter_mut() {
        if value.starts_with('/') {
            *value = format!("{}{}", origin, value);
        }
    }
    let mut response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.content_type,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(&reply.body);
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[test]
fn scraped_csrf_token_is_sent_on_mutations() {
    let server = FakeServer::start(|method, target, _| match (method, target) {
        ("GET", "/attendance") => Reply::html(
            r#"<html><head><meta name="csrf-token" content="tok-abc"></head></html>"#,
        ),
        ("POST", "/api/start_session") => Reply::json(r#"{"success": true, "session_id": 7}"#),
        _ => Reply::status(404),
    });
    let mut api = HttpApi::new(&server.config()).unwrap();
    api.ensure_csrf_token().unwrap();
    assert!(api.has_csrf_token());

    let response = api
        .start_session(&StartSessionRequest::new("CS-A", "12", 15))
        .unwrap();
    assert!(response.success);
    assert_eq!(response.session_id.unwrap().as_str(), "7");

    let requests = server.requests();
    let post = requests
        .iter()
        .find(|r| r.starts_with("POST /api/start_session"))
        .expect("start request");
    assert!(post.to_ascii_lowercase().contains("x-csrftoken: tok-abc"));
    assert!(post.contains(r#""duration_minutes":15"#));
    assert!(post.contains(r#""duration":15"#));
}

#[test]
fn html_session_status_means_inactive() {
    let server = FakeServer::start(|_, _, _| Reply::html("<html>login</html>"));
    let api = HttpApi::new(&server.config()).unwrap();
    let status = api.session_status().unwrap();
    assert!(!status.active);
    assert!(status.session_id.is_none());
}

#[test]
fn active_session_status_is_parsed() {
    let server = FakeServer::start(|_, _, _| {
        Reply::json(
            r#"{"active": true, "session_id": 3, "class_name": "CS-A",
                "subject_id": "9", "status": "Active", "remaining_minutes": 4.5}"#,
        )
    });
    let api = HttpApi::new(&server.config()).unwrap();
    let status = api.session_status().unwrap();
    assert!(status.active);
    assert_eq!(status.class_name.as_deref(), Some("CS-A"));
    assert_eq!(status.remaining_minutes, 4.5);
}

#[test]
fn unauthorized_recognition_is_an_auth_failure() {
    let server = FakeServer::start(|_, _, _| Reply::status(401));
    let api = HttpApi::new(&server.config()).unwrap();
    let err = api
        .recognize_face(&RecognizeRequest {
            image: "data:image/jpeg;base64,AAAA".into(),
            class_name: "CS-A".into(),
            subject_id: "1".into(),
        })
        .unwrap_err();
    assert_eq!(err, ApiError::Unauthenticated);
}

#[test]
fn login_redirect_is_an_auth_failure() {
    let server = FakeServer::start(|_, target, _| {
        if target.starts_with("/login") {
            Reply::html("<form>sign in</form>")
        } else {
            Reply::redirect("/login?next=%2Fattendance".to_string())
        }
    });
    let api = HttpApi::new(&server.config()).unwrap();
    let err = api.get_attendance(&ReportFilter::default()).unwrap_err();
    assert!(err.is_auth());
}

#[test]
fn server_errors_are_transient() {
    let server = FakeServer::start(|_, _, _| Reply::status(500));
    let api = HttpApi::new(&server.config()).unwrap();
    let err = api
        .end_session(&attendance_kiosk::SessionId::new("4"))
        .unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 500, .. }));
    assert!(!err.is_auth());
}

#[test]
fn report_filter_becomes_the_query() {
    let server = FakeServer::start(|_, _, _| {
        Reply::json(
            r#"{"success": true, "data": [
                {"date": "2026-10-19", "time": "09:01:00", "lecture_number": 2,
                 "student_name": "Alice", "enrollment_number": "E1",
                 "class_name": "CS-A", "status": "Present", "faculty_name": "Dr. Rao"}
            ]}"#,
        )
    });
    let api = HttpApi::new(&server.config()).unwrap();
    let filter = ReportFilter::new(None, Some("2026-10-19"), Some("CS-A"));
    let report = api.get_attendance(&filter).unwrap();
    assert_eq!(report.data.len(), 1);
    assert_eq!(report.data[0].lecture_number, "2");
    assert!(report.data[0].is_present());

    let requests = server.requests();
    assert!(requests[0].starts_with("GET /api/get_attendance?end_date=2026-10-19&class_name=CS-A "));
}
