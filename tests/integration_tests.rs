//! Integration tests for the aria-chat client.
//! Each test runs the client against a small HTTP server on a loopback port.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use aria_chat::store::SessionStore;
    use aria_chat::{AriaClient, Attachment, ClientLogger, Error, RequestFormat, Session};
    use bytes::Bytes;
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Request {
        method: String,
        target: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    impl Request {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        fn path(&self) -> &str {
            self.target.split('?').next().unwrap_or("")
        }

        fn query(&self, key: &str) -> Option<String> {
            let url = url::Url::parse(&format!("http://test{}", self.target)).ok()?;
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        }

        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    struct Reply {
        status: u16,
        content_type: &'static str,
        chunks: Vec<String>,
    }

    impl Reply {
        fn json(status: u16, body: Value) -> Self {
            Self {
                status,
                content_type: "application/json",
                chunks: vec![body.to_string()],
            }
        }

        fn text_stream(chunks: &[&str]) -> Self {
            Self {
                status: 200,
                content_type: "text/plain; charset=utf-8",
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
            }
        }

        fn no_content() -> Self {
            Self {
                status: 204,
                content_type: "",
                chunks: Vec::new(),
            }
        }
    }

    type Handler = dyn Fn(&Request) -> Reply + Send + Sync;

    struct FakeServer {
        base_url: String,
        requests: Arc<Mutex<Vec<Request>>>,
    }

    impl FakeServer {
        async fn start(handler: impl Fn(&Request) -> Reply + Send + Sync + 'static) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let handler: Arc<Handler> = Arc::new(handler);
            let seen = Arc::clone(&requests);
            tokio::spawn(async move {
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        return;
                    };
                    let handler = Arc::clone(&handler);
                    let seen = Arc::clone(&seen);
                    tokio::spawn(async move {
                        let _ = serve(socket, handler, seen).await;
                    });
                }
            });
            Self { base_url, requests }
        }

        fn client(&self) -> AriaClient {
            AriaClient::with_options(Some(self.base_url.clone()), Some(Duration::from_secs(5)))
                .unwrap()
        }

        fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn serve(
        mut socket: TcpStream,
        handler: Arc<Handler>,
        seen: Arc<Mutex<Vec<Request>>>,
    ) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = socket.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap_or("").split(' ');
        let method = request_line.next().unwrap_or("").to_string();
        let target = request_line.next().unwrap_or("").to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        let mut body = buf[head_end..].to_vec();
        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok());
        let chunked = headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.contains("chunked"));
        loop {
            let complete = match length {
                Some(length) => body.len() >= length,
                None => !chunked || body.ends_with(b"0\r\n\r\n"),
            };
            if complete {
                break;
            }
            let n = socket.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }

        let request = Request {
            method,
            target,
            headers,
            body,
        };
        let reply = handler(&request);
        seen.lock().unwrap().push(request);

        let reason = match reply.status {
            200 => "OK",
            204 => "No Content",
            404 => "Not Found",
            _ => "Internal Server Error",
        };
        if reply.status == 204 {
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                .await?;
            return socket.shutdown().await;
        }
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
            reply.status, reason, reply.content_type
        );
        socket.write_all(head.as_bytes()).await?;
        socket.flush().await?;
        for piece in &reply.chunks {
            let frame = format!("{:x}\r\n{}\r\n", piece.len(), piece);
            socket.write_all(frame.as_bytes()).await?;
            socket.flush().await?;
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        socket.write_all(b"0\r\n\r\n").await?;
        socket.shutdown().await
    }

    fn message(id: usize, role: &str) -> Value {
        json!({
            "id": format!("m{id}"),
            "role": role,
            "content": format!("message {id}"),
            "timestamp": format!("2024-05-01T10:{:02}:00Z", id),
        })
    }

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<String>>,
    }

    impl ClientLogger for RecordingLogger {
        fn log_request(&self, method: &str, path: &str) {
            self.lines.lock().unwrap().push(format!("{method} {path}"));
        }

        fn log_stream_chunk(&self, _session_id: &str, delta: &str) {
            self.lines.lock().unwrap().push(format!("chunk {delta}"));
        }

        fn log_stream_complete(&self, session_id: &str, text: &str) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("done {session_id} {text}"));
        }
    }

    #[tokio::test]
    async fn test_streamed_reply_arrives_in_order() {
        let server =
            FakeServer::start(|_| Reply::text_stream(&["Hel", "lo ", "world"])).await;
        let logger = Arc::new(RecordingLogger::default());
        let client = server.client().with_logger(logger.clone());

        let mut deltas = String::new();
        let mut snapshots: Vec<String> = Vec::new();
        let mut on_chunk = |delta: &str, accumulated: &str| {
            deltas.push_str(delta);
            snapshots.push(accumulated.to_string());
        };
        let reply = client
            .send_message("s1", "hi", &[], Some(&mut on_chunk))
            .await
            .unwrap();

        assert_eq!(reply, "Hello world");
        assert_eq!(deltas, "Hello world");
        assert_eq!(snapshots.last().map(String::as_str), Some("Hello world"));
        for pair in snapshots.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
        }

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path(), "/api/sessions/s1/messages");
        let body = requests[0].json();
        assert_eq!(body["content"], "hi");
        assert_eq!(body["role"], "user");

        let lines = logger.lines.lock().unwrap().clone();
        assert_eq!(lines.first().map(String::as_str), Some("POST /api/sessions/s1/messages"));
        assert_eq!(lines.last().map(String::as_str), Some("done s1 Hello world"));
    }

    #[tokio::test]
    async fn test_reply_without_handler_is_read_whole() {
        let server = FakeServer::start(|_| Reply::text_stream(&["all ", "at ", "once"])).await;
        let reply = server
            .client()
            .send_message("s1", "hi", &[], None)
            .await
            .unwrap();
        assert_eq!(reply, "all at once");
    }

    #[tokio::test]
    async fn test_multibyte_text_split_across_chunks() {
        let server = FakeServer::start(|_| Reply {
            status: 200,
            content_type: "text/plain; charset=utf-8",
            chunks: vec!["caf".to_string(), "é ☕".to_string()],
        })
        .await;
        let mut seen = Vec::new();
        let mut on_chunk = |_: &str, accumulated: &str| seen.push(accumulated.to_string());
        let reply = server
            .client()
            .send_message("s1", "order", &[], Some(&mut on_chunk))
            .await
            .unwrap();
        assert_eq!(reply, "café ☕");
        assert!(seen.iter().all(|s| !s.contains('\u{FFFD}')));
    }

    #[tokio::test]
    async fn test_attachments_switch_to_multipart() {
        let server = FakeServer::start(|_| Reply::text_stream(&["thanks"])).await;
        let attachment = Attachment::new("notes.txt", "text/plain", Bytes::from_static(b"remember"));
        server
            .client()
            .send_message("s1", "see file", &[attachment], None)
            .await
            .unwrap();

        let request = &server.requests()[0];
        let content_type = request.header("content-type").unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains("name=\"content\""));
        assert!(body.contains("see file"));
        assert!(body.contains("filename=\"notes.txt\""));
        assert!(body.contains("remember"));
    }

    #[tokio::test]
    async fn test_json_format_sends_file_references() {
        let server = FakeServer::start(|_| Reply::text_stream(&["ok"])).await;
        let attachment = Attachment::new("a.png", "image/png", Bytes::from_static(b"\x89PNG"));
        server
            .client()
            .with_request_format(RequestFormat::Json)
            .send_message("s1", "look", &[attachment], None)
            .await
            .unwrap();

        let body = server.requests()[0].json();
        assert_eq!(body["files"][0]["name"], "a.png");
        assert_eq!(body["files"][0]["size"], 4);
        assert_eq!(body["files"][0]["type"], "image/png");
    }

    #[tokio::test]
    async fn test_pages_cover_history_without_gaps() {
        let history: Vec<Value> = (0..7)
            .map(|i| message(i, if i % 2 == 0 { "user" } else { "assistant" }))
            .collect();
        let server = FakeServer::start(move |request| {
            let limit: usize = request.query("limit").unwrap().parse().unwrap();
            let end = request
                .query("cursor")
                .map_or(history.len(), |c| c.parse().unwrap());
            let start = end.saturating_sub(limit);
            Reply::json(
                200,
                json!({
                    "messages": history[start..end],
                    "has_more": start > 0,
                    "next_cursor": if start > 0 { Some(start.to_string()) } else { None },
                }),
            )
        })
        .await;
        let client = server.client();

        let mut store = SessionStore::new();
        store.insert(Session::new("s1", "History"));
        let latest = client.paginated_messages("s1", 3, None).await.unwrap();
        store.apply_latest_page("s1", latest).unwrap();
        loop {
            let session = store.get("s1").unwrap();
            if !session.has_more {
                break;
            }
            let cursor = session.next_cursor.clone();
            let page = client
                .paginated_messages("s1", 3, cursor.as_deref())
                .await
                .unwrap();
            store.prepend_older("s1", page).unwrap();
        }

        let ids: Vec<String> = store
            .get("s1")
            .unwrap()
            .messages
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let expected: Vec<String> = (0..7).map(|i| format!("m{i}")).collect();
        assert_eq!(ids, expected);

        let cursors: Vec<Option<String>> = server
            .requests()
            .iter()
            .map(|r| r.query("cursor"))
            .collect();
        assert_eq!(
            cursors,
            vec![None, Some("4".to_string()), Some("1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_error_detail_is_surfaced() {
        let server = FakeServer::start(|request| match request.path() {
            "/api/sessions/metadata" => Reply::json(500, json!({"detail": "model offline"})),
            _ => Reply::json(404, json!({"detail": "Session not found"})),
        })
        .await;
        let client = server.client();

        let err = client.session_metadata().await.unwrap_err();
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.detail(), "model offline");

        let err = client
            .send_message("missing", "hi", &[], None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.detail(), "Session not found");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = AriaClient::new(Some(base_url)).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let server = FakeServer::start(|request| match (request.method.as_str(), request.path()) {
            ("POST", "/api/sessions") => Reply::json(
                200,
                json!({
                    "id": "s9",
                    "name": request.json()["name"],
                    "created": "2024-05-01T10:00:00.123456",
                }),
            ),
            ("DELETE", _) => Reply::no_content(),
            ("GET", "/api/health") => Reply::json(
                200,
                json!({"status": "ok", "model": "ready", "uptime": 42, "timestamp": "2024-05-01T10:00:00Z"}),
            ),
            _ => Reply::json(404, json!({"detail": "Not Found"})),
        })
        .await;
        let client = server.client();

        let created = client.create_session(Some("Happy Otter")).await.unwrap();
        assert_eq!(created.id, "s9");
        assert_eq!(created.name.as_deref(), Some("Happy Otter"));
        assert!(!created.is_protected);

        tokio_test::assert_ok!(client.delete_session("s9").await);
        tokio_test::assert_ok!(client.delete_message("s9", "m1").await);

        let health = client.health().await.unwrap();
        assert!(health.is_ok());
        assert_eq!(health.uptime, 42);

        let paths: Vec<String> = server
            .requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path()))
            .collect();
        assert_eq!(
            paths,
            vec![
                "POST /api/sessions",
                "DELETE /api/sessions/s9",
                "DELETE /api/sessions/s9/messages/m1",
                "GET /api/health",
            ]
        );
    }

    #[tokio::test]
    async fn test_search_and_passwords() {
        let server = FakeServer::start(|request| match (request.method.as_str(), request.path()) {
            ("GET", "/api/sessions/search") => Reply::json(
                200,
                json!([{
                    "message": message(3, "assistant"),
                    "session_name": "Sleepy Taco",
                    "session_id": "s1",
                }]),
            ),
            ("PUT", "/api/sessions/s1/password") => {
                Reply::json(200, json!({"success": true, "message": "Password set"}))
            }
            ("POST", "/api/sessions/s1/validate") => {
                let valid = request.json()["password"] == "secret";
                Reply::json(200, json!({"valid": valid}))
            }
            _ => Reply::json(404, json!({"detail": "Not Found"})),
        })
        .await;
        let client = server.client();

        let results = client.search_messages("lifetimes & borrows").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_id, "s1");
        assert_eq!(results[0].message.id, "m3");
        assert_eq!(
            server.requests()[0].query("q").as_deref(),
            Some("lifetimes & borrows")
        );

        let response = client
            .set_session_password("s1", "", "secret")
            .await
            .unwrap();
        assert!(response.success);
        let put = server.requests()[1].json();
        assert_eq!(put["new_password"], "secret");

        assert!(client.validate_session_password("s1", "secret").await.unwrap().valid);
        assert!(!client.validate_session_password("s1", "guess").await.unwrap().valid);
    }
}
