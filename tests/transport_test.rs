//! Integration tests for the HTTP transport against a local one-shot
//! HTTP server: cookies, the temporary-session marker and multipart parts.

use miva_deploy::transport::{prepare, FormRequest, HttpTransport, Transport};
use miva_deploy::{upload_module, Credentials, Logger, SessionManager};
use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

struct Reply {
    headers: &'static str,
    body: &'static str,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one request: headers, then a Content-Length or chunked body.
fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .map(|v| v.trim().parse::<usize>().unwrap());
    let chunked = head.contains("transfer-encoding: chunked");

    loop {
        let body = &buf[header_end..];
        let done = match content_length {
            Some(len) => body.len() >= len,
            None if chunked => body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if done {
            break;
        }
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve `replies` one connection each and hand back the raw requests.
fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        for reply in replies {
            let (mut stream, _) = listener.accept().unwrap();
            requests.push(read_request(&mut stream));
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n{}\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.headers,
                reply.body.len(),
                reply.body
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
        }
        requests
    });
    (base, handle)
}

fn credentials(store_url: &str) -> Credentials {
    Credentials {
        username: "admin".into(),
        password: "secret".into(),
        store_url: store_url.into(),
        store_code: "1111".into(),
        json_url: None,
    }
}

fn has_cookie(request: &str, cookie: &str) -> bool {
    request
        .lines()
        .any(|l| l.to_lowercase().starts_with("cookie:") && l.contains(cookie))
}

#[test]
fn upload_reuses_login_cookie_and_sends_module_file() {
    let (base, server) = serve(vec![
        Reply {
            headers: "Set-Cookie: htscallerid=abc; Path=/\r\n",
            body: "<script>var Session_ID = 'tok';</script>",
        },
        Reply {
            headers: "",
            body: "<script>opener.Refresh(); window.close();</script>",
        },
    ]);

    let temp = TempDir::new().unwrap();
    let module = temp.path().join("mod.mvc");
    fs::write(&module, "compiled module bytes").unwrap();

    let mut session = SessionManager::new(
        credentials(&base),
        HttpTransport::new().unwrap(),
        Logger::new("test"),
    );
    let outcome = upload_module(&mut session, "spocustom", &module).unwrap();
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(session.token(), Some("tok"));

    let requests = server.join().unwrap();
    assert_eq!(requests.len(), 2);

    let login = &requests[0];
    assert!(login.starts_with("POST /mm5/admin.mvc?temporarysession=1 "));
    assert!(login.contains("name=\"Username\""));

    let upload = &requests[1];
    assert!(upload.starts_with("POST /mm5/admin.mvc "), "{upload}");
    assert!(!upload.contains("temporarysession"));
    assert!(has_cookie(upload, "htscallerid=abc"));
    assert!(upload.contains("name=\"FileUpload_File\"; filename=\"mod.mvc\""));
    assert!(upload
        .to_lowercase()
        .contains("content-type: application/octet-stream"));
    assert!(upload.contains("compiled module bytes"));
    assert!(!upload.contains("name=\"Password\""));
}

#[test]
fn reset_drops_cookies() {
    let (base, server) = serve(vec![
        Reply {
            headers: "Set-Cookie: htscallerid=abc; Path=/\r\n",
            body: "first",
        },
        Reply {
            headers: "",
            body: "second",
        },
        Reply {
            headers: "",
            body: "third",
        },
    ]);

    let creds = credentials(&base);
    let request = FormRequest::new("/mm5/admin.mvc").text("Action", "PING");
    let prepared = prepare(&request, &creds, Some("tok"), false).unwrap();

    let mut transport = HttpTransport::new().unwrap();
    assert_eq!(transport.send(&prepared).unwrap().body, "first");
    assert_eq!(transport.send(&prepared).unwrap().body, "second");
    transport.reset().unwrap();
    assert_eq!(transport.send(&prepared).unwrap().body, "third");

    let requests = server.join().unwrap();
    assert!(!has_cookie(&requests[0], "htscallerid"));
    assert!(has_cookie(&requests[1], "htscallerid=abc"));
    assert!(!has_cookie(&requests[2], "htscallerid"));
}
