//! HTTP surface integration tests: start the server on an ephemeral localhost
//! port and exercise the file API end to end with a real client.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dendrite::files::{Root, Service};
use dendrite::server::{build_router, AppState, JSON_API_CONTENT_TYPE};

fn root(virtual_name: &str, source: &Path) -> Root {
    Root {
        virtual_name: virtual_name.to_string(),
        source: source.to_path_buf(),
    }
}

fn write_files(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), format!("contents of {name}")).unwrap();
    }
}

// Start the server bound to an ephemeral localhost port. The listener is
// already accepting when this returns; callers abort the handle to stop it.
async fn start_server(roots: Vec<Root>) -> (JoinHandle<()>, SocketAddr) {
    let service = Service::new(roots).expect("construct service");
    let state = AppState {
        files: Arc::new(service),
        shutdown: CancellationToken::new(),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("server task error: {e:?}");
        }
    });

    (handle, addr)
}

fn entry_names(doc: &serde_json::Value) -> Vec<String> {
    doc["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|r| r["attributes"]["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn ping_returns_pong_document() {
    let tmp = TempDir::new().unwrap();
    let (handle, addr) = start_server(vec![root("/docs", tmp.path())]).await;

    let resp = reqwest::get(format!("http://{addr}/api/v1/ping"))
        .await
        .expect("request ping");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()[reqwest::header::CONTENT_TYPE],
        JSON_API_CONTENT_TYPE
    );
    let doc: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(doc["data"]["type"], "ping");
    assert_eq!(doc["data"]["attributes"]["message"], "pong");

    handle.abort();
}

#[tokio::test]
async fn collection_lists_configured_roots() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let (handle, addr) =
        start_server(vec![root("/beta", b.path()), root("/alpha", a.path())]).await;

    let resp = reqwest::get(format!("http://{addr}/api/v1/files"))
        .await
        .expect("request collection");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()[reqwest::header::CONTENT_TYPE],
        JSON_API_CONTENT_TYPE
    );
    let doc: serde_json::Value = resp.json().await.unwrap();
    // Default sort is by name, so configuration order does not leak through.
    assert_eq!(entry_names(&doc), vec!["alpha", "beta"]);
    assert_eq!(doc["data"][0]["attributes"]["resource_kind"], "folder");
    assert_eq!(doc["data"][0]["id"], "/alpha");
    assert!(doc["data"][0]["attributes"]["size_bytes"].is_null());
    assert_eq!(doc["meta"]["total_count"], 2);

    handle.abort();
}

#[tokio::test]
async fn single_slash_root_lists_contents_directly() {
    let tmp = TempDir::new().unwrap();
    write_files(tmp.path(), &["a.txt", "b.txt"]);
    let (handle, addr) = start_server(vec![root("/", tmp.path())]).await;

    let resp = reqwest::get(format!("http://{addr}/api/v1/files"))
        .await
        .expect("request collection");
    assert_eq!(resp.status(), 200);
    let doc: serde_json::Value = resp.json().await.unwrap();
    let names = entry_names(&doc);
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    assert!(!names.contains(&"/".to_string()));
    assert_eq!(doc["data"][0]["id"], "/a.txt");

    handle.abort();
}

#[tokio::test]
async fn descending_name_sort_over_directory() {
    let tmp = TempDir::new().unwrap();
    write_files(tmp.path(), &["alpha.txt", "zebra.txt"]);
    let (handle, addr) = start_server(vec![root("/docs", tmp.path())]).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/api/v1/files/docs"))
        .query(&[("sort", "-name")])
        .send()
        .await
        .expect("request listing");
    assert_eq!(resp.status(), 200);
    let doc: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(entry_names(&doc), vec!["zebra.txt", "alpha.txt"]);
    // Non-default sorts are carried through every navigation link.
    assert_eq!(
        doc["links"]["self"],
        "/api/v1/files/docs?page[offset]=0&page[limit]=200&sort=-name"
    );

    handle.abort();
}

#[tokio::test]
async fn pagination_window_with_navigation_links() {
    let tmp = TempDir::new().unwrap();
    let names: Vec<String> = (0..10).map(|i| format!("{i}.txt")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    write_files(tmp.path(), &refs);
    let (handle, addr) = start_server(vec![root("/docs", tmp.path())]).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/api/v1/files/docs"))
        .query(&[("page[limit]", "3"), ("page[offset]", "3")])
        .send()
        .await
        .expect("request listing");
    assert_eq!(resp.status(), 200);
    let doc: serde_json::Value = resp.json().await.unwrap();

    assert_eq!(entry_names(&doc), vec!["3.txt", "4.txt", "5.txt"]);
    assert_eq!(doc["meta"]["total_count"], 10);
    assert_eq!(doc["meta"]["offset"], 3);
    assert_eq!(doc["meta"]["limit"], 3);
    assert_eq!(
        doc["links"]["prev"],
        "/api/v1/files/docs?page[offset]=0&page[limit]=3"
    );
    assert_eq!(
        doc["links"]["next"],
        "/api/v1/files/docs?page[offset]=6&page[limit]=3"
    );
    assert_eq!(
        doc["links"]["last"],
        "/api/v1/files/docs?page[offset]=9&page[limit]=3"
    );

    handle.abort();
}

#[tokio::test]
async fn invalid_query_parameters_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let (handle, addr) = start_server(vec![root("/docs", tmp.path())]).await;

    let client = reqwest::Client::new();
    let cases: Vec<(&str, &str)> = vec![
        ("page[limit]", "501"),
        ("page[limit]", "0"),
        ("page[limit]", "abc"),
        ("page[offset]", "-1"),
        ("sort", "unknown_field"),
        ("sort", "name,size_bytes"),
    ];
    for (key, value) in cases {
        let resp = client
            .get(format!("http://{addr}/api/v1/files/docs"))
            .query(&[(key, value)])
            .send()
            .await
            .expect("request listing");
        assert_eq!(resp.status(), 400, "{key}={value}");
        let doc: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(doc["errors"][0]["status"], "400", "{key}={value}");
        assert!(doc["errors"][0]["detail"].is_string());
    }

    handle.abort();
}

#[tokio::test]
async fn file_download_streams_content() {
    let tmp = TempDir::new().unwrap();
    write_files(tmp.path(), &["note.txt"]);
    let (handle, addr) = start_server(vec![root("/docs", tmp.path())]).await;

    let resp = reqwest::get(format!("http://{addr}/api/v1/files/docs/note.txt"))
        .await
        .expect("request file");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()[reqwest::header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert!(resp.headers().get(reqwest::header::CONTENT_DISPOSITION).is_none());
    assert_eq!(resp.text().await.unwrap(), "contents of note.txt");

    let resp = reqwest::get(format!(
        "http://{addr}/api/v1/files/docs/note.txt?download=1"
    ))
    .await
    .expect("request download");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()[reqwest::header::CONTENT_DISPOSITION],
        "attachment; filename=\"note.txt\""
    );
    assert_eq!(resp.text().await.unwrap(), "contents of note.txt");

    handle.abort();
}

#[tokio::test]
async fn unknown_root_and_missing_file_are_not_found() {
    let tmp = TempDir::new().unwrap();
    let (handle, addr) = start_server(vec![root("/docs", tmp.path())]).await;

    let resp = reqwest::get(format!("http://{addr}/api/v1/files/missing/x"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let doc: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(doc["errors"][0]["detail"], "file root not found");

    let resp = reqwest::get(format!("http://{addr}/api/v1/files/docs/ghost.txt"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let doc: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(doc["errors"][0]["detail"], "file not found");

    handle.abort();
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_escape_is_a_client_error() {
    let outside = TempDir::new().unwrap();
    write_files(outside.path(), &["secret.txt"]);
    let tmp = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.path().join("secret.txt"), tmp.path().join("sneaky"))
        .unwrap();
    let (handle, addr) = start_server(vec![root("/docs", tmp.path())]).await;

    let resp = reqwest::get(format!("http://{addr}/api/v1/files/docs/sneaky"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let doc: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(doc["errors"][0]["detail"], "path escapes configured root");
    // The host-side target path never appears in the response.
    assert!(!doc.to_string().contains(outside.path().to_str().unwrap()));

    handle.abort();
}

// Clients normalize `..` segments away before sending, so this one goes over
// a raw socket to put the literal traversal on the wire.
#[tokio::test]
async fn literal_dotdot_in_request_path_is_a_client_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let tmp = TempDir::new().unwrap();
    let sub = tmp.path().join("sub");
    fs::create_dir(&sub).unwrap();
    write_files(tmp.path(), &["top.txt"]);
    let (handle, addr) = start_server(vec![root("/docs", tmp.path())]).await;

    // "sub/../top.txt" stays inside the root under naive normalization and
    // must still be rejected.
    let request = "GET /api/v1/files/docs/sub/../top.txt HTTP/1.1\r\n\
                   Host: localhost\r\n\
                   Connection: close\r\n\r\n";
    let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write request");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.expect("read response");
    let response = String::from_utf8_lossy(&response);

    assert!(
        response.starts_with("HTTP/1.1 400"),
        "unexpected response: {response}"
    );
    assert!(response.contains("path escapes configured root"));

    handle.abort();
}
