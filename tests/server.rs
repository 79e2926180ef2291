mod common;

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use common::{ZipBuilder, leaf_content, nested_zip, simple_zip, write};
use zipserve::{FileSystem, OsFs, ZipOpenFs, server};

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "plain.txt", b"just some text");
        write(root, "my file.txt", b"spaced");
        write(root, "a.zip", &simple_zip());
        write(root, "outer.zip", &nested_zip());
        write(root, "corrupt.zip", &simple_zip()[10..]);
        write(
            root,
            "site.zip",
            &ZipBuilder::new()
                .stored("index.html", b"<h1>hi</h1>")
                .stored("style.css", b"body {}")
                .finish(),
        );

        let fs: Arc<dyn FileSystem> = Arc::new(ZipOpenFs::new(OsFs::new(root)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(server::serve(listener, fs, async move {
            let _ = signal.await;
        }));

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap(),
            shutdown,
            task,
            _dir: dir,
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap()
    }

    async fn stop(self) {
        let Self {
            client,
            shutdown,
            task,
            ..
        } = self;
        drop(client);
        shutdown.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn serves_plain_files() {
    let server = TestServer::start().await;
    let resp = server.get("/plain.txt").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert!(headers.contains_key(header::LAST_MODIFIED));
    assert_eq!(resp.text().await.unwrap(), "just some text");
    server.stop().await;
}

#[tokio::test]
async fn serves_archive_entries() {
    let server = TestServer::start().await;
    let resp = server.get("/a.zip/x.txt").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "hello from x");

    let resp = server.get("/outer.zip/inner.zip/leaf.txt").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), leaf_content().as_slice());
    server.stop().await;
}

#[tokio::test]
async fn archives_are_browsable_directories() {
    let server = TestServer::start().await;

    let resp = server.get("/a.zip").await;
    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(resp.headers()[header::LOCATION], "/a.zip/");

    let resp = server.get("/a.zip/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    let body = resp.text().await.unwrap();
    assert!(body.contains("<a href=\"x.txt\">x.txt</a>"), "{body}");

    let body = server.get("/outer.zip/").await.text().await.unwrap();
    assert!(body.contains("<a href=\"inner.zip/\">inner.zip/</a>"), "{body}");

    let body = server.get("/").await.text().await.unwrap();
    assert!(body.contains("href=\"a.zip/\""), "{body}");
    assert!(body.contains("href=\"corrupt.zip\""), "{body}");
    assert!(body.contains("href=\"my%20file.txt\""), "{body}");
    server.stop().await;
}

#[tokio::test]
async fn index_pages_are_served() {
    let server = TestServer::start().await;
    let resp = server.get("/site.zip/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    assert_eq!(resp.text().await.unwrap(), "<h1>hi</h1>");

    let resp = server.get("/site.zip/style.css").await;
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/css");
    server.stop().await;
}

#[tokio::test]
async fn files_lose_their_trailing_slash() {
    let server = TestServer::start().await;
    let resp = server.get("/a.zip/x.txt/").await;
    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(resp.headers()[header::LOCATION], "/a.zip/x.txt");
    server.stop().await;
}

#[tokio::test]
async fn percent_encoded_paths() {
    let server = TestServer::start().await;
    let resp = server.get("/my%20file.txt").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "spaced");
    server.stop().await;
}

#[tokio::test]
async fn range_requests() {
    let server = TestServer::start().await;
    let leaf = leaf_content();

    let resp = server
        .client
        .get(format!("{}/outer.zip/inner.zip/leaf.txt", server.base))
        .header(header::RANGE, "bytes=10-19")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        resp.headers()[header::CONTENT_RANGE],
        format!("bytes 10-19/{}", leaf.len()).as_str()
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &leaf[10..20]);

    let resp = server
        .client
        .get(format!("{}/plain.txt", server.base))
        .header(header::RANGE, "bytes=-4")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.text().await.unwrap(), "text");

    let resp = server
        .client
        .get(format!("{}/plain.txt", server.base))
        .header(header::RANGE, "bytes=100-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes */14");
    server.stop().await;
}

#[tokio::test]
async fn unresolvable_paths_are_404() {
    let server = TestServer::start().await;
    for path in ["/missing", "/missing/x.txt", "/plain.txt/x", "/corrupt.zip/x.txt", "/a.zip/nope"] {
        assert_eq!(server.get(path).await.status(), StatusCode::NOT_FOUND, "{path}");
    }
    server.stop().await;
}

#[tokio::test]
async fn only_get_and_head() {
    let server = TestServer::start().await;
    let resp = server
        .client
        .post(format!("{}/plain.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers()[header::ALLOW], "GET, HEAD");

    let resp = server
        .client
        .head(format!("{}/a.zip/x.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.bytes().await.unwrap().is_empty());
    server.stop().await;
}
