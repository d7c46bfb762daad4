use std::fs;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

struct ServerGuard {
    child: Child,
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn start_server(root: &Path, port: u16, watch: bool) -> ServerGuard {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mdserve"));
    cmd.arg("serve")
        .arg(root)
        .arg("--port")
        .arg(port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if watch {
        cmd.arg("--watch");
    }

    let child = cmd.spawn().expect("Failed to start server");
    ServerGuard { child }
}

fn wait_for_server(port: u16, timeout_ms: u64) -> bool {
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if let Ok(response) =
            reqwest::blocking::get(format!("http://localhost:{}/api/health", port))
        {
            if response.status().is_success() {
                return true;
            }
        }
        thread::sleep(Duration::from_millis(100));
    }
    false
}

/// Root with `notes.md` and `drafts/idea.md`.
fn sample_root() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp root");
    fs::write(dir.path().join("notes.md"), "# Notes\n\nhello world\n").unwrap();
    fs::create_dir(dir.path().join("drafts")).unwrap();
    fs::write(dir.path().join("drafts").join("idea.md"), "# Idea\n").unwrap();
    dir
}

fn get_json(url: &str) -> Value {
    reqwest::blocking::get(url)
        .expect("request failed")
        .json()
        .expect("response was not JSON")
}

fn post(url: &str) -> Value {
    reqwest::blocking::Client::new()
        .post(url)
        .send()
        .expect("request failed")
        .json()
        .expect("response was not JSON")
}

#[test]
fn test_tree_orders_directories_first() {
    let root = sample_root();
    let port = 14101;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    let body = get_json(&format!("http://localhost:{}/api/tree", port));
    assert_eq!(body["success"], true);

    let data = body["data"].as_array().expect("data should be an array");
    assert_eq!(data.len(), 2);

    assert_eq!(data[0]["type"], "directory");
    assert_eq!(data[0]["name"], "drafts");
    assert_eq!(data[0]["hasMarkdown"], true);
    let children = data[0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["name"], "idea.md");
    assert_eq!(children[0]["path"], "drafts/idea.md");

    assert_eq!(data[1]["type"], "file");
    assert_eq!(data[1]["name"], "notes.md");
    assert!(data[1]["size"].as_u64().unwrap() > 0);

    assert!(body["rootPath"].as_str().unwrap().len() > 0);
}

#[test]
fn test_file_rendering_and_toc() {
    let root = sample_root();
    let port = 14102;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    let body = get_json(&format!("http://localhost:{}/api/file/notes.md", port));
    assert_eq!(body["success"], true);

    let html = body["data"]["html"].as_str().unwrap();
    assert!(html.contains("<h1 id=\"notes\""));
    assert!(html.contains("hello world"));
    assert!(html.contains("breadcrumbs"));

    assert_eq!(body["data"]["filePath"], "notes.md");
    let toc = body["data"]["tableOfContents"].as_array().unwrap();
    assert_eq!(toc.len(), 1);
    assert_eq!(toc[0]["level"], 1);
    assert_eq!(toc[0]["id"], "notes");
    assert_eq!(toc[0]["text"], "Notes");
}

#[test]
fn test_path_traversal_is_rejected() {
    let root = sample_root();
    let port = 14103;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    // encoded slashes keep ".." segments out of URL normalization
    let response = reqwest::blocking::get(format!(
        "http://localhost:{}/api/file/..%2F..%2Fetc%2Fpasswd",
        port
    ))
    .unwrap();
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().unwrap();
    assert_eq!(body["success"], false);

    let response = reqwest::blocking::get(format!(
        "http://localhost:{}/api/file/%2Fetc%2Fpasswd",
        port
    ))
    .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[test]
fn test_missing_file_and_missing_path() {
    let root = sample_root();
    let port = 14104;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    let response =
        reqwest::blocking::get(format!("http://localhost:{}/api/file/absent.md", port)).unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = reqwest::blocking::get(format!("http://localhost:{}/api/file", port)).unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[test]
fn test_search() {
    let root = sample_root();
    let port = 14105;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    let body = get_json(&format!("http://localhost:{}/api/search?q=idea", port));
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["query"], "idea");
    assert_eq!(body["data"]["total"], 1);
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results[0]["type"], "file");
    assert_eq!(results[0]["name"], "idea.md");
    assert_eq!(results[0]["path"], "drafts/idea.md");

    // too-short queries are rejected before any work happens
    let response =
        reqwest::blocking::get(format!("http://localhost:{}/api/search?q=a", port)).unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response =
        reqwest::blocking::get(format!("http://localhost:{}/api/search", port)).unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[test]
fn test_metadata() {
    let root = sample_root();
    let port = 14106;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    let body = get_json(&format!(
        "http://localhost:{}/api/metadata/drafts/idea.md",
        port
    ));
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["path"], "drafts/idea.md");
    assert_eq!(body["data"]["isFile"], true);
    assert_eq!(body["data"]["isDirectory"], false);
    assert!(body["data"]["size"].as_u64().unwrap() > 0);
    assert!(body["data"]["modified"].as_u64().unwrap() > 0);

    let response = reqwest::blocking::get(format!(
        "http://localhost:{}/api/metadata/..%2Fsecret",
        port
    ))
    .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[test]
fn test_health_and_cache_clear() {
    let root = sample_root();
    let port = 14107;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    // populate both caches
    get_json(&format!("http://localhost:{}/api/tree", port));
    get_json(&format!("http://localhost:{}/api/file/notes.md", port));

    let body = get_json(&format!("http://localhost:{}/api/health", port));
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["cache"]["scanner"], 1);
    assert_eq!(body["data"]["cache"]["renderer"], 1);

    let body = post(&format!("http://localhost:{}/api/cache/clear", port));
    assert_eq!(body["success"], true);

    let body = get_json(&format!("http://localhost:{}/api/health", port));
    assert_eq!(body["data"]["cache"]["scanner"], 0);
    assert_eq!(body["data"]["cache"]["renderer"], 0);
}

#[test]
fn test_watch_toggle_endpoints() {
    let root = sample_root();
    let port = 14108;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    let body = get_json(&format!("http://localhost:{}/api/health", port));
    assert_eq!(body["data"]["watching"], false);

    let body = post(&format!("http://localhost:{}/api/watch/start", port));
    assert_eq!(body["success"], true);
    let body = get_json(&format!("http://localhost:{}/api/health", port));
    assert_eq!(body["data"]["watching"], true);

    // starting again is a no-op
    let body = post(&format!("http://localhost:{}/api/watch/start", port));
    assert_eq!(body["success"], true);

    let body = post(&format!("http://localhost:{}/api/watch/stop", port));
    assert_eq!(body["success"], true);
    let body = get_json(&format!("http://localhost:{}/api/health", port));
    assert_eq!(body["data"]["watching"], false);
}

#[test]
fn test_watch_invalidates_tree_cache() {
    let root = sample_root();
    let port = 14109;
    let _guard = start_server(root.path(), port, true);
    assert!(wait_for_server(port, 10_000));

    // populate the tree cache; without the watcher it would stay stale
    // for the full cache max age
    let body = get_json(&format!("http://localhost:{}/api/tree", port));
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    fs::write(root.path().join("extra.md"), "# Extra\n").unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut entries = 0;
    while Instant::now() < deadline {
        let body = get_json(&format!("http://localhost:{}/api/tree", port));
        entries = body["data"].as_array().unwrap().len();
        if entries == 3 {
            break;
        }
        thread::sleep(Duration::from_millis(250));
    }
    assert_eq!(entries, 3, "new file never appeared in the tree");
}

#[test]
fn test_watch_serves_fresh_render_after_edit() {
    let root = sample_root();
    let port = 14110;
    let _guard = start_server(root.path(), port, true);
    assert!(wait_for_server(port, 10_000));

    let body = get_json(&format!("http://localhost:{}/api/file/notes.md", port));
    assert!(body["data"]["html"].as_str().unwrap().contains("hello world"));

    // keep the mtime change visible on coarse-grained filesystems
    thread::sleep(Duration::from_millis(1100));
    fs::write(root.path().join("notes.md"), "# Notes\n\nfresh content\n").unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut fresh = false;
    while Instant::now() < deadline {
        let body = get_json(&format!("http://localhost:{}/api/file/notes.md", port));
        if body["data"]["html"].as_str().unwrap().contains("fresh content") {
            fresh = true;
            break;
        }
        thread::sleep(Duration::from_millis(250));
    }
    assert!(fresh, "edited content never showed up");
}

#[test]
fn test_landing_page() {
    let root = sample_root();
    let port = 14111;
    let _guard = start_server(root.path(), port, false);
    assert!(wait_for_server(port, 10_000));

    let response = reqwest::blocking::get(format!("http://localhost:{}/", port)).unwrap();
    assert!(response.status().is_success());
    let body = response.text().unwrap();
    assert!(body.contains("Markdown Server"));
}

#[test]
fn test_tree_command_prints_json() {
    let root = sample_root();
    let output = Command::new(env!("CARGO_BIN_EXE_mdserve"))
        .arg("tree")
        .arg(root.path())
        .output()
        .expect("Failed to run tree command");
    assert!(output.status.success());

    let tree: Value = serde_json::from_slice(&output.stdout).expect("tree output is JSON");
    let names: Vec<&str> = tree
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["drafts", "notes.md"]);
}

#[test]
fn test_render_command_prints_html() {
    let root = sample_root();
    let output = Command::new(env!("CARGO_BIN_EXE_mdserve"))
        .arg("render")
        .arg(root.path())
        .arg("drafts/idea.md")
        .output()
        .expect("Failed to run render command");
    assert!(output.status.success());

    let html = String::from_utf8(output.stdout).unwrap();
    assert!(html.contains("<h1 id=\"idea\""));

    let missing = Command::new(env!("CARGO_BIN_EXE_mdserve"))
        .arg("render")
        .arg(root.path())
        .arg("absent.md")
        .output()
        .expect("Failed to run render command");
    assert!(!missing.status.success());
}
