// tests/common/mod.rs

//! Shared test fixtures: package archives, repository indexes, a loopback
//! HTTP server, and a local-copy download manager stub.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use strata::{CancelToken, DownloadItem, DownloadManager, FetchOptions, hash};

/// Install a tracing subscriber honoring RUST_LOG; safe to call repeatedly
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Build a `.tgz` package archive with a pkg.json manifest
///
/// `files` entries are (path under `files/`, content, mode). Returns the
/// archive path and its SHA-256 digest.
pub fn build_package_archive(
    dir: &Path,
    name: &str,
    version: &str,
    dependencies: &[&str],
    files: &[(&str, &[u8], u32)],
) -> (PathBuf, String) {
    let manifest = serde_json::json!({
        "name": name,
        "version": version,
        "dependencies": dependencies,
        "files": files
            .iter()
            .map(|(path, content, mode)| serde_json::json!({
                "path": format!("files/{path}"),
                "size": content.len(),
                "mode": mode,
                "sha256": hash::sha256(content),
            }))
            .collect::<Vec<_>>(),
    });

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    append_file(&mut builder, "pkg.json", manifest.to_string().as_bytes(), 0o644);
    for (path, content, mode) in files {
        append_file(&mut builder, &format!("files/{path}"), content, *mode);
    }

    let archive = builder
        .into_inner()
        .unwrap()
        .finish()
        .unwrap();

    let path = dir.join(format!("{name}-{version}.tgz"));
    std::fs::write(&path, &archive).unwrap();
    let digest = hash::sha256(&archive);
    (path, digest)
}

/// Append one regular file entry to a tar builder
pub fn append_file<W: Write>(builder: &mut tar::Builder<W>, path: &str, data: &[u8], mode: u32) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    builder.append_data(&mut header, path, data).unwrap();
}

/// Append a file entry with a raw, unvalidated name
///
/// `tar::Builder` refuses to write `..` path components, so hostile
/// fixtures poke the name bytes into the header directly.
pub fn append_raw_path<W: Write>(builder: &mut tar::Builder<W>, path: &[u8], data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.as_gnu_mut().unwrap().name[..path.len()].copy_from_slice(path);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

/// Serialize a repository index document
pub fn index_json(packages: &[serde_json::Value]) -> Vec<u8> {
    serde_json::to_vec_pretty(&serde_json::json!({
        "format_version": "1.0",
        "last_update": "2024-06-01T12:00:00Z",
        "packages": packages,
    }))
    .unwrap()
}

/// One package entry for [`index_json`]
pub fn package_entry(
    name: &str,
    version: &str,
    url: &str,
    checksum: &str,
    os: &str,
    arch: &str,
    dependencies: &[&str],
) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "version": version,
        "url": url,
        "checksum": checksum,
        "os": os,
        "arch": arch,
        "dependencies": dependencies,
    })
}

/// One registered response on the fixture server
#[derive(Clone)]
pub struct Route {
    pub body: Vec<u8>,
    pub last_modified: Option<String>,
}

impl Route {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, value: impl Into<String>) -> Self {
        self.last_modified = Some(value.into());
        self
    }
}

/// Minimal loopback HTTP server for fetch and sync tests
///
/// Serves registered routes, honors `If-Modified-Since` with a `304` when
/// it matches the route's `Last-Modified`, and counts hits per path.
pub struct FixtureServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FixtureServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::new(Mutex::new(HashMap::new()));
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_routes = routes.clone();
        let thread_hits = hits.clone();
        let thread_shutdown = shutdown.clone();

        let handle = std::thread::spawn(move || {
            for stream in listener.incoming() {
                if thread_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if let Ok(stream) = stream {
                    handle_connection(stream, &thread_routes, &thread_hits);
                }
            }
        });

        Self {
            addr,
            routes,
            hits,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Register a route at a path like `/index.json`
    pub fn route(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    /// Absolute URL for a registered path
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// How many requests a path has received
    pub fn hits(&self, path: &str) -> usize {
        *self.hits.lock().unwrap().get(path).unwrap_or(&0)
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Unblock the accept loop
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(
    stream: TcpStream,
    routes: &Mutex<HashMap<String, Route>>,
    hits: &Mutex<HashMap<String, usize>>,
) {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let path = match request_line.split_whitespace().nth(1) {
        Some(path) => path.to_string(),
        None => return,
    };

    let mut if_modified_since = None;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    break;
                }
                if let Some((name, value)) = trimmed.split_once(':') {
                    if name.eq_ignore_ascii_case("if-modified-since") {
                        if_modified_since = Some(value.trim().to_string());
                    }
                }
            }
            Err(_) => return,
        }
    }

    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

    let mut stream = reader.into_inner();
    let route = routes.lock().unwrap().get(&path).cloned();

    let response = match route {
        Some(route) => {
            if route.last_modified.is_some() && route.last_modified == if_modified_since {
                b"HTTP/1.1 304 Not Modified\r\nConnection: close\r\n\r\n".to_vec()
            } else {
                let mut head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n",
                    route.body.len()
                );
                if let Some(last_modified) = &route.last_modified {
                    head.push_str(&format!("Last-Modified: {last_modified}\r\n"));
                }
                head.push_str("\r\n");

                let mut response = head.into_bytes();
                response.extend_from_slice(&route.body);
                response
            }
        }
        None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
    };

    let _ = stream.write_all(&response);
    let _ = stream.flush();
}

/// Download manager stub that copies archives from a local directory
///
/// Resolves each item to `source_dir/<dest_filename>`; a missing source
/// fails the batch the way a failed download would.
pub struct CopyDownloader {
    pub source_dir: PathBuf,
}

impl CopyDownloader {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

impl DownloadManager for CopyDownloader {
    fn fetch(
        &self,
        _cancel: &CancelToken,
        item: &DownloadItem,
        opts: &FetchOptions,
    ) -> strata::Result<PathBuf> {
        std::fs::create_dir_all(&opts.dest_dir)?;
        let source = self.source_dir.join(item.dest_filename());
        if !source.exists() {
            return Err(strata::Error::DownloadFailed(format!(
                "no fixture at {}",
                source.display()
            )));
        }
        let dest = opts.dest_dir.join(item.dest_filename());
        std::fs::copy(&source, &dest)?;
        Ok(dest)
    }

    fn fetch_all(
        &self,
        cancel: &CancelToken,
        items: &[DownloadItem],
        opts: &FetchOptions,
    ) -> strata::Result<HashMap<String, PathBuf>> {
        let mut paths = HashMap::new();
        for item in items {
            paths.insert(item.id.clone(), self.fetch(cancel, item, opts)?);
        }
        Ok(paths)
    }

    fn set_authenticators(&mut self, _authenticators: HashMap<String, strata::Authenticator>) {}
}
