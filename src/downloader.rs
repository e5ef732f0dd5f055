use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info, warn};

use crate::error::MapError;

pub const DEFAULT_WORKERS: usize = 4;

/// Transfer tool chosen for one download batch, in priority order:
/// segmented aria2c, then wget, then curl, then the built-in streaming
/// client which is always available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTool {
    Aria2(PathBuf),
    Wget(PathBuf),
    Curl(PathBuf),
    Internal,
}

impl TransferTool {
    pub fn name(&self) -> &'static str {
        match self {
            TransferTool::Aria2(_) => "aria2c",
            TransferTool::Wget(_) => "wget",
            TransferTool::Curl(_) => "curl",
            TransferTool::Internal => "internal",
        }
    }
}

/// External transfer tools found on the host.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    pub aria2: Option<PathBuf>,
    pub wget: Option<PathBuf>,
    pub curl: Option<PathBuf>,
}

impl Toolchain {
    pub fn detect() -> Self {
        Self {
            aria2: find_in_path("aria2c"),
            wget: find_in_path("wget"),
            curl: find_in_path("curl"),
        }
    }

    /// Static priority chain; the internal client is the universal fallback.
    pub fn select(&self) -> TransferTool {
        if let Some(path) = &self.aria2 {
            return TransferTool::Aria2(path.clone());
        }
        if let Some(path) = &self.wget {
            return TransferTool::Wget(path.clone());
        }
        if let Some(path) = &self.curl {
            return TransferTool::Curl(path.clone());
        }
        TransferTool::Internal
    }
}

pub struct DownloadManager {
    toolchain: Toolchain,
    client: Client,
}

impl DownloadManager {
    pub fn new() -> Result<Self, MapError> {
        Self::with_toolchain(Toolchain::detect())
    }

    pub fn with_toolchain(toolchain: Toolchain) -> Result<Self, MapError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("metaphenomap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MapError::Download(err.to_string()))?,
        );
        // Connect timeout bounds worst-case latency; body streaming for
        // multi-gigabyte runs must not carry a total deadline.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(20))
            .timeout(None)
            .build()
            .map_err(|err| MapError::Download(err.to_string()))?;
        Ok(Self { toolchain, client })
    }

    /// Downloads every URL into `destination` across a bounded worker pool.
    /// Returns only the paths of transfers that materialized a non-empty
    /// file; per-file failures are logged and dropped.
    pub fn download(
        &self,
        urls: &[String],
        destination: &Path,
        workers: usize,
        prefix: Option<&str>,
    ) -> Result<Vec<PathBuf>, MapError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        fs::create_dir_all(destination).map_err(|err| MapError::Filesystem(err.to_string()))?;

        let tool = self.toolchain.select();
        let workers = workers.max(1).min(urls.len());
        info!(tool = tool.name(), workers, count = urls.len(), "starting downloads");

        let queue: Mutex<VecDeque<&String>> = Mutex::new(urls.iter().collect());
        let results: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let url = match queue.lock().expect("queue lock").pop_front() {
                            Some(url) => url,
                            None => break,
                        };
                        match self.fetch_one(url, destination, prefix, &tool) {
                            Ok(path) => {
                                debug!(url, path = %path.display(), "downloaded");
                                results.lock().expect("results lock").push(path);
                            }
                            Err(err) => warn!(url, "download failed: {err}"),
                        }
                    }
                });
            }
        });

        Ok(results.into_inner().expect("results lock"))
    }

    fn fetch_one(
        &self,
        url: &str,
        destination: &Path,
        prefix: Option<&str>,
        tool: &TransferTool,
    ) -> Result<PathBuf, MapError> {
        let file_name = friendly_name(url, prefix);
        let path = destination.join(&file_name);

        match tool {
            TransferTool::Aria2(program) => run_cmd(
                program,
                &[
                    "-x16",
                    "-s16",
                    "-k1M",
                    "-o",
                    &file_name,
                    "-d",
                    &destination.to_string_lossy(),
                    url,
                ],
            )?,
            TransferTool::Wget(program) => {
                run_cmd(program, &["-nv", "-O", &path.to_string_lossy(), url])?
            }
            TransferTool::Curl(program) => {
                run_cmd(program, &["-sS", "-L", "-o", &path.to_string_lossy(), url])?
            }
            TransferTool::Internal => self.fetch_internal(url, &path)?,
        }

        let size = fs::metadata(&path)
            .map_err(|_| MapError::Download(format!("no file materialized for {url}")))?
            .len();
        if size == 0 {
            let _ = fs::remove_file(&path);
            return Err(MapError::Download(format!("empty file for {url}")));
        }
        Ok(path)
    }

    fn fetch_internal(&self, url: &str, path: &Path) -> Result<(), MapError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| MapError::Download(err.to_string()))?;
        if !response.status().is_success() {
            return Err(MapError::Download(format!(
                "{url} returned status {}",
                response.status().as_u16()
            )));
        }
        let mut file = File::create(path).map_err(|err| MapError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| MapError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn run_cmd(program: &Path, args: &[&str]) -> Result<(), MapError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| MapError::Download(err.to_string()))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("command failed: {}", program.display())
    } else {
        stderr
    };
    Err(MapError::Download(message))
}

/// Destination filename from the URL's path component, optionally prefixed
/// by the owning accession to avoid collisions in shared directories.
/// A URL with no path component falls back to "file" rather than using the
/// host as a name.
pub fn friendly_name(url: &str, prefix: Option<&str>) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let base = match without_scheme.split_once('/') {
        Some((_, path)) => path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|b| !b.is_empty())
            .unwrap_or("file"),
        None => "file",
    };
    match prefix {
        Some(prefix) => format!("{prefix}_{base}"),
        None => base.to_string(),
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
