use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub bypass: BypassConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BypassConfig {
    /// FlareSolverr endpoint, e.g. http://localhost:8191/v1
    #[serde(default = "default_solver_url")]
    pub solver_url: String,

    /// Maximum attempts against the bypass proxy before falling back
    #[serde(default = "default_solver_retries")]
    pub max_retries: usize,

    /// Initial retry delay in milliseconds (doubles per attempt)
    #[serde(default = "default_solver_delay")]
    pub initial_retry_delay_ms: u64,

    /// Retry delay cap in milliseconds
    #[serde(default = "default_solver_delay_cap")]
    pub max_retry_delay_ms: u64,

    /// Per-request timeout handed to the proxy, in milliseconds
    #[serde(default = "default_solver_timeout")]
    pub solve_timeout_ms: u64,

    /// HTTP timeout for talking to the proxy itself, in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Challenge poll iterations (5s apart) before continuing anyway
    #[serde(default = "default_challenge_polls")]
    pub challenge_polls: usize,

    /// Scroll passes to trigger lazy-loaded images on chapter pages
    #[serde(default = "default_scroll_passes")]
    pub scroll_passes: usize,

    /// Navigation timeout in seconds
    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Concurrent downloads per batch; a batch completes before the next starts
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Responses at or below this size are treated as placeholders and rejected
    #[serde(default = "default_min_image_bytes")]
    pub min_image_bytes: usize,

    /// Per-image download timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub download_timeout_secs: u64,
}

/// Media store selection. `kind = "filesystem"` publishes under `root_dir`
/// and prefixes URLs with `public_base_url`; `kind = "imagekit"` uploads to
/// an ImageKit-style endpoint with `private_key` auth.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_kind")]
    pub kind: String,
    #[serde(default = "default_store_root")]
    pub root_dir: String,
    #[serde(default = "default_public_base")]
    pub public_base_url: String,
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub delete_folder_url: String,
    #[serde(default)]
    pub private_key: String,
}

fn default_true() -> bool { true }
fn default_database_path() -> String { "manga_verse.db".to_string() }
fn default_solver_url() -> String { "http://localhost:8191/v1".to_string() }
fn default_solver_retries() -> usize { 3 }
fn default_solver_delay() -> u64 { 2000 }
fn default_solver_delay_cap() -> u64 { 10_000 }
fn default_solver_timeout() -> u64 { 60_000 }
fn default_http_timeout() -> u64 { 30 }
fn default_challenge_polls() -> usize { 6 }
fn default_scroll_passes() -> usize { 15 }
fn default_browser_timeout() -> u64 { 60 }
fn default_batch_size() -> usize { 4 }
fn default_min_image_bytes() -> usize { 1000 }
fn default_store_kind() -> String { "filesystem".to_string() }
fn default_store_root() -> String { "media".to_string() }
fn default_public_base() -> String { "http://localhost:8080/media".to_string() }

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            solver_url: default_solver_url(),
            max_retries: 3,
            initial_retry_delay_ms: 2000,
            max_retry_delay_ms: 10_000,
            solve_timeout_ms: 60_000,
            http_timeout_secs: 30,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            challenge_polls: 6,
            scroll_passes: 15,
            timeout_secs: 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            min_image_bytes: 1000,
            download_timeout_secs: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            root_dir: default_store_root(),
            public_base_url: default_public_base(),
            upload_url: String::new(),
            delete_folder_url: String::new(),
            private_key: String::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bypass: BypassConfig::default(),
            browser: BrowserConfig::default(),
            pipeline: PipelineConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let path = Path::new("config.toml");
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(cfg) = toml::from_str::<Config>(&content) {
                    return cfg;
                }
            }
        }
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let cfg: Config = toml::from_str("database_path = \"test.db\"").unwrap();
        assert_eq!(cfg.database_path, "test.db");
        assert_eq!(cfg.bypass.max_retries, 3);
        assert_eq!(cfg.pipeline.batch_size, 4);
        assert_eq!(cfg.pipeline.min_image_bytes, 1000);
        assert!(cfg.browser.headless);
    }

    #[test]
    fn partial_section_keeps_field_defaults() {
        let cfg: Config = toml::from_str("[bypass]\nmax_retries = 5").unwrap();
        assert_eq!(cfg.bypass.max_retries, 5);
        assert_eq!(cfg.bypass.initial_retry_delay_ms, 2000);
        assert_eq!(cfg.bypass.max_retry_delay_ms, 10_000);
    }
}
