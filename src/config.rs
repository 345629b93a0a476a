use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::vision::BlobDetectorParams;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub marker: MarkerConfig,
    #[serde(default)]
    pub blob: BlobConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// 待ち受けホスト
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// テレメトリ送信周期 (ms)
    #[serde(default = "default_cadence_ms")]
    pub cadence_ms: u64,
    /// 1回の送信の上限時間 (ms)。止まったクライアントで検出ループが詰まらないように
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 5000 }
fn default_cadence_ms() -> u64 { 100 }
fn default_send_timeout_ms() -> u64 { 1000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cadence_ms: default_cadence_ms(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    /// 未指定ならデバイスの既定解像度
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// 読み込み失敗時にデバイスを開き直す
    #[serde(default = "default_reopen")]
    pub reopen: bool,
}

fn default_reopen() -> bool { true }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: None,
            height: None,
            reopen: default_reopen(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarkerConfig {
    /// ArUco辞書タイプ (e.g. "DICT_6X6_1000")
    #[serde(default = "default_dictionary")]
    pub dictionary: String,
}

fn default_dictionary() -> String { "DICT_6X6_1000".to_string() }

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            dictionary: default_dictionary(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    /// ボールとみなすkeypoint直径の下限 (含まない)
    #[serde(default = "default_min_size")]
    pub min_size: f64,
    /// 上限 (含まない)
    #[serde(default = "default_max_size")]
    pub max_size: f64,
    #[serde(default)]
    pub detector: BlobDetectorParams,
}

fn default_min_size() -> f64 { 15.0 }
fn default_max_size() -> f64 { 80.0 }

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            detector: BlobDetectorParams::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルがなければデフォルト設定
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.cadence_ms == 0 {
            bail!("server.cadence_ms must be positive");
        }
        if self.server.send_timeout_ms == 0 {
            bail!("server.send_timeout_ms must be positive");
        }
        if self.blob.min_size >= self.blob.max_size {
            bail!(
                "blob.min_size ({}) must be below blob.max_size ({})",
                self.blob.min_size,
                self.blob.max_size
            );
        }
        if let Err(msg) = self.blob.detector.validate() {
            bail!("blob.detector: {}", msg);
        }
        Ok(())
    }
}
