use std::{net::SocketAddr, path::Path, path::PathBuf};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_ADMIN_ENDPOINT: &str = "https://admin.shopify.com/api/2024-10/graphql.json";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Shopify {
    /// Admin GraphQL endpoint of the store.
    pub endpoint: String,
    /// Endpoint of the segment-generation service.
    pub segment_endpoint: String,
    /// Admin API access token.
    pub token: String,
    /// The shop identifier (myshopify domain).
    pub shop: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Chat {
    /// Workflow-automation webhook answering natural-language queries.
    pub webhook_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Storage {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub shopify: Shopify,
    pub chat: Chat,
    pub storage: Storage,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("shopify.endpoint", DEFAULT_ADMIN_ENDPOINT)?
            .set_default("shopify.segment_endpoint", "http://127.0.0.1:9100/segments")?
            .set_default("chat.webhook_url", "http://127.0.0.1:5678/webhook/chat")?
            .set_default("storage.path", default_storage_path())?;

        let cfg = builder.add_source(File::from(path)).build()?;

        cfg.try_deserialize()
    }
}

fn default_storage_path() -> String {
    ProjectDirs::from("com", "customer-dashboard", "customer-dashboard-server").map_or_else(
        || String::from("customer-dashboard-data"),
        |dirs| dirs.data_dir().to_string_lossy().into_owned(),
    )
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}
