use serde::Deserialize;
use std::{
    fmt::{Debug, Formatter},
    net::IpAddr,
};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct Env {
    pub server_address: IpAddr,
    pub server_port: u16,

    /// Without a database url everything is kept in memory.
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    pub jwt_secret: String,
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: u32,
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: u32,

    /// Without a bucket uploads are kept in memory.
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_public_url: Option<String>,

    #[serde(default)]
    pub snowflake_worker_id: u8,
    #[serde(default)]
    pub snowflake_process_id: u8,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_connections() -> u32 {
    5
}

fn default_access_token_minutes() -> u32 {
    30
}

fn default_refresh_token_days() -> u32 {
    7
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Debug for Env {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("server_address", &self.server_address)
            .field("server_port", &self.server_port)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("database_max_connections", &self.database_max_connections)
            .field("jwt_secret", &"[redacted]")
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_days", &self.refresh_token_days)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_public_url", &self.s3_public_url)
            .field("snowflake_worker_id", &self.snowflake_worker_id)
            .field("snowflake_process_id", &self.snowflake_process_id)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}
