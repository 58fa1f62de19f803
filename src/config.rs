//! 命令行参数与服务默认配置。

use clap::Parser;

pub const APP_NAME: &str = "uploadgate-upload-api";
pub const UPLOAD_TOKEN_HEADER: &str = "x-upload-token";
pub const DEFAULT_DATA_DIR: &str = "/data/uploads";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_LIST_LIMIT: i64 = 200;
pub const MAX_LIST_LIMIT: i64 = 2000;
pub const DEFAULT_LOCK_WAIT_TIMEOUT_SECS: u64 = 30;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "uploadgate", version, about = "UploadGate file upload API")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        env = "DATA_DIR",
        default_value = DEFAULT_DATA_DIR,
        help = "Base directory for stored files"
    )]
    pub data_dir: String,
    #[arg(
        long,
        env = "UPLOAD_TOKEN",
        default_value = "",
        hide_env_values = true,
        help = "Shared secret expected in X-Upload-Token (empty disables auth)"
    )]
    pub upload_token: String,
    #[arg(
        long,
        env = "MAX_UPLOAD_BYTES",
        default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
        help = "Max upload size in bytes (0 to disable)"
    )]
    pub max_upload_bytes: u64,
    #[arg(
        short = 'b',
        long,
        env = "UPLOADGATE_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "UPLOADGATE_PORT",
        default_value_t = 8000,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "UPLOADGATE_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
}
