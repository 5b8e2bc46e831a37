use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server listening host
    #[arg(long, env = "UPLOADER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server listening port
    #[arg(short, long, env = "UPLOADER_PORT", default_value_t = 8968)]
    pub port: u16,

    /// Directory holding chunk directories and merged files
    #[arg(long, env = "UPLOADER_ROOTDIR", default_value = "./uploads")]
    pub root: String,

    /// Largest accepted upload request body in bytes
    #[arg(long, env = "UPLOADER_MAX_CHUNK_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_chunk_bytes: usize,

    /// Chunk copies running at once within a single merge
    #[arg(long, env = "UPLOADER_MERGE_CONCURRENCY", default_value_t = 8)]
    pub merge_concurrency: usize,

    /// Comma-separated origins allowed to call the API from a browser
    #[arg(long, env = "UPLOADER_CORS_ORIGIN")]
    pub cors_origin: Option<String>,
}
