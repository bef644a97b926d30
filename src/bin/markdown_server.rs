use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sparkmd::server::serve;

#[derive(Parser)]
#[command(name = "sparkmd-server")]
#[command(about = "Markdown document provider speaking MCP over stdio")]
#[command(
    long_about = "Serves create/edit/delete/search tools, markdown:// resources, \
and prompt templates for a directory of markdown documents. Intended to be \
spawned by the sparkmd client, but any MCP stdio client can talk to it.\n\n\
Environment Variables:\n\
  MARKDOWN_DIR      Document directory (default: ./markdowns)"
)]
struct Args {
    /// Directory holding the markdown documents
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout is the protocol channel, so logs must go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let root = args
        .dir
        .or_else(|| std::env::var_os("MARKDOWN_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./markdowns"));
    serve(root).await
}
