use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use redigate::backend::memory::MemoryBackend;
use redigate::config::Config;
use redigate::{server, Error};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON configuration file. Without one a single listener serves the `redis` set on
    /// 127.0.0.1:6379.
    #[arg(short, long, env = "REDIGATE_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Backend namespace every set lives in
    #[arg(short, long, env = "REDIGATE_NAMESPACE", default_value = "test")]
    namespace: String,

    /// Exit when the backend can no longer be reached
    #[arg(
        long,
        env = "REDIGATE_EXIT_ON_BACKEND_LOST",
        default_value_t = true,
        action = ArgAction::Set
    )]
    exit_on_backend_lost: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    let config = Config::load(args.config_file.as_deref())?;

    server::run(
        config,
        &args.namespace,
        args.exit_on_backend_lost,
        Arc::new(MemoryBackend::new()),
    )
    .await
}
