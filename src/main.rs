use clap::Parser;
use env_logger::Env;

use facechat::Opts;
use facechat::cli::SubCommandExtend;
use facechat::config::SubCommand;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Index(config) => config.run(&opts).await,
        SubCommand::Recognize(config) => config.run(&opts).await,
        SubCommand::Stats(config) => config.run(&opts).await,
        SubCommand::Centroids(config) => config.run(&opts).await,
    }
}
