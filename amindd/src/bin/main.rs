use clap::Parser;
use tracing_appender::rolling;
use tracing_subscriber::FmtSubscriber;

use tracing_log::LogTracer;

use amindd::{
    daemon::{self, DaemonConfig},
    AssetMinderResult,
};

#[derive(Parser, Debug)]
#[command(name = "asset-minderd")]
#[command(about = "MQTT asset-health telemetry listener")]
struct Args {
    /// Path to the daemon configuration file
    #[arg(long, default_value = "asset-minderd.toml")]
    config: std::path::PathBuf,

    /// Seconds to run before exiting; 0 runs until a termination signal
    #[arg(long, default_value_t = 0)]
    timeout: u64,
}

#[actix::main]
async fn main() -> AssetMinderResult<()> {
    LogTracer::init().expect("Unable to set up log tracer");

    let log = rolling::daily("./logs", "asset-minderd");
    let (nb, _guard) = tracing_appender::non_blocking(log);

    let sub = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(nb)
        .finish();

    tracing::subscriber::set_global_default(sub).expect("Unable to set up tracing subscriber");

    let args = Args::parse();
    let config = DaemonConfig::load(&args.config)?;

    daemon::run(config, args.timeout).await
}
