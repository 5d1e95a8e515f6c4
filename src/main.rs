use anyhow::Context;
use mesos_provider::{MesosProvider, ProviderConfig};
use structopt::StructOpt;
use tracing::info;

#[derive(StructOpt, Clone, Debug)]
#[structopt(
    name = "vk-mesos",
    about = "A virtual worker node that schedules Kubernetes pods on Apache Mesos"
)]
struct Opts {
    #[structopt(
        short = "c",
        long = "config",
        env = "VK_MESOS_CONFIG",
        help = "Path to the provider configuration file"
    )]
    config: Option<std::path::PathBuf>,

    #[structopt(
        long = "node-name",
        env = "VK_MESOS_NODE_NAME",
        default_value = "vk-mesos",
        help = "The name for this node in Kubernetes"
    )]
    node_name: String,

    #[structopt(
        long = "node-ip",
        env = "VK_MESOS_NODE_IP",
        default_value = "127.0.0.1",
        help = "The IP address reported in the node status"
    )]
    node_ip: String,

    #[structopt(
        long = "daemon-port",
        env = "VK_MESOS_DAEMON_PORT",
        default_value = "10250",
        help = "The kubelet endpoint port reported in the node status"
    )]
    daemon_port: i32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::from_args();
    let config = match &opts.config {
        Some(path) => ProviderConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ProviderConfig::default(),
    };

    let provider = MesosProvider::new(config, opts.node_name, opts.node_ip, opts.daemon_port)?;
    info!(node = provider.node_name(), "Mesos provider initialized");

    let scheduler = provider.scheduler().clone();
    tokio::select! {
        result = scheduler.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
