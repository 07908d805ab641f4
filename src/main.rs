//! cloud-launch-rs - launch Hadoop and ZooKeeper clusters
//!
//! Reads a launch configuration, talks to a compute gateway and prints the
//! launched cluster as JSON.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cloud_launch_rs::provider::{self, ComputeProvider};
use cloud_launch_rs::script::InstallSteps;
use cloud_launch_rs::service::{hadoop, zookeeper};
use cloud_launch_rs::{destroy_cluster, launch_cluster, LaunchConfig};

#[derive(Parser)]
#[command(name = "cloud-launch-rs")]
#[command(author, version, about = "Launch Hadoop and ZooKeeper clusters on cloud compute providers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a cluster and print it as JSON
    Launch {
        /// Launch configuration file (YAML)
        #[arg(short, long, env = "CLOUD_LAUNCH_CONFIG")]
        config: PathBuf,

        /// Override instance templates, e.g. "1 nn+jt,3 dn+tt"
        #[arg(long)]
        instances: Option<String>,
    },
    /// Destroy every node tagged with the cluster name
    Destroy {
        /// Launch configuration file (YAML)
        #[arg(short, long, env = "CLOUD_LAUNCH_CONFIG")]
        config: PathBuf,
    },
    /// Print a role's boot script without launching anything
    RenderScript {
        /// Launch configuration file (YAML)
        #[arg(short, long, env = "CLOUD_LAUNCH_CONFIG")]
        config: PathBuf,

        #[arg(long, value_enum)]
        role: ScriptRole,

        /// Master address baked into worker scripts
        #[arg(long, default_value = "MASTER_ADDRESS")]
        master_address: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScriptRole {
    Master,
    Worker,
    Ensemble,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG, when set, takes precedence over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn build_provider(config: &LaunchConfig) -> anyhow::Result<Arc<dyn ComputeProvider>> {
    let provider = provider::build(&config.service)
        .with_context(|| format!("cannot reach provider '{}'", config.service.provider))?;
    Ok(Arc::from(provider))
}

fn render_script(
    config: &LaunchConfig,
    role: ScriptRole,
    master_address: &str,
) -> anyhow::Result<String> {
    let steps = InstallSteps::new(config.service.script_base_url.as_deref());
    let registry = config.registry();
    let service_name = config.service.service_name.to_lowercase();

    let script = match (service_name.as_str(), role) {
        (hadoop::SERVICE_NAME, ScriptRole::Master) => {
            hadoop::master_boot_script(&registry, &steps, &config.service.provider)
        }
        (hadoop::SERVICE_NAME, ScriptRole::Worker) => {
            hadoop::worker_boot_script(&registry, &steps, master_address)
        }
        (zookeeper::SERVICE_NAME, ScriptRole::Ensemble) => zookeeper::boot_script(&steps),
        (name, _) => bail!("service '{}' has no such role", name),
    };
    Ok(script.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Launch { config, instances } => {
            let mut config = LaunchConfig::load(&config).await?;
            if let Some(instances) = instances {
                config.cluster = instances.parse()?;
            }
            let provider = build_provider(&config)?;
            let cluster = launch_cluster(&config, provider).await?;
            println!("{}", serde_json::to_string_pretty(&cluster)?);
        }
        Commands::Destroy { config } => {
            let config = LaunchConfig::load(&config).await?;
            let provider = build_provider(&config)?;
            destroy_cluster(&config, provider).await?;
            info!("Destroyed cluster {}", config.service.cluster_name);
        }
        Commands::RenderScript {
            config,
            role,
            master_address,
        } => {
            let config = LaunchConfig::load(&config).await?;
            print!("{}", render_script(&config, role, &master_address)?);
        }
    }

    Ok(())
}
