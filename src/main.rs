//! cloud-net-apply - render and apply cloud network metadata
//!
//! Typically run once at boot, or from a udev rule on interface hotplug
//! with `ACTION` and `ID_NET_NAME` in the environment.

use anyhow::{Context, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cloud_net_apply::config::Settings;
use cloud_net_apply::datasource::OpenStackNetworkData;
use cloud_net_apply::distro::{DistroInfo, NetworkVariant};
use cloud_net_apply::network::apply::ProcessRunner;
use cloud_net_apply::network::render::RendererType;
use cloud_net_apply::network::resolver::SysfsInterfaces;
use cloud_net_apply::paths::Paths;
use cloud_net_apply::pipeline::{NetworkInput, Outcome, Pipeline, PipelineOptions};
use cloud_net_apply::retry::RetryPolicy;

#[derive(Parser)]
#[command(name = "cloud-net-apply")]
#[command(author, version, about = "Render and apply cloud network metadata", long_about = None)]
struct Cli {
    /// network_data.json, raw or base64 encoded; fetched from the metadata
    /// service when absent
    #[arg(env = "NETWORK_DATA")]
    payload: Option<String>,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Settings file [default: /etc/cloud-net-apply/config.yaml under --root]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Filesystem root for rendered files and os-release
    #[arg(long)]
    root: Option<PathBuf>,

    /// Renderer to use instead of the distro default
    /// (eni, eni-dropin, eni-postup, netplan, sysconfig)
    #[arg(long)]
    renderer: Option<String>,

    /// Configure DHCP networks with a DHCP client
    #[arg(long)]
    reset_to_dhcp: bool,

    /// Attempts of the whole pipeline
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Do not restart the network service
    #[arg(long)]
    no_restart: bool,

    /// udev action; "remove" marks the interface manual before reconfiguring
    #[arg(long, env = "ACTION")]
    action: Option<String>,

    /// Interface for udev actions
    #[arg(long, env = "ID_NET_NAME")]
    interface: Option<String>,

    /// Print rendered files instead of writing and applying them
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
    }
}

async fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let config = match &cli.config {
        Some(config) => config.clone(),
        None => {
            let root = cli.root.as_deref().unwrap_or_else(|| Path::new("/"));
            Paths::with_root(root).settings_file()
        }
    };
    let mut settings = Settings::load(&config)
        .await
        .with_context(|| format!("loading {}", config.display()))?;

    if let Some(root) = &cli.root {
        settings.root = root.clone();
    }
    if let Some(renderer) = &cli.renderer {
        settings.renderer = Some(renderer.clone());
    }
    if let Some(max_attempts) = cli.max_attempts {
        settings.max_attempts = max_attempts;
    }
    if cli.reset_to_dhcp {
        settings.reset_to_dhcp = true;
    }
    if cli.no_restart {
        settings.restart_network = false;
    }
    Ok(settings)
}

async fn select_variant(settings: &Settings, paths: &Paths) -> anyhow::Result<NetworkVariant> {
    let requested = match settings.renderer.as_deref() {
        Some(hint) => match RendererType::from_hint(hint) {
            Some(renderer) => Some(renderer),
            None => bail!("unknown renderer '{}'", hint),
        },
        None => None,
    };

    let detected = DistroInfo::load(paths.os_release())
        .await
        .and_then(|info| NetworkVariant::for_distro(&info));

    match (detected, requested) {
        (Ok(variant), Some(renderer)) => Ok(variant.with_renderer(renderer)),
        (Ok(variant), None) => Ok(variant),
        (Err(e), Some(renderer)) => {
            warn!("Distribution detection failed ({}), using {} renderer", e, renderer);
            Ok(NetworkVariant::for_renderer(renderer))
        }
        (Err(e), None) => Err(anyhow::Error::new(e).context("detecting distribution")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = load_settings(&cli).await?;
    let paths = Paths::with_root(&settings.root);
    let variant = select_variant(&settings, &paths).await?;

    let interfaces = SysfsInterfaces::with_root(&settings.sys_class_net);
    let runner = ProcessRunner;
    let pipeline = Pipeline::new(&interfaces, &runner, paths, variant)
        .with_options(PipelineOptions {
            reset_to_dhcp: settings.reset_to_dhcp,
            restart_network: settings.restart_network,
            dry_run: cli.dry_run,
            skip_when_cloud_init_running: settings.skip_when_cloud_init_running,
        })
        .with_retry(RetryPolicy::new(
            settings.max_attempts,
            settings.retry_delay(),
        ));

    let source;
    let input = match cli.payload.as_deref() {
        Some(payload) => NetworkInput::Payload(payload),
        None => {
            source = OpenStackNetworkData::with_url(
                &settings.metadata_url,
                settings.metadata_timeout(),
                settings.metadata_retries,
            )?
            .with_recovery(
                settings.metadata_recovery_timeout(),
                settings.metadata_recovery_retries,
            )?;
            NetworkInput::Source(&source)
        }
    };

    let outcome = match (cli.action.as_deref(), cli.interface.as_deref()) {
        (Some("remove"), Some(interface)) => pipeline.remove_interface(interface, input).await?,
        (Some("remove"), None) => bail!("remove action requires an interface name"),
        _ => pipeline.run(input).await?,
    };

    match outcome {
        Outcome::Rendered(files) => {
            for file in files {
                println!("# {}", file.path.display());
                print!("{}", file.content);
            }
        }
        Outcome::Applied { renderer, files } => {
            info!("Applied {} renderer, wrote {} files", renderer, files.len());
        }
        Outcome::NothingToConfigure => info!("Nothing to configure"),
        Outcome::CloudInitRunning => info!("cloud-init is running, nothing done"),
    }

    Ok(())
}
