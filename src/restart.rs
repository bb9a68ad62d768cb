//! Network service restart
//!
//! Asks the distribution's network service to pick up the rendered
//! configuration. Every step is best effort: failures are logged and the
//! run carries on.

use crate::distro::{DistroFamily, NetworkVariant};
use crate::network::apply::CommandRunner;
use crate::network::render::RendererType;
use tracing::{debug, info, warn};

/// Commands to run, in order, to restart networking for a variant
pub fn restart_commands(variant: &NetworkVariant, no_block: bool) -> Vec<Vec<&'static str>> {
    if variant.renderer == RendererType::Netplan {
        return vec![vec!["netplan", "apply"]];
    }

    match variant.family {
        DistroFamily::Debian | DistroFamily::Ubuntu => {
            let mut start = vec!["systemctl", "start", "networking"];
            if no_block {
                start.push("--no-block");
            }
            vec![vec!["systemctl", "stop", "networking"], start]
        }
        DistroFamily::RedHat => vec![vec!["service", "network", "restart"]],
    }
}

/// Restart networking, never failing the run
pub async fn restart_network(runner: &dyn CommandRunner, variant: &NetworkVariant, no_block: bool) {
    info!("Restarting networking for {} renderer", variant.renderer);

    for cmd in restart_commands(variant, no_block) {
        let (program, rest) = match cmd.split_first() {
            Some(split) => split,
            None => continue,
        };
        let args: Vec<String> = rest.iter().map(|s| s.to_string()).collect();

        match runner.run(program, &args).await {
            Ok(output) if output.success() => debug!("{} {} succeeded", program, args.join(" ")),
            Ok(output) => warn!(
                "{} {} failed: {}",
                program,
                args.join(" "),
                output.stderr.trim()
            ),
            Err(e) => warn!("{} not available: {}", program, e),
        }
    }
}
