//! Live network configuration
//!
//! Brings running interfaces in line with the canonical model using
//! iproute2 and dhclient. Every command must succeed; the first failure
//! aborts the apply. Steps already executed are not rolled back, and a
//! retried run flushes and re-adds everything from scratch.

pub mod mock;

use crate::NetApplyError;
use crate::network::NetworkData;
use crate::network::netmask::AddressFamily;
use crate::network::resolver::ResolvedLinks;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};

/// Captured result of an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes external commands to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, NetApplyError>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, NetApplyError> {
        debug!("Running command: {} {}", program, args.join(" "));

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await?;

        if !output.stdout.is_empty() {
            debug!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        }

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run one named step, turning a spawn error or non-zero exit into
/// `CommandFailed`
pub async fn run_step(
    runner: &dyn CommandRunner,
    step: &str,
    program: &str,
    args: &[String],
) -> Result<(), NetApplyError> {
    let output = runner
        .run(program, args)
        .await
        .map_err(|e| NetApplyError::command(step, e.to_string()))?;

    if !output.success() {
        let stderr = output.stderr.trim();
        let stderr = if stderr.is_empty() {
            format!("exit status {}", output.code.unwrap_or(-1))
        } else {
            stderr.to_string()
        };
        return Err(NetApplyError::command(step, stderr));
    }
    Ok(())
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Options affecting the live apply
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Run a DHCP client for DHCP networks instead of leaving them alone
    pub reset_to_dhcp: bool,
}

/// Applies the model with `ip` and `dhclient`
pub struct Applier<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Applier<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    async fn ip(&self, step: &str, parts: &[&str]) -> Result<(), NetApplyError> {
        run_step(self.runner, step, "ip", &args(parts)).await
    }

    /// Bring every resolved link up, set its MTU and wipe its state
    async fn prepare_links(&self, links: &ResolvedLinks) -> Result<(), NetApplyError> {
        for link in links.iter() {
            let name = link.name.as_str();
            info!("Applying link config for {}", name);

            self.ip(
                &format!("Set link {} up", name),
                &["link", "set", "dev", name, "up"],
            )
            .await?;

            if let Some(mtu) = link.mtu {
                let mtu = mtu.to_string();
                self.ip(
                    &format!("Set MTU {} on {}", mtu, name),
                    &["link", "set", "dev", name, "mtu", &mtu],
                )
                .await?;
            }

            for family in [AddressFamily::Ipv4, AddressFamily::Ipv6] {
                let flag = family.ip_flag();
                self.ip(
                    &format!("Flush {} addresses on {}", flag, name),
                    &[flag, "addr", "flush", "dev", name],
                )
                .await?;
                self.ip(
                    &format!("Flush {} routes on {}", flag, name),
                    &[flag, "route", "flush", "dev", name],
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Apply the whole model
    pub async fn apply(
        &self,
        data: &NetworkData,
        links: &ResolvedLinks,
        options: &ApplyOptions,
    ) -> Result<(), NetApplyError> {
        self.prepare_links(links).await?;

        let mut routes_added: HashSet<String> = HashSet::new();

        for network in &data.networks {
            let family = network.family()?;
            let link = links.for_network(network)?;
            let name = link.name.as_str();
            let flag = family.ip_flag();

            if network.network_type.is_dhcp() {
                if !options.reset_to_dhcp {
                    debug!("DHCP network {} left to the running client", network.id);
                    continue;
                }
                info!("Starting DHCP client for {} on {}", network.id, name);
                let dhclient_args = match family {
                    AddressFamily::Ipv4 => args(&[name]),
                    AddressFamily::Ipv6 => args(&["-6", name]),
                };
                run_step(
                    self.runner,
                    &format!("Run DHCP client on {}", name),
                    "dhclient",
                    &dhclient_args,
                )
                .await?;
                continue;
            }

            info!("Applying network {} on {}", network.id, name);
            let cidr = network.address_cidr()?;
            self.ip(
                &format!("Add address {} on {}", cidr, name),
                &[flag, "addr", "add", &cidr, "dev", name],
            )
            .await?;

            for route in network.ordered_routes()? {
                let destination = route.destination()?;
                if !routes_added.insert(destination.clone()) {
                    debug!("Route {} already added, skipping", destination);
                    continue;
                }
                self.ip(
                    &format!("Add route {} via {} on {}", destination, route.gateway, name),
                    &[
                        route.family().ip_flag(),
                        "route",
                        "add",
                        &destination,
                        "via",
                        &route.gateway,
                        "dev",
                        name,
                    ],
                )
                .await?;
            }
        }

        info!("Applied {} networks", data.networks.len());
        Ok(())
    }
}
