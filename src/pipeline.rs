//! Render-then-apply pipeline
//!
//! One run decodes the model, resolves links to live interfaces, writes the
//! distro artifacts, applies the configuration with live commands and
//! finally asks the network service to reload. The whole sequence is
//! retried from the top on transient failures.

use crate::NetApplyError;
use crate::datasource::MetadataSource;
use crate::distro::NetworkVariant;
use crate::network::NetworkData;
use crate::network::apply::{Applier, ApplyOptions, CommandRunner};
use crate::network::render::eni::mark_interface_manual;
use crate::network::render::{RenderOptions, RenderedFile, RendererType, write_rendered};
use crate::network::resolver::{InterfaceResolver, InterfaceSource, ResolvedLinks};
use crate::paths::Paths;
use crate::restart::restart_network;
use crate::retry::RetryPolicy;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Behaviour switches for a run
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub reset_to_dhcp: bool,
    /// Reload the distro network service after applying
    pub restart_network: bool,
    /// Render only: no file writes, no commands
    pub dry_run: bool,
    /// Stand down while cloud-init is configuring the host itself
    pub skip_when_cloud_init_running: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            reset_to_dhcp: false,
            restart_network: true,
            dry_run: false,
            skip_when_cloud_init_running: true,
        }
    }
}

/// Where the network model comes from
#[derive(Clone, Copy)]
pub enum NetworkInput<'s> {
    /// Raw or base64 encoded `network_data.json`
    Payload(&'s str),
    /// Fetched from a metadata source
    Source(&'s dyn MetadataSource),
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The model was empty; nothing was rendered or applied
    NothingToConfigure,
    /// cloud-init was running; nothing was fetched, rendered or applied
    CloudInitRunning,
    /// Artifacts written and configuration applied
    Applied {
        renderer: RendererType,
        files: Vec<PathBuf>,
    },
    /// Dry run, artifacts rendered but not written
    Rendered(Vec<RenderedFile>),
}

/// Drives one invocation of the tool
pub struct Pipeline<'a> {
    interfaces: &'a dyn InterfaceSource,
    runner: &'a dyn CommandRunner,
    paths: Paths,
    variant: NetworkVariant,
    options: PipelineOptions,
    retry: RetryPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        interfaces: &'a dyn InterfaceSource,
        runner: &'a dyn CommandRunner,
        paths: Paths,
        variant: NetworkVariant,
    ) -> Self {
        Self {
            interfaces,
            runner,
            paths,
            variant,
            options: PipelineOptions::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn variant(&self) -> NetworkVariant {
        self.variant
    }

    /// Configure from a raw or base64 encoded payload
    pub async fn run_payload(&self, payload: &str) -> Result<Outcome, NetApplyError> {
        self.run(NetworkInput::Payload(payload)).await
    }

    /// Configure from a metadata source.
    ///
    /// If the first fetch fails, networking is restarted once in case the
    /// metadata address is not reachable yet, then the fetch is repeated
    /// with the source's longer recovery budget.
    pub async fn run_source(&self, source: &dyn MetadataSource) -> Result<Outcome, NetApplyError> {
        self.run(NetworkInput::Source(source)).await
    }

    /// Configure from either input, unless cloud-init is busy
    pub async fn run(&self, input: NetworkInput<'_>) -> Result<Outcome, NetApplyError> {
        if self.cloud_init_running().await {
            return Ok(Outcome::CloudInitRunning);
        }
        self.run_with_retry(input).await
    }

    /// Handle an interface removal event.
    ///
    /// The interface's static stanzas in the ENI drop-in become `manual`,
    /// networking is restarted without waiting, and the remaining
    /// interfaces are configured again from `input`.
    pub async fn remove_interface(
        &self,
        interface: &str,
        input: NetworkInput<'_>,
    ) -> Result<Outcome, NetApplyError> {
        if self.cloud_init_running().await {
            return Ok(Outcome::CloudInitRunning);
        }

        info!("Interface {} removed", interface);
        if !self.options.dry_run {
            let changed = mark_interface_manual(&self.paths, interface).await?;
            if changed && self.options.restart_network {
                restart_network(self.runner, &self.variant, true).await;
            }
        }

        self.run_with_retry(input).await
    }

    async fn run_with_retry(&self, input: NetworkInput<'_>) -> Result<Outcome, NetApplyError> {
        let restarted = AtomicBool::new(false);
        let restarted = &restarted;

        self.retry
            .run(|attempt| async move {
                debug!("Pipeline attempt {}", attempt);
                let data = match input {
                    NetworkInput::Payload(payload) => NetworkData::decode(payload)?,
                    NetworkInput::Source(source) => self.fetch(source, restarted).await?,
                };
                self.configure(&data).await
            })
            .await
    }

    /// Whether a cloud-init process is alive; any failure to tell reads as no
    async fn cloud_init_running(&self) -> bool {
        if !self.options.skip_when_cloud_init_running {
            return false;
        }

        let args: Vec<String> = ["--no-headers", "-fC", "cloud-init"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match self.runner.run("ps", &args).await {
            Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                info!("cloud-init is running, leaving the network to it");
                true
            }
            Ok(_) => false,
            Err(e) => {
                debug!("Could not check for cloud-init: {}", e);
                false
            }
        }
    }

    async fn fetch(
        &self,
        source: &dyn MetadataSource,
        restarted: &AtomicBool,
    ) -> Result<NetworkData, NetApplyError> {
        match source.fetch_network_data().await {
            Ok(data) => Ok(data),
            Err(e)
                if e.is_retryable()
                    && self.options.restart_network
                    && !self.options.dry_run
                    && !restarted.swap(true, Ordering::SeqCst) =>
            {
                warn!("Metadata unavailable ({}), restarting networking", e);
                restart_network(self.runner, &self.variant, false).await;
                source.refetch_after_restart().await
            }
            Err(e) => Err(e),
        }
    }

    /// One pass over an already decoded model
    pub async fn configure(&self, data: &NetworkData) -> Result<Outcome, NetApplyError> {
        if data.is_empty() {
            info!("No network configuration in metadata, nothing to do");
            return Ok(Outcome::NothingToConfigure);
        }

        let resolver = InterfaceResolver::scan(self.interfaces).await?;
        let links = ResolvedLinks::resolve(data, &resolver)?;

        let renderer = self.variant.renderer.renderer();
        let files = renderer.render(
            data,
            &links,
            &RenderOptions {
                reset_to_dhcp: self.options.reset_to_dhcp,
            },
        )?;

        if self.options.dry_run {
            info!("Dry run, rendered {} files", files.len());
            return Ok(Outcome::Rendered(files));
        }

        write_rendered(&files, &self.paths).await?;

        Applier::new(self.runner)
            .apply(
                data,
                &links,
                &ApplyOptions {
                    reset_to_dhcp: self.options.reset_to_dhcp,
                },
            )
            .await?;

        if self.options.restart_network {
            restart_network(self.runner, &self.variant, true).await;
        }

        info!(
            "Network configuration applied with {} renderer",
            self.variant.renderer
        );
        Ok(Outcome::Applied {
            renderer: self.variant.renderer,
            files: files.into_iter().map(|f| f.path).collect(),
        })
    }
}
