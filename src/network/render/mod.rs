//! Network configuration renderers
//!
//! Converts the canonical model plus resolved interfaces into
//! distribution-specific configuration files.
//!
//! Supported renderers:
//! - `eni` - Debian ENI (/etc/network/interfaces), flat or drop-in
//! - `netplan` - Netplan YAML (/etc/netplan/50-cloud-init.yaml)
//! - `sysconfig` - RHEL/CentOS ifcfg files (/etc/sysconfig/network-scripts)

pub mod eni;
pub mod netplan;
pub mod sysconfig;

use crate::NetApplyError;
use crate::network::NetworkData;
use crate::network::resolver::ResolvedLinks;
use crate::paths::Paths;
use std::path::PathBuf;
use tracing::{debug, info};

/// Network renderer types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererType {
    /// Single shared /etc/network/interfaces
    Eni,
    /// /etc/network/interfaces.d/50-cloud-init.cfg
    EniDropIn,
    /// /etc/network/interfaces.d/50-cloud-init with default routes as
    /// post-up/pre-down commands instead of the `gateway` keyword
    EniPostUp,
    /// Netplan YAML
    Netplan,
    /// ifcfg-<iface> files
    Sysconfig,
}

impl RendererType {
    /// Get renderer from string hint
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.to_lowercase().as_str() {
            "eni" | "interfaces" | "ifupdown" => Some(Self::Eni),
            "eni-dropin" | "dropin" | "interfaces.d" => Some(Self::EniDropIn),
            "eni-postup" | "postup" => Some(Self::EniPostUp),
            "netplan" => Some(Self::Netplan),
            "sysconfig" | "ifcfg" | "network-scripts" => Some(Self::Sysconfig),
            _ => None,
        }
    }

    /// Instantiate the renderer for this type
    pub fn renderer(&self) -> Box<dyn Renderer> {
        match self {
            Self::Eni => Box::new(eni::EniRenderer::new(eni::EniStyle::Flat)),
            Self::EniDropIn => Box::new(eni::EniRenderer::new(eni::EniStyle::DropIn)),
            Self::EniPostUp => Box::new(eni::EniRenderer::new(eni::EniStyle::PostUp)),
            Self::Netplan => Box::new(netplan::NetplanRenderer::new()),
            Self::Sysconfig => Box::new(sysconfig::SysconfigRenderer::new()),
        }
    }
}

impl std::fmt::Display for RendererType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RendererType::Eni => write!(f, "eni"),
            RendererType::EniDropIn => write!(f, "eni-dropin"),
            RendererType::EniPostUp => write!(f, "eni-postup"),
            RendererType::Netplan => write!(f, "netplan"),
            RendererType::Sysconfig => write!(f, "sysconfig"),
        }
    }
}

/// Knobs shared by every renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Emit DHCP stanzas for DHCP networks instead of leaving them to
    /// whatever DHCP client already manages the interface
    pub reset_to_dhcp: bool,
}

/// Trait for network configuration renderers
pub trait Renderer {
    /// Render network configuration to files
    fn render(
        &self,
        data: &NetworkData,
        links: &ResolvedLinks,
        options: &RenderOptions,
    ) -> Result<Vec<RenderedFile>, NetApplyError>;

    /// Get the renderer type
    fn renderer_type(&self) -> RendererType;
}

/// A rendered configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFile {
    /// Absolute target path on the host (re-rooted by [`Paths`] on write)
    pub path: PathBuf,
    /// File contents
    pub content: String,
    /// File permissions (octal)
    pub mode: u32,
}

impl RenderedFile {
    pub fn new(path: impl Into<PathBuf>, content: String) -> Self {
        Self {
            path: path.into(),
            content,
            mode: 0o644,
        }
    }
}

/// Write rendered files below the configured root
pub async fn write_rendered(files: &[RenderedFile], paths: &Paths) -> Result<(), NetApplyError> {
    for file in files {
        let full_path = paths.host_path(&file.path);
        debug!("Writing network config: {}", full_path.display());

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| NetApplyError::render_io(parent, e))?;
        }

        tokio::fs::write(&full_path, &file.content)
            .await
            .map_err(|e| NetApplyError::render_io(&full_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&full_path, std::fs::Permissions::from_mode(file.mode))
                .await
                .map_err(|e| NetApplyError::render_io(&full_path, e))?;
        }
    }

    info!("Wrote {} network configuration files", files.len());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_renderer_from_hint() {
        assert_eq!(RendererType::from_hint("eni"), Some(RendererType::Eni));
        assert_eq!(RendererType::from_hint("Netplan"), Some(RendererType::Netplan));
        assert_eq!(RendererType::from_hint("ifcfg"), Some(RendererType::Sysconfig));
        assert_eq!(RendererType::from_hint("eni-postup"), Some(RendererType::EniPostUp));
        assert_eq!(RendererType::from_hint("unknown"), None);
    }

    #[test]
    fn test_renderer_type_roundtrip() {
        for ty in [
            RendererType::Eni,
            RendererType::EniDropIn,
            RendererType::EniPostUp,
            RendererType::Netplan,
            RendererType::Sysconfig,
        ] {
            assert_eq!(ty.renderer().renderer_type(), ty);
            assert_eq!(RendererType::from_hint(&ty.to_string()), Some(ty));
        }
    }

    #[tokio::test]
    async fn test_write_rendered_under_root() {
        let root = TempDir::new().unwrap();
        let paths = Paths::with_root(root.path());
        let files = vec![RenderedFile::new(
            "/etc/netplan/50-cloud-init.yaml",
            "network: {}\n".to_string(),
        )];

        write_rendered(&files, &paths).await.unwrap();

        let written = root.path().join("etc/netplan/50-cloud-init.yaml");
        assert_eq!(std::fs::read_to_string(written).unwrap(), "network: {}\n");
    }

    #[tokio::test]
    async fn test_write_rendered_reports_path() {
        let root = TempDir::new().unwrap();
        // A regular file where a directory is needed
        std::fs::write(root.path().join("etc"), "").unwrap();
        let paths = Paths::with_root(root.path());
        let files = vec![RenderedFile::new("/etc/network/interfaces", String::new())];

        let err = write_rendered(&files, &paths).await.unwrap_err();
        assert!(matches!(err, NetApplyError::RenderIo { .. }));
    }
}
