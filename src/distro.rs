//! Distribution detection
//!
//! Identifies the running distribution from os-release and picks the
//! renderer variant once per run.

use crate::NetApplyError;
use crate::network::render::RendererType;
use std::path::Path;
use tracing::{debug, info};

/// Distribution identification triple
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistroInfo {
    /// os-release `ID` (e.g. "ubuntu", "centos")
    pub name: String,
    /// os-release `VERSION_ID` (e.g. "18.04", "9")
    pub version: String,
    /// os-release `VERSION_CODENAME` (e.g. "bionic")
    pub codename: String,
    /// os-release `ID_LIKE` entries
    pub like: Vec<String>,
}

/// Distribution family, decides renderer and restart mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Debian,
    Ubuntu,
    RedHat,
}

impl DistroFamily {
    fn from_id(id: &str) -> Option<Self> {
        match id {
            "debian" | "raspbian" => Some(Self::Debian),
            "ubuntu" => Some(Self::Ubuntu),
            "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "ol" => Some(Self::RedHat),
            _ => None,
        }
    }
}

impl DistroInfo {
    /// Parse os-release content
    pub fn parse(content: &str) -> Self {
        let mut info = Self::default();
        for line in content.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
            match key {
                "ID" => info.name = value.to_lowercase(),
                "VERSION_ID" => info.version = value,
                "VERSION_CODENAME" => info.codename = value,
                "ID_LIKE" => {
                    info.like = value.split_whitespace().map(|s| s.to_lowercase()).collect()
                }
                _ => {}
            }
        }
        info
    }

    /// Read and parse an os-release file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, NetApplyError> {
        let path = path.as_ref();
        debug!("Reading distribution info from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&content))
    }

    /// Family by `ID`, falling back to `ID_LIKE`
    pub fn family(&self) -> Result<DistroFamily, NetApplyError> {
        DistroFamily::from_id(&self.name)
            .or_else(|| self.like.iter().find_map(|id| DistroFamily::from_id(id)))
            .ok_or_else(|| NetApplyError::UnsupportedDistro(self.name.clone()))
    }

    /// `VERSION_ID` as (major, minor), missing parts read as 0
    pub fn version_tuple(&self) -> (u32, u32) {
        let mut parts = self.version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        (major, minor)
    }
}

/// Renderer and restart policy selected for this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkVariant {
    pub family: DistroFamily,
    pub renderer: RendererType,
}

impl NetworkVariant {
    /// Select the variant for a distribution
    pub fn for_distro(info: &DistroInfo) -> Result<Self, NetApplyError> {
        let family = info.family()?;
        let version = info.version_tuple();

        let renderer = match family {
            DistroFamily::Ubuntu if version < (16, 4) => RendererType::Eni,
            DistroFamily::Ubuntu if version >= (17, 10) => RendererType::Netplan,
            DistroFamily::Ubuntu => RendererType::EniDropIn,
            DistroFamily::Debian if version.0 != 0 && version.0 < 9 => RendererType::EniPostUp,
            DistroFamily::Debian => RendererType::EniDropIn,
            DistroFamily::RedHat => RendererType::Sysconfig,
        };

        info!(
            "Running on {} {} ({}), using {} renderer",
            info.name, info.version, info.codename, renderer
        );
        Ok(Self { family, renderer })
    }

    /// Override the renderer while keeping the family
    pub fn with_renderer(self, renderer: RendererType) -> Self {
        Self { renderer, ..self }
    }

    /// Guess the family from an explicitly requested renderer, for hosts
    /// whose os-release is unreadable or unknown
    pub fn for_renderer(renderer: RendererType) -> Self {
        let family = match renderer {
            RendererType::Netplan => DistroFamily::Ubuntu,
            RendererType::Sysconfig => DistroFamily::RedHat,
            RendererType::Eni | RendererType::EniDropIn | RendererType::EniPostUp => {
                DistroFamily::Debian
            }
        };
        Self { family, renderer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBUNTU_1804: &str = r#"NAME="Ubuntu"
VERSION="18.04.6 LTS (Bionic Beaver)"
ID=ubuntu
ID_LIKE=debian
VERSION_ID="18.04"
VERSION_CODENAME=bionic
"#;

    fn variant(id: &str, version: &str) -> Result<NetworkVariant, NetApplyError> {
        NetworkVariant::for_distro(&DistroInfo {
            name: id.to_string(),
            version: version.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_parse_os_release() {
        let info = DistroInfo::parse(UBUNTU_1804);
        assert_eq!(info.name, "ubuntu");
        assert_eq!(info.version, "18.04");
        assert_eq!(info.codename, "bionic");
        assert_eq!(info.like, vec!["debian"]);
        assert_eq!(info.version_tuple(), (18, 4));
    }

    #[test]
    fn test_variant_selection() {
        assert_eq!(variant("ubuntu", "14.04").unwrap().renderer, RendererType::Eni);
        assert_eq!(variant("ubuntu", "16.04").unwrap().renderer, RendererType::EniDropIn);
        assert_eq!(variant("ubuntu", "18.04").unwrap().renderer, RendererType::Netplan);
        assert_eq!(variant("debian", "8").unwrap().renderer, RendererType::EniPostUp);
        assert_eq!(variant("debian", "12").unwrap().renderer, RendererType::EniDropIn);
        assert_eq!(variant("debian", "").unwrap().renderer, RendererType::EniDropIn);
        assert_eq!(variant("centos", "7").unwrap().renderer, RendererType::Sysconfig);
        assert_eq!(variant("rocky", "8.9").unwrap().family, DistroFamily::RedHat);
    }

    #[test]
    fn test_id_like_fallback() {
        let info = DistroInfo::parse("ID=linuxmint\nID_LIKE=\"ubuntu debian\"\nVERSION_ID=20.04\n");
        assert_eq!(info.family().unwrap(), DistroFamily::Ubuntu);
    }

    #[test]
    fn test_unsupported_distro() {
        assert!(matches!(
            variant("alpine", "3.19"),
            Err(NetApplyError::UnsupportedDistro(name)) if name == "alpine"
        ));
    }

    #[test]
    fn test_renderer_override() {
        let v = variant("ubuntu", "22.04").unwrap().with_renderer(RendererType::EniDropIn);
        assert_eq!(v.family, DistroFamily::Ubuntu);
        assert_eq!(v.renderer, RendererType::EniDropIn);

        let guessed = NetworkVariant::for_renderer(RendererType::Sysconfig);
        assert_eq!(guessed.family, DistroFamily::RedHat);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("os-release");
        std::fs::write(&path, UBUNTU_1804).unwrap();
        let info = DistroInfo::load(&path).await.unwrap();
        assert_eq!(info.codename, "bionic");
    }
}
