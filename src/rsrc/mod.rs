//! Resource editing for Windows executables.
//!
//! The editor loads the resource tree, lets callers rewrite version strings,
//! swap the icon group and attach the run-time configuration blob, then
//! writes the tree back as a new `.rsrc` section.

mod icon_group;
mod pe;
mod tree;
mod version;

pub use icon_group::{group_icon_ids, replace_icon_group};
pub use pe::{PeImage, Section, checksum};
pub use tree::{RT_GROUP_ICON, RT_ICON, RT_VERSION, ResourceData, ResourceId, ResourceTree};
pub use version::{STRING_TABLE_KEY, VersionInfo, version_quad};

use std::fs;
use std::path::Path;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::icons::{IconArtifacts, IconOutcome};
use crate::state_machine::AppConfig;

/// Custom resource type carrying [`RuntimeConfig`].
pub const CONFIG_RESOURCE_TYPE: &str = "WEBFORGE";
pub const CONFIG_RESOURCE_NAME: &str = "CONFIG";
pub const CONFIG_RESOURCE_LANG: u16 = 1033;

#[derive(Debug, Error)]
pub enum PeError {
    #[error("not a PE executable: {0}")]
    NotPe(String),

    #[error("malformed executable: {0}")]
    Malformed(String),

    #[error("no room in the PE header for another section")]
    NoHeaderRoom,

    #[error("invalid version resource: {0}")]
    VersionInfo(String),

    #[error("invalid icon: {0}")]
    Icon(String),

    #[error("failed to encode runtime config: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the shipped executable reads at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub url: String,
    pub title: String,
}

pub struct ResourceEditor {
    image: PeImage,
    tree: ResourceTree,
}

impl ResourceEditor {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PeError> {
        let image = PeImage::parse(bytes)?;
        let tree = ResourceTree::parse(&image)?;
        Ok(Self { image, tree })
    }

    pub fn open(path: &Path) -> Result<Self, PeError> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    pub fn version_info(&self) -> Result<Option<VersionInfo>, PeError> {
        self.tree
            .first(&RT_VERSION)
            .map(|(_, _, res)| VersionInfo::parse(&res.data))
            .transpose()
    }

    /// Rewrite the version resource, creating one if the executable has
    /// none. An unreadable existing resource is replaced wholesale.
    pub fn update_version_info(
        &mut self,
        strings: &[(&str, &str)],
        version: [u16; 4],
    ) -> Result<(), PeError> {
        let (name, lang) = self
            .tree
            .first(&RT_VERSION)
            .map(|(name, lang, _)| (name.clone(), lang))
            .unwrap_or((ResourceId::Id(1), CONFIG_RESOURCE_LANG));

        let mut info = match self.version_info() {
            Ok(Some(info)) => info,
            Ok(None) => VersionInfo::new(version),
            Err(e) => {
                tracing::warn!(error = %e, "replacing unreadable version resource");
                VersionInfo::new(version)
            }
        };
        info.set_version(version);
        for (key, value) in strings {
            info.set_string(key, value);
        }

        self.tree.insert(
            RT_VERSION,
            name,
            lang,
            ResourceData {
                data: info.to_bytes()?,
                code_page: 0,
            },
        );
        Ok(())
    }

    pub fn replace_icon(&mut self, ico: &[u8]) -> Result<(), PeError> {
        replace_icon_group(&mut self.tree, ico)
    }

    pub fn set_runtime_config(&mut self, config: &RuntimeConfig) -> Result<(), PeError> {
        let data = serde_json::to_vec(config)?;
        self.tree.insert(
            ResourceId::name(CONFIG_RESOURCE_TYPE),
            ResourceId::name(CONFIG_RESOURCE_NAME),
            CONFIG_RESOURCE_LANG,
            ResourceData { data, code_page: 0 },
        );
        Ok(())
    }

    pub fn runtime_config(&self) -> Option<RuntimeConfig> {
        let res = self.tree.get(
            &ResourceId::name(CONFIG_RESOURCE_TYPE),
            &ResourceId::name(CONFIG_RESOURCE_NAME),
            CONFIG_RESOURCE_LANG,
        )?;
        serde_json::from_slice(&res.data).ok()
    }

    /// Serialize into a new executable image.
    pub fn into_bytes(self) -> Result<Vec<u8>, PeError> {
        let mut image = self.image;
        let rva = image.next_section_rva()?;
        let payload = self.tree.serialize(rva);
        image.append_resource_section(rva, &payload)?;
        Ok(image.into_bytes())
    }

    pub fn save(self, path: &Path) -> Result<(), PeError> {
        let bytes = self.into_bytes()?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Version strings written into the active string table for a build.
pub fn version_strings(config: &AppConfig, file_name: &str) -> Vec<(&'static str, String)> {
    let year = Utc::now().year();
    vec![
        ("ProductName", config.app_name.clone()),
        ("FileDescription", config.description_or_default()),
        ("CompanyName", config.app_name.clone()),
        ("LegalCopyright", format!("Copyright (C) {year} {}", config.app_name)),
        ("InternalName", config.app_name.clone()),
        ("OriginalFilename", file_name.to_string()),
        ("FileVersion", config.version_name.clone()),
        ("ProductVersion", config.version_name.clone()),
    ]
}

/// Brand the executable at `path` in place.
///
/// Loading, config injection and saving are mandatory and surface as
/// `Err`. A failed icon swap only downgrades the returned outcome: the
/// executable keeps its original icon.
pub fn brand_executable(
    path: &Path,
    config: &AppConfig,
    ico: Option<&[u8]>,
) -> Result<IconOutcome, PeError> {
    let mut editor = ResourceEditor::open(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let strings = version_strings(config, &file_name);
    let borrowed: Vec<(&str, &str)> = strings.iter().map(|(k, v)| (*k, v.as_str())).collect();
    editor.update_version_info(&borrowed, version_quad(&config.version_name))?;

    let icon = match ico {
        None => IconOutcome::Skipped,
        Some(ico) => match editor.replace_icon(ico) {
            Ok(()) => IconOutcome::Applied(IconArtifacts {
                written: vec![file_name.clone()],
                ico: None,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "keeping the executable's original icon");
                IconOutcome::SoftFailed(e.to_string())
            }
        },
    };

    editor.set_runtime_config(&RuntimeConfig {
        url: config.source_url.clone(),
        title: config.app_name.clone(),
    })?;
    editor.save(path)?;
    tracing::info!(path = %path.display(), "rewrote executable resources");
    Ok(icon)
}
