//! Rewrites the skeleton's structured config artifacts with job values.

mod formats;
mod platforms;

pub use formats::{
    numeric_version, parse_json, parse_json5, replace_android_string, replace_desktop_key,
    replace_pbx_setting, replace_xml_attr, set_json_path, set_plist_strings, to_json_string,
};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::BuildError;
use crate::platform::Platform;
use crate::state_machine::AppConfig;

/// Files touched by one patch run, relative to the project root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

/// Apply the platform's patch set to the project rooted at `root`.
pub fn patch_project(
    platform: Platform,
    root: &Path,
    config: &AppConfig,
) -> Result<PatchReport, BuildError> {
    let mut project = Project::new(root);
    match platform {
        Platform::Android => platforms::android(&mut project, config)?,
        Platform::Ios => platforms::ios(&mut project, config)?,
        Platform::Windows => platforms::windows(&mut project, config)?,
        Platform::Macos => platforms::macos(&mut project, config)?,
        Platform::Linux => platforms::linux(&mut project, config)?,
        Platform::ChromeExtension => platforms::chrome_extension(&mut project, config)?,
        Platform::Wechat => platforms::wechat(&mut project, config)?,
        Platform::Harmony => platforms::harmony(&mut project, config)?,
    }
    tracing::debug!(
        platform = %platform,
        written = project.report.written.len(),
        skipped = project.report.skipped.len(),
        "patched project"
    );
    Ok(project.report)
}

/// Located project root plus bookkeeping of what was changed.
pub(crate) struct Project<'a> {
    root: &'a Path,
    report: PatchReport,
}

impl<'a> Project<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            report: PatchReport::default(),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.root
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Read a text file the skeleton must contain.
    pub(crate) fn read_required(&self, rel: &str) -> Result<String, BuildError> {
        let bytes = self.read_required_bytes(rel)?;
        String::from_utf8(bytes).map_err(|e| BuildError::config_patch(rel, e))
    }

    /// Raw contents of a required file, for formats with a binary encoding.
    pub(crate) fn read_required_bytes(&self, rel: &str) -> Result<Vec<u8>, BuildError> {
        let path = self.path(rel);
        if !path.is_file() {
            return Err(BuildError::config_patch(rel, "required file is missing"));
        }
        fs::read(&path).map_err(|e| BuildError::config_patch(rel, e))
    }

    /// Read a text file the skeleton may omit.
    pub(crate) fn read_optional(&mut self, rel: &str) -> Result<Option<String>, BuildError> {
        self.read_optional_bytes(rel)?
            .map(String::from_utf8)
            .transpose()
            .map_err(|e| BuildError::config_patch(rel, e))
    }

    pub(crate) fn read_optional_bytes(&mut self, rel: &str) -> Result<Option<Vec<u8>>, BuildError> {
        let path = self.path(rel);
        if !path.is_file() {
            self.report.skipped.push(rel.to_string());
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| BuildError::config_patch(rel, e))
    }

    pub(crate) fn write(&mut self, rel: &str, contents: impl AsRef<[u8]>) -> Result<(), BuildError> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::config_patch(rel, e))?;
        }
        fs::write(&path, contents).map_err(|e| BuildError::config_patch(rel, e))?;
        self.report.written.push(rel.to_string());
        Ok(())
    }

    /// Parse a required JSON file, apply `edit`, write it back.
    pub(crate) fn edit_json(
        &mut self,
        rel: &str,
        edit: impl FnOnce(&mut Value),
    ) -> Result<(), BuildError> {
        let text = self.read_required(rel)?;
        let mut doc = parse_json(&text).map_err(|e| BuildError::config_patch(rel, e))?;
        edit(&mut doc);
        let out = to_json_string(&doc).map_err(|e| BuildError::config_patch(rel, e))?;
        self.write(rel, out)
    }

    /// Same as [`Project::edit_json`] for a file the skeleton may omit.
    pub(crate) fn edit_optional_json(
        &mut self,
        rel: &str,
        edit: impl FnOnce(&mut Value),
    ) -> Result<(), BuildError> {
        if !self.path(rel).is_file() {
            self.report.skipped.push(rel.to_string());
            return Ok(());
        }
        self.edit_json(rel, edit)
    }

    /// Write the privacy policy verbatim when the job carries one.
    ///
    /// An existing file is kept as is when the job has no policy text.
    pub(crate) fn write_privacy(&mut self, rel: &str, config: &AppConfig) -> Result<(), BuildError> {
        match &config.privacy_policy {
            Some(text) => self.write(rel, text),
            None => {
                self.report.skipped.push(rel.to_string());
                Ok(())
            }
        }
    }

    /// First child directory of `parent` whose name ends with `suffix`.
    pub(crate) fn find_dir_with_suffix(&self, parent: &str, suffix: &str) -> Option<String> {
        let base = self.path(parent);
        let mut names: Vec<String> = fs::read_dir(base)
            .ok()?
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(suffix))
            .collect();
        names.sort();
        names.into_iter().next().map(|n| {
            if parent.is_empty() {
                n
            } else {
                format!("{parent}/{n}")
            }
        })
    }
}
