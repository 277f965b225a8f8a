//! Target platforms and their per-platform packaging facts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::workspace::Marker;

/// Every platform the engine can produce an artifact for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
    Windows,
    Macos,
    Linux,
    ChromeExtension,
    Wechat,
    Harmony,
}

/// Archive container used for both the skeleton and the produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

impl Platform {
    pub const ALL: [Platform; 8] = [
        Platform::Android,
        Platform::Ios,
        Platform::Windows,
        Platform::Macos,
        Platform::Linux,
        Platform::ChromeExtension,
        Platform::Wechat,
        Platform::Harmony,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
            Platform::ChromeExtension => "chrome_extension",
            Platform::Wechat => "wechat",
            Platform::Harmony => "harmony",
        }
    }

    pub fn archive_format(&self) -> ArchiveFormat {
        match self {
            Platform::Linux | Platform::Macos => ArchiveFormat::TarGz,
            _ => ArchiveFormat::Zip,
        }
    }

    /// File name of the skeleton archive inside a skeleton version directory.
    pub fn skeleton_file_name(&self) -> String {
        format!("{}.{}", self.name(), self.archive_format().extension())
    }

    /// Markers that identify the project root inside an extracted skeleton.
    pub fn markers(&self) -> &'static [Marker] {
        match self {
            Platform::Android => &[Marker::File("app/src/main/AndroidManifest.xml")],
            Platform::Ios => &[Marker::DirWithFile {
                suffix: ".xcodeproj",
                file: "project.pbxproj",
            }],
            Platform::Windows => &[Marker::File(WINDOWS_EXECUTABLE)],
            Platform::Macos => &[Marker::DirWithFile {
                suffix: ".app",
                file: "Contents/Info.plist",
            }],
            Platform::Linux => &[Marker::File("install.sh")],
            Platform::ChromeExtension => &[Marker::File("manifest.json")],
            Platform::Wechat => &[Marker::File("project.config.json")],
            Platform::Harmony => &[Marker::File("AppScope/app.json5")],
        }
    }

    /// Launcher binaries that must keep their execute bit when repackaged.
    pub fn launcher_names(&self) -> &'static [&'static str] {
        match self {
            Platform::Linux => &["webapp", "AppRun"],
            Platform::Android => &["gradlew"],
            _ => &[],
        }
    }
}

/// Executable shipped at the root of the Windows skeleton.
pub const WINDOWS_EXECUTABLE: &str = "WebApp.exe";

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "windows" | "win" => Ok(Platform::Windows),
            "macos" | "mac" | "darwin" => Ok(Platform::Macos),
            "linux" => Ok(Platform::Linux),
            "chrome_extension" | "chrome-extension" | "chrome" => Ok(Platform::ChromeExtension),
            "wechat" | "miniprogram" => Ok(Platform::Wechat),
            "harmony" | "harmonyos" => Ok(Platform::Harmony),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}
