//! Icon pipeline: one source image in, every platform asset out.

mod icns;
mod ico;
mod raster;
mod specs;

pub use icns::{ICNS_TYPES, build_icns, render_icns};
pub use ico::{IcoEntry, IcoPayload, build_ico, parse_ico};
pub use raster::{
    CANONICAL_SIZE, decode, encode_png, fit_square, normalize, pad_to_safe_zone, render,
    safe_zone_inner,
};
pub use specs::{Background, FitMode, IcoTarget, IconPlan, IconSpec, SAFE_ZONE_RATIO};

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::platform::Platform;

/// What the icon stage left behind when it succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconArtifacts {
    /// Files written, relative to the icon base directory.
    pub written: Vec<String>,
    /// The generated ICO, kept for embedding into an executable.
    pub ico: Option<Vec<u8>>,
}

/// Outcome of an icon step. Soft failures let the build continue with the
/// skeleton's own icons; hard failures abort it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconOutcome {
    Applied(IconArtifacts),
    Skipped,
    SoftFailed(String),
    HardFailed(String),
}

/// Directory icon paths are resolved against. macOS paths are relative to
/// the `.app` bundle, everything else to the project root.
pub fn icon_base(platform: Platform, root: &Path) -> PathBuf {
    if platform != Platform::Macos {
        return root.to_path_buf();
    }
    let mut bundles: Vec<PathBuf> = fs::read_dir(root)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.extension().is_some_and(|ext| ext == "app"))
        .collect();
    bundles.sort();
    bundles.into_iter().next().unwrap_or_else(|| root.to_path_buf())
}

/// Regenerate the platform's icons under `base` from `source`.
///
/// Without a source image the skeleton's assets are kept untouched.
pub fn generate(platform: Platform, base: &Path, source: Option<&[u8]>) -> IconOutcome {
    let Some(bytes) = source else {
        return IconOutcome::Skipped;
    };
    let plan = IconPlan::for_platform(platform);
    match generate_plan(&plan, base, bytes) {
        Ok(artifacts) => {
            tracing::info!(
                platform = %platform,
                written = artifacts.written.len(),
                "generated icons"
            );
            IconOutcome::Applied(artifacts)
        }
        Err(reason) => {
            tracing::warn!(platform = %platform, %reason, "icon generation failed, keeping skeleton icons");
            IconOutcome::SoftFailed(reason)
        }
    }
}

fn generate_plan(plan: &IconPlan, base: &Path, source: &[u8]) -> Result<IconArtifacts, String> {
    let canonical = normalize(&decode(source)?);
    let mut artifacts = IconArtifacts::default();

    for spec in plan.specs {
        let Some(dest) = destination(base, spec.path) else {
            tracing::debug!(path = spec.path, "icon directory absent, skipping");
            continue;
        };
        let png = encode_png(&render(&canonical, spec))?;
        write(&dest, &png)?;
        artifacts.written.push(spec.path.to_string());
    }

    if let Some(target) = plan.ico {
        let images: Vec<RgbaImage> = target
            .sizes
            .iter()
            .map(|&size| raster::resize(&canonical, size))
            .collect();
        let ico = build_ico(&images, target.payload)?;
        if let Some(dest) = destination(base, target.path) {
            write(&dest, &ico)?;
            artifacts.written.push(target.path.to_string());
        }
        artifacts.ico = Some(ico);
    }

    if let Some(path) = plan.icns
        && let Some(dest) = destination(base, path)
    {
        write(&dest, &render_icns(&canonical))?;
        artifacts.written.push(path.to_string());
    }

    Ok(artifacts)
}

/// Full destination path, or `None` when the skeleton lacks its directory.
fn destination(base: &Path, rel: &str) -> Option<PathBuf> {
    let dest = base.join(rel);
    dest.parent().is_some_and(Path::is_dir).then_some(dest)
}

fn write(dest: &Path, bytes: &[u8]) -> Result<(), String> {
    fs::write(dest, bytes).map_err(|e| format!("failed to write {}: {e}", dest.display()))
}
