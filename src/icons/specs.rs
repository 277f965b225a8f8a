use super::ico::IcoPayload;
use crate::platform::Platform;

/// Fraction of an adaptive icon guaranteed to survive launcher masks.
pub const SAFE_ZONE_RATIO: f64 = 0.61;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    Contain,
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Transparent,
    Opaque,
}

/// One generated icon file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconSpec {
    /// Destination relative to the icon base directory.
    pub path: &'static str,
    pub size: u32,
    pub fit: FitMode,
    pub background: Background,
    pub safe_zone: Option<f64>,
}

impl IconSpec {
    pub const fn flat(path: &'static str, size: u32) -> Self {
        Self {
            path,
            size,
            fit: FitMode::Contain,
            background: Background::Transparent,
            safe_zone: None,
        }
    }

    pub const fn safe(path: &'static str, size: u32) -> Self {
        Self {
            path,
            size,
            fit: FitMode::Contain,
            background: Background::Transparent,
            safe_zone: Some(SAFE_ZONE_RATIO),
        }
    }

    pub const fn opaque(self) -> Self {
        Self {
            background: Background::Opaque,
            ..self
        }
    }
}

/// A multi-resolution `.ico` to produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcoTarget {
    /// Loose file written when its directory exists.
    pub path: &'static str,
    pub sizes: &'static [u32],
    pub payload: IcoPayload,
}

/// Everything the icon stage produces for one platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconPlan {
    pub specs: &'static [IconSpec],
    pub ico: Option<IcoTarget>,
    pub icns: Option<&'static str>,
}

const ANDROID: &[IconSpec] = &[
    IconSpec::flat("app/src/main/res/mipmap-mdpi/ic_launcher.png", 48),
    IconSpec::flat("app/src/main/res/mipmap-hdpi/ic_launcher.png", 72),
    IconSpec::flat("app/src/main/res/mipmap-xhdpi/ic_launcher.png", 96),
    IconSpec::flat("app/src/main/res/mipmap-xxhdpi/ic_launcher.png", 144),
    IconSpec::flat("app/src/main/res/mipmap-xxxhdpi/ic_launcher.png", 192),
    IconSpec::flat("app/src/main/res/mipmap-mdpi/ic_launcher_round.png", 48),
    IconSpec::flat("app/src/main/res/mipmap-hdpi/ic_launcher_round.png", 72),
    IconSpec::flat("app/src/main/res/mipmap-xhdpi/ic_launcher_round.png", 96),
    IconSpec::flat("app/src/main/res/mipmap-xxhdpi/ic_launcher_round.png", 144),
    IconSpec::flat("app/src/main/res/mipmap-xxxhdpi/ic_launcher_round.png", 192),
    IconSpec::safe("app/src/main/res/mipmap-mdpi/ic_launcher_foreground.png", 108),
    IconSpec::safe("app/src/main/res/mipmap-hdpi/ic_launcher_foreground.png", 162),
    IconSpec::safe("app/src/main/res/mipmap-xhdpi/ic_launcher_foreground.png", 216),
    IconSpec::safe("app/src/main/res/mipmap-xxhdpi/ic_launcher_foreground.png", 324),
    IconSpec::safe("app/src/main/res/mipmap-xxxhdpi/ic_launcher_foreground.png", 432),
    IconSpec::flat("app/src/main/res/drawable/ic_action_bar.png", 96),
    IconSpec::safe("app/src/main/res/drawable/splash_icon.png", 288),
];

const IOS: &[IconSpec] = &[
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-20.png", 20).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-29.png", 29).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-40.png", 40).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-58.png", 58).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-60.png", 60).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-76.png", 76).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-80.png", 80).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-87.png", 87).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-120.png", 120).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-152.png", 152).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-167.png", 167).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-180.png", 180).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/AppIcon.appiconset/icon-1024.png", 1024).opaque(),
    IconSpec::flat("WebApp/Assets.xcassets/SidebarLogo.imageset/logo.png", 120),
];

const LINUX: &[IconSpec] = &[
    IconSpec::flat("icons/16.png", 16),
    IconSpec::flat("icons/32.png", 32),
    IconSpec::flat("icons/48.png", 48),
    IconSpec::flat("icons/64.png", 64),
    IconSpec::flat("icons/128.png", 128),
    IconSpec::flat("icons/256.png", 256),
    IconSpec::flat("icons/512.png", 512),
    IconSpec::flat("icon.png", 512),
];

const CHROME_EXTENSION: &[IconSpec] = &[
    IconSpec::flat("icons/icon16.png", 16),
    IconSpec::flat("icons/icon32.png", 32),
    IconSpec::flat("icons/icon48.png", 48),
    IconSpec::flat("icons/icon128.png", 128),
];

const WECHAT: &[IconSpec] = &[IconSpec::flat("images/logo.png", 144)];

const HARMONY: &[IconSpec] = &[
    IconSpec::flat("AppScope/resources/base/media/app_icon.png", 216),
    IconSpec::safe("entry/src/main/resources/base/media/foreground.png", 288),
    IconSpec::safe("entry/src/main/resources/base/media/startIcon.png", 192),
];

const WINDOWS_ICO_SIZES: &[u32] = &[16, 24, 32, 48, 64, 128, 256];

impl IconPlan {
    pub fn for_platform(platform: Platform) -> Self {
        let specs_only = |specs| IconPlan {
            specs,
            ico: None,
            icns: None,
        };
        match platform {
            Platform::Android => specs_only(ANDROID),
            Platform::Ios => specs_only(IOS),
            Platform::Linux => specs_only(LINUX),
            Platform::ChromeExtension => specs_only(CHROME_EXTENSION),
            Platform::Wechat => specs_only(WECHAT),
            Platform::Harmony => specs_only(HARMONY),
            Platform::Windows => IconPlan {
                specs: &[],
                ico: Some(IcoTarget {
                    path: "resources/app.ico",
                    sizes: WINDOWS_ICO_SIZES,
                    payload: IcoPayload::Bmp,
                }),
                icns: None,
            },
            Platform::Macos => IconPlan {
                specs: &[],
                ico: None,
                icns: Some("Contents/Resources/AppIcon.icns"),
            },
        }
    }
}
