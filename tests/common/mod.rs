//! Synthetic skeleton archives for the pipeline tests.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use image::{Rgba, RgbaImage};
use webforge::Platform;
use webforge::icons::encode_png;
use zip::write::SimpleFileOptions;

pub type Files = Vec<(String, Vec<u8>)>;

fn file(path: &str, body: impl AsRef<[u8]>) -> (String, Vec<u8>) {
    (path.to_string(), body.as_ref().to_vec())
}

/// Smallest PE32 image the resource editor accepts: headers plus one
/// `.text` section.
pub fn tiny_exe() -> Vec<u8> {
    const HEADERS: usize = 0x400;
    const PE: usize = 0x80;
    let coff = PE + 4;
    let optional = coff + 20;
    let sections = optional + 224;

    let mut exe = vec![0u8; HEADERS + 0x200];
    let put16 = |exe: &mut Vec<u8>, at: usize, v: u16| exe[at..at + 2].copy_from_slice(&v.to_le_bytes());
    let put32 = |exe: &mut Vec<u8>, at: usize, v: u32| exe[at..at + 4].copy_from_slice(&v.to_le_bytes());

    exe[..2].copy_from_slice(b"MZ");
    put32(&mut exe, 0x3c, PE as u32);
    exe[PE..PE + 4].copy_from_slice(b"PE\0\0");
    put16(&mut exe, coff, 0x14c);
    put16(&mut exe, coff + 2, 1);
    put16(&mut exe, coff + 16, 224);
    put16(&mut exe, coff + 18, 0x0102);

    put16(&mut exe, optional, 0x10b);
    put32(&mut exe, optional + 32, 0x1000);
    put32(&mut exe, optional + 36, 0x200);
    put32(&mut exe, optional + 56, 0x2000);
    put32(&mut exe, optional + 60, HEADERS as u32);
    put32(&mut exe, optional + 92, 16);

    exe[sections..sections + 5].copy_from_slice(b".text");
    put32(&mut exe, sections + 8, 4);
    put32(&mut exe, sections + 12, 0x1000);
    put32(&mut exe, sections + 16, 0x200);
    put32(&mut exe, sections + 20, HEADERS as u32);
    put32(&mut exe, sections + 36, 0x6000_0020);
    exe[HEADERS..HEADERS + 4].copy_from_slice(&[0xc3, 0x90, 0x90, 0x90]);
    exe
}

pub fn icon_png() -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(64, 48, Rgba([20, 120, 220, 255]));
    img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    encode_png(&img).unwrap()
}

/// A skeleton that satisfies the platform's markers and patcher, with its
/// files under a `{platform}-shell/` wrapper directory.
pub fn skeleton_files(platform: Platform) -> Files {
    let files = match platform {
        Platform::Android => vec![
            file(
                "app/src/main/AndroidManifest.xml",
                r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" android:versionCode="1" android:versionName="0.1"></manifest>"#,
            ),
            file("app/src/main/assets/app_config.json", "{}"),
            file(
                "app/src/main/res/values/strings.xml",
                r#"<resources><string name="app_name">Shell</string></resources>"#,
            ),
            file("app/src/main/res/mipmap-mdpi/ic_launcher.png", "old"),
            file("gradlew", "#!/bin/sh\n"),
        ],
        Platform::Ios => vec![
            file(
                "WebApp.xcodeproj/project.pbxproj",
                "PRODUCT_BUNDLE_IDENTIFIER = com.shell.app;\nMARKETING_VERSION = 0.1;\n",
            ),
            file("WebApp/config.json", "{}"),
            file("WebApp/Assets.xcassets/AppIcon.appiconset/Contents.json", "{}"),
        ],
        Platform::Windows => vec![
            file("WebApp.exe", tiny_exe()),
            file("config.json", "{}"),
            file("resources/readme.txt", "assets"),
        ],
        Platform::Macos => vec![
            file(
                "WebApp.app/Contents/Info.plist",
                r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0"><dict><key>CFBundleName</key><string>Shell</string></dict></plist>
"#,
            ),
            file("WebApp.app/Contents/Resources/config.json", "{}"),
            file("WebApp.app/Contents/MacOS/WebApp", "binary"),
        ],
        Platform::Linux => vec![
            file("install.sh", "#!/bin/sh\n"),
            file("webapp", "binary"),
            file("config.json", "{}"),
            file("webapp.desktop", "[Desktop Entry]\nName=Shell\nComment=Shell\n"),
            file("icons/.keep", ""),
        ],
        Platform::ChromeExtension => vec![
            file("manifest.json", r#"{"manifest_version": 3, "name": "Shell", "version": "0.1"}"#),
            file("config.json", "{}"),
            file("icons/.keep", ""),
        ],
        Platform::Wechat => vec![
            file("project.config.json", r#"{"appid": "touristappid", "projectname": "shell"}"#),
            file("app.json", r#"{"pages": ["pages/index/index"], "window": {}}"#),
            file("config.json", "{}"),
            file("images/.keep", ""),
        ],
        Platform::Harmony => vec![
            file(
                "AppScope/app.json5",
                "{\n  // shell\n  app: { bundleName: 'com.shell', versionCode: 1, versionName: '0.1' },\n}\n",
            ),
            file("AppScope/resources/base/media/.keep", ""),
            file("entry/src/main/resources/rawfile/config.json", "{}"),
        ],
    };
    let wrapper = format!("{}-shell", platform.name());
    files
        .into_iter()
        .map(|(path, body)| (format!("{wrapper}/{path}"), body))
        .collect()
}

pub fn skeleton_archive(platform: Platform) -> Vec<u8> {
    let files = skeleton_files(platform);
    match platform {
        Platform::Linux | Platform::Macos => tar_gz(&files),
        _ => zip(&files),
    }
}

pub fn zip(files: &Files) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, body) in files {
        writer.start_file(path.as_str(), SimpleFileOptions::default()).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn tar_gz(files: &Files) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, body.as_slice()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// `(path, mode)` of every regular file in a packaged tar.gz.
pub fn tar_modes(bytes: &[u8]) -> Vec<(String, u32)> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.header().entry_type().is_file())
        .map(|e| {
            let path = e.path().unwrap().to_string_lossy().into_owned();
            (path, e.header().mode().unwrap())
        })
        .collect()
}

pub fn zip_entry(bytes: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut entry = archive.by_name(name).ok()?;
    let mut out = Vec::new();
    entry.read_to_end(&mut out).ok()?;
    Some(out)
}
