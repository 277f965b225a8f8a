use regex::Regex;
use serde_json::{Value, json};

use super::Project;
use super::formats::{
    numeric_version, parse_json5, replace_android_string, replace_desktop_key,
    replace_pbx_setting, replace_xml_attr, set_json_path, set_plist_strings, to_json_string,
};
use crate::error::BuildError;
use crate::state_machine::AppConfig;

/// `{url, title}` runtime config shared by the desktop and mini-program shells.
fn set_runtime_config(doc: &mut Value, config: &AppConfig) {
    set_json_path(doc, &["url"], json!(config.source_url));
    set_json_path(doc, &["title"], json!(config.app_name));
}

pub(super) fn android(project: &mut Project, config: &AppConfig) -> Result<(), BuildError> {
    project.edit_json("app/src/main/assets/app_config.json", |doc| {
        set_json_path(doc, &["url"], json!(config.source_url));
        set_json_path(doc, &["appName"], json!(config.app_name));
        set_json_path(doc, &["packageName"], json!(config.package_id));
        set_json_path(doc, &["versionName"], json!(config.version_name));
        set_json_path(doc, &["versionCode"], json!(config.version_code_number()));
    })?;

    let rel = "app/src/main/AndroidManifest.xml";
    let original = project.read_required(rel)?;
    let mut manifest = original.clone();
    if let Some(next) = replace_xml_attr(&manifest, "android:versionName", &config.version_name) {
        manifest = next;
    }
    let code = config.version_code_number().to_string();
    if let Some(next) = replace_xml_attr(&manifest, "android:versionCode", &code) {
        manifest = next;
    }
    if manifest != original {
        project.write(rel, manifest)?;
    }

    let rel = "app/src/main/res/values/strings.xml";
    if let Some(strings) = project.read_optional(rel)?
        && let Some(next) = replace_android_string(&strings, "app_name", &config.app_name)
    {
        project.write(rel, next)?;
    }

    let rel = "app/build.gradle";
    if let Some(gradle) = project.read_optional(rel)? {
        let next = patch_gradle(&gradle, config);
        if next != gradle {
            project.write(rel, next)?;
        }
    }

    project.write_privacy("app/src/main/assets/privacy_policy.md", config)
}

/// Rewrite `applicationId`, `versionCode` and `versionName` in a Groovy
/// `defaultConfig` block. Missing settings stay missing.
fn patch_gradle(gradle: &str, config: &AppConfig) -> String {
    let rules = [
        (
            r#"(applicationId\s*=?\s*)["'][^"']*["']"#,
            groovy_string(&config.package_id),
        ),
        (
            r#"(versionName\s*=?\s*)["'][^"']*["']"#,
            groovy_string(&config.version_name),
        ),
        (
            r"(versionCode\s*=?\s*)\d+",
            config.version_code_number().to_string(),
        ),
    ];
    let mut out = gradle.to_string();
    for (pattern, value) in rules {
        let Ok(re) = Regex::new(pattern) else { continue };
        out = re
            .replace_all(&out, |caps: &regex::Captures| format!("{}{}", &caps[1], value))
            .into_owned();
    }
    out
}

/// Double-quoted Groovy literal. `$` is escaped so values never interpolate.
fn groovy_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

pub(super) fn ios(project: &mut Project, config: &AppConfig) -> Result<(), BuildError> {
    let xcodeproj = project
        .find_dir_with_suffix("", ".xcodeproj")
        .ok_or_else(|| BuildError::config_patch("*.xcodeproj", "project bundle is missing"))?;
    let rel = format!("{xcodeproj}/project.pbxproj");
    let mut pbx = project.read_required(&rel)?;
    let build_number = config.version_code_number().to_string();
    let settings = [
        ("PRODUCT_BUNDLE_IDENTIFIER", config.package_id.as_str()),
        ("MARKETING_VERSION", config.version_name.as_str()),
        ("CURRENT_PROJECT_VERSION", build_number.as_str()),
        ("INFOPLIST_KEY_CFBundleDisplayName", config.app_name.as_str()),
        ("PRODUCT_NAME", config.app_name.as_str()),
    ];
    for (key, value) in settings {
        let changed = replace_pbx_setting(&mut pbx, key, value);
        if changed == 0 {
            tracing::debug!(key, "pbxproj setting not present, left alone");
        }
    }
    project.write(&rel, pbx)?;

    project.edit_json("WebApp/config.json", |doc| {
        set_json_path(doc, &["url"], json!(config.source_url));
        set_json_path(doc, &["appName"], json!(config.app_name));
    })?;

    let rel = "WebApp/Info.plist";
    if let Some(plist) = project.read_optional_bytes(rel)? {
        let out = set_plist_strings(&plist, &[("CFBundleDisplayName", config.app_name.as_str())])
            .map_err(|e| BuildError::config_patch(rel, e))?;
        project.write(rel, out)?;
    }

    project.write_privacy("WebApp/privacy_policy.md", config)
}

pub(super) fn windows(project: &mut Project, config: &AppConfig) -> Result<(), BuildError> {
    project.edit_json("config.json", |doc| set_runtime_config(doc, config))?;
    project.write_privacy("privacy_policy.txt", config)
}

pub(super) fn macos(project: &mut Project, config: &AppConfig) -> Result<(), BuildError> {
    let bundle = project
        .find_dir_with_suffix("", ".app")
        .ok_or_else(|| BuildError::config_patch("*.app", "app bundle is missing"))?;

    let rel = format!("{bundle}/Contents/Info.plist");
    let plist = project.read_required_bytes(&rel)?;
    let build_number = config.version_code_number().to_string();
    let out = set_plist_strings(
        &plist,
        &[
            ("CFBundleName", config.app_name.as_str()),
            ("CFBundleDisplayName", config.app_name.as_str()),
            ("CFBundleIdentifier", config.package_id.as_str()),
            ("CFBundleShortVersionString", config.version_name.as_str()),
            ("CFBundleVersion", build_number.as_str()),
        ],
    )
    .map_err(|e| BuildError::config_patch(&rel, e))?;
    project.write(&rel, out)?;

    project.edit_json(&format!("{bundle}/Contents/Resources/config.json"), |doc| {
        set_runtime_config(doc, config)
    })?;
    project.write_privacy(&format!("{bundle}/Contents/Resources/privacy_policy.md"), config)
}

pub(super) fn linux(project: &mut Project, config: &AppConfig) -> Result<(), BuildError> {
    project.edit_json("config.json", |doc| set_runtime_config(doc, config))?;

    let rel = "webapp.desktop";
    if let Some(entry) = project.read_optional(rel)? {
        let mut next = entry.clone();
        if let Some(out) = replace_desktop_key(&next, "Name", &config.app_name) {
            next = out;
        }
        if let Some(out) = replace_desktop_key(&next, "Comment", &config.description_or_default()) {
            next = out;
        }
        if next != entry {
            project.write(rel, next)?;
        }
    }

    project.write_privacy("privacy_policy.md", config)
}

pub(super) fn chrome_extension(project: &mut Project, config: &AppConfig) -> Result<(), BuildError> {
    project.edit_json("manifest.json", |doc| {
        set_json_path(doc, &["name"], json!(config.app_name));
        let short: String = config.app_name.chars().take(12).collect();
        set_json_path(doc, &["short_name"], json!(short));
        set_json_path(doc, &["version"], json!(numeric_version(&config.version_name)));
        set_json_path(doc, &["description"], json!(config.description_or_default()));
    })?;
    project.edit_json("config.json", |doc| set_runtime_config(doc, config))?;
    project.write_privacy("privacy_policy.md", config)
}

pub(super) fn wechat(project: &mut Project, config: &AppConfig) -> Result<(), BuildError> {
    project.edit_json("project.config.json", |doc| {
        set_json_path(doc, &["projectname"], json!(config.app_name));
        // Only real mini-program app ids are written; anything else keeps
        // the skeleton's placeholder.
        if config.package_id.starts_with("wx") {
            set_json_path(doc, &["appid"], json!(config.package_id));
        }
    })?;
    project.edit_json("app.json", |doc| {
        set_json_path(doc, &["window", "navigationBarTitleText"], json!(config.app_name));
    })?;
    project.edit_json("config.json", |doc| set_runtime_config(doc, config))?;
    project.write_privacy("privacy_policy.md", config)
}

pub(super) fn harmony(project: &mut Project, config: &AppConfig) -> Result<(), BuildError> {
    let rel = "AppScope/app.json5";
    let text = project.read_required(rel)?;
    let mut doc = parse_json5(&text).map_err(|e| BuildError::config_patch(rel, e))?;
    set_json_path(&mut doc, &["app", "bundleName"], json!(config.package_id));
    set_json_path(&mut doc, &["app", "versionName"], json!(config.version_name));
    set_json_path(&mut doc, &["app", "versionCode"], json!(config.version_code_number()));
    let out = to_json_string(&doc).map_err(|e| BuildError::config_patch(rel, e))?;
    project.write(rel, out)?;

    project.edit_json("entry/src/main/resources/rawfile/config.json", |doc| {
        set_runtime_config(doc, config)
    })?;

    for rel in [
        "AppScope/resources/base/element/string.json",
        "entry/src/main/resources/base/element/string.json",
    ] {
        project.edit_optional_json(rel, |doc| set_string_resource(doc, "app_name", &config.app_name))?;
    }

    project.write_privacy("entry/src/main/resources/rawfile/privacy_policy.md", config)
}

/// Set `{"string": [{"name": .., "value": ..}]}` style resource entries.
fn set_string_resource(doc: &mut Value, name: &str, value: &str) {
    let Some(entries) = doc.get_mut("string").and_then(Value::as_array_mut) else {
        return;
    };
    for entry in entries.iter_mut() {
        if entry.get("name").and_then(Value::as_str) == Some(name) {
            entry["value"] = json!(value);
        }
    }
}
