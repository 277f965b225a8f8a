//! Format-level rewrites. Every function touches only the keys it is asked
//! to change and returns the rest of the document as it found it.

use std::io::Cursor;

use regex::Regex;
use serde_json::{Map, Value};

/// Set `value` at a nested object path, creating intermediate objects.
pub fn set_json_path(doc: &mut Value, path: &[&str], value: Value) {
    match path.split_first() {
        None => *doc = value,
        Some((key, rest)) => {
            if !doc.is_object() {
                *doc = Value::Object(Map::new());
            }
            if let Value::Object(obj) = doc {
                let child = obj.entry(key.to_string()).or_insert(Value::Null);
                set_json_path(child, rest, value);
            }
        }
    }
}

pub fn parse_json(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))
}

/// Pretty JSON with a trailing newline.
pub fn to_json_string(doc: &Value) -> Result<String, String> {
    serde_json::to_string_pretty(doc)
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| e.to_string())
}

/// JSON5 input is accepted; output is plain JSON, which JSON5 readers accept.
pub fn parse_json5(text: &str) -> Result<Value, String> {
    json5::from_str::<Value>(text).map_err(|e| format!("invalid JSON5: {e}"))
}

/// Replace the value of `attr="..."` wherever it appears.
///
/// Returns `None` when the attribute is absent so callers can leave the file
/// untouched.
pub fn replace_xml_attr(xml: &str, attr: &str, value: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"({}\s*=\s*)"[^"]*""#, regex::escape(attr))).ok()?;
    if !re.is_match(xml) {
        return None;
    }
    let escaped = xml_escape(value);
    Some(
        re.replace_all(xml, |caps: &regex::Captures| {
            format!("{}\"{}\"", &caps[1], escaped)
        })
        .into_owned(),
    )
}

/// Replace the text of `<string name="{name}">...</string>`.
pub fn replace_android_string(xml: &str, name: &str, value: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#"(<string\s+name="{}"[^>]*>)[^<]*(</string>)"#,
        regex::escape(name)
    ))
    .ok()?;
    if !re.is_match(xml) {
        return None;
    }
    let escaped = android_string_escape(value);
    Some(
        re.replace_all(xml, |caps: &regex::Captures| {
            format!("{}{}{}", &caps[1], escaped, &caps[2])
        })
        .into_owned(),
    )
}

/// Replace every `KEY = value;` assignment of `key` in a pbxproj file.
/// Returns how many assignments changed.
pub fn replace_pbx_setting(pbx: &mut String, key: &str, value: &str) -> usize {
    let Ok(re) = Regex::new(&format!(r"(\b{}\s*=\s*)[^;]*;", regex::escape(key))) else {
        return 0;
    };
    let count = re.find_iter(pbx).count();
    if count == 0 {
        return 0;
    }
    let rendered = format!("{};", pbx_quote(value));
    let replaced = re
        .replace_all(pbx, |caps: &regex::Captures| format!("{}{}", &caps[1], rendered))
        .into_owned();
    *pbx = replaced;
    count
}

/// Replace `Key=...` lines of a freedesktop entry.
pub fn replace_desktop_key(entry: &str, key: &str, value: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?m)^({}\s*=).*$", regex::escape(key))).ok()?;
    if !re.is_match(entry) {
        return None;
    }
    let escaped = desktop_escape(value);
    Some(
        re.replace_all(entry, |caps: &regex::Captures| format!("{}{}", &caps[1], escaped))
            .into_owned(),
    )
}

const BINARY_PLIST_MAGIC: &[u8] = b"bplist00";

/// Set string keys on a property list's top-level dictionary. The list is
/// written back in the encoding it came in (binary or XML).
pub fn set_plist_strings(bytes: &[u8], values: &[(&str, &str)]) -> Result<Vec<u8>, String> {
    let mut doc = plist::Value::from_reader(Cursor::new(bytes))
        .map_err(|e| format!("invalid property list: {e}"))?;
    let dict = doc
        .as_dictionary_mut()
        .ok_or_else(|| "property list root is not a dictionary".to_string())?;
    for (key, value) in values {
        dict.insert((*key).to_string(), plist::Value::String((*value).to_string()));
    }
    let mut out = Vec::new();
    let written = if bytes.starts_with(BINARY_PLIST_MAGIC) {
        doc.to_writer_binary(&mut out)
    } else {
        doc.to_writer_xml(&mut out)
    };
    written.map_err(|e| format!("failed to write property list: {e}"))?;
    Ok(out)
}

fn pbx_quote(value: &str) -> String {
    let bare = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if bare {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Desktop entry string escapes; a value always stays on one line.
fn desktop_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn android_string_escape(value: &str) -> String {
    xml_escape(value).replace('\'', "\\'")
}

/// Reduce a free-form version to the 1-4 dotted integers browsers require.
pub fn numeric_version(version: &str) -> String {
    let parts: Vec<&str> = version
        .split('.')
        .map_while(|part| {
            let digits: &str = part
                .find(|c: char| !c.is_ascii_digit())
                .map(|end| &part[..end])
                .unwrap_or(part);
            (!digits.is_empty() && digits.len() == part.len()).then_some(digits)
        })
        .take(4)
        .collect();
    if parts.is_empty() {
        "1.0.0".to_string()
    } else {
        parts.join(".")
    }
}
