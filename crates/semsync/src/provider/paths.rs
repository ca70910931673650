//! Repository layout helpers.

/// Directory holding one record per concept.
pub const CONCEPTS_DIR: &str = "vocabulary/concepts";

/// Extension appended to logical paths that have none.
pub const RECORD_EXTENSION: &str = "ttl";

/// Files written by [`Provider::create_semantic_space`](super::Provider::create_semantic_space).
pub const PROFILE_WEBID: &str = "profile/webid.ttl";
pub const PROFILE_PREFERENCES: &str = "profile/preferences.ttl";
pub const FEDERATION_SUBSCRIPTIONS: &str = "federation/subscriptions.ttl";
pub const FEDERATION_PERMISSIONS: &str = "federation/permissions.ttl";
pub const FEDERATION_CROSS_REFS: &str = "federation/cross-refs.ttl";

const PREFIXES: &str = "@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .\n\
@prefix schema: <http://schema.org/> .\n\
@prefix redstring: <https://redstring.io/vocab/> .\n";

/// Standard files of a new semantic space with their initial content.
#[must_use]
pub fn standard_layout(space: &str) -> Vec<(&'static str, String)> {
    vec![
        (
            PROFILE_WEBID,
            format!("{PREFIXES}\n<#me> a schema:Person ;\n    rdfs:label \"{space}\" .\n"),
        ),
        (
            PROFILE_PREFERENCES,
            format!("{PREFIXES}\n<#preferences> a redstring:Preferences .\n"),
        ),
        (
            FEDERATION_SUBSCRIPTIONS,
            format!("{PREFIXES}\n<#subscriptions> a redstring:SubscriptionList .\n"),
        ),
        (
            FEDERATION_PERMISSIONS,
            format!("{PREFIXES}\n<#permissions> a redstring:PermissionSet .\n"),
        ),
        (
            FEDERATION_CROSS_REFS,
            format!("{PREFIXES}\n<#cross-refs> a redstring:CrossReferenceList .\n"),
        ),
    ]
}

/// Trim surrounding slashes and collapse empty segments.
#[must_use]
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Join two relative paths.
#[must_use]
pub fn join(base: &str, path: &str) -> String {
    let base = normalize(base);
    let path = normalize(path);
    match (base.is_empty(), path.is_empty()) {
        (true, _) => path,
        (false, true) => base,
        (false, false) => format!("{base}/{path}"),
    }
}

/// Append `.ttl` when the last segment has no extension.
#[must_use]
pub fn ensure_ttl_extension(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    if file.contains('.') {
        path.to_string()
    } else {
        format!("{path}.{RECORD_EXTENSION}")
    }
}

/// Percent-escape every byte outside `[A-Za-z0-9_-]`.
///
/// The result is a valid file name and a valid Turtle local name as long as it
/// does not start with `-`, which is escaped as well.
#[must_use]
pub fn escape_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, byte) in raw.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || byte == b'_' || (byte == b'-' && i > 0);
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Inverse of [`escape_name`]. `None` for malformed escapes or non-UTF-8 results.
#[must_use]
pub fn unescape_name(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Record path of a concept, relative to the semantic space root.
///
/// Ids are opaque, so they are escaped with [`escape_name`]: one id per file and
/// no accidental subdirectories.
#[must_use]
pub fn concept_path(id: &str) -> String {
    format!("{CONCEPTS_DIR}/{}.{RECORD_EXTENSION}", escape_name(id))
}

/// Inverse of [`concept_path`] for a file name (`foo%2Fbar.ttl` → `foo/bar`).
#[must_use]
pub fn concept_id_from_file(name: &str) -> Option<String> {
    let stem = name.strip_suffix(&format!(".{RECORD_EXTENSION}"))?;
    unescape_name(stem)
}
