//! Text scraping for package-manager and registry output.
//!
//! None of the tracking tools have a structured output mode, so every
//! heuristic lives here behind small functions with table tests. A line that
//! does not match is skipped, never an error.

use std::collections::BTreeMap;

/// Architecture suffixes RPM appends to `name-version-release`.
const RPM_ARCH_SUFFIXES: &[&str] = &[".x86_64", ".ppc64le", ".noarch", ".aarch64", ".s390x", ".i686"];

/// Version that follows `id` + `separator` on a listing line.
///
/// The id match is case-insensitive and must start the line or follow a
/// non-identifier character, and the separator must be followed by a digit.
/// This keeps `TIVsm-BA` from matching `TIVsm-BAcit-8.1.0`.
pub fn extract_version(line: &str, id: &str, separator: char) -> Option<String> {
    if id.is_empty() {
        return None;
    }
    let hay = line.to_ascii_lowercase();
    let needle = id.to_ascii_lowercase();

    let mut from = 0;
    while let Some(pos) = hay[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        from = start + needle.chars().next().map_or(1, char::len_utf8);

        let boundary_ok = hay[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_ident_char(c));
        if !boundary_ok {
            continue;
        }

        let mut rest = line[end..].chars();
        if rest.next() != Some(separator) {
            continue;
        }
        let tail = rest.as_str();
        if !tail.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let version: String = tail.chars().take_while(|c| !c.is_whitespace()).collect();
        return Some(version);
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

/// Scan listing output for every id. The first match per id wins.
pub fn parse_listing(
    output: &str,
    ids: &[String],
    separator: char,
    normalize: Option<fn(&str) -> String>,
) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        for id in ids {
            if found.contains_key(id) {
                continue;
            }
            if let Some(raw) = extract_version(line, id, separator) {
                let version = normalize.map_or_else(|| raw.clone(), |f| f(&raw));
                found.insert(id.clone(), version);
            }
        }
    }
    found
}

/// `8.1.20-0.x86_64` becomes `8.1.20.0`.
pub fn normalize_rpm_version(raw: &str) -> String {
    let trimmed = RPM_ARCH_SUFFIXES
        .iter()
        .find_map(|suffix| raw.strip_suffix(suffix))
        .unwrap_or(raw);
    trimmed.replace('-', ".")
}

/// Installation-manager offering version to the product's dotted form.
///
/// The third field packs modification and fix level as `mod * 1000 + fix`,
/// and a build stamp follows: `8.1.20100.20240101_0930` is `8.1.20.100`.
/// Anything not in that shape is returned unchanged.
pub fn normalize_im_version(raw: &str) -> String {
    let mut fields = raw.split('.');
    let (Some(major), Some(minor), Some(packed)) = (fields.next(), fields.next(), fields.next()) else {
        return raw.to_string();
    };
    let numeric = |f: &str| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit());
    if !(numeric(major) && numeric(minor) && numeric(packed)) || packed.len() < 4 {
        return raw.to_string();
    }
    match packed.parse::<u64>() {
        Ok(n) => format!("{}.{}.{}.{}", major, minor, n / 1000, n % 1000),
        Err(_) => raw.to_string(),
    }
}

/// Data of `value` from `reg query <key> /v <value>` output.
///
/// ```text
/// HKEY_LOCAL_MACHINE\SOFTWARE\IBM\ADSM\CurrentVersion
///     PTF    REG_SZ    8.1.20.0
/// ```
pub fn parse_reg_query(output: &str, value: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let kind = parts.next()?;
        if !name.eq_ignore_ascii_case(value) || !kind.starts_with("REG_") {
            return None;
        }
        let data = parts.collect::<Vec<_>>().join(" ");
        (!data.is_empty()).then_some(data)
    })
}
