use sha2::{Digest, Sha256};

const MAX_BASE_CHARS: usize = 50;

/// Deterministic export filename: `{sanitized_title}--{short_hash(source)}.html`
pub fn export_filename(title: &str, source: &str) -> String {
    let mut sanitized = clean_file_name(title);
    if sanitized.is_empty() {
        sanitized = "untitled".to_string();
    }
    if is_reserved_windows_name(&sanitized) {
        sanitized.push('_');
    }
    let hash = short_hash(source);
    format!("{sanitized}--{hash}.html")
}

/// Upload name for the `index`-th (0-based) local image of an article:
/// `{title}-{section}-{NN}.{ext}`, the section part omitted when empty.
pub fn smart_image_name(title: &str, section: &str, index: usize, original: &str) -> String {
    let clean_title = clean_file_name(title);
    let clean_section = clean_file_name(section);
    let joined = if clean_section.is_empty() {
        clean_title
    } else {
        format!("{clean_title}-{clean_section}")
    };
    let mut base = clean_file_name(&joined);
    if base.is_empty() {
        base = "image".to_string();
    }
    format!("{base}-{:02}.{}", index + 1, extension_of(original))
}

/// Strips path-unsafe characters, turns whitespace runs into one hyphen,
/// collapses repeated hyphens, trims edge hyphens and caps the result.
pub fn clean_file_name(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_hyphen = false;
    for c in input.chars().filter(|c| !is_forbidden(*c)) {
        let c = if c.is_whitespace() { '-' } else { c };
        if c == '-' {
            if !prev_hyphen {
                compacted.push(c);
            }
            prev_hyphen = true;
        } else {
            compacted.push(c);
            prev_hyphen = false;
        }
    }
    let trimmed = compacted.trim_matches('-');
    let capped: String = trimmed.chars().take(MAX_BASE_CHARS).collect();
    capped.trim_end_matches('-').to_string()
}

fn extension_of(name: &str) -> String {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_string(),
        _ => "png".to_string(),
    }
}

fn is_forbidden(c: char) -> bool {
    const PATH_UNSAFE: &str = "\\/:*?\"<>|";
    PATH_UNSAFE.contains(c) || (c.is_control() && !c.is_whitespace())
}

/// Device names Windows refuses as file stems: CON, PRN, AUX, NUL, COM1-9
/// and LPT1-9.
fn is_reserved_windows_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => ["COM", "LPT"].iter().any(|device| {
            upper
                .strip_prefix(device)
                .is_some_and(|n| n.len() == 1 && matches!(n.as_bytes()[0], b'1'..=b'9'))
        }),
    }
}

/// First eight hex digits of the SHA-256 of `input`.
fn short_hash(input: &str) -> String {
    Sha256::digest(input.as_bytes())[..4]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
