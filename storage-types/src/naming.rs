//! Device-name sanitizing.

/// Reduce a proposed device or container name to the characters the
/// device-naming scheme accepts. Anything outside `[a-zA-Z0-9._-]` is
/// dropped, as are leading dashes and dots that device-mapper refuses.
pub fn safe_device_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    cleaned.trim_start_matches(['-', '.']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_device_name_strips_invalid_chars() {
        assert_eq!(safe_device_name("fedora_host name!"), "fedora_hostname");
        assert_eq!(safe_device_name("--weird"), "weird");
        assert_eq!(safe_device_name("plain-ok_1.2"), "plain-ok_1.2");
    }
}
