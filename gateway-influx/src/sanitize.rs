/// Makes `name` a valid metric or label name.
///
/// Every character outside of `[A-Za-z0-9_]` is replaced with `_`, and a leading digit is
/// prefixed with `_`. Applying this twice yields the same result as applying it once.
///
/// ```
/// use gateway_influx::sanitize_name;
///
/// assert_eq!(sanitize_name("disk.used-percent"), "disk_used_percent");
/// assert_eq!(sanitize_name("95th"), "_95th");
/// ```
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len() + 1);
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.push('_');
    }

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            sanitized.push(c);
        } else {
            sanitized.push('_');
        }
    }

    sanitized
}
