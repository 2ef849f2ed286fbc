//! Control-plane resource naming.

use rand::Rng;

/// Project name for a topology.
#[must_use]
pub fn project_name(topology: &str) -> String {
    format!("project_{topology}")
}

/// Template name for an image file: alphanumerics of `tpl_<file name>`.
#[must_use]
pub fn template_name(image_file_name: &str) -> String {
    clean_alnum(&format!("tpl_{image_file_name}"))
}

/// Keep ASCII alphanumerics only.
#[must_use]
pub fn clean_alnum(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Replace every run of characters outside `[A-Za-z0-9_-]` with one `_`.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// `<base>-<4 hex digits>`.
#[must_use]
pub fn generated_node_name(base: &str) -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("{base}-{suffix:04x}")
}
