//! Local file-system names for repository paths
//!
//! A namespaced node name `ns:name` is stored on disk as `_ns_name`. Names
//! that already start with an underscore get a second one (`_x` -> `__x`) so
//! the mapping stays reversible. This is unrelated to the `_xHHHH_` escaping of
//! XML names in [`crate::content_xml`].

use std::path::{Path, PathBuf};

/// `cq:dialog` -> `_cq_dialog`
pub fn to_platform_name(name: &str) -> String {
    match name.split_once(':') {
        Some((ns, local)) if !ns.is_empty() && !ns.contains('_') => {
            format!("_{}_{}", ns, local)
        }
        _ if name.starts_with('_') => format!("_{}", name),
        _ => name.to_string(),
    }
}

/// `_cq_dialog` -> `cq:dialog`
pub fn to_repository_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("__") {
        return format!("_{}", rest);
    }
    if let Some(rest) = name.strip_prefix('_') {
        if let Some((ns, local)) = rest.split_once('_') {
            if !ns.is_empty() {
                return format!("{}:{}", ns, local);
            }
        }
    }
    name.to_string()
}

/// Map a repository path (`/content/site/jcr:content`) below a local root
pub fn to_platform_path(root: &Path, repository_path: &str) -> PathBuf {
    repository_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(to_platform_name(segment)))
}

/// Inverse of [`to_platform_path`]; `None` when `local` is outside `root`
pub fn to_repository_path(root: &Path, local: &Path) -> Option<String> {
    let relative = local.strip_prefix(root).ok()?;
    let mut path = String::new();
    for component in relative.components() {
        let segment = component.as_os_str().to_str()?;
        path.push('/');
        path.push_str(&to_repository_name(segment));
    }
    if path.is_empty() {
        path.push('/');
    }
    Some(path)
}
