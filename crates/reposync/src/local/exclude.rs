//! Exclusion policy for local scans.

/// Directory and file names that are never synced.
const EXCLUDED_NAMES: &[&str] = &["node_modules", ".git", "dist", "build", ".next"];

/// Returns true if a single path segment is excluded.
///
/// Hidden names (leading `.`, e.g. `.DS_Store`) are excluded as well as
/// dependency caches, build output and VCS internals.
pub fn is_excluded_name(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED_NAMES.contains(&name)
}

/// Returns true if any segment of a forward-slash path is excluded.
pub fn is_excluded_path(path: &str) -> bool {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .any(is_excluded_name)
}

/// Normalizes a path reported by a folder picker.
///
/// Folder pickers prefix every path with the selected folder's own name
/// (`project/src/app.ts`); that segment is stripped so the folder's
/// contents land at the repository root. Backslashes are turned into
/// forward slashes. Returns `None` when nothing is left after stripping.
pub fn normalize_selected_path(raw: &str) -> Option<String> {
    let unified = raw.replace('\\', "/");
    let segments: Vec<&str> = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    if segments.len() < 2 {
        return None;
    }

    Some(segments[1..].join("/"))
}
