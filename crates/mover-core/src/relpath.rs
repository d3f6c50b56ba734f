//! Repository-relpath helpers.
//!
//! Relpaths are canonical, slash-separated, never absolute, with `""`
//! denoting the root itself.

/// Join two relpaths. Either side may be empty.
pub fn join(base: &str, child: &str) -> String {
    if base.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{child}")
    }
}

/// The parent portion of a relpath (`""` for a single component).
pub fn dirname(relpath: &str) -> &str {
    match relpath.rfind('/') {
        Some(i) => &relpath[..i],
        None => "",
    }
}

/// The final component of a relpath.
pub fn basename(relpath: &str) -> &str {
    match relpath.rfind('/') {
        Some(i) => &relpath[i + 1..],
        None => relpath,
    }
}

/// If `child` is `ancestor` or lies inside it, return the remainder
/// (`""` when they are equal). Otherwise `None`.
pub fn skip_ancestor<'a>(ancestor: &str, child: &'a str) -> Option<&'a str> {
    if ancestor.is_empty() {
        return Some(child);
    }
    if child == ancestor {
        return Some("");
    }
    child
        .strip_prefix(ancestor)
        .and_then(|rest| rest.strip_prefix('/'))
}

/// Canonicalize user-entered path input: strip leading/trailing slashes
/// and collapse `.` to the root.
pub fn canonicalize(input: &str) -> String {
    let trimmed = input.trim_matches('/');
    if trimmed == "." {
        String::new()
    } else {
        trimmed.to_string()
    }
}
