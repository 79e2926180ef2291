//! Lexical helpers for slash-delimited virtual paths.
//!
//! Nothing here touches a filesystem. All results are rooted (`/`-prefixed)
//! and `..` never climbs above the root.

/// Rooted, normalized form of `path`: empty and `.` segments dropped, `..`
/// resolved, no trailing slash (except for the root itself).
pub fn clean(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    format!("/{}", out.join("/"))
}

/// The segments of `path` after cleaning.
pub fn split(path: &str) -> Vec<String> {
    clean(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `dir` + `/` + `name`, cleaned.
pub fn join(dir: &str, name: &str) -> String {
    clean(&format!("{dir}/{name}"))
}

/// Last segment of `path`, or `/` for the root.
pub fn base_name(path: &str) -> String {
    let cleaned = clean(path);
    match cleaned.rsplit('/').next() {
        Some("") | None => "/".to_string(),
        Some(name) => name.to_string(),
    }
}
