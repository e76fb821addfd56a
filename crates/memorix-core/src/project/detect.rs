use std::path::{Path, PathBuf};
use std::process::Command;

use crate::model::ProjectIdentity;

const PROJECT_MARKERS: &[&str] = &["package.json", "Cargo.toml", "go.mod", "pyproject.toml"];
const INVALID_SENTINEL: &str = "__invalid__";

/// Detect a project identity from a working directory (§4.C). The id is one
/// of: `owner/repo` (git remote found), `local/<basename>` (project marker
/// found), `__invalid__` (home or system directory, refuse initialization),
/// or `placeholder/<basename>` (none of the above).
pub fn detect(cwd: &Path) -> ProjectIdentity {
    if let Some((git_root, remote)) = find_git_root_and_remote(cwd) {
        if let Some(remote) = remote {
            let id = normalize_remote(&remote);
            return ProjectIdentity {
                id,
                name: basename(&git_root),
                root_path: normalize_root_path(&git_root),
                git_remote: Some(remote),
            };
        }
        // Git root with no readable remote: fall through to marker/placeholder
        // rules, rooted at the git root rather than cwd.
        return detect_without_remote(&git_root);
    }
    detect_without_remote(cwd)
}

fn detect_without_remote(dir: &Path) -> ProjectIdentity {
    if is_invalid_directory(dir) {
        return ProjectIdentity {
            id: INVALID_SENTINEL.to_string(),
            name: basename(dir),
            root_path: normalize_root_path(dir),
            git_remote: None,
        };
    }
    if PROJECT_MARKERS.iter().any(|marker| dir.join(marker).is_file()) {
        return ProjectIdentity {
            id: format!("local/{}", basename(dir)),
            name: basename(dir),
            root_path: normalize_root_path(dir),
            git_remote: None,
        };
    }
    ProjectIdentity {
        id: format!("placeholder/{}", basename(dir)),
        name: basename(dir),
        root_path: normalize_root_path(dir),
        git_remote: None,
    }
}

fn is_invalid_directory(dir: &Path) -> bool {
    let home = dirs::home_dir();
    if home.as_deref() == Some(dir) {
        return true;
    }
    if dir == Path::new("/") {
        return true;
    }
    matches!(
        dir.to_str(),
        Some("/usr") | Some("/etc") | Some("/var") | Some("/bin") | Some("/sbin") | Some("/root")
    )
}

fn basename(dir: &Path) -> String {
    dir.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Forward-slash, strip trailing slash, lowercase on case-insensitive
/// filesystems (here: always lowercase for determinism across hosts, the
/// same normalization the alias registry applies when matching rootPaths).
fn normalize_root_path(dir: &Path) -> String {
    let mut s = dir.to_string_lossy().replace('\\', "/");
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}

/// Walk from `dir` up through ancestors looking for a `.git` directory.
/// Returns the git root and, if obtainable, its origin remote URL.
fn find_git_root_and_remote(dir: &Path) -> Option<(PathBuf, Option<String>)> {
    let mut current = Some(dir);
    while let Some(candidate) = current {
        if candidate.join(".git").exists() {
            let remote = read_origin_remote(candidate);
            return Some((candidate.to_path_buf(), remote));
        }
        current = candidate.parent();
    }
    None
}

fn read_origin_remote(git_root: &Path) -> Option<String> {
    if let Some(url) = run_git_config(git_root) {
        return Some(url);
    }
    parse_git_config_file(git_root)
}

fn run_git_config(git_root: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["-c", "safe.directory=*", "config", "--get", "remote.origin.url"])
        .current_dir(git_root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if url.is_empty() { None } else { Some(url) }
}

/// Fallback for permission-denied `git config` invocations: parse
/// `.git/config` directly for `[remote "origin"] url = ...`.
fn parse_git_config_file(git_root: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(git_root.join(".git").join("config")).ok()?;
    let mut in_origin_section = false;
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_origin_section = trimmed == "[remote \"origin\"]";
            continue;
        }
        if in_origin_section {
            if let Some(rest) = trimmed.strip_prefix("url") {
                if let Some(value) = rest.trim_start().strip_prefix('=') {
                    return Some(value.trim().to_string());
                }
            }
        }
    }
    None
}

/// Normalize a git remote URL to `owner/repo` form: strip scheme, host,
/// `.git` suffix, leading path segments (grounded in the teacher's
/// `normalize_remote`, narrowed from a full `host/path` form to exactly
/// `owner/repo` per §4.C.1).
pub fn normalize_remote(remote: &str) -> String {
    let mut normalized = remote.trim().to_string();

    if let Some(rest) = normalized.strip_prefix("git@") {
        normalized = rest.replacen(':', "/", 1);
    } else if let Some(rest) = normalized.strip_prefix("ssh://git@") {
        normalized = rest.to_string();
    } else if let Some(rest) = normalized.strip_prefix("https://") {
        normalized = rest.to_string();
    } else if let Some(rest) = normalized.strip_prefix("http://") {
        normalized = rest.to_string();
    } else if let Some(rest) = normalized.strip_prefix("ssh://") {
        normalized = rest.to_string();
    }

    if let Some(stripped) = normalized.strip_suffix(".git") {
        normalized = stripped.to_string();
    }
    while normalized.ends_with('/') {
        normalized.pop();
    }

    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let owner_repo = if segments.len() >= 2 {
        segments[segments.len() - 2..].join("/")
    } else {
        normalized.clone()
    };
    owner_repo.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_remote_handles_ssh_form() {
        assert_eq!(normalize_remote("git@github.com:acme/app.git"), "acme/app");
    }

    #[test]
    fn normalize_remote_handles_https_form() {
        assert_eq!(
            normalize_remote("https://github.com/acme/app.git"),
            "acme/app"
        );
    }

    #[test]
    fn normalize_remote_strips_trailing_slash_and_lowercases() {
        assert_eq!(normalize_remote("https://GitHub.com/Acme/App/"), "acme/app");
    }

    #[test]
    fn detect_without_remote_finds_cargo_toml_marker() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        let identity = detect_without_remote(dir.path());
        assert!(identity.id.starts_with("local/"));
    }

    #[test]
    fn detect_without_remote_falls_back_to_placeholder() {
        let dir = TempDir::new().unwrap();
        let identity = detect_without_remote(dir.path());
        assert!(identity.id.starts_with("placeholder/"));
    }

    #[test]
    fn detect_flags_root_as_invalid() {
        let identity = detect_without_remote(Path::new("/"));
        assert_eq!(identity.id, INVALID_SENTINEL);
    }
}
