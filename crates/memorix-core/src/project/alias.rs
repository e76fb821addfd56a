use crate::model::{AliasGroup, AliasRegistryFile, ProjectIdentity};

/// Priority used to pick the canonical id within a group: git-remote form
/// beats `local/*`, which beats `placeholder/*`, which beats anything else.
fn priority(id: &str) -> u8 {
    if id.starts_with("local/") {
        2
    } else if id.starts_with("placeholder/") {
        1
    } else if id == "__invalid__" {
        0
    } else {
        3 // a bare `owner/repo` git-remote form
    }
}

/// In-memory wrapper around `AliasRegistryFile`, grounded in the shape of
/// the teacher's directory-crawl/project-matching logic in
/// `projects/discovery.rs`, repurposed to persist match groups directly
/// instead of matching against Obsidian project notes.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    groups: Vec<AliasGroup>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(file: AliasRegistryFile) -> Self {
        Self {
            groups: file.groups,
        }
    }

    pub fn to_file(&self) -> AliasRegistryFile {
        AliasRegistryFile {
            version: 1,
            groups: self.groups.clone(),
        }
    }

    pub fn groups(&self) -> &[AliasGroup] {
        &self.groups
    }

    fn find_group_index(&self, identity: &ProjectIdentity) -> Option<usize> {
        let normalized_root = normalize_root_path(&identity.root_path);
        self.groups.iter().position(|group| {
            group.aliases.iter().any(|a| a == &identity.id)
                || group
                    .root_paths
                    .iter()
                    .any(|p| normalize_root_path(p) == normalized_root)
                || (identity.git_remote.is_some() && group.git_remote == identity.git_remote)
        })
    }

    /// Register a detected identity: find an existing group by id, rootPath,
    /// or gitRemote; union in, or create a new singleton group.
    pub fn register(&mut self, identity: &ProjectIdentity) -> String {
        match self.find_group_index(identity) {
            Some(idx) => {
                let group = &mut self.groups[idx];
                if !group.aliases.contains(&identity.id) {
                    group.aliases.push(identity.id.clone());
                }
                if !group.root_paths.contains(&identity.root_path) {
                    group.root_paths.push(identity.root_path.clone());
                }
                if group.git_remote.is_none() {
                    group.git_remote = identity.git_remote.clone();
                }
                recompute_canonical(group);
                group.canonical.clone()
            }
            None => {
                let group = AliasGroup {
                    canonical: identity.id.clone(),
                    aliases: vec![identity.id.clone()],
                    root_paths: vec![identity.root_path.clone()],
                    git_remote: identity.git_remote.clone(),
                };
                self.groups.push(group);
                identity.id.clone()
            }
        }
    }

    /// Every id in the group containing `id`, or `[id]` if none contains it.
    pub fn resolve_aliases(&self, id: &str) -> Vec<String> {
        for group in &self.groups {
            if group.aliases.iter().any(|a| a == id) {
                return group.aliases.clone();
            }
        }
        vec![id.to_string()]
    }

    pub fn canonical_of(&self, id: &str) -> Option<String> {
        self.groups
            .iter()
            .find(|g| g.aliases.iter().any(|a| a == id))
            .map(|g| g.canonical.clone())
    }

    /// Merge any two groups whose ids differ only by prefix
    /// (`placeholder/foo`, `local/foo`, `acme/foo`), one-shot at startup.
    pub fn auto_merge_by_basename(&mut self) {
        let mut merged: Vec<AliasGroup> = Vec::new();
        'outer: for group in std::mem::take(&mut self.groups) {
            for existing in merged.iter_mut() {
                if groups_share_basename(existing, &group) {
                    for alias in group.aliases {
                        if !existing.aliases.contains(&alias) {
                            existing.aliases.push(alias);
                        }
                    }
                    for path in group.root_paths {
                        if !existing.root_paths.contains(&path) {
                            existing.root_paths.push(path);
                        }
                    }
                    if existing.git_remote.is_none() {
                        existing.git_remote = group.git_remote;
                    }
                    recompute_canonical(existing);
                    continue 'outer;
                }
            }
            merged.push(group);
        }
        self.groups = merged;
    }
}

fn basename_of(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

fn groups_share_basename(a: &AliasGroup, b: &AliasGroup) -> bool {
    a.aliases
        .iter()
        .any(|x| b.aliases.iter().any(|y| basename_of(x) == basename_of(y)))
}

fn recompute_canonical(group: &mut AliasGroup) {
    group.canonical = group
        .aliases
        .iter()
        .max_by_key(|id| priority(id))
        .cloned()
        .unwrap_or_else(|| group.canonical.clone());
}

fn normalize_root_path(path: &str) -> String {
    let mut s = path.replace('\\', "/").to_lowercase();
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str, root: &str, remote: Option<&str>) -> ProjectIdentity {
        ProjectIdentity {
            id: id.to_string(),
            name: "app".to_string(),
            root_path: root.to_string(),
            git_remote: remote.map(String::from),
        }
    }

    #[test]
    fn register_creates_a_singleton_group_for_a_new_identity() {
        let mut registry = AliasRegistry::new();
        let canonical = registry.register(&identity("local/app", "/home/u/app", None));
        assert_eq!(canonical, "local/app");
        assert_eq!(registry.resolve_aliases("local/app"), vec!["local/app"]);
    }

    #[test]
    fn register_unions_matching_root_path_into_existing_group() {
        let mut registry = AliasRegistry::new();
        registry.register(&identity("placeholder/app", "/home/u/app", None));
        let canonical = registry.register(&identity("local/app", "/home/u/app", None));
        assert_eq!(canonical, "local/app");
        let aliases = registry.resolve_aliases("placeholder/app");
        assert!(aliases.contains(&"local/app".to_string()));
        assert!(aliases.contains(&"placeholder/app".to_string()));
    }

    #[test]
    fn canonical_priority_prefers_git_remote_over_local_over_placeholder() {
        let mut registry = AliasRegistry::new();
        registry.register(&identity("placeholder/app", "/home/u/app", None));
        registry.register(&identity("local/app", "/home/u/app", None));
        let canonical = registry.register(&identity(
            "acme/app",
            "/home/u/app",
            Some("git@github.com:acme/app.git"),
        ));
        assert_eq!(canonical, "acme/app");
    }

    #[test]
    fn auto_merge_by_basename_unions_prefix_variants() {
        let mut registry = AliasRegistry::new();
        registry.register(&identity("placeholder/foo", "/a/foo", None));
        registry.register(&identity("local/foo", "/b/foo", None));
        assert_eq!(registry.groups().len(), 2);
        registry.auto_merge_by_basename();
        assert_eq!(registry.groups().len(), 1);
        assert_eq!(registry.groups()[0].canonical, "local/foo");
    }

    #[test]
    fn resolve_aliases_returns_singleton_for_unknown_id() {
        let registry = AliasRegistry::new();
        assert_eq!(registry.resolve_aliases("acme/app"), vec!["acme/app"]);
    }
}
