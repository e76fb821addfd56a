//! Project identity detection and alias registry (§4.C). Directly grounded
//! in the teacher's `projects/discovery.rs` — `normalize_remote`,
//! `get_git_remotes` via `std::process::Command`, and the directory crawl up
//! to `dirs::home_dir()` are kept nearly verbatim. What differs from the
//! teacher is the matching target: the teacher matches a directory against
//! existing Obsidian project notes, while here a detected identity is
//! registered into an alias group keyed by id/rootPath/gitRemote directly.

mod alias;
mod detect;

pub use alias::AliasRegistry;
pub use detect::detect;
