//! Minimal reader of git configuration files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Env;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
}

impl Identity {
    fn is_empty(&self) -> bool {
        self.name.is_empty() && self.email.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteUrl {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Remote {
    pub fetch: RemoteUrl,
    pub push: RemoteUrl,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Identity>,
    pub remotes: BTreeMap<String, Remote>,
}

/// `section -> key -> value`, with subsections flattened as `remote.origin`.
type Sections = BTreeMap<String, BTreeMap<String, String>>;

fn parse_config(raw: &str) -> Sections {
    let mut sections = Sections::new();
    let mut current = String::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            current = match header.split_once(char::is_whitespace) {
                Some((section, subsection)) => format!(
                    "{}.{}",
                    section.to_ascii_lowercase(),
                    subsection.trim().trim_matches('"')
                ),
                None => header.to_ascii_lowercase(),
            };
            continue;
        }
        if current.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=').unwrap_or((line, "true"));
        sections
            .entry(current.clone())
            .or_default()
            .insert(key.trim().to_ascii_lowercase(), unquote(value.trim()));
    }

    sections
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// The git directory of the repository containing `start`, walking up the tree.
pub fn find_git_dir(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(directory) = current {
        let candidate = directory.join(".git");
        if candidate.is_dir() {
            return Some(candidate);
        }
        // Worktrees and submodules point to their git directory from a `.git` file.
        if candidate.is_file()
            && let Ok(raw) = fs::read_to_string(&candidate)
            && let Some(target) = raw.trim().strip_prefix("gitdir:")
        {
            return Some(directory.join(target.trim()));
        }
        current = directory.parent();
    }
    None
}

fn identity(sections: &Sections, section: &str) -> Option<Identity> {
    let values = sections.get(section)?;
    let identity = Identity {
        name: values.get("name").cloned().unwrap_or_default(),
        email: values.get("email").cloned().unwrap_or_default(),
    };
    (!identity.is_empty()).then_some(identity)
}

/// Collects git information about the repository containing `start`.
///
/// The user falls back to `~/.gitconfig`; the author comes from `GIT_AUTHOR_*`.
pub fn discover(start: &Path, home: Option<&Path>, env: &dyn Env) -> Option<GitInfo> {
    let git_dir = find_git_dir(start)?;
    let sections = fs::read_to_string(git_dir.join("config"))
        .map(|raw| parse_config(&raw))
        .ok()?;

    let mut remotes = BTreeMap::new();
    for (section, values) in &sections {
        let Some(name) = section.strip_prefix("remote.") else {
            continue;
        };
        let fetch = values.get("url").cloned().unwrap_or_default();
        let push = values.get("pushurl").cloned().unwrap_or_else(|| fetch.clone());
        remotes.insert(
            name.to_string(),
            Remote {
                fetch: RemoteUrl { url: fetch },
                push: RemoteUrl { url: push },
            },
        );
    }

    let user = identity(&sections, "user").or_else(|| {
        let raw = fs::read_to_string(home?.join(".gitconfig")).ok()?;
        identity(&parse_config(&raw), "user")
    });

    let author = Identity {
        name: env.var("GIT_AUTHOR_NAME").unwrap_or_default(),
        email: env.var("GIT_AUTHOR_EMAIL").unwrap_or_default(),
    };

    Some(GitInfo {
        user,
        author: (!author.is_empty()).then_some(author),
        remotes,
    })
}
