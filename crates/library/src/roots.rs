use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use common::{join_relpath, split_virtual, Root};
use tracing::warn;

const DEFAULT_SLUG: &str = "audio";
const DEFAULT_DISPLAY_NAME: &str = "Audio";

/// Ordered set of configured roots with a slug lookup.
#[derive(Clone, Debug)]
pub struct RootRegistry {
    roots: Vec<Root>,
    by_slug: HashMap<String, usize>,
}

impl RootRegistry {
    /// Parses `path[:name],path[:name],...`. Falls back to `<cwd>/public/audio`
    /// when nothing usable is configured.
    pub fn parse(config: &str) -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::parse_with_base(config, &base)
    }

    pub fn parse_with_base(config: &str, base: &Path) -> Self {
        let mut used = HashSet::new();
        let mut roots = Vec::new();

        for entry in config.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (path, name) = split_entry(entry);
            let path = path.trim();
            if path.is_empty() {
                warn!("Ignoring audio root entry without a path: {:?}", entry);
                continue;
            }
            let display_name = match name.map(str::trim).filter(|n| !n.is_empty()) {
                Some(name) => name.to_string(),
                None => Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.to_string()),
            };
            let slug = unique_slug(&display_name, &mut used);
            roots.push(Root {
                path: PathBuf::from(path),
                display_name,
                slug,
            });
        }

        if roots.is_empty() {
            roots.push(Root {
                path: base.join("public").join("audio"),
                display_name: DEFAULT_DISPLAY_NAME.to_string(),
                slug: DEFAULT_SLUG.to_string(),
            });
        }

        Self::from_roots(roots)
    }

    pub fn from_roots(roots: Vec<Root>) -> Self {
        let by_slug = roots
            .iter()
            .enumerate()
            .map(|(idx, root)| (root.slug.clone(), idx))
            .collect();
        Self { roots, by_slug }
    }

    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    pub fn get(&self, slug: &str) -> Option<&Root> {
        self.by_slug.get(slug).map(|idx| &self.roots[*idx])
    }

    /// Maps a virtual path onto the filesystem. Unknown slugs, `..` segments
    /// and absolute remainders are rejected.
    pub fn resolve(&self, virtual_path: &str) -> Option<PathBuf> {
        let (slug, rest) = split_virtual(virtual_path);
        let root = self.get(slug)?;
        let rel = Path::new(rest);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return None,
            }
        }
        Some(join_relpath(&root.path, rest))
    }
}

fn split_entry(entry: &str) -> (&str, Option<&str>) {
    match entry.rfind(':') {
        // `C:\music` is a drive prefix, not a name separator.
        Some(1) if entry.as_bytes()[0].is_ascii_alphabetic() => (entry, None),
        Some(idx) => (&entry[..idx], Some(&entry[idx + 1..])),
        None => (entry, None),
    }
}

pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !out.ends_with('-') {
                out.push('-');
            }
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

fn unique_slug(name: &str, used: &mut HashSet<String>) -> String {
    let base = slugify(name);
    let mut slug = base.clone();
    let mut counter = 1;
    while used.contains(&slug) {
        slug = format!("{}-{}", base, counter);
        counter += 1;
    }
    used.insert(slug.clone());
    slug
}
