//! Include directive resolution.
//!
//! `<include>relative/path</include>` anywhere in a body is replaced by the
//! body of the referenced file (front matter stripped). Paths resolve
//! against the directory of the file containing the directive, and the
//! spliced content is expanded again relative to its own location.
//!
//! A directive whose target cannot be read, has broken front matter, or is
//! already being expanded further up the chain is left in place verbatim
//! and reported as a warning.

use regex::{Captures, Regex};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

use crate::frontmatter;

static INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<include>([^<]*)</include>").expect("valid include regex"));

/// Result of expanding a document body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub body: String,
    pub warnings: Vec<String>,
}

/// Expand every include directive in `body`, which was read from `file`.
pub fn resolve_includes(body: &str, file: &Path) -> Resolution {
    let mut chain = vec![path_key(file)];
    let mut warnings = Vec::new();
    let body = expand(body, file, &mut chain, &mut warnings);
    Resolution { body, warnings }
}

fn expand(body: &str, file: &Path, chain: &mut Vec<PathBuf>, warnings: &mut Vec<String>) -> String {
    if !INCLUDE_RE.is_match(body) {
        return body.to_string();
    }

    let dir = file.parent().unwrap_or_else(|| Path::new(""));
    let mut out = String::with_capacity(body.len());
    let mut last = 0;

    for caps in INCLUDE_RE.captures_iter(body) {
        let Some(directive) = caps.get(0) else {
            continue;
        };
        out.push_str(&body[last..directive.start()]);
        last = directive.end();

        match splice(&caps, dir, file, chain, warnings) {
            Some(expanded) => out.push_str(&expanded),
            None => out.push_str(directive.as_str()),
        }
    }

    out.push_str(&body[last..]);
    out
}

/// Expanded body of one directive's target, or `None` to keep the literal.
fn splice(
    caps: &Captures<'_>,
    dir: &Path,
    file: &Path,
    chain: &mut Vec<PathBuf>,
    warnings: &mut Vec<String>,
) -> Option<String> {
    let target_rel = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    let target = dir.join(target_rel);
    let key = path_key(&target);

    if chain.contains(&key) {
        let msg = format!(
            "include cycle: {} (from {})",
            target.display(),
            file.display()
        );
        warn!("{}", msg);
        warnings.push(msg);
        return None;
    }

    let raw = match std::fs::read_to_string(&target) {
        Ok(raw) => raw,
        Err(e) => {
            let msg = format!(
                "include failed: {} (from {}): {}",
                target.display(),
                file.display(),
                e
            );
            warn!("{}", msg);
            warnings.push(msg);
            return None;
        }
    };

    let parsed = match frontmatter::split(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            let msg = format!(
                "include failed: {} (from {}): {}",
                target.display(),
                file.display(),
                e
            );
            warn!("{}", msg);
            warnings.push(msg);
            return None;
        }
    };

    chain.push(key);
    let expanded = expand(&parsed.body, &target, chain, warnings);
    chain.pop();
    Some(expanded)
}

/// Identity of a file within one chain: canonical when it exists,
/// otherwise lexically normalized.
fn path_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_path(path))
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
