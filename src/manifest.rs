//! Plugin requirements declared by build templates
//!
//! Templates declare their plugins in HCL:
//!
//! ```hcl
//! packer {
//!   required_plugins {
//!     amazon = {
//!       version = ">= 1.2.0"
//!       source  = "github.com/hashicorp/amazon"
//!     }
//!   }
//! }
//! ```
//!
//! Only `required_plugins` blocks are read; the rest of the template is
//! ignored, so this is a scanner rather than a full HCL parser. Comments and
//! quoted strings are respected when matching braces.
//!
//! # Examples
//!
//! ```
//! use packer_proxy_init::manifest::parse_requirements;
//!
//! let hcl = r#"
//! packer {
//!   required_plugins {
//!     foo = {
//!       version = "= 1.2.3"
//!       source  = "github.com/acme/foo"
//!     }
//!   }
//! }
//! "#;
//! let reqs = parse_requirements(hcl, "build.pkr.hcl").unwrap();
//! assert_eq!(reqs[0].identifier(), "github.com/acme/foo");
//! ```

use crate::requirement::{PluginRequirement, PluginSource, VersionConstraints};
use crate::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Extension of build template files
pub const TEMPLATE_SUFFIX: &str = ".pkr.hcl";

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\brequired_plugins\s*\{").expect("valid regex"))
}

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*\{").expect("valid regex"))
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(version|source)\s*=\s*"([^"]*)""#).expect("valid regex")
    })
}

/// Template files under `path`: the file itself, or every `*.pkr.hcl` in
/// a directory, sorted by name
pub fn template_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(Error::Other(format!(
            "No such file or directory: {}",
            path.display()
        )));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(TEMPLATE_SUFFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Every plugin requirement declared under `path`
///
/// A plugin declared twice must name the same source and constraints.
pub fn load_requirements(path: &Path) -> Result<Vec<PluginRequirement>> {
    let files = template_files(path)?;
    if files.is_empty() {
        return Err(Error::Other(format!(
            "No {} files found in {}",
            TEMPLATE_SUFFIX,
            path.display()
        )));
    }

    let mut requirements: Vec<PluginRequirement> = Vec::new();
    let mut seen: HashMap<String, (String, String)> = HashMap::new();

    for file in &files {
        let content = fs::read_to_string(file)?;
        let label = file.display().to_string();

        for req in parse_requirements(&content, &label)? {
            let key = (req.identifier(), req.constraints.to_string());
            match seen.get(&req.accessor) {
                Some(previous) if previous == &key => continue,
                Some(previous) => {
                    return Err(Error::Parse(format!(
                        "{}: plugin '{}' declared again as {} {}, previously {} {}",
                        label, req.accessor, key.0, key.1, previous.0, previous.1
                    )))
                }
                None => {
                    seen.insert(req.accessor.clone(), key);
                    requirements.push(req);
                }
            }
        }
    }

    tracing::debug!(count = requirements.len(), files = files.len(), "loaded plugin requirements");
    Ok(requirements)
}

/// Requirements declared in one template; `label` names it in errors
pub fn parse_requirements(content: &str, label: &str) -> Result<Vec<PluginRequirement>> {
    let text = strip_comments(content);
    let mut requirements = Vec::new();

    for block in block_regex().find_iter(&text) {
        let open = block.end() - 1;
        let close = matching_brace(&text, open).ok_or_else(|| {
            Error::Parse(format!("{}: unterminated required_plugins block", label))
        })?;
        let body = &text[open + 1..close];

        let mut pos = 0;
        while let Some(caps) = entry_regex().captures_at(body, pos) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let accessor = &caps[1];
            let open = whole.end - 1;
            let close = matching_brace(body, open).ok_or_else(|| {
                Error::Parse(format!("{}: unterminated entry for plugin '{}'", label, accessor))
            })?;

            requirements.push(parse_entry(accessor, &body[open + 1..close], label)?);
            pos = close + 1;
        }
    }

    Ok(requirements)
}

fn parse_entry(accessor: &str, body: &str, label: &str) -> Result<PluginRequirement> {
    let mut source = None;
    let mut version = None;
    for caps in attribute_regex().captures_iter(body) {
        match &caps[1] {
            "source" => source = Some(caps[2].to_string()),
            _ => version = Some(caps[2].to_string()),
        }
    }

    let source = source.ok_or_else(|| {
        Error::Parse(format!("{}: plugin '{}' has no source", label, accessor))
    })?;
    let source = PluginSource::parse(&source)
        .map_err(|e| Error::Parse(format!("{}: plugin '{}': {}", label, accessor, e)))?;
    let constraints = VersionConstraints::parse(version.as_deref().unwrap_or("")).map_err(|e| {
        Error::Parse(format!("{}: plugin '{}': {}", label, accessor, e))
    })?;

    Ok(PluginRequirement::new(accessor, source, constraints))
}

/// Replace `#`, `//` and `/* */` comments with spaces, leaving string
/// literals and byte offsets intact
fn strip_comments(content: &str) -> String {
    let bytes = content.as_bytes();
    let mut out = String::with_capacity(content.len());
    let mut chars = content.char_indices().peekable();
    let mut in_string = false;

    while let Some((i, c)) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        let next = bytes.get(i + 1).copied();
        if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == '#' || (c == '/' && next == Some(b'/')) {
            out.push(' ');
            while let Some(&(_, c)) = chars.peek() {
                if c == '\n' {
                    break;
                }
                out.push(blank(c));
                chars.next();
            }
        } else if c == '/' && next == Some(b'*') {
            out.push(' ');
            if let Some((_, star)) = chars.next() {
                out.push(blank(star));
            }
            let mut prev = '\0';
            for (_, c) in chars.by_ref() {
                out.push(blank(c));
                if prev == '*' && c == '/' {
                    break;
                }
                prev = c;
            }
        } else {
            out.push(c);
        }
    }

    out
}

/// Same byte length, newlines kept
fn blank(c: char) -> char {
    if c == '\n' {
        '\n'
    } else if c.is_ascii() {
        ' '
    } else {
        c
    }
}

/// Index of the `}` closing the `{` at `open`, skipping string literals
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
