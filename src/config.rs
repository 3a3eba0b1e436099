//! Hierarchical configuration files storing job data.
//!
//! A config is a set of named nodes; each node stores key-value entries and
//! child nodes. Values are kept as strings internally, so reading requires
//! specifying the type. The text format is stable:
//!
//! ```text
//! "NodeName" [
//!   "entry_key" = value
//!   "child_node" [
//!     "nested" = 3.14
//!   ]
//! ]
//! ```

use std::fs;

use lin_alg::f64::Vec3;

use crate::error::{Error, Result};
use crate::math::Interval;
use crate::paths::Path;

/// Wraps a string in double quotes. Embedded quotes are forbidden by the
/// format.
pub fn quoted(value: &str) -> String {
    debug_assert!(!value.contains('"'), "embedded quotes are not allowed");
    format!("\"{}\"", value)
}

/// Removes the leading and trailing quote from a string.
pub fn unquoted(value: &str) -> String {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

/// Value (de)serializable from the config text format.
pub trait ConfigValue: Sized {
    fn write_value(&self) -> String;
    fn read_value(source: &str) -> Option<Self>;
}

impl ConfigValue for f64 {
    fn write_value(&self) -> String {
        self.to_string()
    }
    fn read_value(source: &str) -> Option<Self> {
        source.trim().parse().ok()
    }
}

impl ConfigValue for i64 {
    fn write_value(&self) -> String {
        self.to_string()
    }
    fn read_value(source: &str) -> Option<Self> {
        source.trim().parse().ok()
    }
}

impl ConfigValue for bool {
    fn write_value(&self) -> String {
        self.to_string()
    }
    fn read_value(source: &str) -> Option<Self> {
        match source.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigValue for String {
    fn write_value(&self) -> String {
        quoted(self)
    }
    fn read_value(source: &str) -> Option<Self> {
        Some(unquoted(source))
    }
}

impl ConfigValue for Vec3 {
    fn write_value(&self) -> String {
        format!("{} {} {}", self.x, self.y, self.z)
    }
    fn read_value(source: &str) -> Option<Self> {
        let parts: Vec<f64> = source
            .split_whitespace()
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if parts.len() != 3 {
            return None;
        }
        Some(Vec3::new(parts[0], parts[1], parts[2]))
    }
}

impl ConfigValue for Interval {
    fn write_value(&self) -> String {
        let bound = |b: f64| {
            if b == f64::INFINITY {
                "infinity".to_string()
            } else if b == f64::NEG_INFINITY {
                "-infinity".to_string()
            } else {
                b.to_string()
            }
        };
        format!("{} {}", bound(self.lower()), bound(self.upper()))
    }
    fn read_value(source: &str) -> Option<Self> {
        let bound = |text: &str| match text {
            "infinity" => Some(f64::INFINITY),
            "-infinity" => Some(f64::NEG_INFINITY),
            _ => text.parse().ok(),
        };
        let mut parts = source.split_whitespace();
        let lower = bound(parts.next()?)?;
        let upper = bound(parts.next()?)?;
        Some(Interval::new(lower, upper))
    }
}

impl ConfigValue for Path {
    fn write_value(&self) -> String {
        quoted(self.native())
    }
    fn read_value(source: &str) -> Option<Self> {
        Some(Path::new(&unquoted(source)))
    }
}

/// A single node in the config hierarchy: ordered entries plus ordered
/// child nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigNode {
    entries: Vec<(String, String)>,
    children: Vec<(String, ConfigNode)>,
}

impl ConfigNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new value into the node, replacing any previous value of the
    /// same name.
    pub fn set<T: ConfigValue>(&mut self, name: &str, value: T) {
        let written = value.write_value();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = written;
        } else {
            self.entries.push((name.to_string(), written));
        }
    }

    /// Returns a value stored in the node. Fails with config-not-found if
    /// the entry does not exist and with type-mismatch if it cannot be
    /// deserialized as `T`.
    pub fn get<T: ConfigValue>(&self, name: &str) -> Result<T> {
        let (_, raw) = self
            .entries
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::ConfigNotFound(name.to_string()))?;
        T::read_value(raw).ok_or_else(|| Error::TypeMismatch {
            key: name.to_string(),
            stored: "text",
            requested: std::any::type_name::<T>(),
        })
    }

    /// Like [`Self::get`], but returns None instead of failing.
    pub fn try_get<T: ConfigValue>(&self, name: &str) -> Option<T> {
        self.get(name).ok()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Names of all entries, in insertion order.
    pub fn entry_names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn add_child(&mut self, name: &str) -> &mut ConfigNode {
        self.children.push((name.to_string(), ConfigNode::new()));
        &mut self.children.last_mut().unwrap().1
    }

    pub fn get_child(&self, name: &str) -> Result<&ConfigNode> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
            .ok_or_else(|| Error::ConfigNotFound(name.to_string()))
    }

    pub fn get_child_mut(&mut self, name: &str) -> Result<&mut ConfigNode> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
            .ok_or_else(|| Error::ConfigNotFound(name.to_string()))
    }

    /// Depth-first traversal over all descendants, invoking the callback
    /// with the local name of each.
    pub fn enumerate_children<F: FnMut(&str, &ConfigNode)>(&self, func: &mut F) {
        for (name, child) in &self.children {
            func(name, child);
            child.enumerate_children(func);
        }
    }

    fn write(&self, padding: &str, out: &mut String) {
        for (name, value) in &self.entries {
            out.push_str(padding);
            out.push_str(&quoted(name));
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        for (name, child) in &self.children {
            out.push_str(padding);
            out.push_str(&quoted(name));
            out.push_str(" [\n");
            child.write(&format!("{}  ", padding), out);
            out.push_str(padding);
            out.push_str("]\n");
        }
    }

    fn read(lines: &mut Lines<'_>) -> Result<ConfigNode> {
        let mut node = ConfigNode::new();
        while let Some(line) = lines.next() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "]" {
                return Ok(node);
            }
            let (name, rest) = parse_quoted_name(trimmed)?;
            if rest == "[" {
                let child = ConfigNode::read(lines)?;
                node.children.push((name, child));
            } else if let Some(value) = rest.strip_prefix('=') {
                node.entries.push((name, value.trim().to_string()));
            } else {
                return Err(Error::ConfigParse {
                    line: line.to_string(),
                });
            }
        }
        Err(Error::ConfigParse {
            line: "unexpected end of file, unterminated node".to_string(),
        })
    }
}

struct Lines<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> Lines<'a> {
    fn next(&mut self) -> Option<&'a str> {
        self.lines.next().map(|l| l.trim_end_matches('\r'))
    }
}

fn parse_quoted_name(line: &str) -> Result<(String, &str)> {
    let parse_error = || Error::ConfigParse {
        line: line.to_string(),
    };
    let rest = line.strip_prefix('"').ok_or_else(parse_error)?;
    let closing = rest.find('"').ok_or_else(parse_error)?;
    let name = rest[..closing].to_string();
    Ok((name, rest[closing + 1..].trim()))
}

/// A set of named root nodes with text round-trip.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    nodes: Vec<(String, ConfigNode)>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) -> &mut ConfigNode {
        self.nodes.push((name.to_string(), ConfigNode::new()));
        &mut self.nodes.last_mut().unwrap().1
    }

    pub fn get_node(&self, name: &str) -> Result<&ConfigNode> {
        self.nodes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
            .ok_or_else(|| Error::ConfigNotFound(name.to_string()))
    }

    pub fn try_get_node(&self, name: &str) -> Option<&ConfigNode> {
        self.get_node(name).ok()
    }

    /// Serializes all nodes into a string.
    pub fn write(&self) -> String {
        let mut out = String::new();
        for (name, node) in &self.nodes {
            out.push_str(&quoted(name));
            out.push_str(" [\n");
            node.write("  ", &mut out);
            out.push_str("]\n");
        }
        out
    }

    /// Deserializes nodes from a string, dropping any previous content.
    pub fn read(&mut self, source: &str) -> Result<()> {
        self.nodes.clear();
        let mut lines = Lines {
            lines: source.lines(),
        };
        while let Some(line) = lines.next() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (name, rest) = parse_quoted_name(trimmed)?;
            if rest != "[" {
                return Err(Error::ConfigParse {
                    line: line.to_string(),
                });
            }
            let node = ConfigNode::read(&mut lines)?;
            self.nodes.push((name, node));
        }
        Ok(())
    }

    /// Calls the provided functor for all root nodes.
    pub fn enumerate<F: FnMut(&str, &ConfigNode)>(&self, mut func: F) {
        for (name, node) in &self.nodes {
            func(name, node);
        }
    }

    pub fn load(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path.to_std())?;
        self.read(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path.to_std(), self.write())?;
        Ok(())
    }
}
