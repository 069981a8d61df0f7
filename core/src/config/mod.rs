// Config module - 配置文档模块
// 设备配置快照：原始文本 + 按缩进推导的层级视图

use regex::Regex;
use std::convert::Infallible;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::Result;

/// One line of a configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLine {
    /// 1-based line number within the document.
    pub number: usize,
    pub text: String,
    /// Count of leading whitespace characters.
    pub depth: usize,
}

impl ConfigLine {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let depth = text.chars().take_while(|c| c.is_whitespace()).count();
        Self {
            number,
            text,
            depth,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A read-only configuration snapshot.
///
/// Lines are split lazily on first use. The parent/child structure is never
/// materialized: [`ConfigDocument::children`] derives it from indentation
/// on every call.
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    contents: String,
    lines: OnceLock<Vec<ConfigLine>>,
}

impl ConfigDocument {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            lines: OnceLock::new(),
        }
    }

    /// Reads a configuration snapshot from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::new(contents))
    }

    /// The raw text exactly as supplied.
    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn lines(&self) -> &[ConfigLine] {
        self.lines.get_or_init(|| {
            split_lines(&self.contents)
                .into_iter()
                .enumerate()
                .map(|(i, text)| ConfigLine::new(i + 1, text))
                .collect()
        })
    }

    pub fn line(&self, number: usize) -> Option<&ConfigLine> {
        number.checked_sub(1).and_then(|i| self.lines().get(i))
    }

    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    /// Lines nested under `parent`: every following line indented deeper
    /// than it, up to the next line at the parent's depth or shallower.
    /// Blank lines neither end the block nor count as children.
    pub fn children(&self, parent: &ConfigLine) -> Vec<&ConfigLine> {
        let lines = self.lines();
        let start = parent.number.min(lines.len());

        lines[start..]
            .iter()
            .filter(|line| !line.is_blank())
            .take_while(|line| line.depth > parent.depth)
            .collect()
    }

    /// All non-blank lines matching `pattern`, at any depth.
    pub fn find_lines(&self, pattern: &Regex) -> Vec<&ConfigLine> {
        self.lines()
            .iter()
            .filter(|line| !line.is_blank() && pattern.is_match(&line.text))
            .collect()
    }
}

impl From<String> for ConfigDocument {
    fn from(contents: String) -> Self {
        Self::new(contents)
    }
}

impl From<&str> for ConfigDocument {
    fn from(contents: &str) -> Self {
        Self::new(contents)
    }
}

impl FromStr for ConfigDocument {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

// Accepts "\n", "\r\n" and bare "\r". A trailing terminator does not
// produce an extra empty line.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        lines.push(&text[start..]);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNIPPET: &str = "hostname Edge\n\
                           interface Gi1/0/1\n \
                           description uplink\n \
                           shutdown\n\
                           !\n\
                           line vty 0 4\n \
                           login local\n  \
                           transport input ssh\n";

    #[test]
    fn mixed_line_endings_are_split() {
        let doc = ConfigDocument::new("a\r\nb\rc\nd");
        let texts: Vec<&str> = doc.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
        assert_eq!(doc.lines()[3].number, 4);
    }

    #[test]
    fn trailing_newline_adds_no_line() {
        assert_eq!(ConfigDocument::new("a\nb\n").lines().len(), 2);
        assert!(ConfigDocument::new("").is_empty());
    }

    #[test]
    fn contents_are_kept_verbatim() {
        let raw = "a\r\n b\r\n";
        assert_eq!(ConfigDocument::new(raw).contents(), raw);
    }

    #[test]
    fn depth_counts_leading_whitespace() {
        let doc = ConfigDocument::new("root\n  two\n\tone\n");
        let depths: Vec<usize> = doc.lines().iter().map(|l| l.depth).collect();
        assert_eq!(depths, vec![0, 2, 1]);
    }

    #[test]
    fn children_stop_at_same_depth() {
        let doc = ConfigDocument::new(SNIPPET);
        let interface = doc.line(2).unwrap();
        let children: Vec<&str> = doc
            .children(interface)
            .iter()
            .map(|l| l.text.trim())
            .collect();
        assert_eq!(children, vec!["description uplink", "shutdown"]);
    }

    #[test]
    fn children_include_deeper_descendants() {
        let doc = ConfigDocument::new(SNIPPET);
        let vty = doc.line(6).unwrap();
        assert_eq!(doc.children(vty).len(), 2);

        let login = doc.line(7).unwrap();
        let nested: Vec<usize> = doc.children(login).iter().map(|l| l.number).collect();
        assert_eq!(nested, vec![8]);
    }

    #[test]
    fn blank_lines_do_not_end_a_block() {
        let doc = ConfigDocument::new("router bgp 1\n neighbor a\n\n neighbor b\nend");
        let children = doc.children(doc.line(1).unwrap());
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].number, 4);
    }

    #[test]
    fn last_line_has_no_children() {
        let doc = ConfigDocument::new(SNIPPET);
        let last = doc.lines().last().unwrap();
        assert!(doc.children(last).is_empty());
    }

    #[test]
    fn find_lines_ignores_depth() {
        let doc = ConfigDocument::new(SNIPPET);
        let found = doc.find_lines(&Regex::new("shutdown|transport").unwrap());
        let numbers: Vec<usize> = found.iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![4, 8]);
    }
}
