//! Parse tree model: position-anchored nodes and leaves, child splicing,
//! leaf fusion, path queries, and DOT serialization.
//!
//! Trees are built bottom-up during matching and are logically immutable
//! once a rule completes. Node identity is a process-wide monotonically
//! increasing id, used only for DOT labelling.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::diagnostics::{ErrorKind, GramaryeError};
use crate::escape::escape_string;

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(0);

fn next_tree_id() -> u64 {
    NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// A byte position within one parse, with 1-based line and column.
///
/// `tree_id` disambiguates positions across distinct parses; it is assigned
/// monotonically per parse state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub tree_id: u64,
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(tree_id: u64, index: usize, line: usize, column: usize) -> Self {
        Self {
            tree_id,
            index,
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A named interior node. An empty name marks an anonymous node, which is
/// spliced into its parent when attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTreeNode {
    pub id: u64,
    pub name: String,
    pub children: Vec<ParseTree>,
    pub pos_begin: Position,
    pub pos_end: Position,
}

/// A leaf holding matched (or synthesized) text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTreeLeaf {
    pub id: u64,
    pub value: String,
    pub pos_begin: Position,
    pub pos_end: Position,
}

/// A parse tree: either an interior node or an exact-match leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseTree {
    Node(ParseTreeNode),
    Leaf(ParseTreeLeaf),
}

impl ParseTreeNode {
    /// A fresh anonymous node spanning nothing yet.
    pub fn new(pos: Position) -> Self {
        Self {
            id: next_tree_id(),
            name: String::new(),
            children: Vec::new(),
            pos_begin: pos,
            pos_end: pos,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Attaches a child, flattening anonymous child nodes into this node's
    /// child list. With `omit_match` the child is discarded from the list,
    /// but the end position still advances.
    pub fn add_child(&mut self, child: ParseTree, omit_match: bool) {
        let child_end = child.pos_end();
        if !omit_match {
            match child {
                ParseTree::Node(node) if node.is_anonymous() => {
                    self.children.extend(node.children);
                }
                other => self.children.push(other),
            }
        }
        if self.pos_end.index < child_end.index {
            self.pos_end = child_end;
        }
    }

    /// Merges runs of adjacent leaf children into single leaves. The merged
    /// leaf keeps the first leaf's begin position; its end position is the
    /// maximum over the run. Runs are terminated by any non-leaf child.
    pub fn fuse_leaves(&mut self) {
        let mut fused: Vec<ParseTree> = Vec::with_capacity(self.children.len());
        for child in self.children.drain(..) {
            match child {
                ParseTree::Leaf(leaf) => {
                    if let Some(ParseTree::Leaf(prev)) = fused.last_mut() {
                        prev.value.push_str(&leaf.value);
                        if prev.pos_end.index < leaf.pos_end.index {
                            prev.pos_end = leaf.pos_end;
                        }
                    } else {
                        fused.push(ParseTree::Leaf(leaf));
                    }
                }
                other => fused.push(other),
            }
        }
        self.children = fused;
    }
}

impl ParseTreeLeaf {
    pub fn new(value: impl Into<String>, pos_begin: Position, pos_end: Position) -> Self {
        Self {
            id: next_tree_id(),
            value: value.into(),
            pos_begin,
            pos_end,
        }
    }
}

impl ParseTree {
    pub fn leaf(value: impl Into<String>, pos_begin: Position, pos_end: Position) -> Self {
        ParseTree::Leaf(ParseTreeLeaf::new(value, pos_begin, pos_end))
    }

    pub fn id(&self) -> u64 {
        match self {
            ParseTree::Node(n) => n.id,
            ParseTree::Leaf(l) => l.id,
        }
    }

    pub fn pos_begin(&self) -> Position {
        match self {
            ParseTree::Node(n) => n.pos_begin,
            ParseTree::Leaf(l) => l.pos_begin,
        }
    }

    pub fn pos_end(&self) -> Position {
        match self {
            ParseTree::Node(n) => n.pos_end,
            ParseTree::Leaf(l) => l.pos_end,
        }
    }

    pub fn as_node(&self) -> Option<&ParseTreeNode> {
        match self {
            ParseTree::Node(n) => Some(n),
            ParseTree::Leaf(_) => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut ParseTreeNode> {
        match self {
            ParseTree::Node(n) => Some(n),
            ParseTree::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&ParseTreeLeaf> {
        match self {
            ParseTree::Leaf(l) => Some(l),
            ParseTree::Node(_) => None,
        }
    }

    /// The node, if this tree is a node with the given name.
    pub fn as_named_node(&self, name: &str) -> Option<&ParseTreeNode> {
        self.as_node().filter(|n| n.name == name)
    }

    pub fn expect_node(&self) -> Result<&ParseTreeNode, GramaryeError> {
        self.as_node().ok_or_else(|| {
            GramaryeError::unlocated(
                ErrorKind::ExpectedNode {
                    found: self.describe(),
                },
                "tree",
            )
        })
    }

    pub fn expect_named_node(&self, name: &str) -> Result<&ParseTreeNode, GramaryeError> {
        self.as_named_node(name).ok_or_else(|| {
            GramaryeError::unlocated(
                ErrorKind::ExpectedNode {
                    found: format!("{} (wanted node '{}')", self.describe(), name),
                },
                "tree",
            )
        })
    }

    pub fn expect_leaf(&self) -> Result<&ParseTreeLeaf, GramaryeError> {
        self.as_leaf().ok_or_else(|| {
            GramaryeError::unlocated(
                ErrorKind::ExpectedLeaf {
                    found: self.describe(),
                },
                "tree",
            )
        })
    }

    /// Concatenation of all leaf values in document order.
    pub fn to_text(&self) -> String {
        match self {
            ParseTree::Leaf(l) => l.value.clone(),
            ParseTree::Node(n) => {
                let mut out = String::new();
                for child in &n.children {
                    out.push_str(&child.to_text());
                }
                out
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            ParseTree::Node(n) if n.is_anonymous() => "anonymous node".to_string(),
            ParseTree::Node(n) => format!("node '{}'", n.name),
            ParseTree::Leaf(l) => format!("leaf \"{}\"", escape_string(&l.value)),
        }
    }

    // ------------------------------------------------------------------
    // Path queries
    // ------------------------------------------------------------------

    /// Resolves a dot-separated path of segments against this tree and
    /// returns the addressed descendant, or an error describing the first
    /// segment that failed. See [`ParseTree::find_child`] for the
    /// non-raising variant.
    ///
    /// Segments:
    /// - `<integer>`: child by position; negative integers count from the
    ///   end.
    /// - `<identifier>`: first child that is a node with that name.
    /// - `<identifier>#<integer>`: the k-th child node with that name.
    pub fn expect_child(&self, path: &str) -> Result<&ParseTree, GramaryeError> {
        let mut current = self;
        for segment in path.split('.') {
            let node = current.expect_node().map_err(|_| {
                GramaryeError::unlocated(
                    ErrorKind::ExpectedNode {
                        found: format!("{} at '{}' in path '{}'", current.describe(), segment, path),
                    },
                    "tree",
                )
            })?;
            current = resolve_segment(node, segment, path)?;
        }
        Ok(current)
    }

    /// Path query that swallows failures.
    pub fn find_child(&self, path: &str) -> Option<&ParseTree> {
        self.expect_child(path).ok()
    }

    pub fn has_child(&self, path: &str) -> bool {
        self.find_child(path).is_some()
    }

    pub fn expect_child_node(&self, path: &str) -> Result<&ParseTreeNode, GramaryeError> {
        self.expect_child(path)?.expect_node()
    }

    pub fn expect_child_leaf(&self, path: &str) -> Result<&ParseTreeLeaf, GramaryeError> {
        self.expect_child(path)?.expect_leaf()
    }

    // ------------------------------------------------------------------
    // DOT output
    // ------------------------------------------------------------------

    /// Serializes the tree as a GraphViz digraph. Verbose mode appends
    /// `line:col -> line:col` to every label.
    pub fn to_digraph(&self, verbose: bool) -> String {
        let mut graph = String::new();
        graph.push_str("digraph {\n\tgraph [rankdir=LR]\n");
        self.digraph_impl(&mut graph, verbose);
        graph.push_str("}\n");
        graph
    }

    fn digraph_impl(&self, graph: &mut String, verbose: bool) {
        match self {
            ParseTree::Node(node) => {
                let mut label = node.name.clone();
                label.push_str(&self.verbose_info(verbose));
                graph.push_str(&format!(
                    "\t{} [label=\"{}\" shape=ellipse]\n",
                    node.id,
                    escape_string(&label)
                ));
                for child in &node.children {
                    child.digraph_impl(graph, verbose);
                    graph.push_str(&format!("\t{} -> {}\n", node.id, child.id()));
                }
            }
            ParseTree::Leaf(leaf) => {
                let mut label = format!("\"{}\"", escape_string(&leaf.value));
                label.push_str(&self.verbose_info(verbose));
                graph.push_str(&format!(
                    "\t{} [label=\"{}\" shape=plaintext]\n",
                    leaf.id,
                    escape_string(&label)
                ));
            }
        }
    }

    fn verbose_info(&self, verbose: bool) -> String {
        if !verbose {
            return String::new();
        }
        format!("\n{} -> {}", self.pos_begin(), self.pos_end())
    }
}

fn resolve_segment<'t>(
    node: &'t ParseTreeNode,
    segment: &str,
    path: &str,
) -> Result<&'t ParseTree, GramaryeError> {
    let not_found = || {
        GramaryeError::unlocated(
            ErrorKind::ChildNotFound {
                segment: segment.to_string(),
                path: path.to_string(),
            },
            "tree",
        )
    };

    // Pure integer: positional lookup, negative counts from the end.
    if let Ok(offset) = segment.parse::<i64>() {
        let len = node.children.len() as i64;
        let resolved = if offset < 0 { len + offset } else { offset };
        if resolved < 0 || resolved >= len {
            return Err(not_found());
        }
        return Ok(&node.children[resolved as usize]);
    }

    let (name, ordinal) = match segment.split_once('#') {
        Some((name, ordinal_str)) => {
            let ordinal = ordinal_str.parse::<usize>().map_err(|_| {
                GramaryeError::unlocated(
                    ErrorKind::InvalidPath {
                        path: path.to_string(),
                    },
                    "tree",
                )
            })?;
            (name, ordinal)
        }
        None => (segment, 0),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GramaryeError::unlocated(
            ErrorKind::InvalidPath {
                path: path.to_string(),
            },
            "tree",
        ));
    }

    node.children
        .iter()
        .filter(|child| child.as_named_node(name).is_some())
        .nth(ordinal)
        .ok_or_else(not_found)
}

/// `Display` renders the concatenated leaf text, mirroring how actions
/// stringify their matched subtree.
impl fmt::Display for ParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}
