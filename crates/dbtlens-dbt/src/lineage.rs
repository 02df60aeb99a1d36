//! Lineage tracing and tree rendering
//!
//! One depth-first walk per direction builds a [`LineageTree`]. The flat node
//! list is the tree's pre-order and the text rendering is drawn from the same
//! tree, so both always agree on which nodes are reachable.
//!
//! A single visited set spans the whole walk: a node reachable by several
//! paths appears once, where it was first met, and is never expanded again.
//! The queried model counts as visited from the start, so cycles back to it
//! are dropped.

use crate::dag::DependencyGraph;
use dbtlens_core::{Diagnostic, DiagnosticCode, Severity};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Default cap on "did you mean" suggestions
pub const DEFAULT_MAX_SUGGESTIONS: usize = 5;

/// Kind of a lineage vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Model,
    Source,
}

/// One vertex as seen from a traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageNode {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Model file path relative to the project root; sources have none
    pub path: Option<PathBuf>,
}

impl LineageNode {
    fn model(graph: &DependencyGraph, name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Model,
            path: graph.entry(name).map(|entry| entry.path.clone()),
        }
    }

    fn source(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Source,
            path: None,
        }
    }

    pub fn is_source(&self) -> bool {
        self.kind == NodeKind::Source
    }

    /// Label used in rendered trees
    pub fn label(&self) -> String {
        match self.kind {
            NodeKind::Model => self.name.clone(),
            NodeKind::Source => format!("{} (source)", self.name),
        }
    }
}

/// Traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// What the model depends on
    Upstream,

    /// What depends on the model
    Downstream,
}

#[derive(Debug, Clone)]
struct Slot {
    node: LineageNode,
    children: Vec<usize>,
}

/// Arena tree of lineage nodes below a queried model
#[derive(Debug, Clone)]
pub struct LineageTree {
    root: String,
    direction: Direction,
    slots: Vec<Slot>,
    top: Vec<usize>,
}

/// Pending children of one expanded model
struct Frame {
    parent: Option<usize>,
    pending: std::vec::IntoIter<LineageNode>,
    remaining: usize,
}

impl LineageTree {
    /// Walk `graph` from `model`, expanding at most `depth` levels
    pub fn build(graph: &DependencyGraph, model: &str, depth: usize, direction: Direction) -> Self {
        let mut tree = Self {
            root: model.to_string(),
            direction,
            slots: Vec::new(),
            top: Vec::new(),
        };

        let mut visited: HashSet<(NodeKind, String)> = HashSet::new();
        visited.insert((NodeKind::Model, model.to_string()));

        let mut stack = Vec::new();
        if depth > 0 {
            stack.push(Frame {
                parent: None,
                pending: neighbours(graph, model, direction).into_iter(),
                remaining: depth,
            });
        }

        while let Some(frame) = stack.last_mut() {
            let Some(node) = frame.pending.next() else {
                stack.pop();
                continue;
            };

            if !visited.insert((node.kind, node.name.clone())) {
                continue;
            }

            let parent = frame.parent;
            let remaining = frame.remaining - 1;
            let expand = node.kind == NodeKind::Model && remaining > 0;
            let name = node.name.clone();
            let index = tree.push(parent, node);

            if expand {
                stack.push(Frame {
                    parent: Some(index),
                    pending: neighbours(graph, &name, direction).into_iter(),
                    remaining,
                });
            }
        }

        tree
    }

    fn push(&mut self, parent: Option<usize>, node: LineageNode) -> usize {
        let index = self.slots.len();
        self.slots.push(Slot {
            node,
            children: Vec::new(),
        });
        match parent {
            Some(parent) => self.slots[parent].children.push(index),
            None => self.top.push(index),
        }
        index
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Nodes in depth-first pre-order
    pub fn nodes(&self) -> impl Iterator<Item = &LineageNode> {
        self.slots.iter().map(|slot| &slot.node)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Parent/child pairs below the root, parent `None` meaning the root
    fn links(&self) -> impl Iterator<Item = (Option<&LineageNode>, &LineageNode)> {
        let top = self.top.iter().map(move |&child| (None, &self.slots[child].node));
        let nested = self.slots.iter().flat_map(move |slot| {
            slot.children
                .iter()
                .map(move |&child| (Some(&slot.node), &self.slots[child].node))
        });
        top.chain(nested)
    }

    /// Render as a box-drawing tree, the queried model on the first line
    pub fn render(&self) -> String {
        let mut lines = vec![self.root.clone()];
        self.render_level(&self.top, "", &mut lines);
        lines.join("\n")
    }

    fn render_level(&self, level: &[usize], prefix: &str, lines: &mut Vec<String>) {
        for (i, &index) in level.iter().enumerate() {
            let is_last = i + 1 == level.len();
            let connector = if is_last { "└── " } else { "├── " };
            let slot = &self.slots[index];
            lines.push(format!("{prefix}{connector}{}", slot.node.label()));

            let continuation = if is_last { "    " } else { "│   " };
            self.render_level(&slot.children, &format!("{prefix}{continuation}"), lines);
        }
    }
}

/// Direct neighbours of a model: refs then sources upstream, dependents downstream
fn neighbours(graph: &DependencyGraph, model: &str, direction: Direction) -> Vec<LineageNode> {
    match direction {
        Direction::Upstream => graph
            .parents(model)
            .map(|name| LineageNode::model(graph, name))
            .chain(graph.sources(model).map(LineageNode::source))
            .collect(),
        Direction::Downstream => graph
            .children(model)
            .iter()
            .map(|name| LineageNode::model(graph, name))
            .collect(),
    }
}

/// Counts reported alongside a lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineageSummary {
    pub upstream_models: usize,
    pub upstream_sources: usize,
    pub downstream_models: usize,

    /// Upstream + downstream + the queried model
    pub total_nodes: usize,
}

/// A directed edge in the lineage graph view (data flows `from` -> `to`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageEdge {
    pub from: String,
    pub to: String,
}

/// Node/edge view of a lineage, for export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<LineageEdge>,
}

/// Result of tracing one model
#[derive(Debug, Clone, Serialize)]
pub struct Lineage {
    pub model: String,
    pub depth: usize,
    pub upstream: Vec<LineageNode>,
    pub downstream: Vec<LineageNode>,

    #[serde(skip)]
    upstream_tree: LineageTree,

    #[serde(skip)]
    downstream_tree: LineageTree,
}

impl Lineage {
    fn new(graph: &DependencyGraph, model: &str, depth: usize) -> Self {
        let upstream_tree = LineageTree::build(graph, model, depth, Direction::Upstream);
        let downstream_tree = LineageTree::build(graph, model, depth, Direction::Downstream);

        Self {
            model: model.to_string(),
            depth,
            upstream: upstream_tree.nodes().cloned().collect(),
            downstream: downstream_tree.nodes().cloned().collect(),
            upstream_tree,
            downstream_tree,
        }
    }

    pub fn tree(&self, direction: Direction) -> &LineageTree {
        match direction {
            Direction::Upstream => &self.upstream_tree,
            Direction::Downstream => &self.downstream_tree,
        }
    }

    pub fn render(&self, direction: Direction) -> String {
        self.tree(direction).render()
    }

    pub fn summary(&self) -> LineageSummary {
        let upstream_sources = self.upstream.iter().filter(|node| node.is_source()).count();

        LineageSummary {
            upstream_models: self.upstream.len() - upstream_sources,
            upstream_sources,
            downstream_models: self.downstream.len(),
            total_nodes: self.upstream.len() + self.downstream.len() + 1,
        }
    }

    /// Nodes and data-flow edges, following the tree structure
    pub fn graph(&self) -> LineageGraph {
        let nodes = std::iter::once(self.model.clone())
            .chain(self.upstream.iter().map(|node| node.name.clone()))
            .chain(self.downstream.iter().map(|node| node.name.clone()))
            .collect();

        let parent_name = |parent: Option<&LineageNode>| {
            parent.map_or_else(|| self.model.clone(), |node| node.name.clone())
        };

        let upstream_edges = self.upstream_tree.links().map(|(parent, child)| LineageEdge {
            from: child.name.clone(),
            to: parent_name(parent),
        });
        let downstream_edges = self.downstream_tree.links().map(|(parent, child)| LineageEdge {
            from: parent_name(parent),
            to: child.name.clone(),
        });

        LineageGraph {
            nodes,
            edges: upstream_edges.chain(downstream_edges).collect(),
        }
    }
}

/// Traces lineage over a built graph
pub struct LineageTracer<'g> {
    graph: &'g DependencyGraph,
    max_suggestions: usize,
}

impl<'g> LineageTracer<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }

    pub fn with_max_suggestions(mut self, max_suggestions: usize) -> Self {
        self.max_suggestions = max_suggestions;
        self
    }

    /// Upstream and downstream nodes of `model`, at most `depth` levels away
    pub fn trace(&self, model: &str, depth: usize) -> Result<Lineage, LineageError> {
        self.ensure_known(model)?;
        Ok(Lineage::new(self.graph, model, depth))
    }

    /// Text tree for one direction
    pub fn render_tree(
        &self,
        model: &str,
        depth: usize,
        direction: Direction,
    ) -> Result<String, LineageError> {
        self.ensure_known(model)?;
        Ok(LineageTree::build(self.graph, model, depth, direction).render())
    }

    fn ensure_known(&self, model: &str) -> Result<(), LineageError> {
        if self.graph.contains(model) {
            return Ok(());
        }

        let suggestions = self.graph.suggestions(model, self.max_suggestions);
        if suggestions.is_empty() {
            Err(LineageError::NotFound {
                model: model.to_string(),
            })
        } else {
            Err(LineageError::DidYouMean {
                model: model.to_string(),
                suggestions,
            })
        }
    }
}

/// Lineage query failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineageError {
    #[error("Model '{model}' not found in project")]
    NotFound { model: String },

    #[error("Model '{model}' not found. Did you mean: {}?", .suggestions.join(", "))]
    DidYouMean {
        model: String,
        suggestions: Vec<String>,
    },
}

impl LineageError {
    pub fn model(&self) -> &str {
        match self {
            Self::NotFound { model } | Self::DidYouMean { model, .. } => model,
        }
    }

    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::NotFound { .. } => &[],
            Self::DidYouMean { suggestions, .. } => suggestions,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(DiagnosticCode::ModelNotFound, Severity::Error, self.to_string())
    }
}
