//! Resolved dependency graphs: construction, cycle verification, and tree
//! rendering.

use std::collections::{HashMap, HashSet, VecDeque};

use kiln_core::identity::ModuleIdentity;
use kiln_core::version::Version;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::conflict::ConflictRequest;
use crate::isolate::{DependencyMetadata, IsolatedGraph};

/// A module after conflict resolution.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub identity: ModuleIdentity,
    pub version: Version,
    pub artifacts: Vec<String>,
    /// Outgoing edges; each edge targets its descriptor's identity.
    pub dependencies: Vec<DependencyMetadata>,
    /// The requests that led to this module.
    pub requested_by: Vec<ConflictRequest>,
}

impl ResolvedModule {
    pub fn new(identity: ModuleIdentity, version: Version) -> Self {
        Self {
            identity,
            version,
            artifacts: Vec::new(),
            dependencies: Vec::new(),
            requested_by: Vec::new(),
        }
    }
}

/// The module graph of one configuration. Each identity appears once.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    configuration: String,
    roots: Vec<DependencyMetadata>,
    modules: Vec<ResolvedModule>,
    index: HashMap<ModuleIdentity, usize>,
}

impl ResolvedGraph {
    pub fn new(configuration: impl Into<String>) -> Self {
        Self {
            configuration: configuration.into(),
            roots: Vec::new(),
            modules: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn configuration(&self) -> &str {
        &self.configuration
    }

    /// Add an edge from the configuration itself. Repeated targets are ignored.
    pub fn add_root(&mut self, metadata: DependencyMetadata) {
        if !self.roots.iter().any(|r| r.identity() == metadata.identity()) {
            self.roots.push(metadata);
        }
    }

    /// Add a module, or return the position of the one already present.
    pub fn add_module(&mut self, module: ResolvedModule) -> usize {
        if let Some(&i) = self.index.get(&module.identity) {
            return i;
        }
        let i = self.modules.len();
        self.index.insert(module.identity.clone(), i);
        self.modules.push(module);
        i
    }

    /// Add an edge from `from`. Unknown sources and repeated targets are ignored.
    pub fn add_dependency(&mut self, from: &ModuleIdentity, metadata: DependencyMetadata) {
        let Some(&i) = self.index.get(from) else {
            return;
        };
        let module = &mut self.modules[i];
        if !module
            .dependencies
            .iter()
            .any(|d| d.identity() == metadata.identity())
        {
            module.dependencies.push(metadata);
        }
    }

    pub fn module(&self, identity: &ModuleIdentity) -> Option<&ResolvedModule> {
        self.index.get(identity).map(|&i| &self.modules[i])
    }

    pub fn roots(&self) -> &[DependencyMetadata] {
        &self.roots
    }

    /// Modules in discovery order.
    pub fn modules(&self) -> &[ResolvedModule] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// A cycle in the module edges, as a path starting and ending on the
    /// same identity.
    pub fn find_cycle(&self) -> Option<Vec<ModuleIdentity>> {
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(self.modules.len(), 0);
        let nodes: Vec<NodeIndex> = (0..self.modules.len()).map(|i| graph.add_node(i)).collect();
        for (i, module) in self.modules.iter().enumerate() {
            for dep in &module.dependencies {
                if let Some(&j) = self.index.get(dep.identity()) {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }

        for component in petgraph::algo::tarjan_scc(&graph) {
            let looped = component.len() == 1 && graph.contains_edge(component[0], component[0]);
            if component.len() < 2 && !looped {
                continue;
            }
            let Some(&start) = component.iter().min() else {
                continue;
            };
            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            let path = cycle_through(&graph, start, &members);
            return Some(
                path.into_iter()
                    .map(|n| self.modules[graph[n]].identity.clone())
                    .collect(),
            );
        }
        None
    }
}

/// Shortest cycle from `start` back to itself, staying inside `members`.
fn cycle_through(
    graph: &DiGraph<usize, ()>,
    start: NodeIndex,
    members: &HashSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        for next in graph.neighbors(current) {
            if next == start {
                let mut path = vec![current];
                let mut step = current;
                while step != start {
                    match parent.get(&step) {
                        Some(&p) => {
                            path.push(p);
                            step = p;
                        }
                        None => break,
                    }
                }
                path.reverse();
                path.push(start);
                return path;
            }
            if members.contains(&next) && !parent.contains_key(&next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }
    vec![start, start]
}

/// Node label in a [`DependencyTree`].
#[derive(Debug, Clone)]
struct TreeNode {
    module: Option<ModuleIdentity>,
    label: String,
}

/// A printable view of an isolated graph, rooted at its configuration.
pub struct DependencyTree {
    graph: DiGraph<TreeNode, String>,
    index: HashMap<ModuleIdentity, NodeIndex>,
    root: NodeIndex,
}

impl DependencyTree {
    pub fn new(isolated: &IsolatedGraph) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(TreeNode {
            module: None,
            label: isolated.configuration.clone(),
        });

        let mut index = HashMap::new();
        for m in &isolated.modules {
            let idx = graph.add_node(TreeNode {
                module: Some(m.module.clone()),
                label: format!("{}:{}", m.module, m.version),
            });
            index.insert(m.module.clone(), idx);
        }

        let mut tree = Self { graph, index, root };
        for dep in isolated.roots.iter() {
            tree.add_edge(root, dep, isolated);
        }
        for m in &isolated.modules {
            if let Some(&from) = tree.index.get(&m.module) {
                for dep in m.dependencies.iter() {
                    tree.add_edge(from, dep, isolated);
                }
            }
        }
        tree
    }

    /// The edge label shows the requested version when the selected one
    /// differs from it.
    fn add_edge(&mut self, from: NodeIndex, dep: &DependencyMetadata, isolated: &IsolatedGraph) {
        let Some(&to) = self.index.get(dep.identity()) else {
            return;
        };
        let descriptor = dep.descriptor();
        let selected = isolated.module(dep.identity()).map(|m| &m.version);
        let requested = descriptor.constraint().requested_version();
        let label = match (requested, selected) {
            (Some(r), Some(s)) if r != s && !descriptor.is_file() => {
                format!("{}:{r} -> {s}", dep.identity())
            }
            _ => String::new(),
        };
        self.graph.add_edge(from, to, label);
    }

    fn children(&self, idx: NodeIndex) -> Vec<(NodeIndex, &str)> {
        let mut children: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight().as_str()))
            .collect();
        // petgraph iterates newest edge first
        children.reverse();
        children
    }

    fn parents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut parents: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.source())
            .collect();
        parents.reverse();
        parents
    }

    /// Render the tree under the configuration.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = format!("{}\n", self.graph[self.root].label);
        let mut visited = HashSet::new();
        visited.insert(self.root);

        let children = self.children(self.root);
        let count = children.len();
        for (i, (idx, edge)) in children.into_iter().enumerate() {
            self.print_subtree(&mut output, idx, edge, "", i == count - 1, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        edge: &str,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let label = if edge.is_empty() {
            self.graph[idx].label.as_str()
        } else {
            edge
        };
        output.push_str(&format!("{prefix}{connector}{label}\n"));

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let children = self.children(idx);
        let count = children.len();
        for (i, (child, edge)) in children.into_iter().enumerate() {
            self.print_subtree(
                output,
                child,
                edge,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }

        visited.remove(&idx);
    }

    /// Labels on the path from the configuration to a module.
    ///
    /// Accepts either `group:name` or just `name`.
    pub fn find_path(&self, target_key: &str) -> Option<Vec<&str>> {
        let target = self.resolve_key(target_key)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(self.root, target, &mut path, &mut visited) {
            Some(path.iter().map(|&idx| self.graph[idx].label.as_str()).collect())
        } else {
            None
        }
    }

    /// Resolve a user-provided key to a node: exact `group:name` first, then
    /// the first module with that name.
    fn resolve_key(&self, key: &str) -> Option<NodeIndex> {
        if let Ok(identity) = ModuleIdentity::parse(key) {
            if let Some(&idx) = self.index.get(&identity) {
                return Some(idx);
            }
        }
        self.graph.node_indices().find(|&idx| {
            self.graph[idx]
                .module
                .as_ref()
                .is_some_and(|m| m.name == key)
        })
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for (child, _) in self.children(current) {
            if self.dfs_path(child, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Render who depends on a module, up to the configuration.
    pub fn print_inverted_tree(&self, target_key: &str) -> String {
        let mut output = String::new();
        let Some(idx) = self.resolve_key(target_key) else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[idx].label));

        let mut visited = HashSet::new();
        visited.insert(idx);
        let parents = self.parents(idx);
        let count = parents.len();
        for (i, parent) in parents.into_iter().enumerate() {
            self.print_inverted_subtree(&mut output, parent, "", i == count - 1, &mut visited);
        }
        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx].label));

        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let parents = self.parents(idx);
        let count = parents.len();
        for (i, parent) in parents.into_iter().enumerate() {
            self.print_inverted_subtree(output, parent, &child_prefix, i == count - 1, visited);
        }

        visited.remove(&idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolate::isolate_graph;
    use kiln_core::dependency::DependencyDescriptor;
    use std::sync::Arc;

    fn id(s: &str) -> ModuleIdentity {
        ModuleIdentity::parse(s).unwrap()
    }

    fn edge(notation: &str) -> DependencyMetadata {
        DependencyMetadata::Plain(Arc::new(DependencyDescriptor::external(notation).unwrap()))
    }

    fn module(key: &str, version: &str) -> ResolvedModule {
        ResolvedModule::new(id(key), Version::parse(version))
    }

    /// main -> a -> c, main -> b; b requested at 1.0 but resolved to 2.0.
    fn sample() -> ResolvedGraph {
        let mut g = ResolvedGraph::new("main");
        g.add_module(module("org.a:a", "1.0"));
        g.add_module(module("org.b:b", "2.0"));
        g.add_module(module("org.c:c", "3.0"));
        g.add_root(edge("org.a:a:1.0"));
        g.add_root(edge("org.b:b:1.0"));
        g.add_dependency(&id("org.a:a"), edge("org.c:c:3.0"));
        g
    }

    #[test]
    fn modules_are_unique_by_identity() {
        let mut g = ResolvedGraph::new("main");
        let first = g.add_module(module("org.a:a", "1.0"));
        let second = g.add_module(module("org.a:a", "2.0"));
        assert_eq!(first, second);
        assert_eq!(g.len(), 1);
        assert_eq!(g.module(&id("org.a:a")).unwrap().version, Version::parse("1.0"));
    }

    #[test]
    fn repeated_edges_are_ignored() {
        let mut g = sample();
        g.add_dependency(&id("org.a:a"), edge("org.c:c:2.0"));
        g.add_root(edge("org.a:a:9.0"));
        assert_eq!(g.module(&id("org.a:a")).unwrap().dependencies.len(), 1);
        assert_eq!(g.roots().len(), 2);
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        assert!(sample().find_cycle().is_none());
    }

    #[test]
    fn finds_cycle_path() {
        let mut g = sample();
        g.add_dependency(&id("org.c:c"), edge("org.a:a:1.0"));
        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle, [id("org.a:a"), id("org.c:c"), id("org.a:a")]);
    }

    #[test]
    fn tree_printing() {
        let tree = DependencyTree::new(&isolate_graph(&sample()));
        let out = tree.print_tree(None);
        assert_eq!(
            out,
            "main\n├── org.a:a:1.0\n│   └── org.c:c:3.0\n└── org.b:b:1.0 -> 2.0\n"
        );
    }

    #[test]
    fn tree_depth_limit() {
        let tree = DependencyTree::new(&isolate_graph(&sample()));
        let out = tree.print_tree(Some(1));
        assert!(out.contains("org.a:a:1.0"));
        assert!(!out.contains("org.c:c"));
    }

    #[test]
    fn find_path_by_key_and_name() {
        let tree = DependencyTree::new(&isolate_graph(&sample()));
        assert_eq!(
            tree.find_path("org.c:c").unwrap(),
            ["main", "org.a:a:1.0", "org.c:c:3.0"]
        );
        assert_eq!(tree.find_path("c").unwrap().len(), 3);
        assert!(tree.find_path("missing").is_none());
    }

    #[test]
    fn inverted_tree() {
        let tree = DependencyTree::new(&isolate_graph(&sample()));
        let inv = tree.print_inverted_tree("c");
        assert!(inv.starts_with("org.c:c:3.0\n"));
        assert!(inv.contains("org.a:a:1.0"));
        assert!(inv.contains("main"));
    }
}
