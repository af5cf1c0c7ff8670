// SPDX-License-Identifier: MIT

//! Dependency graph construction and validation
//!
//! `DependencyGraphBuilder` collects nodes and edges; `build()` validates the
//! structure and precomputes everything the scheduler needs at run time
//! (topological order, ancestor sets, entry points, sinks).

use super::types::{CompiledGuard, Edge, Guard, NodeSpec};
use crate::adk::error::GraphError;
use crate::adk::executor::AgentExecutor;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Validated node
pub(crate) struct GraphNode {
    pub id: String,
    pub executor: Arc<dyn AgentExecutor>,
    pub max_retries: Option<u32>,
    pub priority: i32,
    pub outputs: Vec<(String, String)>,
}

/// Guarded inbound edge of a node
pub(crate) struct GuardedEdge {
    pub source: usize,
    pub guard: CompiledGuard,
}

/// A validated, acyclic dependency graph
///
/// Nodes are addressed internally by their insertion index.
pub struct DependencyGraph {
    pub(crate) nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    /// Plain inbound dependencies, all required
    pub(crate) plain: Vec<Vec<usize>>,
    /// Guarded inbound edges, any one sufficient
    pub(crate) guarded: Vec<Vec<GuardedEdge>>,
    /// Direct upstream nodes of both kinds, in topological order
    pub(crate) parents: Vec<Vec<usize>>,
    pub(crate) topo: Vec<usize>,
    /// Position of each node within `topo`
    pub(crate) position: Vec<usize>,
    /// Transitive upstream nodes, in topological order
    pub(crate) ancestors: Vec<Vec<usize>>,
    pub(crate) entry_points: Vec<usize>,
    pub(crate) sinks: Vec<usize>,
}

impl DependencyGraph {
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn id(&self, idx: usize) -> &str {
        &self.nodes[idx].id
    }

    /// Node ids in insertion order
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Node ids in topological order; ties keep insertion order
    pub fn topological_order(&self) -> Vec<&str> {
        self.ids(&self.topo)
    }

    pub fn entry_points(&self) -> Vec<&str> {
        self.ids(&self.entry_points)
    }

    pub fn sinks(&self) -> Vec<&str> {
        self.ids(&self.sinks)
    }

    /// Direct upstream nodes, plain and guarded
    pub fn dependencies(&self, id: &str) -> Option<Vec<&str>> {
        self.index_of(id).map(|idx| self.ids(&self.parents[idx]))
    }

    /// Every node `id` transitively depends on
    pub fn ancestors(&self, id: &str) -> Option<Vec<&str>> {
        self.index_of(id).map(|idx| self.ids(&self.ancestors[idx]))
    }

    fn ids(&self, indices: &[usize]) -> Vec<&str> {
        indices.iter().map(|&i| self.nodes[i].id.as_str()).collect()
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("topological_order", &self.topological_order())
            .field("entry_points", &self.entry_points())
            .field("sinks", &self.sinks())
            .finish()
    }
}

/// Builder for [`DependencyGraph`]
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    nodes: Vec<NodeSpec>,
    edges: Vec<Edge>,
    entry_points: Option<Vec<String>>,
    sinks: Option<Vec<String>>,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with plain (all-required) dependencies
    pub fn add_node<I, S>(self, id: impl Into<String>, executor: Arc<dyn AgentExecutor>, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node(NodeSpec::new(id, executor).depends_on(deps))
    }

    /// Add a fully specified node
    pub fn node(mut self, spec: NodeSpec) -> Self {
        self.nodes.push(spec);
        self
    }

    /// Add an edge; a guard makes it conditional and OR-combined with the target's other guarded edges
    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>, guard: Option<Guard>) -> Self {
        self.edge(Edge {
            from: from.into(),
            to: to.into(),
            guard,
        })
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Explicit entry points; defaults to every node without inbound edges
    pub fn set_entry_points<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_points = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Explicit sinks; defaults to every node without outbound edges
    pub fn set_sinks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sinks = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and freeze the graph
    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index = HashMap::with_capacity(self.nodes.len());
        for (i, spec) in self.nodes.iter().enumerate() {
            if index.insert(spec.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(spec.id.clone()));
            }
        }

        let lookup = |id: &str, from: &str, to: &str| {
            index.get(id).copied().ok_or_else(|| GraphError::DanglingEdge {
                from: from.to_string(),
                to: to.to_string(),
                missing: id.to_string(),
            })
        };

        let n = self.nodes.len();
        let mut plain: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut guarded: Vec<Vec<GuardedEdge>> = (0..n).map(|_| Vec::new()).collect();
        let mut children: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

        for (to, spec) in self.nodes.iter().enumerate() {
            for dep in &spec.depends_on {
                let from = lookup(dep, dep, &spec.id)?;
                if !plain[to].contains(&from) {
                    plain[to].push(from);
                }
                children[from].insert(to);
            }
        }

        for edge in &self.edges {
            let from = lookup(&edge.from, &edge.from, &edge.to)?;
            let to = lookup(&edge.to, &edge.from, &edge.to)?;
            match &edge.guard {
                None => {
                    if !plain[to].contains(&from) {
                        plain[to].push(from);
                    }
                }
                Some(guard) => {
                    let guard = CompiledGuard::compile(guard).map_err(|reason| {
                        GraphError::InvalidGuard {
                            from: edge.from.clone(),
                            to: edge.to.clone(),
                            reason,
                        }
                    })?;
                    guarded[to].push(GuardedEdge { source: from, guard });
                }
            }
            children[from].insert(to);
        }

        let has_inbound: Vec<bool> = (0..n)
            .map(|i| !plain[i].is_empty() || !guarded[i].is_empty())
            .collect();

        let entry_points: Vec<usize> = match self.entry_points.filter(|ids| !ids.is_empty()) {
            Some(ids) => {
                let mut resolved = Vec::with_capacity(ids.len());
                for id in ids {
                    let idx = *index
                        .get(&id)
                        .ok_or_else(|| GraphError::UnknownEntryPoint(id.clone()))?;
                    if has_inbound[idx] {
                        return Err(GraphError::EntryPointHasDependencies(id));
                    }
                    if !resolved.contains(&idx) {
                        resolved.push(idx);
                    }
                }
                resolved
            }
            None => (0..n).filter(|&i| !has_inbound[i]).collect(),
        };

        let topo = topological_sort(&children, &has_inbound, &self.nodes)?;

        let mut reached = vec![false; n];
        let mut queue: VecDeque<usize> = entry_points.iter().copied().collect();
        for &e in &entry_points {
            reached[e] = true;
        }
        while let Some(current) = queue.pop_front() {
            for &next in &children[current] {
                if !reached[next] {
                    reached[next] = true;
                    queue.push_back(next);
                }
            }
        }
        if let Some(i) = (0..n).find(|&i| !reached[i]) {
            return Err(GraphError::UnreachableNode(self.nodes[i].id.clone()));
        }

        let mut position = vec![0; n];
        for (pos, &idx) in topo.iter().enumerate() {
            position[idx] = pos;
        }

        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (from, targets) in children.iter().enumerate() {
            for &to in targets {
                parents[to].push(from);
            }
        }
        for list in &mut parents {
            list.sort_by_key(|&i| position[i]);
        }

        let mut ancestor_sets: Vec<HashSet<usize>> = vec![HashSet::new(); n];
        for &idx in &topo {
            let mut set = HashSet::new();
            for &p in &parents[idx] {
                set.insert(p);
                set.extend(ancestor_sets[p].iter().copied());
            }
            ancestor_sets[idx] = set;
        }
        let ancestors: Vec<Vec<usize>> = ancestor_sets
            .into_iter()
            .map(|set| {
                let mut list: Vec<usize> = set.into_iter().collect();
                list.sort_by_key(|&i| position[i]);
                list
            })
            .collect();

        let sinks: Vec<usize> = match self.sinks.filter(|ids| !ids.is_empty()) {
            Some(ids) => {
                let mut resolved = Vec::with_capacity(ids.len());
                for id in ids {
                    let idx = *index.get(&id).ok_or(GraphError::UnknownSink(id))?;
                    if !resolved.contains(&idx) {
                        resolved.push(idx);
                    }
                }
                resolved
            }
            None => (0..n).filter(|&i| children[i].is_empty()).collect(),
        };

        let nodes = self
            .nodes
            .into_iter()
            .map(|spec| {
                let mut outputs: Vec<(String, String)> = spec.outputs.into_iter().collect();
                outputs.sort();
                GraphNode {
                    id: spec.id,
                    executor: spec.executor,
                    max_retries: spec.max_retries,
                    priority: spec.priority,
                    outputs,
                }
            })
            .collect();

        log::debug!(
            "Built dependency graph: {} nodes, {} entry points, {} sinks",
            n,
            entry_points.len(),
            sinks.len()
        );

        Ok(DependencyGraph {
            nodes,
            index,
            plain,
            guarded,
            parents,
            topo,
            position,
            ancestors,
            entry_points,
            sinks,
        })
    }
}

/// Kahn's algorithm; the lowest insertion index wins among ready nodes
fn topological_sort(
    children: &[BTreeSet<usize>],
    has_inbound: &[bool],
    nodes: &[NodeSpec],
) -> Result<Vec<usize>, GraphError> {
    let n = children.len();
    let mut in_degree = vec![0usize; n];
    for targets in children {
        for &to in targets {
            in_degree[to] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| !has_inbound[i]).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(current) = ready.pop_first() {
        order.push(current);
        for &next in &children[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    let remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
    Err(GraphError::Cycle(find_cycle(children, &remaining, nodes)))
}

/// Depth-first search over the nodes left after Kahn's pass; returns a closed path
fn find_cycle(children: &[BTreeSet<usize>], remaining: &[bool], nodes: &[NodeSpec]) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    let n = children.len();
    let mut marks = vec![Mark::Unvisited; n];

    for start in (0..n).filter(|&i| remaining[i]) {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        // (node, children still to visit, popped from the back)
        let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();
        let mut path: Vec<usize> = Vec::new();
        marks[start] = Mark::OnStack;
        stack.push((start, children[start].iter().rev().copied().collect()));
        path.push(start);

        while let Some((_, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(next) if remaining[next] => match marks[next] {
                    Mark::OnStack => {
                        let from = path.iter().position(|&p| p == next).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[from..].iter().map(|&i| nodes[i].id.clone()).collect();
                        cycle.push(nodes[next].id.clone());
                        return cycle;
                    }
                    Mark::Unvisited => {
                        marks[next] = Mark::OnStack;
                        stack.push((next, children[next].iter().rev().copied().collect()));
                        path.push(next);
                    }
                    Mark::Done => {}
                },
                Some(_) => {}
                None => {
                    if let Some((done, _)) = stack.pop() {
                        marks[done] = Mark::Done;
                    }
                    path.pop();
                }
            }
        }
    }

    Vec::new()
}
