//! Graph builder and compile-time validation.
//!
//! `GraphBuilder` collects nodes, unconditional edges, conditional edges and
//! the pause-before set. `compile` checks the structure once and produces an
//! immutable [`CompiledGraph`]; structural mistakes are programming errors and
//! never surface at run time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ledgerflow_types::checkpoint::{END, START};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use thiserror::Error;

use super::{GraphState, Node};

/// Routing function for a conditional edge.
pub type RouteFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural problem found while compiling a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{0}' declared more than once")]
    DuplicateNode(String),

    #[error("'{0}' is a reserved name")]
    ReservedName(String),

    #[error("{context} references unknown node '{name}'")]
    UnknownNode { name: String, context: String },

    #[error("graph has no start edge")]
    MissingStart,

    #[error("graph has {0} start edges, expected exactly one")]
    MultipleStarts(usize),

    #[error("node '{0}' has no outgoing edge")]
    NoOutgoingEdge(String),

    #[error("node '{0}' has more than one outgoing edge")]
    MultipleOutgoingEdges(String),

    #[error("conditional edge from '{0}' declares no targets")]
    EmptyTargets(String),

    #[error("node '{0}' is unreachable from the start node")]
    Unreachable(String),
}

/// A conditional router returned a destination outside its declared set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("router for '{from}' returned '{target}', which is not a declared target")]
    IllegalTarget { from: String, target: String },

    #[error("no transition declared for '{0}'")]
    NoTransition(String),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct ConditionalEdge<S> {
    source: String,
    route: RouteFn<S>,
    targets: Vec<String>,
}

/// Collects a graph definition. Consumed by [`GraphBuilder::compile`].
pub struct GraphBuilder<S> {
    nodes: Vec<(String, Arc<dyn Node<S>>)>,
    edges: Vec<(String, String)>,
    conditional: Vec<ConditionalEdge<S>>,
    pause_before: Vec<String>,
}

impl<S: GraphState> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            conditional: Vec::new(),
            pause_before: Vec::new(),
        }
    }

    pub fn add_node(mut self, name: &str, node: impl Node<S> + 'static) -> Self {
        self.nodes.push((name.to_string(), Arc::new(node)));
        self
    }

    /// Unconditional edge. Use [`START`] as `from` to declare the start node
    /// and [`END`] as `to` to finish the thread.
    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        self.edges.push((from.to_string(), to.to_string()));
        self
    }

    /// Conditional edge: `route` picks the next node from the merged state
    /// and must return one of `targets`.
    pub fn add_conditional_edges<F>(mut self, from: &str, route: F, targets: &[&str]) -> Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        self.conditional.push(ConditionalEdge {
            source: from.to_string(),
            route: Arc::new(route),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    /// Stop the thread before `node` runs, until external input resumes it.
    pub fn pause_before(mut self, node: &str) -> Self {
        self.pause_before.push(node.to_string());
        self
    }

    /// Validate the definition and freeze it.
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        let mut nodes: HashMap<String, Arc<dyn Node<S>>> = HashMap::new();
        for (name, node) in self.nodes {
            if name == START || name == END {
                return Err(GraphError::ReservedName(name));
            }
            if nodes.insert(name.clone(), node).is_some() {
                return Err(GraphError::DuplicateNode(name));
            }
        }

        let is_target = |name: &str| name == END || nodes.contains_key(name);

        // Start edge
        let starts: Vec<&String> = self
            .edges
            .iter()
            .filter(|(from, _)| from == START)
            .map(|(_, to)| to)
            .collect();
        let start = match starts.as_slice() {
            [] => return Err(GraphError::MissingStart),
            [only] => (*only).clone(),
            many => return Err(GraphError::MultipleStarts(many.len())),
        };
        if !nodes.contains_key(&start) {
            return Err(GraphError::UnknownNode {
                name: start,
                context: "start edge".to_string(),
            });
        }

        // Transitions
        let mut transitions: HashMap<String, Transition<S>> = HashMap::new();
        for (from, to) in self.edges.into_iter().filter(|(from, _)| from != START) {
            if !nodes.contains_key(&from) {
                return Err(GraphError::UnknownNode {
                    name: from,
                    context: "edge source".to_string(),
                });
            }
            if !is_target(&to) {
                return Err(GraphError::UnknownNode {
                    name: to,
                    context: format!("edge from '{from}'"),
                });
            }
            if transitions.contains_key(&from) {
                return Err(GraphError::MultipleOutgoingEdges(from));
            }
            transitions.insert(from, Transition::Fixed(to));
        }

        for edge in self.conditional {
            if !nodes.contains_key(&edge.source) {
                return Err(GraphError::UnknownNode {
                    name: edge.source,
                    context: "conditional edge source".to_string(),
                });
            }
            if edge.targets.is_empty() {
                return Err(GraphError::EmptyTargets(edge.source));
            }
            if let Some(bad) = edge.targets.iter().find(|t| !is_target(t)) {
                return Err(GraphError::UnknownNode {
                    name: bad.clone(),
                    context: format!("conditional edge from '{}'", edge.source),
                });
            }
            if transitions.contains_key(&edge.source) {
                return Err(GraphError::MultipleOutgoingEdges(edge.source));
            }
            transitions.insert(
                edge.source,
                Transition::Conditional {
                    route: edge.route,
                    targets: edge.targets.into_iter().collect(),
                },
            );
        }

        if let Some(name) = nodes.keys().find(|n| !transitions.contains_key(*n)) {
            return Err(GraphError::NoOutgoingEdge(name.clone()));
        }

        let mut pause_before = HashSet::new();
        for name in self.pause_before {
            if !nodes.contains_key(&name) {
                return Err(GraphError::UnknownNode {
                    name,
                    context: "pause-before set".to_string(),
                });
            }
            pause_before.insert(name);
        }

        check_reachability(&start, &nodes, &transitions)?;

        Ok(CompiledGraph {
            nodes,
            transitions,
            start,
            pause_before,
        })
    }
}

/// Every declared node must be reachable from the start node.
fn check_reachability<S>(
    start: &str,
    nodes: &HashMap<String, Arc<dyn Node<S>>>,
    transitions: &HashMap<String, Transition<S>>,
) -> Result<(), GraphError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for name in nodes.keys() {
        index.insert(name.as_str(), graph.add_node(name.as_str()));
    }
    index.insert(END, graph.add_node(END));

    for (from, transition) in transitions {
        let from_idx = index[from.as_str()];
        for to in transition.targets() {
            graph.add_edge(from_idx, index[to], ());
        }
    }

    let mut visited = HashSet::new();
    let mut dfs = Dfs::new(&graph, index[start]);
    while let Some(idx) = dfs.next(&graph) {
        visited.insert(graph[idx]);
    }

    let mut unreachable: Vec<&str> = nodes
        .keys()
        .map(String::as_str)
        .filter(|n| !visited.contains(n))
        .collect();
    unreachable.sort_unstable();
    match unreachable.first() {
        Some(name) => Err(GraphError::Unreachable(name.to_string())),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Compiled graph
// ---------------------------------------------------------------------------

enum Transition<S> {
    Fixed(String),
    Conditional {
        route: RouteFn<S>,
        targets: HashSet<String>,
    },
}

impl<S> Transition<S> {
    fn targets(&self) -> Vec<&str> {
        match self {
            Transition::Fixed(to) => vec![to.as_str()],
            Transition::Conditional { targets, .. } => targets.iter().map(String::as_str).collect(),
        }
    }
}

/// A validated, immutable workflow graph.
pub struct CompiledGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    transitions: HashMap<String, Transition<S>>,
    start: String,
    pause_before: HashSet<String>,
}

impl<S: GraphState> CompiledGraph<S> {
    pub fn start_node(&self) -> &str {
        &self.start
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node<S>>> {
        self.nodes.get(name)
    }

    pub fn pauses_before(&self, name: &str) -> bool {
        self.pause_before.contains(name)
    }

    /// Node names in alphabetical order.
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve the node that follows `from` given the merged state.
    pub fn next_node(&self, from: &str, state: &S) -> Result<String, RouteError> {
        match self.transitions.get(from) {
            Some(Transition::Fixed(to)) => Ok(to.clone()),
            Some(Transition::Conditional { route, targets }) => {
                let target = route(state);
                if targets.contains(&target) {
                    Ok(target)
                } else {
                    Err(RouteError::IllegalTarget {
                        from: from.to_string(),
                        target,
                    })
                }
            }
            None => Err(RouteError::NoTransition(from.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FnNode, NodeContext, NodeError, merge_field};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Counter {
        value: Option<i64>,
    }

    impl GraphState for Counter {
        fn merge(&mut self, update: Self) {
            merge_field(&mut self.value, update.value);
        }
    }

    fn noop() -> impl Node<Counter> {
        FnNode::new(|_ctx: NodeContext, _s: Counter| async move { Ok::<_, NodeError>(Counter::default()) })
    }

    fn linear() -> GraphBuilder<Counter> {
        GraphBuilder::new()
            .add_node("a", noop())
            .add_node("b", noop())
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", END)
    }

    #[test]
    fn test_compile_linear_graph() {
        let graph = linear().compile().unwrap();
        assert_eq!(graph.start_node(), "a");
        assert_eq!(graph.node_names(), vec!["a", "b"]);
        assert_eq!(graph.next_node("a", &Counter::default()).unwrap(), "b");
        assert_eq!(graph.next_node("b", &Counter::default()).unwrap(), END);
        assert!(!graph.pauses_before("b"));
    }

    #[test]
    fn test_compile_rejects_unknown_edge_target() {
        let err = linear().add_node("c", noop()).add_edge("c", "missing").compile();
        assert!(matches!(err, Err(GraphError::UnknownNode { name, .. }) if name == "missing"));
    }

    #[test]
    fn test_compile_requires_exactly_one_start() {
        let none = GraphBuilder::<Counter>::new()
            .add_node("a", noop())
            .add_edge("a", END)
            .compile();
        assert!(matches!(none, Err(GraphError::MissingStart)));

        let two = linear().add_edge(START, "b").compile();
        assert!(matches!(two, Err(GraphError::MultipleStarts(2))));
    }

    #[test]
    fn test_compile_rejects_undeclared_pause_node() {
        let err = linear().pause_before("ghost").compile();
        assert!(matches!(err, Err(GraphError::UnknownNode { name, .. }) if name == "ghost"));
    }

    #[test]
    fn test_compile_rejects_node_without_transition() {
        let err = linear().add_node("c", noop()).compile();
        assert!(matches!(err, Err(GraphError::NoOutgoingEdge(name)) if name == "c"));
    }

    #[test]
    fn test_compile_rejects_two_transitions() {
        let err = linear().add_edge("a", END).compile();
        assert!(matches!(err, Err(GraphError::MultipleOutgoingEdges(name)) if name == "a"));
    }

    #[test]
    fn test_compile_rejects_unreachable_node() {
        let err = linear().add_node("island", noop()).add_edge("island", END).compile();
        assert!(matches!(err, Err(GraphError::Unreachable(name)) if name == "island"));
    }

    #[test]
    fn test_compile_rejects_duplicate_and_reserved_names() {
        let dup = linear().add_node("a", noop()).compile();
        assert!(matches!(dup, Err(GraphError::DuplicateNode(name)) if name == "a"));

        let reserved = linear().add_node(END, noop()).compile();
        assert!(matches!(reserved, Err(GraphError::ReservedName(_))));
    }

    #[test]
    fn test_conditional_route_checks_legal_set() {
        let graph = GraphBuilder::<Counter>::new()
            .add_node("a", noop())
            .add_node("b", noop())
            .add_edge(START, "a")
            .add_conditional_edges(
                "a",
                |s: &Counter| match s.value {
                    Some(v) if v > 10 => "b".to_string(),
                    Some(_) => END.to_string(),
                    None => "nowhere".to_string(),
                },
                &["b", END],
            )
            .add_edge("b", END)
            .compile()
            .unwrap();

        let big = Counter { value: Some(11) };
        let small = Counter { value: Some(1) };
        assert_eq!(graph.next_node("a", &big).unwrap(), "b");
        assert_eq!(graph.next_node("a", &small).unwrap(), END);

        let err = graph.next_node("a", &Counter::default()).unwrap_err();
        assert_eq!(
            err,
            RouteError::IllegalTarget {
                from: "a".to_string(),
                target: "nowhere".to_string()
            }
        );
    }

    #[test]
    fn test_cycles_are_allowed() {
        let graph = GraphBuilder::<Counter>::new()
            .add_node("a", noop())
            .add_node("b", noop())
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_conditional_edges("b", |_s: &Counter| "a".to_string(), &["a", END])
            .compile();
        assert!(graph.is_ok());
    }
}
