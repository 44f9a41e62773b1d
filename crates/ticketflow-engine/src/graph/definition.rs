use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use ticketflow_core::error::{Result, TicketflowError};
use ticketflow_core::traits::Stage;

use super::edge::{ConditionalEdges, Edge, Router, Target, END};

/// Mutable assembly of a workflow graph. Nothing is checked until
/// [`WorkflowBuilder::build`].
#[derive(Default)]
pub struct WorkflowBuilder {
    stages: Vec<Arc<dyn Stage>>,
    edges: Vec<Edge>,
    conditional: Vec<ConditionalEdges>,
    entry: Option<String>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stage node, named by the stage itself.
    pub fn add_stage(self, stage: impl Stage) -> Self {
        self.add_shared_stage(Arc::new(stage))
    }

    pub fn add_shared_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Add a static edge.
    pub fn add_edge(mut self, from: impl Into<String>, to: Target) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    /// Add a conditional edge table evaluated by `router` after `from` runs.
    pub fn add_conditional_edges<R: Router>(
        mut self,
        from: impl Into<String>,
        router: R,
        table: impl IntoIterator<Item = (R::Label, Target)>,
    ) -> Self {
        self.conditional.push(ConditionalEdges::new(from, router, table));
        self
    }

    /// Set the entry node.
    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Validate the graph and freeze it.
    ///
    /// Rejects: missing or undeclared entry, duplicate or reserved node
    /// names, edges from or to undeclared nodes, nodes with zero or several
    /// outgoing configurations, router labels without a table entry,
    /// unreachable nodes, an unreachable terminal marker, and cycles.
    pub fn build(self) -> Result<WorkflowDefinition> {
        let entry = self
            .entry
            .ok_or_else(|| config_error("entry node is not set"))?;

        let mut order = Vec::with_capacity(self.stages.len());
        let mut nodes: HashMap<String, Arc<dyn Stage>> = HashMap::new();
        for stage in self.stages {
            let name = stage.name().to_string();
            if name == END {
                return Err(config_error(format!("node name '{}' is reserved", END)));
            }
            if nodes.contains_key(&name) {
                return Err(config_error(format!("node '{}' is declared twice", name)));
            }
            order.push(name.clone());
            nodes.insert(name, stage);
        }

        if !nodes.contains_key(&entry) {
            return Err(config_error(format!("entry node '{}' is not declared", entry)));
        }

        let check_target = |from: &str, to: &Target| -> Result<()> {
            match to {
                Target::Node(name) if !nodes.contains_key(name) => Err(config_error(format!(
                    "edge {} -> {} targets an undeclared node",
                    from, name
                ))),
                _ => Ok(()),
            }
        };

        let mut outgoing: HashMap<String, Outgoing> = HashMap::new();

        for edge in self.edges {
            if !nodes.contains_key(&edge.from) {
                return Err(config_error(format!(
                    "edge {} -> {} starts at an undeclared node",
                    edge.from, edge.to
                )));
            }
            check_target(&edge.from, &edge.to)?;
            if outgoing.contains_key(&edge.from) {
                return Err(duplicate_outgoing(&edge.from));
            }
            outgoing.insert(edge.from, Outgoing::Static(edge.to));
        }

        for table in self.conditional {
            let from = table.from().to_string();
            if !nodes.contains_key(&from) {
                return Err(config_error(format!(
                    "router '{}' is attached to undeclared node '{}'",
                    table.router_name(),
                    from
                )));
            }
            for (label, target) in table.entries() {
                check_target(&format!("{}[{}]", from, label), target)?;
            }
            if let Some(label) = table.uncovered_labels().first() {
                return Err(config_error(format!(
                    "router '{}' at '{}' can produce label '{}' with no edge",
                    table.router_name(),
                    from,
                    label
                )));
            }
            if outgoing.contains_key(&from) {
                return Err(duplicate_outgoing(&from));
            }
            outgoing.insert(from, Outgoing::Conditional(table));
        }

        if let Some(name) = order.iter().find(|n| !outgoing.contains_key(*n)) {
            return Err(config_error(format!("node '{}' has no outgoing edge", name)));
        }

        let successors: HashMap<&str, Vec<&Target>> = outgoing
            .iter()
            .map(|(from, out)| (from.as_str(), out.targets()))
            .collect();

        let (reachable, end_reachable) = bfs_reachable(&entry, &successors);
        let unreachable: Vec<&str> = order
            .iter()
            .map(|n| n.as_str())
            .filter(|n| !reachable.contains(n))
            .collect();
        if !unreachable.is_empty() {
            return Err(config_error(format!(
                "unreachable from '{}': {}",
                entry,
                unreachable.join(", ")
            )));
        }
        if !end_reachable {
            return Err(config_error("terminal marker is unreachable"));
        }

        if let Some(node) = find_cycle(&order, &successors) {
            return Err(config_error(format!("cycle detected through '{}'", node)));
        }

        debug!(nodes = order.len(), entry = %entry, "Workflow definition validated");

        Ok(WorkflowDefinition {
            nodes,
            order,
            outgoing,
            entry,
        })
    }
}

/// The single outgoing configuration of a node.
#[derive(Debug)]
pub enum Outgoing {
    Static(Target),
    Conditional(ConditionalEdges),
}

impl Outgoing {
    fn targets(&self) -> Vec<&Target> {
        match self {
            Self::Static(target) => vec![target],
            Self::Conditional(table) => table.entries().into_iter().map(|(_, t)| t).collect(),
        }
    }
}

/// One edge as listed for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeView {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A validated, immutable workflow graph. Safe to share between
/// concurrent runs.
pub struct WorkflowDefinition {
    nodes: HashMap<String, Arc<dyn Stage>>,
    order: Vec<String>,
    outgoing: HashMap<String, Outgoing>,
    entry: String,
}

impl WorkflowDefinition {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Node names in declaration order.
    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    pub fn stage(&self, name: &str) -> Option<&Arc<dyn Stage>> {
        self.nodes.get(name)
    }

    pub fn outgoing(&self, name: &str) -> Option<&Outgoing> {
        self.outgoing.get(name)
    }

    /// All edges, grouped by source in declaration order.
    pub fn edges(&self) -> Vec<EdgeView> {
        let mut views = Vec::new();
        for from in &self.order {
            match self.outgoing.get(from) {
                Some(Outgoing::Static(to)) => views.push(EdgeView {
                    from: from.clone(),
                    to: to.to_string(),
                    router: None,
                    label: None,
                }),
                Some(Outgoing::Conditional(table)) => {
                    for (label, to) in table.entries() {
                        views.push(EdgeView {
                            from: from.clone(),
                            to: to.to_string(),
                            router: Some(table.router_name().to_string()),
                            label: Some(label.to_string()),
                        });
                    }
                }
                None => {}
            }
        }
        views
    }
}

impl std::fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .field("edges", &self.edges())
            .finish()
    }
}

fn config_error(message: impl Into<String>) -> TicketflowError {
    TicketflowError::Configuration(message.into())
}

fn duplicate_outgoing(node: &str) -> TicketflowError {
    config_error(format!("node '{}' has more than one outgoing edge configuration", node))
}

/// Breadth-first walk from `start`. Returns the reachable node set and
/// whether the terminal marker was reached.
fn bfs_reachable<'a>(
    start: &'a str,
    successors: &HashMap<&'a str, Vec<&'a Target>>,
) -> (HashSet<&'a str>, bool) {
    let mut reachable = HashSet::new();
    let mut end_reachable = false;
    let mut queue = VecDeque::new();
    reachable.insert(start);
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        for target in successors.get(node).into_iter().flatten().copied() {
            match target {
                Target::End => end_reachable = true,
                Target::Node(next) => {
                    if reachable.insert(next.as_str()) {
                        queue.push_back(next.as_str());
                    }
                }
            }
        }
    }

    (reachable, end_reachable)
}

/// Depth-first cycle search. Returns a node on the first cycle found.
fn find_cycle<'a>(order: &'a [String], successors: &HashMap<&'a str, Vec<&'a Target>>) -> Option<&'a str> {
    // 0 = unvisited, 1 = on stack, 2 = done
    let mut state: HashMap<&str, u8> = HashMap::new();

    fn visit<'a>(
        node: &'a str,
        successors: &HashMap<&'a str, Vec<&'a Target>>,
        state: &mut HashMap<&'a str, u8>,
    ) -> Option<&'a str> {
        state.insert(node, 1);
        for target in successors.get(node).into_iter().flatten().copied() {
            if let Target::Node(next) = target {
                match state.get(next.as_str()).copied().unwrap_or(0) {
                    1 => return Some(next.as_str()),
                    0 => {
                        if let Some(found) = visit(next.as_str(), successors, state) {
                            return Some(found);
                        }
                    }
                    _ => {}
                }
            }
        }
        state.insert(node, 2);
        None
    }

    for node in order {
        if state.get(node.as_str()).copied().unwrap_or(0) == 0 {
            if let Some(found) = visit(node.as_str(), successors, &mut state) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use ticketflow_core::traits::CapabilityProvider;
    use ticketflow_core::WorkflowState;

    use crate::graph::edge::RouteLabel;

    struct Named(&'static str);

    impl Stage for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn run<'a>(
            &'a self,
            state: WorkflowState,
            _capabilities: &'a dyn CapabilityProvider,
        ) -> BoxFuture<'a, Result<WorkflowState>> {
            Box::pin(async move { Ok(state) })
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Fork {
        Left,
        Right,
    }

    impl RouteLabel for Fork {
        fn all() -> &'static [Self] {
            &[Fork::Left, Fork::Right]
        }
        fn as_str(&self) -> &'static str {
            match self {
                Fork::Left => "LEFT",
                Fork::Right => "RIGHT",
            }
        }
    }

    struct AlwaysLeft;

    impl Router for AlwaysLeft {
        type Label = Fork;
        fn name(&self) -> &str {
            "always_left"
        }
        fn route(&self, _state: &WorkflowState) -> Fork {
            Fork::Left
        }
    }

    fn linear() -> WorkflowBuilder {
        WorkflowBuilder::new()
            .add_stage(Named("a"))
            .add_stage(Named("b"))
            .add_edge("a", Target::node("b"))
            .add_edge("b", Target::End)
            .set_entry("a")
    }

    fn message(result: Result<WorkflowDefinition>) -> String {
        match result {
            Err(TicketflowError::Configuration(msg)) => msg,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("definition unexpectedly validated"),
        }
    }

    #[test]
    fn test_linear_graph_validates() {
        let def = linear().build().unwrap();
        assert_eq!(def.entry(), "a");
        assert_eq!(def.node_names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(def.edges().len(), 2);
        assert_eq!(def.edges()[1].to, END);
    }

    #[test]
    fn test_missing_entry() {
        let b = WorkflowBuilder::new()
            .add_stage(Named("a"))
            .add_edge("a", Target::End);
        assert_eq!(message(b.build()), "entry node is not set");

        let b = WorkflowBuilder::new()
            .add_stage(Named("a"))
            .add_edge("a", Target::End)
            .set_entry("zzz");
        assert!(message(b.build()).contains("'zzz' is not declared"));
    }

    #[test]
    fn test_dangling_edge() {
        let b = linear().add_stage(Named("c")).add_edge("c", Target::node("ghost"));
        assert!(message(b.build()).contains("undeclared node"));
    }

    #[test]
    fn test_edge_from_undeclared_node() {
        let b = linear().add_edge("ghost", Target::End);
        assert!(message(b.build()).contains("starts at an undeclared node"));
    }

    #[test]
    fn test_duplicate_node() {
        let b = linear().add_stage(Named("a"));
        assert!(message(b.build()).contains("declared twice"));
    }

    #[test]
    fn test_reserved_name() {
        let b = linear().add_stage(Named(END));
        assert!(message(b.build()).contains("reserved"));
    }

    #[test]
    fn test_node_without_outgoing_edge() {
        let b = WorkflowBuilder::new()
            .add_stage(Named("a"))
            .add_stage(Named("b"))
            .add_edge("a", Target::node("b"))
            .set_entry("a");
        assert_eq!(message(b.build()), "node 'b' has no outgoing edge");
    }

    #[test]
    fn test_two_outgoing_configurations() {
        let b = linear().add_conditional_edges(
            "a",
            AlwaysLeft,
            [(Fork::Left, Target::node("b")), (Fork::Right, Target::End)],
        );
        assert!(message(b.build()).contains("more than one outgoing"));
    }

    #[test]
    fn test_unreachable_node() {
        let b = linear()
            .add_stage(Named("island"))
            .add_edge("island", Target::End);
        assert_eq!(message(b.build()), "unreachable from 'a': island");
    }

    #[test]
    fn test_terminal_unreachable() {
        let b = WorkflowBuilder::new()
            .add_stage(Named("a"))
            .add_stage(Named("b"))
            .add_edge("a", Target::node("b"))
            .add_edge("b", Target::node("a"))
            .set_entry("a");
        assert_eq!(message(b.build()), "terminal marker is unreachable");
    }

    #[test]
    fn test_cycle_rejected() {
        let b = WorkflowBuilder::new()
            .add_stage(Named("a"))
            .add_stage(Named("b"))
            .add_edge("a", Target::node("b"))
            .add_conditional_edges(
                "b",
                AlwaysLeft,
                [(Fork::Left, Target::node("a")), (Fork::Right, Target::End)],
            )
            .set_entry("a");
        assert!(message(b.build()).starts_with("cycle detected"));
    }

    #[test]
    fn test_uncovered_router_label() {
        let b = WorkflowBuilder::new()
            .add_stage(Named("a"))
            .add_stage(Named("b"))
            .add_conditional_edges("a", AlwaysLeft, [(Fork::Left, Target::node("b"))])
            .add_edge("b", Target::End)
            .set_entry("a");
        assert_eq!(
            message(b.build()),
            "router 'always_left' at 'a' can produce label 'RIGHT' with no edge"
        );
    }

    #[test]
    fn test_conditional_edges_listed() {
        let def = WorkflowBuilder::new()
            .add_stage(Named("a"))
            .add_stage(Named("b"))
            .add_conditional_edges(
                "a",
                AlwaysLeft,
                [(Fork::Left, Target::node("b")), (Fork::Right, Target::End)],
            )
            .add_edge("b", Target::End)
            .set_entry("a")
            .build()
            .unwrap();

        let edges = def.edges();
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].label.as_deref(), Some("LEFT"));
        assert_eq!(edges[0].router.as_deref(), Some("always_left"));
        assert_eq!(edges[1].label.as_deref(), Some("RIGHT"));
        assert_eq!(edges[1].to, END);
        assert!(matches!(def.outgoing("a"), Some(Outgoing::Conditional(_))));
    }
}
