use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use ticketflow_core::WorkflowState;

/// Display name of the terminal marker.
pub const END: &str = "__end__";

/// Where an edge leads: a declared node or the terminal marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Node(name) => name,
            Self::End => END,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unconditional edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node.
    pub from: String,
    /// Target node or terminal marker.
    pub to: Target,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: Target) -> Self {
        Self {
            from: from.into(),
            to,
        }
    }

    /// Edge into a named node.
    pub fn to_node(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, Target::node(to))
    }

    /// Edge into the terminal marker.
    pub fn to_end(from: impl Into<String>) -> Self {
        Self::new(from, Target::End)
    }
}

/// Closed set of labels one router can produce.
pub trait RouteLabel: Copy + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static {
    /// Every label the router may return.
    fn all() -> &'static [Self];

    fn as_str(&self) -> &'static str;
}

/// Pure routing function evaluated at a branch point.
pub trait Router: Send + Sync + 'static {
    type Label: RouteLabel;

    /// Router identifier, used in diagnostics.
    fn name(&self) -> &str;

    fn route(&self, state: &WorkflowState) -> Self::Label;
}

type RouteFn = Box<dyn Fn(&WorkflowState) -> &'static str + Send + Sync>;

/// A conditional edge table: a router plus its label → target mapping.
///
/// The router's label type is erased here so tables for different branch
/// points can live in one definition; `labels` keeps the full label set so
/// validation can check the table covers it.
pub struct ConditionalEdges {
    from: String,
    router_name: String,
    route: RouteFn,
    labels: Vec<&'static str>,
    table: HashMap<&'static str, Target>,
}

impl ConditionalEdges {
    pub fn new<R: Router>(
        from: impl Into<String>,
        router: R,
        table: impl IntoIterator<Item = (R::Label, Target)>,
    ) -> Self {
        let router_name = router.name().to_string();
        let table = table
            .into_iter()
            .map(|(label, target)| (label.as_str(), target))
            .collect();
        Self {
            from: from.into(),
            router_name,
            route: Box::new(move |state: &WorkflowState| router.route(state).as_str()),
            labels: R::Label::all().iter().map(|l| l.as_str()).collect(),
            table,
        }
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn router_name(&self) -> &str {
        &self.router_name
    }

    /// Labels the router declares it can produce.
    pub fn labels(&self) -> &[&'static str] {
        &self.labels
    }

    /// Table entries, sorted by label.
    pub fn entries(&self) -> Vec<(&'static str, &Target)> {
        let mut entries: Vec<_> = self.table.iter().map(|(l, t)| (*l, t)).collect();
        entries.sort_by_key(|(l, _)| *l);
        entries
    }

    /// Labels with no table entry.
    pub fn uncovered_labels(&self) -> Vec<&'static str> {
        self.labels
            .iter()
            .copied()
            .filter(|l| !self.table.contains_key(l))
            .collect()
    }

    /// Evaluate the router and look its label up in the table.
    pub fn resolve(&self, state: &WorkflowState) -> (&'static str, Option<&Target>) {
        let label = (self.route)(state);
        (label, self.table.get(label))
    }
}

impl std::fmt::Debug for ConditionalEdges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalEdges")
            .field("from", &self.from)
            .field("router", &self.router_name)
            .field("table", &self.entries())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_core::Ticket;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Coin {
        Heads,
        Tails,
    }

    impl RouteLabel for Coin {
        fn all() -> &'static [Self] {
            &[Coin::Heads, Coin::Tails]
        }
        fn as_str(&self) -> &'static str {
            match self {
                Coin::Heads => "HEADS",
                Coin::Tails => "TAILS",
            }
        }
    }

    struct ByPriority;

    impl Router for ByPriority {
        type Label = Coin;
        fn name(&self) -> &str {
            "by_priority"
        }
        fn route(&self, state: &WorkflowState) -> Coin {
            if state.ticket().priority > 3 {
                Coin::Heads
            } else {
                Coin::Tails
            }
        }
    }

    fn state(priority: u32) -> WorkflowState {
        WorkflowState::new(Ticket::new("T-1", "A", "a@example.com", "q", priority))
    }

    #[test]
    fn test_edge_builders() {
        let e = Edge::to_node("a", "b");
        assert_eq!(e.from, "a");
        assert_eq!(e.to, Target::node("b"));

        let e = Edge::to_end("b");
        assert_eq!(e.to, Target::End);
        assert_eq!(e.to.to_string(), END);
    }

    #[test]
    fn test_resolve_through_table() {
        let edges = ConditionalEdges::new(
            "a",
            ByPriority,
            [(Coin::Heads, Target::node("b")), (Coin::Tails, Target::End)],
        );
        assert_eq!(edges.router_name(), "by_priority");
        assert_eq!(edges.resolve(&state(5)), ("HEADS", Some(&Target::node("b"))));
        assert_eq!(edges.resolve(&state(1)), ("TAILS", Some(&Target::End)));
        assert!(edges.uncovered_labels().is_empty());
    }

    #[test]
    fn test_uncovered_labels() {
        let edges = ConditionalEdges::new("a", ByPriority, [(Coin::Heads, Target::node("b"))]);
        assert_eq!(edges.uncovered_labels(), vec!["TAILS"]);
        assert_eq!(edges.resolve(&state(1)), ("TAILS", None));
    }
}
