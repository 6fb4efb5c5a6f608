//! Public solver facade over the blossom graph.

use log::{debug, warn};

use crate::graph::{BlossomGraph, MAX_COST};
use crate::{CostValue, Vertex};

/// Outcome of [`MinCostPerfectMatching::solve`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Status {
    /// A perfect matching of minimum total cost was found.
    Optimal,
    /// The graph admits no perfect matching.
    Infeasible,
    /// Edge costs are too large for the solver's integer arithmetic, or the
    /// accumulated dual change ran past its overflow guard.
    IntegerOverflow,
    /// A minimum-cost perfect matching was found but its total cost does not
    /// fit in an `i64`. The mates remain valid.
    CostOverflow,
}

/// Input validation failure from [`MinCostPerfectMatching::add_edge_with_cost`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, thiserror::Error)]
pub enum Error {
    #[error("node {node} out of range, the graph has {num_nodes} nodes")]
    NodeOutOfRange { node: Vertex, num_nodes: usize },
    #[error("negative edge cost {0}")]
    NegativeCost(CostValue),
}

/// Minimum-cost perfect matching on a general undirected weighted graph,
/// solved with the primal-dual blossom method.
///
/// ```text
/// let mut matching = MinCostPerfectMatching::new(4);
/// matching.add_edge_with_cost(0, 1, 10)?;
/// matching.add_edge_with_cost(2, 3, 20)?;
/// if matching.solve() == Status::Optimal {
///     let total = matching.optimal_cost();
///     let mate_of_0 = matching.mate(0);
/// }
/// ```
#[derive(Debug)]
pub struct MinCostPerfectMatching {
    num_nodes: usize,
    edges: Vec<(Vertex, Vertex, CostValue)>,
    max_cost: CostValue,
    status: Option<Status>,
    mates: Vec<Vertex>,
    optimal_cost: CostValue,
}

impl MinCostPerfectMatching {
    pub fn new(num_nodes: usize) -> Self {
        MinCostPerfectMatching {
            num_nodes,
            edges: Vec::new(),
            max_cost: 0,
            status: None,
            mates: Vec::new(),
            optimal_cost: 0,
        }
    }

    /// Discards all edges and any previous solution.
    pub fn reset(&mut self, num_nodes: usize) {
        *self = MinCostPerfectMatching::new(num_nodes);
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Adds an undirected edge with a non-negative cost. Parallel edges are
    /// allowed and only the cheapest can end up matched; self-loops are
    /// ignored with a warning since no matching can use them.
    pub fn add_edge_with_cost(
        &mut self,
        tail: Vertex,
        head: Vertex,
        cost: CostValue,
    ) -> Result<(), Error> {
        let num_nodes = self.num_nodes;
        for node in [tail, head] {
            if node >= num_nodes {
                return Err(Error::NodeOutOfRange { node, num_nodes });
            }
        }
        if cost < 0 {
            return Err(Error::NegativeCost(cost));
        }
        if tail == head {
            warn!("ignoring self-loop on node {tail}");
            return Ok(());
        }
        self.max_cost = self.max_cost.max(cost);
        self.edges.push((tail, head, cost));
        Ok(())
    }

    /// Runs the solver. The outcome is also retained and gates the
    /// [`mate`](Self::mate) / [`optimal_cost`](Self::optimal_cost) accessors.
    /// Each call solves the current edge set from scratch, so `solve` may be
    /// called again, for instance after adding more edges.
    pub fn solve(&mut self) -> Status {
        let status = self.run();
        self.status = Some(status);
        status
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Mate of `node` in the solved matching.
    ///
    /// Panics when no matching is available, i.e. unless the last solve
    /// returned [`Status::Optimal`] or [`Status::CostOverflow`].
    pub fn mate(&self, node: Vertex) -> Vertex {
        self.matches()[node]
    }

    /// The whole mate vector; `matches()[v]` is the mate of `v`.
    ///
    /// Panics when no matching is available.
    pub fn matches(&self) -> &[Vertex] {
        assert!(
            matches!(self.status, Some(Status::Optimal | Status::CostOverflow)),
            "no matching available, solve() must return Optimal or CostOverflow first"
        );
        &self.mates
    }

    /// Total cost of the solved matching.
    ///
    /// Panics unless the last solve returned [`Status::Optimal`].
    pub fn optimal_cost(&self) -> CostValue {
        assert_eq!(
            self.status,
            Some(Status::Optimal),
            "no optimal cost available, solve() must return Optimal first"
        );
        self.optimal_cost
    }

    fn run(&mut self) -> Status {
        if self.num_nodes % 2 == 1 {
            return Status::Infeasible;
        }
        // Costs get doubled on entry and doubled again after the greedy
        // bootstrap, so they must leave that much headroom.
        if self.max_cost > MAX_COST / 2 {
            return Status::IntegerOverflow;
        }
        // A fresh graph per call; an aborted earlier run leaves dead tree
        // state behind that `initialize` alone would not clear.
        let mut graph = BlossomGraph::new(self.num_nodes);
        for &(tail, head, cost) in &self.edges {
            graph.add_edge(tail, head, cost);
        }
        if !graph.initialize() {
            return Status::Infeasible;
        }
        loop {
            graph.primal_updates();
            if graph.num_unmatched() == 0 {
                break;
            }
            match graph.compute_max_common_tree_dual_delta() {
                Some(delta) if delta > 0 => {
                    if !graph.update_all_trees(delta) {
                        return Status::IntegerOverflow;
                    }
                }
                // Nothing bounds the dual change while nodes remain
                // unmatched: no perfect matching exists.
                _ => return Status::Infeasible,
            }
        }
        graph.expand_all_blossoms();
        self.mates = graph.mates();
        match graph.matched_cost() {
            Some(cost) => {
                debug!("optimal matching of cost {cost}");
                self.optimal_cost = cost;
                Status::Optimal
            }
            None => Status::CostOverflow,
        }
    }
}
