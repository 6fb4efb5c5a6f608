// Minimum-cost perfect matching in general graphs.

// The algorithm is the "blossom" method of Jack Edmonds in its primal-dual
// form, organized the way Vladimir Kolmogorov describes in "Blossom V: a new
// implementation of a minimum cost perfect matching algorithm", Mathematical
// Programming Computation, 2009: alternating trees grown from every
// unmatched node at once, odd cycles contracted into pseudo-nodes, and a
// common dual change applied lazily to all trees through one accumulator per
// tree root.

// Costs must be non-negative integers. With V nodes and E edges the solver
// runs in O(V * E * log V); duals and slacks stay integral throughout, so
// the optimum is exact.

//! Solve with [`MinCostPerfectMatching`]: add every node's edges with
//! [`add_edge_with_cost`](MinCostPerfectMatching::add_edge_with_cost), call
//! [`solve`](MinCostPerfectMatching::solve) and, when it returns
//! [`Status::Optimal`], read the pairing back through
//! [`mate`](MinCostPerfectMatching::mate) and
//! [`optimal_cost`](MinCostPerfectMatching::optimal_cost).

mod graph;
mod matching;
pub mod pqueue;

pub use matching::{Error, MinCostPerfectMatching, Status};

/// Node identifier; nodes are consecutive integers starting at zero.
pub type Vertex = usize;

/// Edge costs, node duals and edge slacks.
pub type CostValue = i64;
