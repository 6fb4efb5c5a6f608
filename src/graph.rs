//! The blossom graph: node and edge arenas, alternating trees, blossoms and
//! lazily maintained dual values.
//!
//! The solver keeps, for every alternating tree, a single accumulated dual
//! adjustment on the tree root (`tree_dual_delta`). Node duals and edge
//! slacks are stored in "pseudo" form and the true values are recovered on
//! demand:
//!
//!   true_dual(x)  = pseudo_dual(x) + sign(x) * tree_dual_delta(root(x))
//!   true_slack(e) = pseudo_slack(e) - offset(top(tail)) - offset(top(head))
//!
//! where sign is +1 for [+] nodes, -1 for [-] nodes and 0 for free nodes,
//! and `top` maps an original vertex to the outermost node containing it.
//! Edges with both endpoints inside one node are internal and hold their raw
//! frozen slack. Whenever a node changes type or tree, its pseudo values and
//! the pseudo-slacks of its boundary edges are patched so both formulas keep
//! holding; a uniform dual change across all trees then costs O(1) per tree.
//!
//! Since every tree root exists from `initialize` on and every dual step is
//! applied to all trees at once, live trees always share one accumulated
//! delta. Pseudo-slacks of [+]/[+] and [+]/free edges are therefore static
//! between structural changes and can serve directly as priority keys in the
//! two tight-edge queues.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::pqueue::{IndexedPriorityQueue, QueueItem, NO_POSITION};
use crate::CostValue;

/// Largest usable doubled edge cost. Together with the cap on accumulated
/// dual change this keeps every pseudo value well inside `i64`.
pub(crate) const MAX_COST: CostValue = i64::MAX / 16;

/// Cap on the accumulated common dual change before the solve aborts.
const MAX_TOTAL_DUAL_DELTA: CostValue = i64::MAX / 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct NodeIndex(pub(crate) usize);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct EdgeIndex(pub(crate) usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum NodeType {
    Plus,
    Minus,
    Free,
}

#[derive(Debug)]
struct Node {
    node_type: NodeType,
    /// True while the node sits inside some blossom; its fields are then
    /// frozen and the node is skipped by every arena scan.
    is_internal: bool,
    /// Unmatched tight edge to the parent in the alternating tree.
    parent_edge: Option<EdgeIndex>,
    match_edge: Option<EdgeIndex>,
    root: NodeIndex,
    pseudo_dual: CostValue,
    /// Accumulated dual adjustment; meaningful on tree roots only.
    tree_dual_delta: CostValue,
    /// Odd cycle of member nodes, base first; empty unless this is a
    /// blossom pseudo-node.
    blossom: Vec<NodeIndex>,
    /// `blossom_edges[i]` joins `blossom[i]` and `blossom[(i + 1) % len]`.
    blossom_edges: Vec<EdgeIndex>,
}

impl Node {
    fn new(index: NodeIndex) -> Self {
        Node {
            node_type: NodeType::Free,
            is_internal: false,
            parent_edge: None,
            match_edge: None,
            root: index,
            pseudo_dual: 0,
            tree_dual_delta: 0,
            blossom: Vec::new(),
            blossom_edges: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Edge {
    /// Original endpoints; never rewritten when blossoms form.
    tail: NodeIndex,
    head: NodeIndex,
    /// Cost as given by the caller; the doubling happens in `initialize`.
    cost: CostValue,
    pseudo_slack: CostValue,
    heap_index: usize,
}

impl QueueItem for Edge {
    fn heap_index(&self) -> usize {
        self.heap_index
    }
    fn set_heap_index(&mut self, position: usize) {
        self.heap_index = position;
    }
    fn before(&self, other: &Self) -> bool {
        self.pseudo_slack < other.pseudo_slack
    }
}

#[derive(Debug)]
pub(crate) struct BlossomGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Incident edge lists of the original vertices.
    adjacency: Vec<Vec<EdgeIndex>>,
    /// Outermost node containing each original vertex.
    in_blossom: Vec<NodeIndex>,
    num_nodes: usize,
    /// Recycled arena slots for blossom pseudo-nodes.
    unused_blossoms: Vec<NodeIndex>,
    /// Tight-edge candidates keyed by pseudo-slack.
    plus_plus_queue: IndexedPriorityQueue,
    plus_free_queue: IndexedPriorityQueue,
    /// Tight edges waiting for a primal operation.
    primal_queue: Vec<EdgeIndex>,
    pending_shrinks: Vec<EdgeIndex>,
    num_unmatched: usize,
    total_dual_delta: CostValue,
}

impl BlossomGraph {
    pub(crate) fn new(num_nodes: usize) -> Self {
        BlossomGraph {
            nodes: (0..num_nodes).map(|i| Node::new(NodeIndex(i))).collect(),
            edges: Vec::new(),
            adjacency: vec![Vec::new(); num_nodes],
            in_blossom: (0..num_nodes).map(NodeIndex).collect(),
            num_nodes,
            unused_blossoms: Vec::new(),
            plus_plus_queue: IndexedPriorityQueue::new(),
            plus_free_queue: IndexedPriorityQueue::new(),
            primal_queue: Vec::new(),
            pending_shrinks: Vec::new(),
            num_unmatched: 0,
            total_dual_delta: 0,
        }
    }

    /// Endpoints must be distinct and in range; the facade validates input.
    pub(crate) fn add_edge(&mut self, tail: usize, head: usize, cost: CostValue) {
        let e = EdgeIndex(self.edges.len());
        self.edges.push(Edge {
            tail: NodeIndex(tail),
            head: NodeIndex(head),
            cost,
            pseudo_slack: 0,
            heap_index: NO_POSITION,
        });
        self.adjacency[tail].push(e);
        self.adjacency[head].push(e);
    }

    pub(crate) fn num_unmatched(&self) -> usize {
        self.num_unmatched
    }

    /// Sets up duals, slacks, the greedy bootstrap matching, the tree roots
    /// and the tight-edge queues. Returns `false` when some vertex has no
    /// incident edge, which makes a perfect matching impossible.
    pub(crate) fn initialize(&mut self) -> bool {
        // Half of the minimum incident doubled cost.
        for v in 0..self.num_nodes {
            let Some(min_cost) = self.adjacency[v].iter().map(|e| self.edges[e.0].cost).min()
            else {
                return false;
            };
            self.nodes[v].pseudo_dual = min_cost;
        }
        for i in 0..self.edges.len() {
            let (t, h) = (self.edges[i].tail, self.edges[i].head);
            self.edges[i].pseudo_slack =
                2 * self.edges[i].cost - self.nodes[t.0].pseudo_dual - self.nodes[h.0].pseudo_dual;
        }
        // Greedily match tight pairs before growing any tree.
        for v in 0..self.num_nodes {
            if self.nodes[v].match_edge.is_some() {
                continue;
            }
            let incident = self.adjacency[v].clone();
            for e in incident {
                if self.edges[e.0].pseudo_slack != 0 {
                    continue;
                }
                let w = self.other_endpoint(e, NodeIndex(v));
                if self.nodes[w.0].match_edge.is_none() {
                    self.nodes[v].match_edge = Some(e);
                    self.nodes[w.0].match_edge = Some(e);
                    break;
                }
            }
        }
        // Double every dual and slack. All duals are now even, every tree
        // keeps the same dual parity for the whole run, and each common
        // dual step is an exact integer.
        for n in &mut self.nodes {
            n.pseudo_dual *= 2;
        }
        for e in &mut self.edges {
            e.pseudo_slack *= 2;
        }
        self.num_unmatched = 0;
        for v in 0..self.num_nodes {
            if self.nodes[v].match_edge.is_none() {
                self.nodes[v].node_type = NodeType::Plus;
                self.num_unmatched += 1;
            }
        }
        for e in 0..self.edges.len() {
            self.requeue_edge(EdgeIndex(e));
        }
        debug!(
            "initialized {} nodes, {} edges, {} unmatched after greedy bootstrap",
            self.num_nodes,
            self.edges.len(),
            self.num_unmatched
        );
        true
    }

    /// Applies Grow/Augment/Shrink/Expand until none is possible.
    pub(crate) fn primal_updates(&mut self) {
        loop {
            let mut progressed = false;
            while let Some(e) = self.primal_queue.pop() {
                let (t, h) = self.edge_tops(e);
                if t == h || self.slack(e) != 0 {
                    continue;
                }
                match (self.nodes[t.0].node_type, self.nodes[h.0].node_type) {
                    (NodeType::Plus, NodeType::Plus) => {
                        if self.nodes[t.0].root == self.nodes[h.0].root {
                            self.pending_shrinks.push(e);
                        } else {
                            self.augment(e);
                            progressed = true;
                        }
                    }
                    (NodeType::Plus, NodeType::Free) => {
                        self.grow(e, t, h);
                        progressed = true;
                    }
                    (NodeType::Free, NodeType::Plus) => {
                        self.grow(e, h, t);
                        progressed = true;
                    }
                    _ => {}
                }
            }
            while let Some(e) = self.pending_shrinks.pop() {
                let (t, h) = self.edge_tops(e);
                if t == h || self.slack(e) != 0 {
                    continue;
                }
                if self.nodes[t.0].node_type != NodeType::Plus
                    || self.nodes[h.0].node_type != NodeType::Plus
                {
                    continue;
                }
                self.shrink(e);
                progressed = true;
            }
            let mut expandable = Vec::new();
            for i in 0..self.nodes.len() {
                let n = &self.nodes[i];
                if !n.is_internal
                    && n.node_type == NodeType::Minus
                    && !n.blossom.is_empty()
                    && self.dual(NodeIndex(i)) == 0
                {
                    expandable.push(NodeIndex(i));
                }
            }
            for b in expandable {
                self.expand(b);
                progressed = true;
            }
            if !progressed && self.primal_queue.is_empty() && self.pending_shrinks.is_empty() {
                break;
            }
        }
        #[cfg(debug_assertions)]
        self.validate();
    }

    /// Largest dual change applicable to every tree at once without breaking
    /// dual feasibility. `None` when nothing bounds the change, i.e. the
    /// instance is infeasible while nodes remain unmatched.
    pub(crate) fn compute_max_common_tree_dual_delta(&self) -> Option<CostValue> {
        let mut best: Option<CostValue> = None;
        let mut consider = |d: CostValue| {
            best = Some(best.map_or(d, |b: CostValue| b.min(d)));
        };
        // [-] blossoms expand when their dual hits zero.
        for i in 0..self.nodes.len() {
            let n = &self.nodes[i];
            if !n.is_internal && n.node_type == NodeType::Minus && !n.blossom.is_empty() {
                consider(self.dual(NodeIndex(i)));
            }
        }
        // A [+]/[+] edge loses slack twice per unit of dual change.
        if let Some(e) = self.plus_plus_queue.top() {
            let s = self.slack(EdgeIndex(e));
            debug_assert_eq!(s % 2, 0);
            consider(s / 2);
        }
        if let Some(e) = self.plus_free_queue.top() {
            consider(self.slack(EdgeIndex(e)));
        }
        best
    }

    /// Applies the common dual change to every tree and queues the edges
    /// that became tight. Returns `false` when the accumulated change
    /// exceeds the overflow guard.
    pub(crate) fn update_all_trees(&mut self, delta: CostValue) -> bool {
        debug_assert!(delta > 0);
        match self.total_dual_delta.checked_add(delta) {
            Some(total) if total <= MAX_TOTAL_DUAL_DELTA => self.total_dual_delta = total,
            _ => return false,
        }
        for n in &mut self.nodes {
            // Unmatched external nodes are exactly the tree roots.
            if !n.is_internal && n.node_type == NodeType::Plus && n.match_edge.is_none() {
                n.tree_dual_delta += delta;
            }
        }
        debug!("applied common dual step {delta}");
        let mut tight = Vec::new();
        if let Some(e) = self.plus_plus_queue.top() {
            if self.slack(EdgeIndex(e)) == 0 {
                self.plus_plus_queue.all_top(&self.edges, &mut tight);
            }
        }
        if let Some(e) = self.plus_free_queue.top() {
            if self.slack(EdgeIndex(e)) == 0 {
                self.plus_free_queue.all_top(&self.edges, &mut tight);
            }
        }
        self.primal_queue.extend(tight.into_iter().map(EdgeIndex));
        true
    }

    /// Dissolves every remaining blossom once the matching is perfect,
    /// rematching each cycle around its base.
    pub(crate) fn expand_all_blossoms(&mut self) {
        let mut stack: Vec<NodeIndex> = (0..self.nodes.len())
            .map(NodeIndex)
            .filter(|&i| !self.nodes[i.0].is_internal && !self.nodes[i.0].blossom.is_empty())
            .collect();
        while let Some(b) = stack.pop() {
            let members = self.nodes[b.0].blossom.clone();
            let cycle_edges = self.nodes[b.0].blossom_edges.clone();
            let len = members.len();
            let match_edge = self.nodes[b.0].match_edge.unwrap();
            for &m in &members {
                for leaf in self.leaves(m) {
                    self.in_blossom[leaf.0] = m;
                }
            }
            let base = self.member_position(&members, match_edge);
            for &m in &members {
                let n = &mut self.nodes[m.0];
                n.node_type = NodeType::Free;
                n.is_internal = false;
                n.parent_edge = None;
                n.match_edge = None;
                n.root = m;
            }
            self.nodes[members[base].0].match_edge = Some(match_edge);
            let mut j = 1;
            while j < len {
                let a = members[(base + j) % len];
                let c = members[(base + j + 1) % len];
                let pair_edge = cycle_edges[(base + j) % len];
                self.nodes[a.0].match_edge = Some(pair_edge);
                self.nodes[c.0].match_edge = Some(pair_edge);
                j += 2;
            }
            for &m in &members {
                if !self.nodes[m.0].blossom.is_empty() {
                    stack.push(m);
                }
            }
            self.free_blossom(b);
        }
    }

    /// Mate of each original vertex. Only meaningful once the matching is
    /// perfect and all blossoms are expanded.
    pub(crate) fn mates(&self) -> Vec<usize> {
        (0..self.num_nodes)
            .map(|v| {
                let e = self.nodes[v].match_edge.unwrap();
                self.other_endpoint(e, NodeIndex(v)).0
            })
            .collect()
    }

    /// Checked sum of the matched edges' original costs.
    pub(crate) fn matched_cost(&self) -> Option<CostValue> {
        let mut total: CostValue = 0;
        for v in 0..self.num_nodes {
            let e = self.nodes[v].match_edge?;
            let w = self.other_endpoint(e, NodeIndex(v));
            if v < w.0 {
                total = total.checked_add(self.edges[e.0].cost)?;
            }
        }
        Some(total)
    }

    // ---- primal operations ----

    /// Attaches a matched free pair to a tree through the tight edge `e`
    /// between `plus` and `free`. `free` becomes [-], its mate [+].
    fn grow(&mut self, e: EdgeIndex, plus: NodeIndex, free: NodeIndex) {
        debug_assert_eq!(self.slack(e), 0);
        debug_assert_eq!(self.nodes[free.0].node_type, NodeType::Free);
        let match_edge = self.nodes[free.0].match_edge.unwrap();
        let mate = self.other_top(match_edge, free);
        let root = self.nodes[plus.0].root;
        let delta = self.tree_delta(root);

        let mut touched = Vec::new();
        self.detach_boundary_edges(free, -delta, &mut touched);
        self.detach_boundary_edges(mate, delta, &mut touched);
        {
            let n = &mut self.nodes[free.0];
            n.node_type = NodeType::Minus;
            n.root = root;
            n.parent_edge = Some(e);
            n.pseudo_dual += delta;
        }
        {
            let n = &mut self.nodes[mate.0];
            n.node_type = NodeType::Plus;
            n.root = root;
            n.parent_edge = Some(match_edge);
            n.pseudo_dual -= delta;
        }
        for ei in touched {
            self.requeue_edge(ei);
        }
    }

    /// Flips the matching along the two root paths joined by the tight edge
    /// `e` and dissolves both trees; all their nodes become matched and free.
    fn augment(&mut self, e: EdgeIndex) {
        let (u, v) = self.edge_tops(e);
        let r1 = self.nodes[u.0].root;
        let r2 = self.nodes[v.0].root;
        debug_assert_ne!(r1, r2);
        debug_assert_eq!(self.slack(e), 0);
        self.flip_path(u, e);
        self.flip_path(v, e);

        let mut dissolved = Vec::new();
        for i in 0..self.nodes.len() {
            let n = &self.nodes[i];
            if n.is_internal || n.node_type == NodeType::Free {
                continue;
            }
            if n.root == r1 || n.root == r2 {
                dissolved.push(NodeIndex(i));
            }
        }
        let offs: Vec<CostValue> = dissolved.iter().map(|&x| self.offset(x)).collect();
        let mut touched = Vec::new();
        for (i, &x) in dissolved.iter().enumerate() {
            self.detach_boundary_edges(x, -offs[i], &mut touched);
        }
        for (i, &x) in dissolved.iter().enumerate() {
            let n = &mut self.nodes[x.0];
            n.pseudo_dual += offs[i];
            n.node_type = NodeType::Free;
            n.parent_edge = None;
            n.root = x;
            n.tree_dual_delta = 0;
        }
        for ei in touched {
            self.requeue_edge(ei);
        }
        self.num_unmatched -= 2;
        debug!("augmented, {} nodes still unmatched", self.num_unmatched);
    }

    /// Rematches the alternating root path starting at the [+] node `start`,
    /// which becomes matched through `via`.
    fn flip_path(&mut self, start: NodeIndex, via: EdgeIndex) {
        let mut node = start;
        let mut via = via;
        loop {
            let parent = self.nodes[node.0].parent_edge;
            self.nodes[node.0].match_edge = Some(via);
            let Some(parent_edge) = parent else {
                break;
            };
            let minus = self.other_top(parent_edge, node);
            let up = self.nodes[minus.0].parent_edge.unwrap();
            self.nodes[minus.0].match_edge = Some(up);
            node = self.other_top(up, minus);
            via = up;
        }
    }

    /// Contracts the odd cycle closed by the tight [+]/[+] edge `e` into a
    /// fresh blossom pseudo-node, freezing the members' state.
    fn shrink(&mut self, e: EdgeIndex) {
        let (u, v) = self.edge_tops(e);
        let root = self.nodes[u.0].root;
        debug_assert_ne!(u, v);
        debug_assert_eq!(self.nodes[v.0].root, root);
        debug_assert_eq!(self.slack(e), 0);
        let delta = self.tree_delta(root);

        let path_u = self.path_to_root(u);
        let path_v = self.path_to_root(v);
        let on_u: FxHashSet<NodeIndex> = path_u.iter().copied().collect();
        let lca = path_v.iter().copied().find(|x| on_u.contains(x)).unwrap();
        let iu = path_u.iter().position(|&x| x == lca).unwrap();
        let iv = path_v.iter().position(|&x| x == lca).unwrap();

        // Cycle in order: lca, down to u, across e to v, back up to lca.
        let mut members = vec![lca];
        let mut cycle_edges = Vec::with_capacity(iu + iv + 1);
        for k in (0..iu).rev() {
            members.push(path_u[k]);
            cycle_edges.push(self.nodes[path_u[k].0].parent_edge.unwrap());
        }
        cycle_edges.push(e);
        for k in 0..iv {
            members.push(path_v[k]);
            cycle_edges.push(self.nodes[path_v[k].0].parent_edge.unwrap());
        }
        debug_assert_eq!(members.len() % 2, 1);
        debug_assert!(members.len() >= 3);
        debug_assert_eq!(cycle_edges.len(), members.len());
        debug_assert_eq!(self.nodes[lca.0].node_type, NodeType::Plus);

        let member_set: FxHashSet<NodeIndex> = members.iter().copied().collect();
        let offs: Vec<CostValue> = members.iter().map(|&m| self.offset(m)).collect();
        let b = self.alloc_blossom();
        let lca_was_root = lca == root;

        // Patch incident pseudo-slacks while the old ownership is intact.
        // Edges between two members freeze at their raw true slack; edges
        // leaving the cycle switch to the new [+] pseudo-node's offset.
        let mut touched = Vec::new();
        for (i, &m) in members.iter().enumerate() {
            let off_old = offs[i];
            for leaf in self.leaves(m) {
                let incident = self.adjacency[leaf.0].clone();
                for ei in incident {
                    let other = self.other_endpoint(ei, leaf);
                    let other_top = self.in_blossom[other.0];
                    if other_top == m {
                        continue;
                    }
                    self.dequeue_edge(ei);
                    if member_set.contains(&other_top) {
                        self.edges[ei.0].pseudo_slack -= off_old;
                    } else {
                        self.edges[ei.0].pseudo_slack += delta - off_old;
                        touched.push(ei);
                    }
                }
            }
        }
        for (i, &m) in members.iter().enumerate() {
            let n = &mut self.nodes[m.0];
            n.pseudo_dual += offs[i];
            n.is_internal = true;
        }
        for &m in &members {
            for leaf in self.leaves(m) {
                self.in_blossom[leaf.0] = b;
            }
        }

        let lca_parent = self.nodes[lca.0].parent_edge.take();
        let lca_match = self.nodes[lca.0].match_edge.take();
        let lca_delta = self.nodes[lca.0].tree_dual_delta;
        {
            let n = &mut self.nodes[b.0];
            n.node_type = NodeType::Plus;
            n.is_internal = false;
            n.parent_edge = lca_parent;
            n.match_edge = lca_match;
            n.pseudo_dual = -delta;
            n.root = if lca_was_root { b } else { root };
            n.tree_dual_delta = if lca_was_root { lca_delta } else { 0 };
            n.blossom = members;
            n.blossom_edges = cycle_edges;
        }
        if lca_was_root {
            for i in 0..self.nodes.len() {
                if !self.nodes[i].is_internal && self.nodes[i].root == lca {
                    self.nodes[i].root = b;
                }
            }
        }
        for ei in touched {
            self.requeue_edge(ei);
        }
        debug!("shrank a {}-cycle into pseudo-node {}", self.nodes[b.0].blossom.len(), b.0);
    }

    /// Dissolves the [-] blossom `b` whose true dual reached zero. The even
    /// alternating path between its tree attachments stays in the tree; the
    /// remaining members pair up as matched free nodes.
    fn expand(&mut self, b: NodeIndex) {
        let members = self.nodes[b.0].blossom.clone();
        let cycle_edges = self.nodes[b.0].blossom_edges.clone();
        let len = members.len();
        let root = self.nodes[b.0].root;
        let delta = self.tree_delta(root);
        debug_assert_eq!(self.nodes[b.0].node_type, NodeType::Minus);
        debug_assert_eq!(self.dual(b), 0);
        let parent_edge = self.nodes[b.0].parent_edge.unwrap();
        let match_edge = self.nodes[b.0].match_edge.unwrap();

        for &m in &members {
            for leaf in self.leaves(m) {
                self.in_blossom[leaf.0] = m;
            }
        }
        let entry = self.member_position(&members, parent_edge);
        let base = self.member_position(&members, match_edge);

        // Walk the cycle from the entry to the base in the direction that
        // uses an even number of cycle edges, so tree types can alternate.
        let forward_len = (base + len - entry) % len;
        let (forward, dist) = if forward_len % 2 == 0 {
            (true, forward_len)
        } else {
            (false, len - forward_len)
        };
        let at = |j: usize| -> usize {
            if forward {
                (entry + j) % len
            } else {
                (entry + len - j) % len
            }
        };
        let step_edge = |j: usize| -> EdgeIndex {
            if forward {
                cycle_edges[at(j)]
            } else {
                cycle_edges[at(j + 1)]
            }
        };

        // Plan each member's new state along the walk before applying it.
        let mut plan: Vec<(NodeType, Option<EdgeIndex>, Option<EdgeIndex>)> =
            Vec::with_capacity(len);
        for j in 0..=dist {
            let node_type = if j % 2 == 0 { NodeType::Minus } else { NodeType::Plus };
            let new_parent = if j == 0 { parent_edge } else { step_edge(j - 1) };
            let new_match = if j == dist {
                match_edge
            } else if j % 2 == 0 {
                step_edge(j)
            } else {
                step_edge(j - 1)
            };
            plan.push((node_type, Some(new_parent), Some(new_match)));
        }
        let mut j = dist + 1;
        while j < len {
            let pair_edge = Some(step_edge(j));
            plan.push((NodeType::Free, None, pair_edge));
            plan.push((NodeType::Free, None, pair_edge));
            j += 2;
        }

        let mut member_offset: FxHashMap<NodeIndex, CostValue> = FxHashMap::default();
        for (j, &(node_type, new_parent, new_match)) in plan.iter().enumerate() {
            let m = members[at(j)];
            let off = match node_type {
                NodeType::Plus => delta,
                NodeType::Minus => -delta,
                NodeType::Free => 0,
            };
            member_offset.insert(m, off);
            let n = &mut self.nodes[m.0];
            n.node_type = node_type;
            n.is_internal = false;
            n.parent_edge = new_parent;
            n.match_edge = new_match;
            n.pseudo_dual -= off;
            if node_type == NodeType::Free {
                n.root = m;
                n.tree_dual_delta = 0;
            } else {
                n.root = root;
            }
        }

        // Un-freeze incident pseudo-slacks. Cycle edges between two members
        // leave the raw representation, one side at a time; boundary edges
        // swap the old [-] pseudo-node's offset for the member's own.
        let member_set: FxHashSet<NodeIndex> = members.iter().copied().collect();
        let blossom_offset = -delta;
        let mut touched = Vec::new();
        for &m in &members {
            let off_new = member_offset[&m];
            for leaf in self.leaves(m) {
                let incident = self.adjacency[leaf.0].clone();
                for ei in incident {
                    let other = self.other_endpoint(ei, leaf);
                    let other_top = self.in_blossom[other.0];
                    if other_top == m {
                        continue;
                    }
                    if member_set.contains(&other_top) {
                        self.edges[ei.0].pseudo_slack += off_new;
                    } else {
                        self.edges[ei.0].pseudo_slack += off_new - blossom_offset;
                    }
                    touched.push(ei);
                }
            }
        }
        self.free_blossom(b);
        for ei in touched {
            self.requeue_edge(ei);
        }
        debug!("expanded pseudo-node {}", b.0);
    }

    // ---- helpers ----

    fn other_endpoint(&self, e: EdgeIndex, v: NodeIndex) -> NodeIndex {
        let edge = &self.edges[e.0];
        if edge.tail == v {
            edge.head
        } else {
            edge.tail
        }
    }

    fn edge_tops(&self, e: EdgeIndex) -> (NodeIndex, NodeIndex) {
        let edge = &self.edges[e.0];
        (self.in_blossom[edge.tail.0], self.in_blossom[edge.head.0])
    }

    fn other_top(&self, e: EdgeIndex, top: NodeIndex) -> NodeIndex {
        let (t, h) = self.edge_tops(e);
        if t == top {
            h
        } else {
            t
        }
    }

    fn tree_delta(&self, root: NodeIndex) -> CostValue {
        self.nodes[root.0].tree_dual_delta
    }

    /// Lazy dual share of an external node.
    fn offset(&self, x: NodeIndex) -> CostValue {
        let n = &self.nodes[x.0];
        match n.node_type {
            NodeType::Plus => self.tree_delta(n.root),
            NodeType::Minus => -self.tree_delta(n.root),
            NodeType::Free => 0,
        }
    }

    fn dual(&self, x: NodeIndex) -> CostValue {
        self.nodes[x.0].pseudo_dual + self.offset(x)
    }

    fn slack(&self, e: EdgeIndex) -> CostValue {
        let (t, h) = self.edge_tops(e);
        let edge = &self.edges[e.0];
        if t == h {
            return edge.pseudo_slack;
        }
        edge.pseudo_slack - self.offset(t) - self.offset(h)
    }

    /// Original vertices contained in the external node `x`, gathered with
    /// an explicit worklist so nesting depth never hits the call stack.
    fn leaves(&self, x: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut stack = vec![x];
        while let Some(y) = stack.pop() {
            let n = &self.nodes[y.0];
            if n.blossom.is_empty() {
                out.push(y);
            } else {
                stack.extend(n.blossom.iter().copied());
            }
        }
        out
    }

    /// Position in `members` of the member containing an endpoint of `e`.
    /// `in_blossom` must already point at the members.
    fn member_position(&self, members: &[NodeIndex], e: EdgeIndex) -> usize {
        let (t, h) = self.edge_tops(e);
        members.iter().position(|&m| m == t || m == h).unwrap()
    }

    /// Applies `adjust` to the pseudo-slack of every edge leaving the
    /// external node `top`, pulls each out of the tight-edge queues and
    /// collects it for requeueing under its next category.
    fn detach_boundary_edges(
        &mut self,
        top: NodeIndex,
        adjust: CostValue,
        touched: &mut Vec<EdgeIndex>,
    ) {
        for leaf in self.leaves(top) {
            let incident = self.adjacency[leaf.0].clone();
            for e in incident {
                let other = self.other_endpoint(e, leaf);
                if self.in_blossom[other.0] == top {
                    continue;
                }
                self.edges[e.0].pseudo_slack += adjust;
                self.dequeue_edge(e);
                touched.push(e);
            }
        }
    }

    /// Inserts `e` into the queue matching its endpoint types, if any, and
    /// flags it for a primal operation when already tight. Only [+]/[+] and
    /// [+]/free edges constrain the dual step; every other category has
    /// constant or growing slack.
    fn requeue_edge(&mut self, e: EdgeIndex) {
        let (t, h) = self.edge_tops(e);
        if t == h {
            return;
        }
        if self.plus_plus_queue.contains(&self.edges, e.0)
            || self.plus_free_queue.contains(&self.edges, e.0)
        {
            return;
        }
        match (self.nodes[t.0].node_type, self.nodes[h.0].node_type) {
            (NodeType::Plus, NodeType::Plus) => self.plus_plus_queue.add(&mut self.edges, e.0),
            (NodeType::Plus, NodeType::Free) | (NodeType::Free, NodeType::Plus) => {
                self.plus_free_queue.add(&mut self.edges, e.0)
            }
            _ => return,
        }
        if self.slack(e) == 0 {
            self.primal_queue.push(e);
        }
    }

    fn dequeue_edge(&mut self, e: EdgeIndex) {
        if self.plus_plus_queue.contains(&self.edges, e.0) {
            self.plus_plus_queue.remove(&mut self.edges, e.0);
        } else if self.plus_free_queue.contains(&self.edges, e.0) {
            self.plus_free_queue.remove(&mut self.edges, e.0);
        }
    }

    fn path_to_root(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![start];
        let mut x = start;
        while let Some(e) = self.nodes[x.0].parent_edge {
            x = self.other_top(e, x);
            path.push(x);
        }
        path
    }

    fn alloc_blossom(&mut self) -> NodeIndex {
        if let Some(b) = self.unused_blossoms.pop() {
            b
        } else {
            let b = NodeIndex(self.nodes.len());
            self.nodes.push(Node::new(b));
            b
        }
    }

    fn free_blossom(&mut self, b: NodeIndex) {
        let n = &mut self.nodes[b.0];
        n.node_type = NodeType::Free;
        n.is_internal = false;
        n.parent_edge = None;
        n.match_edge = None;
        n.root = b;
        n.pseudo_dual = 0;
        n.tree_dual_delta = 0;
        n.blossom.clear();
        n.blossom_edges.clear();
        self.unused_blossoms.push(b);
    }

    #[cfg(debug_assertions)]
    fn is_live(&self, i: usize) -> bool {
        i < self.num_nodes || !self.nodes[i].blossom.is_empty()
    }

    /// Recomputes true duals and slacks from the lazy representation and
    /// asserts dual feasibility and the structural invariants.
    #[cfg(debug_assertions)]
    fn validate(&self) {
        for i in 0..self.edges.len() {
            let e = EdgeIndex(i);
            let (t, h) = self.edge_tops(e);
            if t == h {
                continue;
            }
            assert!(self.slack(e) >= 0, "negative slack on edge {i}");
        }
        for i in 0..self.nodes.len() {
            let n = &self.nodes[i];
            if n.is_internal || !self.is_live(i) {
                continue;
            }
            if !n.blossom.is_empty() {
                assert!(n.blossom.len() >= 3 && n.blossom.len() % 2 == 1);
                assert!(self.dual(NodeIndex(i)) >= 0, "negative blossom dual on {i}");
            }
            match n.match_edge {
                None => {
                    assert_eq!(n.node_type, NodeType::Plus);
                    assert_eq!(n.root, NodeIndex(i));
                    assert!(n.parent_edge.is_none());
                }
                Some(me) => {
                    let (t, h) = self.edge_tops(me);
                    assert!(t == NodeIndex(i) || h == NodeIndex(i));
                    assert_eq!(self.slack(me), 0, "matched edge {} not tight", me.0);
                }
            }
            if n.node_type == NodeType::Minus {
                assert!(n.parent_edge.is_some() && n.match_edge.is_some());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_vertex_fails_initialization() {
        let mut g = BlossomGraph::new(4);
        g.add_edge(0, 1, 3);
        g.add_edge(1, 2, 4);
        assert!(!g.initialize());
    }

    #[test]
    fn greedy_bootstrap_matches_a_single_edge() {
        let mut g = BlossomGraph::new(2);
        g.add_edge(0, 1, 7);
        assert!(g.initialize());
        assert_eq!(g.num_unmatched(), 0);
        assert_eq!(g.mates(), vec![1, 0]);
        assert_eq!(g.matched_cost(), Some(7));
    }

    #[test]
    fn initialization_keeps_slacks_nonnegative_and_duals_even() {
        let mut g = BlossomGraph::new(4);
        g.add_edge(0, 1, 5);
        g.add_edge(1, 2, 3);
        g.add_edge(2, 3, 9);
        g.add_edge(3, 0, 2);
        assert!(g.initialize());
        for i in 0..g.edges.len() {
            assert!(g.slack(EdgeIndex(i)) >= 0);
        }
        for v in 0..4 {
            assert_eq!(g.nodes[v].pseudo_dual % 2, 0);
        }
    }

    #[test]
    fn path_graph_augments_to_a_perfect_matching() {
        // The greedy bootstrap matches the free middle edge, so the trees
        // rooted at 0 and 3 must grow through it and augment.
        let mut g = BlossomGraph::new(4);
        g.add_edge(0, 1, 1);
        g.add_edge(1, 2, 0);
        g.add_edge(2, 3, 1);
        assert!(g.initialize());
        while g.num_unmatched() > 0 {
            g.primal_updates();
            if g.num_unmatched() == 0 {
                break;
            }
            let delta = g.compute_max_common_tree_dual_delta().unwrap();
            assert!(delta > 0);
            assert!(g.update_all_trees(delta));
        }
        g.expand_all_blossoms();
        assert_eq!(g.mates(), vec![1, 0, 3, 2]);
        assert_eq!(g.matched_cost(), Some(2));
    }

    #[test]
    fn odd_cycle_shrinks_and_matching_completes() {
        // Cheap triangle 0-1-2 with an expensive pendant edge. The greedy
        // bootstrap matches inside the triangle, the leftover triangle node
        // and the pendant grow trees, the triangle contracts into a blossom
        // and the final augmentation runs through the pseudo-node.
        let mut g = BlossomGraph::new(4);
        g.add_edge(0, 1, 2);
        g.add_edge(1, 2, 2);
        g.add_edge(0, 2, 2);
        g.add_edge(2, 3, 100);
        assert!(g.initialize());
        loop {
            g.primal_updates();
            if g.num_unmatched() == 0 {
                break;
            }
            let delta = g.compute_max_common_tree_dual_delta().unwrap();
            assert!(delta > 0);
            assert!(g.update_all_trees(delta));
        }
        g.expand_all_blossoms();
        let mates = g.mates();
        assert_eq!(mates[3], 2);
        assert_eq!(mates[2], 3);
        assert_eq!(mates[0], 1);
        assert_eq!(g.matched_cost(), Some(102));
    }

    #[test]
    fn minus_blossom_expands_when_its_dual_runs_out() {
        // The cheap triangle contracts and gets matched through 0-4 early
        // on. The tree rooted at 3 then adopts the pseudo-node as a [-]
        // child, the dual steps drain its dual to zero and it has to open
        // up again before the last augmentation can reach 5.
        let mut g = BlossomGraph::new(6);
        g.add_edge(0, 1, 2);
        g.add_edge(1, 2, 2);
        g.add_edge(0, 2, 2);
        g.add_edge(2, 3, 6);
        g.add_edge(0, 4, 4);
        g.add_edge(4, 5, 30);
        assert!(g.initialize());
        loop {
            g.primal_updates();
            if g.num_unmatched() == 0 {
                break;
            }
            let delta = g.compute_max_common_tree_dual_delta().unwrap();
            assert!(delta > 0);
            assert!(g.update_all_trees(delta));
        }
        // One pseudo-node was allocated and dissolved again mid-run, so the
        // slot is back in the pool and nothing is left to unwind.
        assert_eq!(g.nodes.len(), 7);
        assert_eq!(g.unused_blossoms, vec![NodeIndex(6)]);
        assert!(g.nodes.iter().all(|n| n.blossom.is_empty()));
        g.expand_all_blossoms();
        assert_eq!(g.mates(), vec![1, 0, 3, 2, 5, 4]);
        assert_eq!(g.matched_cost(), Some(38));
    }

    #[test]
    fn nested_blossoms_form_and_the_outer_expands_mid_run() {
        // Triangle 0-1-2 contracts first; the 0-4 edge then closes a second
        // odd cycle over the pseudo-node, 3 and 4. The outer blossom gets
        // matched to 5, turns [-] in the tree rooted at 6 and expands when
        // its dual runs out, while the inner one stays contracted until the
        // final unwinding.
        let mut g = BlossomGraph::new(8);
        g.add_edge(0, 1, 2);
        g.add_edge(1, 2, 2);
        g.add_edge(0, 2, 2);
        g.add_edge(2, 3, 4);
        g.add_edge(3, 4, 2);
        g.add_edge(0, 4, 5);
        g.add_edge(3, 5, 8);
        g.add_edge(4, 6, 11);
        g.add_edge(6, 7, 30);
        g.add_edge(5, 7, 24);
        assert!(g.initialize());
        loop {
            g.primal_updates();
            if g.num_unmatched() == 0 {
                break;
            }
            let delta = g.compute_max_common_tree_dual_delta().unwrap();
            assert!(delta > 0);
            assert!(g.update_all_trees(delta));
        }
        // Two pseudo-nodes were allocated; the outer one was dissolved
        // mid-run and only the inner one survives to the unwinding.
        assert_eq!(g.nodes.len(), 10);
        assert_eq!(g.unused_blossoms, vec![NodeIndex(9)]);
        let remaining: Vec<usize> = (0..g.nodes.len())
            .filter(|&i| !g.nodes[i].is_internal && !g.nodes[i].blossom.is_empty())
            .collect();
        assert_eq!(remaining, vec![8]);
        g.expand_all_blossoms();
        assert_eq!(g.mates(), vec![1, 0, 3, 2, 6, 7, 4, 5]);
        assert_eq!(g.matched_cost(), Some(41));
    }
}
