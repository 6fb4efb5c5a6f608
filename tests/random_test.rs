use mcmatching::{MinCostPerfectMatching, Status};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Exhaustive pairing enumeration; `None` when no perfect matching exists.
fn brute_force_min_cost(num_nodes: usize, edges: &[(usize, usize, i64)]) -> Option<i64> {
    let mut cost = vec![vec![None; num_nodes]; num_nodes];
    for &(t, h, c) in edges {
        let best = cost[t][h].map_or(c, |old: i64| old.min(c));
        cost[t][h] = Some(best);
        cost[h][t] = Some(best);
    }
    let mut used = vec![false; num_nodes];
    search(&cost, &mut used)
}

fn search(cost: &[Vec<Option<i64>>], used: &mut [bool]) -> Option<i64> {
    let Some(v) = used.iter().position(|&u| !u) else {
        return Some(0);
    };
    used[v] = true;
    let mut best = None;
    for w in v + 1..used.len() {
        if used[w] {
            continue;
        }
        if let Some(c) = cost[v][w] {
            used[w] = true;
            if let Some(rest) = search(cost, used) {
                let total = c + rest;
                best = Some(best.map_or(total, |b: i64| b.min(total)));
            }
            used[w] = false;
        }
    }
    used[v] = false;
    best
}

fn assert_valid_matching(m: &MinCostPerfectMatching) {
    let mates = m.matches();
    for v in 0..mates.len() {
        assert_ne!(mates[v], v);
        assert_eq!(mates[mates[v]], v);
    }
}

#[test]
fn random_complete_graphs_match_brute_force() {
    init_logging();
    for num_nodes in [2usize, 4, 6, 8, 10] {
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(1000 * num_nodes as u64 + seed);
            let mut edges = Vec::new();
            for t in 0..num_nodes {
                for h in t + 1..num_nodes {
                    edges.push((t, h, rng.gen_range(0..=50i64)));
                }
            }
            let expected = brute_force_min_cost(num_nodes, &edges);
            let mut m = MinCostPerfectMatching::new(num_nodes);
            for &(t, h, c) in &edges {
                m.add_edge_with_cost(t, h, c).unwrap();
            }
            assert_eq!(m.solve(), Status::Optimal, "n={num_nodes} seed={seed}");
            assert_valid_matching(&m);
            assert_eq!(
                Some(m.optimal_cost()),
                expected,
                "n={num_nodes} seed={seed}"
            );
        }
    }
}

#[test]
fn random_sparse_graphs_match_brute_force() {
    init_logging();
    for num_nodes in [4usize, 6, 8, 10] {
        for seed in 0..30u64 {
            let mut rng = StdRng::seed_from_u64(7000 * num_nodes as u64 + seed);
            let mut edges = Vec::new();
            for t in 0..num_nodes {
                for h in t + 1..num_nodes {
                    if rng.gen_bool(0.5) {
                        edges.push((t, h, rng.gen_range(0..=20i64)));
                    }
                }
            }
            let expected = brute_force_min_cost(num_nodes, &edges);
            let mut m = MinCostPerfectMatching::new(num_nodes);
            for &(t, h, c) in &edges {
                m.add_edge_with_cost(t, h, c).unwrap();
            }
            let status = m.solve();
            match expected {
                Some(cost) => {
                    assert_eq!(status, Status::Optimal, "n={num_nodes} seed={seed}");
                    assert_valid_matching(&m);
                    assert_eq!(m.optimal_cost(), cost, "n={num_nodes} seed={seed}");
                }
                None => {
                    assert_eq!(status, Status::Infeasible, "n={num_nodes} seed={seed}");
                }
            }
        }
    }
}

#[test]
fn random_zero_cost_graphs_exercise_blossoms() {
    // Many tight edges at once drive the greedy bootstrap into corners that
    // only shrinking and expanding can get out of.
    init_logging();
    for num_nodes in [6usize, 8, 10] {
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(33 * num_nodes as u64 + seed);
            let mut edges = Vec::new();
            for t in 0..num_nodes {
                for h in t + 1..num_nodes {
                    if rng.gen_bool(0.6) {
                        edges.push((t, h, rng.gen_range(0..=1i64)));
                    }
                }
            }
            let expected = brute_force_min_cost(num_nodes, &edges);
            let mut m = MinCostPerfectMatching::new(num_nodes);
            for &(t, h, c) in &edges {
                m.add_edge_with_cost(t, h, c).unwrap();
            }
            let status = m.solve();
            match expected {
                Some(cost) => {
                    assert_eq!(status, Status::Optimal, "n={num_nodes} seed={seed}");
                    assert_valid_matching(&m);
                    assert_eq!(m.optimal_cost(), cost, "n={num_nodes} seed={seed}");
                }
                None => {
                    assert_eq!(status, Status::Infeasible, "n={num_nodes} seed={seed}");
                }
            }
        }
    }
}
