// Copyright (C) 2025 PSO Unit, Fondazione Bruno Kessler
// This file is part of H2Lite.
//
// H2Lite is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// H2Lite is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.
//

use rusth2::heuristics::{HMaxHeuristic, HTwoHeuristic, DEAD_END};
use rusth2::pi_two::PiTwoTask;
use rusth2::task::{Operator, Task};

fn task(
    domain_sizes: Vec<i32>,
    operators: Vec<Operator>,
    initial_state: Vec<i32>,
    goals: &[(i32, i32)],
) -> Task {
    Task::new(domain_sizes, operators, initial_state, goals, false, false).unwrap()
}

#[test]
fn trivial_goal() {
    let t = task(
        vec![2],
        vec![Operator::new("noop", &[(0, 1)], &[(0, 1)], 1)],
        vec![1],
        &[(0, 1)],
    );
    let h = HTwoHeuristic::forward(&t, false);
    assert_eq!(h.compute(&[1]), 0);
}

#[test]
fn single_operator() {
    let t = task(
        vec![2, 2],
        vec![Operator::new("a", &[], &[(0, 1)], 5)],
        vec![0, 0],
        &[(0, 1)],
    );
    let h = HTwoHeuristic::forward(&t, false);
    assert_eq!(h.compute(&[0, 0]), 5);
}

#[test]
fn pairwise_synergy() {
    let t = task(
        vec![2, 2, 2],
        vec![
            Operator::new("a", &[], &[(0, 1)], 3),
            Operator::new("b", &[], &[(1, 1)], 4),
        ],
        vec![0, 0, 0],
        &[(0, 1), (1, 1)],
    );
    let h = HTwoHeuristic::forward(&t, false);
    // the joint pair needs both operators, and the goal evaluation maximizes
    // over all pair subsets of the goal tuple
    assert_eq!(h.compute(&[0, 0, 0]), 7);
}

#[test]
fn dead_end() {
    let t = task(
        vec![3],
        vec![Operator::new("raise", &[(0, 0)], &[(0, 1)], 1)],
        vec![0],
        &[(0, 2)],
    );
    let h = HTwoHeuristic::forward(&t, false);
    assert_eq!(h.compute(&[0]), DEAD_END);
}

#[test]
fn chained_preconditions() {
    let t = task(
        vec![2, 2],
        vec![
            Operator::new("a", &[], &[(0, 1)], 2),
            Operator::new("b", &[(0, 1)], &[(1, 1)], 3),
        ],
        vec![0, 0],
        &[(1, 1)],
    );
    let h = HTwoHeuristic::forward(&t, false);
    assert_eq!(h.compute(&[0, 0]), 5);
}

#[test]
fn pi_two_compile_round_trip() {
    let t = task(
        vec![2, 2, 2],
        vec![
            Operator::new("a", &[], &[(0, 1)], 3),
            Operator::new("b", &[], &[(1, 1)], 4),
        ],
        vec![0, 0, 0],
        &[(0, 1), (1, 1)],
    );
    let h2 = HTwoHeuristic::forward(&t, false);
    let pi = PiTwoTask::compile(&t).unwrap();
    let h1 = HMaxHeuristic::new(pi.compiled(), false);

    let mut translated = vec![0, 0, 0];
    pi.convert_state_values_from_parent(&mut translated);
    assert_eq!(h1.compute(&translated), h2.compute(&[0, 0, 0]));
    assert_eq!(h1.compute(&translated), 7);
}

#[test]
fn goal_dominance() {
    let t = task(
        vec![2, 2],
        vec![Operator::new("a", &[], &[(0, 1)], 5)],
        vec![0, 0],
        &[(0, 1)],
    );
    for h in [
        HTwoHeuristic::forward(&t, false),
        HTwoHeuristic::backward(&t, false),
    ] {
        assert_eq!(h.compute(&[1, 0]), 0);
        assert_eq!(h.compute(&[1, 1]), 0);
    }
}

#[test]
fn dual_variants_of_the_scenarios() {
    let single = task(
        vec![2, 2],
        vec![Operator::new("a", &[], &[(0, 1)], 5)],
        vec![0, 0],
        &[(0, 1)],
    );
    assert_eq!(HTwoHeuristic::backward(&single, false).compute(&[0, 0]), 5);

    let chain = task(
        vec![2, 2],
        vec![
            Operator::new("a", &[], &[(0, 1)], 2),
            Operator::new("b", &[(0, 1)], &[(1, 1)], 3),
        ],
        vec![0, 0],
        &[(1, 1)],
    );
    assert_eq!(HTwoHeuristic::backward(&chain, false).compute(&[0, 0]), 5);

    let dead = task(
        vec![3],
        vec![Operator::new("raise", &[(0, 0)], &[(0, 1)], 1)],
        vec![0],
        &[(0, 2)],
    );
    assert_eq!(
        HTwoHeuristic::backward(&dead, false).compute(&[0]),
        DEAD_END
    );
}
