// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT
//! Subset Proposal Strategies
//!
//! A strategy decides which candidate subsets get scored. It never scores
//! anything itself: every batch goes through `score_batch`, so correctness of
//! the selected set does not depend on how subsets were proposed.

use super::scoring::{compare_scores, score_batch, select_best, ScoringContext, SubsetOutcome, SubsetScore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Admissible scores in proposal order plus bookkeeping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchOutcome {
    pub scores: Vec<SubsetScore>,
    pub evaluated: usize,
    pub rejected: usize,
}

impl SearchOutcome {
    fn absorb(&mut self, outcomes: Vec<SubsetOutcome>, sizes: &RangeInclusive<usize>) -> Vec<SubsetScore> {
        let mut admitted = Vec::new();
        for outcome in outcomes {
            self.evaluated += 1;
            match outcome {
                SubsetOutcome::Scored(score) => admitted.push(score),
                SubsetOutcome::Rejected { .. } => self.rejected += 1,
            }
        }
        self.scores.extend(
            admitted
                .iter()
                .filter(|s| sizes.contains(&s.indices.len()))
                .cloned(),
        );
        admitted
    }
}

pub trait SubsetSearch {
    fn name(&self) -> &'static str;

    fn search(&self, ctx: &ScoringContext, sizes: RangeInclusive<usize>) -> SearchOutcome;
}

/// n choose k, saturating.
pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
        if acc > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    acc as u64
}

/// Total subsets over a size range, saturating.
pub fn combination_count(n: usize, sizes: &RangeInclusive<usize>) -> u64 {
    sizes
        .clone()
        .fold(0u64, |acc, k| acc.saturating_add(binomial(n, k)))
}

/// All k-combinations of 0..n in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k == 0 || k > n {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        // rightmost position that can still advance
        let Some(i) = (0..k).rev().find(|&i| idx[i] < n - k + i) else {
            return out;
        };
        idx[i] += 1;
        for j in i + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

// ============================================================================
// EXHAUSTIVE
// ============================================================================

#[derive(Clone, Copy, Debug, Default)]
pub struct ExhaustiveSearch;

impl SubsetSearch for ExhaustiveSearch {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    fn search(&self, ctx: &ScoringContext, sizes: RangeInclusive<usize>) -> SearchOutcome {
        let n = ctx.candidate_count();
        let subsets: Vec<Vec<usize>> = sizes.clone().flat_map(|k| combinations(n, k)).collect();
        let mut outcome = SearchOutcome::default();
        outcome.absorb(score_batch(ctx, &subsets), &sizes);
        outcome
    }
}

// ============================================================================
// GREEDY FORWARD SELECTION
// ============================================================================

/// Grow one subset a member at a time, keeping the best extension per size.
#[derive(Clone, Copy, Debug)]
pub struct GreedySearch {
    pub tie_epsilon: f64,
}

impl SubsetSearch for GreedySearch {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn search(&self, ctx: &ScoringContext, sizes: RangeInclusive<usize>) -> SearchOutcome {
        let n = ctx.candidate_count();
        let mut outcome = SearchOutcome::default();
        let mut current: Vec<usize> = Vec::new();

        while current.len() < *sizes.end() {
            let proposals: Vec<Vec<usize>> = (0..n)
                .filter(|i| !current.contains(i))
                .map(|i| {
                    let mut next = current.clone();
                    next.push(i);
                    next.sort_unstable();
                    next
                })
                .collect();
            if proposals.is_empty() {
                break;
            }
            let admitted = outcome.absorb(score_batch(ctx, &proposals), &sizes);
            match admitted
                .iter()
                .min_by(|a, b| compare_scores(a, b, self.tie_epsilon))
            {
                Some(best) => current = best.indices.clone(),
                None => break,
            }
        }
        outcome
    }
}

// ============================================================================
// MONTE CARLO
// ============================================================================

/// Random subsets from a seeded generator. Same seed, same proposals.
#[derive(Clone, Copy, Debug)]
pub struct MonteCarloSearch {
    pub iterations: usize,
    pub seed: u64,
}

impl SubsetSearch for MonteCarloSearch {
    fn name(&self) -> &'static str {
        "monte_carlo"
    }

    fn search(&self, ctx: &ScoringContext, sizes: RangeInclusive<usize>) -> SearchOutcome {
        let n = ctx.candidate_count();
        let (lo, hi) = (*sizes.start(), (*sizes.end()).min(n));
        let mut outcome = SearchOutcome::default();
        if lo == 0 || lo > hi {
            return outcome;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut seen = BTreeSet::new();
        let mut subsets = Vec::new();
        for _ in 0..self.iterations {
            let k = rng.gen_range(lo..=hi);
            let mut trial = rand::seq::index::sample(&mut rng, n, k).into_vec();
            trial.sort_unstable();
            if seen.insert(trial.clone()) {
                subsets.push(trial);
            }
        }
        outcome.absorb(score_batch(ctx, &subsets), &sizes);
        outcome
    }
}

/// How subsets are proposed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Exhaustive up to `exhaustive_limit` subsets, greedy beyond.
    #[default]
    Auto,
    Exhaustive,
    Greedy,
    MonteCarlo { iterations: usize, seed: u64 },
}

impl SearchStrategy {
    pub fn resolve(
        &self,
        candidates: usize,
        sizes: &RangeInclusive<usize>,
        exhaustive_limit: u64,
        tie_epsilon: f64,
    ) -> Box<dyn SubsetSearch + Send + Sync> {
        match *self {
            SearchStrategy::Auto if combination_count(candidates, sizes) <= exhaustive_limit => {
                Box::new(ExhaustiveSearch)
            }
            SearchStrategy::Auto | SearchStrategy::Greedy => Box::new(GreedySearch { tie_epsilon }),
            SearchStrategy::Exhaustive => Box::new(ExhaustiveSearch),
            SearchStrategy::MonteCarlo { iterations, seed } => {
                Box::new(MonteCarloSearch { iterations, seed })
            }
        }
    }
}

/// Best admissible score of an outcome.
pub fn best_of(outcome: &SearchOutcome, tie_epsilon: f64) -> Option<&SubsetScore> {
    select_best(&outcome.scores, tie_epsilon)
}
