//! Recovery of the secret SHA-2 compression state from noisy
//! Hamming-distance traces of the first two rounds.
//!
//! The target device compresses attacker-known data words D₀, D₁ with a
//! secret initial state (A, B, C, D, E, F, G, H), and the side channel
//! leaks, per round, a noisy sum of [Hamming
//! distances](crate::hamming_distance) between successive working-register
//! values. Because only the A and E registers change in a SHA-2 round, the
//! new round-0 values are D₀ + ΔA and D₀ + ΔE for two fixed secret offsets
//! ΔA, ΔE determined by the initial state and the first round constant K₀.
//! The attack proceeds in two stages:
//!
//! 1. [Stage 1](crate::stage1) recovers ΔA and ΔE bit by bit from the
//!    round-0 trace column, exploiting the carry behavior of D₀ + Δ at each
//!    bit position, and collects a small candidate set for the prior
//!    registers (A₋₁, E₋₁) along the way.
//! 2. [Stage 2](crate::stage2) takes one Stage-1 hypothesis at a time and
//!    recovers B, C, F, G bit by bit from the round-1 trace column, then
//!    reconstructs A, D, E, H analytically. Hypotheses that do not explain
//!    the traces are rejected.
//!
//! The statistical engine behind both stages partitions the traces into
//! subsets indexed by low-order bit patterns of known quantities, averages
//! the measured intensity within each subset, and rounds fixed finite
//! differences of the averages to small signed integers that select among an
//! enumerated set of local hypotheses. Every test is deterministic given the
//! input; there is no retry logic, and a caller that sees [`Unresolvable`]
//! decides for itself whether to acquire more traces and re-run.

pub(crate) mod stage1;
pub(crate) mod stage2;

mod stats;

use {
    crate::word::Word,
    std::{error, fmt},
};

/// A candidate 8-word compression state in canonical SHA-2 order
/// (A, B, C, D, E, F, G, H).
pub type State<W> = [W; 8];

/// The handoff between the two stages: candidate values of the round-0
/// offsets ΔA, ΔE and of the prior working registers A₋₁, E₋₁.
///
/// The statistical tests never observe the top bit of any of the four words,
/// so stage 1 emits all four sign combinations of every candidate; stage 2
/// weeds out the inconsistent ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage1Hypothesis<W> {
    /// Candidate ΔA: the word added to D₀ by the round-0 update of the A
    /// register.
    pub next_a: W,
    /// Candidate prior A register, A₋₁.
    pub prev_a: W,
    /// Candidate ΔE.
    pub next_e: W,
    /// Candidate prior E register, E₋₁.
    pub prev_e: W,
}

/// A subset-mean test did not match any of the enumerated patterns at the
/// given bit position.
///
/// From stage 1 this aborts the attack; from stage 2 it rejects a single
/// hypothesis. `bit` equal to the word width is the sentinel meaning that no
/// stage-2 hypothesis survived at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unresolvable {
    pub bit: u32,
}

impl fmt::Display for Unresolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "statistical test failed at bit {}", self.bit)
    }
}

impl error::Error for Unresolvable {}

/// Pre-selection applied to the stage-1 hypotheses before stage 2. The
/// filter may fail the attack outright, e.g. when the hypothesis it is
/// looking for is absent.
pub type HypothesisFilter<'a, W> =
    &'a dyn Fn(&[Stage1Hypothesis<W>]) -> Result<Vec<Stage1Hypothesis<W>>, Unresolvable>;

/// The full attack: stage 1, an optional hypothesis filter, then stage 2 on
/// the first `second_stage_count` measurements for every surviving
/// hypothesis.
///
/// Returns the candidate states together with the number of hypotheses that
/// entered stage 2. Stage 2 converges on far fewer traces than stage 1
/// needs, so `second_stage_count` is typically a fraction of the trace count
/// (it is clamped to it).
///
/// # Panics
///
/// Panics if `data` and `traces` differ in length.
pub fn attack<W: Word>(
    data: &[[W; 2]],
    traces: &[[f64; 2]],
    second_stage_count: usize,
    filter: Option<HypothesisFilter<W>>,
) -> Result<(Vec<State<W>>, usize), Unresolvable> {
    let hypos = stage1::stage1(data, traces)?;
    let hypos = match filter {
        Some(filter) => filter(&hypos)?,
        None => hypos,
    };
    let count = second_stage_count.min(data.len());
    let states = stage2::stage2(&data[..count], &traces[..count], &hypos);
    if states.is_empty() {
        return Err(Unresolvable { bit: W::BITS });
    }
    Ok((states, hypos.len()))
}
