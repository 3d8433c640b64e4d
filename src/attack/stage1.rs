//! Stage 1: bit-by-bit recovery of ΔA, ΔE and the prior (A₋₁, E₋₁) pairs
//! from the round-0 trace column.
//!
//! The round-0 intensity correlates with the carry behavior of D₀ + ΔA and
//! D₀ + ΔE at each bit position. As long as ΔA and ΔE agree on their low
//! bits, a single subset test pins one shared bit per step; at the least
//! significant bit where they differ the test splits, the engine switches
//! phase for good, and from then on every step pins one more bit of each
//! delta and of every (A₋₁, E₋₁) candidate simultaneously.

use {
    super::{
        stats::{binned_means, leaps, round_to_int},
        Stage1Hypothesis,
        Unresolvable,
    },
    crate::word::Word,
    docext::docext,
};

/// Recover candidates for $(\Delta_A, \Delta_E, A_{-1}, E_{-1})$ from the
/// round-0 trace column.
///
/// `data` holds the known input words $(D_0, D_1)$ per measurement and
/// `traces` the corresponding intensity pair; only the first column of each
/// is consumed here.
///
/// # Panics
///
/// Panics if `data` and `traces` differ in length.
#[docext]
pub fn stage1<W: Word>(
    data: &[[W; 2]],
    traces: &[[f64; 2]],
) -> Result<Vec<Stage1Hypothesis<W>>, Unresolvable> {
    let mut search = Stage1::new(data, traces);
    for bit in 0..W::BITS - 1 {
        search.find_bit(bit)?;
    }
    Ok(search.finalize())
}

/// Feasible (A₋₁, E₋₁) bit pairs per rounded triple of consecutive
/// subset-mean differences, for the bits where ΔA and ΔE agree. Each pattern
/// holds the recovered bit in its low bit and the bit above in its high bit,
/// for the A word and the E word respectively.
const HD_EQ: [([i64; 3], &[[u8; 2]]); 9] = [
    ([-2, 0, -2], &[[3, 3]]),
    ([-2, 2, -2], &[[1, 3], [3, 1]]),
    ([-2, 4, -2], &[[1, 1]]),
    ([0, -2, 0], &[[2, 3], [3, 2]]),
    ([0, 0, 0], &[[0, 3], [1, 2], [2, 1], [3, 0]]),
    ([0, 2, 0], &[[0, 1], [1, 0]]),
    ([2, -4, 2], &[[2, 2]]),
    ([2, -2, 2], &[[0, 2], [2, 0]]),
    ([2, 0, 2], &[[0, 0]]),
];

/// The asymmetric variant of [`HD_EQ`] used at the mismatching bit itself.
const HD_NE: [([i64; 3], &[[u8; 2]]); 12] = [
    ([-3, 1, -1], &[[3, 2]]),
    ([-3, 3, -1], &[[1, 2]]),
    ([-1, -1, 1], &[[2, 2], [3, 3]]),
    ([-1, 1, -3], &[[3, 0]]),
    ([-1, 1, 1], &[[0, 2], [1, 3]]),
    ([-1, 3, -3], &[[1, 0]]),
    ([1, -3, 3], &[[2, 3]]),
    ([1, -1, -1], &[[2, 0], [3, 1]]),
    ([1, -1, 3], &[[0, 3]]),
    ([1, 1, -1], &[[0, 0], [1, 1]]),
    ([3, -3, 1], &[[2, 1]]),
    ([3, -1, 1], &[[0, 1]]),
];

/// The cycle of (bits of D₀+δ₀, bits of D₀+δ₁) subset keys probed after the
/// mismatch. The two keys differ by the fixed value δ₀ − δ₁, so only these
/// eight combinations carry weight; the cycle is ordered so that the wrapped
/// second difference isolates one bit of each delta.
const CYCLE: [(u64, u64); 8] = [
    (0, 0),
    (1, 0),
    (1, 1),
    (2, 1),
    (2, 2),
    (3, 2),
    (3, 3),
    (0, 3),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// ΔA and ΔE agree on all bits recovered so far.
    BeforeMismatch,
    /// The least significant mismatching bit has been seen; never leaves
    /// this phase again.
    AfterMismatch,
}

/// The stage-1 working state, filled over `Word::BITS - 1` calls to
/// [`find_bit`](Self::find_bit) and converted into hypotheses by
/// [`finalize`](Self::finalize).
pub(crate) struct Stage1<'a, W> {
    data: &'a [[W; 2]],
    traces: &'a [[f64; 2]],
    /// Number of low-order bits of ΔA and ΔE pinned so far.
    pub(crate) known_bits: u32,
    /// The delta candidates (δ₀, δ₁), kept ordered δ₀ ≥ δ₁. Equal until the
    /// first mismatching bit.
    pub(crate) nexts: [W; 2],
    /// Candidate (A₋₁, E₋₁) pairs, column order consistent with `nexts`.
    /// Small in practice, so a plain growable bag suffices.
    pub(crate) prevs: Vec<[W; 2]>,
    pub(crate) phase: Phase,
}

impl<'a, W: Word> Stage1<'a, W> {
    pub(crate) fn new(data: &'a [[W; 2]], traces: &'a [[f64; 2]]) -> Self {
        assert_eq!(data.len(), traces.len());
        Self {
            data,
            traces,
            known_bits: 0,
            nexts: [W::ZERO; 2],
            prevs: vec![[W::ZERO; 2]],
            phase: Phase::BeforeMismatch,
        }
    }

    /// Pin down the deltas (and, after the mismatch, the prev candidates) at
    /// the given bit position.
    pub(crate) fn find_bit(&mut self, bit: u32) -> Result<(), Unresolvable> {
        match self.phase {
            Phase::BeforeMismatch => self.find_bit_before_mismatch(bit),
            Phase::AfterMismatch => self.find_bit_after_mismatch(bit),
        }
    }

    /// One step while ΔA and ΔE still agree: resolve the bits from
    /// `known_bits` through `bit` of both deltas at once, or detect the first
    /// mismatch.
    fn find_bit_before_mismatch(&mut self, bit: u32) -> Result<(), Unresolvable> {
        debug_assert!(bit >= self.known_bits);
        let known = self.known_bits;
        let unknown = bit + 1 - known;
        // One subset per pattern of the unknown bits plus the bit above
        // them. The statistics are hopeless long before this could overflow.
        let bins = 1usize
            .checked_shl(unknown + 1)
            .ok_or(Unresolvable { bit })?;
        let index_mask = (bins - 1) as u64;
        let delta = self.nexts[0];
        let averages = binned_means(
            bins,
            self.data.len(),
            |i| Some(((self.data[i][0].wrapping_add(delta).to_u64() >> known) & index_mask) as usize),
            |i| self.traces[i][0],
        );
        let leaps = leaps(&averages);
        let hot: Vec<usize> = (0..leaps.len()).filter(|&j| leaps[j] != 0).collect();
        let half = (bins / 2) as u64;

        match hot.len() {
            // No new bit is distinguishable yet; retry with a wider window
            // at the next step.
            0 => Ok(()),

            // One distinguishable pattern: ΔA and ΔE share their bits up
            // through `bit`.
            1 => {
                if leaps[hot[0]].abs() != 4 {
                    return Err(Unresolvable { bit });
                }
                let increment = W::from_u64(half - 1 - hot[0] as u64) << known;
                self.nexts = [
                    self.nexts[0].wrapping_add(increment),
                    self.nexts[1].wrapping_add(increment),
                ];
                self.known_bits = bit + 1;
                Ok(())
            }

            // Two distinguishable patterns: the first mismatch between ΔA
            // and ΔE. The deltas diverge here, and the walk over the already
            // recovered bits can now tell the prior registers apart.
            2 => {
                if hot.iter().any(|&j| leaps[j].abs() != 2) {
                    return Err(Unresolvable { bit });
                }
                // `hot` is ascending, so δ₀ receives the larger increment
                // and the pair stays ordered.
                for (next, &j) in self.nexts.iter_mut().zip(&hot) {
                    *next = next.wrapping_add(W::from_u64(half - 1 - j as u64) << known);
                }
                self.known_bits = bit + 1;
                self.phase = Phase::AfterMismatch;

                // Retroactive sweep: recover the prior registers over the
                // bits where the deltas agree, then at the mismatching bit
                // itself, where the E column is offset by the delta
                // difference before the lookup and by the bit above after
                // it.
                for below in 0..bit {
                    self.update_prevs(below, &HD_EQ)?;
                }
                for prev in &mut self.prevs {
                    prev[1] ^= W::ONE << bit;
                }
                self.update_prevs(bit, &HD_NE)?;
                for prev in &mut self.prevs {
                    prev[1] ^= W::ONE << (bit + 1);
                }
                Ok(())
            }

            _ => Err(Unresolvable { bit }),
        }
    }

    /// One step after the mismatch: resolve bit `bit` of both deltas and of
    /// every prev candidate simultaneously. Always advances `known_bits` by
    /// exactly one, so `bit == known_bits` holds throughout this phase.
    fn find_bit_after_mismatch(&mut self, bit: u32) -> Result<(), Unresolvable> {
        debug_assert_eq!(bit, self.known_bits);
        let [delta0, delta1] = self.nexts;
        let averages = binned_means(
            8,
            self.data.len(),
            |i| {
                let x = (self.data[i][0].wrapping_add(delta0).to_u64() >> bit) & 3;
                let y = (self.data[i][0].wrapping_add(delta1).to_u64() >> bit) & 3;
                CYCLE.iter().position(|&key| key == (x, y))
            },
            |i| self.traces[i][0],
        );
        let leaps = leaps(&averages);
        let hot: Vec<usize> = (0..leaps.len()).filter(|&j| leaps[j] != 0).collect();
        if hot.len() != 2
            || hot.iter().any(|&j| leaps[j].abs() != 2)
            || !matches!(hot[..], [0, 1] | [0, 3] | [1, 2] | [2, 3])
        {
            return Err(Unresolvable { bit });
        }

        let point = W::ONE << bit;
        let above = W::ONE << (bit + 1);
        for column in 0..2 {
            if hot.contains(&column) {
                self.nexts[column] ^= point;
                for prev in &mut self.prevs {
                    prev[column] ^= point;
                    if leaps[column] > 0 {
                        prev[column] ^= above;
                    }
                }
            } else if leaps[column + 2] > 0 {
                for prev in &mut self.prevs {
                    prev[column] ^= above;
                }
            }
        }

        // Restore the canonical δ₀ ≥ δ₁ order.
        if self.nexts[1] > self.nexts[0] {
            self.nexts.swap(0, 1);
            for prev in &mut self.prevs {
                prev.swap(0, 1);
            }
        }
        self.known_bits += 1;
        Ok(())
    }

    /// Refine the prev candidates at the given bit: partition the traces by
    /// the two data bits above it, look the rounded mean differences up in
    /// the table, and keep every old candidate × pattern combination whose
    /// recovered bits agree.
    fn update_prevs(
        &mut self,
        bit: u32,
        table: &[([i64; 3], &[[u8; 2]])],
    ) -> Result<(), Unresolvable> {
        let masked = self.nexts[0] & W::low_mask(bit + 2);
        let averages = binned_means(
            4,
            self.data.len(),
            |i| Some(((self.data[i][0].wrapping_add(masked).to_u64() >> bit) & 3) as usize),
            |i| self.traces[i][0],
        );
        let diffs = [
            round_to_int(averages[1] - averages[0]),
            round_to_int(averages[2] - averages[1]),
            round_to_int(averages[3] - averages[2]),
        ];
        let patterns = table
            .iter()
            .find(|(key, _)| *key == diffs)
            .map(|(_, patterns)| *patterns)
            .ok_or(Unresolvable { bit })?;

        let mut refined = Vec::new();
        for &prev in &self.prevs {
            for &pattern in patterns {
                if fit(prev, pattern, bit) {
                    refined.push(glue(prev, pattern, bit));
                }
            }
        }
        self.prevs = refined;
        Ok(())
    }

    /// Convert the working state into stage-2 hypotheses: both assignments
    /// of the ordered delta pair to (ΔA, ΔE), crossed with all four top-bit
    /// combinations, which the bit walk cannot observe.
    pub(crate) fn finalize(self) -> Vec<Stage1Hypothesis<W>> {
        let mut hypos = Vec::with_capacity(8 * self.prevs.len());
        for (i, j) in [(1, 0), (0, 1)] {
            for prev in &self.prevs {
                for a in [W::ZERO, W::MSB] {
                    for e in [W::ZERO, W::MSB] {
                        hypos.push(Stage1Hypothesis {
                            next_a: self.nexts[i] ^ a,
                            prev_a: prev[i] ^ a,
                            next_e: self.nexts[j] ^ e,
                            prev_e: prev[j] ^ e,
                        });
                    }
                }
            }
        }
        hypos
    }
}

/// Whether a candidate pair agrees with a table pattern on the bit both have
/// already recovered. Vacuously true at bit 0, where the candidate holds
/// nothing yet.
pub(crate) fn fit<W: Word>(prev: [W; 2], pattern: [u8; 2], bit: u32) -> bool {
    if bit == 0 {
        return true;
    }
    prev.iter()
        .zip(pattern)
        .all(|(&word, bits)| (word >> bit ^ W::from_u64(bits.into())) & W::ONE == W::ZERO)
}

/// Glue the pattern's upper bit onto a candidate pair at position `bit + 1`.
/// At bit 0 the pattern seeds both bits of the candidate.
pub(crate) fn glue<W: Word>(prev: [W; 2], pattern: [u8; 2], bit: u32) -> [W; 2] {
    if bit == 0 {
        return [W::from_u64(pattern[0].into()), W::from_u64(pattern[1].into())];
    }
    [
        prev[0] ^ (W::from_u64((pattern[0] & 2).into()) << bit),
        prev[1] ^ (W::from_u64((pattern[1] & 2).into()) << bit),
    ]
}
