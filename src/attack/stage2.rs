//! Stage 2: bit-by-bit recovery of the inner registers B, C, F, G from the
//! round-1 trace column, conditioned on one stage-1 hypothesis.
//!
//! With ΔA, ΔE, A₋₁ and E₋₁ assumed known, the per-trace round-0 outputs
//! a₄ = D₀ + ΔA and e₄ = D₀ + ΔE are known too, and the round-1 register
//! updates become affine in the remaining unknowns once masked below the
//! current bit. Two four-subset tests per bit position read one bit of each
//! unknown register off the rounded mean differences; a difference whose
//! magnitude is not exactly one means the hypothesis cannot explain the
//! traces and is rejected.

use {
    super::{
        stats::{binned_means, round_to_int},
        Stage1Hypothesis,
        State,
        Unresolvable,
    },
    crate::word::{ch, maj, Word},
};

/// Run stage 2 on every hypothesis, returning the candidate states of the
/// hypotheses that explain the round-1 trace column.
///
/// # Panics
///
/// Panics if `data` and `traces` differ in length.
pub fn stage2<W: Word>(
    data: &[[W; 2]],
    traces: &[[f64; 2]],
    hypos: &[Stage1Hypothesis<W>],
) -> Vec<State<W>> {
    hypos
        .iter()
        .filter_map(|&hypo| Stage2::new(hypo, data, traces).run().ok())
        .collect()
}

/// The stage-2 working state for a single hypothesis.
///
/// Slot 3 of `a` and `e` holds the handed-down prior register; slots 2 and 1
/// accumulate the registers being resolved bit by bit (C+G and F on the E
/// side, G and B on the A side, disentangled in [`finalize`](Self::finalize));
/// slot 0 is reconstructed analytically at the end.
pub(crate) struct Stage2<'a, W: Word> {
    traces: &'a [[f64; 2]],
    a: [W; 4],
    e: [W; 4],
    /// Per-trace round-0 outputs D₀ + ΔA and D₀ + ΔE.
    a4: Vec<W>,
    e4: Vec<W>,
    /// Per-trace Σ₀(a₄), reused by the A-side test at every bit.
    sigma0: Vec<W>,
    /// Per-trace Σ₁(e₄) + D₁ + K₁, the bit-independent part of the round-1
    /// sums.
    sum_en: Vec<W>,
    next_a: W,
    next_e: W,
}

impl<'a, W: Word> Stage2<'a, W> {
    pub(crate) fn new(
        hypo: Stage1Hypothesis<W>,
        data: &[[W; 2]],
        traces: &'a [[f64; 2]],
    ) -> Self {
        assert_eq!(data.len(), traces.len());
        let a4: Vec<W> = data.iter().map(|row| hypo.next_a.wrapping_add(row[0])).collect();
        let e4: Vec<W> = data.iter().map(|row| hypo.next_e.wrapping_add(row[0])).collect();
        let sigma0 = a4.iter().map(|&a| a.uppercase_sigma_0()).collect();
        let sum_en = e4
            .iter()
            .zip(data)
            .map(|(&e, row)| e.uppercase_sigma_1().wrapping_add(row[1]).wrapping_add(W::K[1]))
            .collect();
        Self {
            traces,
            a: [W::ZERO, W::ZERO, W::ZERO, hypo.prev_a],
            e: [W::ZERO, W::ZERO, W::ZERO, hypo.prev_e],
            a4,
            e4,
            sigma0,
            sum_en,
            next_a: hypo.next_a,
            next_e: hypo.next_e,
        }
    }

    /// Resolve all `Word::BITS` bit positions, then reconstruct the full
    /// state, or reject the hypothesis at the first failing test.
    pub(crate) fn run(mut self) -> Result<State<W>, Unresolvable> {
        for bit in 0..W::BITS {
            self.find_bit(bit)?;
        }
        Ok(self.finalize())
    }

    fn find_bit(&mut self, bit: u32) -> Result<(), Unresolvable> {
        let mask = W::low_mask(bit);
        let point = W::ONE << bit;
        let big_mask = W::low_mask(bit + 1);
        let rows = self.traces.len();

        // E-side test: the new-E sum is known below `bit` given the
        // candidates so far, so its bit at `bit` splits the traces by the
        // carry into that position, and the e₄ bit splits them by the
        // Hamming-distance direction.
        let means_e = binned_means(
            4,
            rows,
            |i| {
                let sum_e = self.e4[i]
                    ^ self.sum_en[i]
                        .wrapping_add(ch(self.e4[i], self.e[3], self.e[2]) & mask)
                        .wrapping_add(self.a[1] & mask);
                Some((sum_e.bit(bit) * 2 + self.e4[i].bit(bit)) as usize)
            },
            |i| self.traces[i][1],
        );
        let diff_cg = round_to_int(means_e[3] - means_e[1]);
        if diff_cg.abs() != 1 {
            return Err(Unresolvable { bit });
        }
        self.a[1] ^= (W::from_bool(diff_cg == -1) << bit) ^ (self.e[3] & point);
        let diff_f = round_to_int(means_e[2] - means_e[0]);
        if diff_f.abs() != 1 {
            return Err(Unresolvable { bit });
        }
        self.e[2] ^= (W::from_bool((diff_f == -1) != (diff_cg == -1)) << bit) ^ (self.e[3] & point);

        // A-side test, with the E-side choice term already carrying its
        // fresh bit (hence the wider mask).
        let means_a = binned_means(
            4,
            rows,
            |i| {
                let sum_a = self.a4[i]
                    ^ self.sum_en[i]
                        .wrapping_add(self.sigma0[i])
                        .wrapping_add(maj(self.a4[i], self.a[3], self.a[2]) & mask)
                        .wrapping_add(self.e[1] & mask)
                        .wrapping_add(ch(self.e4[i], self.e[3], self.e[2]) & big_mask);
                Some((sum_a.bit(bit) * 2 + (self.a4[i] ^ self.a[3]).bit(bit)) as usize)
            },
            |i| self.traces[i][1],
        );
        let diff_g = round_to_int(means_a[2] - means_a[0]);
        if diff_g.abs() != 1 {
            return Err(Unresolvable { bit });
        }
        self.e[1] ^= (W::from_bool(diff_g == -1) << bit) ^ (self.a[3] & point);
        let diff_b = round_to_int(means_a[3] - means_a[1]);
        if diff_b.abs() != 1 {
            return Err(Unresolvable { bit });
        }
        self.a[2] ^= (W::from_bool(diff_b == -1) << bit) ^ (self.e[1] & point);
        Ok(())
    }

    /// Disentangle the accumulated registers and reconstruct D and H from
    /// the round-0 update equations.
    fn finalize(mut self) -> State<W> {
        self.a[1] = self.a[1].wrapping_sub(self.e[1]);
        let sigma1 = self.e[3].uppercase_sigma_1();
        let choice = ch(self.e[3], self.e[2], self.e[1]);
        self.e[0] = self
            .next_a
            .wrapping_sub(self.a[3].uppercase_sigma_0())
            .wrapping_sub(maj(self.a[3], self.a[2], self.a[1]))
            .wrapping_sub(sigma1)
            .wrapping_sub(choice)
            .wrapping_sub(W::K[0]);
        self.a[0] = self
            .next_e
            .wrapping_sub(sigma1)
            .wrapping_sub(choice)
            .wrapping_sub(self.e[0])
            .wrapping_sub(W::K[0]);
        [
            self.a[3], self.a[2], self.a[1], self.a[0], self.e[3], self.e[2], self.e[1], self.e[0],
        ]
    }
}
