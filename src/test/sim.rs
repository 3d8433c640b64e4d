//! Trace synthesis: a random secret state, random data words, and the exact
//! Hamming-distance intensity model of the first two compression rounds,
//! with optional Gaussian noise on top.

use {
    crate::{ch, hamming_distance, maj, Stage1Hypothesis, Word},
    rand::{rngs::StdRng, Rng, SeedableRng},
    rand_distr::{Distribution, Normal},
};

pub struct Simulation<W> {
    pub data: Vec<[W; 2]>,
    pub traces: Vec<[f64; 2]>,
    /// The secret initial state (A, B, C, D, E, F, G, H).
    pub iv: [W; 8],
    /// The round-0 offsets implied by the state.
    pub delta_a: W,
    pub delta_e: W,
}

impl<W: Word> Simulation<W> {
    /// The stage-1 hypothesis describing the true secret.
    pub fn true_hypothesis(&self) -> Stage1Hypothesis<W> {
        Stage1Hypothesis {
            next_a: self.delta_a,
            prev_a: self.iv[0],
            next_e: self.delta_e,
            prev_e: self.iv[4],
        }
    }
}

/// Simulate `trace_count` measurements of the first two rounds compressing
/// random data under a random secret state. The intensity of a round is the
/// sum of Hamming distances between consecutive values of all eight working
/// registers, which for rounds 0 and 1 reduces to two register updates per
/// round plus a state-dependent constant; `noise` is the standard deviation
/// of the Gaussian disturbance added to both columns.
pub fn generate_traces<W: Word>(trace_count: usize, seed: u64, noise: f64) -> Simulation<W> {
    let mut rng = StdRng::seed_from_u64(seed);
    let iv: [W; 8] = std::array::from_fn(|_| W::from_u64(rng.gen()));
    let data: Vec<[W; 2]> = (0..trace_count)
        .map(|_| [W::from_u64(rng.gen()), W::from_u64(rng.gen())])
        .collect();

    let temp1 = iv[7]
        .wrapping_add(iv[4].uppercase_sigma_1())
        .wrapping_add(ch(iv[4], iv[5], iv[6]))
        .wrapping_add(W::K[0]);
    let temp2 = iv[0].uppercase_sigma_0().wrapping_add(maj(iv[0], iv[1], iv[2]));
    let delta_a = temp1.wrapping_add(temp2);
    let delta_e = iv[3].wrapping_add(temp1);

    // The registers that merely shift down contribute the same distance in
    // every measurement.
    let const1 = hamming_distance(iv[0], iv[1])
        + hamming_distance(iv[1], iv[2])
        + hamming_distance(iv[4], iv[5])
        + hamming_distance(iv[5], iv[6]);
    let const0 = const1 + hamming_distance(iv[2], iv[3]) + hamming_distance(iv[6], iv[7]);

    let mut traces: Vec<[f64; 2]> = data
        .iter()
        .map(|&[d0, d1]| {
            let a1 = d0.wrapping_add(delta_a);
            let e1 = d0.wrapping_add(delta_e);
            let round0 = hamming_distance(a1, iv[0]) + hamming_distance(e1, iv[4]);
            let temp1 = iv[6]
                .wrapping_add(e1.uppercase_sigma_1())
                .wrapping_add(ch(e1, iv[4], iv[5]))
                .wrapping_add(W::K[1]);
            let temp2 = a1.uppercase_sigma_0().wrapping_add(maj(a1, iv[0], iv[1]));
            let a2 = d1.wrapping_add(temp1).wrapping_add(temp2);
            let e2 = d1.wrapping_add(iv[2]).wrapping_add(temp1);
            let round1 = round0 + hamming_distance(a2, a1) + hamming_distance(e2, e1);
            [(const0 + round0) as f64, (const1 + round1) as f64]
        })
        .collect();

    if noise > 0.0 {
        let normal = Normal::new(0.0, noise).unwrap();
        for row in &mut traces {
            row[0] += normal.sample(&mut rng);
            row[1] += normal.sample(&mut rng);
        }
    }

    Simulation {
        data,
        traces,
        iv,
        delta_a,
        delta_e,
    }
}

/// Random data words for the constructed stage-1 cases.
pub fn random_data<W: Word>(trace_count: usize, seed: u64) -> Vec<[W; 2]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..trace_count)
        .map(|_| [W::from_u64(rng.gen()), W::from_u64(rng.gen())])
        .collect()
}

/// The round-0 intensity column for explicitly chosen deltas and prior
/// registers, noise-free. Stage 1 only reads the first trace column, so the
/// second is left at zero.
pub fn round0_traces<W: Word>(
    data: &[[W; 2]],
    delta_a: W,
    delta_e: W,
    prev_a: W,
    prev_e: W,
) -> Vec<[f64; 2]> {
    data.iter()
        .map(|&[d0, _]| {
            let distance = hamming_distance(d0.wrapping_add(delta_a), prev_a)
                + hamming_distance(d0.wrapping_add(delta_e), prev_e);
            [distance as f64, 0.0]
        })
        .collect()
}
