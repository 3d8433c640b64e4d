use {super::sim::generate_traces, crate::stage2};

/// Given the true stage-1 hypothesis and noise-free traces, stage 2 recovers
/// exactly the secret state.
#[test]
fn accepts_the_true_hypothesis() {
    let sim = generate_traces::<u32>(1 << 16, 11, 0.0);
    let states = stage2(&sim.data, &sim.traces, &[sim.true_hypothesis()]);
    assert_eq!(states, vec![sim.iv]);
}

/// A hypothesis that is wrong in a middle bit of the prior A register fails
/// one of the magnitude tests and is rejected without a result.
#[test]
fn rejects_a_corrupted_hypothesis() {
    let sim = generate_traces::<u32>(1 << 16, 11, 0.0);
    let mut corrupted = sim.true_hypothesis();
    corrupted.prev_a ^= 1 << 13;
    assert!(stage2(&sim.data, &sim.traces, &[corrupted]).is_empty());
}

/// A wrong delta is rejected as well, and rejection of one hypothesis does
/// not disturb the others in the same batch.
#[test]
fn rejects_independently_per_hypothesis() {
    let sim = generate_traces::<u32>(1 << 16, 19, 0.0);
    let truth = sim.true_hypothesis();
    let mut corrupted = truth;
    corrupted.next_e ^= 1 << 21;
    let states = stage2(&sim.data, &sim.traces, &[corrupted, truth]);
    assert_eq!(states, vec![sim.iv]);
}

/// The 64-bit walk takes all 64 iterations and still terminates with the
/// exact state.
#[test]
fn recovers_the_wide_state() {
    let sim = generate_traces::<u64>(1 << 16, 5, 0.0);
    let states = stage2(&sim.data, &sim.traces, &[sim.true_hypothesis()]);
    assert_eq!(states, vec![sim.iv]);
}
