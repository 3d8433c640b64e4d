#[cfg(test)]
mod test;

mod attack;
mod word;

pub use {
    attack::{
        attack,
        stage1::stage1,
        stage2::stage2,
        HypothesisFilter,
        Stage1Hypothesis,
        State,
        Unresolvable,
    },
    word::{ch, hamming_distance, maj, Word},
};
