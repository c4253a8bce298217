//! Property-based test generators using proptest.
//!
//! Provides strategies for chain sizes and failure positions that always
//! stay within the chain.

use crate::scripted::Op;
use proptest::prelude::*;

/// Largest chain generated by the strategies below.
pub const MAX_CHAIN_LEN: usize = 8;

/// Strategy for a chain length in `1..=MAX_CHAIN_LEN`.
pub fn chain_len_strategy() -> impl Strategy<Value = usize> {
    1..=MAX_CHAIN_LEN
}

/// Strategy for a chain length and a resource index within it.
pub fn chain_with_index_strategy() -> impl Strategy<Value = (usize, usize)> {
    chain_len_strategy().prop_flat_map(|len| (Just(len), 0..len))
}

/// Strategy for a chain length and an index that is not the last resource.
///
/// Chains of length 1 have no such index, so lengths start at 2.
pub fn chain_with_inner_index_strategy() -> impl Strategy<Value = (usize, usize)> {
    (2..=MAX_CHAIN_LEN).prop_flat_map(|len| (Just(len), 0..len - 1))
}

/// Strategy for a chain length and a set of resources whose rollback fails.
pub fn chain_with_failing_set_strategy() -> impl Strategy<Value = (usize, Vec<bool>)> {
    chain_len_strategy().prop_flat_map(|len| (Just(len), prop::collection::vec(any::<bool>(), len)))
}

/// Strategy for a fan-out operation that can fail on a resource.
pub fn fan_out_op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Flush),
        Just(Op::CreateSavepoint),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
