use num_bigint::BigUint;

/// Result of a hint-based search for a viable value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FindResult {
    /// The domain admits no value.
    Empty,
    /// The domain admits exactly the given value.
    Singleton(BigUint),
    /// The domain admits several values; the witness is the hint itself when viable, otherwise
    /// the smallest viable value.
    Multiple(BigUint),
}

/// Reported by the domain-narrowing operations. `Incomplete` means the domain is a sound
/// over-approximation but a documented reasoning step (upper-bound derivation from a decision
/// diagram) was not applied; it is distinguishable from both emptiness and exact narrowing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NarrowOutcome {
    Complete,
    Incomplete,
}
