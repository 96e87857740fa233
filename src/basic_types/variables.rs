use std::fmt::Display;
use std::fmt::Formatter;

/// An external problem-level bit-vector variable with a fixed bit width. It is owned by the
/// surrounding solver; this crate only reads its width and updates its current value assignment.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Pvar {
    pub id: u32,
}

impl Pvar {
    pub fn new(id: u32) -> Self {
        Pvar { id }
    }

    pub(crate) fn index(&self) -> usize {
        self.id as usize
    }
}

impl Display for Pvar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.id)
    }
}

/// The boolean-literal identity under which a constraint is registered and later activated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct BoolVar {
    pub id: u32,
}

impl BoolVar {
    pub fn new(id: u32) -> Self {
        BoolVar { id }
    }
}

impl Display for BoolVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.id)
    }
}

/// An internal linear-solver variable, unique within one bit-width partition. It denotes either
/// an alias of a problem variable, an interned monomial, or a fresh auxiliary variable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub(crate) struct Var(pub(crate) u32);

impl Display for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.0)
    }
}
