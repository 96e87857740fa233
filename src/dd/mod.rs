//! Reduced ordered binary decision diagrams.
//!
//! The manager hash-conses nodes and memoizes the ITE operation. It is an injected capability of
//! the viable domain tracker: the tracker manipulates diagrams only through this API and never
//! inspects node internals. Interior mutability keeps the manager shareable while domains that
//! reference its nodes are being rewritten.

pub(crate) mod fdd;

use std::cell::RefCell;
use std::fmt::Debug;
use std::fmt::Formatter;

use fnv::FnvHashMap;

/// A handle to a diagram node. Handles are canonical: two handles are equal iff the boolean
/// functions they denote are equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub(crate) struct NodeRef(u32);

impl NodeRef {
    const ZERO: NodeRef = NodeRef(0);
    const ONE: NodeRef = NodeRef(1);
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct Node {
    /// Decision variables are numbered from 1; smaller numbers are closer to the root.
    variable: u32,
    low: NodeRef,
    high: NodeRef,
}

const TERMINAL_VARIABLE: u32 = u32::MAX;

pub(crate) struct Bdd {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<FnvHashMap<Node, NodeRef>>,
    ite_cache: RefCell<FnvHashMap<(NodeRef, NodeRef, NodeRef), NodeRef>>,
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bdd")
            .field("num_nodes", &self.nodes.borrow().len())
            .finish()
    }
}

impl Default for Bdd {
    fn default() -> Self {
        let terminal = |variable| Node {
            variable,
            low: NodeRef::ZERO,
            high: NodeRef::ONE,
        };
        Bdd {
            // Index 0 is the zero terminal, index 1 the one terminal.
            nodes: RefCell::new(vec![
                terminal(TERMINAL_VARIABLE),
                terminal(TERMINAL_VARIABLE),
            ]),
            unique: RefCell::new(FnvHashMap::default()),
            ite_cache: RefCell::new(FnvHashMap::default()),
        }
    }
}

impl Bdd {
    pub(crate) fn zero(&self) -> NodeRef {
        NodeRef::ZERO
    }

    pub(crate) fn one(&self) -> NodeRef {
        NodeRef::ONE
    }

    pub(crate) fn is_zero(&self, node: NodeRef) -> bool {
        node == NodeRef::ZERO
    }

    pub(crate) fn is_one(&self, node: NodeRef) -> bool {
        node == NodeRef::ONE
    }

    fn is_terminal(&self, node: NodeRef) -> bool {
        node == NodeRef::ZERO || node == NodeRef::ONE
    }

    fn node(&self, node: NodeRef) -> Node {
        self.nodes.borrow()[node.0 as usize]
    }

    fn mk_node(&self, variable: u32, low: NodeRef, high: NodeRef) -> NodeRef {
        debug_assert_ne!(variable, 0, "decision variables are numbered from 1");
        if low == high {
            return low;
        }
        let node = Node {
            variable,
            low,
            high,
        };
        if let Some(&existing) = self.unique.borrow().get(&node) {
            return existing;
        }
        let mut nodes = self.nodes.borrow_mut();
        let reference = NodeRef(nodes.len() as u32);
        nodes.push(node);
        let _ = self.unique.borrow_mut().insert(node, reference);
        reference
    }

    /// The function that is true exactly when `variable` is set.
    pub(crate) fn mk_var(&self, variable: u32) -> NodeRef {
        self.mk_node(variable, NodeRef::ZERO, NodeRef::ONE)
    }

    /// Cofactors of `node` with respect to `variable`, which must be at or above the node's root.
    pub(crate) fn cofactors(&self, node: NodeRef, variable: u32) -> (NodeRef, NodeRef) {
        if self.is_terminal(node) {
            return (node, node);
        }
        let n = self.node(node);
        if variable < n.variable {
            (node, node)
        } else {
            debug_assert_eq!(variable, n.variable);
            (n.low, n.high)
        }
    }

    /// `ITE(f, g, h) = (f ∧ g) ∨ (¬f ∧ h)`.
    pub(crate) fn apply_ite(&self, f: NodeRef, g: NodeRef, h: NodeRef) -> NodeRef {
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }

        let key = (f, g, h);
        if let Some(&cached) = self.ite_cache.borrow().get(&key) {
            return cached;
        }

        let top = [f, g, h]
            .into_iter()
            .filter(|node| !self.is_terminal(*node))
            .map(|node| self.node(node).variable)
            .min()
            .expect("f is not terminal");

        let (f0, f1) = self.cofactors(f, top);
        let (g0, g1) = self.cofactors(g, top);
        let (h0, h1) = self.cofactors(h, top);

        let low = self.apply_ite(f0, g0, h0);
        let high = self.apply_ite(f1, g1, h1);
        let result = self.mk_node(top, low, high);

        let _ = self.ite_cache.borrow_mut().insert(key, result);
        result
    }

    pub(crate) fn apply_not(&self, f: NodeRef) -> NodeRef {
        self.apply_ite(f, NodeRef::ZERO, NodeRef::ONE)
    }

    pub(crate) fn apply_and(&self, f: NodeRef, g: NodeRef) -> NodeRef {
        self.apply_ite(f, g, NodeRef::ZERO)
    }

    pub(crate) fn apply_or(&self, f: NodeRef, g: NodeRef) -> NodeRef {
        self.apply_ite(f, NodeRef::ONE, g)
    }

    pub(crate) fn apply_xor(&self, f: NodeRef, g: NodeRef) -> NodeRef {
        let not_g = self.apply_not(g);
        self.apply_ite(f, not_g, g)
    }

    pub(crate) fn apply_iff(&self, f: NodeRef, g: NodeRef) -> NodeRef {
        let not_g = self.apply_not(g);
        self.apply_ite(f, g, not_g)
    }

    /// Evaluate the function under a total assignment of decision variables.
    pub(crate) fn evaluate(&self, node: NodeRef, assignment: impl Fn(u32) -> bool) -> bool {
        let mut current = node;
        while !self.is_terminal(current) {
            let n = self.node(current);
            current = if assignment(n.variable) {
                n.high
            } else {
                n.low
            };
        }
        self.is_one(current)
    }
}

#[cfg(test)]
mod tests {
    use super::Bdd;

    #[test]
    fn handles_are_canonical() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);

        let xy = bdd.apply_and(x, y);
        let yx = bdd.apply_and(y, x);
        assert_eq!(xy, yx);

        let double_negation = bdd.apply_not(bdd.apply_not(xy));
        assert_eq!(double_negation, xy);
    }

    #[test]
    fn excluded_middle_and_contradiction() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let not_x = bdd.apply_not(x);
        assert!(bdd.is_one(bdd.apply_or(x, not_x)));
        assert!(bdd.is_zero(bdd.apply_and(x, not_x)));
    }

    #[test]
    fn evaluation_follows_the_assignment() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let f = bdd.apply_xor(x, y);

        assert!(!bdd.evaluate(f, |_| false));
        assert!(bdd.evaluate(f, |v| v == 1));
        assert!(bdd.evaluate(f, |v| v == 2));
        assert!(!bdd.evaluate(f, |_| true));
    }
}
