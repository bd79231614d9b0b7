use std::fmt::{Debug, Display, Formatter};
use std::ops::Not;

use crate::types::Node;

/// A possibly complemented reference to a node.
///
/// The lowest bit is the complement flag, the remaining bits hold the node.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Signal(u32);

// Constructors
impl Signal {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn one() -> Self {
        Self(1)
    }

    pub const fn new(node: Node, negated: bool) -> Self {
        Self(node.id() << 1 | negated as u32)
    }

    pub const fn from_node(node: Node) -> Self {
        Self::new(node, false)
    }
}

// Getters
impl Signal {
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn node(&self) -> Node {
        Node::new(self.0 >> 1)
    }
}

// Checks
impl Signal {
    pub const fn is_const(&self) -> bool {
        self.0 >> 1 == 0
    }

    pub const fn is_negated(&self) -> bool {
        self.0 & 1 != 0
    }
}

impl Signal {
    /// Complements the signal iff `negate` is set.
    pub const fn negate_if(self, negate: bool) -> Self {
        Self(self.0 ^ negate as u32)
    }
}

impl From<bool> for Signal {
    fn from(b: bool) -> Self {
        if b {
            Self::one()
        } else {
            Self::zero()
        }
    }
}

impl From<Node> for Signal {
    fn from(node: Node) -> Self {
        Self::from_node(node)
    }
}

impl Not for Signal {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(self.0 ^ 1)
    }
}

impl Not for &Signal {
    type Output = Signal;

    fn not(self) -> Self::Output {
        Signal(self.0 ^ 1)
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_const() {
            write!(f, "{}", self.0 & 1)
        } else {
            if self.is_negated() {
                write!(f, "!")?;
            }
            write!(f, "{}", self.node())
        }
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_const() {
        let zero = Signal::zero();
        let one = Signal::one();

        assert!(zero.is_const());
        assert!(one.is_const());

        assert_eq!(zero, !one);
        assert_eq!(one, !zero);

        assert!(!zero.is_negated());
        assert!(one.is_negated());
        assert_eq!(zero.node(), Node::CONSTANT);
        assert_eq!(one.node(), Node::CONSTANT);
    }

    #[test]
    fn test_node_roundtrip() {
        let n = Node::new(42);
        let s = Signal::from_node(n);
        assert_eq!(s.node(), n);
        assert!(!s.is_negated());
        assert!(!s.is_const());

        let t = !s;
        assert_eq!(t.node(), n);
        assert!(t.is_negated());
        assert_eq!(s.negate_if(true), t);
        assert_eq!(s.negate_if(false), s);
    }

    #[test]
    fn test_display() {
        let s = Signal::new(Node::new(5), true);
        assert_eq!(format!("{}", s), "!n5");
        assert_eq!(format!("{}", Signal::one()), "1");
    }
}
