use crate::signal::Signal;
use crate::types::Node;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BinaryType {
    And,
    Xor,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TernaryType {
    Maj,
    Xor,
}

/// A node function together with its fanin signals.
///
/// `Buffer` is the single-input pass-through element; splitters are buffers
/// with more than one consumer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Gate {
    Buffer(Signal),
    Binary(BinaryType, [Signal; 2]),
    Ternary(TernaryType, [Signal; 3]),
}

// Constructors
impl Gate {
    pub fn buffer(a: Signal) -> Gate {
        Gate::Buffer(a)
    }

    pub fn and(a: Signal, b: Signal) -> Gate {
        Gate::Binary(BinaryType::And, [a, b])
    }

    pub fn xor(a: Signal, b: Signal) -> Gate {
        Gate::Binary(BinaryType::Xor, [a, b])
    }

    pub fn maj(a: Signal, b: Signal, c: Signal) -> Gate {
        Gate::Ternary(TernaryType::Maj, [a, b, c])
    }

    pub fn xor3(a: Signal, b: Signal, c: Signal) -> Gate {
        Gate::Ternary(TernaryType::Xor, [a, b, c])
    }
}

// Getters
impl Gate {
    pub fn inputs(&self) -> &[Signal] {
        match self {
            Gate::Buffer(input) => std::slice::from_ref(input),
            Gate::Binary(_, inputs) => inputs,
            Gate::Ternary(_, inputs) => inputs,
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Gate::Buffer(_))
    }

    /// Returns the same function over different fanins.
    ///
    /// # Panics
    ///
    /// Panics if the number of fanins does not match the gate's arity.
    pub fn with_inputs(&self, inputs: &[Signal]) -> Gate {
        assert_eq!(inputs.len(), self.inputs().len(), "Arity mismatch for {:?}", self);
        match *self {
            Gate::Buffer(_) => Gate::Buffer(inputs[0]),
            Gate::Binary(t, _) => Gate::Binary(t, [inputs[0], inputs[1]]),
            Gate::Ternary(t, _) => Gate::Ternary(t, [inputs[0], inputs[1], inputs[2]]),
        }
    }
}

// Evaluation
impl Gate {
    /// Evaluates the gate given a value for each fanin node.
    pub fn eval(&self, value: impl Fn(Node) -> bool) -> bool {
        let v = |s: Signal| value(s.node()) ^ s.is_negated();
        match self {
            Gate::Buffer(a) => v(*a),
            Gate::Binary(BinaryType::And, [a, b]) => v(*a) && v(*b),
            Gate::Binary(BinaryType::Xor, [a, b]) => v(*a) ^ v(*b),
            Gate::Ternary(TernaryType::Maj, [a, b, c]) => {
                let (a, b, c) = (v(*a), v(*b), v(*c));
                (a && b) || (a && c) || (b && c)
            }
            Gate::Ternary(TernaryType::Xor, [a, b, c]) => v(*a) ^ v(*b) ^ v(*c),
        }
    }
}
