//! Benchmark network generators.
//!
//! Arithmetic circuits are the usual workload for AQFP buffer insertion:
//! carries create long reconvergent paths and partial products create high
//! fan-out on the inputs.

use crate::network::{LogicNetwork, Network};
use crate::signal::Signal;

/// Adds `a + b + cin` and returns `(sum, carry)`.
pub fn full_adder(ntk: &mut Network, a: Signal, b: Signal, cin: Signal) -> (Signal, Signal) {
    let sum = ntk.add_xor3(a, b, cin);
    let carry = ntk.add_maj(a, b, cin);
    (sum, carry)
}

/// Adds `a + b` and returns `(sum, carry)`.
pub fn half_adder(ntk: &mut Network, a: Signal, b: Signal) -> (Signal, Signal) {
    let sum = ntk.add_xor(a, b);
    let carry = ntk.add_and(a, b);
    (sum, carry)
}

/// Ripple-carry addition of two equally wide words, least significant bit first.
///
/// Returns the sum bits and the carry out.
///
/// # Panics
///
/// Panics if the words differ in width or are empty.
pub fn add_words(ntk: &mut Network, a: &[Signal], b: &[Signal]) -> (Vec<Signal>, Signal) {
    assert_eq!(a.len(), b.len(), "Operands must have the same width");
    assert!(!a.is_empty(), "Operands must not be empty");
    let (s0, mut carry) = half_adder(ntk, a[0], b[0]);
    let mut sum = vec![s0];
    for i in 1..a.len() {
        let (s, c) = full_adder(ntk, a[i], b[i], carry);
        sum.push(s);
        carry = c;
    }
    (sum, carry)
}

/// `bits`-bit ripple-carry adder.
///
/// Inputs are `a` then `b`, least significant bit first. Outputs are the sum
/// bits followed by the carry out.
pub fn ripple_carry_adder(bits: usize) -> Network {
    let mut ntk = Network::new();
    let a: Vec<Signal> = (0..bits).map(|_| ntk.add_input()).collect();
    let b: Vec<Signal> = (0..bits).map(|_| ntk.add_input()).collect();
    let (sum, carry) = add_words(&mut ntk, &a, &b);
    for s in sum {
        ntk.add_output(s);
    }
    ntk.add_output(carry);
    ntk
}

/// `bits`-bit array multiplier with a `2 * bits`-bit product.
///
/// Inputs are `a` then `b`, least significant bit first, and so are the outputs.
pub fn array_multiplier(bits: usize) -> Network {
    assert!(bits > 0, "Operands must not be empty");
    let mut ntk = Network::new();
    let a: Vec<Signal> = (0..bits).map(|_| ntk.add_input()).collect();
    let b: Vec<Signal> = (0..bits).map(|_| ntk.add_input()).collect();

    let mut acc: Vec<Signal> = a.iter().map(|&ai| ntk.add_and(ai, b[0])).collect();
    let mut high = ntk.get_constant(false);
    let mut product = Vec::with_capacity(2 * bits);
    for &bj in &b[1..] {
        product.push(acc[0]);
        let mut upper = acc[1..].to_vec();
        upper.push(high);
        let partial: Vec<Signal> = a.iter().map(|&ai| ntk.add_and(ai, bj)).collect();
        let (sum, carry) = add_words(&mut ntk, &upper, &partial);
        acc = sum;
        high = carry;
    }
    product.extend(acc);
    product.push(high);

    for s in product {
        ntk.add_output(s);
    }
    ntk
}

/// Complete ternary tree of majority gates with `3^depth` inputs.
pub fn majority_tree(depth: u32) -> Network {
    let mut ntk = Network::new();
    let mut layer: Vec<Signal> = (0..3usize.pow(depth)).map(|_| ntk.add_input()).collect();
    while layer.len() > 1 {
        layer = layer.chunks(3).map(|c| ntk.add_maj(c[0], c[1], c[2])).collect();
    }
    ntk.add_output(layer[0]);
    ntk
}

/// Random network of AND, XOR and MAJ gates.
///
/// `choose(n)` must return a value in `0..n`; callers typically pass a seeded
/// random number generator. Every output is driven by a gate.
pub fn random_network(
    num_inputs: usize,
    num_gates: usize,
    num_outputs: usize,
    mut choose: impl FnMut(usize) -> usize,
) -> Network {
    assert!(num_inputs > 0, "A random network needs inputs");
    let mut ntk = Network::new();
    let mut signals: Vec<Signal> = (0..num_inputs).map(|_| ntk.add_input()).collect();

    fn pick(choose: &mut impl FnMut(usize) -> usize, signals: &[Signal]) -> Signal {
        let s = signals[choose(signals.len())];
        s.negate_if(choose(2) == 1)
    }
    let mut gates = Vec::with_capacity(num_gates);
    for _ in 0..num_gates {
        let a = pick(&mut choose, &signals);
        let b = pick(&mut choose, &signals);
        let g = match choose(3) {
            0 => ntk.add_and(a, b),
            1 => ntk.add_xor(a, b),
            _ => {
                let c = pick(&mut choose, &signals);
                ntk.add_maj(a, b, c)
            }
        };
        signals.push(g);
        gates.push(g);
    }

    let drivers = if gates.is_empty() { &signals } else { &gates };
    for _ in 0..num_outputs {
        let s = pick(&mut choose, drivers);
        ntk.add_output(s);
    }
    ntk
}
