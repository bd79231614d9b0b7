/// Integer division rounding up.
///
/// ```text
/// (a, b) -> ⌈a / b⌉
/// ```
pub fn ceil_div(a: u32, b: u32) -> u32 {
    assert!(b > 0);
    a.div_ceil(b)
}

/// Smallest `k` such that `base^k >= n`, i.e. `⌈log(n) / log(base)⌉` for `n >= 1`.
///
/// Returns 0 for `n <= 1`.
pub fn ceil_log(n: u32, base: u32) -> u32 {
    assert!(base >= 2, "Logarithm base must be at least 2");
    let mut k = 0;
    let mut reach: u64 = 1;
    while reach < n as u64 {
        reach *= base as u64;
        k += 1;
    }
    k
}

/// Rounds `x` up to the next multiple of `m`.
pub fn align_up(x: u32, m: u32) -> u32 {
    assert!(m > 0);
    x.div_ceil(m) * m
}
