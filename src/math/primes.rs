//! NTT-friendly prime chains for the ciphertext and key-switching moduli.
//!
//! Primality is decided with Miller-Rabin over a fixed base set which is
//! deterministic for every `u64`. Chains are built by walking the residue
//! class `1 (mod 2n)` outward from `2^log_q`, alternating between the next
//! prime above and the next prime below, so that the product of consecutive
//! moduli stays close to a power of two and rescaled scales do not drift.

// Deterministic for all n < 3.3 * 10^24, which covers u64.
const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

fn mul_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 * b as u128) % modulus as u128) as u64
}

fn mod_pow(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut acc = 1;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, modulus);
        }
        base = mul_mod(base, base, modulus);
        exp >>= 1;
    }
    acc
}

pub fn is_prime(n: u64) -> bool {
    match n {
        0 | 1 => return false,
        2 | 3 => return true,
        _ if n & 1 == 0 => return false,
        _ => {}
    }

    let r = (n - 1).trailing_zeros();
    let d = (n - 1) >> r;
    'bases: for &a in MILLER_RABIN_BASES.iter() {
        if a >= n {
            continue;
        }
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'bases;
            }
        }
        return false;
    }
    true
}

/// `p` is prime and `p = 1 (mod 2n)`, so `Z_p` has a primitive `2n`-th root.
pub fn is_ntt_friendly_prime(p: u64, n: u64) -> bool {
    assert!(n > 0, "is_ntt_friendly_prime: n must be positive");
    is_prime(p) && p % (2 * n) == 1
}

/// Alternating generator of distinct NTT-friendly primes around `2^log_q`.
#[derive(Debug, Clone)]
pub struct NttPrimeGenerator {
    step: u64,
    next_up: u64,
    next_down: u64,
    go_up: bool,
}

impl NttPrimeGenerator {
    pub fn new(log_q: u32, n: u64) -> Self {
        assert!(
            (2..63).contains(&log_q),
            "NttPrimeGenerator::new: log_q must be in [2, 62], got {log_q}"
        );
        assert!(n > 0, "NttPrimeGenerator::new: n must be positive");
        let step = 2 * n;
        let center = 1u64 << log_q;
        // 2^log_q = 0 (mod 2n) whenever 2n <= 2^log_q, so center + 1 is in the class.
        Self {
            step,
            next_up: center + 1,
            next_down: (center + 1).saturating_sub(step),
            go_up: true,
        }
    }

    fn search_up(&mut self) -> Option<u64> {
        let mut candidate = self.next_up;
        while !is_prime(candidate) {
            candidate = candidate.checked_add(self.step)?;
        }
        self.next_up = candidate + self.step;
        Some(candidate)
    }

    fn search_down(&mut self) -> Option<u64> {
        let mut candidate = self.next_down;
        while candidate > 2 && !is_prime(candidate) {
            candidate = candidate.checked_sub(self.step)?;
        }
        if candidate <= 2 {
            return None;
        }
        self.next_down = candidate.saturating_sub(self.step);
        Some(candidate)
    }
}

impl Iterator for NttPrimeGenerator {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let prime = if self.go_up {
            self.search_up().or_else(|| self.search_down())
        } else {
            self.search_down().or_else(|| self.search_up())
        };
        self.go_up = !self.go_up;
        prime
    }
}

/// Generates one NTT-friendly prime per entry of `log_q`, never repeating a
/// prime already present in `exclude` or earlier in the output.
pub fn generate_ntt_primes(log_q: &[u32], n: u64, exclude: &[u64]) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(log_q.len());
    let mut generators: Vec<(u32, NttPrimeGenerator)> = Vec::new();
    for &bits in log_q {
        let index = match generators.iter().position(|(b, _)| *b == bits) {
            Some(index) => index,
            None => {
                generators.push((bits, NttPrimeGenerator::new(bits, n)));
                generators.len() - 1
            }
        };
        let generator = &mut generators[index].1;
        let prime = generator
            .find(|p| !primes.contains(p) && !exclude.contains(p))
            .unwrap_or_else(|| panic!("generate_ntt_primes: no {bits}-bit prime left"));
        primes.push(prime);
    }
    primes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_primes_and_composites() {
        for p in [2u64, 3, 5, 7, 11, 13, 65537, 2_147_483_647] {
            assert!(is_prime(p), "{p}");
        }
        for c in [0u64, 1, 4, 9, 561, 1_105, 1_729, 3_215_031_751, u64::MAX] {
            assert!(!is_prime(c), "{c}");
        }
        assert!(is_prime(18_446_744_073_709_551_557));
    }

    #[test]
    fn ntt_friendly_condition() {
        assert!(is_ntt_friendly_prime(12289, 1024));
        assert!(!is_ntt_friendly_prime(2049, 1024));
    }

    #[test]
    fn generator_alternates_around_power_of_two() {
        let n = 1 << 10;
        let primes: Vec<u64> = NttPrimeGenerator::new(40, n).take(4).collect();
        let center = 1u64 << 40;
        assert!(primes[0] > center);
        assert!(primes[1] < center);
        assert!(primes[2] > primes[0]);
        assert!(primes[3] < primes[1]);
        for p in primes {
            assert!(is_ntt_friendly_prime(p, n));
        }
    }

    #[test]
    fn generated_chain_is_distinct() {
        let n = 1 << 10;
        let q = generate_ntt_primes(&[55, 45, 45, 45, 45], n, &[]);
        let p = generate_ntt_primes(&[61, 61], n, &q);
        let mut all = q.clone();
        all.extend(&p);
        let mut dedup = all.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), all.len());
        assert!((q[1] as f64 / (1u64 << 45) as f64 - 1.0).abs() < 1e-6);
    }
}
