pub mod chebyshev;
pub mod linalg;
pub mod primes;
pub mod remez;

pub use chebyshev::{chebyshev_approximation, chebyshev_nodes, clenshaw};
pub use primes::{NttPrimeGenerator, generate_ntt_primes, is_ntt_friendly_prime, is_prime};
pub use remez::{OddMinimax, odd_sign_minimax};
