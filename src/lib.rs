pub mod backends;
pub mod errors;
pub mod he;
pub mod hefloat;
pub mod math;
pub mod params;
pub mod polynomial;
pub mod scale;

pub use errors::{EvalError, EvalResult, ResultExt};
pub use he::{
    Arithmetic, Bootstrapper, Element, Encoder, Hoisting, LinearTransformationEvaluator, Operand,
    PolynomialEvaluator, Rotation,
};
pub use params::{Parameters, ParametersBuilder, Precision, RingType};
pub use polynomial::{Basis, Polynomial, PolynomialVector};
pub use scale::Scale;
