//! Real-valued functions built on the polynomial evaluator: modular
//! reduction for bootstrapping, inversion, and sign-based comparisons.
//!
//! Components that can run out of levels take an optional
//! [`Bootstrapper`]. Without one, an under-leveled input is reported as
//! [`EvalError::MissingBootstrapper`].
pub mod comparison;
pub mod inverse;
pub mod minimax;
pub mod mod1;

pub use comparison::ComparisonEvaluator;
pub use inverse::{InverseEvaluator, goldschmidt_iterations};
pub use minimax::{MinimaxCompositePolynomial, MinimaxCompositePolynomialEvaluator};
pub use mod1::{Mod1Evaluator, Mod1Parameters, Mod1ParametersLiteral, Mod1Type};

use crate::errors::{EvalError, EvalResult};
use crate::he::{Bootstrapper, Element};
use tracing::debug;

/// Makes sure `ct` can absorb `depth` more levels, bootstrapping it when it
/// cannot. With a bootstrapper the margin also keeps the result above the
/// bootstrapper's minimum input level.
pub(crate) fn ensure_levels<C: Element>(
    bootstrapper: Option<&dyn Bootstrapper<C>>,
    ct: &mut C,
    depth: usize,
    operation: &'static str,
) -> EvalResult<()> {
    let Some(btp) = bootstrapper else {
        if ct.level() < depth {
            return Err(EvalError::MissingBootstrapper {
                operation,
                level: ct.level(),
                required: depth,
            });
        }
        return Ok(());
    };

    let required = depth + btp.minimum_input_level();
    if ct.level() >= required {
        return Ok(());
    }
    debug!(operation, level = ct.level(), required, "bootstrapping");
    *ct = btp.bootstrap(ct)?;
    if ct.level() < required {
        return Err(EvalError::InsufficientLevel {
            operation,
            level: ct.level(),
            required,
        });
    }
    Ok(())
}

/// [`ensure_levels`] for ciphertexts that must stay on the same level.
pub(crate) fn ensure_levels_many<C: Element>(
    bootstrapper: Option<&dyn Bootstrapper<C>>,
    cts: &mut [C],
    depth: usize,
    operation: &'static str,
) -> EvalResult<()> {
    let level = cts.iter().map(Element::level).min().unwrap_or(0);
    let Some(btp) = bootstrapper else {
        if level < depth {
            return Err(EvalError::MissingBootstrapper {
                operation,
                level,
                required: depth,
            });
        }
        return Ok(());
    };

    let required = depth + btp.minimum_input_level();
    if level >= required {
        return Ok(());
    }
    debug!(operation, level, required, count = cts.len(), "bootstrapping jointly");
    let refreshed = btp.bootstrap_many(cts)?;
    for (ct, new) in cts.iter_mut().zip(refreshed) {
        *ct = new;
    }
    let level = cts.iter().map(Element::level).min().unwrap_or(0);
    if level < required {
        return Err(EvalError::InsufficientLevel {
            operation,
            level,
            required,
        });
    }
    Ok(())
}
