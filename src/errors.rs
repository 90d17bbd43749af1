use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{operation}: level {level} < {required} required levels")]
    InsufficientLevel {
        operation: &'static str,
        level: usize,
        required: usize,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("{operation} is not defined for ring type {ring}")]
    UnsupportedRing {
        operation: &'static str,
        ring: &'static str,
    },

    #[error("{operation}: unsupported operand, accepted: {accepted}")]
    UnsupportedOperand {
        operation: &'static str,
        accepted: &'static str,
    },

    #[error("power basis does not contain X^{power}")]
    MissingPowerBasis { power: usize },

    #[error(
        "{operation}: level {level} < {required} required levels and no bootstrapper is available"
    )]
    MissingBootstrapper {
        operation: &'static str,
        level: usize,
        required: usize,
    },

    #[error("{operation}: op0 scale {op_scale:.4e} > output scale {out_scale:.4e} is not supported")]
    ScalePrecondition {
        operation: &'static str,
        op_scale: f64,
        out_scale: f64,
    },

    #[error("{operation}: {source}")]
    Context {
        operation: &'static str,
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Wraps the error with the name of the operation that failed.
    pub fn context(self, operation: &'static str) -> Self {
        Self::Context {
            operation,
            source: Box::new(self),
        }
    }

    /// Strips every `Context` layer and returns the underlying error.
    pub fn root(&self) -> &EvalError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Adds `.context("op")` to any `EvalResult`.
pub trait ResultExt<T> {
    fn context(self, operation: &'static str) -> EvalResult<T>;
}

impl<T> ResultExt<T> for EvalResult<T> {
    fn context(self, operation: &'static str) -> EvalResult<T> {
        self.map_err(|e| e.context(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_root_error() {
        let err: EvalResult<()> = Err(EvalError::MissingPowerBasis { power: 1 });
        let err = err.context("evaluate").context("mod1").unwrap_err();
        assert_eq!(err.root(), &EvalError::MissingPowerBasis { power: 1 });
        assert_eq!(
            err.to_string(),
            "mod1: evaluate: power basis does not contain X^1"
        );
    }
}
