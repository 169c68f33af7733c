//! The tagged three-way result shared by every provisioner, CD driver, and remote-cluster call in
//! the stack.
//!
//! `Outcome` is deliberately not `Result<T, E>`: collapsing "not done yet, no error" into either
//! arm of `Result` forces callers to either treat pending work as an error (and trip backoff
//! policies meant for real failures) or silently swallow it as success. Keeping `Yield` a distinct
//! variant lets combinators in `nimbus-provisioner` propagate it untouched.

use std::fmt;

/// The outcome of one provision/deprovision step, or of a CD driver/remote-cluster call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<E> {
    /// The step completed; the desired state is observed.
    Ok,
    /// The step is not complete and no error occurred; requeue and try again later.
    Yield,
    /// The step failed outright.
    Err(E),
}

impl<E> Outcome<E> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }

    pub fn is_yield(&self) -> bool {
        matches!(self, Outcome::Yield)
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Outcome::Err(_))
    }

    /// Maps the error variant, leaving `Ok`/`Yield` untouched.
    pub fn map_err<E2>(self, f: impl FnOnce(E) -> E2) -> Outcome<E2> {
        match self {
            Outcome::Ok => Outcome::Ok,
            Outcome::Yield => Outcome::Yield,
            Outcome::Err(e) => Outcome::Err(f(e)),
        }
    }

    /// Converts a fallible step into an `Outcome`, with `Ok(())` becoming `Outcome::Ok`.
    pub fn from_result(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Outcome::Ok,
            Err(e) => Outcome::Err(e),
        }
    }
}

impl<E: fmt::Display> fmt::Display for Outcome<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => write!(f, "ok"),
            Outcome::Yield => write!(f, "yield"),
            Outcome::Err(e) => write!(f, "error: {e}"),
        }
    }
}

/// A data-bearing counterpart to [`Outcome`] for calls that produce a value on success (e.g.
/// [`nimbus_remote`]'s `Config()`, which returns a kubeconfig once one is discoverable). Kept as
/// a separate type rather than folding `T` into `Outcome` so call sites that never carry data
/// (the common case: provisioner `Provision`/`Deprovision`) don't pay for an unused type
/// parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueOutcome<T, E> {
    Ok(T),
    Yield,
    Err(E),
}

impl<T, E> ValueOutcome<T, E> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ValueOutcome::Ok(_))
    }

    pub fn is_yield(&self) -> bool {
        matches!(self, ValueOutcome::Yield)
    }

    pub fn is_err(&self) -> bool {
        matches!(self, ValueOutcome::Err(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ValueOutcome<U, E> {
        match self {
            ValueOutcome::Ok(v) => ValueOutcome::Ok(f(v)),
            ValueOutcome::Yield => ValueOutcome::Yield,
            ValueOutcome::Err(e) => ValueOutcome::Err(e),
        }
    }

    pub fn map_err<E2>(self, f: impl FnOnce(E) -> E2) -> ValueOutcome<T, E2> {
        match self {
            ValueOutcome::Ok(v) => ValueOutcome::Ok(v),
            ValueOutcome::Yield => ValueOutcome::Yield,
            ValueOutcome::Err(e) => ValueOutcome::Err(f(e)),
        }
    }

    /// Drops the value, keeping only which of ok/yield/err occurred — the shape a provisioner
    /// needs once it has consumed the value itself.
    pub fn discard_value(self) -> Outcome<E> {
        match self {
            ValueOutcome::Ok(_) => Outcome::Ok,
            ValueOutcome::Yield => Outcome::Yield,
            ValueOutcome::Err(e) => Outcome::Err(e),
        }
    }
}

/// Merges a batch of sibling outcomes (as produced by the `Concurrent` combinator) into one:
/// the first error wins outright, otherwise any yield wins, otherwise `Ok`.
///
/// This is "yield after all siblings settle" in data form: callers collect every sibling's
/// outcome (awaiting cancellation/completion for all of them) and only then call this function.
pub fn join<E>(outcomes: impl IntoIterator<Item = Outcome<E>>) -> Outcome<E> {
    let mut saw_yield = false;
    for outcome in outcomes {
        match outcome {
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Yield => saw_yield = true,
            Outcome::Ok => {}
        }
    }
    if saw_yield {
        Outcome::Yield
    } else {
        Outcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_prefers_error_over_yield() {
        let result = join(vec![Outcome::Yield, Outcome::Err("boom"), Outcome::Ok]);
        assert_eq!(result, Outcome::Err("boom"));
    }

    #[test]
    fn join_yields_if_any_sibling_yields() {
        let result: Outcome<&str> = join(vec![Outcome::Ok, Outcome::Yield, Outcome::Ok]);
        assert_eq!(result, Outcome::Yield);
    }

    #[test]
    fn join_all_ok_is_ok() {
        let result: Outcome<&str> = join(vec![Outcome::Ok, Outcome::Ok]);
        assert_eq!(result, Outcome::Ok);
    }

    #[test]
    fn join_empty_is_ok() {
        let result: Outcome<&str> = join(Vec::new());
        assert_eq!(result, Outcome::Ok);
    }
}
