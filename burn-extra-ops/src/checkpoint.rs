//! # Activation Checkpointing
//!
//! In Burn, activation recomputation is a property of the autodiff backend rather
//! than of a module. `Autodiff<B, BalancedCheckpointing>` releases the outputs of
//! memory-bound operations after the forward pass and replays them during the
//! backward pass, for every module alike. `checkpoint` does not change that
//! behaviour: it evaluates `f(x)` unchanged and, when `x` is tracked by autodiff,
//! wraps the call in a `checkpoint` trace span so the region shows up in
//! profiles.

use burn::prelude::*;

/// Evaluates `f(x)`, inside a `checkpoint` trace span when `x` requires gradients.
pub fn checkpoint<B, F, const D: usize>(f: F, x: Tensor<B, D>) -> Tensor<B, D>
where
    B: Backend,
    F: FnOnce(Tensor<B, D>) -> Tensor<B, D>,
{
    if !x.is_require_grad() {
        return f(x);
    }

    let span = tracing::trace_span!("checkpoint", dims = ?x.dims());
    let _guard = span.enter();
    f(x)
}
