//! Bounded, resumable task loop between a decision-maker and a fixed
//! capability set.
//!
//! The engine drives a stateful loop: render context from the session, ask
//! the decision adapter for exactly one action, validate it against the
//! capability registry, execute it, and record the (action, observation)
//! pair. The loop ends on completion, an iteration limit, or cancellation.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (session log, skill selection,
//!   shared types). No I/O, fully testable in isolation.
//! - **[`capability`]**: The closed capability set with schema validation;
//!   handlers own all task-visible side effects.
//! - **[`io`]**: Side-effecting boundaries (filesystem, process execution,
//!   persistence, the adapter transport). Isolated to enable fakes in tests.
//!
//! [`looping`] coordinates core logic with I/O to implement the `run`
//! command.

pub mod capability;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
