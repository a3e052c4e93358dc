//! Call instrumentation.
//!
//! A wrapped callable keeps the exact calling contract of its target. Each
//! invocation emits a `→ started` record, optionally runs inside a span, and
//! ends with exactly one terminal record: `← finished`, `❌ ←→ error`, or
//! `⊘ cancelled` when an in-flight future is dropped.
//!
//! Synchronous targets go through [`SyncTarget`] and asynchronous ones
//! through [`AsyncTarget`]; which one applies is decided by the constructor
//! the caller picks, so a future-returning function cannot be wrapped as a
//! synchronous one.

pub mod call;
pub mod outcome;
pub mod record;
pub mod settings;
pub mod wrapper;

pub use call::{CallContext, InstrumentedCall, Launch, Ports, Prepared};
pub use outcome::{CallOutcome, Failure, Outcome, StreamingResponse};
pub use record::{
    CANCELLED, CallRecord, CallSite, FAILED, FINISHED, OutcomeKind, OutcomeRecord, STARTED,
    STREAMING_PLACEHOLDER, render_capped, snapshot,
};
pub use settings::InstrumentationSettings;
pub use wrapper::{AsyncTarget, Deferred, SyncTarget, Wrapper};
