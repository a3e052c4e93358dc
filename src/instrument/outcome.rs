use std::fmt;

/// What a returned value means for the terminal record.
pub enum Outcome<'a> {
    /// A successful value, logged through its `Debug` form.
    Value(&'a dyn fmt::Debug),
    /// A lazily produced body that must not be rendered or consumed.
    Streaming,
    /// A failure carried in the return value, such as `Err(e)`.
    Failed(&'a dyn Failure),
}

/// Errors reported by an instrumented call.
///
/// `Display` is logged by default, `Debug` when diagnostics are enabled.
pub trait Failure: fmt::Display + fmt::Debug {}

impl<T: fmt::Display + fmt::Debug + ?Sized> Failure for T {}

/// Return types an instrumented callable may produce.
///
/// Implemented for `Result`, `Option`, `Vec`, the primitives, strings and
/// [`StreamingResponse`]. Use [`impl_call_outcome!`](crate::impl_call_outcome)
/// for plain `Debug` types of your own.
pub trait CallOutcome {
    fn outcome(&self) -> Outcome<'_>;
}

/// Implement [`CallOutcome`] for types that are always a successful value.
#[macro_export]
macro_rules! impl_call_outcome {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::CallOutcome for $ty {
                fn outcome(&self) -> $crate::Outcome<'_> {
                    $crate::Outcome::Value(self)
                }
            }
        )*
    };
}

impl_call_outcome!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &str, serde_json::Value,
);

impl<T: CallOutcome, E: Failure> CallOutcome for Result<T, E> {
    fn outcome(&self) -> Outcome<'_> {
        match self {
            Ok(value) => value.outcome(),
            Err(error) => Outcome::Failed(error),
        }
    }
}

impl<T: fmt::Debug> CallOutcome for Option<T> {
    fn outcome(&self) -> Outcome<'_> {
        Outcome::Value(self)
    }
}

impl<T: fmt::Debug> CallOutcome for Vec<T> {
    fn outcome(&self) -> Outcome<'_> {
        Outcome::Value(self)
    }
}

/// A response whose body is produced lazily, e.g. an iterator or stream of
/// chunks. Instrumentation never reads the body.
pub struct StreamingResponse<S> {
    body: S,
}

impl<S> StreamingResponse<S> {
    pub fn new(body: S) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &S {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut S {
        &mut self.body
    }

    pub fn into_body(self) -> S {
        self.body
    }
}

impl<S> fmt::Debug for StreamingResponse<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamingResponse")
    }
}

impl<S> CallOutcome for StreamingResponse<S> {
    fn outcome(&self) -> Outcome<'_> {
        Outcome::Streaming
    }
}
