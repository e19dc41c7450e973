use thiserror::Error;

/// Unrecoverable pipeline failures. Everything else (bad path data, broken
/// paint references, structural cycles) is absorbed and the render continues.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("scene stack mismatch while closing group for <{element}>: expected {expected:?}, top of stack is {found:?}")]
    StackInvariant {
        element: String,
        expected: usize,
        found: Option<usize>,
    },

    #[error("renderer cache used before initialization")]
    CacheUninitialized,

    #[error("render context used before initialization")]
    ContextUninitialized,
}
