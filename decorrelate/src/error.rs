use thiserror::Error;

pub type RewriteResult<T> = anyhow::Result<T>;

/// Faults raised for true invariant violations only.
///
/// An unsupported-but-well-formed query shape never produces an error: the
/// triggering node is returned unchanged and a diagnostic is recorded instead.
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("malformed plan: {0}")]
    MalformedPlan(String),
}
