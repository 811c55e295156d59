//! Bounded retry.

use std::time::Duration;

use crate::{BoxedError, Error, Result, TRACING_TARGET_PARALLEL};

/// Calls `task` until it succeeds, at most `attempts` times.
///
/// The calling thread sleeps `delay` between two attempts. A value of zero
/// for `attempts` is treated as a single attempt. When every attempt fails,
/// the last failure is returned as the source of a
/// [`crate::ErrorKind::RetriesExhausted`] error.
pub fn retry<F>(attempts: u32, delay: Duration, mut task: F) -> Result<()>
where
    F: FnMut() -> std::result::Result<(), BoxedError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match task() {
            Ok(()) => return Ok(()),
            Err(error) if attempt >= attempts => {
                return Err(Error::retries_exhausted()
                    .with_message(format!("gave up after {attempts} attempts"))
                    .with_source(error));
            }
            Err(error) => {
                tracing::debug!(
                    target: TRACING_TARGET_PARALLEL,
                    attempt,
                    attempts,
                    error = %error,
                    "Attempt failed, retrying"
                );
                attempt += 1;
                std::thread::sleep(delay);
            }
        }
    }
}
