//! Progress reporting with cancellation.

use crate::error::ProcessError;

/// A progress sink mapped onto a sub-range of the caller's `[0, 1]` range.
///
/// The callback receives the overall completion fraction and returns `false`
/// to cancel, which surfaces as [`ProcessError::Interrupted`].
pub struct Progress<'a> {
    sink: &'a mut dyn FnMut(f64) -> bool,
    start: f64,
    end: f64,
}

impl<'a> Progress<'a> {
    /// Progress over the full `[0, 1]` range.
    pub fn new(sink: &'a mut dyn FnMut(f64) -> bool) -> Self {
        Self {
            sink,
            start: 0.0,
            end: 1.0,
        }
    }

    /// Report completion of `fraction` of this range.
    pub fn report(&mut self, fraction: f64) -> Result<(), ProcessError> {
        let value = self.start + (self.end - self.start) * fraction.clamp(0.0, 1.0);
        if (self.sink)(value) {
            Ok(())
        } else {
            Err(ProcessError::Interrupted)
        }
    }

    /// A child covering `[from, to]` of this range.
    pub fn scoped(&mut self, from: f64, to: f64) -> Progress<'_> {
        let span = self.end - self.start;
        Progress {
            start: self.start + span * from,
            end: self.start + span * to,
            sink: &mut *self.sink,
        }
    }
}
