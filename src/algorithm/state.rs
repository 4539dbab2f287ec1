//! Owned per-step working state.

use std::any::Any;
use std::fmt;

use super::descriptor::{FreeFn, UserData};

/// Working state allocated by an algorithm's `init`.
///
/// Dropping the guard hands the state to the algorithm's `free` callback, or
/// simply drops it when the algorithm registered none.
#[derive(Default)]
pub struct WorkingState {
    state: Option<Box<dyn Any + Send>>,
    free: Option<FreeFn>,
    user_data: Option<UserData>,
}

impl WorkingState {
    pub fn new(
        state: Option<Box<dyn Any + Send>>,
        free: Option<FreeFn>,
        user_data: Option<UserData>,
    ) -> Self {
        Self {
            state,
            free,
            user_data,
        }
    }

    pub fn is_some(&self) -> bool {
        self.state.is_some()
    }

    pub fn get_mut(&mut self) -> Option<&mut (dyn Any + Send)> {
        self.state.as_deref_mut()
    }
}

impl Drop for WorkingState {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            match &self.free {
                Some(free) => free(self.user_data.as_deref(), state),
                None => drop(state),
            }
        }
    }
}

impl fmt::Debug for WorkingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingState")
            .field("allocated", &self.state.is_some())
            .field("has_free", &self.free.is_some())
            .finish()
    }
}
