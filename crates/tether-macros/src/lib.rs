// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Declarative macros for the tether module loader.
//!
//! # Macros Overview
//!
//! ## Declaring modules
//! - [`deps!`] - Positional or named dependency lists
//! - [`members!`] - Named package members
//! - [`factory!`] - Factories binding dependency values to parameters
//!
//! ## Testing
//! - [`assert_matches!`] - Assert a value matches a pattern
//! - [`assert_ok!`] / [`assert_err!`] - Unwrap a Result in tests
//! - [`assert_pending!`] - Assert a module future has not settled
//! - [`yield_turns!`] - Drive spawned fetches for a bounded number of turns
//!
//! # Examples
//!
//! ```ignore
//! use tether_macros::*;
//!
//! loader.preload("sum", deps!["a", "b"], Some(factory!(|a, b| {
//!     ModuleValue::from(format!("{}{}", a, b))
//! })), None)?;
//!
//! let future = loader.require("sum")?;
//! yield_turns!();
//! assert_pending!(future);
//! ```

#![warn(missing_docs)]

mod module;
mod testing;

#[cfg(test)]
mod tests {
    use crate::{assert_err, assert_matches, assert_ok};

    #[derive(Debug, PartialEq)]
    enum Phase {
        Waiting(usize),
        Done,
    }

    #[test]
    fn test_assert_matches_with_guard() {
        assert_matches!(Phase::Waiting(2), Phase::Waiting(n) if n > 1);
        assert_matches!(Phase::Done, Phase::Done);
    }

    #[test]
    #[should_panic(expected = "does not match pattern")]
    fn test_assert_matches_panics() {
        assert_matches!(Phase::Done, Phase::Waiting(_));
    }

    #[test]
    fn test_assert_ok_and_err() {
        let ok: Result<u32, String> = Ok(7);
        assert_eq!(assert_ok!(ok), 7);

        let err: Result<u32, String> = Err("missing".into());
        assert_eq!(assert_err!(err), "missing");
    }

    #[test]
    #[should_panic(expected = "expected Err, got Ok")]
    fn test_assert_err_panics_on_ok() {
        let ok: Result<u32, String> = Ok(1);
        assert_err!(ok);
    }
}
