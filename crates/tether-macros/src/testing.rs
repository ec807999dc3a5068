// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Testing helper macros.
//!
//! Provides macros for writing loader tests.

/// Assert that an expression matches a pattern.
///
/// # Example
///
/// ```
/// use tether_macros::assert_matches;
///
/// #[derive(Debug)]
/// enum State { Loading, Loaded(u32) }
///
/// let state = State::Loaded(3);
/// assert_matches!(state, State::Loaded(n) if n > 0);
/// ```
#[macro_export]
macro_rules! assert_matches {
    ($expr:expr, $pat:pat) => {
        match $expr {
            $pat => {}
            ref e => panic!(
                "assertion failed: `{}` does not match pattern `{}`\n  value: {:?}",
                stringify!($expr),
                stringify!($pat),
                e
            ),
        }
    };
    ($expr:expr, $pat:pat if $guard:expr) => {
        match $expr {
            $pat if $guard => {}
            ref e => panic!(
                "assertion failed: `{}` does not match pattern `{} if {}`\n  value: {:?}",
                stringify!($expr),
                stringify!($pat),
                stringify!($guard),
                e
            ),
        }
    };
}

/// Assert that a Result is Ok and extract the value.
///
/// # Example
///
/// ```
/// use tether_macros::assert_ok;
///
/// let value = assert_ok!("42".parse::<u32>());
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!(
                "assertion failed: expected Ok, got Err\n  expression: `{}`\n  error: {:?}",
                stringify!($expr),
                e
            ),
        }
    };
}

/// Assert that a Result is Err and extract the error.
///
/// # Example
///
/// ```
/// use tether_macros::assert_err;
///
/// let err = assert_err!("x".parse::<u32>());
/// assert!(!err.to_string().is_empty());
/// ```
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!(
                "assertion failed: expected Err, got Ok\n  expression: `{}`\n  value: {:?}",
                stringify!($expr),
                v
            ),
            Err(e) => e,
        }
    };
}

/// Assert that a module future has not settled.
///
/// # Example
///
/// ```ignore
/// use tether_macros::assert_pending;
///
/// let future = loader.require("never/served")?;
/// assert_pending!(future);
/// ```
#[macro_export]
macro_rules! assert_pending {
    ($future:expr) => {
        if let Some(outcome) = $future.try_get() {
            panic!(
                "assertion failed: `{}` settled early\n  outcome: {:?}",
                stringify!($future),
                outcome
            );
        }
    };
}

/// Give spawned tasks a bounded number of scheduler turns.
///
/// Requires `tokio` and must be used inside an async context.
///
/// # Example
///
/// ```ignore
/// use tether_macros::yield_turns;
///
/// yield_turns!(16);
/// assert_pending!(future);
/// ```
#[macro_export]
macro_rules! yield_turns {
    () => {
        $crate::yield_turns!(16)
    };
    ($turns:expr) => {
        for _ in 0..$turns {
            ::tokio::task::yield_now().await;
        }
    };
}
