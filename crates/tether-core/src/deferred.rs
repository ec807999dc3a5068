// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! At-most-once settlement for load attempts
//!
//! A [`Deferred`] is the producer side: the engine settles it exactly once
//! with either a value or a [`LoadError`]. Any number of [`ModuleFuture`]s
//! observe it; one created after settlement completes on its first poll.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::LoadError;
use crate::value::ModuleValue;

/// Outcome of a load attempt
pub type Outcome = std::result::Result<ModuleValue, LoadError>;

/// Producer side of a settlement
#[derive(Clone)]
pub struct Deferred {
    tx: Arc<watch::Sender<Option<Outcome>>>,
    label: Arc<str>,
}

impl Deferred {
    /// Create an unsettled deferred; `label` names it in errors
    pub fn new(label: &str) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            label: Arc::from(label),
        }
    }

    /// Create a deferred that is already settled
    pub fn settled(label: &str, outcome: Outcome) -> Self {
        let deferred = Self::new(label);
        deferred.settle(outcome);
        deferred
    }

    /// Settle with an outcome. Returns `false` if it was already settled.
    pub fn settle(&self, outcome: Outcome) -> bool {
        self.tx.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    /// Whether an outcome has been recorded
    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The outcome, if settled
    pub fn peek(&self) -> Option<Outcome> {
        self.tx.borrow().clone()
    }

    /// A future observing this settlement
    pub fn future(&self) -> ModuleFuture {
        ModuleFuture {
            rx: self.tx.subscribe(),
            label: self.label.clone(),
        }
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("label", &self.label)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Consumer side of a settlement; `.await` it for the outcome
pub struct ModuleFuture {
    rx: watch::Receiver<Option<Outcome>>,
    label: Arc<str>,
}

impl ModuleFuture {
    /// The outcome, without waiting
    pub fn try_get(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }

    /// Whether the outcome is available
    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the outcome
    pub async fn wait(mut self) -> Outcome {
        let label = self.label.clone();
        match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot
                .clone()
                .unwrap_or_else(|| Err(LoadError::Abandoned(label.to_string()))),
            Err(_) => Err(LoadError::Abandoned(label.to_string())),
        }
    }
}

impl IntoFuture for ModuleFuture {
    type Output = Outcome;
    type IntoFuture = BoxFuture<'static, Outcome>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}

impl std::fmt::Debug for ModuleFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFuture")
            .field("label", &self.label)
            .field("settled", &self.is_settled())
            .finish()
    }
}
