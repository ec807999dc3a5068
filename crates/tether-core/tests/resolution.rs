// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resolution engine integration tests
//!
//! Fetches are served by `MemoryFetcher`; gates hold individual URLs so
//! tests can choose the order in which resources arrive.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tether_core::{
    Dependencies, Dependent, FetchError, LoadError, LoadState, Loader, LoaderConfig,
    MemoryFetcher, ModuleId, ModuleValue, ResolvedBy,
};
use tether_macros::{assert_err, assert_matches, assert_ok, assert_pending, deps, factory, yield_turns};

fn text(values: &[ModuleValue]) -> ModuleValue {
    let parts: Vec<_> = values.iter().map(ToString::to_string).collect();
    ModuleValue::from(parts.concat())
}

#[tokio::test]
async fn test_get_returns_same_node() {
    let loader = Loader::new(Arc::new(MemoryFetcher::new()));
    let first = assert_ok!(loader.get("app/main"));
    let second = assert_ok!(loader.get("./app/lib/../main"));
    assert_eq!(first.id, second.id);
    assert_eq!(loader.with_registry(|r| r.len()), 1);
}

#[tokio::test]
async fn test_factory_waits_for_every_dependency() {
    let fetcher = Arc::new(MemoryFetcher::new());
    for (url, value) in [("a.js", "A"), ("b.js", "B"), ("c.js", "C")] {
        fetcher.insert(url, value);
        fetcher.gate(url);
    }
    let loader = Loader::new(fetcher.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let future = assert_ok!(loader.define("x", deps!["a", "b", "c"], move |values| {
        counter.fetch_add(1, Ordering::SeqCst);
        text(values)
    }));

    // Arrive in reverse order
    for url in ["c.js", "b.js"] {
        fetcher.release(url);
        yield_turns!();
        assert_pending!(future);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    fetcher.release("a.js");
    assert_eq!(future.await, Ok(ModuleValue::from("ABC")));
    yield_turns!();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_require_empty_settles_before_returning() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let loader = Loader::new(fetcher.clone());

    let future = assert_ok!(loader.require(Dependencies::none()));
    assert_eq!(future.try_get(), Some(Ok(ModuleValue::List(Vec::new()))));
    assert_eq!(fetcher.total_fetches(), 0);
}

#[tokio::test]
async fn test_require_loaded_modules_settles_before_returning() {
    let loader = Loader::new(Arc::new(MemoryFetcher::new()));
    assert_ok!(loader.define("a", Dependencies::none(), |_| ModuleValue::from("A")));

    let future = assert_ok!(loader.require_with("a", |values| values[0].clone()));
    assert_eq!(future.try_get(), Some(Ok(ModuleValue::from("A"))));
    assert_eq!(loader.with_registry(|r| r.pending_waiters()), 0);
}

#[tokio::test]
async fn test_concurrent_loads_fetch_once() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("shared.js", "S");
    let loader = Loader::new(fetcher.clone());

    let first = assert_ok!(loader.load("shared"));
    let second = assert_ok!(loader.load("shared"));
    let required = assert_ok!(loader.require("shared"));
    let defined = assert_ok!(loader.define("user", "shared", text));

    assert_eq!(first.await, Ok(ModuleValue::from("S")));
    assert_eq!(second.await, Ok(ModuleValue::from("S")));
    assert_eq!(required.await, Ok(ModuleValue::List(vec![ModuleValue::from("S")])));
    assert_eq!(defined.await, Ok(ModuleValue::from("S")));
    assert_eq!(fetcher.fetch_count("shared.js"), 1);
}

#[tokio::test]
async fn test_require_passes_values_in_caller_order() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("a.js", "A");
    fetcher.insert("b.js", "B");
    let loader = Loader::new(fetcher.clone());

    let future = assert_ok!(loader.require_with(deps!["b", "a", "b"], |values| text(values)));
    assert_eq!(future.await, Ok(ModuleValue::from("BAB")));
    assert_eq!(fetcher.fetch_count("b.js"), 1);
    assert_eq!(loader.with_registry(|r| r.pending_waiters()), 0);
}

#[tokio::test]
async fn test_cycle_never_resolves() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let loader = Loader::new(fetcher.clone());

    let l = loader.clone();
    fetcher.insert_script("a.js", move || {
        l.define("a", "b", text).ok();
    });
    let l = loader.clone();
    fetcher.insert_script("b.js", move || {
        l.define("b", "a", text).ok();
    });

    let future = assert_ok!(loader.require("a"));
    yield_turns!(32);

    assert_pending!(future);
    assert_eq!(assert_ok!(loader.get("a")).state, LoadState::Loading);
    assert_eq!(assert_ok!(loader.get("b")).state, LoadState::Loading);
    assert_eq!(loader.cycles(), vec![vec![ModuleId::new("a"), ModuleId::new("b")]]);
}

#[tokio::test]
async fn test_failure_stays_local_until_reload() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert_failure("d.js", FetchError::NotFound("d.js".into()));
    let loader = Loader::new(fetcher.clone());

    let x = assert_ok!(loader.define("x", "d", text));
    yield_turns!();

    let d = assert_ok!(loader.get("d"));
    assert_eq!(d.state, LoadState::Failed);
    assert_matches!(d.failure, Some(LoadError::Fetch { ref id, .. }) if id == "d");
    assert_eq!(assert_ok!(loader.get("x")).state, LoadState::Loading);
    assert_pending!(x);

    // A plain load reports the failed attempt without refetching
    let failed = assert_ok!(loader.load("d"));
    assert_err!(failed.await);
    assert_eq!(fetcher.fetch_count("d.js"), 1);

    fetcher.insert("d.js", "D");
    let retried = assert_ok!(loader.reload("d"));
    assert_eq!(retried.await, Ok(ModuleValue::from("D")));
    assert_eq!(x.await, Ok(ModuleValue::from("D")));
    assert_eq!(fetcher.fetch_count("d.js"), 2);
}

#[tokio::test]
async fn test_prefix_substitution() {
    let loader = Loader::new(Arc::new(MemoryFetcher::new()));
    loader.set_prefix("APP", "/app/");

    let normalized = assert_ok!(loader.normalize("{APP}widgets/Foo"));
    assert_eq!(normalized.canonical, "/app/widgets/Foo");
    assert_eq!(normalized.url, "/app/widgets/Foo.js");

    let again = assert_ok!(loader.normalize(normalized.canonical.as_str()));
    assert_eq!(again.canonical, normalized.canonical);
}

#[tokio::test]
async fn test_redefinition_augments_dependents() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("x.js", "X");
    fetcher.insert("y.js", "Y");
    fetcher.gate("x.js");
    let loader = Loader::new(fetcher.clone());

    let _ = assert_ok!(loader.define("a", "x", text));
    let b = assert_ok!(loader.define("b", "x", text));
    let a = assert_ok!(loader.define("a", "x, y", text));

    let dependents = loader.with_registry(|r| r.dependents_of(&ModuleId::new("x")));
    assert!(dependents.contains(&Dependent::Module(ModuleId::new("a"))));
    assert!(dependents.contains(&Dependent::Module(ModuleId::new("b"))));

    fetcher.release("x.js");
    assert_eq!(a.await, Ok(ModuleValue::from("XY")));
    assert_eq!(b.await, Ok(ModuleValue::from("X")));
}

#[tokio::test]
async fn test_code_declares_itself_while_loading() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("util.js", "U");
    let loader = Loader::new(fetcher.clone());

    let l = loader.clone();
    fetcher.insert_script("app.js", move || {
        l.define("app", "util", |values| {
            ModuleValue::from(format!("app({})", values[0]))
        })
        .ok();
    });

    let value = assert_ok!(loader.require("app")).await;
    assert_eq!(value, Ok(ModuleValue::List(vec![ModuleValue::from("app(U)")])));
    assert_eq!(fetcher.fetch_count("app.js"), 1);
}

#[tokio::test]
async fn test_declared_module_survives_failed_fetch_of_its_file() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.gate("x.js");
    fetcher.insert("d.js", "D");
    fetcher.gate("d.js");
    let loader = Loader::new(fetcher.clone());

    let required = assert_ok!(loader.require("x"));
    yield_turns!();
    // Declared inline while its own file is still in flight
    let defined = assert_ok!(loader.define("x", "d", |values| values[0].clone()));

    fetcher.release("x.js");
    yield_turns!();
    let info = assert_ok!(loader.get("x"));
    assert_eq!(info.state, LoadState::Loading);
    assert!(info.failure.is_none());
    assert_pending!(defined);

    fetcher.release("d.js");
    assert_eq!(defined.await, Ok(ModuleValue::from("D")));
    assert_eq!(assert_ok!(loader.load("x")).await, Ok(ModuleValue::from("D")));
    assert_eq!(
        required.await,
        Ok(ModuleValue::List(vec![ModuleValue::from("D")]))
    );
    assert_eq!(fetcher.fetch_count("x.js"), 1);
}

#[tokio::test]
async fn test_declaration_without_factory_keeps_fetched_value() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("util.js", "U");
    let loader = Loader::new(fetcher.clone());

    let l = loader.clone();
    fetcher.insert_script("widget.js", move || {
        l.declare("widget", "util").ok();
    });

    let value = assert_ok!(loader.load("widget")).await;
    assert_eq!(value, Ok(ModuleValue::Evaluated));

    let entry = loader
        .resolution_order()
        .into_iter()
        .find(|entry| entry.id == "widget")
        .unwrap();
    assert_eq!(entry.via, ResolvedBy::Resource);
    assert_eq!(fetcher.fetch_count("util.js"), 1);
}

#[tokio::test]
async fn test_code_without_declaration_resolves_to_marker() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert_script("legacy.js", || {});
    let loader = Loader::new(fetcher.clone());

    let value = assert_ok!(loader.load("legacy")).await;
    assert_eq!(value, Ok(ModuleValue::Evaluated));
}

#[tokio::test]
async fn test_empty_factory_result_still_resolves() {
    let loader = Loader::new(Arc::new(MemoryFetcher::new()));
    let future = assert_ok!(loader.define("blank", Dependencies::none(), |_| ModuleValue::Undefined));
    assert_eq!(future.try_get(), Some(Ok(ModuleValue::Undefined)));
    assert_eq!(assert_ok!(loader.get("blank")).state, LoadState::Loaded);
}

#[tokio::test]
async fn test_factory_macro_binds_arguments() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("first.js", "1");
    fetcher.insert("second.js", "2");
    let loader = Loader::new(fetcher.clone());

    let sum = factory!(|first, second| ModuleValue::from(format!("{}+{}", first, second)));
    let future = assert_ok!(loader.preload("sum", deps!["first", "second"], Some(sum), None));
    // Preloaded dependencies are never fetched; serve them by definition
    assert_ok!(loader.define("first", Dependencies::none(), |_| ModuleValue::from("1")));
    assert_ok!(loader.define("second", Dependencies::none(), |_| ModuleValue::from("2")));

    assert_eq!(future.await, Ok(ModuleValue::from("1+2")));
    assert_eq!(fetcher.total_fetches(), 0);
}

#[tokio::test]
async fn test_fetch_limit_caps_in_flight() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let names = ["m1", "m2", "m3", "m4", "m5"];
    for name in names {
        let url = format!("{}.js", name);
        fetcher.insert(&url, name);
        fetcher.gate(&url);
    }
    let config = LoaderConfig {
        max_concurrent_fetches: 2,
        ..LoaderConfig::default()
    };
    let loader = Loader::with_config(config, fetcher.clone());

    let future = assert_ok!(loader.require(names.as_slice()));
    yield_turns!();
    assert_pending!(future);

    for name in names {
        fetcher.release(&format!("{}.js", name));
    }
    let values = assert_ok!(future.await);
    assert_eq!(values.to_string(), r#"["m1","m2","m3","m4","m5"]"#);
    assert_eq!(fetcher.peak_in_flight(), 2);
}

#[tokio::test]
async fn test_cache_token_applies_to_fetches() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("a.js", "A");
    let loader = Loader::new(fetcher.clone());
    loader.set_cache_token(Some("v=7".into()));

    assert_eq!(assert_ok!(loader.normalize("a")).url, "a.js?v=7");
    assert_eq!(assert_ok!(loader.normalize("a?v=7")).url, "a.js?v=7");
    assert_eq!(assert_ok!(loader.load("a")).await, Ok(ModuleValue::from("A")));
    assert_eq!(fetcher.fetch_count("a.js"), 1);
}

#[tokio::test]
async fn test_invalid_identifier_is_synchronous_error() {
    let loader = Loader::new(Arc::new(MemoryFetcher::new()));
    assert_err!(loader.require("ok, bad id"));
    assert_err!(loader.load(""));
    assert_eq!(loader.with_registry(|r| r.len()), 0);
}
