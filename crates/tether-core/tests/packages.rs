// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Package and bundle integration tests

use std::collections::BTreeMap;
use std::sync::Arc;

use tether_core::{
    Assembler, Dependencies, FetchError, LoadState, Loader, LoaderConfig, MemoryFetcher,
    ModuleValue, ResolvedBy,
};
use tether_macros::{assert_ok, assert_pending, members, yield_turns};

fn bundling_loader(fetcher: &Arc<MemoryFetcher>) -> Loader {
    let config = LoaderConfig {
        bundle_packages: true,
        ..LoaderConfig::default()
    };
    Loader::with_config(config, fetcher.clone())
}

fn map(entries: &[(&str, &str)]) -> ModuleValue {
    ModuleValue::Map(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), ModuleValue::from(*v)))
            .collect(),
    )
}

#[tokio::test]
async fn test_package_resolves_after_all_members() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("x.js", "X");
    fetcher.insert("y.js", "Y");
    fetcher.gate("x.js");
    let loader = Loader::new(fetcher.clone());

    let package = assert_ok!(loader.define_package("p", members! { a: "x", b: "y" }, None));
    assert_eq!(assert_ok!(loader.get("p")).state, LoadState::Unloaded);
    assert_eq!(fetcher.total_fetches(), 0);

    let future = assert_ok!(loader.load(package.as_str()));
    yield_turns!();
    assert_pending!(future);
    assert_eq!(assert_ok!(loader.get("y")).state, LoadState::Loaded);

    fetcher.release("x.js");
    assert_eq!(future.await, Ok(map(&[("a", "X"), ("b", "Y")])));
}

#[tokio::test]
async fn test_list_members_keyed_by_last_segment() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("lib/button.js", "button");
    fetcher.insert("lib/theme.css", "theme");
    let loader = Loader::new(fetcher.clone());

    assert_ok!(loader.define_package("ui", vec!["lib/button", "text!lib/theme.css"], None));
    let value = assert_ok!(loader.require("ui")).await;
    assert_eq!(
        value,
        Ok(ModuleValue::List(vec![map(&[("button", "button"), ("theme", "theme")])]))
    );

    // Members are reachable through the package scope
    assert_eq!(assert_ok!(loader.get("ui/button")).value, ModuleValue::from("button"));
}

#[tokio::test]
async fn test_assembler_post_processes_map() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("one.js", "1");
    fetcher.insert("two.js", "2");
    let loader = Loader::new(fetcher.clone());

    let count: Assembler = Arc::new(|members: BTreeMap<String, ModuleValue>| {
        ModuleValue::from(members.len().to_string())
    });
    assert_ok!(loader.define_package("nums", vec!["one", "two"], Some(count)));
    assert_eq!(assert_ok!(loader.load("nums")).await, Ok(ModuleValue::from("2")));
}

#[tokio::test]
async fn test_bundle_declares_members_in_one_fetch() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("lib/late.js", "late");
    let loader = bundling_loader(&fetcher);

    let l = loader.clone();
    fetcher.insert_script("ui.bundle.js", move || {
        l.define("lib/early", Dependencies::none(), |_| ModuleValue::from("early"))
            .ok();
    });

    assert_ok!(loader.define_package("ui", vec!["lib/early", "lib/late"], None));
    let value = assert_ok!(loader.load("ui")).await;

    assert_eq!(value, Ok(map(&[("early", "early"), ("late", "late")])));
    assert_eq!(fetcher.fetch_count("ui.bundle.js"), 1);
    assert_eq!(fetcher.fetch_count("lib/early.js"), 0);
    assert_eq!(fetcher.fetch_count("lib/late.js"), 1);
}

#[tokio::test]
async fn test_failed_bundle_falls_back_to_members() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert_failure("ui.bundle.js", FetchError::Network("connection reset".into()));
    fetcher.insert("lib/a.js", "A");
    fetcher.insert("lib/b.js", "B");
    let loader = bundling_loader(&fetcher);

    assert_ok!(loader.define_package("ui", members! { a: "lib/a", b: "lib/b" }, None));
    let value = assert_ok!(loader.load("pkg!ui")).await;

    assert_eq!(value, Ok(map(&[("a", "A"), ("b", "B")])));
    assert_eq!(fetcher.fetch_count("ui.bundle.js"), 1);
    assert_eq!(fetcher.fetch_count("lib/a.js"), 1);
    assert_eq!(fetcher.fetch_count("lib/b.js"), 1);
    assert_eq!(assert_ok!(loader.get("ui")).state, LoadState::Loaded);
}

#[tokio::test]
async fn test_preload_marks_members_without_fetching() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let loader = Loader::new(fetcher.clone());

    assert_ok!(loader.preload("bundle", "m1, m2", None, Some(ModuleValue::Evaluated)));
    let future = assert_ok!(loader.require("m1, m2"));
    yield_turns!();
    assert_pending!(future);
    assert_eq!(fetcher.total_fetches(), 0);

    assert_ok!(loader.define("m1", Dependencies::none(), |_| ModuleValue::from("one")));
    assert_ok!(loader.define("m2", "m1", |values| values[0].clone()));
    assert_eq!(
        future.await,
        Ok(ModuleValue::List(vec![ModuleValue::from("one"), ModuleValue::from("one")]))
    );
    assert_eq!(fetcher.total_fetches(), 0);

    let log = loader.resolution_order();
    assert_eq!(log[0].via, ResolvedBy::Preloaded);
    assert_eq!(log[0].id, "bundle");
}
