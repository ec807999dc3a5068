// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Module declaration macros.
//!
//! These expand to `tether_core` paths, so the calling crate must depend
//! on `tether-core`.

/// Build a `Dependencies` list.
///
/// Plain identifiers give positional dependencies; `"key" => "id"` pairs
/// give named ones.
///
/// # Example
///
/// ```ignore
/// use tether_macros::deps;
///
/// let positional = deps!["app/util", "css!theme"];
/// let named = deps! { "button" => "lib/button", "theme" => "css!theme" };
/// assert_eq!(positional.len(), 2);
/// assert_eq!(named.len(), 2);
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        ::tether_core::Dependencies::none()
    };
    ($($name:literal => $id:expr),+ $(,)?) => {
        ::tether_core::Dependencies::named(::std::vec![$(($name, $id)),+])
    };
    ($($id:expr),+ $(,)?) => {
        ::tether_core::Dependencies::from(::std::vec![$($id),+])
    };
}

/// Build named package members.
///
/// # Example
///
/// ```ignore
/// use tether_macros::members;
///
/// let members = members! { button: "lib/button", theme: "css!theme" };
/// loader.define_package("ui", members, None)?;
/// ```
#[macro_export]
macro_rules! members {
    ($($key:ident : $id:expr),* $(,)?) => {
        ::tether_core::Dependencies::named(::std::vec![$((stringify!($key), $id)),*])
    };
}

/// Build a `Factory` whose parameters bind the dependency values in
/// declaration order. Missing values bind as `ModuleValue::Undefined`.
///
/// # Example
///
/// ```ignore
/// use tether_macros::factory;
///
/// let join = factory!(|a, b| {
///     let text = format!("{}{}", a, b);
///     ModuleValue::from(text)
/// });
/// loader.preload("joined", deps!["a", "b"], Some(join), None)?;
/// ```
#[macro_export]
macro_rules! factory {
    (|$($arg:ident),*| $body:expr) => {{
        let factory: ::tether_core::Factory = ::std::sync::Arc::new(
            move |values: &[::tether_core::ModuleValue]| {
                #[allow(unused_mut, unused_variables)]
                let mut values = values.iter().cloned();
                $(let $arg: ::tether_core::ModuleValue = values.next().unwrap_or_default();)*
                $body
            },
        );
        factory
    }};
}
