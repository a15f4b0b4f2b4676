//! # PartKit - Part Composition Kernel
//!
//! A small kernel for composing applications out of *parts*: named units with
//! explicit dependency lists and async factories.
//!
//! ## Features
//!
//! - **Explicit**: a part lists the parts it depends on; nothing is discovered implicitly
//! - **Singleton outputs**: every factory runs at most once, outputs are shared by identity
//! - **Fail fast**: missing and cyclic dependencies are reported before any factory runs
//! - **Hookable**: [`Function`] and [`Trigger`] carry ordered `before`/`after` chains
//!
//! ## Example
//!
//! ```rust,ignore
//! use partkit::{application_part, run, Part, RunOptions, ShutdownOptions};
//!
//! let app = application_part("demo");
//! let greeter = Part::new("greeter", [app.dep()], {
//!     let app = app.clone();
//!     move |deps| {
//!         let app = app.clone();
//!         async move {
//!             let application = deps.get(&app)?;
//!             application.on_start().on_fn("greet", |_| async {
//!                 tracing::info!("hello");
//!                 Ok(())
//!             });
//!             Ok(())
//!         }
//!     }
//! });
//!
//! run(vec![greeter.erase(), app.erase()], &app, RunOptions {
//!     shutdown: ShutdownOptions::Signals,
//! })
//! .await?;
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod application;
pub mod function;
pub mod merge;
pub mod part;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod trigger;

pub use application::{application_part, Application};
pub use function::{AfterCall, Function};
pub use part::{AnyPart, DepRef, Deps, Part, PartId, PartKey, PartToken, Resolved};
pub use registry::Registry;
pub use resolver::{resolve_application, ResolveError, Resolver};
pub use runtime::{run, RunOptions, ShutdownOptions};
pub use trigger::Trigger;
