//! # furnish: type-directed dependency resolution for Rust
//!
//! Ask for a type, get a fully constructed value. Values come from
//! registered factories, or are assembled structurally: pointers are
//! allocated, public record fields furnished one by one, sequences
//! collected from every matching factory. Services are cached per named,
//! nested scope and closed with it.
//!
//! ```
//! use std::sync::Arc;
//! use furnish::prelude::*;
//! use furnish::Furnish;
//!
//! #[derive(Furnish)]
//! pub struct Greeting {
//!     pub name: Arc<str>,
//!     pub times: Option<u8>,
//! }
//!
//! let mut config = Configuration::new();
//! config.value(Arc::<str>::from("world"));
//! config.value(2u8);
//!
//! let ctx = config.install(&Context::new());
//! let greeting: Greeting = ctx.resolve().unwrap();
//! assert_eq!(&*greeting.name, "world");
//! assert_eq!(greeting.times, Some(2));
//! ```

pub use furnish_container::*;
pub use furnish_derive::*;
pub use furnish_support::*;
