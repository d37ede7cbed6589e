//! Selector grammar for reelflow step inputs and archive targets.
//!
//! A selector is a string starting with `@` that references another step
//! (`@step-3:output`), the enclosing loop (`@parent:item`), or a filtered set
//! of input resources (`@resources:videos:duration>60`). Parsing produces a
//! typed [`Selector`] with a [`ParamBundle`] and a [`SelectorTarget`].
//!
//! # Example
//! ```
//! use reelflow_selector::{Selector, SelectorOutput, SelectorTarget};
//!
//! let sel = Selector::parse("@step-3:output").unwrap();
//! assert_eq!(sel.target(), &SelectorTarget::Step { id: 3, output: true });
//! assert_eq!(sel.expected_output(), SelectorOutput::Content);
//! ```

pub mod ast;
pub mod filter;
mod parser;
pub mod registry;

pub use ast::*;
pub use filter::ResourceFilter;
pub use registry::{SelectorRegistry, SelectorSpec, TokenParser};
