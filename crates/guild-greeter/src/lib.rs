//! guild-greeter: the hello handler and its template resolver.
//!
//! ```text
//! request body ──► parse_name() ──┐
//!                                 ├──► GreetingTemplate::render() ──► "Hello, Ada!"
//! ParameterStore ──► resolve() ───┘
//! ```
//!
//! Neither step can fail: an unreadable parameter falls back to the
//! built-in template, and an unusable name falls back to the default name.

pub mod handler;
pub mod resolver;

pub use handler::{Greeter, parse_name};
pub use resolver::{ConfigResolver, GreetingTemplate, TemplateSource};
