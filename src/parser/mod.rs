//! QubecTalk front-end (`spec.md` §A): lexer, flexible number-literal
//! parsing, and a recursive-descent grammar producing the `Program`
//! structure that is the core's only required contract with a DSL
//! front-end. Front-end internals are not held to the fidelity bar the
//! rest of the crate is (`spec.md` §A), but the resulting syntax is
//! concrete and self-consistent.

mod grammar;
mod lexer;
mod number;

pub use grammar::parse_program;
pub use lexer::{Lexer, Spanned, Token};
pub use number::parse_number_literal;
