//! Typed, immutable statement model carried through the command log, plus the
//! parser that turns submitted statement text into it.

pub mod name;
pub mod parser;
pub mod statement;

pub use name::{NodeLocation, QualifiedName};
pub use parser::{ParseError, ParsedStatement, parse_statements};
pub use statement::{
    DEFAULT_PRINT_INTERVAL, DropTopic, PrintTopic, RegisterTopic, SetProperty, Statement,
    StatementKind, UnsetProperty,
};
