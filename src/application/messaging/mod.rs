//! Message handling - Command parsing, per-frame post and command routing

pub mod dispatcher;
pub mod parser;
pub mod post;

pub use dispatcher::{Command, CommandFn, CommandTable};
pub use parser::{tokenize, CommandParser};
pub use post::{MessagePost, Outbound};
