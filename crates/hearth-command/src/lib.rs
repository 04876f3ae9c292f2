pub mod commander;
pub mod error;
mod parse;

pub use commander::{Commander, WolSupport};
pub use error::{CommandError, CommandErrorKind};
