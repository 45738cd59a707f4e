pub mod cli;

pub use cli::{CommandArgs, SummaryFormat};
