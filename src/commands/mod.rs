// ABOUTME: Command module aggregator for the verdigris CLI.
// ABOUTME: Re-exports validate, simulate, and history command handlers.

mod history;
mod simulate;
mod validate;

pub use history::history;
pub use simulate::simulate;
pub use validate::validate;
