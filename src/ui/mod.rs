//! Terminal output for the `hoard` binary
//!
//! Styled with `console` and `cliclack` when attached to a terminal, plain
//! bracketed lines otherwise (CI, pipes, tests).

mod context;
mod output;
mod prompts;

pub use context::UiContext;
pub use output::{
    key_value, object_status, short, step_info, step_ok, step_ok_detail, step_warn,
    step_warn_hint,
};
pub use prompts::confirm;
