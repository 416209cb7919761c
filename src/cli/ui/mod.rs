pub mod output;
pub mod spinner;

pub use output::{echo_error, echo_info, echo_success, echo_warning, heading};
pub use spinner::{Spinner, with_spinner};
