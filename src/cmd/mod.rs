//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `status` | `Status`         |

pub mod serve;
pub mod status;

pub use serve::cmd_serve;
pub use status::cmd_status;
