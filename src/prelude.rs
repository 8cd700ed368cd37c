//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use flow4ai::prelude::*;
//! ```

pub use crate::composition::{Composition, parallel, sequence, wrap_fn, wrap_user};
pub use crate::config::ManagerConfig;
pub use crate::error::{Flow4AiError, Result};
pub use crate::ids::{Fqn, ShortName};
pub use crate::manager::Flow4AiManager;
pub use crate::result::Envelope;
pub use crate::task::{Task, TaskId};
