//! Tool system: trait, schemas, arguments, validation, and registry.

pub mod arguments;
pub mod parameters;
pub mod registry;
pub mod tool;
pub mod validation;

pub use arguments::ToolArguments;
pub use parameters::ToolParameters;
pub use registry::{ToolDescriptor, ToolRegistry};
pub use tool::{FnTool, Tool};
