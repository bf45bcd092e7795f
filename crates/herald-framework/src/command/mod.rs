//! Command definitions, the registry and the definition-file loader.

mod definition;
mod loader;
mod registry;
mod split;

pub use definition::{
    CommandBuilder, CommandDefinition, CommandKey, CommandMeta, KeySpec, ResponseTemplate,
};
pub use loader::{
    COMMAND_HANDLERS, CommandLoader, HandlerCatalog, HandlerEntry, HandlerRegistration, LoadReport,
};
pub use registry::{CommandRegistry, Snapshot};
pub use split::shell_split;
