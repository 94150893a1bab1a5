//! BSP client core: sessions over subprocess stdio, a registry of named
//! connections, argument resolvers, and the debug-session bridge.

pub mod codec;
pub mod resolver;

pub(crate) mod diagnostics;
pub(crate) mod pending;
pub(crate) mod transport;

mod debug;
mod protocol;
mod registry;
mod session;

pub use debug::{
    DebugAttachDescriptor, DebugLauncher, attach_to_address, parse_debug_address,
    start_debug_session,
};
pub use pending::{OperationGuard, OperationKey, PendingOperations};
pub use protocol::{BSP_VERSION, CLIENT_NAME, InitializeResult};
pub use registry::{Connection, ConnectionRegistry, SweepSummary};
pub use resolver::{
    BuildArgumentResolver, ResolverRegistry, Selector, SelectorOption, SelectorResolver,
    SelectorSet,
};
pub use session::{Session, SessionState};
