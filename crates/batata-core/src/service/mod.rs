// Core services for cluster membership and consistency protocol lifecycle

pub mod cluster;
pub mod member_event;
pub mod protocol;
pub mod protocol_executor;

// Re-export commonly used types
pub use cluster::{MembershipSource, ServerMemberManager};
pub use member_event::{MemberChangeEventPublisher, MemberChangeListener, MembersChangeEvent};
pub use protocol::{ProtocolManager, ProtocolManagerConfig};
pub use protocol_executor::{ProtocolExecutor, SerialExecutor};
