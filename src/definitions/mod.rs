/// Monitor definition table
pub mod table;
/// Instance identity label registrations
pub mod identity;

pub use identity::{IdentityLabels, InstanceIdentityLabelSet};
pub use table::{DefinitionTable, MonitorDefinition, NodeId};
