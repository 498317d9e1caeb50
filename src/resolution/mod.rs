/// Label conditions and operators
pub mod condition;
/// Parent resolution
pub mod resolver;
/// Label projection onto parents
pub mod projector;
/// Aggregate instance ids
pub mod identity_builder;
/// Upward hierarchy walk
pub mod walker;

pub use condition::{Condition, Operator};
pub use identity_builder::{leaf_instance_id, IdentityBuilder, INSTANCE_ID_SEPARATOR};
pub use projector::LabelProjector;
pub use resolver::ParentResolver;
pub use walker::HierarchyWalker;
