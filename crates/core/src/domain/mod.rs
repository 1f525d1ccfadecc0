pub mod meeting;
pub mod object;
pub mod task;

pub use object::{AssociationSpec, ObjectType};
pub use task::{ContactRef, DealRef, OverdueStatus, TaskAssociations};
