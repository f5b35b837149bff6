pub mod catalog;
pub mod resolver;

pub use resolver::{AssignmentFailurePolicy, ResolveError, RoleResolver};
