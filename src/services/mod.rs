pub mod graph;
pub mod roles;
