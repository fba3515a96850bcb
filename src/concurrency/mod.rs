mod resource_manager;
mod wait_for_graph;

pub use resource_manager::*;
pub use wait_for_graph::*;
