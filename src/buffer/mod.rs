mod frame;
mod lfu_replacer;
mod memory_manager;

pub use frame::*;
pub use lfu_replacer::*;
pub use memory_manager::*;
