mod condition;
mod table_manager;
mod value;

pub use condition::*;
pub use table_manager::*;
pub use value::*;
