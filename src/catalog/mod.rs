mod attribute_type;
mod schema;
mod table_description;

pub use attribute_type::*;
pub use schema::*;
pub use table_description::*;
