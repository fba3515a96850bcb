mod attribute_page;
mod catalog_page;
mod codec;
mod free_page;
mod header_page;
mod object_page;
mod slotted_page;
mod typed_page;

pub use attribute_page::*;
pub use catalog_page::*;
pub use codec::*;
pub use free_page::*;
pub use header_page::*;
pub use object_page::*;
pub use slotted_page::*;
pub use typed_page::*;
