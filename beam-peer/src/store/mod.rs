mod directory_store;
mod memory_store;
mod object_store;

pub use directory_store::*;
pub use memory_store::*;
pub use object_store::*;
