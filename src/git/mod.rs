pub mod error_handling;
pub mod memory;
pub mod repository;
pub mod source;

pub use error_handling::*;
pub use memory::*;
pub use repository::GitRepository;
pub use source::*;
