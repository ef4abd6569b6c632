pub mod color;
pub mod commit;
pub mod vector2;

pub use color::*;
pub use commit::*;
pub use vector2::*;
