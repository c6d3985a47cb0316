pub mod case;
pub mod enums;
pub mod patient;

pub use case::*;
pub use enums::*;
pub use patient::*;
