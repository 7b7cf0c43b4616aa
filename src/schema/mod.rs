pub mod content;
pub mod value;
