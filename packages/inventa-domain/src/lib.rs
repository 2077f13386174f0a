pub mod chunk;
pub mod disclosure;
pub mod event;
pub mod similarity;
pub mod validate;
