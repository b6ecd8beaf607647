pub mod flow;
pub mod value;
