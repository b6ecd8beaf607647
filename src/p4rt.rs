pub mod bmv2;
pub mod dump;
pub mod pipeconf;
pub mod pure;
pub mod text_format;
