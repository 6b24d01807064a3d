pub mod command;
pub mod factory;
pub mod wav;

pub use factory::DefaultSinkFactory;
