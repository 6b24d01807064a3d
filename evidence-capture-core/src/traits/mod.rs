pub mod delegate;
pub mod encode_sink;
pub mod input_device;
