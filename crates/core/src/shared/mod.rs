pub mod constants;
pub mod frame;
pub mod model_resolver;
pub mod pixel_buffer;
pub mod region;
