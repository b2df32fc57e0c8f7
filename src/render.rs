pub mod backend;
pub mod blur;
pub mod compositor;
pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod shader;
pub mod staging;
