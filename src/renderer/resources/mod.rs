/// "Resources" are GPU objects created once by the device and used unchanged every frame.

pub mod buffer;
pub mod image;
pub mod mesh;
pub mod shader;
