use std::io::Cursor;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

const CUBE_VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/cube.vert.spv"));
const CUBE_FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/cube.frag.spv"));

/// Vertex and fragment modules compiled by the build script
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn cube(device: Arc<ash::Device>) -> Result<Self> {
        Self::new(CUBE_VERT_SPV, CUBE_FRAG_SPV, device)
    }

    pub fn new(vert_spv: &[u8], frag_spv: &[u8], device: Arc<ash::Device>) -> Result<Self> {
        let vert_mod = create_shader_module(vert_spv, &device)?;
        let frag_mod = match create_shader_module(frag_spv, &device) {
            Ok(module) => module,
            Err(err) => {
                unsafe {
                    device.destroy_shader_module(vert_mod, None);
                }
                return Err(err);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

fn create_shader_module(spv: &[u8], device: &ash::Device) -> Result<vk::ShaderModule> {
    // Realigns the bytes to u32 and checks the SPIR-V magic number
    let code = ash::util::read_spv(&mut Cursor::new(spv))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}
