// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. Code is validated (word size,
// magic number) and copied into aligned u32 words before module creation.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::device::Device;
use super::handle::{impl_as_raw, Handle};

pub use super::enums::ShaderStage;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))
}

#[derive(Debug, Clone)]
pub struct ShaderModuleCreateInfo {
    code: Vec<u32>,
}

impl ShaderModuleCreateInfo {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            code: Self::check_code(bytes)?,
        })
    }

    /// Validate SPIR-V bytes and return them as words
    pub fn check_code(bytes: &[u8]) -> Result<Vec<u32>> {
        if bytes.is_empty() {
            anyhow::bail!("Shader code is empty");
        }
        if bytes.len() % 4 != 0 {
            anyhow::bail!("Shader code size {} is not a multiple of 4", bytes.len());
        }
        let words = ash::util::read_spv(&mut Cursor::new(bytes)).context("Invalid SPIR-V")?;
        if words.first() != Some(&SPIRV_MAGIC) {
            anyhow::bail!("Shader code does not start with the SPIR-V magic number");
        }
        Ok(words)
    }

    pub fn code(&self) -> &[u32] {
        &self.code
    }
}

pub struct ShaderModule {
    handle: Handle<vk::ShaderModule>,
    device: Arc<Device>,
}

impl ShaderModule {
    pub fn create(device: &Arc<Device>, info: &ShaderModuleCreateInfo) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&info.code);
        let raw = unsafe { device.raw().create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
        })
    }

    pub fn from_code(device: &Arc<Device>, bytes: &[u8]) -> Result<Self> {
        Self::create(device, &ShaderModuleCreateInfo::new(bytes)?)
    }

    pub fn from_file<P: AsRef<Path>>(device: &Arc<Device>, path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = read_file(path)?;
        log::debug!("Loaded shader {:?} ({} bytes)", path, bytes.len());
        Self::from_code(device, &bytes).with_context(|| format!("Shader {:?}", path))
    }

    pub fn raw(&self) -> vk::ShaderModule {
        self.handle.raw()
    }
}

impl_as_raw!(ShaderModule, vk::ShaderModule);

impl Drop for ShaderModule {
    fn drop(&mut self) {
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_shader_module(raw, None) };
        }
    }
}

/// Module plus the stage it runs in
pub struct Shader {
    module: ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    pub fn new(module: ShaderModule, stage: ShaderStage) -> Self {
        Self { module, stage }
    }

    pub fn from_code(device: &Arc<Device>, bytes: &[u8], stage: ShaderStage) -> Result<Self> {
        Ok(Self::new(ShaderModule::from_code(device, bytes)?, stage))
    }

    pub fn from_file<P: AsRef<Path>>(
        device: &Arc<Device>,
        path: P,
        stage: ShaderStage,
    ) -> Result<Self> {
        Ok(Self::new(ShaderModule::from_file(device, path)?, stage))
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn module(&self) -> &ShaderModule {
        &self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spirv(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_spirv_header() {
        let code = spirv(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = ShaderModuleCreateInfo::check_code(&code).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_bad_size() {
        let mut bytes = spirv(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(ShaderModuleCreateInfo::check_code(&bytes).is_err());
        assert!(ShaderModuleCreateInfo::check_code(&[]).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(ShaderModuleCreateInfo::check_code(&spirv(&[0xdead_beef, 0])).is_err());
    }

    #[test]
    fn missing_file_is_error() {
        assert!(read_file("does/not/exist.spv").is_err());
    }
}
