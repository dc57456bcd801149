// Checked flag sets and small enums
//
// Flag values that come from callers are checked against the bits this layer
// knows about. Unknown bits are reported but passed through to the driver.

use ash::vk;

/// VK_MEMORY_MAP_PLACED_BIT_EXT
pub const MEMORY_MAP_PLACED_EXT: vk::MemoryMapFlags = vk::MemoryMapFlags::from_raw(0x1);

fn report_unknown(kind: &str, bits: u32, known: u32) -> u32 {
    let unknown = bits & !known;
    if unknown != 0 {
        log::error!("Unknown {} bits: {:#x}", kind, unknown);
    }
    unknown
}

fn known_buffer_usage() -> vk::BufferUsageFlags {
    vk::BufferUsageFlags::TRANSFER_SRC
        | vk::BufferUsageFlags::TRANSFER_DST
        | vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER
        | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER
        | vk::BufferUsageFlags::UNIFORM_BUFFER
        | vk::BufferUsageFlags::STORAGE_BUFFER
        | vk::BufferUsageFlags::INDEX_BUFFER
        | vk::BufferUsageFlags::VERTEX_BUFFER
        | vk::BufferUsageFlags::INDIRECT_BUFFER
        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
}

fn known_memory_properties() -> vk::MemoryPropertyFlags {
    vk::MemoryPropertyFlags::DEVICE_LOCAL
        | vk::MemoryPropertyFlags::HOST_VISIBLE
        | vk::MemoryPropertyFlags::HOST_COHERENT
        | vk::MemoryPropertyFlags::HOST_CACHED
        | vk::MemoryPropertyFlags::LAZILY_ALLOCATED
        | vk::MemoryPropertyFlags::PROTECTED
}

fn known_shader_stages() -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::VERTEX
        | vk::ShaderStageFlags::TESSELLATION_CONTROL
        | vk::ShaderStageFlags::TESSELLATION_EVALUATION
        | vk::ShaderStageFlags::GEOMETRY
        | vk::ShaderStageFlags::FRAGMENT
        | vk::ShaderStageFlags::COMPUTE
}

/// Log unknown buffer usage bits, returns the flags unchanged
pub fn check_buffer_usage(flags: vk::BufferUsageFlags) -> vk::BufferUsageFlags {
    report_unknown("buffer usage", flags.as_raw(), known_buffer_usage().as_raw());
    flags
}

pub fn check_memory_properties(flags: vk::MemoryPropertyFlags) -> vk::MemoryPropertyFlags {
    report_unknown("memory property", flags.as_raw(), known_memory_properties().as_raw());
    flags
}

pub fn check_shader_stages(flags: vk::ShaderStageFlags) -> vk::ShaderStageFlags {
    // ALL and ALL_GRAPHICS are masks, not stages
    if flags == vk::ShaderStageFlags::ALL || flags == vk::ShaderStageFlags::ALL_GRAPHICS {
        return flags;
    }
    report_unknown("shader stage", flags.as_raw(), known_shader_stages().as_raw());
    flags
}

pub fn check_memory_map(flags: vk::MemoryMapFlags) -> vk::MemoryMapFlags {
    report_unknown("memory map", flags.as_raw(), MEMORY_MAP_PLACED_EXT.as_raw());
    flags
}

/// Element type of an index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    U8,
    U16,
    #[default]
    U32,
}

impl IndexType {
    pub fn size_bytes(self) -> u64 {
        match self {
            IndexType::U8 => 1,
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

impl From<IndexType> for vk::IndexType {
    fn from(ty: IndexType) -> Self {
        match ty {
            IndexType::U8 => vk::IndexType::UINT8_EXT,
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        }
    }
}

/// When validation layers are requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationType {
    None,
    /// Only in debug builds
    #[default]
    Debug,
    Always,
}

impl ValidationType {
    pub fn enabled(self) -> bool {
        match self {
            ValidationType::None => false,
            ValidationType::Debug => cfg!(debug_assertions),
            ValidationType::Always => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    Geometry,
    TessellationControl,
    TessellationEvaluation,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        }
    }
}

impl From<ShaderStage> for vk::ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        stage.flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bits_are_reported_and_kept() {
        assert_eq!(report_unknown("test", 0b1011, 0b0011), 0b1000);
        let odd = vk::BufferUsageFlags::from_raw(1 << 30);
        assert_eq!(check_buffer_usage(odd), odd);
    }

    #[test]
    fn known_bits_pass_silently() {
        let usage = vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST;
        assert_eq!(
            report_unknown("buffer usage", usage.as_raw(), known_buffer_usage().as_raw()),
            0
        );
        assert_eq!(report_unknown("map", MEMORY_MAP_PLACED_EXT.as_raw(), 0x1), 0);
    }

    #[test]
    fn index_sizes() {
        assert_eq!(IndexType::U8.size_bytes(), 1);
        assert_eq!(IndexType::U16.size_bytes(), 2);
        assert_eq!(IndexType::U32.size_bytes(), 4);
        assert_eq!(vk::IndexType::from(IndexType::U16), vk::IndexType::UINT16);
    }

    #[test]
    fn validation_type_follows_build() {
        assert!(!ValidationType::None.enabled());
        assert!(ValidationType::Always.enabled());
        assert_eq!(ValidationType::Debug.enabled(), cfg!(debug_assertions));
    }

    #[test]
    fn shader_stage_bits() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            vk::ShaderStageFlags::from(ShaderStage::Compute),
            vk::ShaderStageFlags::COMPUTE
        );
    }
}
