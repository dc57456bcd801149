// Small struct helpers: extents, rects, viewports, clear values,
// vertex input descriptions, attachments and subpasses

use ash::vk;

pub fn extent_2d(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

pub fn rect_2d(extent: vk::Extent2D) -> vk::Rect2D {
    rect_2d_at(vk::Offset2D { x: 0, y: 0 }, extent)
}

pub fn rect_2d_at(offset: vk::Offset2D, extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D { offset, extent }
}

pub fn viewport(width: f32, height: f32) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width,
        height,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    viewport(extent.width as f32, extent.height as f32)
}

pub mod clear {
    use ash::vk;

    pub fn color(rgba: [f32; 4]) -> vk::ClearValue {
        vk::ClearValue {
            color: vk::ClearColorValue { float32: rgba },
        }
    }

    pub fn depth_stencil(depth: f32, stencil: u32) -> vk::ClearValue {
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        }
    }
}

/// Vertex buffer binding description
#[derive(Debug, Clone, Copy)]
pub struct VertexInputBinding(vk::VertexInputBindingDescription);

impl VertexInputBinding {
    pub fn new(binding: u32, stride: u32) -> Self {
        Self(vk::VertexInputBindingDescription {
            binding,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        })
    }

    /// Binding stride taken from the vertex type
    pub fn of<T>(binding: u32) -> Self {
        Self::new(binding, std::mem::size_of::<T>() as u32)
    }

    pub fn per_instance(mut self) -> Self {
        self.0.input_rate = vk::VertexInputRate::INSTANCE;
        self
    }

    pub fn raw(&self) -> vk::VertexInputBindingDescription {
        self.0
    }
}

pub fn vertex_attribute(
    location: u32,
    binding: u32,
    format: vk::Format,
    offset: u32,
) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding,
        format,
        offset,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AttachmentDescription(vk::AttachmentDescription);

impl AttachmentDescription {
    pub fn new(format: vk::Format) -> Self {
        Self(vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::UNDEFINED,
        })
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.0.samples = samples;
        self
    }

    pub fn color_depth(mut self, load: vk::AttachmentLoadOp, store: vk::AttachmentStoreOp) -> Self {
        self.0.load_op = load;
        self.0.store_op = store;
        self
    }

    pub fn stencil(mut self, load: vk::AttachmentLoadOp, store: vk::AttachmentStoreOp) -> Self {
        self.0.stencil_load_op = load;
        self.0.stencil_store_op = store;
        self
    }

    pub fn initial_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.0.initial_layout = layout;
        self
    }

    pub fn final_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.0.final_layout = layout;
        self
    }

    pub fn raw(&self) -> vk::AttachmentDescription {
        self.0
    }
}

pub fn attachment_ref(attachment: u32, layout: vk::ImageLayout) -> vk::AttachmentReference {
    vk::AttachmentReference { attachment, layout }
}

/// Graphics subpass; owns its attachment references
#[derive(Debug, Clone, Default)]
pub struct SubpassDescription {
    inputs: Vec<vk::AttachmentReference>,
    colors: Vec<vk::AttachmentReference>,
    resolves: Vec<vk::AttachmentReference>,
    depth_stencil: Option<vk::AttachmentReference>,
    preserve: Vec<u32>,
}

impl SubpassDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, attachment: u32, layout: vk::ImageLayout) -> Self {
        self.inputs.push(attachment_ref(attachment, layout));
        self
    }

    pub fn color(mut self, attachment: u32, layout: vk::ImageLayout) -> Self {
        self.colors.push(attachment_ref(attachment, layout));
        self
    }

    pub fn resolve(mut self, attachment: u32, layout: vk::ImageLayout) -> Self {
        self.resolves.push(attachment_ref(attachment, layout));
        self
    }

    pub fn depth_stencil(mut self, attachment: u32, layout: vk::ImageLayout) -> Self {
        self.depth_stencil = Some(attachment_ref(attachment, layout));
        self
    }

    pub fn preserve(mut self, attachment: u32) -> Self {
        self.preserve.push(attachment);
        self
    }

    pub fn color_count(&self) -> usize {
        self.colors.len()
    }

    /// Native description borrowing the references held here
    pub fn raw(&self) -> vk::SubpassDescription {
        let mut builder = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .input_attachments(&self.inputs)
            .color_attachments(&self.colors)
            .preserve_attachments(&self.preserve);
        // Resolve attachments must match the color count when present
        if !self.resolves.is_empty() {
            builder = builder.resolve_attachments(&self.resolves);
        }
        if let Some(depth) = self.depth_stencil.as_ref() {
            builder = builder.depth_stencil_attachment(depth);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_covers_extent() {
        let vp = viewport_for(extent_2d(800, 600));
        assert_eq!(vp.width, 800.0);
        assert_eq!(vp.height, 600.0);
        assert_eq!(vp.min_depth, 0.0);
        assert_eq!(vp.max_depth, 1.0);
    }

    #[test]
    fn rect_at_origin() {
        let rect = rect_2d(extent_2d(4, 5));
        assert_eq!(rect.offset.x, 0);
        assert_eq!(rect.extent.height, 5);
    }

    #[test]
    fn attachment_defaults_and_setters() {
        let raw = AttachmentDescription::new(vk::Format::B8G8R8A8_SRGB).raw();
        assert_eq!(raw.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(raw.samples, vk::SampleCountFlags::TYPE_1);

        let raw = AttachmentDescription::new(vk::Format::B8G8R8A8_SRGB)
            .color_depth(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .raw();
        assert_eq!(raw.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(raw.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(raw.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn subpass_points_at_owned_refs() {
        let subpass = SubpassDescription::new()
            .color(0, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .depth_stencil(1, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .preserve(2);
        let raw = subpass.raw();
        assert_eq!(raw.color_attachment_count, 1);
        assert_eq!(raw.preserve_attachment_count, 1);
        assert!(!raw.p_depth_stencil_attachment.is_null());
        assert!(raw.p_resolve_attachments.is_null());
        assert_eq!(raw.pipeline_bind_point, vk::PipelineBindPoint::GRAPHICS);
    }

    #[test]
    fn vertex_binding_stride_from_type() {
        let binding = VertexInputBinding::of::<[f32; 5]>(0).raw();
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn clear_color_value() {
        let value = clear::color([0.1, 0.2, 0.3, 1.0]);
        assert_eq!(unsafe { value.color.float32 }, [0.1, 0.2, 0.3, 1.0]);
    }
}
