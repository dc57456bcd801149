// Graphics and compute pipelines
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Each fixed-function stage has a small builder with the usual defaults;
// GraphicsPipelineCreateInfo owns all of them and assembles the native
// struct only for the duration of the create call.

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::descriptors::DescriptorSetLayout;
use super::device::Device;
use super::handle::{impl_as_raw, Handle};
use super::refs::{RawRef, Refable};
use super::render_pass::RenderPass;
use super::shader::Shader;
use super::structs::VertexInputBinding;

const ENTRY_POINT: &CStr = c"main";

/// One shader stage of a pipeline
#[derive(Debug, Clone, Copy)]
pub struct ShaderStageCreateInfo {
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl ShaderStageCreateInfo {
    pub fn new(shader: &Shader) -> Self {
        Self {
            module: shader.module().raw(),
            stage: shader.stage().flags(),
        }
    }

    fn raw(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColorBlendAttachment(vk::PipelineColorBlendAttachmentState);

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self(vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        })
    }
}

impl ColorBlendAttachment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard "over" blending on source alpha
    pub fn alpha_blending() -> Self {
        Self(vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::TRUE,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            ..Self::default().0
        })
    }

    pub fn write_mask(mut self, mask: vk::ColorComponentFlags) -> Self {
        self.0.color_write_mask = mask;
        self
    }

    pub fn raw(&self) -> vk::PipelineColorBlendAttachmentState {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct ColorBlendState {
    logic_op_enable: bool,
    logic_op: vk::LogicOp,
    attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    blend_constants: [f32; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            logic_op_enable: false,
            logic_op: vk::LogicOp::COPY,
            attachments: Vec::new(),
            blend_constants: [0.0; 4],
        }
    }
}

impl ColorBlendState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attachment(mut self, attachment: ColorBlendAttachment) -> Self {
        self.attachments.push(attachment.raw());
        self
    }

    pub fn logic_op(mut self, op: vk::LogicOp) -> Self {
        self.logic_op_enable = true;
        self.logic_op = op;
        self
    }

    fn raw(&self) -> vk::PipelineColorBlendStateCreateInfoBuilder<'_> {
        vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(self.logic_op_enable)
            .logic_op(self.logic_op)
            .attachments(&self.attachments)
            .blend_constants(self.blend_constants)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DynamicState {
    states: Vec<vk::DynamicState>,
}

impl DynamicState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, state: vk::DynamicState) -> Self {
        if !self.states.contains(&state) {
            self.states.push(state);
        }
        self
    }

    pub fn add_many(self, states: &[vk::DynamicState]) -> Self {
        states.iter().fold(self, |s, &state| s.add(state))
    }

    pub fn set(mut self, states: &[vk::DynamicState]) -> Self {
        self.states.clear();
        self.add_many(states)
    }

    pub fn contains(&self, state: vk::DynamicState) -> bool {
        self.states.contains(&state)
    }

    fn raw(&self) -> vk::PipelineDynamicStateCreateInfoBuilder<'_> {
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&self.states)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InputAssemblyState {
    topology: vk::PrimitiveTopology,
    primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
        }
    }
}

impl InputAssemblyState {
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.primitive_restart = enable;
        self
    }

    fn raw(&self) -> vk::PipelineInputAssemblyStateCreateInfoBuilder<'static> {
        vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(self.primitive_restart)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MultisampleState {
    samples: vk::SampleCountFlags,
    sample_shading: bool,
    min_sample_shading: f32,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: false,
            min_sample_shading: 1.0,
        }
    }
}

impl MultisampleState {
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn sample_shading(mut self, min: f32) -> Self {
        self.sample_shading = true;
        self.min_sample_shading = min;
        self
    }

    fn raw(&self) -> vk::PipelineMultisampleStateCreateInfoBuilder<'static> {
        vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(self.samples)
            .sample_shading_enable(self.sample_shading)
            .min_sample_shading(self.min_sample_shading)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RasterizationState {
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
        }
    }
}

impl RasterizationState {
    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    pub fn cull_mode(mut self, mode: vk::CullModeFlags, front: vk::FrontFace) -> Self {
        self.cull_mode = mode;
        self.front_face = front;
        self
    }

    fn raw(&self) -> vk::PipelineRasterizationStateCreateInfoBuilder<'static> {
        vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(self.line_width)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputState {
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(mut self, binding: VertexInputBinding) -> Self {
        self.bindings.push(binding.raw());
        self
    }

    pub fn add_bindings(mut self, bindings: &[VertexInputBinding]) -> Self {
        self.bindings.extend(bindings.iter().map(VertexInputBinding::raw));
        self
    }

    pub fn add_attribute(mut self, attribute: vk::VertexInputAttributeDescription) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn add_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.attributes.extend_from_slice(attributes);
        self
    }

    fn raw(&self) -> vk::PipelineVertexInputStateCreateInfoBuilder<'_> {
        vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewportState {
    viewports: Vec<vk::Viewport>,
    scissors: Vec<vk::Rect2D>,
    dynamic_count: Option<u32>,
}

impl ViewportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_viewport(mut self, viewport: vk::Viewport) -> Self {
        self.viewports.push(viewport);
        self
    }

    pub fn add_scissor(mut self, scissor: vk::Rect2D) -> Self {
        self.scissors.push(scissor);
        self
    }

    /// Counts only, viewports and scissors set at record time
    pub fn dynamic(count: u32) -> Self {
        Self {
            dynamic_count: Some(count),
            ..Self::default()
        }
    }

    fn raw(&self) -> vk::PipelineViewportStateCreateInfoBuilder<'_> {
        match self.dynamic_count {
            Some(count) => vk::PipelineViewportStateCreateInfo::builder()
                .viewport_count(count)
                .scissor_count(count),
            None => vk::PipelineViewportStateCreateInfo::builder()
                .viewports(&self.viewports)
                .scissors(&self.scissors),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepthStencilState {
    test: bool,
    write: bool,
    compare_op: vk::CompareOp,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare_op: vk::CompareOp::LESS,
        }
    }
}

impl DepthStencilState {
    pub fn compare_op(mut self, op: vk::CompareOp) -> Self {
        self.compare_op = op;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.write = false;
        self
    }

    fn raw(&self) -> vk::PipelineDepthStencilStateCreateInfoBuilder<'static> {
        vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.test)
            .depth_write_enable(self.write)
            .depth_compare_op(self.compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutCreateInfo {
    set_layouts: Vec<RawRef<vk::DescriptorSetLayout>>,
    push_constants: Vec<vk::PushConstantRange>,
}

impl PipelineLayoutCreateInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_set_layout(mut self, layout: &DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout.reference());
        self
    }

    pub fn add_push_constant_range(
        mut self,
        stages: vk::ShaderStageFlags,
        offset: u32,
        size: u32,
    ) -> Self {
        self.push_constants.push(vk::PushConstantRange {
            stage_flags: stages,
            offset,
            size,
        });
        self
    }
}

pub struct PipelineLayout {
    handle: Handle<vk::PipelineLayout>,
    device: Arc<Device>,
    view: Refable<vk::PipelineLayout>,
}

impl PipelineLayout {
    pub fn create(device: &Arc<Device>, info: &PipelineLayoutCreateInfo) -> Result<Self> {
        let set_layouts = info
            .set_layouts
            .iter()
            .map(|l| l.raw().context("Descriptor set layout has been destroyed"))
            .collect::<Result<Vec<_>>>()?;

        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&info.push_constants);

        let raw = unsafe { device.raw().create_pipeline_layout(&create_info, None) }
            .context("Failed to create pipeline layout")?;

        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            view: Refable::new(raw),
        })
    }

    pub fn raw(&self) -> vk::PipelineLayout {
        self.handle.raw()
    }

    pub fn reference(&self) -> RawRef<vk::PipelineLayout> {
        self.view.reference()
    }
}

impl_as_raw!(PipelineLayout, vk::PipelineLayout);

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.view.invalidate();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_pipeline_layout(raw, None) };
        }
    }
}

/// What an encoder needs to bind a pipeline and its descriptor sets
pub trait Pipeline {
    fn raw(&self) -> vk::Pipeline;
    fn bind_point(&self) -> vk::PipelineBindPoint;
    fn layout(&self) -> RawRef<vk::PipelineLayout>;
    fn reference(&self) -> RawRef<vk::Pipeline>;
}

pub struct GraphicsPipelineCreateInfo {
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    subpass: u32,
    stages: Vec<ShaderStageCreateInfo>,
    vertex_input: VertexInputState,
    input_assembly: InputAssemblyState,
    viewport: ViewportState,
    rasterization: RasterizationState,
    multisample: MultisampleState,
    depth_stencil: Option<DepthStencilState>,
    color_blend: ColorBlendState,
    dynamic: DynamicState,
    layout_ref: RawRef<vk::PipelineLayout>,
}

impl GraphicsPipelineCreateInfo {
    pub fn new(layout: &PipelineLayout, render_pass: &RenderPass, shaders: &[&Shader]) -> Self {
        Self {
            layout: layout.raw(),
            render_pass: render_pass.raw(),
            subpass: 0,
            stages: shaders.iter().map(|s| ShaderStageCreateInfo::new(s)).collect(),
            vertex_input: VertexInputState::default(),
            input_assembly: InputAssemblyState::default(),
            viewport: ViewportState::default(),
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: None,
            color_blend: ColorBlendState::default().add_attachment(ColorBlendAttachment::default()),
            dynamic: DynamicState::default(),
            layout_ref: layout.reference(),
        }
    }

    pub fn subpass(mut self, index: u32) -> Self {
        self.subpass = index;
        self
    }

    pub fn vertex_input(mut self, state: VertexInputState) -> Self {
        self.vertex_input = state;
        self
    }

    pub fn input_assembly(mut self, state: InputAssemblyState) -> Self {
        self.input_assembly = state;
        self
    }

    pub fn viewport(mut self, state: ViewportState) -> Self {
        self.viewport = state;
        self
    }

    pub fn rasterization(mut self, state: RasterizationState) -> Self {
        self.rasterization = state;
        self
    }

    pub fn multisample(mut self, state: MultisampleState) -> Self {
        self.multisample = state;
        self
    }

    pub fn depth_stencil(mut self, state: DepthStencilState) -> Self {
        self.depth_stencil = Some(state);
        self
    }

    pub fn color_blend(mut self, state: ColorBlendState) -> Self {
        self.color_blend = state;
        self
    }

    pub fn dynamic(mut self, state: DynamicState) -> Self {
        self.dynamic = state;
        self
    }
}

pub struct GraphicsPipeline {
    handle: Handle<vk::Pipeline>,
    device: Arc<Device>,
    layout: RawRef<vk::PipelineLayout>,
    view: Refable<vk::Pipeline>,
}

impl GraphicsPipeline {
    pub fn create(device: &Arc<Device>, info: &GraphicsPipelineCreateInfo) -> Result<Self> {
        if !info.layout_ref.has_value() {
            anyhow::bail!("Pipeline layout has been destroyed");
        }
        if info.stages.is_empty() {
            anyhow::bail!("Graphics pipeline needs at least one shader stage");
        }

        let stages: Vec<_> = info.stages.iter().map(ShaderStageCreateInfo::raw).collect();
        let vertex_input = info.vertex_input.raw();
        let input_assembly = info.input_assembly.raw();
        let viewport = info.viewport.raw();
        let rasterization = info.rasterization.raw();
        let multisample = info.multisample.raw();
        let depth_stencil = info.depth_stencil.map(|d| d.raw());
        let color_blend = info.color_blend.raw();
        let dynamic = info.dynamic.raw();

        let mut create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(info.layout)
            .render_pass(info.render_pass)
            .subpass(info.subpass);
        if let Some(depth_stencil) = depth_stencil.as_ref() {
            create_info = create_info.depth_stencil_state(depth_stencil);
        }

        let pipelines = unsafe {
            device
                .raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info.build()], None)
        }
        .map_err(|(_, e)| e)
        .context("Failed to create graphics pipeline")?;

        let raw = pipelines[0];
        log::debug!("Created graphics pipeline {:?}", raw);

        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            layout: info.layout_ref.clone(),
            view: Refable::new(raw),
        })
    }
}

impl Pipeline for GraphicsPipeline {
    fn raw(&self) -> vk::Pipeline {
        self.handle.raw()
    }

    fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }

    fn layout(&self) -> RawRef<vk::PipelineLayout> {
        self.layout.clone()
    }

    fn reference(&self) -> RawRef<vk::Pipeline> {
        self.view.reference()
    }
}

impl_as_raw!(GraphicsPipeline, vk::Pipeline);

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.view.invalidate();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_pipeline(raw, None) };
        }
    }
}

pub struct ComputePipelineCreateInfo {
    layout: vk::PipelineLayout,
    layout_ref: RawRef<vk::PipelineLayout>,
    stage: ShaderStageCreateInfo,
}

impl ComputePipelineCreateInfo {
    pub fn new(layout: &PipelineLayout, shader: &Shader) -> Self {
        Self {
            layout: layout.raw(),
            layout_ref: layout.reference(),
            stage: ShaderStageCreateInfo::new(shader),
        }
    }
}

pub struct ComputePipeline {
    handle: Handle<vk::Pipeline>,
    device: Arc<Device>,
    layout: RawRef<vk::PipelineLayout>,
    view: Refable<vk::Pipeline>,
}

impl ComputePipeline {
    pub fn create(device: &Arc<Device>, info: &ComputePipelineCreateInfo) -> Result<Self> {
        if !info.layout_ref.has_value() {
            anyhow::bail!("Pipeline layout has been destroyed");
        }
        if info.stage.stage != vk::ShaderStageFlags::COMPUTE {
            anyhow::bail!("Compute pipeline needs a compute shader, got {:?}", info.stage.stage);
        }

        let create_info = vk::ComputePipelineCreateInfo::builder()
            .stage(info.stage.raw())
            .layout(info.layout);

        let pipelines = unsafe {
            device
                .raw()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info.build()], None)
        }
        .map_err(|(_, e)| e)
        .context("Failed to create compute pipeline")?;

        Ok(Self {
            handle: Handle::new(pipelines[0]),
            device: device.clone(),
            layout: info.layout_ref.clone(),
            view: Refable::new(pipelines[0]),
        })
    }
}

impl Pipeline for ComputePipeline {
    fn raw(&self) -> vk::Pipeline {
        self.handle.raw()
    }

    fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::COMPUTE
    }

    fn layout(&self) -> RawRef<vk::PipelineLayout> {
        self.layout.clone()
    }

    fn reference(&self) -> RawRef<vk::Pipeline> {
        self.view.reference()
    }
}

impl_as_raw!(ComputePipeline, vk::Pipeline);

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        self.view.invalidate();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_pipeline(raw, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk::structs::{vertex_attribute, viewport};

    #[test]
    fn blend_attachment_defaults() {
        let raw = ColorBlendAttachment::default().raw();
        assert_eq!(raw.blend_enable, vk::FALSE);
        assert_eq!(raw.src_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(raw.dst_color_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(raw.color_write_mask, vk::ColorComponentFlags::RGBA);

        let alpha = ColorBlendAttachment::alpha_blending().raw();
        assert_eq!(alpha.blend_enable, vk::TRUE);
        assert_eq!(alpha.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }

    #[test]
    fn color_blend_state_counts_attachments() {
        let state = ColorBlendState::new()
            .add_attachment(ColorBlendAttachment::new())
            .add_attachment(ColorBlendAttachment::alpha_blending());
        let raw = state.raw();
        assert_eq!(raw.attachment_count, 2);
        assert_eq!(raw.logic_op_enable, vk::FALSE);
        assert_eq!(raw.logic_op, vk::LogicOp::COPY);
    }

    #[test]
    fn dynamic_state_dedups() {
        let state = DynamicState::new()
            .add(vk::DynamicState::VIEWPORT)
            .add_many(&[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]);
        assert_eq!(state.raw().dynamic_state_count, 2);

        let state = state.set(&[vk::DynamicState::LINE_WIDTH]);
        assert!(state.contains(vk::DynamicState::LINE_WIDTH));
        assert!(!state.contains(vk::DynamicState::VIEWPORT));
    }

    #[test]
    fn fixed_function_defaults() {
        let ia = InputAssemblyState::default().raw();
        assert_eq!(ia.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(ia.primitive_restart_enable, vk::FALSE);

        let ms = MultisampleState::default().raw();
        assert_eq!(ms.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(ms.min_sample_shading, 1.0);

        let rs = RasterizationState::default()
            .cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .raw();
        assert_eq!(rs.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(rs.line_width, 1.0);
        assert_eq!(rs.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(rs.front_face, vk::FrontFace::COUNTER_CLOCKWISE);

        let ds = DepthStencilState::default().raw();
        assert_eq!(ds.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(ds.depth_write_enable, vk::TRUE);
    }

    #[test]
    fn viewport_state_static_and_dynamic() {
        let state = ViewportState::new()
            .add_viewport(viewport(10.0, 10.0))
            .add_scissor(vk::Rect2D::default());
        let raw = state.raw();
        assert_eq!(raw.viewport_count, 1);
        assert!(!raw.p_viewports.is_null());

        let state = ViewportState::dynamic(1);
        let raw = state.raw();
        assert_eq!(raw.viewport_count, 1);
        assert_eq!(raw.scissor_count, 1);
        assert!(raw.p_viewports.is_null());
    }

    #[test]
    fn vertex_input_collects_descriptions() {
        let state = VertexInputState::new()
            .add_binding(VertexInputBinding::new(0, 20))
            .add_attributes(&[
                vertex_attribute(0, 0, vk::Format::R32G32_SFLOAT, 0),
                vertex_attribute(1, 0, vk::Format::R32G32B32_SFLOAT, 8),
            ]);
        let raw = state.raw();
        assert_eq!(raw.vertex_binding_description_count, 1);
        assert_eq!(raw.vertex_attribute_description_count, 2);
    }

    #[test]
    fn layout_info_push_constants() {
        let info = PipelineLayoutCreateInfo::new().add_push_constant_range(
            vk::ShaderStageFlags::VERTEX,
            0,
            64,
        );
        assert_eq!(info.push_constants.len(), 1);
        assert_eq!(info.push_constants[0].size, 64);
        assert!(info.set_layouts.is_empty());
    }
}
