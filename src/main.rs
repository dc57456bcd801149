// =============================================================================
// vkwrap-triangle - spinning triangle on top of the vkwrap layer
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for the frame slot's fence
// 2. Acquire swapchain image
// 3. Write this slot's uniform (rotation) through the persistent mapping
// 4. Record: render pass -> pipeline -> buffers -> descriptor set -> draw
// 5. Submit, then present
//
// The swapchain (and its framebuffers) is recreated on resize or when the
// surface reports it out of date. Render pass and pipeline survive, since
// viewport and scissor are dynamic.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowId,
};

use vkwrap::engine::{self, PhysicalDeviceSelector};
use vkwrap::vk::size::align_up;
use vkwrap::vk::structs::{
    rect_2d, vertex_attribute, viewport_for, AttachmentDescription, SubpassDescription,
    VertexInputBinding,
};
use vkwrap::vk::{
    ApplicationInfo, CommandBuffer, CommandBufferBeginInfo, CommandPool, CommandPoolCreateInfo,
    DescriptorBufferInfo, DescriptorPool, DescriptorPoolCreateInfo, DescriptorPoolSize,
    DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo,
    DescriptorSetWriteBuffer, Device, DeviceCreateInfo, DeviceMemory, DeviceQueueCreateInfo,
    Fence, Framebuffer, GraphicsPipeline, GraphicsPipelineCreateInfo, IndexBuffer,
    IndexBufferCreateInfo, IndexType, Instance, InstanceCreateInfo, Mapping, PipelineLayout,
    PipelineLayoutCreateInfo, PresentInfo, PresentQueue, Queue, RenderPass, RenderPassBeginInfo,
    RenderPassCreateInfo, Semaphore, ShaderStage, Surface, SurfaceAttributes, Swapchain,
    SwapchainCreateInfo, UniformBuffer, UniformBufferCreateInfo, VertexBuffer,
    VertexBufferCreateInfo, Window, WHOLE_SIZE,
};
use vkwrap::vk::descriptors::DescriptorSetWrite;
use vkwrap::vk::pipeline::{DynamicState, VertexInputState, ViewportState};
use vkwrap::Config;

const VERTEX_SHADER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/triangle.vert.spv");
const FRAGMENT_SHADER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/triangle.frag.spv");

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

const VERTICES: [Vertex; 3] = [
    Vertex { position: [0.0, -0.5], color: [1.0, 0.0, 0.0] },
    Vertex { position: [0.5, 0.5], color: [0.0, 1.0, 0.0] },
    Vertex { position: [-0.5, 0.5], color: [0.0, 0.0, 1.0] },
];

const INDICES: [u16; 3] = [0, 1, 2];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Uniforms {
    transform: [[f32; 4]; 4],
}

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();
    engine::init(&config);
    log::info!("Starting vkwrap triangle");
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = TriangleApp::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

// =============================================================================
// PER-FRAME RESOURCES
// =============================================================================

struct Frame {
    command_buffer: CommandBuffer,
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
    descriptor_set: DescriptorSet,
    uniform_offset: u64,
}

/// Everything Vulkan. Fields drop top to bottom, children before parents.
struct Renderer {
    frames: Vec<Frame>,
    current_frame: usize,
    _command_pool: CommandPool,
    _descriptor_pool: DescriptorPool,
    pipeline: GraphicsPipeline,
    _pipeline_layout: PipelineLayout,
    _set_layout: DescriptorSetLayout,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    uniform_mapping: Mapping,
    _uniform_buffer: UniformBuffer,
    _uniform_memory: DeviceMemory,
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    _geometry_memory: DeviceMemory,
    swapchain: Swapchain,
    graphics_queue: Queue,
    present_queue: PresentQueue,
    queue_families: Vec<u32>,
    device: std::sync::Arc<Device>,
    surface: Surface,
    _instance: std::sync::Arc<Instance>,
    clear_color: [f32; 4],
    started: Instant,
}

impl Renderer {
    fn new(config: &Config, window: &Window, app: &impl engine::App) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance + surface
        // ─────────────────────────────────────────────────────────────────────
        let app_info =
            ApplicationInfo::new(&config.app.name).set_engine_name(&config.app.engine_name);
        let instance_info = InstanceCreateInfo::new(app_info, config.validation_type())
            .enable_window_extensions(window.raw_display_handle())?;
        let instance = Instance::create(&instance_info)?;
        let surface = instance.create_surface(window)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Pick a GPU that can present to the surface
        // ─────────────────────────────────────────────────────────────────────
        let selector = PhysicalDeviceSelector::from_instance(&instance)?
            .require_extension(khr::Swapchain::name())
            .can_present_to(&surface);
        let physical = app
            .select_physical_device(selector)
            .context("No suitable GPU found")?;
        log::info!("Selected GPU: {}", physical.name());

        let families = physical.queues();
        let graphics_family = families
            .graphics_present(&surface)
            .or_else(|| families.graphics())
            .context("No graphics queue family")?
            .index();
        let present_family = if families[graphics_family as usize].can_present_to(&surface) {
            graphics_family
        } else {
            families
                .present(&surface)
                .context("No present queue family")?
                .index()
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Logical device + queues
        // ─────────────────────────────────────────────────────────────────────
        let device_info = DeviceCreateInfo::new(vk::PhysicalDeviceFeatures::default())
            .add_queue(DeviceQueueCreateInfo::new(graphics_family))
            .add_queue(DeviceQueueCreateInfo::new(present_family))
            .enable_extension(khr::Swapchain::name());
        let device = Device::create(&physical, &device_info)?;
        let graphics_queue = device.queue(graphics_family, 0);
        let present_queue = PresentQueue::new(device.queue(present_family, 0));
        let queue_families = vec![graphics_family, present_family];

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Swapchain, render pass, framebuffers
        // ─────────────────────────────────────────────────────────────────────
        let swapchain_info = swapchain_info(config, &device, &surface, window, &queue_families)?;
        let swapchain = device.create_swapchain(&swapchain_info)?;
        let render_pass = create_render_pass(&device, swapchain.format())?;
        let framebuffers = swapchain.create_framebuffers(&render_pass)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Descriptor layout + pipeline
        // ─────────────────────────────────────────────────────────────────────
        let set_layout = device.create_descriptor_set_layout(
            &DescriptorSetLayoutCreateInfo::new().add_binding(DescriptorSetLayoutBinding::new(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )),
        )?;
        let layout_info = PipelineLayoutCreateInfo::new().add_set_layout(&set_layout);
        let pipeline_layout = device.create_pipeline_layout(&layout_info)?;

        let vertex_shader = device.load_shader(VERTEX_SHADER, ShaderStage::Vertex)?;
        let fragment_shader = device.load_shader(FRAGMENT_SHADER, ShaderStage::Fragment)?;
        let pipeline_info = GraphicsPipelineCreateInfo::new(
            &pipeline_layout,
            &render_pass,
            &[&vertex_shader, &fragment_shader],
        )
        .vertex_input(
            VertexInputState::new()
                .add_binding(VertexInputBinding::of::<Vertex>(0))
                .add_attributes(&[
                    vertex_attribute(0, 0, vk::Format::R32G32_SFLOAT, 0),
                    vertex_attribute(1, 0, vk::Format::R32G32B32_SFLOAT, 8),
                ]),
        )
        .viewport(ViewportState::dynamic(1))
        .dynamic(
            DynamicState::new()
                .add_many(&[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]),
        );
        let pipeline = device.create_graphics_pipeline(&pipeline_info)?;
        // Shader modules are only needed while the pipeline is built
        drop((vertex_shader, fragment_shader));

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Geometry in device-local memory, uploaded through staging
        // ─────────────────────────────────────────────────────────────────────
        let command_pool =
            device.create_command_pool(&CommandPoolCreateInfo::new(graphics_family, true, false))?;

        let mut vertex_buffer = device.create_vertex_buffer(&VertexBufferCreateInfo::with_usage(
            std::mem::size_of_val(&VERTICES) as u64,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
        ))?;
        let mut index_buffer = device.create_index_buffer(&IndexBufferCreateInfo::with_usage(
            IndexType::U16,
            std::mem::size_of_val(&INDICES) as u64,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
        ))?;
        let geometry_memory = device.allocate_memory_for_buffers(
            &[&*vertex_buffer, &*index_buffer],
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        device.bind_buffer_memory(
            &mut [&mut *vertex_buffer, &mut *index_buffer],
            &geometry_memory,
        )?;
        upload_geometry(&command_pool, &device, &graphics_queue, &vertex_buffer, &index_buffer)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 7: One uniform slot per frame in flight, persistently mapped
        // ─────────────────────────────────────────────────────────────────────
        let frame_count = config.frames_in_flight();
        let stride = align_up(
            std::mem::size_of::<Uniforms>() as u64,
            physical.limits().min_uniform_buffer_offset_alignment,
        );
        let uniform_info = UniformBufferCreateInfo::new(stride * frame_count as u64);
        let mut uniform_buffer = device.create_uniform_buffer(&uniform_info)?;
        let uniform_memory = device.allocate_memory_for(
            &uniform_buffer,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        uniform_buffer.bind(&uniform_memory, 0, false)?;
        let uniform_mapping = uniform_memory.map(WHOLE_SIZE, 0, vk::MemoryMapFlags::empty())?;

        let pool_size =
            DescriptorPoolSize::new(vk::DescriptorType::UNIFORM_BUFFER, frame_count as u32);
        let descriptor_pool = device.create_descriptor_pool(
            &DescriptorPoolCreateInfo::new(frame_count as u32).add_pool_size(pool_size),
        )?;
        let descriptor_sets = descriptor_pool.allocate_sets_for(&set_layout, frame_count)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 8: Per-frame command buffers and sync
        // ─────────────────────────────────────────────────────────────────────
        let command_buffers = command_pool.alloc_buffers(frame_count as u32, false)?;
        let frames = command_buffers
            .into_iter()
            .zip(descriptor_sets)
            .enumerate()
            .map(|(i, (command_buffer, descriptor_set))| {
                let uniform_offset = stride * i as u64;
                let target = DescriptorSetWrite::new(&descriptor_set, 0);
                let write = DescriptorSetWriteBuffer::new(target).add_buffer(
                    DescriptorBufferInfo::uniform(&uniform_buffer)
                        .offset(uniform_offset)
                        .range(std::mem::size_of::<Uniforms>() as u64),
                );
                descriptor_set.update(&write)?;
                Ok(Frame {
                    command_buffer,
                    image_available: device.create_semaphore()?,
                    render_finished: device.create_semaphore()?,
                    in_flight: device.create_fence(true)?,
                    descriptor_set,
                    uniform_offset,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!("Vulkan initialized successfully!");
        Ok(Self {
            frames,
            current_frame: 0,
            _command_pool: command_pool,
            _descriptor_pool: descriptor_pool,
            pipeline,
            _pipeline_layout: pipeline_layout,
            _set_layout: set_layout,
            framebuffers,
            render_pass,
            uniform_mapping,
            _uniform_buffer: uniform_buffer,
            _uniform_memory: uniform_memory,
            vertex_buffer,
            index_buffer,
            _geometry_memory: geometry_memory,
            swapchain,
            graphics_queue,
            present_queue,
            queue_families,
            device,
            surface,
            _instance: instance,
            clear_color: config.graphics.clear_color,
            started: Instant::now(),
        })
    }

    /// Build a new swapchain from the old one. Skipped while minimized.
    fn recreate_swapchain(&mut self, config: &Config, window: &Window) -> Result<()> {
        if window.is_minimized() {
            return Ok(());
        }
        self.device.wait_idle()?;

        let info = swapchain_info(
            config,
            &self.device,
            &self.surface,
            window,
            &self.queue_families,
        )?
        .set_old_swapchain(&self.swapchain);
        let swapchain = self.device.create_swapchain(&info)?;

        self.framebuffers.clear();
        self.swapchain = swapchain;
        self.framebuffers = self.swapchain.create_framebuffers(&self.render_pass)?;
        Ok(())
    }

    /// Render one frame. Returns true when the swapchain must be recreated.
    fn draw(&mut self) -> Result<bool> {
        let frame = &mut self.frames[self.current_frame];

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait for the previous use of this slot
        // ─────────────────────────────────────────────────────────────────────
        frame.in_flight.wait(false, u64::MAX)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let image = match self.swapchain.next_image(Some(&frame.image_available), None, u64::MAX) {
            Ok(image) => image,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(true),
            Err(e) => return Err(e).context("Failed to acquire swapchain image"),
        };
        // Only reset once work will actually be submitted
        frame.in_flight.reset()?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Update this slot's uniform
        // ─────────────────────────────────────────────────────────────────────
        let angle = self.started.elapsed().as_secs_f32();
        let uniforms = Uniforms {
            transform: Mat4::from_rotation_z(angle).to_cols_array_2d(),
        };
        self.uniform_mapping
            .write(&[uniforms], frame.uniform_offset as usize)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Record
        // ─────────────────────────────────────────────────────────────────────
        let extent = self.swapchain.extent();
        let area = rect_2d(extent);
        let framebuffer = &self.framebuffers[image.index as usize];
        {
            let mut encoder = frame
                .command_buffer
                .begin_with(&CommandBufferBeginInfo::new().one_time())?;
            let begin = RenderPassBeginInfo::new(&self.render_pass, framebuffer, area)
                .add_clear_color(self.clear_color);
            let mut pass = encoder.begin_render_pass(&begin, vk::SubpassContents::INLINE)?;
            pass.bind_pipeline(&self.pipeline);
            pass.set_viewport(viewport_for(extent));
            pass.set_scissor(area);
            pass.bind_vertex_buffer(0, &self.vertex_buffer, 0);
            pass.bind_index_buffer(&self.index_buffer, 0);
            pass.bind_descriptor_set(&frame.descriptor_set, &[])?;
            pass.draw_indexed(self.index_buffer.index_count() as u32, 1, 0, 0, 0);
            pass.end();
            encoder.end()?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Submit and present
        // ─────────────────────────────────────────────────────────────────────
        self.graphics_queue.submit_frame(
            &frame.command_buffer,
            &frame.image_available,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            &frame.render_finished,
            &frame.in_flight,
        )?;

        let present = PresentInfo::new()
            .add_wait_semaphore(&frame.render_finished)
            .add_swapchain(&self.swapchain, image.index);
        let needs_recreate = match self.present_queue.present(&present) {
            Ok(suboptimal) => suboptimal || image.suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => return Err(e).context("Failed to present"),
        };

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        Ok(needs_recreate)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle failed during cleanup: {:?}", e);
        }
    }
}

fn swapchain_info(
    config: &Config,
    device: &Device,
    surface: &Surface,
    window: &Window,
    queue_families: &[u32],
) -> Result<SwapchainCreateInfo> {
    let attributes = SurfaceAttributes::query(device.physical(), surface)?;
    let extent = window.extent_for(&attributes.capabilities);
    let mut info = SwapchainCreateInfo::new(attributes, surface, queue_families)?
        .prefer_present_mode(&[config.present_mode(), vk::PresentModeKHR::FIFO])
        .prefer_format(&[vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB])
        .set_image_extent(extent);
    if config.graphics.image_count > 0 {
        info = info.set_image_count(config.graphics.image_count);
    }
    Ok(info)
}

fn create_render_pass(device: &std::sync::Arc<Device>, format: vk::Format) -> Result<RenderPass> {
    let color = AttachmentDescription::new(format)
        .color_depth(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::empty(),
    };
    device.create_render_pass(
        &RenderPassCreateInfo::new()
            .add_attachment(color)
            .add_subpass(
                SubpassDescription::new().color(0, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            )
            .add_dependency(dependency),
    )
}

/// Copy the triangle into device-local buffers and wait for it
fn upload_geometry(
    pool: &CommandPool,
    device: &std::sync::Arc<Device>,
    queue: &Queue,
    vertex_buffer: &VertexBuffer,
    index_buffer: &IndexBuffer,
) -> Result<()> {
    let mut command_buffer = pool.alloc_buffer(false)?;
    let mut encoder = command_buffer.begin_with(&CommandBufferBeginInfo::new().one_time())?;
    let vertex_staging = encoder.write_buffer_with_staging(&VERTICES, vertex_buffer, 0)?;
    let index_staging = encoder.write_buffer_with_staging(&INDICES, index_buffer, 0)?;
    encoder.end()?;

    let fence = device.create_fence(false)?;
    queue.submit_command_buffer(&command_buffer, Some(&fence))?;
    fence.wait(false, u64::MAX)?;
    log::debug!("Uploaded {} vertices, {} indices", VERTICES.len(), INDICES.len());

    // Staging must outlive the copy
    drop((vertex_staging, index_staging));
    Ok(())
}

// =============================================================================
// APPLICATION
// =============================================================================

struct TriangleApp {
    // Renderer first: the surface must go before the window
    renderer: Option<Renderer>,
    window: Option<Window>,
    config: Config,
    needs_resize: bool,
}

impl TriangleApp {
    fn new(config: Config) -> Self {
        Self {
            renderer: None,
            window: None,
            config,
            needs_resize: false,
        }
    }

    fn render(&mut self) -> Result<()> {
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };
        if window.is_minimized() {
            return Ok(());
        }
        if self.needs_resize {
            renderer.recreate_swapchain(&self.config, window)?;
            self.needs_resize = false;
        }
        if renderer.draw()? {
            self.needs_resize = true;
        }
        Ok(())
    }
}

impl engine::App for TriangleApp {}

impl ApplicationHandler for TriangleApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::create(
            event_loop,
            &self.config.window.title,
            self.config.window.width,
            self.config.window.height,
            self.config.window.resizable,
        ) {
            Ok(window) => window,
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&self.config, &window, &*self) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.renderer = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.needs_resize = true;
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
