use ash::khr;
use ash::{vk, Entry, Instance};
use bevy::log::{info, warn};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashSet;
use std::ffi::CString;
use std::mem;
use std::path::Path;

use crate::constants::*;
use crate::error::{RenderError, RenderResult};

pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    fn families(&self) -> RenderResult<(u32, u32)> {
        match (self.graphics_family, self.present_family) {
            (Some(graphics), Some(present)) => Ok((graphics, present)),
            _ => Err(RenderError::device("queue families incomplete")),
        }
    }
}

pub fn find_queue_families(
    instance: &Instance,
    surface_loader: &khr::surface::Instance,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> QueueFamilyIndices {
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices {
        graphics_family: None,
        present_family: None,
    };

    for (i, queue_family) in queue_families.iter().enumerate() {
        if queue_family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics_family = Some(i as u32);
        }

        let present_support = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i as u32, surface)
                .unwrap_or(false)
        };

        if present_support {
            indices.present_family = Some(i as u32);
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Picks the first GPU that can present to `surface` and write
/// `gl_ClipDistance`, which the water passes depend on.
pub fn pick_physical_device(
    instance: &Instance,
    surface_loader: &khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> RenderResult<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    for device in devices {
        let features = unsafe { instance.get_physical_device_features(device) };
        if features.shader_clip_distance != vk::TRUE {
            continue;
        }

        let indices = find_queue_families(instance, surface_loader, surface, device);
        if indices.is_complete() {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            if let Ok(name) = properties.device_name_as_c_str() {
                info!("Using GPU {:?}", name);
            }
            return Ok((device, indices));
        }
    }

    Err(RenderError::device("no GPU with presentation and clip distance support"))
}

pub fn create_logical_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    indices: &QueueFamilyIndices,
) -> RenderResult<ash::Device> {
    let (graphics_family, present_family) = indices.families()?;
    let mut unique_queue_families = HashSet::new();
    unique_queue_families.insert(graphics_family);
    unique_queue_families.insert(present_family);

    let queue_priorities = [1.0];
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_queue_families
        .into_iter()
        .map(|queue_family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let supported = unsafe { instance.get_physical_device_features(physical_device) };
    let device_features = vk::PhysicalDeviceFeatures::default()
        .shader_clip_distance(true)
        .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE);

    let device_extensions = [khr::swapchain::NAME.as_ptr()];

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_features(&device_features)
        .enabled_extension_names(&device_extensions);

    let device = unsafe { instance.create_device(physical_device, &create_info, None)? };

    Ok(device)
}

pub fn create_swapchain(
    surface_loader: &khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    swapchain_loader: &khr::swapchain::Device,
    indices: &QueueFamilyIndices,
    window_extent: vk::Extent2D,
) -> RenderResult<(vk::SwapchainKHR, Vec<vk::Image>, vk::Format, vk::Extent2D)> {
    let capabilities = unsafe {
        surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
    };

    let formats = unsafe {
        surface_loader.get_physical_device_surface_formats(physical_device, surface)?
    };

    let present_modes = unsafe {
        surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
    };

    let surface_format = formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| RenderError::device("surface reports no formats"))?;

    // MAILBOX if available, FIFO otherwise (always supported)
    let present_mode = present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO);

    info!("Selected present mode: {:?}", present_mode);

    // u32::MAX means the surface size follows the swapchain
    let extent = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    };

    let image_count = (capabilities.min_image_count + 1).min(
        if capabilities.max_image_count > 0 { capabilities.max_image_count } else { u32::MAX }
    );

    let (graphics_family, present_family) = indices.families()?;
    let queue_family_indices = [graphics_family, present_family];

    let mut create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT);

    if graphics_family != present_family {
        create_info = create_info
            .image_sharing_mode(vk::SharingMode::CONCURRENT)
            .queue_family_indices(&queue_family_indices);
    } else {
        create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
    }

    create_info = create_info
        .pre_transform(capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
    let swapchain_images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

    Ok((swapchain, swapchain_images, surface_format.format, extent))
}

pub fn create_image_views(
    device: &ash::Device,
    swapchain_images: &[vk::Image],
    swapchain_format: vk::Format,
) -> RenderResult<Vec<vk::ImageView>> {
    swapchain_images
        .iter()
        .map(|&image| {
            create_image_view(
                device,
                image,
                swapchain_format,
                vk::ImageViewType::TYPE_2D,
                vk::ImageAspectFlags::COLOR,
                1,
            )
        })
        .collect()
}

pub fn find_depth_format(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> RenderResult<vk::Format> {
    let candidates = [
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D24_UNORM_S8_UINT,
        vk::Format::D32_SFLOAT,
    ];

    for format in candidates {
        let props = unsafe {
            instance.get_physical_device_format_properties(physical_device, format)
        };

        if props.optimal_tiling_features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT) {
            return Ok(format);
        }
    }

    Err(RenderError::device("no supported depth format"))
}

pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

pub fn find_memory_type(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    let mem_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };

    for i in 0..mem_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0 &&
           mem_properties.memory_types[i as usize].property_flags.contains(properties) {
            return Ok(i);
        }
    }

    Err(RenderError::device("no suitable memory type"))
}

pub fn create_framebuffer(
    device: &ash::Device,
    attachments: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> RenderResult<vk::Framebuffer> {
    let framebuffer_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    Ok(unsafe { device.create_framebuffer(&framebuffer_info, None)? })
}

pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> RenderResult<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family_index);

    let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

    Ok(command_pool)
}

pub fn create_command_buffers(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    count: usize,
) -> RenderResult<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);

    let command_buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };

    Ok(command_buffers)
}

pub fn create_sync_objects(
    device: &ash::Device,
) -> RenderResult<(Vec<vk::Semaphore>, Vec<vk::Semaphore>, Vec<vk::Fence>)> {
    let semaphore_info = vk::SemaphoreCreateInfo::default();
    let fence_info = vk::FenceCreateInfo::default()
        .flags(vk::FenceCreateFlags::SIGNALED);

    let mut image_available_semaphores = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    let mut render_finished_semaphores = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    let mut in_flight_fences = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        image_available_semaphores.push(unsafe { device.create_semaphore(&semaphore_info, None)? });
        render_finished_semaphores.push(unsafe { device.create_semaphore(&semaphore_info, None)? });
        in_flight_fences.push(unsafe { device.create_fence(&fence_info, None)? });
    }

    Ok((image_available_semaphores, render_finished_semaphores, in_flight_fences))
}

pub fn create_shader_module(device: &ash::Device, code: &[u8]) -> RenderResult<vk::ShaderModule> {
    if code.len() % 4 != 0 {
        return Err(RenderError::shader("SPIR-V length is not a multiple of 4"));
    }
    let code_u32: Vec<u32> = code.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    let create_info = vk::ShaderModuleCreateInfo::default()
        .code(&code_u32);

    let shader_module = unsafe { device.create_shader_module(&create_info, None)? };

    Ok(shader_module)
}

pub fn create_buffer(
    instance: &Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> RenderResult<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None)? };

    let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(mem_requirements.size)
        .memory_type_index(find_memory_type(
            instance,
            physical_device,
            mem_requirements.memory_type_bits,
            properties,
        )?);

    let buffer_memory = unsafe { device.allocate_memory(&alloc_info, None)? };

    unsafe { device.bind_buffer_memory(buffer, buffer_memory, 0)? };

    Ok((buffer, buffer_memory))
}

/// Copies `bytes` into host-visible, host-coherent memory.
pub fn write_host_memory(
    device: &ash::Device,
    memory: vk::DeviceMemory,
    bytes: &[u8],
) -> RenderResult<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    unsafe {
        let data = device.map_memory(memory, 0, bytes.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), data as *mut u8, bytes.len());
        device.unmap_memory(memory);
    }
    Ok(())
}

pub fn copy_buffer(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    src_buffer: vk::Buffer,
    dst_buffer: vk::Buffer,
    size: vk::DeviceSize,
) -> RenderResult<()> {
    let command_buffer = begin_single_time_commands(device, command_pool)?;

    let copy_region = vk::BufferCopy::default()
        .size(size);

    unsafe {
        device.cmd_copy_buffer(command_buffer, src_buffer, dst_buffer, &[copy_region]);
    }

    end_single_time_commands(device, command_pool, queue, command_buffer)
}

/// Uploads `data` through a staging buffer into a device-local buffer.
pub fn create_device_local_buffer<T: bytemuck::Pod>(
    instance: &Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    data: &[T],
    usage: vk::BufferUsageFlags,
) -> RenderResult<(vk::Buffer, vk::DeviceMemory)> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    if bytes.is_empty() {
        return Err(RenderError::upload("refusing to create an empty buffer"));
    }
    let buffer_size = bytes.len() as vk::DeviceSize;

    let (staging_buffer, staging_buffer_memory) = create_buffer(
        instance,
        device,
        physical_device,
        buffer_size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    write_host_memory(device, staging_buffer_memory, bytes)?;

    let (buffer, buffer_memory) = create_buffer(
        instance,
        device,
        physical_device,
        buffer_size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let copied = copy_buffer(device, command_pool, queue, staging_buffer, buffer, buffer_size);
    destroy_buffer(device, staging_buffer, staging_buffer_memory);
    copied?;

    Ok((buffer, buffer_memory))
}

pub fn create_vertex_buffer<T: bytemuck::Pod>(
    instance: &Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    vertices: &[T],
) -> RenderResult<(vk::Buffer, vk::DeviceMemory)> {
    create_device_local_buffer(
        instance,
        device,
        physical_device,
        command_pool,
        queue,
        vertices,
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )
}

pub fn create_index_buffer(
    instance: &Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    indices: &[u32],
) -> RenderResult<(vk::Buffer, vk::DeviceMemory)> {
    create_device_local_buffer(
        instance,
        device,
        physical_device,
        command_pool,
        queue,
        indices,
        vk::BufferUsageFlags::INDEX_BUFFER,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn create_image(
    instance: &Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    layers: u32,
    flags: vk::ImageCreateFlags,
) -> RenderResult<(vk::Image, vk::DeviceMemory)> {
    let image_info = vk::ImageCreateInfo::default()
        .flags(flags)
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(layers)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .samples(vk::SampleCountFlags::TYPE_1);

    let image = unsafe { device.create_image(&image_info, None)? };

    let mem_requirements = unsafe { device.get_image_memory_requirements(image) };

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(mem_requirements.size)
        .memory_type_index(find_memory_type(
            instance,
            physical_device,
            mem_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?);

    let image_memory = unsafe { device.allocate_memory(&alloc_info, None)? };

    unsafe { device.bind_image_memory(image, image_memory, 0)? };

    Ok((image, image_memory))
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    view_type: vk::ImageViewType,
    aspect_mask: vk::ImageAspectFlags,
    layers: u32,
) -> RenderResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: layers,
        });

    Ok(unsafe { device.create_image_view(&view_info, None)? })
}

/// Depth/stencil image sized to `extent`, with its view.
pub fn create_depth_resources(
    instance: &Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
    extent: vk::Extent2D,
    depth_format: vk::Format,
) -> RenderResult<(vk::Image, vk::DeviceMemory, vk::ImageView)> {
    let (image, memory) = create_image(
        instance,
        device,
        physical_device,
        extent,
        depth_format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        1,
        vk::ImageCreateFlags::empty(),
    )?;
    let view = create_image_view(
        device,
        image,
        depth_format,
        vk::ImageViewType::TYPE_2D,
        vk::ImageAspectFlags::DEPTH,
        1,
    )?;
    Ok((image, memory, view))
}

pub fn transition_image_layout(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    layer_count: u32,
) -> RenderResult<()> {
    let (src_access_mask, dst_access_mask, src_stage, dst_stage) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_SRC_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        _ => {
            return Err(RenderError::unsupported(format!(
                "layout transition {:?} -> {:?}",
                old_layout, new_layout
            )))
        }
    };

    let command_buffer = begin_single_time_commands(device, command_pool)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count,
        })
        .src_access_mask(src_access_mask)
        .dst_access_mask(dst_access_mask);

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    end_single_time_commands(device, command_pool, queue, command_buffer)
}

/// Copies tightly packed RGBA8 layers, one after another in `buffer`, into
/// consecutive array layers of `image`.
#[allow(clippy::too_many_arguments)]
pub fn copy_buffer_to_image(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
    layer_count: u32,
) -> RenderResult<()> {
    let command_buffer = begin_single_time_commands(device, command_pool)?;

    let layer_size = (width * height * 4) as vk::DeviceSize;

    let regions: Vec<vk::BufferImageCopy> = (0..layer_count)
        .map(|layer| {
            vk::BufferImageCopy::default()
                .buffer_offset(layer as vk::DeviceSize * layer_size)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: layer,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                })
        })
        .collect();

    unsafe {
        device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &regions,
        );
    }

    end_single_time_commands(device, command_pool, queue, command_buffer)
}

pub fn begin_single_time_commands(
    device: &ash::Device,
    command_pool: vk::CommandPool,
) -> RenderResult<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_pool(command_pool)
        .command_buffer_count(1);

    let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info)? }
        .into_iter()
        .next()
        .ok_or_else(|| RenderError::device("command buffer allocation returned nothing"))?;

    let begin_info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device.begin_command_buffer(command_buffer, &begin_info)?;
    }

    Ok(command_buffer)
}

pub fn end_single_time_commands(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
    command_buffer: vk::CommandBuffer,
) -> RenderResult<()> {
    let result = unsafe {
        device.end_command_buffer(command_buffer).and_then(|_| {
            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default()
                .command_buffers(&command_buffers);
            device.queue_submit(queue, &[submit_info], vk::Fence::null())?;
            device.queue_wait_idle(queue)
        })
    };

    unsafe {
        device.free_command_buffers(command_pool, &[command_buffer]);
    }

    Ok(result?)
}

pub fn create_texture_sampler(
    device: &ash::Device,
    max_anisotropy: Option<f32>,
) -> RenderResult<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(max_anisotropy.is_some())
        .max_anisotropy(max_anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0);

    Ok(unsafe { device.create_sampler(&sampler_info, None)? })
}

// Helper functions for common cleanup patterns
pub fn destroy_buffer(device: &ash::Device, buffer: vk::Buffer, memory: vk::DeviceMemory) {
    unsafe {
        device.destroy_buffer(buffer, None);
        device.free_memory(memory, None);
    }
}

pub fn destroy_image(device: &ash::Device, image: vk::Image, memory: vk::DeviceMemory, view: vk::ImageView) {
    unsafe {
        device.destroy_image_view(view, None);
        device.destroy_image(image, None);
        device.free_memory(memory, None);
    }
}

// Descriptor set helper functions
pub fn create_descriptor_pool(
    device: &ash::Device,
    max_sets: u32,
    pool_sizes: &[vk::DescriptorPoolSize],
) -> RenderResult<vk::DescriptorPool> {
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .pool_sizes(pool_sizes)
        .max_sets(max_sets);

    Ok(unsafe { device.create_descriptor_pool(&pool_info, None)? })
}

pub fn create_descriptor_set_layout(
    device: &ash::Device,
    bindings: &[vk::DescriptorSetLayoutBinding],
) -> RenderResult<vk::DescriptorSetLayout> {
    let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
        .bindings(bindings);

    Ok(unsafe { device.create_descriptor_set_layout(&layout_info, None)? })
}

pub fn allocate_descriptor_set(
    device: &ash::Device,
    descriptor_pool: vk::DescriptorPool,
    set_layout: vk::DescriptorSetLayout,
) -> RenderResult<vk::DescriptorSet> {
    let set_layouts = [set_layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(descriptor_pool)
        .set_layouts(&set_layouts);

    unsafe { device.allocate_descriptor_sets(&alloc_info)? }
        .into_iter()
        .next()
        .ok_or_else(|| RenderError::device("descriptor set allocation returned nothing"))
}

/// Single-subpass render pass with one color and one depth attachment. The
/// color attachment ends in `color_final_layout`, and the outgoing dependency
/// is chosen so the next consumer (sampling, transfer or present) sees the
/// finished writes.
pub fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    color_final_layout: vk::ImageLayout,
    depth_format: vk::Format,
) -> RenderResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(color_final_layout);

    let depth_attachment = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let color_attachment_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let depth_attachment_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachment_refs)
        .depth_stencil_attachment(&depth_attachment_ref)];

    let incoming = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);

    let (dst_stage, dst_access) = match color_final_layout {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ)
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_READ)
        }
        _ => (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty()),
    };

    let outgoing = vk::SubpassDependency::default()
        .src_subpass(0)
        .dst_subpass(vk::SUBPASS_EXTERNAL)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access);

    let attachments = [color_attachment, depth_attachment];
    let dependencies = [incoming, outgoing];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    Ok(unsafe { device.create_render_pass(&render_pass_info, None)? })
}

pub struct PipelineBuilder {
    device: ash::Device,
    vert_shader_code: Vec<u8>,
    frag_shader_code: Vec<u8>,
    vertex_binding_descriptions: Vec<vk::VertexInputBindingDescription>,
    vertex_attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    depth_compare_op: vk::CompareOp,
    cull_mode: vk::CullModeFlags,
    with_alpha_blending: bool,
}

impl PipelineBuilder {
    /// Reads `<stem>.vert.spv` and `<stem>.frag.spv` from `shader_dir`.
    pub fn new(
        device: ash::Device,
        shader_dir: &Path,
        stem: &str,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> RenderResult<Self> {
        let read = |suffix: &str| {
            let path = shader_dir.join(format!("{stem}.{suffix}.spv"));
            std::fs::read(&path)
                .map_err(|e| RenderError::shader(format!("{}: {}", path.display(), e)))
        };
        let vert_shader_code = read("vert")?;
        let frag_shader_code = read("frag")?;

        Ok(Self {
            device,
            vert_shader_code,
            frag_shader_code,
            vertex_binding_descriptions: Vec::new(),
            vertex_attribute_descriptions: Vec::new(),
            layout,
            render_pass,
            depth_compare_op: vk::CompareOp::LESS,
            cull_mode: vk::CullModeFlags::NONE,
            with_alpha_blending: false,
        })
    }

    pub fn with_vertex_input(
        mut self,
        binding_descriptions: Vec<vk::VertexInputBindingDescription>,
        attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_binding_descriptions = binding_descriptions;
        self.vertex_attribute_descriptions = attribute_descriptions;
        self
    }

    pub fn with_depth_compare(mut self, op: vk::CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    pub fn with_cull_mode(mut self, mode: vk::CullModeFlags) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn with_alpha_blending(mut self, enable: bool) -> Self {
        self.with_alpha_blending = enable;
        self
    }

    /// Viewport and scissor are dynamic so one pipeline serves targets of any size.
    pub fn build(self) -> RenderResult<vk::Pipeline> {
        let vert_shader_module = create_shader_module(&self.device, &self.vert_shader_code)?;
        let frag_shader_module = match create_shader_module(&self.device, &self.frag_shader_code) {
            Ok(module) => module,
            Err(e) => {
                unsafe { self.device.destroy_shader_module(vert_shader_module, None) };
                return Err(e);
            }
        };

        let result = self.build_with_modules(vert_shader_module, frag_shader_module);

        unsafe {
            self.device.destroy_shader_module(vert_shader_module, None);
            self.device.destroy_shader_module(frag_shader_module, None);
        }

        result
    }

    fn build_with_modules(
        &self,
        vert_shader_module: vk::ShaderModule,
        frag_shader_module: vk::ShaderModule,
    ) -> RenderResult<vk::Pipeline> {
        let main_name = c"main";

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_shader_module)
                .name(main_name),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_shader_module)
                .name(main_name),
        ];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_binding_descriptions)
            .vertex_attribute_descriptions(&self.vertex_attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = if self.with_alpha_blending {
            vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
        } else {
            vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
        };

        let attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&attachments);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(self.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .render_pass(self.render_pass)
            .subpass(0);

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|(_, e)| e)?;

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::shader("pipeline creation returned nothing"))
    }
}

/// Instance, device, swapchain and per-frame synchronization for one window.
pub struct VulkanCore {
    pub _entry: Entry,
    pub instance: Instance,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::surface::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::swapchain::Device,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_format: vk::Format,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain_image_views: Vec<vk::ImageView>,
    pub depth_format: vk::Format,
    pub depth_image: vk::Image,
    pub depth_image_memory: vk::DeviceMemory,
    pub depth_image_view: vk::ImageView,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub image_available_semaphores: Vec<vk::Semaphore>,
    pub render_finished_semaphores: Vec<vk::Semaphore>,
    pub in_flight_fences: Vec<vk::Fence>,
    pub current_frame: usize,
    pub queue_family_indices: QueueFamilyIndices,
}

impl VulkanCore {
    pub fn new(
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        let entry = unsafe { Entry::load()? };

        let app_name = CString::new("Water View").map_err(RenderError::device)?;
        let engine_name = CString::new("No Engine").map_err(RenderError::device)?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = ash_window::enumerate_required_extensions(display_handle)?.to_vec();
        extensions.push(khr::surface::NAME.as_ptr());

        let layer_names: Vec<CString> = if ENABLE_VALIDATION_LAYERS {
            vec![CString::new("VK_LAYER_KHRONOS_validation").map_err(RenderError::device)?]
        } else {
            vec![]
        };
        let layer_names_raw: Vec<*const std::ffi::c_char> = layer_names
            .iter()
            .map(|raw_name| raw_name.as_ptr())
            .collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_raw);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)?
        };
        let surface_loader = khr::surface::Instance::new(&entry, &instance);

        let (physical_device, indices) = pick_physical_device(&instance, &surface_loader, surface)?;
        let (graphics_family, present_family) = indices.families()?;
        let device = create_logical_device(&instance, physical_device, &indices)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        let swapchain_loader = khr::swapchain::Device::new(&instance, &device);
        let (swapchain, swapchain_images, swapchain_format, swapchain_extent) = create_swapchain(
            &surface_loader,
            surface,
            physical_device,
            &swapchain_loader,
            &indices,
            window_extent,
        )?;
        let swapchain_image_views = create_image_views(&device, &swapchain_images, swapchain_format)?;

        let depth_format = find_depth_format(&instance, physical_device)?;
        let (depth_image, depth_image_memory, depth_image_view) =
            create_depth_resources(&instance, &device, physical_device, swapchain_extent, depth_format)?;

        let render_pass = create_render_pass(
            &device,
            swapchain_format,
            vk::ImageLayout::PRESENT_SRC_KHR,
            depth_format,
        )?;

        let framebuffers = swapchain_image_views
            .iter()
            .map(|&view| create_framebuffer(&device, &[view, depth_image_view], render_pass, swapchain_extent))
            .collect::<RenderResult<Vec<_>>>()?;

        let command_pool = create_command_pool(&device, graphics_family)?;
        let command_buffers = create_command_buffers(&device, command_pool, MAX_FRAMES_IN_FLIGHT)?;

        let (image_available_semaphores, render_finished_semaphores, in_flight_fences) =
            create_sync_objects(&device)?;

        info!(
            "Vulkan core ready: {}x{} swapchain, {} images",
            swapchain_extent.width,
            swapchain_extent.height,
            swapchain_images.len()
        );

        Ok(Self {
            _entry: entry,
            instance,
            surface,
            surface_loader,
            physical_device,
            device,
            graphics_queue,
            present_queue,
            swapchain,
            swapchain_loader,
            swapchain_images,
            swapchain_format,
            swapchain_extent,
            swapchain_image_views,
            depth_format,
            depth_image,
            depth_image_memory,
            depth_image_view,
            render_pass,
            framebuffers,
            command_pool,
            command_buffers,
            image_available_semaphores,
            render_finished_semaphores,
            in_flight_fences,
            current_frame: 0,
            queue_family_indices: indices,
        })
    }

    /// Waits for this frame slot, acquires a swapchain image and resets the
    /// slot's command buffer. `None` means the swapchain is out of date.
    pub fn begin_frame(&mut self) -> RenderResult<Option<u32>> {
        unsafe {
            self.device.wait_for_fences(
                &[self.in_flight_fences[self.current_frame]],
                true,
                u64::MAX
            )?;

            let image_index = match self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available_semaphores[self.current_frame],
                vk::Fence::null(),
            ) {
                Ok((index, _suboptimal)) => index,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            self.device.reset_fences(&[self.in_flight_fences[self.current_frame]])?;
            self.device.reset_command_buffer(
                self.command_buffers[self.current_frame],
                vk::CommandBufferResetFlags::empty(),
            )?;

            Ok(Some(image_index))
        }
    }

    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffers[self.current_frame]
    }

    /// Submits the current slot's command buffer and presents. Returns true
    /// when the swapchain should be recreated.
    pub fn end_frame(&mut self, image_index: u32) -> RenderResult<bool> {
        let needs_recreate = unsafe {
            let wait_semaphores = [self.image_available_semaphores[self.current_frame]];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let command_buffers = [self.command_buffers[self.current_frame]];
            let signal_semaphores = [self.render_finished_semaphores[self.current_frame]];

            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            self.device.queue_submit(
                self.graphics_queue,
                &[submit_info],
                self.in_flight_fences[self.current_frame],
            )?;

            let swapchains = [self.swapchain];
            let image_indices = [image_index];
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&signal_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);

            match self.swapchain_loader.queue_present(self.present_queue, &present_info) {
                Ok(suboptimal) => suboptimal,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
                Err(e) => return Err(e.into()),
            }
        };

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        Ok(needs_recreate)
    }

    /// Rebuilds the swapchain, its depth buffer and framebuffers for a new
    /// window size. The render pass is kept; its formats do not change.
    pub fn recreate_swapchain(&mut self, window_extent: vk::Extent2D) -> RenderResult<()> {
        if window_extent.width == 0 || window_extent.height == 0 {
            return Ok(());
        }

        unsafe { self.device.device_wait_idle()? };
        self.destroy_swapchain_resources();

        let (swapchain, images, format, extent) = create_swapchain(
            &self.surface_loader,
            self.surface,
            self.physical_device,
            &self.swapchain_loader,
            &self.queue_family_indices,
            window_extent,
        )?;
        if format != self.swapchain_format {
            warn!("Swapchain format changed from {:?} to {:?}", self.swapchain_format, format);
        }
        self.swapchain = swapchain;
        self.swapchain_images = images;
        self.swapchain_extent = extent;
        self.swapchain_image_views = create_image_views(&self.device, &self.swapchain_images, format)?;

        let (depth_image, depth_memory, depth_view) = create_depth_resources(
            &self.instance,
            &self.device,
            self.physical_device,
            extent,
            self.depth_format,
        )?;
        self.depth_image = depth_image;
        self.depth_image_memory = depth_memory;
        self.depth_image_view = depth_view;

        self.framebuffers = self
            .swapchain_image_views
            .iter()
            .map(|&view| create_framebuffer(&self.device, &[view, depth_view], self.render_pass, extent))
            .collect::<RenderResult<Vec<_>>>()?;

        info!("Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }

            if self.depth_image_view != vk::ImageView::null() {
                destroy_image(&self.device, self.depth_image, self.depth_image_memory, self.depth_image_view);
                self.depth_image_view = vk::ImageView::null();
            }

            for image_view in self.swapchain_image_views.drain(..) {
                self.device.destroy_image_view(image_view, None);
            }

            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }

    pub fn min_uniform_alignment(&self) -> vk::DeviceSize {
        let properties = unsafe { self.instance.get_physical_device_properties(self.physical_device) };
        properties.limits.min_uniform_buffer_offset_alignment.max(1)
    }

    pub fn max_sampler_anisotropy(&self) -> Option<f32> {
        let features = unsafe { self.instance.get_physical_device_features(self.physical_device) };
        if features.sampler_anisotropy != vk::TRUE {
            return None;
        }
        let properties = unsafe { self.instance.get_physical_device_properties(self.physical_device) };
        Some(properties.limits.max_sampler_anisotropy.min(16.0))
    }
}

impl Drop for VulkanCore {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            for i in 0..MAX_FRAMES_IN_FLIGHT {
                self.device.destroy_semaphore(self.image_available_semaphores[i], None);
                self.device.destroy_semaphore(self.render_finished_semaphores[i], None);
                self.device.destroy_fence(self.in_flight_fences[i], None);
            }

            self.device.destroy_command_pool(self.command_pool, None);
        }

        self.destroy_swapchain_resources();

        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Size of one `T` rounded up to a multiple of `alignment`.
pub fn aligned_stride<T>(alignment: vk::DeviceSize) -> vk::DeviceSize {
    let size = mem::size_of::<T>() as vk::DeviceSize;
    size.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_rounds_up_to_alignment() {
        assert_eq!(aligned_stride::<[u8; 320]>(256), 512);
        assert_eq!(aligned_stride::<[u8; 256]>(256), 256);
        assert_eq!(aligned_stride::<[u8; 4]>(1), 4);
    }

    #[test]
    fn stencil_formats_clear_both_aspects() {
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
    }
}
