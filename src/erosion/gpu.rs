//! GPU-accelerated particle erosion using wgpu compute shaders
//!
//! Runs the same per-particle algorithm as the CPU kernel, one invocation per
//! particle. Particles that exit the chunk are appended to an output buffer
//! through an atomic counter. Invocations write heights without
//! synchronisation, so results are not bit-for-bit reproducible.
//!
//! Every buffer is created per call and wrapped in [`ScopedBuffer`], which
//! releases the GPU memory when it goes out of scope, including on error paths.

use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use std::ops::Deref;
use wgpu::util::DeviceExt;

use crate::config::ErosionConfig;
use crate::erosion::utils::create_erosion_brush;
use crate::erosion::{check_halo, ErosionKernel, ErosionStats, KernelOutput};
use crate::error::KernelError;
use crate::grid::Direction;
use crate::halo::HaloMap;
use crate::particle::{ExitStatus, Particle};

const WORKGROUP_SIZE: usize = 256;
const STATUS_IN_CHUNK: u32 = 8;

/// Parameters passed to the GPU compute shader
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct GpuParams {
    size: u32,
    resolution: u32,
    border: u32,
    particle_count: u32,
    brush_len: u32,
    max_lifetime: i32,
    inertia: f32,
    gravity: f32,
    evaporate_speed: f32,
    sediment_capacity_factor: f32,
    min_sediment_capacity: f32,
    deposit_speed: f32,
    erode_speed: f32,
    seed: u32,
    _pad0: u32,
    _pad1: u32,
}

/// Particle layout shared with the shader. `status` is a `Direction` index,
/// or `STATUS_IN_CHUNK`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct GpuParticle {
    pos_x: f32,
    pos_y: f32,
    dir_x: f32,
    dir_y: f32,
    speed: f32,
    water: f32,
    sediment: f32,
    age: i32,
    resilience: i32,
    status: u32,
}

impl From<&Particle> for GpuParticle {
    fn from(p: &Particle) -> Self {
        Self {
            pos_x: p.position[0],
            pos_y: p.position[1],
            dir_x: p.direction[0],
            dir_y: p.direction[1],
            speed: p.speed,
            water: p.water,
            sediment: p.sediment,
            age: p.age,
            resilience: p.halo_resilience,
            status: STATUS_IN_CHUNK,
        }
    }
}

impl From<GpuParticle> for Particle {
    fn from(p: GpuParticle) -> Self {
        let exit = match Direction::from_index(p.status as usize) {
            Some(dir) => ExitStatus::Exited(dir),
            None => ExitStatus::InChunk,
        };
        Particle {
            position: [p.pos_x, p.pos_y],
            direction: [p.dir_x, p.dir_y],
            speed: p.speed,
            water: p.water,
            sediment: p.sediment,
            age: p.age,
            halo_resilience: p.resilience,
            exit,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct GpuBrushWeight {
    dx: i32,
    dy: i32,
    weight: f32,
}

/// A GPU buffer destroyed when dropped.
struct ScopedBuffer(wgpu::Buffer);

impl Deref for ScopedBuffer {
    type Target = wgpu::Buffer;

    fn deref(&self) -> &wgpu::Buffer {
        &self.0
    }
}

impl Drop for ScopedBuffer {
    fn drop(&mut self) {
        self.0.destroy();
    }
}

/// GPU context for erosion computation
pub struct GpuKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuKernel {
    /// Create a new GPU erosion context.
    pub fn new() -> Result<Self, KernelError> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self, KernelError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| KernelError::GpuUnavailable {
                message: "no compatible adapter".to_string(),
            })?;

        log::info!("GPU Adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Erosion GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| KernelError::GpuUnavailable { message: e.to_string() })?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Erosion Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(EROSION_SHADER)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Erosion Bind Group Layout"),
            entries: &[
                // Halo heights
                storage_entry(0, false),
                // Incoming particles
                storage_entry(1, true),
                // Parameters uniform buffer
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Brush weights
                storage_entry(3, true),
                // Outgoing particles and their count
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Erosion Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Erosion Compute Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
        })
    }

    fn buffer_init(&self, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> ScopedBuffer {
        ScopedBuffer(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        }))
    }

    /// Copy `count` elements of `source` back to the CPU.
    fn read_back<T: Pod>(&self, source: &wgpu::Buffer, count: usize) -> Result<Vec<T>, KernelError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = (count * std::mem::size_of::<T>()) as u64;
        let staging = ScopedBuffer(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Copy Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| KernelError::Readback { message: e.to_string() })?
            .map_err(|e| KernelError::Readback { message: e.to_string() })?;

        let data = slice.get_mapped_range();
        let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(result)
    }
}

impl ErosionKernel for GpuKernel {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn simulate(
        &mut self,
        halo: &mut HaloMap,
        particles: &[Particle],
        config: &ErosionConfig,
        seed: u64,
    ) -> Result<KernelOutput, KernelError> {
        check_halo(halo)?;
        if particles.is_empty() {
            return Ok(KernelOutput::default());
        }

        let size = halo.bordered_resolution();
        let cells = size * size;
        let brush: Vec<GpuBrushWeight> = create_erosion_brush(config.erosion_brush_radius)
            .into_iter()
            .map(|(dx, dy, weight)| GpuBrushWeight { dx, dy, weight })
            .collect();
        let incoming: Vec<GpuParticle> = particles.iter().map(GpuParticle::from).collect();

        let params = GpuParams {
            size: size as u32,
            resolution: halo.resolution as u32,
            border: halo.border as u32,
            particle_count: incoming.len() as u32,
            brush_len: brush.len() as u32,
            max_lifetime: config.max_lifetime,
            inertia: config.inertia,
            gravity: config.gravity,
            evaporate_speed: config.evaporate_speed,
            sediment_capacity_factor: config.sediment_capacity_factor,
            min_sediment_capacity: config.min_sediment_capacity,
            deposit_speed: config.deposit_speed,
            erode_speed: config.erode_speed,
            seed: (seed ^ (seed >> 32)) as u32,
            _pad0: 0,
            _pad1: 0,
        };

        let heights_buffer = self.buffer_init(
            "Heights Buffer",
            bytemuck::cast_slice(halo.field.as_slice()),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let particles_buffer = self.buffer_init("Particles Buffer", bytemuck::cast_slice(&incoming), wgpu::BufferUsages::STORAGE);
        let params_buffer = self.buffer_init("Params Buffer", bytemuck::bytes_of(&params), wgpu::BufferUsages::UNIFORM);
        let brush_buffer = self.buffer_init("Brush Buffer", bytemuck::cast_slice(&brush), wgpu::BufferUsages::STORAGE);
        let outgoing_buffer = self.buffer_init(
            "Outgoing Buffer",
            bytemuck::cast_slice(&vec![GpuParticle::zeroed(); incoming.len()]),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let count_buffer = self.buffer_init(
            "Outgoing Count Buffer",
            bytemuck::bytes_of(&0u32),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Erosion Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: heights_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: particles_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: brush_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: outgoing_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: count_buffer.as_entire_binding() },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Erosion Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Erosion Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            let num_workgroups = incoming.len().div_ceil(WORKGROUP_SIZE);
            compute_pass.dispatch_workgroups(num_workgroups as u32, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);

        let heights: Vec<f32> = self.read_back(&heights_buffer, cells)?;
        let count = self
            .read_back::<u32>(&count_buffer, 1)?
            .first()
            .copied()
            .unwrap_or(0) as usize;
        let outgoing: Vec<GpuParticle> = self.read_back(&outgoing_buffer, count.min(incoming.len()))?;

        let mut stats = ErosionStats {
            particles_simulated: incoming.len(),
            particles_exited: outgoing.len(),
            ..Default::default()
        };
        for (old_h, &new_h) in halo.field.as_mut_slice().iter_mut().zip(&heights) {
            let diff = new_h - *old_h;
            if diff < 0.0 {
                stats.total_eroded += (-diff) as f64;
                stats.max_erosion = stats.max_erosion.max(-diff);
            } else if diff > 0.0 {
                stats.total_deposited += diff as f64;
                stats.max_deposition = stats.max_deposition.max(diff);
            }
            *old_h = new_h;
        }

        Ok(KernelOutput {
            particles: outgoing.into_iter().map(Particle::from).collect(),
            stats,
        })
    }
}

/// WGSL compute shader for particle erosion over a halo map
const EROSION_SHADER: &str = r#"
struct Params {
    size: u32,
    resolution: u32,
    border: u32,
    particle_count: u32,
    brush_len: u32,
    max_lifetime: i32,
    inertia: f32,
    gravity: f32,
    evaporate_speed: f32,
    sediment_capacity_factor: f32,
    min_sediment_capacity: f32,
    deposit_speed: f32,
    erode_speed: f32,
    seed: u32,
    _pad0: u32,
    _pad1: u32,
}

struct Particle {
    pos_x: f32,
    pos_y: f32,
    dir_x: f32,
    dir_y: f32,
    speed: f32,
    water: f32,
    sediment: f32,
    age: i32,
    resilience: i32,
    status: u32,
}

struct BrushWeight {
    dx: i32,
    dy: i32,
    weight: f32,
}

const IN_CHUNK: u32 = 8u;

@group(0) @binding(0) var<storage, read_write> heights: array<f32>;
@group(0) @binding(1) var<storage, read> particles: array<Particle>;
@group(0) @binding(2) var<uniform> params: Params;
@group(0) @binding(3) var<storage, read> brush: array<BrushWeight>;
@group(0) @binding(4) var<storage, read_write> outgoing: array<Particle>;
@group(0) @binding(5) var<storage, read_write> outgoing_count: atomic<u32>;

// PCG random number generator
fn pcg_hash(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn random_f32(seed: ptr<function, u32>) -> f32 {
    *seed = pcg_hash(*seed);
    return f32(*seed) / 4294967295.0;
}

fn idx(x: u32, y: u32) -> u32 {
    return y * params.size + x;
}

// Cell and offset, clamped so (x + 1, y + 1) stays inside the halo
fn cell_of(x: f32, y: f32) -> vec4<f32> {
    let max_c = f32(params.size - 2u);
    let cx = clamp(x, 0.0, f32(params.size - 1u));
    let cy = clamp(y, 0.0, f32(params.size - 1u));
    let ix = min(floor(cx), max_c);
    let iy = min(floor(cy), max_c);
    return vec4<f32>(ix, iy, cx - ix, cy - iy);
}

// (height, grad_x, grad_y)
fn height_and_gradient(x: f32, y: f32) -> vec3<f32> {
    let c = cell_of(x, y);
    let ix = u32(c.x);
    let iy = u32(c.y);
    let fx = c.z;
    let fy = c.w;

    let h00 = heights[idx(ix, iy)];
    let h10 = heights[idx(ix + 1u, iy)];
    let h01 = heights[idx(ix, iy + 1u)];
    let h11 = heights[idx(ix + 1u, iy + 1u)];

    let gx = (h10 - h00) * (1.0 - fy) + (h11 - h01) * fy;
    let gy = (h01 - h00) * (1.0 - fx) + (h11 - h10) * fx;
    let h = mix(mix(h00, h10, fx), mix(h01, h11, fx), fy);
    return vec3<f32>(h, gx, gy);
}

fn deposit(x: f32, y: f32, amount: f32) {
    let c = cell_of(x, y);
    let ix = u32(c.x);
    let iy = u32(c.y);
    let fx = c.z;
    let fy = c.w;
    heights[idx(ix, iy)] += amount * (1.0 - fx) * (1.0 - fy);
    heights[idx(ix + 1u, iy)] += amount * fx * (1.0 - fy);
    heights[idx(ix, iy + 1u)] += amount * (1.0 - fx) * fy;
    heights[idx(ix + 1u, iy + 1u)] += amount * fx * fy;
}

fn erode(cx: i32, cy: i32, amount: f32) -> f32 {
    var removed = 0.0;
    let size = i32(params.size);
    for (var i = 0u; i < params.brush_len; i++) {
        let b = brush[i];
        let nx = cx + b.dx;
        let ny = cy + b.dy;
        if (nx < 0 || ny < 0 || nx >= size || ny >= size) {
            continue;
        }
        let d = amount * b.weight;
        heights[idx(u32(nx), u32(ny))] -= d;
        removed += d;
    }
    return removed;
}

fn side(v: f32, lo: f32, hi: f32) -> i32 {
    if (v < lo) {
        return -1;
    }
    if (v >= hi) {
        return 1;
    }
    return 0;
}

// Direction index, clockwise from North
fn exit_status(sx: i32, sy: i32) -> u32 {
    if (sx == 0 && sy == 1) { return 0u; }
    if (sx == 1 && sy == 1) { return 1u; }
    if (sx == 1 && sy == 0) { return 2u; }
    if (sx == 1 && sy == -1) { return 3u; }
    if (sx == 0 && sy == -1) { return 4u; }
    if (sx == -1 && sy == -1) { return 5u; }
    if (sx == -1 && sy == 0) { return 6u; }
    if (sx == -1 && sy == 1) { return 7u; }
    return IN_CHUNK;
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let id = global_id.x;
    if (id >= params.particle_count) {
        return;
    }

    var p = particles[id];
    p.status = IN_CHUNK;
    var rng_state = params.seed ^ (id * 1664525u + 1013904223u);

    let slack = f32(max(p.resilience, 0));
    let lo = f32(params.border) - slack;
    let hi = f32(params.border + params.resolution) + slack;

    while (p.age < params.max_lifetime) {
        let old_x = p.pos_x;
        let old_y = p.pos_y;
        let hg = height_and_gradient(old_x, old_y);

        var dir_x = p.dir_x * params.inertia - hg.y * (1.0 - params.inertia);
        var dir_y = p.dir_y * params.inertia - hg.z * (1.0 - params.inertia);
        let len = sqrt(dir_x * dir_x + dir_y * dir_y);
        if (len > 0.0001) {
            dir_x = dir_x / len;
            dir_y = dir_y / len;
        } else {
            let angle = random_f32(&rng_state) * 6.28318;
            dir_x = cos(angle);
            dir_y = sin(angle);
        }

        p.dir_x = dir_x;
        p.dir_y = dir_y;
        p.pos_x = old_x + dir_x;
        p.pos_y = old_y + dir_y;
        p.age += 1;

        let status = exit_status(side(p.pos_x, lo, hi), side(p.pos_y, lo, hi));
        if (status != IN_CHUNK) {
            p.status = status;
            let slot = atomicAdd(&outgoing_count, 1u);
            outgoing[slot] = p;
            return;
        }

        let delta_height = height_and_gradient(p.pos_x, p.pos_y).x - hg.x;
        let capacity = max(
            -delta_height * p.speed * p.water * params.sediment_capacity_factor,
            params.min_sediment_capacity
        );

        if (p.sediment > capacity || delta_height > 0.0) {
            let amount = select(
                (p.sediment - capacity) * params.deposit_speed,
                min(delta_height, p.sediment),
                delta_height > 0.0
            );
            if (amount > 0.0) {
                p.sediment -= amount;
                deposit(old_x, old_y, amount);
            }
        } else {
            let amount = min((capacity - p.sediment) * params.erode_speed, -delta_height);
            if (amount > 0.0) {
                p.sediment += erode(i32(max(old_x, 0.0)), i32(max(old_y, 0.0)), amount);
            }
        }

        p.speed = sqrt(max(p.speed * p.speed - delta_height * params.gravity, 0.0));
        p.water = p.water * (1.0 - params.evaporate_speed);
    }

    if (p.sediment > 0.0) {
        deposit(p.pos_x, p.pos_y, p.sediment);
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_layouts_match_shader() {
        assert_eq!(std::mem::size_of::<GpuParams>(), 64);
        assert_eq!(std::mem::size_of::<GpuParticle>(), 40);
        assert_eq!(std::mem::size_of::<GpuBrushWeight>(), 12);
    }

    #[test]
    fn test_particle_status_conversion() {
        let mut p = Particle::new(3.0, 4.0, 1.0, 1.0, 2);
        p.age = 5;
        let mut gpu = GpuParticle::from(&p);
        assert_eq!(gpu.status, STATUS_IN_CHUNK);
        assert_eq!(Particle::from(gpu), p);

        gpu.status = Direction::SouthWest.index() as u32;
        assert_eq!(Particle::from(gpu).exit, ExitStatus::Exited(Direction::SouthWest));
    }
}
