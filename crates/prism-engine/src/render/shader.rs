//! Vertex + fragment shader programs.
//!
//! Lifecycle:
//! 1. `ShaderStage::compile` parses and validates both WGSL sources with naga.
//! 2. `bind_attribute_location` records which vertex input each slot feeds.
//! 3. `link` checks entry points, attribute bindings, the stage interface and
//!    the uniform table, producing a `LinkedShader`.
//! 4. `LinkedShader::create_program` builds the wgpu pipeline for a geometry layout.
//!
//! Steps 1–3 never touch the device.

use std::collections::BTreeMap;
use std::num::NonZeroU64;

use wgpu::util::DeviceExt;

use glam::Mat4;

use super::buffer::GpuBuffer;
use super::RenderCtx;
use crate::{GraphicsError, ShaderKind};

/// Entry point looked up in the vertex source.
pub const VERTEX_ENTRY: &str = "vs_main";

/// Entry point looked up in the fragment source.
pub const FRAGMENT_ENTRY: &str = "fs_main";

fn mat4_min_binding_size() -> NonZeroU64 {
    NonZeroU64::new(std::mem::size_of::<Mat4>() as u64)
        .expect("Mat4 has non-zero size by construction")
}

struct CompiledStage {
    source: String,
    module: naga::Module,
}

fn compile_stage(kind: ShaderKind, source: &str) -> Result<CompiledStage, GraphicsError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| GraphicsError::ShaderCompile {
        stage: kind,
        message: e.emit_to_string(source),
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| GraphicsError::ShaderCompile {
        stage: kind,
        message: e.emit_to_string(source),
    })?;

    Ok(CompiledStage {
        source: source.to_string(),
        module,
    })
}

/// A compiled but not yet linked shader pair.
pub struct ShaderStage {
    vertex: CompiledStage,
    fragment: CompiledStage,
    attribute_bindings: BTreeMap<String, u32>,
}

impl ShaderStage {
    /// Compiles both stages. Either failing yields `GraphicsError::ShaderCompile`.
    pub fn compile(vertex_source: &str, fragment_source: &str) -> Result<Self, GraphicsError> {
        let vertex = compile_stage(ShaderKind::Vertex, vertex_source)?;
        let fragment = compile_stage(ShaderKind::Fragment, fragment_source)?;
        Ok(Self {
            vertex,
            fragment,
            attribute_bindings: BTreeMap::new(),
        })
    }

    /// Declares that vertex input `name` is fed from attribute slot `index`.
    ///
    /// WGSL fixes locations in the source, so this is a checked expectation:
    /// `link` fails if the shader disagrees. Rebinding a name replaces it.
    pub fn bind_attribute_location(&mut self, index: u32, name: &str) {
        self.attribute_bindings.insert(name.to_string(), index);
    }

    /// Links the pair into a validated program description.
    pub fn link(self) -> Result<LinkedShader, GraphicsError> {
        let vs = find_entry(&self.vertex.module, VERTEX_ENTRY, naga::ShaderStage::Vertex)
            .ok_or_else(|| link_err(format!("vertex stage has no `{VERTEX_ENTRY}` entry point")))?;
        let fs = find_entry(&self.fragment.module, FRAGMENT_ENTRY, naga::ShaderStage::Fragment)
            .ok_or_else(|| {
                link_err(format!("fragment stage has no `{FRAGMENT_ENTRY}` entry point"))
            })?;

        let vertex_inputs = entry_inputs(&self.vertex.module, vs);
        check_attribute_bindings(&self.attribute_bindings, &vertex_inputs)?;

        let vertex_outputs = entry_outputs(&self.vertex.module, vs);
        for (location, name) in entry_inputs(&self.fragment.module, fs) {
            if !vertex_outputs.iter().any(|(l, _)| *l == location) {
                return Err(link_err(format!(
                    "fragment input `{name}` (location {location}) is not written by the vertex stage"
                )));
            }
        }

        let mut uniforms = BTreeMap::new();
        collect_uniforms(&self.vertex.module, &mut uniforms)?;
        collect_uniforms(&self.fragment.module, &mut uniforms)?;

        log::debug!(
            "shader linked: {} vertex inputs, uniforms [{}]",
            vertex_inputs.len(),
            uniforms.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        Ok(LinkedShader {
            vertex_source: self.vertex.source,
            fragment_source: self.fragment.source,
            vertex_inputs,
            uniforms,
        })
    }
}

fn link_err(msg: String) -> GraphicsError {
    GraphicsError::Link(msg)
}

fn find_entry<'m>(
    module: &'m naga::Module,
    name: &str,
    stage: naga::ShaderStage,
) -> Option<&'m naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.name == name && ep.stage == stage)
}

/// `(location, name)` of every user-defined input of an entry point.
fn entry_inputs(module: &naga::Module, ep: &naga::EntryPoint) -> Vec<(u32, String)> {
    let mut out = Vec::new();
    for arg in &ep.function.arguments {
        push_locations(module, arg.ty, arg.binding.as_ref(), arg.name.as_deref(), &mut out);
    }
    out.sort();
    out
}

/// `(location, name)` of every user-defined output of an entry point.
fn entry_outputs(module: &naga::Module, ep: &naga::EntryPoint) -> Vec<(u32, String)> {
    let mut out = Vec::new();
    if let Some(result) = &ep.function.result {
        push_locations(module, result.ty, result.binding.as_ref(), None, &mut out);
    }
    out.sort();
    out
}

fn push_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    name: Option<&str>,
    out: &mut Vec<(u32, String)>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.push((*location, name.unwrap_or_default().to_string()));
        }
        // builtins
        Some(_) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for m in members {
                    push_locations(module, m.ty, m.binding.as_ref(), m.name.as_deref(), out);
                }
            }
        }
    }
}

fn check_attribute_bindings(
    bindings: &BTreeMap<String, u32>,
    inputs: &[(u32, String)],
) -> Result<(), GraphicsError> {
    let mut seen: BTreeMap<u32, &str> = BTreeMap::new();

    for (name, &index) in bindings {
        if let Some(other) = seen.insert(index, name) {
            return Err(link_err(format!(
                "attributes `{other}` and `{name}` are both bound to location {index}"
            )));
        }

        let Some((location, _)) = inputs.iter().find(|(_, n)| n == name) else {
            return Err(link_err(format!("vertex stage has no input named `{name}`")));
        };
        if *location != index {
            return Err(link_err(format!(
                "`{name}` is declared at location {location} but bound to {index}"
            )));
        }
    }
    Ok(())
}

fn collect_uniforms(
    module: &naga::Module,
    uniforms: &mut BTreeMap<String, u32>,
) -> Result<(), GraphicsError> {
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else { continue };
        let name = var.name.clone().unwrap_or_default();

        let is_mat4 = matches!(
            module.types[var.ty].inner,
            naga::TypeInner::Matrix {
                columns: naga::VectorSize::Quad,
                rows: naga::VectorSize::Quad,
                scalar,
            } if scalar == naga::Scalar::F32
        );
        if var.space != naga::AddressSpace::Uniform || !is_mat4 {
            return Err(link_err(format!(
                "resource `{name}` is not a mat4x4<f32> uniform; only those are supported"
            )));
        }
        if binding.group != 0 {
            return Err(link_err(format!(
                "uniform `{name}` uses group {}; only group 0 is supported",
                binding.group
            )));
        }

        if let Some((other, _)) = uniforms
            .iter()
            .find(|(n, b)| **b == binding.binding && **n != name)
        {
            return Err(link_err(format!(
                "uniforms `{other}` and `{name}` share binding {}",
                binding.binding
            )));
        }
        match uniforms.get(&name) {
            Some(&b) if b != binding.binding => {
                return Err(link_err(format!(
                    "uniform `{name}` is bound to {b} in one stage and {} in the other",
                    binding.binding
                )));
            }
            _ => {
                uniforms.insert(name, binding.binding);
            }
        }
    }
    Ok(())
}

/// A linked shader pair, validated on the CPU.
#[derive(Debug, Clone)]
pub struct LinkedShader {
    vertex_source: String,
    fragment_source: String,
    vertex_inputs: Vec<(u32, String)>,
    uniforms: BTreeMap<String, u32>,
}

impl LinkedShader {
    /// Location of the vertex input called `name`.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.vertex_inputs
            .iter()
            .find(|(_, n)| n == name)
            .map(|(l, _)| *l)
    }

    /// Binding index (group 0) of the matrix uniform called `name`.
    pub fn uniform_binding(&self, name: &str) -> Result<u32, GraphicsError> {
        lookup_uniform(&self.uniforms, name).copied()
    }

    /// Verifies every vertex input is fed by one of `buffers`.
    pub fn check_vertex_buffers(
        &self,
        buffers: &[wgpu::VertexBufferLayout<'_>],
    ) -> Result<(), GraphicsError> {
        for (location, name) in &self.vertex_inputs {
            let fed = buffers
                .iter()
                .flat_map(|b| b.attributes.iter())
                .any(|a| a.shader_location == *location);
            if !fed {
                return Err(link_err(format!(
                    "vertex input `{name}` (location {location}) has no vertex buffer"
                )));
            }
        }
        Ok(())
    }

    /// Creates the GPU program for geometry described by `buffers`.
    pub fn create_program(
        &self,
        ctx: &RenderCtx<'_>,
        label: &str,
        buffers: &[wgpu::VertexBufferLayout<'_>],
        topology: wgpu::PrimitiveTopology,
    ) -> Result<ShaderProgram, GraphicsError> {
        self.check_vertex_buffers(buffers)?;

        let vs_module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} vertex")),
            source: wgpu::ShaderSource::Wgsl(self.vertex_source.as_str().into()),
        });
        let fs_module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} fragment")),
            source: wgpu::ShaderSource::Wgsl(self.fragment_source.as_str().into()),
        });

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = self
            .uniforms
            .values()
            .map(|&binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(mat4_min_binding_size()),
                },
                count: None,
            })
            .collect();

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{label} bgl")),
                    entries: &layout_entries,
                });

        let uniforms: BTreeMap<String, UniformSlot> = self
            .uniforms
            .iter()
            .map(|(name, &binding)| {
                let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{label} uniform {name}")),
                    contents: bytemuck::bytes_of(&Mat4::IDENTITY),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
                (
                    name.clone(),
                    UniformSlot {
                        binding,
                        buffer: GpuBuffer::new(buffer),
                    },
                )
            })
            .collect();

        let bind_group = (!uniforms.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupEntry> = uniforms
                .values()
                .map(|u| wgpu::BindGroupEntry {
                    binding: u.binding,
                    resource: u.buffer.raw().as_entire_binding(),
                })
                .collect();
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{label} bind group")),
                layout: &bind_group_layout,
                entries: &entries,
            })
        });

        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> = if bind_group.is_some() {
            vec![&bind_group_layout]
        } else {
            Vec::new()
        };

        let pipeline_layout =
            ctx.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(&format!("{label} pipeline layout")),
                    bind_group_layouts: &bind_group_layouts,
                    immediate_size: 0,
                });

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{label} pipeline")),
            layout: Some(&pipeline_layout),

            vertex: wgpu::VertexState {
                module: &vs_module,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &fs_module,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::info!("shader program `{label}` created ({topology:?})");

        Ok(ShaderProgram {
            pipeline,
            bind_group,
            uniforms,
        })
    }
}

fn lookup_uniform<'u, T>(
    uniforms: &'u BTreeMap<String, T>,
    name: &str,
) -> Result<&'u T, GraphicsError> {
    uniforms
        .get(name)
        .ok_or_else(|| GraphicsError::UnknownUniform(name.to_string()))
}

struct UniformSlot {
    binding: u32,
    buffer: GpuBuffer,
}

/// GPU-side program: pipeline, uniform buffers and their bind group.
pub struct ShaderProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group: Option<wgpu::BindGroup>,
    uniforms: BTreeMap<String, UniformSlot>,
}

impl ShaderProgram {
    /// Writes a `mat4x4<f32>` uniform. Takes effect for passes submitted afterwards.
    pub fn set_uniform_matrix4(
        &self,
        queue: &wgpu::Queue,
        name: &str,
        value: &Mat4,
    ) -> Result<(), GraphicsError> {
        let slot = lookup_uniform(&self.uniforms, name)?;
        queue.write_buffer(slot.buffer.raw(), 0, bytemuck::bytes_of(value));
        Ok(())
    }

    /// Binds the pipeline and uniforms for the rest of `pass`.
    ///
    /// There is no explicit unbind; the binding ends with the pass.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        if let Some(bind_group) = &self.bind_group {
            pass.set_bind_group(0, bind_group, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"
        @group(0) @binding(0) var<uniform> mvp: mat4x4<f32>;

        struct In {
            @location(0) pos: vec2<f32>,
            @location(1) tint: vec4<f32>,
        };

        struct Out {
            @builtin(position) clip: vec4<f32>,
            @location(0) tint: vec4<f32>,
        };

        @vertex
        fn vs_main(v: In) -> Out {
            var o: Out;
            o.clip = mvp * vec4<f32>(v.pos, 0.0, 1.0);
            o.tint = v.tint;
            return o;
        }
    "#;

    const FS: &str = r#"
        @fragment
        fn fs_main(@location(0) tint: vec4<f32>) -> @location(0) vec4<f32> {
            return tint;
        }
    "#;

    fn stage() -> ShaderStage {
        ShaderStage::compile(VS, FS).unwrap()
    }

    // ── compile ───────────────────────────────────────────────────────────

    #[test]
    fn syntax_error_names_the_stage() {
        let err = ShaderStage::compile(VS, "fn fs_main( {").err().unwrap();
        assert!(matches!(
            err,
            GraphicsError::ShaderCompile { stage: ShaderKind::Fragment, .. }
        ));
    }

    #[test]
    fn type_error_fails_validation() {
        let bad = r#"
            @vertex
            fn vs_main() -> @builtin(position) vec4<f32> {
                return 1.0;
            }
        "#;
        let err = ShaderStage::compile(bad, FS).err().unwrap();
        assert!(matches!(
            err,
            GraphicsError::ShaderCompile { stage: ShaderKind::Vertex, .. }
        ));
    }

    // ── link ──────────────────────────────────────────────────────────────

    #[test]
    fn links_with_matching_bindings() {
        let mut s = stage();
        s.bind_attribute_location(0, "pos");
        s.bind_attribute_location(1, "tint");
        let linked = s.link().unwrap();

        assert_eq!(linked.attribute_location("pos"), Some(0));
        assert_eq!(linked.attribute_location("tint"), Some(1));
        assert_eq!(linked.uniform_binding("mvp").unwrap(), 0);
    }

    #[test]
    fn unknown_uniform_name_is_rejected() {
        let linked = stage().link().unwrap();
        let err = linked.uniform_binding("model").unwrap_err();
        assert!(matches!(err, GraphicsError::UnknownUniform(ref n) if n == "model"));
    }

    #[test]
    fn uniform_lookup_is_by_exact_name() {
        let table: BTreeMap<String, u32> = [("mvp".to_string(), 0)].into_iter().collect();
        assert_eq!(lookup_uniform(&table, "mvp").unwrap(), &0);
        assert!(matches!(
            lookup_uniform(&table, "MVP"),
            Err(GraphicsError::UnknownUniform(ref n)) if n == "MVP"
        ));
    }

    #[test]
    fn wrong_location_fails_link() {
        let mut s = stage();
        s.bind_attribute_location(2, "pos");
        assert!(matches!(s.link(), Err(GraphicsError::Link(_))));
    }

    #[test]
    fn unknown_attribute_fails_link() {
        let mut s = stage();
        s.bind_attribute_location(0, "position");
        assert!(matches!(s.link(), Err(GraphicsError::Link(_))));
    }

    #[test]
    fn aliased_locations_fail_link() {
        let mut s = stage();
        s.bind_attribute_location(0, "pos");
        s.bind_attribute_location(0, "tint");
        assert!(matches!(s.link(), Err(GraphicsError::Link(_))));
    }

    #[test]
    fn rebinding_a_name_replaces_it() {
        let mut s = stage();
        s.bind_attribute_location(3, "pos");
        s.bind_attribute_location(0, "pos");
        assert!(s.link().is_ok());
    }

    #[test]
    fn missing_entry_point_fails_link() {
        let fs = r#"
            @fragment
            fn main(@location(0) tint: vec4<f32>) -> @location(0) vec4<f32> {
                return tint;
            }
        "#;
        let s = ShaderStage::compile(VS, fs).unwrap();
        assert!(matches!(s.link(), Err(GraphicsError::Link(_))));
    }

    #[test]
    fn unwritten_fragment_input_fails_link() {
        let fs = r#"
            @fragment
            fn fs_main(@location(3) tint: vec4<f32>) -> @location(0) vec4<f32> {
                return tint;
            }
        "#;
        let s = ShaderStage::compile(VS, fs).unwrap();
        assert!(matches!(s.link(), Err(GraphicsError::Link(_))));
    }

    #[test]
    fn non_matrix_uniform_fails_link() {
        let vs = r#"
            @group(0) @binding(0) var<uniform> scale: vec4<f32>;

            @vertex
            fn vs_main(@location(0) pos: vec2<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(pos, 0.0, 1.0) * scale;
            }
        "#;
        let fs = r#"
            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return vec4<f32>(1.0);
            }
        "#;
        let s = ShaderStage::compile(vs, fs).unwrap();
        assert!(matches!(s.link(), Err(GraphicsError::Link(_))));
    }

    // ── vertex buffers ────────────────────────────────────────────────────

    #[test]
    fn every_input_needs_a_buffer() {
        let linked = stage().link().unwrap();

        let pos = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: 0,
        }];
        let tint = [wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x4,
            offset: 0,
            shader_location: 1,
        }];
        let pos_layout = wgpu::VertexBufferLayout {
            array_stride: 8,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &pos,
        };
        let tint_layout = wgpu::VertexBufferLayout {
            array_stride: 16,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &tint,
        };

        assert!(linked.check_vertex_buffers(&[pos_layout.clone()]).is_err());
        assert!(linked.check_vertex_buffers(&[pos_layout, tint_layout]).is_ok());
    }
}
