//! Vertex attribute buffers and their step rates.
//!
//! `VertexArrayLayout` is the CPU-side record of which slot holds what and how it
//! advances. `GeometryStage` drives the same record while uploading real buffers,
//! and `finish` turns it into a bindable `Geometry`.
//!
//! Each slot gets its own buffer and its shader location equals the slot number.

use std::collections::BTreeMap;

use wgpu::util::DeviceExt;

use super::buffer::GpuBuffer;
use crate::GraphicsError;

/// Highest slot accepted. Matches wgpu's default `max_vertex_attributes` minus one.
pub const MAX_SLOT: u32 = 15;

const F32_SIZE: u64 = std::mem::size_of::<f32>() as u64;

/// How often an attribute advances to its next element.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum StepRate {
    /// Divisor 0: next element every vertex.
    #[default]
    PerVertex,
    /// Divisor 1: next element every instance.
    PerInstance,
}

impl StepRate {
    /// Converts a GL-style attribute divisor.
    ///
    /// Only 0 and 1 exist on the wgpu side; larger divisors are rejected rather
    /// than silently stepping every instance.
    pub fn from_divisor(slot: u32, divisor: u32) -> Result<Self, GraphicsError> {
        match divisor {
            0 => Ok(StepRate::PerVertex),
            1 => Ok(StepRate::PerInstance),
            _ => Err(GraphicsError::UnsupportedDivisor { slot, divisor }),
        }
    }

    #[inline]
    pub fn divisor(self) -> u32 {
        match self {
            StepRate::PerVertex => 0,
            StepRate::PerInstance => 1,
        }
    }

    #[inline]
    pub fn step_mode(self) -> wgpu::VertexStepMode {
        match self {
            StepRate::PerVertex => wgpu::VertexStepMode::Vertex,
            StepRate::PerInstance => wgpu::VertexStepMode::Instance,
        }
    }
}

/// Update policy of an attribute buffer.
///
/// Only `Static` exists: buffers are written once at upload and never again.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum BufferUsage {
    #[default]
    Static,
}

impl BufferUsage {
    fn wgpu_usages(self) -> wgpu::BufferUsages {
        match self {
            BufferUsage::Static => wgpu::BufferUsages::VERTEX,
        }
    }
}

/// Receiver of attribute uploads.
///
/// Scene setup code is written against this trait so the same sequence can be
/// replayed into a plain `VertexArrayLayout` without a device.
pub trait AttributeSink {
    /// Uploads a flat `f32` buffer into `slot`, `components` floats per element.
    fn upload_attribute(
        &mut self,
        slot: u32,
        data: &[f32],
        components: u32,
        usage: BufferUsage,
    ) -> Result<(), GraphicsError>;

    /// Sets the advance rate of an uploaded slot (0 = per vertex, 1 = per instance).
    fn set_divisor(&mut self, slot: u32, divisor: u32) -> Result<(), GraphicsError>;
}

/// Description of one attribute slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttributeDesc {
    pub slot: u32,
    pub components: u32,
    pub elements: u32,
    pub step: StepRate,
    pub usage: BufferUsage,
}

impl AttributeDesc {
    pub fn format(&self) -> wgpu::VertexFormat {
        match self.components {
            1 => wgpu::VertexFormat::Float32,
            2 => wgpu::VertexFormat::Float32x2,
            3 => wgpu::VertexFormat::Float32x3,
            _ => wgpu::VertexFormat::Float32x4,
        }
    }

    pub fn stride(&self) -> u64 {
        self.components as u64 * F32_SIZE
    }
}

/// Element counts a draw call must use for a given layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawCounts {
    pub vertices: u32,
    pub instances: u32,
}

/// Slot → attribute description, ordered by slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexArrayLayout {
    attributes: BTreeMap<u32, AttributeDesc>,
}

impl VertexArrayLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(&self, slot: u32) -> Option<&AttributeDesc> {
        self.attributes.get(&slot)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDesc> {
        self.attributes.values()
    }

    /// Divisor of `slot`, or `None` if nothing was uploaded there.
    pub fn divisor(&self, slot: u32) -> Option<u32> {
        self.attributes.get(&slot).map(|a| a.step.divisor())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Resolves vertex and instance counts.
    ///
    /// All per-vertex slots must hold the same number of elements, and so must
    /// all per-instance slots. A layout without per-instance slots draws one instance.
    pub fn counts(&self) -> Result<DrawCounts, GraphicsError> {
        let vertices = self.common_count(StepRate::PerVertex)?.unwrap_or(0);
        let instances = self.common_count(StepRate::PerInstance)?.unwrap_or(1);
        Ok(DrawCounts { vertices, instances })
    }

    fn common_count(&self, step: StepRate) -> Result<Option<u32>, GraphicsError> {
        let mut count: Option<(u32, u32)> = None;
        for a in self.attributes.values().filter(|a| a.step == step) {
            match count {
                None => count = Some((a.slot, a.elements)),
                Some((first, n)) if n != a.elements => {
                    return Err(GraphicsError::InvalidAttribute {
                        slot: a.slot,
                        reason: format!(
                            "{} elements, but slot {first} with the same step rate has {n}",
                            a.elements
                        ),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(count.map(|(_, n)| n))
    }

    fn record(
        &mut self,
        slot: u32,
        len: usize,
        components: u32,
        usage: BufferUsage,
    ) -> Result<AttributeDesc, GraphicsError> {
        if slot > MAX_SLOT {
            return Err(invalid(slot, format!("slot exceeds the maximum of {MAX_SLOT}")));
        }
        if !(1..=4).contains(&components) {
            return Err(invalid(slot, format!("{components} components per element (expected 1..=4)")));
        }
        if len == 0 {
            return Err(invalid(slot, "no data"));
        }
        if len % components as usize != 0 {
            return Err(invalid(
                slot,
                format!("{len} floats is not a multiple of {components} components"),
            ));
        }
        if self.attributes.contains_key(&slot) {
            return Err(invalid(slot, "slot already holds a buffer"));
        }

        let elements = u32::try_from(len / components as usize)
            .map_err(|_| invalid(slot, "too many elements"))?;

        let desc = AttributeDesc {
            slot,
            components,
            elements,
            step: StepRate::PerVertex,
            usage,
        };
        self.attributes.insert(slot, desc);
        Ok(desc)
    }
}

impl AttributeSink for VertexArrayLayout {
    fn upload_attribute(
        &mut self,
        slot: u32,
        data: &[f32],
        components: u32,
        usage: BufferUsage,
    ) -> Result<(), GraphicsError> {
        self.record(slot, data.len(), components, usage).map(|_| ())
    }

    fn set_divisor(&mut self, slot: u32, divisor: u32) -> Result<(), GraphicsError> {
        let step = StepRate::from_divisor(slot, divisor)?;
        let desc = self
            .attributes
            .get_mut(&slot)
            .ok_or_else(|| invalid(slot, "divisor set before any data was uploaded"))?;
        desc.step = step;
        Ok(())
    }
}

fn invalid(slot: u32, reason: impl Into<String>) -> GraphicsError {
    GraphicsError::InvalidAttribute {
        slot,
        reason: reason.into(),
    }
}

// ── GPU side ──────────────────────────────────────────────────────────────

/// Open acquisition scope for a vertex array.
///
/// Every upload allocates one buffer; nothing is bindable until `finish`.
pub struct GeometryStage<'d> {
    device: &'d wgpu::Device,
    label: String,
    layout: VertexArrayLayout,
    buffers: BTreeMap<u32, GpuBuffer>,
}

impl<'d> GeometryStage<'d> {
    /// Opens a new vertex array.
    pub fn create(device: &'d wgpu::Device, label: impl Into<String>) -> Self {
        let label = label.into();
        log::debug!("geometry `{label}`: scope opened");
        Self {
            device,
            label,
            layout: VertexArrayLayout::new(),
            buffers: BTreeMap::new(),
        }
    }

    /// Closes the scope and yields bindable geometry.
    pub fn finish(mut self) -> Result<Geometry, GraphicsError> {
        let counts = self.layout.counts()?;

        let mut slots = Vec::with_capacity(self.layout.len());
        for desc in self.layout.attributes() {
            // `record` and the buffer insert happen together, so this always hits.
            let Some(buffer) = self.buffers.remove(&desc.slot) else {
                return Err(invalid(desc.slot, "buffer missing for recorded slot"));
            };
            slots.push(BoundSlot {
                buffer,
                stride: desc.stride(),
                step_mode: desc.step.step_mode(),
                attribute: wgpu::VertexAttribute {
                    format: desc.format(),
                    offset: 0,
                    shader_location: desc.slot,
                },
            });
        }

        log::debug!(
            "geometry `{}`: {} slots, {} vertices x {} instances",
            self.label,
            slots.len(),
            counts.vertices,
            counts.instances
        );

        Ok(Geometry {
            label: std::mem::take(&mut self.label),
            slots,
            counts,
        })
    }
}

impl AttributeSink for GeometryStage<'_> {
    fn upload_attribute(
        &mut self,
        slot: u32,
        data: &[f32],
        components: u32,
        usage: BufferUsage,
    ) -> Result<(), GraphicsError> {
        let desc = self.layout.record(slot, data.len(), components, usage)?;

        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} slot {slot}", self.label)),
            contents: bytemuck::cast_slice(data),
            usage: usage.wgpu_usages(),
        });
        self.buffers.insert(slot, GpuBuffer::new(buffer));

        log::trace!(
            "geometry `{}`: slot {slot} <- {} x {} floats ({usage:?})",
            self.label,
            desc.elements,
            desc.components
        );
        Ok(())
    }

    fn set_divisor(&mut self, slot: u32, divisor: u32) -> Result<(), GraphicsError> {
        self.layout.set_divisor(slot, divisor)
    }
}

struct BoundSlot {
    buffer: GpuBuffer,
    stride: u64,
    step_mode: wgpu::VertexStepMode,
    attribute: wgpu::VertexAttribute,
}

/// Finished vertex array: one buffer per slot, in slot order.
///
/// Buffers are destroyed when this value is dropped.
pub struct Geometry {
    label: String,
    slots: Vec<BoundSlot>,
    counts: DrawCounts,
}

impl Geometry {
    pub fn vertex_count(&self) -> u32 {
        self.counts.vertices
    }

    pub fn instance_count(&self) -> u32 {
        self.counts.instances
    }

    /// Buffer layouts in bind order, for pipeline creation.
    pub fn vertex_buffer_layouts(&self) -> Vec<wgpu::VertexBufferLayout<'_>> {
        self.slots
            .iter()
            .map(|s| wgpu::VertexBufferLayout {
                array_stride: s.stride,
                step_mode: s.step_mode,
                attributes: std::slice::from_ref(&s.attribute),
            })
            .collect()
    }

    /// Binds every slot's buffer in the same order as `vertex_buffer_layouts`.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        for (index, slot) in self.slots.iter().enumerate() {
            pass.set_vertex_buffer(index as u32, slot.buffer.raw().slice(..));
        }
    }
}

impl Drop for Geometry {
    fn drop(&mut self) {
        log::debug!("geometry `{}`: releasing {} buffers", self.label, self.slots.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_and_instances() -> VertexArrayLayout {
        let mut layout = VertexArrayLayout::new();
        layout.upload_attribute(0, &[0.0; 8], 2, BufferUsage::Static).unwrap();
        layout.upload_attribute(1, &[1.0; 20], 4, BufferUsage::Static).unwrap();
        layout.upload_attribute(2, &[0.5; 10], 2, BufferUsage::Static).unwrap();
        layout.set_divisor(0, 0).unwrap();
        layout.set_divisor(1, 1).unwrap();
        layout.set_divisor(2, 1).unwrap();
        layout
    }

    // ── step rate ─────────────────────────────────────────────────────────

    #[test]
    fn divisor_round_trips_through_step_rate() {
        assert_eq!(StepRate::from_divisor(0, 0).unwrap(), StepRate::PerVertex);
        assert_eq!(StepRate::from_divisor(0, 1).unwrap(), StepRate::PerInstance);
        assert_eq!(StepRate::PerInstance.divisor(), 1);
        assert_eq!(StepRate::PerInstance.step_mode(), wgpu::VertexStepMode::Instance);
    }

    #[test]
    fn divisor_above_one_is_rejected() {
        let err = StepRate::from_divisor(3, 2).unwrap_err();
        assert!(matches!(err, GraphicsError::UnsupportedDivisor { slot: 3, divisor: 2 }));
    }

    // ── upload ────────────────────────────────────────────────────────────

    #[test]
    fn upload_defaults_to_per_vertex() {
        let mut layout = VertexArrayLayout::new();
        layout.upload_attribute(4, &[0.0; 6], 3, BufferUsage::Static).unwrap();
        let a = layout.attribute(4).unwrap();
        assert_eq!(a.elements, 2);
        assert_eq!(a.step, StepRate::PerVertex);
        assert_eq!(a.format(), wgpu::VertexFormat::Float32x3);
        assert_eq!(a.stride(), 12);
    }

    #[test]
    fn ragged_data_is_rejected() {
        let mut layout = VertexArrayLayout::new();
        let err = layout.upload_attribute(0, &[0.0; 7], 2, BufferUsage::Static).unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidAttribute { slot: 0, .. }));
    }

    #[test]
    fn bad_component_counts_are_rejected() {
        let mut layout = VertexArrayLayout::new();
        assert!(layout.upload_attribute(0, &[0.0; 5], 5, BufferUsage::Static).is_err());
        assert!(layout.upload_attribute(0, &[0.0; 4], 0, BufferUsage::Static).is_err());
    }

    #[test]
    fn empty_data_and_high_slots_are_rejected() {
        let mut layout = VertexArrayLayout::new();
        assert!(layout.upload_attribute(0, &[], 2, BufferUsage::Static).is_err());
        assert!(layout.upload_attribute(MAX_SLOT + 1, &[0.0; 2], 2, BufferUsage::Static).is_err());
    }

    #[test]
    fn slot_cannot_be_uploaded_twice() {
        let mut layout = VertexArrayLayout::new();
        layout.upload_attribute(0, &[0.0; 2], 2, BufferUsage::Static).unwrap();
        assert!(layout.upload_attribute(0, &[0.0; 2], 2, BufferUsage::Static).is_err());
    }

    // ── divisors ──────────────────────────────────────────────────────────

    #[test]
    fn divisor_requires_uploaded_slot() {
        let mut layout = VertexArrayLayout::new();
        assert!(matches!(
            layout.set_divisor(1, 1),
            Err(GraphicsError::InvalidAttribute { slot: 1, .. })
        ));
    }

    #[test]
    fn divisors_are_recorded_per_slot() {
        let layout = quad_and_instances();
        assert_eq!(layout.divisor(0), Some(0));
        assert_eq!(layout.divisor(1), Some(1));
        assert_eq!(layout.divisor(2), Some(1));
        assert_eq!(layout.divisor(3), None);
    }

    // ── counts ────────────────────────────────────────────────────────────

    #[test]
    fn counts_split_by_step_rate() {
        let counts = quad_and_instances().counts().unwrap();
        assert_eq!(counts, DrawCounts { vertices: 4, instances: 5 });
    }

    #[test]
    fn mismatched_instance_rows_fail() {
        let mut layout = VertexArrayLayout::new();
        layout.upload_attribute(0, &[0.0; 8], 2, BufferUsage::Static).unwrap();
        layout.upload_attribute(1, &[0.0; 20], 4, BufferUsage::Static).unwrap();
        layout.upload_attribute(2, &[0.0; 8], 2, BufferUsage::Static).unwrap();
        layout.set_divisor(1, 1).unwrap();
        layout.set_divisor(2, 1).unwrap();
        assert!(matches!(
            layout.counts(),
            Err(GraphicsError::InvalidAttribute { slot: 2, .. })
        ));
    }

    #[test]
    fn no_instance_slots_means_one_instance() {
        let mut layout = VertexArrayLayout::new();
        layout.upload_attribute(0, &[0.0; 6], 2, BufferUsage::Static).unwrap();
        assert_eq!(layout.counts().unwrap(), DrawCounts { vertices: 3, instances: 1 });
    }
}
