//! Fixed scene content: one small quad drawn five times.

use glam::Mat4;
use prism_engine::coords::{ColorRgba, Vec2};
use prism_engine::render::{AttributeSink, BufferUsage};
use prism_engine::GraphicsError;

pub const VERTEX_SLOT: u32 = 0;
pub const COLOR_SLOT: u32 = 1;
pub const OFFSET_SLOT: u32 = 2;

/// Attribute slot → vertex shader input name.
pub const ATTRIBUTES: [(u32, &str); 3] = [
    (VERTEX_SLOT, "in_Vertex"),
    (COLOR_SLOT, "instance_Color"),
    (OFFSET_SLOT, "instance_Position"),
];

/// Name of the projection uniform in `Shader.vert`.
pub const MVP_UNIFORM: &str = "mvp";

/// Edge length of the quad in scene units.
pub const QUAD_SIDE: f32 = 0.1;

/// Orthographic volume the scene is projected from.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Projection {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            left: 0.0,
            right: 1.0,
            bottom: 0.0,
            top: 1.0,
            near: -1.0,
            far: 1.0,
        }
    }
}

impl Projection {
    /// Right-handed orthographic matrix with wgpu's `[0, 1]` depth range.
    pub fn matrix(&self) -> Mat4 {
        Mat4::orthographic_rh(self.left, self.right, self.bottom, self.top, self.near, self.far)
    }
}

/// Scene-level settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    pub clear_color: ColorRgba,
    pub projection: Projection,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            clear_color: ColorRgba::new(0.4, 0.6, 0.9, 0.0),
            projection: Projection::default(),
        }
    }
}

/// CPU copy of everything uploaded to the vertex array.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneData {
    /// Triangle-strip order.
    pub vertices: [Vec2; 4],
    pub colors: [ColorRgba; 5],
    pub offsets: [Vec2; 5],
}

impl Default for SceneData {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneData {
    pub fn new() -> Self {
        Self {
            vertices: [
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, QUAD_SIDE),
                Vec2::new(QUAD_SIDE, 0.0),
                Vec2::new(QUAD_SIDE, QUAD_SIDE),
            ],
            colors: [
                ColorRgba::RED,
                ColorRgba::GREEN,
                ColorRgba::BLUE,
                ColorRgba::YELLOW,
                ColorRgba::WHITE,
            ],
            offsets: [
                Vec2::new(0.1, 0.1),
                Vec2::new(0.1, 0.8),
                Vec2::new(0.8, 0.8),
                Vec2::new(0.8, 0.1),
                Vec2::new(0.45, 0.45),
            ],
        }
    }

    pub fn vertex_floats(&self) -> &[f32] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn color_floats(&self) -> &[f32] {
        bytemuck::cast_slice(&self.colors)
    }

    pub fn offset_floats(&self) -> &[f32] {
        bytemuck::cast_slice(&self.offsets)
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn instance_count(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Uploads the quad and both instance streams, then sets their divisors.
    pub fn upload(&self, sink: &mut impl AttributeSink) -> Result<(), GraphicsError> {
        sink.upload_attribute(VERTEX_SLOT, self.vertex_floats(), 2, BufferUsage::Static)?;
        sink.upload_attribute(COLOR_SLOT, self.color_floats(), 4, BufferUsage::Static)?;
        sink.upload_attribute(OFFSET_SLOT, self.offset_floats(), 2, BufferUsage::Static)?;

        sink.set_divisor(VERTEX_SLOT, 0)?;
        sink.set_divisor(COLOR_SLOT, 1)?;
        sink.set_divisor(OFFSET_SLOT, 1)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use prism_engine::render::{DrawCounts, StepRate, VertexArrayLayout};

    fn uploaded() -> VertexArrayLayout {
        let mut layout = VertexArrayLayout::new();
        SceneData::new().upload(&mut layout).unwrap();
        layout
    }

    fn tri_area(a: Vec2, b: Vec2, c: Vec2) -> f32 {
        ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() * 0.5
    }

    // ── data ──────────────────────────────────────────────────────────────

    #[test]
    fn offsets_lie_in_unit_square() {
        for o in SceneData::new().offsets {
            assert!(o.in_unit_square(), "{o:?} outside [0,1]x[0,1]");
        }
    }

    #[test]
    fn quad_is_a_strip_square_of_side_0_1() {
        let v = SceneData::new().vertices;
        assert_eq!(v.len(), 4);

        // Every vertex is a corner of [0, side]^2, and all four are distinct.
        for (i, p) in v.iter().enumerate() {
            assert!(p.x == 0.0 || p.x == QUAD_SIDE);
            assert!(p.y == 0.0 || p.y == QUAD_SIDE);
            assert!(v[i + 1..].iter().all(|q| q != p));
        }

        // Strip triangles (0,1,2) and (1,2,3) each cover half the square.
        let half = QUAD_SIDE * QUAD_SIDE * 0.5;
        assert!((tri_area(v[0], v[1], v[2]) - half).abs() < 1e-7);
        assert!((tri_area(v[1], v[2], v[3]) - half).abs() < 1e-7);

        // First and last vertices are opposite corners, so the shared edge is a diagonal.
        assert_ne!(v[0].x, v[3].x);
        assert_ne!(v[0].y, v[3].y);
    }

    #[test]
    fn instance_streams_agree_on_count() {
        let data = SceneData::new();
        assert_eq!(data.offset_floats().len() / 2, 5);
        assert_eq!(data.color_floats().len() / 4, 5);
        assert_eq!(data.instance_count(), 5);
    }

    #[test]
    fn colors_are_opaque_and_normalized() {
        for c in SceneData::new().colors {
            assert!(c.is_normalized());
            assert_eq!(c.a, 1.0);
        }
    }

    // ── upload ────────────────────────────────────────────────────────────

    #[test]
    fn divisors_after_upload() {
        let layout = uploaded();
        assert_eq!(layout.divisor(VERTEX_SLOT), Some(0));
        assert_eq!(layout.divisor(COLOR_SLOT), Some(1));
        assert_eq!(layout.divisor(OFFSET_SLOT), Some(1));
        assert_eq!(layout.attribute(COLOR_SLOT).unwrap().step, StepRate::PerInstance);
    }

    #[test]
    fn draw_counts_match_scene() {
        let data = SceneData::new();
        let counts = uploaded().counts().unwrap();
        assert_eq!(
            counts,
            DrawCounts {
                vertices: data.vertex_count(),
                instances: data.instance_count(),
            }
        );
        assert_eq!(counts.vertices, 4);
        assert_eq!(counts.instances, 5);
    }

    #[test]
    fn repeated_upload_is_deterministic() {
        assert_eq!(SceneData::new(), SceneData::new());
        assert_eq!(uploaded(), uploaded());
    }

    #[test]
    fn uploading_twice_into_one_array_fails() {
        let mut layout = uploaded();
        assert!(SceneData::new().upload(&mut layout).is_err());
    }

    // ── config ────────────────────────────────────────────────────────────

    #[test]
    fn unit_projection_maps_corners_to_clip_space() {
        let m = Projection::default().matrix();
        let low = m.project_point3(Vec3::ZERO);
        let high = m.project_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!(low.abs_diff_eq(Vec3::new(-1.0, -1.0, 0.5), 1e-6), "{low}");
        assert!(high.abs_diff_eq(Vec3::new(1.0, 1.0, 0.5), 1e-6), "{high}");
    }

    #[test]
    fn unit_projection_depth_stays_in_wgpu_range() {
        let m = Projection::default().matrix();
        for z in [-1.0, 0.0, 1.0] {
            let depth = m.project_point3(Vec3::new(0.5, 0.5, z)).z;
            assert!((0.0..=1.0).contains(&depth), "z = {z} gave depth {depth}");
        }
    }

    #[test]
    fn default_projection_covers_every_instance() {
        let m = SceneConfig::default().projection.matrix();
        let data = SceneData::new();
        for o in data.offsets {
            for v in data.vertices {
                let p = m.project_point3(Vec3::new(o.x + v.x, o.y + v.y, 0.0));
                assert!((-1.0..=1.0).contains(&p.x) && (-1.0..=1.0).contains(&p.y));
            }
        }
    }
}
