use std::cell::RefCell;
use std::rc::Rc;

use web_sys::{HtmlImageElement, WebGl2RenderingContext};

use crate::config::SceneConfig;
use crate::error::{RenderError, RenderResult};
use crate::renderer::buffer::{GpuSlot, MeshBuffers};
use crate::renderer::context::RenderContext;
use crate::renderer::shader::{TRIANGLES, UNSIGNED_INT};
use crate::renderer::texture::{self, FrameSet, Sampling, SharedFrames};

// Attribute slots shared by both water programs
pub const POSITION_LOCATION: u32 = 0;
pub const TEXCOORD_LOCATION: u32 = 1;

/// Largest grid the mesh builder accepts, in cells
pub const MAX_GRID_CELLS: usize = 1 << 20;
const _: () = assert!(MAX_GRID_CELLS * 4 - 1 <= u32::MAX as usize);

// Absorbs quotients such as 2 / 0.1 landing just under an integer
const GRID_SLACK: f32 = 1e-4;

/// Surface displacement technique
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaterMode {
    /// Analytic sine wave animated by time
    Sine,
    /// Displacement sampled from animated height textures
    HeightMap,
}

impl WaterMode {
    pub const ALL: [WaterMode; 2] = [WaterMode::Sine, WaterMode::HeightMap];

    /// Model-space height of the undisplaced surface
    pub fn plane_height(self, config: &SceneConfig) -> f32 {
        match self {
            WaterMode::Sine => config.water_height,
            WaterMode::HeightMap => config.height_map_plane,
        }
    }

    /// Host-facing code: 0 hides the water, 1 is sine, 2 is height map
    pub fn from_code(code: u32) -> RenderResult<Option<WaterMode>> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(WaterMode::Sine)),
            2 => Ok(Some(WaterMode::HeightMap)),
            other => Err(RenderError::InvalidConfig(format!(
                "Unknown water mode: {}",
                other
            ))),
        }
    }
}

/// Cells per side for `cell_size`.
///
/// Truncates, so a size that does not divide 2 leaves a strip uncovered
/// rather than overhanging the square.
pub fn grid_side(cell_size: f32) -> RenderResult<u32> {
    if !cell_size.is_finite() || cell_size <= 0.0 || cell_size > 2.0 {
        return Err(RenderError::InvalidMesh(format!(
            "cell size must be in (0, 2], got {}",
            cell_size
        )));
    }
    let side = (2.0 / cell_size + GRID_SLACK) as usize;
    match side.checked_mul(side) {
        Some(cells) if cells <= MAX_GRID_CELLS => Ok(side as u32),
        _ => Err(RenderError::InvalidMesh(format!(
            "cell size {} needs {}x{} cells, more than {}",
            cell_size, side, side, MAX_GRID_CELLS
        ))),
    }
}

/// Tessellated `[-1, 1]²` grid at a fixed height, four vertices per cell
#[derive(Debug, Clone)]
pub struct WaterGeometry {
    pub positions: Vec<f32>,
    pub tex_coords: Vec<f32>,
    pub indices: Vec<u32>,
    pub width: u32,
    pub height: u32,
    pub cell_size: f32,
}

impl WaterGeometry {
    pub fn generate(cell_size: f32, plane_height: f32) -> RenderResult<WaterGeometry> {
        let width = grid_side(cell_size)?;
        if !plane_height.is_finite() {
            return Err(RenderError::InvalidMesh(format!(
                "plane height must be finite, got {}",
                plane_height
            )));
        }

        let s = cell_size;
        let y = plane_height;
        let height = width;
        let cells = (width * height) as usize;

        let mut positions = Vec::with_capacity(cells * 4 * 3);
        let mut tex_coords = Vec::with_capacity(cells * 4 * 2);
        let mut indices = Vec::with_capacity(cells * 6);

        let (fw, fh) = (width as f32, height as f32);
        for h in 0..height {
            for w in 0..width {
                let x0 = w as f32 * s - 1.0 + s;
                let z0 = h as f32 * s - 1.0 + s;
                let x1 = x0 - s;
                let z2 = z0 - s;

                positions.extend_from_slice(&[
                    x0, y, z0, // p0
                    x1, y, z0, // p1
                    x1, y, z2, // p2
                    x0, y, z2, // p3
                ]);

                let (u0, u1) = (w as f32 / fw, (w + 1) as f32 / fw);
                let (v0, v1) = (h as f32 / fh, (h + 1) as f32 / fh);
                tex_coords.extend_from_slice(&[u1, v1, u0, v1, u0, v0, u1, v0]);

                let j = (h * width + w) * 4;
                indices.extend_from_slice(&[j + 1, j, j + 3, j + 3, j + 2, j + 1]);
            }
        }

        Ok(WaterGeometry {
            positions,
            tex_coords,
            indices,
            width,
            height,
            cell_size,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// Water grid resident on the GPU
pub struct WaterMesh {
    buffers: MeshBuffers,
    pub cell_size: f32,
    pub width: u32,
    pub height: u32,
}

impl WaterMesh {
    pub fn upload(ctx: &RenderContext, geometry: &WaterGeometry) -> RenderResult<WaterMesh> {
        let mut buffers = MeshBuffers::begin(ctx)?;
        buffers.attribute(ctx, POSITION_LOCATION, 3, &geometry.positions)?;
        buffers.attribute(ctx, TEXCOORD_LOCATION, 2, &geometry.tex_coords)?;
        buffers.indices(ctx, &geometry.indices)?;
        let buffers = buffers.finish(ctx);

        log::info!(
            "Uploaded water mesh {}x{} ({} vertices, {} indices)",
            geometry.width,
            geometry.height,
            geometry.vertex_count(),
            geometry.indices.len()
        );

        Ok(WaterMesh {
            buffers,
            cell_size: geometry.cell_size,
            width: geometry.width,
            height: geometry.height,
        })
    }

    pub fn draw(&self, ctx: &RenderContext) {
        let gl = &ctx.gl;
        gl.bind_vertex_array(Some(&self.buffers.vao));
        gl.draw_elements_with_i32(TRIANGLES, self.buffers.element_count, UNSIGNED_INT, 0);
        gl.bind_vertex_array(None);
    }

    pub fn release(self, ctx: &RenderContext) {
        self.buffers.release(ctx);
    }
}

/// One cached mesh per water mode
#[derive(Default)]
pub struct WaterMeshes {
    sine: GpuSlot<WaterMesh>,
    height_map: GpuSlot<WaterMesh>,
}

impl WaterMeshes {
    pub fn new() -> WaterMeshes {
        WaterMeshes::default()
    }

    /// Build the mesh for `mode` on first use, return the cached one afterwards
    pub fn ensure_built(
        &mut self,
        ctx: &RenderContext,
        mode: WaterMode,
        config: &SceneConfig,
    ) -> RenderResult<&WaterMesh> {
        let slot = match mode {
            WaterMode::Sine => &mut self.sine,
            WaterMode::HeightMap => &mut self.height_map,
        };
        slot.get_or_try_init(|| {
            let geometry = WaterGeometry::generate(config.cell_size, mode.plane_height(config))?;
            WaterMesh::upload(ctx, &geometry)
        })
    }

    /// Hand over both meshes once built, or give the cache back
    pub fn into_surfaces(mut self) -> Result<WaterSurfaces, WaterMeshes> {
        match (self.sine.take(), self.height_map.take()) {
            (Some(sine), Some(height_map)) => Ok(WaterSurfaces { sine, height_map }),
            (sine, height_map) => Err(WaterMeshes {
                sine: GpuSlot::from(sine),
                height_map: GpuSlot::from(height_map),
            }),
        }
    }

    pub fn release(mut self, ctx: &RenderContext) {
        for mesh in [self.sine.take(), self.height_map.take()].into_iter().flatten() {
            mesh.release(ctx);
        }
    }
}

/// The mesh of every water mode, resident for the whole session
pub struct WaterSurfaces {
    sine: WaterMesh,
    height_map: WaterMesh,
}

impl WaterSurfaces {
    pub fn build(ctx: &RenderContext, config: &SceneConfig) -> RenderResult<WaterSurfaces> {
        let mut meshes = WaterMeshes::new();
        for mode in WaterMode::ALL {
            let built = meshes.ensure_built(ctx, mode, config).map(|_| ());
            if let Err(err) = built {
                meshes.release(ctx);
                return Err(err);
            }
        }
        meshes.into_surfaces().map_err(|partial| {
            partial.release(ctx);
            RenderError::resource("Water mesh cache incomplete after build")
        })
    }

    pub fn get(&self, mode: WaterMode) -> &WaterMesh {
        match mode {
            WaterMode::Sine => &self.sine,
            WaterMode::HeightMap => &self.height_map,
        }
    }

    pub fn release(self, ctx: &RenderContext) {
        self.sine.release(ctx);
        self.height_map.release(ctx);
    }
}

/// Path of height-map frame `index` under the asset root
pub fn frame_path(base_path: &str, index: u32) -> String {
    format!("{}/Images/waves5/{:03}.png", base_path, index)
}

/// Animated height textures, filled in as the browser decodes them
pub struct HeightMapFrames {
    frames: SharedFrames,
    counter: u64,
}

impl HeightMapFrames {
    /// Start loading `count` frames in ascending order.
    ///
    /// A frame that fails to load is logged and never joins the cycle.
    pub fn load(ctx: &RenderContext, base_path: &str, count: u32) -> RenderResult<HeightMapFrames> {
        let frames: SharedFrames = Rc::new(RefCell::new(FrameSet::with_len(count as usize)));

        for index in 0..count {
            let gl = ctx.gl.clone();
            let slots = frames.clone();
            let path = frame_path(base_path, index);
            let failed_path = path.clone();
            let started = texture::load_image(&path, move |image: &HtmlImageElement| {
                let slot = index as usize;
                // Released while the image was in flight
                if slot >= slots.borrow().len() {
                    return;
                }
                let uploaded = texture::create_texture(&gl).and_then(|tex| {
                    texture::upload_image(&gl, &tex, image, Sampling::Clamped).map(|_| tex)
                });
                match uploaded {
                    Ok(tex) => slots.borrow_mut().fill(slot, tex),
                    Err(err) => log::warn!("Height map {} not uploaded: {}", failed_path, err),
                }
            });
            if let Err(err) = started {
                // Late decodes see an empty set and drop their image
                frames.borrow_mut().drain().for_each(|tex| ctx.gl.delete_texture(Some(&tex)));
                return Err(err);
            }
        }

        log::info!("Loading {} height map frames from {}/Images/waves5", count, base_path);
        Ok(HeightMapFrames { frames, counter: 0 })
    }

    /// Bind the current frame to `unit`; with nothing loaded the unit keeps its last texture
    pub fn bind(&self, gl: &WebGl2RenderingContext, unit: u32) -> bool {
        let frames = self.frames.borrow();
        match frames.resolve(self.counter) {
            Some(tex) => {
                gl.active_texture(WebGl2RenderingContext::TEXTURE0 + unit);
                gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, Some(tex));
                true
            }
            None => false,
        }
    }

    pub fn advance(&mut self) {
        self.counter = self.counter.wrapping_add(1);
    }

    pub fn release(self, gl: &WebGl2RenderingContext) {
        let mut frames = self.frames.borrow_mut();
        for tex in frames.drain() {
            gl.delete_texture(Some(&tex));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_counts_for_divisors_of_two() {
        for (s, n) in [(1.0, 2u32), (0.5, 4), (0.25, 8), (0.1, 20), (0.01, 200)] {
            let geometry = WaterGeometry::generate(s, 0.3).unwrap();
            let cells = (n * n) as usize;
            assert_eq!(geometry.width, n);
            assert_eq!(geometry.height, n);
            assert_eq!(geometry.vertex_count(), 4 * cells);
            assert_eq!(geometry.tex_coords.len(), 8 * cells);
            assert_eq!(geometry.indices.len(), 6 * cells);
        }
    }

    #[test]
    fn test_indices_stay_in_range() {
        let geometry = WaterGeometry::generate(0.1, 0.0).unwrap();
        let vertices = geometry.vertex_count() as u32;
        assert!(geometry.indices.iter().all(|&i| i < vertices));
        assert_eq!(geometry.indices.iter().max(), Some(&(vertices - 1)));
    }

    #[test]
    fn test_first_cell_layout() {
        let geometry = WaterGeometry::generate(1.0, 0.3).unwrap();

        assert_eq!(&geometry.indices[..6], &[1, 0, 3, 3, 2, 1]);
        assert_eq!(&geometry.indices[6..12], &[5, 4, 7, 7, 6, 5]);

        let expected = [
            0.0, 0.3, 0.0, //
            -1.0, 0.3, 0.0, //
            -1.0, 0.3, -1.0, //
            0.0, 0.3, -1.0,
        ];
        for (got, want) in geometry.positions[..12].iter().zip(expected) {
            assert!(close(*got, want), "{} != {}", got, want);
        }

        let uvs = [0.5, 0.5, 0.0, 0.5, 0.0, 0.0, 0.5, 0.0];
        for (got, want) in geometry.tex_coords[..8].iter().zip(uvs) {
            assert!(close(*got, want), "{} != {}", got, want);
        }
    }

    #[test]
    fn test_grid_covers_unit_square() {
        let geometry = WaterGeometry::generate(0.25, 0.6).unwrap();
        let xs: Vec<f32> = geometry.positions.chunks(3).map(|p| p[0]).collect();
        let zs: Vec<f32> = geometry.positions.chunks(3).map(|p| p[2]).collect();
        let min = |v: &[f32]| v.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = |v: &[f32]| v.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        assert!(close(min(&xs), -1.0) && close(max(&xs), 1.0));
        assert!(close(min(&zs), -1.0) && close(max(&zs), 1.0));
        assert!(geometry.positions.chunks(3).all(|p| close(p[1], 0.6)));
        assert!(geometry
            .tex_coords
            .iter()
            .all(|&t| (-EPS..=1.0 + EPS).contains(&t)));
    }

    #[test]
    fn test_rejects_bad_cell_size() {
        for s in [0.0, -0.5, 2.5, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                WaterGeometry::generate(s, 0.0),
                Err(RenderError::InvalidMesh(_))
            ));
        }
        assert!(WaterGeometry::generate(0.1, f32::NAN).is_err());
    }

    #[test]
    fn test_grid_truncates_non_divisor_sizes() {
        let geometry = WaterGeometry::generate(0.3, 0.0).unwrap();
        assert_eq!(geometry.width, 6);
        assert_eq!(geometry.vertex_count(), 4 * 36);

        let xs = geometry.positions.chunks(3).map(|p| p[0]);
        let max_x = xs.fold(f32::NEG_INFINITY, f32::max);
        assert!(close(max_x, 0.8), "max x {}", max_x);
        assert!(geometry
            .positions
            .chunks(3)
            .all(|p| p[0] >= -1.0 - EPS && p[0] <= 1.0 + EPS && p[2] <= 1.0 + EPS));
    }

    #[test]
    fn test_tiny_cell_size_is_rejected_not_overflowed() {
        assert!(matches!(
            WaterGeometry::generate(1e-5, 0.0),
            Err(RenderError::InvalidMesh(_))
        ));
        assert!(matches!(grid_side(1e-30), Err(RenderError::InvalidMesh(_))));
        // 1052 per side is just past the cap
        assert!(grid_side(0.0019).is_err());
        assert_eq!(grid_side(0.002).unwrap(), 1000);
    }

    #[test]
    fn test_grid_side_for_common_sizes() {
        assert_eq!(grid_side(2.0).unwrap(), 1);
        assert_eq!(grid_side(1.5).unwrap(), 1);
        assert_eq!(grid_side(0.1).unwrap(), 20);
        assert_eq!(grid_side(0.01).unwrap(), 200);
    }

    #[test]
    fn test_incomplete_cache_is_handed_back() {
        assert!(WaterMeshes::new().into_surfaces().is_err());
    }

    #[test]
    fn test_mode_codes() {
        assert_eq!(WaterMode::from_code(0).unwrap(), None);
        assert_eq!(WaterMode::from_code(1).unwrap(), Some(WaterMode::Sine));
        assert_eq!(WaterMode::from_code(2).unwrap(), Some(WaterMode::HeightMap));
        assert!(WaterMode::from_code(3).is_err());
    }

    #[test]
    fn test_plane_height_per_mode() {
        let config = SceneConfig::default();
        assert_eq!(WaterMode::Sine.plane_height(&config), 0.3);
        assert_eq!(WaterMode::HeightMap.plane_height(&config), 0.6);
    }

    #[test]
    fn test_frame_paths() {
        assert_eq!(frame_path(".", 0), "./Images/waves5/000.png");
        assert_eq!(frame_path("/assets", 199), "/assets/Images/waves5/199.png");
    }
}
