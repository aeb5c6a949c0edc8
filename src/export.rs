use std::path::Path;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::grid::GridCoord;
use crate::tilemap::{HeightField, Rect, Tilemap};
use crate::world::World;

/// Stitch all active chunks into one field. Cells of missing chunks are NaN.
/// Returns the field and the coordinate of its bottom-left chunk, or `None`
/// if nothing is loaded.
pub fn stitch_active_window(world: &World) -> Option<(HeightField, GridCoord)> {
    let coords = world.active_coords();
    let min_x = coords.iter().map(|c| c.x).min()?;
    let max_x = coords.iter().map(|c| c.x).max()?;
    let min_y = coords.iter().map(|c| c.y).min()?;
    let max_y = coords.iter().map(|c| c.y).max()?;

    let res = world.config().chunk_resolution;
    let cols = (max_x - min_x + 1) as usize;
    let rows = (max_y - min_y + 1) as usize;
    let mut mosaic = Tilemap::new_with(cols * res, rows * res, f32::NAN);

    for c in coords {
        let Some(chunk) = world.get_chunk(c) else {
            continue;
        };
        let field = &chunk.height_field;
        if field.width != res || field.height != res {
            continue;
        }
        let dest_x = (c.x - min_x) as usize * res;
        let dest_y = (c.y - min_y) as usize * res;
        mosaic.copy_rect_from(field, Rect::new(0, 0, res, res), dest_x, dest_y);
    }

    Some((mosaic, GridCoord::new(min_x, min_y)))
}

/// Export the active window as a PNG. Returns false if no chunk is loaded.
pub fn export_active_window(world: &World, path: impl AsRef<Path>) -> Result<bool, image::ImageError> {
    let Some((mosaic, _)) = stitch_active_window(world) else {
        return Ok(false);
    };
    render_heightmap(&mosaic).save(path)?;
    Ok(true)
}

/// Spectral colormap (matplotlib style): dark blue -> cyan -> green -> yellow -> orange -> red
fn spectral_colormap(t: f32) -> [u8; 3] {
    let colors: [[f32; 3]; 11] = [
        [0.37, 0.31, 0.64],  // Dark blue/purple (low)
        [0.20, 0.53, 0.74],  // Blue
        [0.40, 0.76, 0.65],  // Teal
        [0.67, 0.87, 0.64],  // Light green
        [0.90, 0.96, 0.60],  // Yellow-green
        [1.00, 1.00, 0.75],  // Light yellow / white
        [1.00, 0.88, 0.55],  // Yellow
        [0.99, 0.68, 0.38],  // Light orange
        [0.96, 0.43, 0.26],  // Orange
        [0.84, 0.24, 0.31],  // Red
        [0.62, 0.00, 0.26],  // Dark red (high)
    ];

    let t_scaled = t.clamp(0.0, 1.0) * 10.0;
    let idx = (t_scaled as usize).min(9);
    let frac = t_scaled - idx as f32;

    let c1 = colors[idx];
    let c2 = colors[idx + 1];

    [
        ((c1[0] + (c2[0] - c1[0]) * frac) * 255.0) as u8,
        ((c1[1] + (c2[1] - c1[1]) * frac) * 255.0) as u8,
        ((c1[2] + (c2[2] - c1[2]) * frac) * 255.0) as u8,
    ]
}

/// Render heightmap to image buffer using spectral colormap.
/// Normalizes values to 0-1; NaN cells (missing chunks) are black.
/// Row 0 of the field is south, so it becomes the bottom image row.
pub fn render_heightmap(heightmap: &Tilemap<f32>) -> RgbImage {
    let mut img: RgbImage = ImageBuffer::new(heightmap.width as u32, heightmap.height as u32);

    let (min_val, max_val) = heightmap.min_max();
    let range = (max_val - min_val).max(0.001);

    for (x, y, &val) in heightmap.iter() {
        let color = if val.is_finite() {
            spectral_colormap((val - min_val) / range)
        } else {
            [0, 0, 0]
        };
        let row = heightmap.height - 1 - y;
        img.put_pixel(x as u32, row as u32, Rgb(color));
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ErosionConfig, WorldConfig};
    use crate::erosion::CpuKernel;
    use crate::error::GeneratorError;

    fn constant(coords: GridCoord, resolution: usize, border: usize, _seed: i32) -> Result<HeightField, GeneratorError> {
        let size = resolution + 2 * border;
        Ok(Tilemap::new_with(size, size, (coords.x * 10 + coords.y) as f32))
    }

    #[test]
    fn test_render_flips_rows() {
        let mut map = Tilemap::new_with(2, 2, 0.0f32);
        map.set(0, 0, 1.0);
        map.set(1, 1, f32::NAN);
        let img = render_heightmap(&map);

        // Southern row at the bottom of the image
        assert_eq!(img.get_pixel(0, 1).0, spectral_colormap(1.0));
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_stitch_places_chunks_by_coordinate() {
        let config = WorldConfig {
            view_distance_in_chunks: 1,
            chunk_resolution: 33,
            erosion: ErosionConfig {
                erosion_brush_radius: 2,
                halo_zone_width: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut world = World::new(config, Box::new(constant), Box::new(CpuKernel::new())).unwrap();
        world.update_view_position([1.0, 0.0, 1.0]);

        let (mosaic, origin) = stitch_active_window(&world).unwrap();
        assert_eq!(origin, GridCoord::new(-1, -1));
        assert_eq!((mosaic.width, mosaic.height), (99, 99));
        // Chunk (1, 0) is third column, middle row
        assert_eq!(*mosaic.get(2 * 33 + 5, 33 + 5), 10.0);
        assert_eq!(*mosaic.get(0, 0), -11.0);
    }
}
