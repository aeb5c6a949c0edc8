//! Utility functions for erosion calculations
//!
//! Provides height/gradient sampling, bilinear deposition, and erosion brush utilities.
//! Halo maps do not wrap: samples clamp to the edge and brush cells that fall
//! outside the field are skipped.

use crate::tilemap::Tilemap;

/// Erosion brush: `(dx, dy, weight)` with weights summing to 1.
pub type Brush = Vec<(i32, i32, f32)>;

/// Cell and fractional offset of a position, clamped so that `(x + 1, y + 1)`
/// is still inside the map.
fn cell_and_offset(heightmap: &Tilemap<f32>, x: f32, y: f32) -> (usize, usize, f32, f32) {
    let max_cx = heightmap.width.saturating_sub(2);
    let max_cy = heightmap.height.saturating_sub(2);
    let x = x.clamp(0.0, (heightmap.width - 1) as f32);
    let y = y.clamp(0.0, (heightmap.height - 1) as f32);

    let cx = (x.floor() as usize).min(max_cx);
    let cy = (y.floor() as usize).min(max_cy);
    (cx, cy, x - cx as f32, y - cy as f32)
}

/// Height and gradient at a floating-point position using bilinear interpolation.
/// Returns `(height, grad_x, grad_y)`; the gradient points uphill.
pub fn height_and_gradient(heightmap: &Tilemap<f32>, x: f32, y: f32) -> (f32, f32, f32) {
    let (cx, cy, fx, fy) = cell_and_offset(heightmap, x, y);
    let x1 = (cx + 1).min(heightmap.width - 1);
    let y1 = (cy + 1).min(heightmap.height - 1);

    let h00 = *heightmap.get(cx, cy);
    let h10 = *heightmap.get(x1, cy);
    let h01 = *heightmap.get(cx, y1);
    let h11 = *heightmap.get(x1, y1);

    let grad_x = (h10 - h00) * (1.0 - fy) + (h11 - h01) * fy;
    let grad_y = (h01 - h00) * (1.0 - fx) + (h11 - h10) * fx;

    let h0 = h00 * (1.0 - fx) + h10 * fx;
    let h1 = h01 * (1.0 - fx) + h11 * fx;
    (h0 * (1.0 - fy) + h1 * fy, grad_x, grad_y)
}

/// Create a circular erosion brush with linear falloff.
/// Returns weights for cells strictly within the radius, normalized to sum to 1.
pub fn create_erosion_brush(radius: usize) -> Brush {
    let mut brush = Vec::new();
    let r = radius.max(1) as i32;
    let r_sq = r * r;
    let mut total_weight = 0.0;

    for dy in -r..=r {
        for dx in -r..=r {
            let dist_sq = dx * dx + dy * dy;
            if dist_sq < r_sq {
                let weight = 1.0 - (dist_sq as f32).sqrt() / r as f32;
                brush.push((dx, dy, weight));
                total_weight += weight;
            }
        }
    }

    // Normalize weights
    for (_, _, w) in brush.iter_mut() {
        *w /= total_weight;
    }

    brush
}

/// Remove up to `amount` of material around `(x, y)` using the brush.
/// A cell never gives more than it is being asked for, and cells outside the
/// map are skipped. Returns the amount actually removed.
pub fn apply_erosion_brush(heightmap: &mut Tilemap<f32>, brush: &[(i32, i32, f32)], x: usize, y: usize, amount: f32) -> f32 {
    let width = heightmap.width as i32;
    let height = heightmap.height as i32;
    let mut removed = 0.0;

    for &(dx, dy, weight) in brush {
        let nx = x as i32 + dx;
        let ny = y as i32 + dy;
        if nx < 0 || ny < 0 || nx >= width || ny >= height {
            continue;
        }
        let delta = amount * weight;
        *heightmap.get_mut(nx as usize, ny as usize) -= delta;
        removed += delta;
    }

    removed
}

/// Deposit `amount` at a floating-point position, split bilinearly over the
/// four surrounding cells.
pub fn deposit_bilinear(heightmap: &mut Tilemap<f32>, x: f32, y: f32, amount: f32) {
    let (cx, cy, fx, fy) = cell_and_offset(heightmap, x, y);
    let x1 = (cx + 1).min(heightmap.width - 1);
    let y1 = (cy + 1).min(heightmap.height - 1);

    *heightmap.get_mut(cx, cy) += amount * (1.0 - fx) * (1.0 - fy);
    *heightmap.get_mut(x1, cy) += amount * fx * (1.0 - fy);
    *heightmap.get_mut(cx, y1) += amount * (1.0 - fx) * fy;
    *heightmap.get_mut(x1, y1) += amount * fx * fy;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_at_corners() {
        let mut heightmap = Tilemap::new_with(4, 4, 0.0f32);
        heightmap.set(0, 0, 1.0);
        heightmap.set(1, 0, 2.0);
        heightmap.set(0, 1, 3.0);
        heightmap.set(1, 1, 4.0);

        let (h, _, _) = height_and_gradient(&heightmap, 0.0, 0.0);
        assert!((h - 1.0).abs() < 0.001);
        let (h, _, _) = height_and_gradient(&heightmap, 1.0, 0.0);
        assert!((h - 2.0).abs() < 0.001);

        // Average of 1,2,3,4
        let (center, gx, gy) = height_and_gradient(&heightmap, 0.5, 0.5);
        assert!((center - 2.5).abs() < 0.001);
        assert!((gx - 1.0).abs() < 0.001);
        assert!((gy - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_gradient_flat() {
        let heightmap = Tilemap::new_with(4, 4, 5.0f32);
        let (_, gx, gy) = height_and_gradient(&heightmap, 1.5, 1.5);
        assert!(gx.abs() < 0.001);
        assert!(gy.abs() < 0.001);
    }

    #[test]
    fn test_sampling_clamps_outside() {
        let mut heightmap = Tilemap::new_with(4, 4, 0.0f32);
        heightmap.set(3, 3, 8.0);
        let (h, _, _) = height_and_gradient(&heightmap, 10.0, 10.0);
        assert!((h - 8.0).abs() < 0.001);
    }

    #[test]
    fn test_erosion_brush_normalized() {
        let brush = create_erosion_brush(3);
        let total: f32 = brush.iter().map(|(_, _, w)| w).sum();
        assert!((total - 1.0).abs() < 0.001);
        assert!(brush.iter().all(|&(dx, dy, _)| dx * dx + dy * dy < 9));
    }

    #[test]
    fn test_brush_skips_cells_outside_map() {
        let mut heightmap = Tilemap::new_with(8, 8, 10.0f32);
        let brush = create_erosion_brush(3);
        let removed = apply_erosion_brush(&mut heightmap, &brush, 0, 0, 1.0);
        assert!(removed > 0.0 && removed < 1.0);
        assert!((80.0 * 8.0 - heightmap.sum() as f32 - removed).abs() < 1e-3);
    }

    #[test]
    fn test_deposit_conserves_amount() {
        let mut heightmap = Tilemap::new_with(4, 4, 0.0f32);
        deposit_bilinear(&mut heightmap, 1.25, 2.5, 2.0);
        assert!((heightmap.sum() - 2.0).abs() < 1e-5);
        assert!(*heightmap.get(1, 2) > *heightmap.get(2, 3));
    }
}
