/// A bounded 2D grid stored row-major (`y * width + x`). Row 0 is the southern edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

/// Heights of one chunk (or one halo), `resolution x resolution` cells.
pub type HeightField = Tilemap<f32>;

/// Axis-aligned cell rectangle: origin `(x, y)` and size `width x height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Same size, moved to a new origin.
    pub fn moved_to(&self, x: usize, y: usize) -> Self {
        Self { x, y, ..*self }
    }

    pub fn fits_in(&self, width: usize, height: usize) -> bool {
        self.x + self.width <= width && self.y + self.height <= height
    }
}

impl<T: Clone + Default> Tilemap<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height, "({}, {}) outside {}x{}", x, y, self.width, self.height);
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Copy `src_rect` of `src` into `self` with its origin at `(dest_x, dest_y)`.
    /// Panics in debug builds if either rectangle is out of bounds.
    pub fn copy_rect_from(&mut self, src: &Tilemap<T>, src_rect: Rect, dest_x: usize, dest_y: usize) {
        debug_assert!(src_rect.fits_in(src.width, src.height));
        debug_assert!(src_rect.moved_to(dest_x, dest_y).fits_in(self.width, self.height));

        for row in 0..src_rect.height {
            let s = (src_rect.y + row) * src.width + src_rect.x;
            let d = (dest_y + row) * self.width + dest_x;
            self.data[d..d + src_rect.width].clone_from_slice(&src.data[s..s + src_rect.width]);
        }
    }

    /// Extract a rectangle as a new tilemap.
    #[cfg(test)]
    pub(crate) fn sub_rect(&self, rect: Rect) -> Tilemap<T> {
        let mut data = Vec::with_capacity(rect.area());
        for row in 0..rect.height {
            let s = (rect.y + row) * self.width + rect.x;
            data.extend_from_slice(&self.data[s..s + rect.width]);
        }
        Tilemap { width: rect.width, height: rect.height, data }
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.data.iter().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }

    /// Iterate mutably over all cells with their coordinates.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let width = self.width;
        self.data.iter_mut().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }
}

impl<T: Clone + PartialEq> Tilemap<T> {
    /// True if `rect` of `self` already equals `src_rect` of `src`.
    pub fn rect_equals(&self, rect: Rect, src: &Tilemap<T>, src_rect: Rect) -> bool {
        debug_assert_eq!((rect.width, rect.height), (src_rect.width, src_rect.height));
        (0..rect.height).all(|row| {
            let a = (rect.y + row) * self.width + rect.x;
            let b = (src_rect.y + row) * src.width + src_rect.x;
            self.data[a..a + rect.width] == src.data[b..b + rect.width]
        })
    }
}

impl Tilemap<f32> {
    /// `(min, max)` over all cells; NaN cells are ignored.
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)))
    }

    #[cfg(test)]
    pub(crate) fn sum(&self) -> f64 {
        self.data.iter().map(|&h| h as f64).sum()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|h| h.is_finite())
    }
}

/// Fractal Brownian motion over any 2D noise function, normalised to roughly [-1, 1].
pub fn fbm_noise(
    noise: &impl noise::NoiseFn<f64, 2>,
    x: f64,
    y: f64,
    octaves: u32,
    persistence: f64,
    lacunarity: f64,
) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_value = 0.0;

    for _ in 0..octaves {
        total += amplitude * noise.get([x * frequency, y * frequency]);
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    if max_value > 0.0 {
        total / max_value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked(width: usize, height: usize) -> Tilemap<f32> {
        let mut map = Tilemap::new(width, height);
        for (x, y, v) in map.iter_mut() {
            *v = (y * 1000 + x) as f32;
        }
        map
    }

    #[test]
    fn test_copy_rect_from() {
        let src = marked(5, 5);
        let mut dest = Tilemap::new_with(8, 8, -1.0f32);
        dest.copy_rect_from(&src, Rect::new(1, 2, 3, 2), 4, 0);

        assert_eq!(*dest.get(4, 0), 2001.0);
        assert_eq!(*dest.get(6, 1), 3003.0);
        assert_eq!(*dest.get(3, 0), -1.0);
        assert_eq!(*dest.get(4, 2), -1.0);
    }

    #[test]
    fn test_sub_rect_matches_copy() {
        let src = marked(6, 6);
        let rect = Rect::new(2, 3, 3, 2);
        let sub = src.sub_rect(rect);
        assert_eq!((sub.width, sub.height), (3, 2));
        assert!(sub.rect_equals(Rect::new(0, 0, 3, 2), &src, rect));
        assert_eq!(*sub.get(0, 0), 3002.0);
    }
}
