use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::{Add, Sub};

use super::GridError;

/// Draw-order bump per tile row so lower rows sort in front of higher ones.
pub const ISOMETRIC_ZOFF_PER_TILE: f32 = 0.001;

/// Physical coordinate. `z` is a dense layer index into the tile array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ICoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ICoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl Add<IVec2> for ICoord {
    type Output = ICoord;

    fn add(self, rhs: IVec2) -> ICoord {
        ICoord::new(self.x + rhs.x, self.y + rhs.y, self.z)
    }
}

/// Virtual-indexed coordinate: tile x/y plus the authored layer depth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VICoord {
    pub x: i32,
    pub y: i32,
    pub depth: f32,
}

impl VICoord {
    pub const fn new(x: i32, y: i32, depth: f32) -> Self {
        Self { x, y, depth }
    }
}

/// Real coordinate: pixel x/y plus the authored layer depth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RCoord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl RCoord {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(self, other: RCoord) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IVec2 {
    pub x: i32,
    pub y: i32,
}

impl IVec2 {
    pub const ZERO: IVec2 = IVec2 { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RVec2 {
    pub x: f32,
    pub y: f32,
}

impl RVec2 {
    pub const ZERO: RVec2 = RVec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for RVec2 {
    type Output = RVec2;

    fn add(self, rhs: RVec2) -> RVec2 {
        RVec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for RVec2 {
    type Output = RVec2;

    fn sub(self, rhs: RVec2) -> RVec2 {
        RVec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Half-open integer box: `x1 <= x < x2`, same for y and z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ICube {
    pub x1: i32,
    pub y1: i32,
    pub z1: i32,
    pub x2: i32,
    pub y2: i32,
    pub z2: i32,
}

impl ICube {
    pub const fn new(x1: i32, y1: i32, z1: i32, x2: i32, y2: i32, z2: i32) -> Self {
        Self {
            x1,
            y1,
            z1,
            x2,
            y2,
            z2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2 || self.z1 >= self.z2
    }

    pub fn cell_count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.x2 - self.x1) as usize * (self.y2 - self.y1) as usize * (self.z2 - self.z1) as usize
    }
}

pub fn isometric_z_offset(y_px: f32, tile_height: i32) -> f32 {
    if tile_height <= 0 {
        return 0.0;
    }
    y_px / tile_height as f32 * ISOMETRIC_ZOFF_PER_TILE
}

/// Ordered map key for a layer depth. `-0.0` and `0.0` name the same layer.
#[derive(Debug, Clone, Copy)]
struct DepthKey(f32);

impl DepthKey {
    fn new(depth: f32) -> Self {
        if depth == 0.0 {
            Self(0.0)
        } else {
            Self(depth)
        }
    }
}

impl PartialEq for DepthKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DepthKey {}

impl PartialOrd for DepthKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DepthKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// The depth to layer-index bijection. Layers are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct DepthTable {
    depth2idx: BTreeMap<DepthKey, usize>,
    idx2depth: Vec<f32>,
}

impl DepthTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.idx2depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx2depth.is_empty()
    }

    pub fn register(&mut self, depth: f32) -> Result<usize, GridError> {
        if !depth.is_finite() {
            return Err(GridError::InvalidDepth { depth });
        }
        let key = DepthKey::new(depth);
        if self.depth2idx.contains_key(&key) {
            return Err(GridError::DuplicateDepth { depth });
        }
        let index = self.idx2depth.len();
        self.depth2idx.insert(key, index);
        self.idx2depth.push(key.0);
        Ok(index)
    }

    pub fn index_of(&self, depth: f32) -> Option<usize> {
        self.depth2idx.get(&DepthKey::new(depth)).copied()
    }

    pub fn depth_of(&self, index: usize) -> Option<f32> {
        self.idx2depth.get(index).copied()
    }

    pub fn depths(&self) -> &[f32] {
        &self.idx2depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_table_assigns_indices_in_registration_order() {
        let mut table = DepthTable::new();
        assert_eq!(table.register(-0.5).expect("first"), 0);
        assert_eq!(table.register(0.0).expect("second"), 1);

        assert_eq!(table.index_of(-0.5), Some(0));
        assert_eq!(table.index_of(0.0), Some(1));
        assert_eq!(table.depth_of(0), Some(-0.5));
        assert_eq!(table.depth_of(1), Some(0.0));
    }

    #[test]
    fn depth_table_round_trips_both_directions() {
        let mut table = DepthTable::new();
        for depth in [2.0, -1.25, 0.5, 10.0] {
            table.register(depth).expect("register");
        }

        for &depth in table.depths() {
            let index = table.index_of(depth).expect("index");
            assert_eq!(table.depth_of(index), Some(depth));
        }
        for index in 0..table.len() {
            let depth = table.depth_of(index).expect("depth");
            assert_eq!(table.index_of(depth), Some(index));
        }
    }

    #[test]
    fn duplicate_depth_is_rejected_without_growing_table() {
        let mut table = DepthTable::new();
        table.register(1.0).expect("register");

        let err = table.register(1.0).expect_err("duplicate");
        assert!(matches!(err, GridError::DuplicateDepth { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn negative_zero_and_zero_are_the_same_depth() {
        let mut table = DepthTable::new();
        table.register(-0.0).expect("register");

        assert_eq!(table.index_of(0.0), Some(0));
        assert!(table.register(0.0).is_err());
    }

    #[test]
    fn nan_depth_is_rejected() {
        let mut table = DepthTable::new();
        assert!(matches!(
            table.register(f32::NAN),
            Err(GridError::InvalidDepth { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn unregistered_depth_has_no_index() {
        let table = DepthTable::new();
        assert_eq!(table.index_of(3.0), None);
        assert_eq!(table.depth_of(0), None);
    }

    #[test]
    fn cube_cell_count_handles_empty_ranges() {
        assert_eq!(ICube::new(0, 0, 0, 3, 2, 2).cell_count(), 12);
        assert_eq!(ICube::new(4, 0, 0, 3, 2, 1).cell_count(), 0);
    }

    #[test]
    fn isometric_offset_grows_per_tile_row() {
        let offset = isometric_z_offset(32.0, 16);
        assert!((offset - 2.0 * ISOMETRIC_ZOFF_PER_TILE).abs() < 1e-6);
        assert_eq!(isometric_z_offset(32.0, 0), 0.0);
    }
}
