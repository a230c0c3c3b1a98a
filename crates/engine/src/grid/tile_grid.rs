use tracing::error;

use super::coords::{DepthTable, ICoord, IVec2, RCoord, VICoord};
use super::tile::{ExitDirection, Tile};
use super::GridError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Holds tile imagery.
    Tiles,
    /// Holds only per-object properties; never drawn as tiles.
    Objects,
}

/// Layered tile array for one map. Layers are appended during load and the
/// flat `((z * height + y) * width + x)` layout is fixed afterwards.
#[derive(Debug, Clone)]
pub struct TileGrid {
    descriptor: String,
    width: i32,
    height: i32,
    tile_dim: IVec2,
    loop_x: bool,
    loop_y: bool,
    tiles: Vec<Tile>,
    layers: Vec<LayerKind>,
    depths: DepthTable,
}

impl TileGrid {
    pub fn new(descriptor: impl Into<String>, width: i32, height: i32) -> Result<Self, GridError> {
        if width <= 0 || height <= 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        Ok(Self {
            descriptor: descriptor.into(),
            width,
            height,
            tile_dim: IVec2::new(1, 1),
            loop_x: false,
            loop_y: false,
            tiles: Vec::new(),
            layers: Vec::new(),
            depths: DepthTable::new(),
        })
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn layer_count(&self) -> i32 {
        self.layers.len() as i32
    }

    pub fn dim(&self) -> ICoord {
        ICoord::new(self.width, self.height, self.layer_count())
    }

    pub fn tile_dim(&self) -> IVec2 {
        self.tile_dim
    }

    pub fn set_tile_dim(&mut self, tile_dim: IVec2) -> Result<(), GridError> {
        if tile_dim.x <= 0 || tile_dim.y <= 0 {
            return Err(GridError::InvalidTileDim {
                width: tile_dim.x,
                height: tile_dim.y,
            });
        }
        self.tile_dim = tile_dim;
        Ok(())
    }

    pub fn loops_x(&self) -> bool {
        self.loop_x
    }

    pub fn loops_y(&self) -> bool {
        self.loop_y
    }

    pub fn set_looping(&mut self, loop_x: bool, loop_y: bool) {
        self.loop_x = loop_x;
        self.loop_y = loop_y;
    }

    pub fn layer_kind(&self, z: i32) -> Option<LayerKind> {
        usize::try_from(z)
            .ok()
            .and_then(|index| self.layers.get(index))
            .copied()
    }

    pub fn depths(&self) -> &DepthTable {
        &self.depths
    }

    /// Registers `depth` and appends one default-initialised layer for it.
    /// A duplicate depth leaves the grid untouched.
    pub fn allocate_layer(&mut self, kind: LayerKind, depth: f32) -> Result<i32, GridError> {
        let z = self.depths.register(depth)?;
        let layer_len = self.width as usize * self.height as usize;
        self.tiles
            .resize_with(self.tiles.len() + layer_len, Tile::default);
        self.layers.push(kind);
        Ok(z as i32)
    }

    /// Applies wrap-around on looping axes. Non-looping axes pass through.
    pub fn wrap(&self, phys: ICoord) -> ICoord {
        ICoord::new(
            if self.loop_x {
                phys.x.rem_euclid(self.width)
            } else {
                phys.x
            },
            if self.loop_y {
                phys.y.rem_euclid(self.height)
            } else {
                phys.y
            },
            phys.z,
        )
    }

    pub fn in_bounds(&self, phys: ICoord) -> bool {
        self.index_of(phys).is_some()
    }

    pub fn in_bounds_vi(&self, virt: VICoord) -> bool {
        match self.depths.index_of(virt.depth) {
            Some(z) => self.in_bounds(ICoord::new(virt.x, virt.y, z as i32)),
            None => false,
        }
    }

    fn index_of(&self, phys: ICoord) -> Option<usize> {
        let p = self.wrap(phys);
        if p.x < 0 || p.x >= self.width || p.y < 0 || p.y >= self.height {
            return None;
        }
        if p.z < 0 || p.z >= self.layer_count() {
            return None;
        }
        let index = (p.z as usize * self.height as usize + p.y as usize) * self.width as usize
            + p.x as usize;
        Some(index)
    }

    pub fn get_tile(&self, phys: ICoord) -> Option<&Tile> {
        self.index_of(phys).and_then(|index| self.tiles.get(index))
    }

    pub fn get_tile_mut(&mut self, phys: ICoord) -> Option<&mut Tile> {
        self.index_of(phys).and_then(|index| self.tiles.get_mut(index))
    }

    pub fn get_tile_vi(&self, virt: VICoord) -> Option<&Tile> {
        let z = self.depths.index_of(virt.depth)?;
        self.get_tile(ICoord::new(virt.x, virt.y, z as i32))
    }

    pub fn occupied(&self, phys: ICoord) -> bool {
        self.get_tile(phys).is_some_and(Tile::is_occupied)
    }

    /// Layer index for `depth`. An unregistered depth means the map data is
    /// inconsistent, which is fatal.
    pub fn depth_index(&self, depth: f32) -> i32 {
        match self.depths.index_of(depth) {
            Some(z) => z as i32,
            None => self.unregistered_depth(depth),
        }
    }

    pub fn try_depth_index(&self, depth: f32) -> Option<i32> {
        self.depths.index_of(depth).map(|z| z as i32)
    }

    /// Authored depth of layer `z`. Out-of-range layers are fatal.
    pub fn index_depth(&self, z: i32) -> f32 {
        match usize::try_from(z).ok().and_then(|i| self.depths.depth_of(i)) {
            Some(depth) => depth,
            None => self.invalid_layer(z),
        }
    }

    pub fn phys2virt_vi(&self, phys: ICoord) -> VICoord {
        VICoord::new(phys.x, phys.y, self.index_depth(phys.z))
    }

    pub fn phys2virt_r(&self, phys: ICoord) -> RCoord {
        RCoord::new(
            (phys.x * self.tile_dim.x) as f32,
            (phys.y * self.tile_dim.y) as f32,
            self.index_depth(phys.z),
        )
    }

    pub fn virt2phys(&self, virt: VICoord) -> ICoord {
        ICoord::new(virt.x, virt.y, self.depth_index(virt.depth))
    }

    pub fn virt2phys_r(&self, virt: RCoord) -> ICoord {
        ICoord::new(
            (virt.x / self.tile_dim.x as f32).floor() as i32,
            (virt.y / self.tile_dim.y as f32).floor() as i32,
            self.depth_index(virt.z),
        )
    }

    pub fn try_virt2phys(&self, virt: VICoord) -> Option<ICoord> {
        self.try_depth_index(virt.depth)
            .map(|z| ICoord::new(virt.x, virt.y, z))
    }

    pub fn virt2virt(&self, virt: VICoord) -> RCoord {
        RCoord::new(
            (virt.x * self.tile_dim.x) as f32,
            (virt.y * self.tile_dim.y) as f32,
            virt.depth,
        )
    }

    pub fn virt2virt_r(&self, virt: RCoord) -> VICoord {
        VICoord::new(
            (virt.x / self.tile_dim.x as f32).floor() as i32,
            (virt.y / self.tile_dim.y as f32).floor() as i32,
            virt.z,
        )
    }

    /// Destination of a one-tile step. A layermod on the origin tile for
    /// the step direction moves the destination to that layer.
    pub fn move_dest(&self, from: ICoord, facing: IVec2) -> ICoord {
        let mut dest = from + facing;
        let layermod = ExitDirection::from_facing(facing)
            .and_then(|direction| {
                self.get_tile(from)
                    .and_then(|tile| tile.layermod_at(direction))
            });
        if let Some(depth) = layermod {
            dest.z = self.depth_index(depth);
        }
        dest
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    fn unregistered_depth(&self, depth: f32) -> ! {
        error!(area = %self.descriptor, depth, "unregistered_depth");
        panic!(
            "{}: attempt to access unregistered layer depth {depth}",
            self.descriptor
        );
    }

    fn invalid_layer(&self, z: i32) -> ! {
        error!(
            area = %self.descriptor,
            z,
            layer_count = self.layer_count(),
            "invalid_layer_index"
        );
        panic!(
            "{}: attempt to access layer index {z} of {}",
            self.descriptor,
            self.layer_count()
        );
    }
}
