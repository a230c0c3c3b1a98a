use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, warn};

/// Opaque handle to a decoded image held by an [`ImageStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u32);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("tile size {tile_width}x{tile_height} does not divide image {path}")]
    BadTileSize {
        path: PathBuf,
        tile_width: u32,
        tile_height: u32,
    },
}

/// Loads images for the core. Lookups never block on I/O after load.
pub trait ImageSource {
    /// Loads a sheet and splits it into row-major tiles.
    fn load_tiles(
        &mut self,
        path: &Path,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Vec<ImageId>, ImageError>;

    fn load(&mut self, path: &Path) -> Result<ImageId, ImageError>;

    fn dimensions(&self, image: ImageId) -> Option<(u32, u32)>;
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl StoredImage {
    fn sub_image(&self, left: u32, top: u32, width: u32, height: u32) -> StoredImage {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        let stride = self.width as usize * 4;
        for row in top..top + height {
            let start = row as usize * stride + left as usize * 4;
            let end = start + width as usize * 4;
            rgba.extend_from_slice(&self.rgba[start..end]);
        }
        StoredImage {
            width,
            height,
            rgba,
        }
    }
}

/// Decoded RGBA images cached by path.
#[derive(Debug, Default)]
pub struct ImageStore {
    images: Vec<StoredImage>,
    by_path: HashMap<PathBuf, ImageId>,
    tiles_by_key: HashMap<(PathBuf, u32, u32), Vec<ImageId>>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, image: ImageId) -> Option<&StoredImage> {
        self.images.get(image.0 as usize)
    }

    pub fn insert(&mut self, image: StoredImage) -> ImageId {
        let id = ImageId(self.images.len() as u32);
        self.images.push(image);
        id
    }

    /// Splits `sheet` into `tile_width x tile_height` tiles, row-major.
    pub fn insert_tiles(
        &mut self,
        sheet: &StoredImage,
        tile_width: u32,
        tile_height: u32,
    ) -> Vec<ImageId> {
        if tile_width == 0 || tile_height == 0 {
            return Vec::new();
        }
        let columns = sheet.width / tile_width;
        let rows = sheet.height / tile_height;
        let mut ids = Vec::with_capacity(columns as usize * rows as usize);
        for row in 0..rows {
            for column in 0..columns {
                let tile = sheet.sub_image(
                    column * tile_width,
                    row * tile_height,
                    tile_width,
                    tile_height,
                );
                ids.push(self.insert(tile));
            }
        }
        ids
    }
}

fn decode_rgba(path: &Path) -> Result<StoredImage, ImageError> {
    let reader = ImageReader::open(path).map_err(|source| ImageError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = reader.decode().map_err(|source| {
        warn!(path = %path.display(), error = %source, "image_decode_failed");
        ImageError::Decode {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let rgba = decoded.to_rgba8();
    Ok(StoredImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

impl ImageSource for ImageStore {
    fn load_tiles(
        &mut self,
        path: &Path,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Vec<ImageId>, ImageError> {
        let key = (path.to_path_buf(), tile_width, tile_height);
        if let Some(ids) = self.tiles_by_key.get(&key) {
            return Ok(ids.clone());
        }
        let sheet = decode_rgba(path)?;
        if tile_width == 0
            || tile_height == 0
            || sheet.width < tile_width
            || sheet.height < tile_height
        {
            return Err(ImageError::BadTileSize {
                path: path.to_path_buf(),
                tile_width,
                tile_height,
            });
        }
        let ids = self.insert_tiles(&sheet, tile_width, tile_height);
        debug!(path = %path.display(), tiles = ids.len(), "tileset_image_loaded");
        self.tiles_by_key.insert(key, ids.clone());
        Ok(ids)
    }

    fn load(&mut self, path: &Path) -> Result<ImageId, ImageError> {
        if let Some(id) = self.by_path.get(path) {
            return Ok(*id);
        }
        let image = decode_rgba(path)?;
        let id = self.insert(image);
        self.by_path.insert(path.to_path_buf(), id);
        Ok(id)
    }

    fn dimensions(&self, image: ImageId) -> Option<(u32, u32)> {
        self.get(image).map(|stored| (stored.width, stored.height))
    }
}
