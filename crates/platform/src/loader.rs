//! Background asset loading with a pending-slot handoff to the frame loop.
//!
//! Worker threads parse/weld/decode and park the result in [`PendingAssets`].
//! The render thread takes whatever is pending before drawing and uploads it,
//! so a frame only ever sees a fully built mesh. A load that finishes while an
//! older result is still pending overwrites it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use asset::{MeshData, TextureData};
use parking_lot::Mutex;

/// Texture waiting for upload plus its row-order flag.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTexture {
    pub data: TextureData,
    pub flip_vertically: bool,
}

/// Single-producer/single-consumer slots shared between loaders and the frame loop.
#[derive(Default)]
pub struct PendingAssets {
    mesh: Mutex<Option<MeshData>>,
    texture: Mutex<Option<PendingTexture>>,
}

impl PendingAssets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_mesh(&self, mesh: MeshData) {
        if self.mesh.lock().replace(mesh).is_some() {
            log::debug!("Pending mesh superseded by a newer load");
        }
    }

    pub fn put_texture(&self, texture: PendingTexture) {
        if self.texture.lock().replace(texture).is_some() {
            log::debug!("Pending texture superseded by a newer load");
        }
    }

    pub fn take_mesh(&self) -> Option<MeshData> {
        self.mesh.lock().take()
    }

    pub fn take_texture(&self) -> Option<PendingTexture> {
        self.texture.lock().take()
    }
}

/// What a dropped or command-line file should be loaded as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Mesh,
    Texture,
}

impl AssetKind {
    /// Classify by extension (`.obj`, `.png`), case-insensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "obj" => Some(Self::Mesh),
            "png" => Some(Self::Texture),
            _ => None,
        }
    }
}

/// Parse + weld an OBJ file on a worker thread.
pub fn spawn_mesh_load(path: PathBuf, pending: Arc<PendingAssets>) -> Result<()> {
    thread::Builder::new()
        .name("obj-loader".into())
        .spawn(move || match asset::obj::load_obj_from_path(&path) {
            Ok(mesh) => {
                log::info!(
                    "Loaded {}: {} vertices, {} indices",
                    path.display(),
                    mesh.vertices.len(),
                    mesh.indices.len()
                );
                pending.put_mesh(mesh);
            }
            Err(err) => log::error!("Mesh load failed: {err:#}"),
        })
        .context("Failed to spawn OBJ loader thread")?;
    Ok(())
}

/// Decode a PNG file on a worker thread.
pub fn spawn_texture_load(
    path: PathBuf,
    flip_vertically: bool,
    pending: Arc<PendingAssets>,
) -> Result<()> {
    thread::Builder::new()
        .name("png-loader".into())
        .spawn(move || match TextureData::load_png(&path) {
            Ok(data) => pending.put_texture(PendingTexture {
                data,
                flip_vertically,
            }),
            Err(err) => log::error!("Texture load failed: {err:#}"),
        })
        .context("Failed to spawn PNG loader thread")?;
    Ok(())
}

/// Dispatch a file to the matching loader. Unknown extensions are ignored.
pub fn spawn_load(path: PathBuf, flip_vertically: bool, pending: &Arc<PendingAssets>) -> Result<()> {
    match AssetKind::from_path(&path) {
        Some(AssetKind::Mesh) => spawn_mesh_load(path, Arc::clone(pending)),
        Some(AssetKind::Texture) => spawn_texture_load(path, flip_vertically, Arc::clone(pending)),
        None => {
            log::warn!("Ignoring {}: not an .obj or .png file", path.display());
            Ok(())
        }
    }
}
