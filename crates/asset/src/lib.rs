//! Asset loading/parsers (meshes, textures).
//! OBJ subset parser with vertex welding, plus RGBA8 texture data.

pub mod mesh;
pub mod obj;
pub mod texture;

pub use mesh::{MeshData, MeshVertex};
pub use texture::TextureData;
