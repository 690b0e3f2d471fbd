//! Lenient OBJ subset parser (`v`, `vn`, `vt`, `f`) and the vertex weld step.
//!
//! Parsing never fails on content: malformed numbers become NaN, bad or
//! out-of-range face indices resolve to NaN components, unknown directives are
//! skipped. Faces are not triangulated; every face token becomes one index.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};

use crate::mesh::{MeshData, MeshVertex};

/// Attribute arrays in file order, kept at full `f64` precision so distinct
/// file values stay distinct for welding. Face indices address them 0-based.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawAttributes {
    pub positions: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
    pub texcoords: Vec<[f64; 2]>,
}

/// `None` when the index is absent or past the end of its array.
fn lookup<const N: usize>(values: &[[f64; N]], index: Option<usize>) -> Option<[f64; N]> {
    index.and_then(|i| values.get(i).copied())
}

impl RawAttributes {
    fn position(&self, index: Option<usize>) -> Option<[f64; 3]> {
        lookup(&self.positions, index)
    }

    fn normal(&self, index: Option<usize>) -> Option<[f64; 3]> {
        lookup(&self.normals, index)
    }

    fn texcoord(&self, index: Option<usize>) -> Option<[f64; 2]> {
        lookup(&self.texcoords, index)
    }
}

/// One face corner: `p/t/n` converted to 0-based indices.
/// `None` marks a sub-token that was missing, empty, non-numeric or < 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaceVertexRef {
    pub position: Option<usize>,
    pub texcoord: Option<usize>,
    pub normal: Option<usize>,
}

/// Parsed but not yet welded OBJ content.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjSource {
    pub attributes: RawAttributes,
    /// Face corners in file order, faces concatenated.
    pub face_vertices: Vec<FaceVertexRef>,
    pub face_count: usize,
    /// Faces with a token count other than 3. They still emit one index per
    /// token and therefore draw incorrectly as a triangle list.
    pub non_triangle_faces: usize,
}

/// Line-at-a-time parser state.
#[derive(Default)]
struct ObjParser {
    source: ObjSource,
}

impl ObjParser {
    fn feed_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            return;
        };

        let attrs = &mut self.source.attributes;
        match tag {
            "v" => attrs.positions.push(parse_components(parts)),
            "vn" => attrs.normals.push(parse_components(parts)),
            "vt" => attrs.texcoords.push(parse_components(parts)),
            "f" => {
                let before = self.source.face_vertices.len();
                self.source
                    .face_vertices
                    .extend(parts.map(parse_face_vertex));
                let corners = self.source.face_vertices.len() - before;
                self.source.face_count += 1;
                if corners != 3 {
                    self.source.non_triangle_faces += 1;
                }
            }
            _ => {
                // o/g/s/usemtl/mtllib and anything else
            }
        }
    }

    fn finish(self) -> ObjSource {
        let src = self.source;
        if src.non_triangle_faces > 0 {
            log::warn!(
                "OBJ has {} of {} faces that are not triangles; they are not triangulated and will draw incorrectly",
                src.non_triangle_faces,
                src.face_count
            );
        }
        src
    }
}

/// Parse OBJ text without welding.
pub fn parse_obj_str(contents: &str) -> ObjSource {
    let mut parser = ObjParser::default();
    for line in contents.lines() {
        parser.feed_line(line);
    }
    parser.finish()
}

/// Load and weld an OBJ mesh from a file path.
pub fn load_obj_from_path(path: impl AsRef<Path>) -> Result<MeshData> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.as_ref().display()))?;
    load_obj_from_reader(BufReader::new(file))
}

/// Load and weld an OBJ mesh from a [`BufRead`] implementation.
/// Only read failures are errors; content is never rejected.
pub fn load_obj_from_reader<R: BufRead>(reader: R) -> Result<MeshData> {
    let mut parser = ObjParser::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        parser.feed_line(&line);
    }
    Ok(weld(&parser.finish()))
}

/// Convenience helper to parse and weld an OBJ string.
pub fn load_obj_from_str(contents: &str) -> MeshData {
    weld(&parse_obj_str(contents))
}

/// Dedup key over the resolved position and normal.
///
/// Compared by `f64` bit pattern after folding `-0.0` into `0.0` and every
/// NaN into one canonical NaN. Unresolvable attributes get their own marker,
/// so a malformed number never welds with an out-of-range index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct VertexKey([u64; 6]);

/// NaN payload that `canonical_bits` never produces.
const UNRESOLVED_BITS: u64 = 0x7ff8_0000_0000_0001;

impl VertexKey {
    fn new(position: Option<[f64; 3]>, normal: Option<[f64; 3]>) -> Self {
        let [px, py, pz] = position.map_or([UNRESOLVED_BITS; 3], |p| p.map(canonical_bits));
        let [nx, ny, nz] = normal.map_or([UNRESOLVED_BITS; 3], |n| n.map(canonical_bits));
        Self([px, py, pz, nx, ny, nz])
    }
}

fn canonical_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

/// Narrow to GPU precision; unresolved attributes become NaN.
fn narrow<const N: usize>(values: Option<[f64; N]>) -> [f32; N] {
    values.map_or([f32::NAN; N], |v| v.map(|c| c as f32))
}

/// Collapse face corners into unique vertices keyed on position + normal.
///
/// The first corner seen for a key supplies the texture coordinate; later
/// corners with the same key reuse that vertex and their own texcoord is
/// dropped.
pub fn weld(source: &ObjSource) -> MeshData {
    let attrs = &source.attributes;
    let mut refs = source.face_vertices.as_slice();
    if refs.len() > u32::MAX as usize {
        log::warn!(
            "OBJ has {} face vertices; only the first {} are used",
            refs.len(),
            u32::MAX
        );
        refs = &refs[..u32::MAX as usize];
    }

    let mut table: HashMap<VertexKey, u32> = HashMap::new();
    let mut vertices: Vec<MeshVertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::with_capacity(refs.len());

    for fv in refs {
        let position = attrs.position(fv.position);
        let normal = attrs.normal(fv.normal);
        let key = VertexKey::new(position, normal);

        let index = *table.entry(key).or_insert_with(|| {
            let idx = vertices.len() as u32;
            vertices.push(MeshVertex::new(
                narrow(position),
                narrow(normal),
                narrow(attrs.texcoord(fv.texcoord)),
            ));
            idx
        });
        indices.push(index);
    }

    log::debug!(
        "Welded {} face vertices into {} unique vertices",
        indices.len(),
        vertices.len()
    );

    MeshData::new(vertices, indices)
}

fn parse_components<'a, const N: usize>(mut tokens: impl Iterator<Item = &'a str>) -> [f64; N] {
    std::array::from_fn(|_| parse_f64_lenient(tokens.next()))
}

fn parse_f64_lenient(token: Option<&str>) -> f64 {
    token
        .and_then(|t| t.parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

fn parse_face_vertex(token: &str) -> FaceVertexRef {
    let mut split = token.split('/');
    let position = parse_index(split.next());
    let texcoord = parse_index(split.next());
    let normal = parse_index(split.next());
    FaceVertexRef {
        position,
        texcoord,
        normal,
    }
}

/// 1-based OBJ index to 0-based. Relative (negative) indices are not supported.
fn parse_index(token: Option<&str>) -> Option<usize> {
    let raw = token?.parse::<i64>().ok()?;
    if raw < 1 {
        return None;
    }
    usize::try_from(raw - 1).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn same_f32(a: f32, b: f32) -> bool {
        (a.is_nan() && b.is_nan()) || a == b
    }

    #[test]
    fn single_corner_makes_single_vertex() {
        let src = "v 1.0 2.0 3.0\nvn 0.0 0.0 1.0\nvt 0.5 0.5\nf 1/1/1\n";
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.vertices.len(), 1);
        assert_eq!(mesh.indices, vec![0]);
        assert_eq!(
            mesh.vertices[0],
            MeshVertex::new([1.0, 2.0, 3.0], [0.0, 0.0, 1.0], [0.5, 0.5])
        );
    }

    #[test]
    fn parse_simple_triangle() {
        let src = r#"
            v 0.0 0.0 0.0
            v 1.0 0.0 0.0
            v 0.0 1.0 0.0
            vn 0.0 0.0 1.0
            vn 0.0 1.0 0.0
            vn 1.0 0.0 0.0
            vt 0.0 0.0
            vt 1.0 0.0
            vt 0.0 1.0
            f 1/1/1 2/2/2 3/3/3
        "#;
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1].uv, [1.0, 0.0]);
        assert_eq!(mesh.vertices[2].normal, [1.0, 0.0, 0.0]);
        assert!(mesh.is_valid());
    }

    #[test]
    fn weld_keeps_first_texcoord() {
        let src = r#"
            v 0.0 0.0 0.0
            v 1.0 0.0 0.0
            v 0.0 1.0 0.0
            vn 0.0 0.0 1.0
            vt 0.1 0.1
            vt 0.9 0.9
            f 1/1/1 2/1/1 3/1/1
            f 1/2/1 3/2/1 2/2/1
        "#;
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 1]);
        for v in &mesh.vertices {
            assert_eq!(v.uv, [0.1, 0.1]);
        }
    }

    #[test]
    fn different_normals_do_not_weld() {
        let src = "v 0 0 0\nvn 0 0 1\nvn 0 1 0\nvt 0 0\nf 1/1/1 1/1/2 1/1/1\n";
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 0]);
    }

    #[test]
    fn distinct_indices_with_equal_values_weld() {
        // Positions 1 and 2 are identical values at different file indices.
        let src = "v 1 1 1\nv 1 1 1\nvn 0 0 1\nvt 0 0\nvt 1 1\nf 1/1/1 2/2/1 1/2/1\n";
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.vertices.len(), 1);
        assert_eq!(mesh.indices, vec![0, 0, 0]);
        assert_eq!(mesh.vertices[0].uv, [0.0, 0.0]);
    }

    #[test]
    fn key_is_exact_not_tolerant() {
        let a = 1.0_f64;
        let b = f64::from_bits(a.to_bits() + 1);
        assert_ne!(
            VertexKey::new(Some([a; 3]), Some([0.0; 3])),
            VertexKey::new(Some([b; 3]), Some([0.0; 3]))
        );
    }

    #[test]
    fn key_folds_signed_zero_and_nan() {
        assert_eq!(
            VertexKey::new(Some([-0.0, 0.0, 0.0]), Some([0.0; 3])),
            VertexKey::new(Some([0.0, 0.0, 0.0]), Some([0.0; 3]))
        );
        let other_nan = f64::from_bits(f64::NAN.to_bits() | 2);
        assert_eq!(
            VertexKey::new(Some([other_nan; 3]), Some([0.0; 3])),
            VertexKey::new(Some([f64::NAN; 3]), Some([0.0; 3]))
        );
    }

    #[test]
    fn nan_values_and_unresolved_indices_are_distinct_keys() {
        assert_ne!(
            VertexKey::new(Some([f64::NAN; 3]), Some([f64::NAN; 3])),
            VertexKey::new(None, None)
        );
        let src = "v x x x\nvn x x x\nvt 0 0\nf 1/1/1 9/1/9\n";
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1]);
    }

    #[test]
    fn values_equal_in_f32_but_not_f64_stay_distinct() {
        let src = "v 1 0 0\nv 1.00000001 0 0\nvn 0 0 1\nvt 0 0\nvt 1 1\nf 1/1/1 2/2/1\n";
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1]);
        assert_eq!(mesh.vertices[1].uv, [1.0, 1.0]);
        // Both narrow to the same GPU position.
        assert_eq!(mesh.vertices[0].position, mesh.vertices[1].position);
    }

    #[test]
    fn comments_and_unknown_directives_are_ignored() {
        let src = "# header\no cube\ng group\nusemtl red\ns off\nv 0 0 0\nvn 0 0 1\nvt 0 0\nf 1/1/1\n";
        let parsed = parse_obj_str(src);
        assert_eq!(parsed.attributes.positions.len(), 1);
        assert_eq!(parsed.attributes.normals.len(), 1);
        assert_eq!(parsed.attributes.texcoords.len(), 1);
        assert_eq!(parsed.face_vertices.len(), 1);
    }

    #[test]
    fn malformed_numbers_become_nan() {
        let parsed = parse_obj_str("v 1.0 abc\nvt x\n");
        let p = parsed.attributes.positions[0];
        assert_eq!(p[0], 1.0);
        assert!(p[1].is_nan());
        assert!(p[2].is_nan());
        assert!(parsed.attributes.texcoords[0].iter().all(|c| c.is_nan()));
    }

    #[test]
    fn extra_components_are_ignored() {
        let parsed = parse_obj_str("v 1 2 3 0.5\nvt 0.25 0.75 0.0\n");
        assert_eq!(parsed.attributes.positions, vec![[1.0, 2.0, 3.0]]);
        assert_eq!(parsed.attributes.texcoords, vec![[0.25, 0.75]]);
    }

    #[test]
    fn face_tokens_are_converted_to_zero_based() {
        let parsed = parse_obj_str("f 3/2/1 1//4 7 0/-1/x\n");
        assert_eq!(
            parsed.face_vertices,
            vec![
                FaceVertexRef {
                    position: Some(2),
                    texcoord: Some(1),
                    normal: Some(0)
                },
                FaceVertexRef {
                    position: Some(0),
                    texcoord: None,
                    normal: Some(3)
                },
                FaceVertexRef {
                    position: Some(6),
                    texcoord: None,
                    normal: None
                },
                FaceVertexRef::default(),
            ]
        );
    }

    #[test]
    fn out_of_range_indices_resolve_to_nan() {
        let src = "v 0 0 0\nvn 0 0 1\nvt 0 0\nf 5/5/5 1/1/1 5/9/9\n";
        let mesh = load_obj_from_str(src);
        // Both out-of-range corners share the all-NaN key.
        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 0]);
        let garbage = mesh.vertices[0];
        assert!(garbage.position.iter().chain(&garbage.normal).all(|c| c.is_nan()));
        assert!(garbage.uv.iter().all(|c| c.is_nan()));
        assert!(same_f32(mesh.vertices[1].normal[2], 1.0));
    }

    #[test]
    fn quads_are_not_triangulated() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            v 0 1 0
            vn 0 0 1
            vt 0 0
            f 1/1/1 2/1/1 3/1/1 4/1/1
            f 1/1/1 2/1/1 3/1/1
        "#;
        let parsed = parse_obj_str(src);
        assert_eq!(parsed.face_count, 2);
        assert_eq!(parsed.non_triangle_faces, 1);
        let mesh = weld(&parsed);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 0, 1, 2]);
    }

    #[test]
    fn index_count_and_bounds_hold() {
        let src = r#"
            v 0 0 0
            v 1 0 0
            v 1 1 0
            v 0 1 0
            v 0 0 1
            vn 0 0 1
            vn 0 0 -1
            vn 1 0 0
            vt 0 0
            vt 1 0
            vt 1 1
            f 1/1/1 2/2/1 3/3/1
            f 1/1/1 3/3/1 4/1/1
            f 5/1/2 2/2/3 4/3/2
            f 1/1/3 2/1/3 3/1/3 4/1/3 5/1/3
            f 9/9/9 1/1/1
        "#;
        let tokens = 3 + 3 + 3 + 5 + 2;
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.indices.len(), tokens);
        assert!(mesh.indices_in_bounds());
        assert!(mesh.vertices.len() <= tokens);
    }

    #[test]
    fn crlf_and_blank_lines() {
        let src = "v 0 0 0\r\n\r\nvn 0 0 1\r\nvt 0 0\r\nf 1/1/1\r\n";
        let mesh = load_obj_from_str(src);
        assert_eq!(mesh.indices, vec![0]);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn reader_matches_str() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nvt 0 0\nf 1/1/1 2/1/1 3/1/1\n";
        let from_reader = load_obj_from_reader(std::io::Cursor::new(src)).expect("read");
        assert_eq!(from_reader, load_obj_from_str(src));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_obj_from_path("/definitely/not/here.obj").is_err());
    }
}
