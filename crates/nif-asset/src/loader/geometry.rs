use std::collections::{hash_map::Entry, HashMap, HashSet};

use glam::{Vec2, Vec3};
use log::{debug, warn};

use crate::{
    animation::{frame_for_time, insert_key, Extrapolation},
    error::{ImportError, Result},
    format::{
        block::{Block, BlockData, BlockType},
        record::{GeometryDataRecord, MorphDataRecord, StripRecord},
    },
    index::SourceAssetType,
    mesh::{MeshAsset, ShapeKey, ShapeKeys, VertexColorMode},
    node::{NodeAsset, NodeRole},
};

use super::{
    dedup::{float_hash, MaterialProperties},
    names::{BONE_NAME_LENGTH, OBJECT_NAME_LENGTH},
    session::ConversionSession,
    VertexDedup,
};

const MORPH_CONSTANT: i64 = 0x000c;
const MORPH_CYCLIC: i64 = 0x0008;

/// Split strips into triangles, alternating the winding so every triangle
/// faces the same way. Triangles that repeat a point are skipped.
fn triangulate_strips(strips: &[StripRecord]) -> Vec<[usize; 3]> {
    let mut triangles = Vec::new();
    for strip in strips {
        for (i, window) in strip.points.windows(3).enumerate() {
            let [a, b, c] = [window[0], window[1], window[2]].map(usize::from);
            if a == b || b == c || a == c {
                continue;
            }
            if i % 2 == 0 {
                triangles.push([a, b, c]);
            } else {
                triangles.push([a, c, b]);
            }
        }
    }
    triangles
}

/// Output vertex of every source vertex, and the output positions.
fn map_vertices(geometry: &GeometryDataRecord, dedup: VertexDedup) -> (Vec<usize>, Vec<Vec3>) {
    let positions: Vec<Vec3> = geometry.vertices.iter().copied().map(Vec3::from).collect();
    if dedup == VertexDedup::Fast {
        return ((0..positions.len()).collect(), positions);
    }

    let has_normals = geometry.normals.len() == positions.len();
    let mut unique: HashMap<[i64; 6], usize> = HashMap::new();
    let mut v_map = Vec::with_capacity(positions.len());
    let mut vertices = Vec::new();
    for (i, position) in positions.iter().enumerate() {
        let normal = if has_normals {
            geometry.normals[i].map(float_hash)
        } else {
            [0; 3]
        };
        let [x, y, z] = position.to_array().map(float_hash);
        match unique.entry([x, y, z, normal[0], normal[1], normal[2]]) {
            Entry::Occupied(entry) => v_map.push(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(vertices.len());
                v_map.push(vertices.len());
                vertices.push(*position);
            }
        }
    }
    (v_map, vertices)
}

/// Source corners in the order of the output face's vertices.
fn corner_order(source: [usize; 3], v_map: &[usize], face: [usize; 3]) -> [usize; 3] {
    let [v1, v2, v3] = source;
    match face.iter().position(|vertex| *vertex == v_map[v1]) {
        Some(0) => [v1, v2, v3],
        Some(1) => [v3, v1, v2],
        _ => [v2, v3, v1],
    }
}

struct FaceList {
    faces: Vec<[usize; 3]>,
    face_map: Vec<Option<usize>>,
    /// Source triangle of every output face.
    sources: Vec<[usize; 3]>,
}

fn build_faces(name: &str, triangles: &[[usize; 3]], v_map: &[usize]) -> FaceList {
    let mut list = FaceList {
        faces: Vec::new(),
        face_map: Vec::with_capacity(triangles.len()),
        sources: Vec::new(),
    };
    let mut seen = HashSet::new();
    for &triangle in triangles {
        let [a, b, c] = triangle;
        if triangle.iter().any(|vertex| *vertex >= v_map.len()) {
            warn!("Mesh {:?} has a triangle past its vertices", name);
            list.face_map.push(None);
            continue;
        }
        let mut face = [v_map[a], v_map[b], v_map[c]];
        if a == b || b == c || a == c || face[0] == face[1] || face[1] == face[2] || face[0] == face[2]
        {
            list.face_map.push(None);
            continue;
        }
        // Vertex 0 never goes last.
        if face[2] == 0 {
            face = [face[1], face[2], face[0]];
        }
        let mut key = face;
        key.sort_unstable();
        if !seen.insert(key) {
            list.face_map.push(None);
            continue;
        }
        list.face_map.push(Some(list.faces.len()));
        list.faces.push(face);
        list.sources.push(triangle);
    }
    list
}

fn color_bytes(color: [f32; 4]) -> [u8; 4] {
    color.map(|channel| (channel * 255.0).clamp(0.0, 255.0) as u8)
}

impl<'a> ConversionSession<'a> {
    /// Convert a triangle list or strip geometry block into a mesh node.
    pub(super) fn convert_mesh(&mut self, block: &'a Block) -> Result<NodeAsset> {
        let graph = self.graph;
        let name = self.names.resolve(block.name(), OBJECT_NAME_LENGTH);
        debug!("Importing mesh {:?}", name);

        let data = block.field("Data")?.as_link("Data")?;
        let (geometry, triangles): (&GeometryDataRecord, Vec<[usize; 3]>) = match graph.resolve(data).map(|data| &data.data) {
            Some(BlockData::TriShapeData(data)) => (
                &data.geometry,
                data.triangles
                    .iter()
                    .map(|triangle| triangle.map(usize::from))
                    .collect(),
            ),
            Some(BlockData::TriStripsData(data)) => {
                (&data.geometry, triangulate_strips(&data.strips))
            }
            Some(_) => {
                return Err(ImportError::missing_data(
                    name,
                    "geometry data is not triangle data",
                ))
            }
            None => return Err(ImportError::missing_data(name, "geometry has no data")),
        };

        let (v_map, vertices) = map_vertices(geometry, self.params.vertex_dedup);
        let faces = build_faces(&name, &triangles, &v_map);
        let vertex_count = geometry.vertices.len();
        let uvs = geometry
            .uv_sets
            .first()
            .filter(|set| set.uvs.len() >= vertex_count)
            .map(|set| {
                faces
                    .sources
                    .iter()
                    .zip(&faces.faces)
                    .map(|(source, face)| {
                        corner_order(*source, &v_map, *face).map(|vertex| {
                            let [u, v] = set.uvs[vertex];
                            Vec2::new(u, 1.0 - v)
                        })
                    })
                    .collect::<Vec<_>>()
            });
        let colors = (!geometry.colors.is_empty() && geometry.colors.len() >= vertex_count).then(
            || {
                faces
                    .sources
                    .iter()
                    .zip(&faces.faces)
                    .map(|(source, face)| {
                        corner_order(*source, &v_map, *face)
                            .map(|vertex| color_bytes(geometry.colors[vertex]))
                    })
                    .collect::<Vec<_>>()
            },
        );

        let mut mesh = MeshAsset {
            vertices,
            faces: faces.faces,
            face_map: faces.face_map,
            smooth: !geometry.normals.is_empty(),
            hidden: block.av().is_some_and(|av| av.flags.hidden()),
            ..Default::default()
        };

        if let Some(mut properties) = MaterialProperties::find(graph, block) {
            if uvs.is_none() {
                // Textures cannot be mapped without coordinates.
                properties.texturing = None;
            }
            let material = self.convert_material(&properties)?;
            if colors.is_some() {
                mesh.vertex_color_mode = Some(if material.has_textures() {
                    VertexColorMode::Light
                } else {
                    VertexColorMode::Paint
                });
            }
            if uvs.is_some() {
                mesh.face_image = material
                    .base_texture
                    .as_ref()
                    .map(|info| info.texture.clone());
            }
            mesh.material = Some(material);
        }
        mesh.uvs = uvs;
        mesh.colors = colors;

        self.import_skin(block, &name, &v_map, &mut mesh)?;
        self.import_morphs(block, &name, &v_map, &mut mesh)?;

        let mut node =
            NodeAsset::new(self.asset_id(SourceAssetType::Node, block), name, NodeRole::Mesh);
        node.transform = graph.local_transform(block);
        node.mesh = Some(mesh);
        Ok(node)
    }

    /// One vertex group per skin bone, named like the joint it follows.
    fn import_skin(
        &mut self,
        block: &Block,
        name: &str,
        v_map: &[usize],
        mesh: &mut MeshAsset,
    ) -> Result<()> {
        let graph = self.graph;
        let link = block.field("Skin Instance")?.as_link("Skin Instance")?;
        let Some(skin) = graph.resolve(link) else {
            return Ok(());
        };
        let BlockData::SkinInstance(instance) = &skin.data else {
            return Err(ImportError::missing_data(name, "skin instance has the wrong type"));
        };
        let Some(BlockData::SkinData(data)) = graph.resolve(instance.data).map(|data| &data.data)
        else {
            return Err(ImportError::missing_data(name, "skin instance has no skin data"));
        };
        if instance.bones.len() != data.bones.len() {
            warn!(
                "Skin of {:?} lists {} bones but weights {}",
                name,
                instance.bones.len(),
                data.bones.len()
            );
        }
        for (bone, weights) in instance.bones.iter().zip(&data.bones) {
            let Some(bone) = graph.resolve(*bone) else {
                warn!("Skin of {:?} has a null bone", name);
                continue;
            };
            let group = self.names.resolve(bone.name(), BONE_NAME_LENGTH);
            let group = mesh.group_mut(&group);
            for weight in &weights.weights {
                match v_map.get(weight.vertex as usize) {
                    Some(vertex) => group.assign(*vertex, weight.weight),
                    None => warn!(
                        "Bone {:?} weights missing vertex {} of {:?}",
                        bone.name(),
                        weight.vertex,
                        name
                    ),
                }
            }
        }
        Ok(())
    }

    fn import_morphs(
        &mut self,
        block: &Block,
        name: &str,
        v_map: &[usize],
        mesh: &mut MeshAsset,
    ) -> Result<()> {
        let graph = self.graph;
        let Some(controller) = graph.find_controller(block, BlockType::NiGeomMorpherController)
        else {
            return Ok(());
        };
        let data = controller.field("Data")?.as_link("Data")?;
        let Some(BlockData::MorphData(data)) = graph.resolve(data).map(|data| &data.data) else {
            warn!("Morph controller of {:?} has no morph data", name);
            return Ok(());
        };
        if data.morphs.is_empty() {
            return Ok(());
        }
        let flags = controller.field("Flags")?.as_int("Flags")?;
        let extrapolation = match flags {
            MORPH_CONSTANT => Extrapolation::Constant,
            MORPH_CYCLIC => Extrapolation::Cyclic,
            other => {
                warn!(
                    "Unknown extrapolation flags {:#06x} on {:?}, using constant",
                    other, name
                );
                Extrapolation::Constant
            }
        };
        mesh.shape_keys = Some(self.shape_keys(data, v_map, &mesh.vertices, extrapolation));
        Ok(())
    }

    fn shape_keys(
        &self,
        data: &MorphDataRecord,
        v_map: &[usize],
        vertices: &[Vec3],
        extrapolation: Extrapolation,
    ) -> ShapeKeys {
        let fps = self.params.frames_per_second;
        let base = &data.morphs[0].vectors;
        let keys = data
            .morphs
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, morph)| {
                let mut positions = vertices.to_vec();
                for ((output, base), delta) in v_map.iter().zip(base).zip(&morph.vectors) {
                    positions[*output] = Vec3::from(*base) + Vec3::from(*delta);
                }
                let mut influence = Vec::new();
                for key in &morph.keys {
                    insert_key(&mut influence, frame_for_time(key.time, fps), key.value);
                }
                ShapeKey {
                    name: format!("Key {}", index),
                    positions,
                    influence,
                    extrapolation,
                }
            })
            .collect();
        ShapeKeys {
            basis: vertices.to_vec(),
            keys,
        }
    }
}

#[cfg(test)]
mod test {
    use glam::{Vec2, Vec3};

    use crate::{
        animation::Extrapolation,
        format::{
            block::{BlockData, BlockType},
            encode,
            record::{
                ControllerRecord, FloatKeyRecord, GeometryDataRecord, Link, MorphDataRecord,
                MorphRecord, StripRecord, TriStripsDataRecord,
            },
            Version,
        },
        import_nif,
        node::NodeRole,
        scene::SceneAsset,
        testing::GraphBuilder,
        ErrorKind, ImportParams, VertexDedup,
    };

    use super::{corner_order, triangulate_strips};

    fn params() -> ImportParams {
        ImportParams {
            scale_correction: 1.0,
            ..Default::default()
        }
    }

    fn import(builder: GraphBuilder, root: usize, params: &ImportParams) -> SceneAsset {
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(root)).unwrap();
        import_nif(&bytes, params).unwrap()
    }

    #[test]
    fn single_triangle_without_properties() {
        let mut builder = GraphBuilder::default();
        let shape = builder.triangle_mesh(
            "Plane",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[shape]);
        let scene = import(builder, root, &params());

        let node = &scene.nodes[0];
        assert_eq!(node.role, NodeRole::Mesh);
        let mesh = node.mesh.as_ref().unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.face_map, vec![Some(0)]);
        assert!(mesh.material.is_none());
        assert!(mesh.uvs.is_none());
        assert!(!mesh.smooth);
    }

    #[test]
    fn degenerate_and_duplicate_faces_are_dropped() {
        let mut builder = GraphBuilder::default();
        let shape = builder.triangle_mesh(
            "Plane",
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                // Same position as vertex 1.
                [1.0, 0.0, 0.0],
            ],
            &[[0, 1, 2], [0, 0, 2], [0, 3, 1], [2, 1, 0]],
        );
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[shape]);
        let scene = import(builder, root, &params());

        let mesh = scene.nodes[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.face_map, vec![Some(0), None, None, None]);
    }

    #[test]
    fn fast_dedup_keeps_every_vertex() {
        let mut builder = GraphBuilder::default();
        let shape = builder.triangle_mesh(
            "Plane",
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 0.0, 0.0],
            ],
            &[[0, 1, 2], [0, 3, 2]],
        );
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[shape]);
        let params = ImportParams {
            vertex_dedup: VertexDedup::Fast,
            ..params()
        };
        let scene = import(builder, root, &params);

        let mesh = scene.nodes[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.face_map, vec![Some(0), Some(1)]);
    }

    #[test]
    fn uvs_follow_rotated_faces() {
        let mut builder = GraphBuilder::default();
        let shape = builder.triangle_mesh(
            "Plane",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[1, 2, 0]],
        );
        builder.uvs(shape, &[[0.0, 0.0], [1.0, 0.0], [0.0, 0.25]]);
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[shape]);
        let scene = import(builder, root, &params());

        let mesh = scene.nodes[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.faces, vec![[2, 0, 1]]);
        let uvs = mesh.uvs.as_ref().unwrap();
        assert_eq!(
            uvs[0],
            [Vec2::new(0.0, 0.75), Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0)]
        );
    }

    #[test]
    fn corners_match_face_order() {
        let v_map = [0, 1, 2];
        assert_eq!(corner_order([0, 1, 2], &v_map, [0, 1, 2]), [0, 1, 2]);
        assert_eq!(corner_order([0, 1, 2], &v_map, [2, 0, 1]), [2, 0, 1]);
        assert_eq!(corner_order([0, 1, 2], &v_map, [1, 2, 0]), [1, 2, 0]);
    }

    #[test]
    fn strips_alternate_winding() {
        let strips = [StripRecord {
            points: vec![0, 1, 2, 3, 3, 4],
        }];
        assert_eq!(triangulate_strips(&strips), vec![[0, 1, 2], [1, 3, 2]]);
    }

    #[test]
    fn strip_geometry_is_imported() {
        let mut builder = GraphBuilder::default();
        let data = builder.push(
            BlockType::NiTriStripsData,
            BlockData::TriStripsData(TriStripsDataRecord {
                geometry: GeometryDataRecord {
                    vertices: vec![
                        [0.0, 0.0, 0.0],
                        [1.0, 0.0, 0.0],
                        [0.0, 1.0, 0.0],
                        [1.0, 1.0, 0.0],
                    ],
                    ..Default::default()
                },
                strips: vec![StripRecord {
                    points: vec![0, 1, 2, 3],
                }],
            }),
        );
        let shape = builder.strips("Quad", data);
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[shape]);
        let scene = import(builder, root, &params());

        let mesh = scene.nodes[0].mesh.as_ref().unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2], [1, 3, 2]]);
    }

    #[test]
    fn missing_data_names_the_mesh() {
        let mut builder = GraphBuilder::default();
        let not_data = builder.node("Not Data", [0.0, 0.0, 0.0], &[]);
        let shape = builder.shape("Tri Broken", not_data);
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[shape]);
        let bytes = encode(Version::new(4, 0, 0, 2), &builder.finish(root)).unwrap();
        let error = import_nif(&bytes, &params()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingData);
        assert_eq!(error.node(), Some("Broken"));
    }

    #[test]
    fn skin_weights_follow_merged_vertices() {
        let mut builder = GraphBuilder::default();
        let bone = builder.node("Bip01 Spine", [0.0, 0.0, 0.0], &[]);
        let skeleton = builder.node("Skeleton", [0.0, 0.0, 0.0], &[bone]);
        let shape = builder.triangle_mesh(
            "Body",
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 0.0, 0.0],
            ],
            &[[0, 1, 2]],
        );
        builder.skin(shape, skeleton, &[(bone, &[(3, 0.25), (9, 1.0)])]);
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[skeleton, shape]);
        let scene = import(builder, root, &params());

        let mesh = scene.find("Body").unwrap().mesh.as_ref().unwrap();
        let group = mesh.group("Bip01 Spine").unwrap();
        assert_eq!(group.weights.len(), 1);
        assert_eq!(group.weights[&1], 0.25);
    }

    #[test]
    fn morph_keys_hold_absolute_positions() {
        let mut builder = GraphBuilder::default();
        let shape = builder.triangle_mesh(
            "Face",
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2]],
        );
        let morph = builder.push(
            BlockType::NiMorphData,
            BlockData::MorphData(MorphDataRecord {
                vertex_count: 3,
                morphs: vec![
                    MorphRecord {
                        keys: Vec::new(),
                        vectors: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                    },
                    MorphRecord {
                        keys: vec![
                            FloatKeyRecord {
                                time: 0.0,
                                value: 0.0,
                            },
                            FloatKeyRecord {
                                time: 1.0,
                                value: 1.0,
                            },
                        ],
                        vectors: vec![[0.0, 0.0, 1.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
                    },
                ],
            }),
        );
        let controller = builder.push(
            BlockType::NiGeomMorpherController,
            BlockData::Controller(ControllerRecord {
                flags: 0x0008,
                data: Link::to(morph),
                ..Default::default()
            }),
        );
        builder.set_controller(shape, controller);
        let root = builder.node("Scene Root", [0.0, 0.0, 0.0], &[shape]);
        let scene = import(builder, root, &params());

        let mesh = scene.nodes[0].mesh.as_ref().unwrap();
        let shape_keys = mesh.shape_keys.as_ref().unwrap();
        assert_eq!(shape_keys.basis, mesh.vertices);
        assert_eq!(shape_keys.keys.len(), 1);
        let key = &shape_keys.keys[0];
        assert_eq!(key.name, "Key 1");
        assert_eq!(key.positions[0], Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(key.positions[1], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(key.extrapolation, Extrapolation::Cyclic);
        assert_eq!(key.influence.len(), 2);
        assert_eq!(key.influence[1].frame, 26);
    }
}
