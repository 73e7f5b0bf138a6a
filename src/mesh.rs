use glam::{Mat3, Mat4, Vec2, Vec3};
use gltf::mesh::Mode;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Asset failures surfaced at initialisation.
#[derive(Debug, Error)]
pub enum ResourceLoadError {
    #[error("failed to import model {path}")]
    Model {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("model {path} contains no triangle primitives")]
    EmptyModel { path: PathBuf },
    #[error("unsupported texture format {format:?} in {path}")]
    TextureFormat { path: PathBuf, format: gltf::image::Format },
    #[error("failed to load image {path}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid font atlas: {0}")]
    InvalidFont(String),
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl ModelVertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self { position: position.to_array(), normal: normal.to_array(), uv: uv.to_array() }
    }

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 24,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// One triangle primitive with its node transform already applied.
#[derive(Clone, Debug)]
pub struct ModelMesh {
    pub name: Option<String>,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material_slot: usize,
}

#[derive(Clone, Debug)]
pub struct ModelMaterial {
    pub label: String,
    pub base_color: [f32; 4],
    /// Index into [`ModelData::textures`].
    pub texture: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct ModelTexture {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// CPU-side model: meshes plus a material table where slot 0 is the implicit default material
/// and glTF material `i` occupies slot `i + 1`.
#[derive(Clone, Debug)]
pub struct ModelData {
    pub meshes: Vec<ModelMesh>,
    pub materials: Vec<ModelMaterial>,
    pub textures: Vec<ModelTexture>,
}

impl ModelData {
    pub fn load_gltf(path: impl AsRef<Path>) -> Result<Self, ResourceLoadError> {
        let path = path.as_ref();
        let (document, buffers, images) = gltf::import(path)
            .map_err(|source| ResourceLoadError::Model { path: path.to_path_buf(), source })?;

        let mut textures = Vec::with_capacity(images.len());
        for image in &images {
            let rgba = convert_image_to_rgba(image).ok_or_else(|| ResourceLoadError::TextureFormat {
                path: path.to_path_buf(),
                format: image.format,
            })?;
            textures.push(ModelTexture { width: image.width, height: image.height, rgba });
        }

        let mut materials =
            vec![ModelMaterial { label: "default".to_string(), base_color: [1.0; 4], texture: None }];
        for (index, material) in document.materials().enumerate() {
            let pbr = material.pbr_metallic_roughness();
            materials.push(ModelMaterial {
                label: material.name().map(str::to_string).unwrap_or_else(|| format!("material_{index}")),
                base_color: pbr.base_color_factor(),
                texture: pbr.base_color_texture().map(|info| info.texture().source().index()),
            });
        }

        let mut meshes = Vec::new();
        let roots: Vec<gltf::Node> = match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => scene.nodes().collect(),
            None => document.nodes().collect(),
        };
        for node in roots {
            collect_node(&node, Mat4::IDENTITY, &buffers, &mut meshes);
        }
        if meshes.is_empty() {
            return Err(ResourceLoadError::EmptyModel { path: path.to_path_buf() });
        }

        Ok(Self { meshes, materials, textures })
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.indices.len() / 3).sum()
    }
}

fn collect_node(node: &gltf::Node, parent: Mat4, buffers: &[gltf::buffer::Data], out: &mut Vec<ModelMesh>) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
        for (primitive_index, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != Mode::Triangles {
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<Vec3> =
                positions.map(|p| world.transform_point3(Vec3::from_array(p))).collect();
            if positions.is_empty() {
                continue;
            }
            let indices: Vec<u32> = reader
                .read_indices()
                .map(|read| read.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());

            let mut normals: Vec<Vec3> = reader
                .read_normals()
                .map(|it| it.map(|n| (normal_matrix * Vec3::from_array(n)).normalize_or_zero()).collect())
                .unwrap_or_default();
            if normals.len() != positions.len() {
                normals = compute_normals(&positions, &indices);
            }
            let mut tex_coords: Vec<Vec2> = reader
                .read_tex_coords(0)
                .map(|coords| coords.into_f32().map(Vec2::from_array).collect())
                .unwrap_or_default();
            tex_coords.resize(positions.len(), Vec2::ZERO);

            let vertices = positions
                .iter()
                .zip(&normals)
                .zip(&tex_coords)
                .map(|((pos, normal), uv)| ModelVertex::new(*pos, *normal, *uv))
                .collect();
            let material_slot = primitive.material().index().map_or(0, |index| index + 1);
            let name = mesh.name().map(|mesh_name| format!("{mesh_name}::{primitive_index}"));
            out.push(ModelMesh { name, vertices, indices, material_slot });
        }
    }
    for child in node.children() {
        collect_node(&child, world, buffers, out);
    }
}

fn convert_image_to_rgba(image: &gltf::image::Data) -> Option<Vec<u8>> {
    match image.format {
        gltf::image::Format::R8 => Some(image.pixels.iter().flat_map(|&v| [v, v, v, 255]).collect()),
        gltf::image::Format::R8G8 => {
            Some(image.pixels.chunks_exact(2).flat_map(|c| [c[0], c[1], 0, 255]).collect())
        }
        gltf::image::Format::R8G8B8 => {
            Some(image.pixels.chunks_exact(3).flat_map(|c| [c[0], c[1], c[2], 255]).collect())
        }
        gltf::image::Format::R8G8B8A8 => Some(image.pixels.clone()),
        _ => None,
    }
}

fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let normal = (positions[i1] - positions[i0]).cross(positions[i2] - positions[i0]);
        normals[i0] += normal;
        normals[i1] += normal;
        normals[i2] += normal;
    }
    for normal in &mut normals {
        *normal = normal.try_normalize().unwrap_or(Vec3::Y);
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [ { "nodes": [0] } ],
        "nodes": [ { "mesh": 0, "translation": [0.0, 0.0, 2.0] } ],
        "meshes": [ { "name": "tri", "primitives": [ { "attributes": { "POSITION": 0 }, "material": 0 } ] } ],
        "materials": [
            { "name": "red", "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0] } }
        ],
        "buffers": [ { "uri": "tri.bin", "byteLength": 36 } ],
        "bufferViews": [ { "buffer": 0, "byteOffset": 0, "byteLength": 36 } ],
        "accessors": [ {
            "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
            "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
        } ]
    }"#;

    fn write_triangle(dir: &Path) -> PathBuf {
        let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        fs::write(dir.join("tri.bin"), bytemuck::cast_slice(&positions)).expect("write buffer");
        let path = dir.join("tri.gltf");
        fs::write(&path, TRIANGLE_GLTF).expect("write gltf");
        path
    }

    #[test]
    fn imports_triangle_with_baked_node_transform() {
        let dir = tempfile::tempdir().expect("temp dir");
        let model = ModelData::load_gltf(write_triangle(dir.path())).expect("model loads");
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 2.0]);
        let normal = Vec3::from_array(mesh.vertices[0].normal);
        assert!((normal - Vec3::Z).length() < 1e-5, "generated normal should face +Z, got {normal}");
        assert_eq!(model.triangle_count(), 1);
    }

    #[test]
    fn gltf_materials_are_shifted_behind_the_default_slot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let model = ModelData::load_gltf(write_triangle(dir.path())).expect("model loads");
        assert_eq!(model.materials.len(), 2);
        assert_eq!(model.materials[0].label, "default");
        assert_eq!(model.materials[1].base_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.meshes[0].material_slot, 1);
    }

    #[test]
    fn missing_file_reports_model_error() {
        let err = ModelData::load_gltf("does/not/exist.glb").unwrap_err();
        assert!(matches!(err, ResourceLoadError::Model { .. }));
        assert!(err.to_string().contains("does/not/exist.glb"));
    }
}
