use std::{error::Error, fs, path::PathBuf};

use clap::{Parser, ValueEnum};
use glam::{Mat3, Mat4, Quat, Vec3};
use log::info;
use nif_asset::{
    host::{publish, MeshTexture, ProgressSink, SceneHost},
    import_nif_file,
    mesh::MeshAsset,
    node::{NodeRole, ParentMode},
    scene::SceneAsset,
    texture::TextureAsset,
    ImportParams, VertexDedup, SCALE_CORRECTION_RANGE,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Dedup {
    Fast,
    Seams,
}

#[derive(Parser)]
#[command(name = "nif-inspect", about = "Import a NIF file and print the scene tree")]
struct Cli {
    path: PathBuf,
    /// JSON file with import parameters; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Semicolon-separated texture directories.
    #[arg(long)]
    textures: Option<String>,
    /// Source units per output unit, 0.01 to 100.
    #[arg(long, value_parser = parse_scale)]
    scale: Option<f32>,
    #[arg(long, value_enum)]
    dedup: Option<Dedup>,
    #[arg(long, value_parser = parse_fps)]
    fps: Option<f32>,
    /// 0 (errors only) to 4 (every key).
    #[arg(short, long)]
    verbosity: Option<u8>,
    /// Also print the name and joint alignment records.
    #[arg(long)]
    records: bool,
}

fn parse_scale(value: &str) -> Result<f32, String> {
    let scale: f32 = value.parse().map_err(|err| format!("{err}"))?;
    if SCALE_CORRECTION_RANGE.contains(&scale) {
        Ok(scale)
    } else {
        Err(format!(
            "must be between {} and {}",
            SCALE_CORRECTION_RANGE.start(),
            SCALE_CORRECTION_RANGE.end()
        ))
    }
}

fn parse_fps(value: &str) -> Result<f32, String> {
    let fps: f32 = value.parse().map_err(|err| format!("{err}"))?;
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err(String::from("must be a positive number"))
    }
}

impl Cli {
    fn params(&self) -> Result<ImportParams, Box<dyn Error>> {
        let mut params = match &self.config {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => ImportParams::default(),
        };
        if let Some(textures) = &self.textures {
            params.texture_search_path = textures.clone();
        }
        if let Some(scale) = self.scale {
            params.scale_correction = scale;
        }
        if let Some(dedup) = self.dedup {
            params.vertex_dedup = match dedup {
                Dedup::Fast => VertexDedup::Fast,
                Dedup::Seams => VertexDedup::SeamPreserving,
            };
        }
        if let Some(fps) = self.fps {
            params.frames_per_second = fps;
        }
        if let Some(verbosity) = self.verbosity {
            params.verbosity = verbosity;
        }
        params.validate()?;
        Ok(params)
    }
}

/// Host that prints every call as one line, naming nodes by creation order.
#[derive(Default)]
struct PrintHost {
    nodes: usize,
    textures: usize,
}

impl PrintHost {
    fn add(&mut self, line: String) -> usize {
        self.nodes += 1;
        println!("#{} {}", self.nodes, line);
        self.nodes
    }
}

impl ProgressSink for PrintHost {
    fn report_progress(&mut self, fraction: f32, message: &str) {
        info!("{} ({:.0}%)", message, fraction * 100.0);
    }
}

impl SceneHost for PrintHost {
    type Node = usize;
    type Texture = usize;

    fn create_scene_node(&mut self, role: NodeRole, name: &str) -> usize {
        self.add(format!("{:?} {:?}", role, name))
    }

    fn set_local_transform(&mut self, node: &usize, matrix: Mat4) {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        println!(
            "#{} at {} rotated {} scaled {}",
            node, translation, rotation, scale
        );
    }

    fn set_parent(&mut self, child: &usize, parent: &usize, mode: ParentMode) {
        println!("#{} child of #{} ({:?})", child, parent, mode);
    }

    fn create_mesh(
        &mut self,
        name: &str,
        mesh: &MeshAsset,
        textures: &[MeshTexture<usize>],
    ) -> usize {
        let material = mesh
            .material
            .as_ref()
            .map_or("none", |material| material.name.as_str());
        self.add(format!(
            "Mesh {:?}: {} vertices, {} faces, {} groups, {} shape keys, material {:?}, {} textures",
            name,
            mesh.vertices.len(),
            mesh.faces.len(),
            mesh.groups.len(),
            mesh.shape_keys.as_ref().map_or(0, |keys| keys.keys.len()),
            material,
            textures.len()
        ))
    }

    fn create_joint(
        &mut self,
        armature: &usize,
        parent: Option<&usize>,
        name: &str,
        head: Vec3,
        tail: Vec3,
        _orientation: Mat3,
    ) -> usize {
        let parent = parent.unwrap_or(armature);
        self.add(format!(
            "Joint {:?} under #{} from {} to {}",
            name, parent, head, tail
        ))
    }

    fn insert_transform_keyframe(
        &mut self,
        node: &usize,
        frame: u32,
        translation: Option<Vec3>,
        rotation: Option<Quat>,
        scale: Option<f32>,
    ) {
        println!(
            "#{} frame {}: {:?} {:?} {:?}",
            node, frame, translation, rotation, scale
        );
    }

    fn create_or_reuse_texture(&mut self, texture: &TextureAsset) -> usize {
        self.textures += 1;
        println!(
            "texture {} ({}): {}x{} from {:?}",
            self.textures, texture.id, texture.size.0, texture.size.1, texture.source
        );
        self.textures
    }
}

fn print_records(scene: &SceneAsset) {
    println!("names:");
    print!("{}", scene.names_text());
    println!("alignments:");
    print!("{}", scene.alignments_text());
    println!("text keys:");
    print!("{}", scene.text_keys_text());
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let params = cli.params()?;
    env_logger::Builder::new()
        .filter_level(params.level_filter())
        .parse_default_env()
        .init();

    let scene = import_nif_file(&cli.path, &params)?;
    println!("{} (version {})", cli.path.display(), scene.version);
    let mut host = PrintHost::default();
    publish(&scene, &mut host);
    if cli.records {
        print_records(&scene);
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
