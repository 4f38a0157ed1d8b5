//! Viewer application state.

use ash::vk;
use glam::{Mat4, Quat, Vec3};
use tracing::info;
use trellis_app::{AppContext, Camera, SandboxApp};
use trellis_gpu::texture::checkerboard;
use trellis_gpu::Texture;
use trellis_render::{Mesh, MeshData, Scene, StaticScene};

use crate::Options;

/// Distance between neighbouring cube centres.
const SPACING: f32 = 2.0;
const TEXTURE_SIZE: u32 = 64;
const CHECKER_CELL: u32 = 8;

/// Checkerboard colour pairs, one material each.
const PALETTES: [([u8; 4], [u8; 4]); 3] = [
    ([235, 235, 235, 255], [40, 40, 40, 255]),
    ([250, 200, 90, 255], [120, 60, 20, 255]),
    ([120, 200, 250, 255], [20, 50, 110, 255]),
];

/// Centres of `count` cubes on a square grid in the XZ plane, centred on
/// the origin and filled row by row.
pub fn cube_layout(count: u32) -> Vec<Vec3> {
    let side = (count as f32).sqrt().ceil().max(1.0) as u32;
    let offset = (side - 1) as f32 * SPACING * 0.5;

    (0..count)
        .map(|i| {
            let x = (i % side) as f32 * SPACING - offset;
            let z = (i / side) as f32 * SPACING - offset;
            Vec3::new(x, 0.0, z)
        })
        .collect()
}

struct Cube {
    position: Vec3,
    axis: Vec3,
    speed: f32,
    material: vk::DescriptorSet,
}

/// Viewer application state.
pub struct Viewer {
    scene: StaticScene,
    camera: Camera,
    cubes: Vec<Cube>,
    time: f32,
    // Referenced by the scene's drawables; dropped after it.
    mesh: Mesh,
    _textures: Vec<Texture>,
}

impl SandboxApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let options = Options::from_env().unwrap_or_default();

        let textures = PALETTES
            .iter()
            .map(|&(light, dark)| {
                let pixels = checkerboard(TEXTURE_SIZE, CHECKER_CELL, light, dark);
                ctx.renderer.create_texture(TEXTURE_SIZE, TEXTURE_SIZE, &pixels)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let materials = textures
            .iter()
            .map(|texture| ctx.renderer.create_material(texture))
            .collect::<Result<Vec<_>, _>>()?;

        let mesh = ctx.renderer.upload_mesh(&MeshData::cube())?;

        let cubes = cube_layout(options.cubes)
            .into_iter()
            .enumerate()
            .map(|(i, position)| Cube {
                position,
                axis: Vec3::new(1.0, 1.0 + i as f32 * 0.37, 0.5).normalize(),
                speed: 0.6 + (i % 5) as f32 * 0.25,
                material: materials[i % materials.len()],
            })
            .collect::<Vec<_>>();

        let extent = (cubes.len() as f32).sqrt().ceil().max(1.0) * SPACING;
        let eye = Vec3::new(0.0, extent * 0.8, extent * 1.4 + 2.0);
        let mut camera = Camera::looking_at(eye, Vec3::ZERO);
        camera.far = extent * 10.0 + 50.0;
        camera.set_aspect(ctx.aspect_ratio());

        info!(
            "Viewer ready: {} cubes, {} materials ({} slots left)",
            cubes.len(),
            materials.len(),
            ctx.renderer.remaining_materials()
        );

        let mut viewer = Self {
            scene: StaticScene::default(),
            camera,
            cubes,
            time: 0.0,
            mesh,
            _textures: textures,
        };
        viewer.rebuild_scene();
        Ok(viewer)
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        self.time += dt;
        self.camera.set_aspect(ctx.aspect_ratio());
        self.rebuild_scene();
    }

    fn scene(&self) -> &dyn Scene {
        &self.scene
    }

    fn on_resize(&mut self, _ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        self.camera.set_viewport(width, height);
        info!("Viewport now {width}x{height}");
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &mut AppContext) {
        self.scene.drawables.clear();
    }
}

impl Viewer {
    fn rebuild_scene(&mut self) {
        self.scene.camera = self.camera.uniforms();
        self.scene.drawables = self
            .cubes
            .iter()
            .map(|cube| {
                let rotation = Quat::from_axis_angle(cube.axis, self.time * cube.speed);
                let transform = Mat4::from_rotation_translation(rotation, cube.position);
                self.mesh.drawable(transform, cube.material)
            })
            .collect();
    }
}
