use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Stage {
    Vertex,
    Pixel,
    Geometry,
    Hull,
    Domain,
    Compute,
    Raygeneration,
    Intersection,
    Miss,
    AnyHit,
    ClosestHit,
    Amplification,
    Mesh,
}
impl Stage {
    /// Pipeline order in which stages claim consecutive descriptor sets.
    pub const PIPELINE_ORDER: [Stage; 13] = [
        Stage::Vertex,
        Stage::Pixel,
        Stage::Geometry,
        Stage::Hull,
        Stage::Domain,
        Stage::Compute,
        Stage::Raygeneration,
        Stage::Intersection,
        Stage::Miss,
        Stage::AnyHit,
        Stage::ClosestHit,
        Stage::Amplification,
        Stage::Mesh,
    ];

    /// Stage encoded in a `Name.<tag>.hlsl` file name.
    pub fn from_path(path: &Path) -> Option<Stage> {
        let name = path.file_name()?.to_str()?;
        let suffixes = [
            (".cs.hlsl", Stage::Compute),
            (".vs.hlsl", Stage::Vertex),
            (".ps.hlsl", Stage::Pixel),
            (".gs.hlsl", Stage::Geometry),
            (".hs.hlsl", Stage::Hull),
            (".ds.hlsl", Stage::Domain),
            (".rg.hlsl", Stage::Raygeneration),
            (".is.hlsl", Stage::Intersection),
            (".ms.hlsl", Stage::Miss),
            (".ah.hlsl", Stage::AnyHit),
            (".ch.hlsl", Stage::ClosestHit),
            (".amp.hlsl", Stage::Amplification),
            (".mesh.hlsl", Stage::Mesh),
        ];
        suffixes
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|&(_, stage)| stage)
    }

    pub fn is_raytracing(self) -> bool {
        matches!(
            self,
            Stage::Raygeneration
                | Stage::Intersection
                | Stage::Miss
                | Stage::AnyHit
                | Stage::ClosestHit
        )
    }

    /// Short stage name used by the Vulkan tool chain. Domain maps to `tesc`
    /// and Hull to `tese`.
    pub fn vulkan_name(self) -> &'static str {
        match self {
            Stage::Compute => "comp",
            Stage::Domain => "tesc",
            Stage::Geometry => "geom",
            Stage::Hull => "tese",
            Stage::Pixel => "frag",
            Stage::Vertex => "vert",
            Stage::Raygeneration => "raygeneration",
            Stage::Intersection => "intersection",
            Stage::Miss => "miss",
            Stage::AnyHit => "anyhit",
            Stage::ClosestHit => "closesthit",
            Stage::Amplification => "amplification",
            Stage::Mesh => "mesh",
        }
    }

    /// Descriptor set the stage's resources are bound to in the table model.
    pub fn descriptor_set(self) -> u32 {
        match self.vulkan_name() {
            "comp" | "vert" => 0,
            "frag" => 1,
            "geom" => 2,
            "tesc" => 3,
            "tese" => 4,
            "raygeneration" => 5,
            "intersection" => 6,
            "miss" => 7,
            "anyhit" => 8,
            "closesthit" => 9,
            "amplification" => 10,
            _ => 11,
        }
    }

    /// Root-signature visibility; raytracing stages use local root
    /// signatures and carry none.
    pub fn visibility(self) -> Option<&'static str> {
        let out = match self {
            Stage::Compute => "SHADER_VISIBILITY_ALL",
            Stage::Domain => "SHADER_VISIBILITY_DOMAIN",
            Stage::Geometry => "SHADER_VISIBILITY_GEOMETRY",
            Stage::Hull => "SHADER_VISIBILITY_HULL",
            Stage::Pixel => "SHADER_VISIBILITY_PIXEL",
            Stage::Vertex => "SHADER_VISIBILITY_VERTEX",
            Stage::Amplification => "SHADER_VISIBILITY_AMPLIFICATION",
            Stage::Mesh => "SHADER_VISIBILITY_MESH",
            _ => return None,
        };
        Some(out)
    }

    pub fn class_type(self) -> String {
        format!("{:?}Shader", self)
    }
}

/// `SomeShader.vs.hlsl` gives `("SomeShaderVS", "SomeShader")`.
pub fn class_names(path: &Path) -> (String, String) {
    let file = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or_default();
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    match stem.rsplit_once('.') {
        Some((pipeline, tag)) => (
            format!("{}{}", pipeline, tag.to_uppercase()),
            pipeline.to_owned(),
        ),
        None => (stem.to_owned(), stem.to_owned()),
    }
}
