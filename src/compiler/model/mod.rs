//! Binding model: the resource declarations of one shader stage, grouped
//! into binding categories, plus its feature permutations.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::lex::tables;
use super::syn::{NodeId, NodeKind, SyntaxNode, SyntaxTree};

pub mod permute;
mod stage;

pub use permute::{Permutation, PermutationSwitch, Switches};
pub use stage::{class_names, Stage};

#[cfg(test)]
mod tests;

pub const SRV_TYPES: &[&str] = &[
    "Buffer",
    "Texture1D",
    "Texture1DArray",
    "Texture2D",
    "Texture2DArray",
    "Texture3D",
    "TextureCube",
    "TextureCubeArray",
    "Texture2DMS",
    "Texture2DMSArray",
    "StructuredBuffer",
    "ByteAddressBuffer",
];
pub const UAV_TYPES: &[&str] = &[
    "RWBuffer",
    "RWByteAddressBuffer",
    "RWStructuredBuffer",
    "AppendStructuredBuffer",
    "RWTexture1D",
    "RWTexture1DArray",
    "RWTexture2D",
    "RWTexture2DArray",
    "RWTexture3D",
];
pub const CONSTANT_BUFFER_TYPES: &[&str] = &["ConstantBuffer"];
const STRUCTURED_TYPES: &[&str] = &[
    "StructuredBuffer",
    "RWStructuredBuffer",
    "AppendStructuredBuffer",
];
const CUBE_TYPES: &[&str] = &["TextureCube", "TextureCubeArray"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    #[serde(rename = "type")]
    pub cpp_type: Option<String>,
    pub name: String,
}

/// One classified declaration. Fields that do not apply to the category are
/// left at their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub cpp_type: Option<String>,
    pub name: String,
    pub identifier: String,
    pub index: usize,
    pub line: u32,
    /// Position among the root-level declarations of the file.
    #[serde(skip)]
    pub order: usize,
    /// Register clause already written in the source.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub register: Option<String>,
    pub dimension: Option<String>,
    pub format: String,
    pub structured: bool,
    pub cube: bool,
    pub identifiers: Vec<MemberEntry>,
}

macro_rules! define_categories {
    ($( $variant:ident ($field:ident, $flag:ident), )+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Category {
            $( $variant, )+
        }
        impl Category {
            pub const ALL: &'static [Category] = &[ $( Category::$variant, )+ ];
            /// Name of the category's list in the serialized model.
            pub fn field_name(self) -> &'static str {
                match self {
                    $( Category::$variant => stringify!($field), )+
                }
            }
        }

        paste::paste! {
            /// Per-category resource lists with their `has_*` flags.
            #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
            pub struct ResourceLists {
                $(
                    pub $field: Vec<ResourceEntry>,
                    pub [<has_ $flag>]: bool,
                )+
            }
            impl ResourceLists {
                pub fn get(&self, category: Category) -> &[ResourceEntry] {
                    match category {
                        $( Category::$variant => &self.$field, )+
                    }
                }
                /// Appends `entry` with its ordinal inside the category and
                /// returns that ordinal.
                pub fn push(&mut self, category: Category, mut entry: ResourceEntry) -> usize {
                    match category {
                        $(
                            Category::$variant => {
                                entry.index = self.$field.len();
                                self.[<has_ $flag>] = true;
                                self.$field.push(entry);
                                self.$field.len() - 1
                            }
                        )+
                    }
                }
            }
        }
    };
}

define_categories! {
    Constants(constant_structures, constants),
    Samplers(samplers, samplers),
    TextureSrvs(texture_srvs, texture_srvs),
    BindlessTextureSrvs(bindless_texture_srvs, bindless_texture_srvs),
    BufferSrvs(buffer_srvs, buffer_srvs),
    BindlessBufferSrvs(bindless_buffer_srvs, bindless_buffer_srvs),
    AccelerationStructures(acceleration_structures, acceleration_structures),
    TextureUavs(texture_uavs, texture_uavs),
    BindlessTextureUavs(bindless_texture_uavs, bindless_texture_uavs),
    BufferUavs(buffer_uavs, buffer_uavs),
    BindlessBufferUavs(bindless_buffer_uavs, bindless_buffer_uavs),
    RootConstants(root_constants, root_constants),
}
impl Category {
    pub fn is_bindless(self) -> bool {
        matches!(
            self,
            Category::BindlessTextureSrvs
                | Category::BindlessBufferSrvs
                | Category::BindlessTextureUavs
                | Category::BindlessBufferUavs
        )
    }
    pub fn is_srv(self) -> bool {
        matches!(
            self,
            Category::TextureSrvs
                | Category::BindlessTextureSrvs
                | Category::BufferSrvs
                | Category::BindlessBufferSrvs
        )
    }
    pub fn is_uav(self) -> bool {
        matches!(
            self,
            Category::TextureUavs
                | Category::BindlessTextureUavs
                | Category::BufferUavs
                | Category::BindlessBufferUavs
        )
    }
    fn is_buffer(self) -> bool {
        matches!(
            self,
            Category::BufferSrvs
                | Category::BindlessBufferSrvs
                | Category::BufferUavs
                | Category::BindlessBufferUavs
        )
    }
    /// Tag of the binding record the renderer emits for this category.
    fn binding_tag(self) -> Option<&'static str> {
        let out = match self {
            Category::TextureSrvs => "SRVTexture",
            Category::BindlessTextureSrvs => "BindlessSRVTexture",
            Category::BufferSrvs => "SRVBuffer",
            Category::BindlessBufferSrvs => "BindlessSRVBuffer",
            Category::TextureUavs => "UAVTexture",
            Category::BindlessTextureUavs => "BindlessUAVTexture",
            Category::BufferUavs => "UAVBuffer",
            Category::BindlessBufferUavs => "BindlessUAVBuffer",
            Category::AccelerationStructures => "RaytracingAccelerationStructure",
            _ => return None,
        };
        Some(out)
    }
}

fn split_view(base: &str, bindless: bool, srv: bool) -> Category {
    match (srv, base.contains("Buffer"), bindless) {
        (true, true, true) => Category::BindlessBufferSrvs,
        (true, true, false) => Category::BufferSrvs,
        (true, false, true) => Category::BindlessTextureSrvs,
        (true, false, false) => Category::TextureSrvs,
        (false, true, true) => Category::BindlessBufferUavs,
        (false, true, false) => Category::BufferUavs,
        (false, false, true) => Category::BindlessTextureUavs,
        (false, false, false) => Category::TextureUavs,
    }
}

/// Binding category of a declaration, `None` when its type binds nothing.
pub fn classify(node: &SyntaxNode) -> Option<Category> {
    let base = node.base_type();
    if matches!(
        node.ty.as_str(),
        "sampler" | "SamplerState" | "SamplerComparisonState"
    ) {
        Some(Category::Samplers)
    } else if node.ty == "cbuffer" {
        Some(Category::Constants)
    } else if SRV_TYPES.contains(&base) {
        Some(split_view(base, node.is_bindless(), true))
    } else if UAV_TYPES.contains(&base) {
        Some(split_view(base, node.is_bindless(), false))
    } else if node.ty.contains("RaytracingAccelerationStructure") {
        Some(Category::AccelerationStructures)
    } else if CONSTANT_BUFFER_TYPES.contains(&base) {
        Some(Category::RootConstants)
    } else {
        None
    }
}

/// Type name used by generated binding code for a declared type.
pub fn cpp_type(ty: &str) -> Option<String> {
    let base = ty.strip_suffix("Bindless").unwrap_or(ty);
    let base = base.split('<').next().unwrap_or(base);
    let bindless = if ty.ends_with("Bindless") { "Bindless" } else { "" };
    let view = if SRV_TYPES.contains(&base) {
        "SRV"
    } else if UAV_TYPES.contains(&base) {
        "UAV"
    } else if CONSTANT_BUFFER_TYPES.contains(&base) {
        return Some("RootConstant".to_owned());
    } else if tables::is_complete_system_type(ty) {
        let mut chars = ty.chars();
        return chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect::<String>());
    } else {
        return None;
    };
    let shape = if base.contains("Buffer") {
        "Buffer"
    } else if base.contains("Texture") {
        "Texture"
    } else {
        return None;
    };
    Some(format!("{}{}{}", bindless, shape, view))
}

/// Engine pixel format for a template element type.
pub fn engine_format(format: Option<&str>) -> &'static str {
    match format.unwrap_or_default() {
        "float" => "Format::R32_FLOAT",
        "float2" => "Format::R32G32_FLOAT",
        "float3" => "Format::R32G32B32_FLOAT",
        "float4" => "Format::R32G32B32A32_FLOAT",
        "uint" => "Format::R32_UINT",
        "uint2" => "Format::R32G32_UINT",
        "uint3" => "Format::R32G32B32_UINT",
        "uint4" => "Format::R32G32B32A32_UINT",
        _ => "Format::UNKNOWN",
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParameter {
    pub name: String,
    pub semantic: Option<String>,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRef {
    #[serde(rename = "type")]
    pub cpp_type: Option<String>,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dimension: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEntry {
    #[serde(rename = "type")]
    pub tag: String,
    pub index: usize,
    pub dimension: String,
    pub format: String,
}

/// A declaration that matched no binding category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unclassified {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub line: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingModel {
    pub stage: Option<Stage>,
    pub shader_class: String,
    pub pipeline_configuration_class: String,
    pub class_type: String,

    #[serde(flatten)]
    pub resources: ResourceLists,
    pub descriptor_count: usize,

    pub srvs: Vec<ViewRef>,
    pub uavs: Vec<ViewRef>,
    pub dimensions: Vec<ViewRef>,
    pub input_parameters: Vec<InputParameter>,
    pub srvs_bindings: Vec<BindingEntry>,
    pub uavs_bindings: Vec<BindingEntry>,
    pub acceleration_bindings: Vec<BindingEntry>,

    pub permutations: Vec<Permutation>,
    pub enums: Vec<PermutationSwitch>,
    pub options: Vec<PermutationSwitch>,
    pub set_start_index: u32,
    pub set_count: u32,

    pub unclassified: Vec<Unclassified>,
}
impl BindingModel {
    /// Classifies the root-level declarations of `tree`. `source` is the
    /// unprocessed text scanned for permutation switches and `path` names
    /// the generated classes.
    pub fn apply(
        tree: &mut SyntaxTree,
        source: &str,
        path: &Path,
        stage: Option<Stage>,
    ) -> Result<Self> {
        let stage = stage.or_else(|| Stage::from_path(path));
        let (shader_class, pipeline_configuration_class) = class_names(path);
        let mut out = BindingModel {
            stage,
            shader_class,
            pipeline_configuration_class,
            class_type: stage.map(Stage::class_type).unwrap_or_default(),
            ..Default::default()
        };

        for (order, id) in tree.root_level_declarations().into_iter().enumerate() {
            out.add_declaration(tree, id, order);
        }

        let switches = permute::discover(source);
        out.permutations = permute::permute(&switches)
            .with_context(|| format!("failed to permute {}", path.display()))?;
        for switch in switches.0 {
            match switch {
                PermutationSwitch::Option { .. } => out.options.push(switch),
                PermutationSwitch::EnumFamily { .. } => out.enums.push(switch),
            }
        }
        out.set_count = out.count_sets();
        debug!(
            class = %out.shader_class,
            descriptors = out.descriptor_count,
            permutations = out.permutations.len(),
            unclassified = out.unclassified.len(),
            "built binding model"
        );
        Ok(out)
    }

    fn add_declaration(&mut self, tree: &SyntaxTree, id: NodeId, order: usize) {
        let node = &tree[id];
        if node.kind == NodeKind::Function {
            for &param in &node.parameters {
                let param = &tree[param];
                self.input_parameters.push(InputParameter {
                    name: param.name.clone(),
                    semantic: param.semantic.clone(),
                    ty: param.ty.clone(),
                });
            }
            return;
        }

        let Some(category) = classify(node) else {
            debug!(
                name = %node.name,
                ty = %node.ty,
                line = node.line,
                "declaration binds no resource"
            );
            self.unclassified.push(Unclassified {
                name: node.name.clone(),
                ty: node.ty.clone(),
                line: node.line,
            });
            return;
        };

        let cpp = cpp_type(&node.ty);
        let base = node.base_type();
        let format = if category == Category::AccelerationStructures {
            engine_format(None)
        } else {
            engine_format(node.format.as_deref())
        };
        let mut entry = ResourceEntry {
            cpp_type: cpp.clone(),
            name: node.name.clone(),
            identifier: node.name.clone(),
            line: node.line,
            order,
            register: node.register.clone(),
            dimension: node.dimension.clone(),
            format: format.to_owned(),
            structured: STRUCTURED_TYPES.contains(&base),
            cube: CUBE_TYPES.contains(&base),
            ..Default::default()
        };
        match category {
            Category::Samplers => entry.cpp_type = None,
            Category::Constants => {
                entry.cpp_type = None;
                entry.identifier = lower_first(&node.name);
                entry.identifiers = node
                    .children
                    .iter()
                    .map(|&member| MemberEntry {
                        cpp_type: cpp_type(&tree[member].ty),
                        name: tree[member].name.clone(),
                    })
                    .collect();
            }
            _ => {}
        }
        let index = self.resources.push(category, entry);

        if category != Category::Samplers {
            self.descriptor_count += 1;
        }
        let view = ViewRef {
            cpp_type: cpp.clone(),
            identifier: node.name.clone(),
            dimension: None,
        };
        if category.is_srv() {
            self.srvs.push(view.clone());
        } else if category.is_uav() {
            self.uavs.push(view.clone());
        }
        if (category.is_srv() || category.is_uav()) && !category.is_buffer() {
            self.dimensions.push(ViewRef {
                dimension: node.dimension.clone(),
                ..view
            });
        }

        if let Some(tag) = category.binding_tag() {
            let binding = BindingEntry {
                tag: tag.to_owned(),
                index,
                dimension: if category.is_buffer() || category == Category::AccelerationStructures {
                    "Unknown".to_owned()
                } else {
                    node.dimension.clone().unwrap_or_else(|| "Unknown".to_owned())
                },
                format: format.to_owned(),
            };
            if category.is_srv() {
                self.srvs_bindings.push(binding);
            } else if category.is_uav() {
                self.uavs_bindings.push(binding);
            } else {
                self.acceleration_bindings.push(binding);
            }
        }
    }

    pub fn resources(&self, category: Category) -> &[ResourceEntry] {
        self.resources.get(category)
    }

    /// Descriptor sets the stage occupies: one per bindless resource plus
    /// one shared by everything else, if anything else is bound.
    pub fn count_sets(&self) -> u32 {
        let mut bindless = 0;
        let mut other = false;
        for &category in Category::ALL {
            let count = self.resources(category).len() as u32;
            if category.is_bindless() {
                bindless += count;
            } else if count > 0 {
                other = true;
            }
        }
        bindless + u32::from(other)
    }
}

/// Assigns consecutive descriptor-set ranges to the stage models of one
/// pipeline, in pipeline stage order.
pub fn assign_set_ranges(models: &mut [BindingModel]) {
    let mut order = (0..models.len()).collect::<Vec<_>>();
    order.sort_by_key(|&i| {
        models[i]
            .stage
            .and_then(|s| Stage::PIPELINE_ORDER.iter().position(|&x| x == s))
            .unwrap_or(usize::MAX)
    });
    let mut next = 0;
    for i in order {
        let model = &mut models[i];
        model.set_count = model.count_sets();
        model.set_start_index = next;
        next += model.set_count;
    }
}
