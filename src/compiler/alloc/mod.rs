//! Register and space allocation.
//!
//! Slots are drawn from four per-letter counters (`s`, `t`, `u`, `b`) in a
//! fixed category order, so the annotations spliced into the source and the
//! root-signature tables always describe the same layout. Bindless resources
//! each get a space of their own at slot zero.
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::model::{BindingModel, Category};

pub mod rootsig;
pub mod splice;


/// Category order in which registers are drawn.
pub const ALLOCATION_ORDER: [Category; 12] = [
    Category::Samplers,
    Category::RootConstants,
    Category::Constants,
    Category::TextureSrvs,
    Category::BufferSrvs,
    Category::AccelerationStructures,
    Category::TextureUavs,
    Category::BufferUavs,
    Category::BindlessTextureSrvs,
    Category::BindlessBufferSrvs,
    Category::BindlessTextureUavs,
    Category::BindlessBufferUavs,
];
/// First space handed to bindless resources in the flat model.
pub const FLAT_BINDLESS_SPACE_BASE: u32 = 1;
pub const DEFAULT_BINDLESS_SPACE_BASE: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum BindingScheme {
    /// Plain `register(t#)` slots; bindless resources in spaces `1..`.
    Flat,
    /// Every register tagged with the stage's descriptor set, plus a
    /// `[[vk::binding]]` attribute per declaration.
    Table { set: u32, bindless_space_base: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterClass {
    Sampler,
    Srv,
    Uav,
    Cbv,
}
impl RegisterClass {
    pub fn of(category: Category) -> Self {
        match category {
            Category::Samplers => RegisterClass::Sampler,
            Category::Constants | Category::RootConstants => RegisterClass::Cbv,
            c if c.is_uav() => RegisterClass::Uav,
            _ => RegisterClass::Srv,
        }
    }
    pub fn letter(self) -> char {
        match self {
            RegisterClass::Sampler => 's',
            RegisterClass::Srv => 't',
            RegisterClass::Uav => 'u',
            RegisterClass::Cbv => 'b',
        }
    }
    /// Range type keyword in root-signature descriptor tables.
    pub fn range_name(self) -> &'static str {
        match self {
            RegisterClass::Sampler => "Sampler",
            RegisterClass::Srv => "SRV",
            RegisterClass::Uav => "UAV",
            RegisterClass::Cbv => "CBV",
        }
    }
    fn counter(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub category: Category,
    pub name: String,
    pub line: u32,
    /// Source order of the declaration.
    pub order: usize,
    pub class: RegisterClass,
    pub slot: u32,
    pub space: Option<u32>,
    /// Table-model binding index inside `space`.
    pub binding: Option<u32>,
    /// The source already names a register. Splicing overwrites it with
    /// `slot`, so tables never describe a layout the source contradicts.
    pub explicit: bool,
}
impl Binding {
    /// ` : register(t3)` or ` : register(t3, space1)`.
    pub fn annotation(&self) -> String {
        match self.space {
            Some(space) => format!(
                " : register({}{}, space{})",
                self.class.letter(),
                self.slot,
                space
            ),
            None => format!(" : register({}{})", self.class.letter(), self.slot),
        }
    }
    pub fn attribute(&self) -> Option<String> {
        let binding = self.binding?;
        Some(format!(
            "[[vk::binding({},{})]]",
            binding,
            self.space.unwrap_or_default()
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSize {
    Bounded(u32),
    Unbounded,
}

/// One descriptor-table range: a contiguous run of a category, or a single
/// bindless resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorTable {
    pub category: Category,
    pub class: RegisterClass,
    pub first_slot: u32,
    pub space: Option<u32>,
    pub size: TableSize,
    pub first_binding: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub scheme: BindingScheme,
    pub bindings: Vec<Binding>,
    pub tables: Vec<DescriptorTable>,
}
impl Allocation {
    pub fn apply(model: &BindingModel, scheme: BindingScheme) -> Self {
        let (shared_space, mut next_space) = match scheme {
            BindingScheme::Flat => (None, FLAT_BINDLESS_SPACE_BASE),
            BindingScheme::Table {
                set,
                bindless_space_base,
            } => (Some(set), bindless_space_base),
        };
        let mut counters = [0u32; 4];
        let mut next_binding = 0u32;
        let mut bindings = Vec::new();
        let mut tables = Vec::new();

        for category in ALLOCATION_ORDER {
            let entries = model.resources(category);
            if entries.is_empty() {
                continue;
            }
            let class = RegisterClass::of(category);

            if category.is_bindless() {
                for entry in entries {
                    let space = next_space;
                    next_space += 1;
                    let binding = shared_space.map(|_| 0);
                    trace!(name = %entry.name, space, "bindless resource gets its own space");
                    bindings.push(Binding {
                        category,
                        name: entry.name.clone(),
                        line: entry.line,
                        order: entry.order,
                        class,
                        slot: 0,
                        space: Some(space),
                        binding,
                        explicit: entry.register.is_some(),
                    });
                    tables.push(DescriptorTable {
                        category,
                        class,
                        first_slot: 0,
                        space: Some(space),
                        size: TableSize::Unbounded,
                        first_binding: binding,
                    });
                }
                continue;
            }

            let first_slot = counters[class.counter()];
            let first_binding = shared_space.map(|_| next_binding);
            for entry in entries {
                let slot = counters[class.counter()];
                counters[class.counter()] += 1;
                let binding = shared_space.map(|_| {
                    next_binding += 1;
                    next_binding - 1
                });
                bindings.push(Binding {
                    category,
                    name: entry.name.clone(),
                    line: entry.line,
                    order: entry.order,
                    class,
                    slot,
                    space: shared_space,
                    binding,
                    explicit: entry.register.is_some(),
                });
            }
            // Root constants are emitted as individual root parameters.
            if category != Category::RootConstants {
                tables.push(DescriptorTable {
                    category,
                    class,
                    first_slot,
                    space: shared_space,
                    size: TableSize::Bounded(entries.len() as u32),
                    first_binding,
                });
            }
        }

        debug!(
            bindings = bindings.len(),
            tables = tables.len(),
            s = counters[0],
            t = counters[1],
            u = counters[2],
            b = counters[3],
            "allocated registers"
        );
        Allocation {
            scheme,
            bindings,
            tables,
        }
    }

    pub fn bindings_of(&self, category: Category) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(move |x| x.category == category)
    }
    pub fn tables_of(&self, category: Category) -> impl Iterator<Item = &DescriptorTable> {
        self.tables.iter().filter(move |x| x.category == category)
    }
}
