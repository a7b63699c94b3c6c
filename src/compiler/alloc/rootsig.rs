//! Root-signature string emitted next to the bound source.
//!
//! The result is a `#define` whose value is a line-continued string; the
//! native compiler picks it up as the root signature of `main`.
use super::{Allocation, DescriptorTable, RegisterClass, TableSize};
use crate::compiler::model::{Category, Stage};

/// Order of clauses in the emitted string.
pub const CLAUSE_ORDER: [Category; 11] = [
    Category::Samplers,
    Category::TextureSrvs,
    Category::TextureUavs,
    Category::BufferSrvs,
    Category::BufferUavs,
    Category::AccelerationStructures,
    Category::BindlessTextureSrvs,
    Category::BindlessBufferSrvs,
    Category::BindlessTextureUavs,
    Category::BindlessBufferUavs,
    Category::Constants,
];
const LINE_CONTINUE: &str = ", \" \\\n              \"";

fn table_clause(table: &DescriptorTable, visibility: &str) -> String {
    let class = table.class;
    let mut range = format!("{}{}", class.letter(), table.first_slot);
    if let Some(space) = table.space {
        range.push_str(&format!(", space = {}", space));
    }
    match table.size {
        TableSize::Bounded(n) => range.push_str(&format!(", numDescriptors = {}", n)),
        TableSize::Unbounded => range.push_str(", numDescriptors = unbounded"),
    }
    match class {
        RegisterClass::Sampler => format!("DescriptorTable(Sampler({}))", range),
        RegisterClass::Cbv => format!("DescriptorTable(CBV({}){})", range, visibility),
        _ => format!(
            "DescriptorTable({}({}, flags = DESCRIPTORS_VOLATILE){})",
            class.range_name(),
            range,
            visibility
        ),
    }
}

pub fn emit(allocation: &Allocation, stage: Option<Stage>) -> String {
    let raytracing = stage.map_or(false, Stage::is_raytracing);
    let visibility = stage
        .and_then(Stage::visibility)
        .map(|x| format!(", visibility={}", x))
        .unwrap_or_default();

    let mut out = if raytracing {
        "#define main \"RootFlags( LOCAL_ROOT_SIGNATURE )".to_owned()
    } else {
        "#define main \"RootFlags( ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT )".to_owned()
    };
    for binding in allocation.bindings_of(Category::RootConstants) {
        out.push_str(LINE_CONTINUE);
        out.push_str(&format!("RootConstants(num32BitConstants=1, b{})", binding.slot));
    }
    for category in CLAUSE_ORDER {
        for table in allocation.tables_of(category) {
            out.push_str(LINE_CONTINUE);
            out.push_str(&table_clause(table, &visibility));
        }
    }
    out.push('"');
    out
}
