use std::path::Path;

use pretty_assertions::assert_eq;

use super::permute::{discover, permute, title_case, AssignmentKind, MAX_OPTIONS};
use super::*;
use crate::compiler::lex::Lexer;
use crate::compiler::syn::Parser;

fn model(src: &str, path: &str) -> BindingModel {
    let mut tree = Parser::apply(Lexer::from_text(src)).unwrap();
    BindingModel::apply(&mut tree, src, Path::new(path), None).unwrap()
}

const RESOURCES: &str = r#"
SamplerState linearSampler;
cbuffer Frame { float4x4 viewProj; float time; };
Texture2D<float4> albedo;
StructuredBuffer<uint> indices;
RWTexture2D<float4> output;
Texture2D<float> textures[];
RaytracingAccelerationStructure scene;
ConstantBuffer<Params> params;
float4 tint;
"#;

#[test]
fn test_classification() {
    let model = model(RESOURCES, "Lighting.ps.hlsl");
    assert_eq!(model.stage, Some(Stage::Pixel));
    assert_eq!(model.shader_class, "LightingPS");
    assert_eq!(model.pipeline_configuration_class, "Lighting");
    assert_eq!(model.class_type, "PixelShader");

    let names = |c: Category| {
        model
            .resources(c)
            .iter()
            .map(|x| x.name.as_str())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(Category::Samplers), vec!["linearSampler"]);
    assert_eq!(names(Category::Constants), vec!["Frame"]);
    assert_eq!(names(Category::TextureSrvs), vec!["albedo"]);
    assert_eq!(names(Category::BufferSrvs), vec!["indices"]);
    assert_eq!(names(Category::TextureUavs), vec!["output"]);
    assert_eq!(names(Category::BindlessTextureSrvs), vec!["textures"]);
    assert_eq!(names(Category::AccelerationStructures), vec!["scene"]);
    assert_eq!(names(Category::RootConstants), vec!["params"]);
    assert!(model.resources(Category::BufferUavs).is_empty());

    assert!(model.resources.has_samplers);
    assert!(model.resources.has_constants);
    assert!(model.resources.has_bindless_texture_srvs);
    assert!(!model.resources.has_buffer_uavs);
    // Everything but the sampler counts.
    assert_eq!(model.descriptor_count, 7);

    assert_eq!(model.unclassified.len(), 1);
    assert_eq!(model.unclassified[0].name, "tint");
    assert_eq!(model.unclassified[0].line, 10);
}

#[test]
fn test_entry_details() {
    let model = model(RESOURCES, "Lighting.ps.hlsl");
    let frame = &model.resources(Category::Constants)[0];
    assert_eq!(frame.identifier, "frame");
    assert_eq!(frame.cpp_type, None);
    let members = frame
        .identifiers
        .iter()
        .map(|x| (x.cpp_type.as_deref(), x.name.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        members,
        vec![(Some("Float4x4"), "viewProj"), (Some("Float"), "time")]
    );

    let albedo = &model.resources(Category::TextureSrvs)[0];
    assert_eq!(albedo.cpp_type.as_deref(), Some("TextureSRV"));
    assert_eq!(albedo.format, "Format::R32G32B32A32_FLOAT");
    assert_eq!(albedo.dimension.as_deref(), Some("Texture2D"));

    let indices = &model.resources(Category::BufferSrvs)[0];
    assert_eq!(indices.cpp_type.as_deref(), Some("BufferSRV"));
    assert!(indices.structured);
    assert_eq!(indices.format, "Format::R32_UINT");

    let textures = &model.resources(Category::BindlessTextureSrvs)[0];
    assert_eq!(textures.cpp_type.as_deref(), Some("BindlessTextureSRV"));
    assert_eq!(textures.index, 0);

    let params = &model.resources(Category::RootConstants)[0];
    assert_eq!(params.cpp_type.as_deref(), Some("RootConstant"));

    let srv_tags = model
        .srvs_bindings
        .iter()
        .map(|x| (x.tag.as_str(), x.index, x.dimension.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        srv_tags,
        vec![
            ("SRVTexture", 0, "Texture2D"),
            ("SRVBuffer", 0, "Unknown"),
            ("BindlessSRVTexture", 0, "Texture2D"),
        ]
    );
    assert_eq!(model.uavs_bindings[0].tag, "UAVTexture");
    assert_eq!(
        model.acceleration_bindings[0].tag,
        "RaytracingAccelerationStructure"
    );
    assert_eq!(model.srvs.len(), 3);
    assert_eq!(model.uavs.len(), 1);
    // Buffers carry no dimension entry.
    assert_eq!(model.dimensions.len(), 3);
}

#[test]
fn test_indexes_follow_declaration_order() {
    let src = "Texture2D a; Texture2D b; Buffer<float> c; Texture2D d;";
    let model = model(src, "X.cs.hlsl");
    let indexes = model
        .resources(Category::TextureSrvs)
        .iter()
        .map(|x| (x.name.as_str(), x.index))
        .collect::<Vec<_>>();
    assert_eq!(indexes, vec![("a", 0), ("b", 1), ("d", 2)]);
    assert_eq!(model.resources(Category::BufferSrvs)[0].index, 0);
    assert_eq!(model.descriptor_count, 4);
}

#[test]
fn test_input_parameters() {
    let src = r#"
struct VSInput { float3 position : POSITION; float2 uv : TEXCOORD0; };
float4 main(VSInput input, uint id : SV_VertexID) : SV_Position
{
    return float4(input.position, 1);
}
"#;
    let model = model(src, "Mesh.vs.hlsl");
    let params = model
        .input_parameters
        .iter()
        .map(|x| (x.name.as_str(), x.semantic.as_deref(), x.ty.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        params,
        vec![
            ("position", Some("POSITION"), "float3"),
            ("uv", Some("TEXCOORD0"), "float2"),
            ("id", Some("SV_VertexID"), "uint"),
        ]
    );
    assert_eq!(model.descriptor_count, 0);
}

#[test]
fn test_cpp_type() {
    assert_eq!(cpp_type("RWBuffer<uint>").as_deref(), Some("BufferUAV"));
    assert_eq!(
        cpp_type("RWTexture2D<float4>Bindless").as_deref(),
        Some("BindlessTextureUAV")
    );
    assert_eq!(cpp_type("ConstantBuffer<P>").as_deref(), Some("RootConstant"));
    assert_eq!(cpp_type("uint2").as_deref(), Some("Uint2"));
    assert_eq!(cpp_type("Light"), None);
}

#[test]
fn test_engine_format() {
    assert_eq!(engine_format(Some("float3")), "Format::R32G32B32_FLOAT");
    assert_eq!(engine_format(Some("uint4")), "Format::R32G32B32A32_UINT");
    assert_eq!(engine_format(Some("half4")), "Format::UNKNOWN");
    assert_eq!(engine_format(None), "Format::UNKNOWN");
}

#[test]
fn test_stage_mapping() {
    let stage = |x: &str| Stage::from_path(Path::new(x));
    assert_eq!(stage("a/Blur.cs.hlsl"), Some(Stage::Compute));
    assert_eq!(stage("Blur.vs.hlsl"), Some(Stage::Vertex));
    assert_eq!(stage("Shadow.ah.hlsl"), Some(Stage::AnyHit));
    assert_eq!(stage("Cull.amp.hlsl"), Some(Stage::Amplification));
    assert_eq!(stage("Cull.mesh.hlsl"), Some(Stage::Mesh));
    assert_eq!(stage("Common.hlsl"), None);
    assert_eq!(stage("Bumps.hlsl"), None);
    assert_eq!(stage("Terms.hlsl"), None);
    assert_eq!(stage("a/bps.hlsl"), None);

    assert_eq!(Stage::Domain.vulkan_name(), "tesc");
    assert_eq!(Stage::Hull.vulkan_name(), "tese");
    assert_eq!(Stage::Domain.descriptor_set(), 3);
    assert_eq!(Stage::Mesh.descriptor_set(), 11);
    assert_eq!(Stage::Miss.visibility(), None);
    assert!(Stage::ClosestHit.is_raytracing());
    assert_eq!(
        Stage::Pixel.visibility(),
        Some("SHADER_VISIBILITY_PIXEL")
    );
    assert_eq!(
        class_names(Path::new("dir/Blur.cs.hlsl")),
        ("BlurCS".to_owned(), "Blur".to_owned())
    );
}

#[test]
fn test_set_ranges() {
    let vs = model("Texture2D a; Texture2D<float4> b[];", "P.vs.hlsl");
    let ps = model("Texture2D<float4> c[]; Buffer<uint> d[];", "P.ps.hlsl");
    let cs = model("float x;", "P.cs.hlsl");
    assert_eq!(vs.set_count, 2);
    assert_eq!(ps.set_count, 2);
    assert_eq!(cs.set_count, 0);

    // Pixel comes after vertex regardless of slice order.
    let mut models = vec![ps, vs];
    assign_set_ranges(&mut models);
    assert_eq!(models[1].set_start_index, 0);
    assert_eq!(models[0].set_start_index, 2);
}

#[test]
fn test_title_case() {
    assert_eq!(title_case("mode2d"), "Mode2D");
    assert_eq!(title_case("BLUR"), "Blur");
    assert_eq!(title_case("x_y"), "X_Y");
}

#[test]
fn test_discover() {
    let src = r#"
#if defined(OPTION_USE_SHADOWS) && defined(ENUM_QUALITY_LOW)
#elif defined(ENUM_QUALITY_HIGH)
  #ifdef OPTION_USE_SHADOWS
  #endif
#endif
// OPTION_NOT_A_SWITCH
#ifdef ENUM_QUALITY_VERY_HIGH
#endif
"#;
    let switches = discover(src);
    let options = switches.options().collect::<Vec<_>>();
    assert_eq!(options, vec![("useShadows", "OPTION_USE_SHADOWS")]);
    let families = switches.enum_families().collect::<Vec<_>>();
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].0, "Quality");
    let values = families[0]
        .1
        .iter()
        .map(|x| (x.value.as_str(), x.flag.as_str()))
        .collect::<Vec<_>>();
    // `#elif` lines are not scanned.
    assert_eq!(
        values,
        vec![("Low", "ENUM_QUALITY_LOW"), ("VeryHigh", "ENUM_QUALITY_VERY_HIGH")]
    );
}

#[test]
fn test_twelve_permutations() {
    let src = r#"
#ifdef OPTION_FOG
#endif
#if defined(OPTION_SHADOWS)
#endif
#if defined(ENUM_MODE_A) || defined(ENUM_MODE_B) || defined(ENUM_MODE_C)
#endif
"#;
    let perms = permute(&discover(src)).unwrap();
    assert_eq!(perms.len(), 12);
    let ids = perms.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
    let expected = (0..12).map(|i| format!("{:03}", i)).collect::<Vec<_>>();
    assert_eq!(ids, expected);

    assert_eq!(perms[0].active_defines, vec!["ENUM_MODE_A"]);
    assert_eq!(perms[2].active_defines, vec!["ENUM_MODE_C"]);
    assert_eq!(perms[3].active_defines, vec!["OPTION_FOG", "ENUM_MODE_A"]);
    assert_eq!(perms[6].active_defines, vec!["OPTION_SHADOWS", "ENUM_MODE_A"]);
    assert_eq!(
        perms[11].active_defines,
        vec!["OPTION_FOG", "OPTION_SHADOWS", "ENUM_MODE_C"]
    );

    for p in &perms {
        let enums = p
            .assignments
            .iter()
            .filter(|a| a.kind == AssignmentKind::Enum)
            .count();
        assert_eq!(enums, 1);
        let on = p.assignments.iter().filter(|a| a.value == "true").count();
        assert_eq!(p.active_defines.len(), on + 1);
    }
    let mode = &perms[1].assignments[2];
    assert_eq!(mode.variable_name, "mode");
    assert_eq!(mode.value, "Mode::B");
}

#[test]
fn test_no_switches_no_permutations() {
    assert!(permute(&discover("#if defined(FOO)\n#endif\n"))
        .unwrap()
        .is_empty());
    let model = model("Texture2D a;", "A.ps.hlsl");
    assert!(model.permutations.is_empty());
    assert!(model.options.is_empty());
}

#[test]
fn test_too_many_options() {
    let src = (0..=MAX_OPTIONS)
        .map(|i| format!("#ifdef OPTION_FLAG{}\n#endif\n", i))
        .collect::<String>();
    assert_eq!(discover(&src).options().count(), MAX_OPTIONS + 1);
    let err = permute(&discover(&src)).unwrap_err();
    assert!(err.to_string().contains("exceed the limit"), "{}", err);

    let mut tree = Parser::apply(Lexer::from_text("")).unwrap();
    assert!(BindingModel::apply(&mut tree, &src, Path::new("Wide.cs.hlsl"), None).is_err());
}

#[test]
fn test_model_json_shape() {
    let model = model(RESOURCES, "Lighting.ps.hlsl");
    let json = serde_json::to_value(&model).unwrap();
    assert_eq!(json["has_texture_srvs"], serde_json::json!(true));
    assert_eq!(json["texture_srvs"][0]["type"], serde_json::json!("TextureSRV"));
    assert_eq!(json["stage"], serde_json::json!("Pixel"));
    for category in Category::ALL {
        assert!(json.get(category.field_name()).is_some());
    }
}
