use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::compiler::cache;
use crate::compiler::common::{PreprocessError, SyntaxError};
use crate::compiler::model::Category;
use crate::compiler::{Backend, CompileOptions, Compiler, Stage};

const COMMON: &str = "SamplerState linearClamp;";
const BLUR: &str = r#"#include "common.hlsli"
Texture2D<float4> source;
RWTexture2D<float4> target;
#if defined(OPTION_WIDE)
Buffer<float> weights;
#endif
#ifdef ENUM_MODE_FAST
#endif
[numthreads(8, 8, 1)]
void main(uint3 id : SV_DispatchThreadID)
{
    target[id.xy] = source.Load(int3(id.xy, 0));
}
"#;

struct Fixture {
    _dir: TempDir,
    shader: PathBuf,
    include_dir: PathBuf,
}
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let include_dir = dir.path().join("inc");
    fs::create_dir(&include_dir).unwrap();
    fs::write(include_dir.join("common.hlsli"), COMMON).unwrap();
    let shader = dir.path().join("Blur.cs.hlsl");
    fs::write(&shader, BLUR).unwrap();
    Fixture {
        _dir: dir,
        shader,
        include_dir,
    }
}
fn compiler(fixture: &Fixture, defines: &[&str]) -> Compiler {
    Compiler::new(CompileOptions {
        include_dirs: vec![fixture.include_dir.clone()],
        defines: defines.iter().map(|x| x.to_string()).collect(),
    })
}
fn names(model: &crate::compiler::BindingModel, category: Category) -> Vec<String> {
    model
        .resources(category)
        .iter()
        .map(|x| x.name.clone())
        .collect()
}

#[test]
fn test_preprocess_expands_include() {
    let f = fixture();
    let text = compiler(&f, &[]).preprocess(&f.shader).unwrap();
    assert!(text.starts_with("SamplerState linearClamp;"));
    assert!(!text.contains("weights"));
    assert!(!text.contains("#if"));

    let text = compiler(&f, &["OPTION_WIDE"]).preprocess(&f.shader).unwrap();
    assert!(text.contains("Buffer<float> weights;"));
}

#[test]
fn test_binding_model() {
    let f = fixture();
    let model = compiler(&f, &[]).binding_model(&f.shader, None).unwrap();
    assert_eq!(model.stage, Some(Stage::Compute));
    assert_eq!(model.shader_class, "BlurCS");
    assert_eq!(names(&model, Category::Samplers), vec!["linearClamp"]);
    assert_eq!(names(&model, Category::TextureSrvs), vec!["source"]);
    assert_eq!(names(&model, Category::TextureUavs), vec!["target"]);
    assert!(names(&model, Category::BufferSrvs).is_empty());
    assert_eq!(model.input_parameters.len(), 1);
    assert_eq!(
        model.input_parameters[0].semantic.as_deref(),
        Some("SV_DispatchThreadID")
    );

    let defines = model
        .permutations
        .iter()
        .map(|p| (p.id.as_str(), p.active_defines.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        defines,
        vec![
            ("000", vec!["ENUM_MODE_FAST".to_owned()]),
            ("001", vec!["OPTION_WIDE".to_owned(), "ENUM_MODE_FAST".to_owned()]),
        ]
    );
}

#[test]
fn test_defines_change_the_model() {
    let f = fixture();
    let model = compiler(&f, &["OPTION_WIDE"])
        .binding_model(&f.shader, None)
        .unwrap();
    assert_eq!(names(&model, Category::BufferSrvs), vec!["weights"]);
    // Trees built under extra defines are never cached.
    assert!(!cache::cache_path(&f.shader).exists());
}

#[test]
fn test_model_uses_syntax_cache() {
    let f = fixture();
    let compiler = compiler(&f, &[]);
    let first = compiler.binding_model(&f.shader, None).unwrap();
    assert!(cache::cache_path(&f.shader).exists());
    let cached = cache::load(&f.shader).unwrap();
    assert!(cached.is_some());
    let second = compiler.binding_model(&f.shader, None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_bind_dx12() {
    let f = fixture();
    let bound = compiler(&f, &[])
        .bind(&f.shader, Backend::Dx12, None)
        .unwrap();
    assert!(bound
        .source
        .starts_with("SamplerState linearClamp : register(s0);\n"));
    assert!(bound
        .source
        .contains("Texture2D<float4> source : register(t0);\n"));
    assert!(bound
        .source
        .contains("RWTexture2D<float4> target : register(u0);\n"));
    assert!(!bound.source.contains("vk::binding"));

    let expect = r#"#define main "RootFlags( ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT )", " \
              "DescriptorTable(Sampler(s0, numDescriptors = 1))", " \
              "DescriptorTable(SRV(t0, numDescriptors = 1, flags = DESCRIPTORS_VOLATILE), visibility=SHADER_VISIBILITY_ALL)", " \
              "DescriptorTable(UAV(u0, numDescriptors = 1, flags = DESCRIPTORS_VOLATILE), visibility=SHADER_VISIBILITY_ALL)""#;
    assert_eq!(bound.root_signature, expect);
}

#[test]
fn test_bind_vulkan() {
    let f = fixture();
    let bound = compiler(&f, &[])
        .bind(&f.shader, Backend::Vulkan, Some(Stage::Pixel))
        .unwrap();
    let set = Stage::Pixel.descriptor_set();
    assert_eq!(set, 1);
    let expect = "[[vk::binding(0,1)]]
SamplerState linearClamp : register(s0, space1);
[[vk::binding(1,1)]]
Texture2D<float4> source : register(t0, space1);
[[vk::binding(2,1)]]
RWTexture2D<float4> target : register(u0, space1);
";
    assert!(bound.source.starts_with(expect), "{}", bound.source);
    assert!(bound
        .root_signature
        .contains("visibility=SHADER_VISIBILITY_PIXEL"));
}

#[test]
fn test_missing_include() {
    let f = fixture();
    let compiler = Compiler::new(CompileOptions::default());
    let err = compiler.preprocess(&f.shader).unwrap_err();
    match err.downcast_ref::<PreprocessError>() {
        Some(PreprocessError::IncludeNotFound { path, .. }) => assert_eq!(path, "common.hlsli"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_syntax_error_surfaces() {
    let dir = tempfile::tempdir().unwrap();
    let shader = dir.path().join("Bad.ps.hlsl");
    fs::write(&shader, "\ncbuffer C float x;\n").unwrap();
    let err = Compiler::new(CompileOptions::default())
        .bind(&shader, Backend::Dx12, None)
        .unwrap_err();
    let syntax = err.downcast_ref::<SyntaxError>().unwrap();
    assert_eq!(syntax.line, 2);
    assert_eq!(syntax.token, "float");
}

#[test]
fn test_missing_source() {
    let err = Compiler::new(CompileOptions::default())
        .preprocess(Path::new("does/not/exist.hlsl"))
        .unwrap_err();
    assert!(err.to_string().contains("does/not/exist.hlsl"));
}
