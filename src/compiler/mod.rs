use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod alloc;
pub mod cache;
pub mod common;
pub mod lex;
pub mod model;
pub mod pp;
pub mod syn;

pub use alloc::{Allocation, BindingScheme};
pub use model::{BindingModel, Stage};

use lex::Lexer;
use pp::Preprocessor;
use syn::{Parser, SyntaxTree};

/// Inputs shared by every stage: where to look for includes and which
/// names start out defined.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Backend {
    Dx12,
    Vulkan,
}
impl Backend {
    pub fn scheme(self, stage: Option<Stage>) -> BindingScheme {
        match self {
            Backend::Dx12 => BindingScheme::Flat,
            Backend::Vulkan => BindingScheme::Table {
                set: stage.map_or(0, Stage::descriptor_set),
                bindless_space_base: alloc::DEFAULT_BINDLESS_SPACE_BASE,
            },
        }
    }
}

/// Source with registers spliced in, and the layout that goes with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundShader {
    pub source: String,
    pub model: BindingModel,
    pub allocation: Allocation,
    pub root_signature: String,
}

pub struct Compiler {
    options: CompileOptions,
}
impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn preprocess(&self, path: &Path) -> Result<String> {
        let text = Preprocessor::open(path, &self.options)?.run()?;
        debug!(path = %path.display(), chars = text.len(), "preprocessed");
        Ok(text)
    }

    /// Preprocessed text of `path` and its syntax tree. Line numbers in the
    /// tree refer to the returned text.
    pub fn parse(&self, path: &Path) -> Result<(String, SyntaxTree)> {
        let text = self.preprocess(path)?;
        let tree = Parser::apply(Lexer::from_text(&text))
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok((text, tree))
    }

    /// Like [`Compiler::parse`] but reuses `<path>.syntax_support` while the
    /// source is unchanged. Only used without extra defines, since those
    /// change the tree.
    pub fn parse_cached(&self, path: &Path) -> Result<SyntaxTree> {
        let cacheable = self.options.defines.is_empty();
        if cacheable {
            if let Some(tree) = cache::load(path)? {
                return Ok(tree);
            }
        }
        let (_, tree) = self.parse(path)?;
        if cacheable {
            cache::store(path, &tree)?;
        }
        Ok(tree)
    }

    pub fn binding_model(&self, path: &Path, stage: Option<Stage>) -> Result<BindingModel> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut tree = self.parse_cached(path)?;
        BindingModel::apply(&mut tree, &raw, path, stage)
    }

    pub fn bind(&self, path: &Path, backend: Backend, stage: Option<Stage>) -> Result<BoundShader> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let (text, mut tree) = self.parse(path)?;
        let model = BindingModel::apply(&mut tree, &raw, path, stage)?;
        let allocation = Allocation::apply(&model, backend.scheme(model.stage));
        let source = alloc::splice::apply(&text, &allocation)
            .with_context(|| format!("failed to annotate {}", path.display()))?;
        let root_signature = alloc::rootsig::emit(&allocation, model.stage);
        info!(
            path = %path.display(),
            ?backend,
            bindings = allocation.bindings.len(),
            "bound shader"
        );
        Ok(BoundShader {
            source,
            model,
            allocation,
            root_signature,
        })
    }
}
