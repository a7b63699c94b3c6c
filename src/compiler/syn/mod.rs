//! Declaration-level parser.
//!
//! Only global declarations, structure bodies and the signature of the entry
//! point are understood. Function bodies and initializer expressions are
//! skipped as balanced token runs. Nodes live in an arena owned by
//! [`SyntaxTree`] and refer to each other by [`NodeId`].
use std::collections::BTreeSet;
use std::ops::Index;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::common::{HistoryBuffer, Source, SyntaxError};
use super::lex::{tables, Token, TokenKind};


const TOKEN_HISTORY: usize = 4000;
/// Upper bound on tokens skipped inside one function body or brace
/// initializer.
pub const MAX_SKIP: usize = 100_000;
const MAX_TEMPLATE_TOKENS: usize = 8;
pub const MAX_SCOPE_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Declaration,
    Definition,
    Function,
    ScopeEnter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    pub kind: NodeKind,
    pub line: u32,
    pub register: Option<String>,
    pub children: Vec<NodeId>,
    pub parameters: Vec<NodeId>,
    pub semantic: Option<String>,
    pub qualifiers: BTreeSet<String>,
    pub element_count: u32,
    pub initializer_value: Option<String>,
    pub dimension: Option<String>,
    pub format: Option<String>,
}
impl SyntaxNode {
    pub fn new(kind: NodeKind, ty: impl Into<String>, line: u32) -> Self {
        Self {
            ty: ty.into(),
            name: String::new(),
            kind,
            line,
            register: None,
            children: Vec::new(),
            parameters: Vec::new(),
            semantic: None,
            qualifiers: BTreeSet::new(),
            element_count: 1,
            initializer_value: None,
            dimension: None,
            format: None,
        }
    }
    pub fn is_bindless(&self) -> bool {
        self.ty.ends_with("Bindless")
    }
    /// Type name without template argument or bindless marker, e.g.
    /// `Texture2D<float4>Bindless` gives `Texture2D`.
    pub fn base_type(&self) -> &str {
        let ty = self.ty.strip_suffix("Bindless").unwrap_or(&self.ty);
        ty.split('<').next().unwrap_or(ty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
    root: NodeId,
    known_structures: Vec<String>,
    entry_flattened: bool,
}
impl SyntaxTree {
    fn new() -> Self {
        Self {
            nodes: vec![SyntaxNode::new(NodeKind::ScopeEnter, "", 0)],
            root: NodeId(0),
            known_structures: Vec::new(),
            entry_flattened: false,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }
    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.0]
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
    pub fn known_structures(&self) -> &[String] {
        &self.known_structures
    }
    pub fn is_known_structure(&self, name: &str) -> bool {
        self.known_structures.iter().any(|x| x == name)
    }

    /// Root-scope structure definition called `name`.
    pub fn find_struct(&self, name: &str) -> Option<NodeId> {
        self.node(self.root).children.iter().copied().find(|&id| {
            let node = self.node(id);
            node.kind == NodeKind::Definition && node.name == name
        })
    }
    pub fn entry_point(&self) -> Option<NodeId> {
        self.node(self.root).children.iter().copied().find(|&id| {
            let node = self.node(id);
            node.kind == NodeKind::Function && node.name == "main"
        })
    }

    fn push(&mut self, node: SyntaxNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }
    fn node_mut(&mut self, id: NodeId) -> &mut SyntaxNode {
        &mut self.nodes[id.0]
    }

    /// Rewrites the parameters of `main` so that only system-typed inputs
    /// remain, structure-typed parameters being replaced by the members of
    /// their root definition. Parameters of any other type are dropped.
    /// Applying it again is a no-op.
    pub fn flatten_entry_point(&mut self) {
        if self.entry_flattened {
            return;
        }
        self.entry_flattened = true;
        let Some(entry) = self.entry_point() else {
            return;
        };
        let mut flattened = Vec::new();
        for &param in &self.node(entry).parameters {
            let ty = &self.node(param).ty;
            if tables::is_complete_system_type(ty) {
                flattened.push(param);
            } else if self.is_known_structure(ty) {
                if let Some(def) = self.find_struct(ty) {
                    flattened.extend(self.node(def).children.iter().copied());
                }
            }
        }
        self.node_mut(entry).parameters = flattened;
    }

    /// Every declaration directly under the root, plus the entry point with
    /// its parameter list flattened, in source order.
    pub fn root_level_declarations(&mut self) -> Vec<NodeId> {
        self.flatten_entry_point();
        self.node(self.root)
            .children
            .iter()
            .copied()
            .filter(|&id| {
                let node = self.node(id);
                node.kind == NodeKind::Declaration
                    || (node.kind == NodeKind::Function && node.name == "main")
            })
            .collect()
    }
}
impl Index<NodeId> for SyntaxTree {
    type Output = SyntaxNode;
    fn index(&self, id: NodeId) -> &SyntaxNode {
        self.node(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Children,
    Parameters,
}

fn dimension_of(ty: &str) -> Option<&'static str> {
    let out = match ty {
        "Texture1D" | "RWTexture1D" => "Texture1D",
        "Texture1DArray" | "RWTexture1DArray" => "Texture1DArray",
        "Texture2D" | "Texture2DMS" | "RWTexture2D" => "Texture2D",
        "Texture2DArray" | "Texture2DMSArray" | "RWTexture2DArray" => "Texture2DArray",
        "Texture3D" | "RWTexture3D" => "Texture3D",
        "TextureCube" => "TextureCube",
        "TextureCubeArray" => "TextureCubeArray",
        "ConstantBuffer" => "ConstantBuffer",
        _ => return None,
    };
    Some(out)
}

fn is_sampler_type(ty: &str) -> bool {
    matches!(ty, "sampler" | "SamplerState" | "SamplerComparisonState")
}

pub struct Parser<S: Source<Item = Token>> {
    tokens: HistoryBuffer<S>,
    tree: SyntaxTree,
    line: u32,
    depth: usize,
}
impl<S: Source<Item = Token>> Parser<S> {
    pub fn apply(source: S) -> Result<SyntaxTree> {
        let mut parser = Parser {
            tokens: HistoryBuffer::with_capacity(source, TOKEN_HISTORY),
            tree: SyntaxTree::new(),
            line: 1,
            depth: 0,
        };
        let root = parser.tree.root();
        parser.parse_scope(root, Slot::Children)?;
        debug!(
            nodes = parser.tree.len(),
            structures = parser.tree.known_structures.len(),
            "parsed syntax tree"
        );
        Ok(parser.tree)
    }

    fn error(&self, token: &Token, message: &str) -> anyhow::Error {
        SyntaxError::new(token.line, &token.value, message).into()
    }

    fn bump(&mut self) -> Result<Token> {
        match self.tokens.try_next()? {
            Some(token) => {
                self.line = token.line;
                Ok(token)
            }
            None => Err(SyntaxError::new(self.line, "eof", "Unexpected end of tokens").into()),
        }
    }
    fn unbump(&mut self) -> Result<()> {
        self.tokens.rewind(1)
    }
    fn eat(&mut self, value: &str) -> Result<bool> {
        let token = self.bump()?;
        if token.is(value) {
            Ok(true)
        } else {
            self.unbump()?;
            Ok(false)
        }
    }
    fn expect(&mut self, value: &str, message: &str) -> Result<Token> {
        let token = self.bump()?;
        if !token.is(value) {
            return Err(self.error(&token, message));
        }
        Ok(token)
    }

    fn add(&mut self, parent: NodeId, slot: Slot, node: SyntaxNode) -> NodeId {
        let id = self.tree.push(node);
        let parent = self.tree.node_mut(parent);
        match slot {
            Slot::Children => parent.children.push(id),
            Slot::Parameters => parent.parameters.push(id),
        }
        id
    }

    fn parse_scope(&mut self, scope: NodeId, slot: Slot) -> Result<()> {
        if self.depth >= MAX_SCOPE_DEPTH {
            let opener = self.tree.node(scope).ty.clone();
            return Err(SyntaxError::new(self.line, &opener, "Scopes nested too deeply").into());
        }
        self.depth += 1;
        let out = self.parse_scope_body(scope, slot);
        self.depth -= 1;
        out
    }

    fn parse_scope_body(&mut self, scope: NodeId, slot: Slot) -> Result<()> {
        let is_root = scope == self.tree.root();
        let mut qualifiers = BTreeSet::new();
        loop {
            let token = self.bump()?;
            match token.kind {
                TokenKind::Eof if is_root => return Ok(()),
                TokenKind::Eof => return Err(self.error(&token, "Unexpected end of tokens")),
                TokenKind::Qualifier => {
                    qualifiers.insert(token.value);
                    continue;
                }
                _ => {}
            }

            let value = token.value.as_str();
            if is_sampler_type(value) {
                self.parse_sampler(scope, slot, &token, std::mem::take(&mut qualifiers))?;
            } else if value == "cbuffer" || value == "tbuffer" {
                self.parse_constant_buffer(scope, slot, &token)?;
            } else if value == "struct" {
                self.parse_struct(scope, slot, &token)?;
            } else if self.tree.is_known_structure(value) || tables::is_complete_system_type(value)
            {
                let qualifiers = std::mem::take(&mut qualifiers);
                if !self.try_parse_function(scope, slot, &token)? {
                    self.parse_declaration(scope, slot, &token, qualifiers)?;
                }
            } else if tables::is_templated_system_type(value) {
                self.parse_resource(scope, slot, &token, std::mem::take(&mut qualifiers))?;
            } else if value == "left_parentheses" || value == "left_brace" {
                let name = if value == "left_brace" {
                    "brace_scope"
                } else {
                    "parentheses_scope"
                };
                let mut node = SyntaxNode::new(NodeKind::ScopeEnter, value, token.line);
                node.name = name.to_owned();
                let id = self.add(scope, slot, node);
                self.parse_scope(id, Slot::Children)?;
            } else if value == "right_brace" || value == "right_parentheses" {
                if is_root {
                    debug!(line = token.line, token = value, "ignoring unbalanced scope closer");
                    continue;
                }
                if value == "right_brace" {
                    self.eat("semicolon")?;
                }
                return Ok(());
            }
        }
    }

    // `register ( slot [, space] )`, the `register` keyword already consumed.
    fn parse_register_args(&mut self) -> Result<String> {
        const INVALID: &str = "Invalid register description";
        self.expect("left_parentheses", INVALID)?;
        let slot = self.bump()?;
        if slot.kind != TokenKind::Identifier {
            return Err(self.error(&slot, INVALID));
        }
        let mut register = slot.value;
        if self.eat("comma_operator")? {
            let space = self.bump()?;
            if space.kind != TokenKind::Identifier {
                return Err(self.error(&space, INVALID));
            }
            register.push_str(", ");
            register.push_str(&space.value);
        }
        self.expect("right_parentheses", INVALID)?;
        Ok(register)
    }

    // Everything after a declarator name: `: register(..)` or `: SEMANTIC`,
    // array brackets, an initializer and a `;` or `,` terminator. Anything
    // else is left in the stream for the enclosing scope.
    fn parse_declarator_tail(&mut self, id: NodeId, bindless_arrays: bool) -> Result<()> {
        let mut seen_colon = false;
        let mut seen_bracket = false;
        loop {
            let token = self.bump()?;
            if token.is("colon") && !seen_colon {
                seen_colon = true;
                let next = self.bump()?;
                if next.is("register") {
                    let register = self.parse_register_args()?;
                    self.tree.node_mut(id).register = Some(register);
                } else if matches!(next.kind, TokenKind::Identifier | TokenKind::SystemType) {
                    self.tree.node_mut(id).semantic = Some(next.value);
                } else {
                    return Err(self.error(&next, "Expected semantic or register"));
                }
            } else if token.is("left_bracket") && !seen_bracket {
                seen_bracket = true;
                let size = self.bump()?;
                if size.is("right_bracket") {
                    let node = self.tree.node_mut(id);
                    node.element_count = 0;
                    if bindless_arrays {
                        node.ty.push_str("Bindless");
                    }
                } else {
                    match size.value.parse() {
                        Ok(count) => self.tree.node_mut(id).element_count = count,
                        Err(_) => debug!(
                            line = size.line,
                            size = %size.value,
                            "array size is not a literal, counting one element"
                        ),
                    }
                    self.expect("right_bracket", "Parsing array right bracket")?;
                }
            } else {
                self.unbump()?;
                break;
            }
        }

        if self.eat("assignment")? {
            self.parse_initializer(id)?;
        }
        let token = self.bump()?;
        if !(token.is("semicolon") || token.is("comma_operator")) {
            self.unbump()?;
        }
        Ok(())
    }

    fn parse_initializer(&mut self, id: NodeId) -> Result<()> {
        let token = self.bump()?;
        if token.kind == TokenKind::Number {
            self.tree.node_mut(id).initializer_value = Some(token.value);
            return Ok(());
        }
        if token.is("left_brace") {
            return self.skip_braces(&token);
        }
        // Opaque expression: stop before the terminator at nesting depth 0.
        self.unbump()?;
        let mut depth = 0usize;
        for _ in 0..MAX_SKIP {
            let token = self.bump()?;
            match token.value.as_str() {
                "left_parentheses" | "left_bracket" | "left_brace" => depth += 1,
                "right_parentheses" | "right_bracket" | "right_brace" if depth > 0 => depth -= 1,
                "semicolon" | "comma_operator" | "right_parentheses" | "right_brace"
                    if depth == 0 =>
                {
                    return self.unbump();
                }
                "eof" => return self.unbump(),
                _ => {}
            }
        }
        Err(SyntaxError::new(self.line, "", "Failed to parse away initializer").into())
    }

    // Skips to the brace matching an already consumed `{`.
    fn skip_braces(&mut self, open: &Token) -> Result<()> {
        let mut depth = 1usize;
        for _ in 0..MAX_SKIP {
            let token = self.bump()?;
            if token.is_eof() {
                return Err(self.error(&token, "Unexpected end of tokens in body"));
            }
            if token.is("left_brace") {
                depth += 1;
            } else if token.is("right_brace") {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(self.error(open, "Failed to parse away function body"))
    }

    fn parse_sampler(
        &mut self,
        scope: NodeId,
        slot: Slot,
        token: &Token,
        qualifiers: BTreeSet<String>,
    ) -> Result<()> {
        let mut node = SyntaxNode::new(NodeKind::Declaration, token.value.clone(), token.line);
        node.qualifiers = qualifiers;
        let name = self.bump()?;
        if name.kind == TokenKind::Identifier {
            node.name = name.value;
        } else {
            self.unbump()?;
        }
        let id = self.add(scope, slot, node);
        self.parse_declarator_tail(id, false)
    }

    fn parse_constant_buffer(&mut self, scope: NodeId, slot: Slot, token: &Token) -> Result<()> {
        let mut node = SyntaxNode::new(NodeKind::Declaration, token.value.clone(), token.line);
        let name = self.bump()?;
        if name.kind != TokenKind::Identifier {
            return Err(self.error(&name, "Expected constant buffer name"));
        }
        node.name = name.value;
        let id = self.add(scope, slot, node);

        let mut next = self.bump()?;
        if next.is("colon") {
            self.expect("register", "Invalid register description")?;
            let register = self.parse_register_args()?;
            self.tree.node_mut(id).register = Some(register);
            next = self.bump()?;
        }
        if !next.is("left_brace") {
            return Err(self.error(
                &next,
                &format!("Tried to declare {} but did not find body", token.value),
            ));
        }
        self.parse_scope(id, Slot::Children)
    }

    fn parse_struct(&mut self, scope: NodeId, slot: Slot, token: &Token) -> Result<()> {
        let name = self.bump()?;
        if !matches!(name.kind, TokenKind::Identifier) {
            return Err(self.error(&name, "Expected structure name"));
        }
        if !self.tree.is_known_structure(&name.value) {
            self.tree.known_structures.push(name.value.clone());
        }
        let mut node = SyntaxNode::new(NodeKind::Definition, "struct", token.line);
        node.name = name.value;
        let id = self.add(scope, slot, node);

        let next = self.bump()?;
        if !next.is("left_brace") {
            return Err(self.error(&next, "Tried to declare struct but did not find body"));
        }
        self.parse_scope(id, Slot::Children)
    }

    /// `TYPE NAME (` commits to a function; anything else is rolled back so
    /// the type token can be read as a declaration.
    fn try_parse_function(&mut self, scope: NodeId, slot: Slot, token: &Token) -> Result<bool> {
        let checkpoint = self.tokens.checkpoint();
        let name = self.bump()?;
        let is_function = name.kind == TokenKind::Identifier && self.bump()?.is("left_parentheses");
        if !is_function {
            self.tokens.rollback(checkpoint).map_err(|e| e.into_anyhow())?;
            return Ok(false);
        }

        let mut node = SyntaxNode::new(NodeKind::Function, token.value.clone(), token.line);
        node.name = name.value;
        let id = self.add(scope, slot, node);
        self.parse_scope(id, Slot::Parameters)?;

        let mut next = self.bump()?;
        if next.is("colon") {
            let semantic = self.bump()?;
            self.tree.node_mut(id).semantic = Some(semantic.value);
            let mut skipped = 0;
            loop {
                next = self.bump()?;
                if next.is("left_brace") || next.is("semicolon") || next.is_eof() {
                    break;
                }
                skipped += 1;
                if skipped > MAX_SKIP {
                    return Err(self.error(&next, "Failed to find function body"));
                }
            }
        }
        if next.is("semicolon") {
            return Ok(true);
        }
        if !next.is("left_brace") {
            return Err(self.error(&next, "Expected function body"));
        }
        self.skip_braces(&next)?;
        Ok(true)
    }

    fn parse_declaration(
        &mut self,
        scope: NodeId,
        slot: Slot,
        token: &Token,
        qualifiers: BTreeSet<String>,
    ) -> Result<()> {
        let mut node = SyntaxNode::new(NodeKind::Declaration, token.value.clone(), token.line);
        node.qualifiers = qualifiers;
        let name = self.bump()?;
        if name.kind == TokenKind::Identifier {
            node.name = name.value;
        } else {
            self.unbump()?;
        }
        let id = self.add(scope, slot, node);
        self.parse_declarator_tail(id, false)
    }

    // Consumes a template argument list after `<`, returning its first
    // token as the element format.
    fn parse_template_args(&mut self, open: &Token) -> Result<String> {
        let format = self.bump()?;
        for _ in 0..MAX_TEMPLATE_TOKENS {
            let token = self.bump()?;
            if token.is("greater") || token.is("bitwise_right_shift") {
                return Ok(format.value);
            }
            if token.is_eof() {
                break;
            }
        }
        Err(self.error(open, "Broken template type"))
    }

    fn parse_resource(
        &mut self,
        scope: NodeId,
        slot: Slot,
        token: &Token,
        qualifiers: BTreeSet<String>,
    ) -> Result<()> {
        let mut node = SyntaxNode::new(NodeKind::Declaration, token.value.clone(), token.line);
        node.qualifiers = qualifiers;
        node.dimension = dimension_of(&token.value).map(str::to_owned);

        let mut next = self.bump()?;
        if next.is("lesser") {
            let format = self.parse_template_args(&next)?;
            node.ty = format!("{}<{}>", token.value, format);
            node.format = Some(format);
            next = self.bump()?;
        }
        if next.kind == TokenKind::Identifier {
            node.name = next.value;
        } else {
            self.unbump()?;
        }
        let id = self.add(scope, slot, node);
        self.parse_declarator_tail(id, true)
    }
}
