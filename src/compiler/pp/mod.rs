//! Conditional compilation, include expansion and comment stripping.
//!
//! The preprocessor is a character [`Source`]: it pulls raw text from a stack
//! of open files and yields only what survives the directives, so the lexer
//! can sit directly on top of it.
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use super::common::{CharSource, HistoryBuffer, PreprocessError, Source};
use super::CompileOptions;

mod cond;
pub use cond::CondExpr;


pub const MAX_CONDITIONAL_DEPTH: usize = 256;
pub const MAX_INCLUDE_DEPTH: usize = 64;
const FILE_HISTORY: usize = 16;

// Longest spelling first so `#if` never shadows `#ifdef`/`#ifndef`.
const DIRECTIVES: &[&str] = &[
    "#include", "#define", "#ifndef", "#ifdef", "#undef", "#endif", "#else", "#if",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLabel {
    Defined,
    NotDefined,
    Expression,
    Comment,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    label: FrameLabel,
    is_true: bool,
}

struct OpenFile {
    path: PathBuf,
    chars: HistoryBuffer<CharSource>,
    line: u32,
}
impl OpenFile {
    fn new(path: PathBuf, text: &str) -> Self {
        Self {
            path,
            chars: HistoryBuffer::with_capacity(CharSource::from_text(text), FILE_HISTORY),
            line: 1,
        }
    }
    fn next(&mut self) -> Result<Option<char>> {
        let c = self.chars.try_next()?;
        if c == Some('\n') {
            self.line += 1;
        }
        Ok(c)
    }
    fn matches(&mut self, word: &str) -> Result<bool> {
        let mut read = 0;
        for expected in word.chars() {
            match self.chars.try_next()? {
                Some(c) => {
                    read += 1;
                    if c != expected {
                        self.chars.rewind(read)?;
                        return Ok(false);
                    }
                }
                None => {
                    self.chars.rewind(read)?;
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
    // Leaves the newline in the stream so line structure survives.
    fn read_line(&mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(c) = self.chars.try_next()? {
            if c == '\n' {
                self.chars.rewind(1)?;
                break;
            }
            out.push(c);
        }
        Ok(out)
    }
}

enum Step {
    Emit(char),
    Continue,
    Exhausted,
}

pub struct Preprocessor {
    include_dirs: Vec<PathBuf>,
    defines: BTreeSet<String>,
    frames: Vec<Frame>,
    files: Vec<OpenFile>,
    seen: HashSet<PathBuf>,
    included: Vec<PathBuf>,
    pending: VecDeque<char>,
}
impl Preprocessor {
    pub fn open(path: &Path, options: &CompileOptions) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self::from_text(path, &text, options))
    }
    /// Preprocesses `text` as if it were the contents of `path`; the path
    /// anchors relative includes.
    pub fn from_text(path: &Path, text: &str, options: &CompileOptions) -> Self {
        let mut seen = HashSet::new();
        seen.insert(canonical(path));
        Self {
            include_dirs: options.include_dirs.clone(),
            defines: options.defines.iter().cloned().collect(),
            frames: Vec::new(),
            files: vec![OpenFile::new(path.to_owned(), text)],
            seen,
            included: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// Drains the whole stream into a string.
    pub fn run(mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(c) = self.pull()? {
            out.push(c);
        }
        Ok(out)
    }

    pub fn defines(&self) -> &BTreeSet<String> {
        &self.defines
    }
    /// Files expanded so far, in first-inclusion order.
    pub fn included(&self) -> &[PathBuf] {
        &self.included
    }

    fn is_active(&self) -> bool {
        self.frames.iter().all(|f| f.is_true)
    }
    fn in_comment(&self) -> bool {
        matches!(self.frames.last(), Some(f) if f.label == FrameLabel::Comment)
    }

    fn push_frame(&mut self, label: FrameLabel, is_true: bool) -> Result<()> {
        if self.frames.len() >= MAX_CONDITIONAL_DEPTH {
            return Err(PreprocessError::NestingTooDeep {
                what: "conditional",
                limit: MAX_CONDITIONAL_DEPTH,
            }
            .into());
        }
        self.frames.push(Frame { label, is_true });
        Ok(())
    }

    fn malformed(&self, directive: &str, reason: &str) -> anyhow::Error {
        let (file, line) = match self.files.last() {
            Some(f) => (f.path.clone(), f.line),
            None => (PathBuf::new(), 0),
        };
        PreprocessError::MalformedDirective {
            directive: directive.to_owned(),
            file,
            line,
            reason: reason.to_owned(),
        }
        .into()
    }

    fn top(&mut self) -> &mut OpenFile {
        let i = self.files.len() - 1;
        &mut self.files[i]
    }

    fn step(&mut self) -> Result<Step> {
        if self.in_comment() {
            if self.top().matches("*/")? {
                self.frames.pop();
                return Ok(Step::Continue);
            }
            return Ok(match self.top().next()? {
                Some(_) => Step::Continue,
                None => Step::Exhausted,
            });
        }

        for directive in DIRECTIVES {
            if self.top().matches(directive)? {
                self.directive(directive)?;
                return Ok(Step::Continue);
            }
        }
        if self.top().matches("/*")? {
            self.push_frame(FrameLabel::Comment, false)?;
            return Ok(Step::Continue);
        }
        if self.top().matches("//")? {
            self.top().read_line()?;
            return Ok(Step::Continue);
        }

        let active = self.is_active();
        Ok(match self.top().next()? {
            Some(c) if active => Step::Emit(c),
            Some(_) => Step::Continue,
            None => Step::Exhausted,
        })
    }

    fn directive(&mut self, directive: &str) -> Result<()> {
        let active = self.is_active();
        match directive {
            "#define" | "#undef" | "#include" if !active => {
                self.top().read_line()?;
            }
            "#define" => {
                let rest = self.top().read_line()?;
                let rest = rest.trim();
                let name = first_word(rest)
                    .ok_or_else(|| self.malformed(directive, "missing macro name"))?;
                trace!(name, "define");
                self.defines.insert(name.to_owned());
                self.pending.extend(format!("#define {}", rest).chars());
            }
            "#undef" => {
                let rest = self.top().read_line()?;
                let name = first_word(&rest)
                    .ok_or_else(|| self.malformed(directive, "missing macro name"))?;
                trace!(name, "undef");
                self.defines.remove(name);
            }
            "#include" => {
                let rest = self.top().read_line()?;
                let target = rest
                    .trim()
                    .trim_matches(|c| matches!(c, '"' | '<' | '>'))
                    .trim();
                if target.is_empty() {
                    return Err(self.malformed(directive, "missing include path"));
                }
                self.include(target)?;
            }
            "#ifdef" | "#ifndef" => {
                let rest = self.top().read_line()?;
                let name = first_word(&rest)
                    .ok_or_else(|| self.malformed(directive, "missing macro name"))?;
                let (label, is_true) = if directive == "#ifdef" {
                    (FrameLabel::Defined, self.defines.contains(name))
                } else {
                    // Never tests membership; an `#ifndef` block is only
                    // reachable through its `#else`.
                    (FrameLabel::NotDefined, false)
                };
                self.push_frame(label, is_true)?;
            }
            "#if" => {
                let rest = self.top().read_line()?;
                let is_true = if active {
                    let expr = CondExpr::parse(&rest)
                        .map_err(|e| self.malformed(directive, &e.to_string()))?;
                    expr.eval(&self.defines)
                } else {
                    false
                };
                self.push_frame(FrameLabel::Expression, is_true)?;
            }
            "#else" => {
                if self.frames.is_empty() {
                    return Err(self.malformed(directive, "no open conditional"));
                }
                if let Some(frame) = self.frames.last_mut() {
                    frame.is_true = !frame.is_true;
                }
            }
            "#endif" => {
                if self.frames.pop().is_none() {
                    return Err(self.malformed(directive, "no open conditional"));
                }
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    fn include(&mut self, target: &str) -> Result<()> {
        let from = self.top().path.clone();
        let path = self
            .locate(target, &from)
            .ok_or_else(|| PreprocessError::IncludeNotFound {
                path: target.to_owned(),
                from: from.clone(),
            })?;
        let key = canonical(&path);
        if !self.seen.insert(key) {
            trace!(path = %path.display(), "skipping already included file");
            return Ok(());
        }
        if self.files.len() >= MAX_INCLUDE_DEPTH {
            return Err(PreprocessError::NestingTooDeep {
                what: "include",
                limit: MAX_INCLUDE_DEPTH,
            }
            .into());
        }
        debug!(path = %path.display(), "including");
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read include {}", path.display()))?;
        self.included.push(path.clone());
        self.files.push(OpenFile::new(path, &text));
        Ok(())
    }

    fn locate(&self, target: &str, from: &Path) -> Option<PathBuf> {
        let current_dir = from.parent().unwrap_or(Path::new(""));
        let candidates = self
            .include_dirs
            .iter()
            .map(|dir| dir.join(target))
            .chain(std::iter::once(current_dir.join(target)))
            .chain(std::iter::once(PathBuf::from(target)))
            .chain(
                self.included
                    .iter()
                    .filter_map(|p| p.parent())
                    .map(|dir| dir.join(target)),
            );
        for candidate in candidates {
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}
impl Source for Preprocessor {
    type Item = char;
    fn pull(&mut self) -> Result<Option<char>> {
        loop {
            if let Some(c) = self.pending.pop_front() {
                return Ok(Some(c));
            }
            if self.files.is_empty() {
                return Ok(None);
            }
            match self.step()? {
                Step::Emit(c) => return Ok(Some(c)),
                Step::Continue => {}
                Step::Exhausted => {
                    if let Some(file) = self.files.pop() {
                        trace!(path = %file.path.display(), "closing");
                    }
                }
            }
        }
    }
}

fn first_word(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_owned())
}
