//! Built-in compilers available to `kiln.toml` projects.
//!
//! `copy` is a single-file compiler that prefixes every line with a fixed
//! string. `include` is a multi-file compiler that inlines
//! `@import "path";` lines; files whose name starts with `_` are partials
//! and only ever compiled through an import.

use std::collections::BTreeMap;

use crate::arch::Arch;
use crate::artifact::Artifact;
use crate::compiler::{Compiler, ImportResolver, MultiFileCompiler, SingleFileCompiler};
use crate::error::CompileError;
use crate::input::InputFile;

/// Plugin kinds understood by [`instantiate`].
pub const KINDS: &[&str] = &["copy", "include"];

/// Creates a built-in compiler from its kind and options. Errors describe
/// the bad kind or option and become plugin initialization failures.
pub fn instantiate(
    kind: &str,
    options: &BTreeMap<String, toml::Value>,
    architecture_independent: bool,
) -> Result<Compiler, String> {
    match kind {
        "copy" => {
            let mut compiler = CopyCompiler {
                prefix: String::new(),
                emit_asset: false,
                architecture_independent,
            };
            for (name, value) in options {
                match name.as_str() {
                    "prefix" => compiler.prefix = string_option(name, value)?,
                    "emit_asset" => compiler.emit_asset = bool_option(name, value)?,
                    other => return Err(format!("unknown option `{other}` for plugin kind `copy`")),
                }
            }
            Ok(Compiler::Single(Box::new(compiler)))
        }
        "include" => {
            if let Some(name) = options.keys().next() {
                return Err(format!("unknown option `{name}` for plugin kind `include`"));
            }
            Ok(Compiler::Multi(Box::new(IncludeCompiler {
                architecture_independent,
            })))
        }
        other => Err(format!(
            "unknown plugin kind `{other}` (expected one of: {})",
            KINDS.join(", ")
        )),
    }
}

fn string_option(name: &str, value: &toml::Value) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("option `{name}` must be a string"))
}

fn bool_option(name: &str, value: &toml::Value) -> Result<bool, String> {
    value
        .as_bool()
        .ok_or_else(|| format!("option `{name}` must be a boolean"))
}

fn text_of(file: &InputFile) -> Result<&str, CompileError> {
    file.text()
        .ok_or_else(|| CompileError::new(file.path.clone(), "file is not valid UTF-8"))
}

/// Prefixes every line of a file.
pub struct CopyCompiler {
    prefix: String,
    emit_asset: bool,
    architecture_independent: bool,
}

impl SingleFileCompiler for CopyCompiler {
    fn compile(&self, file: &InputFile, _arch: &Arch) -> Result<Artifact, CompileError> {
        let text = text_of(file)?;
        let mut code = String::with_capacity(text.len());
        for line in text.lines() {
            code.push_str(&self.prefix);
            code.push_str(line);
            code.push('\n');
        }
        let artifact = Artifact::code(code);
        Ok(if self.emit_asset {
            artifact.with_asset(file.path.clone(), text)
        } else {
            artifact
        })
    }

    fn architecture_independent(&self) -> bool {
        self.architecture_independent
    }
}

/// Inlines `@import "path";` lines.
pub struct IncludeCompiler {
    architecture_independent: bool,
}

impl IncludeCompiler {
    fn expand(
        &self,
        file: &InputFile,
        imports: &mut ImportResolver<'_>,
        stack: &mut Vec<String>,
        out: &mut String,
    ) -> Result<(), CompileError> {
        let text = text_of(file)?;
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx as u32 + 1;
            match parse_import(line) {
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
                Some(Err(())) => {
                    return Err(CompileError::new(
                        file.path.clone(),
                        format!("malformed import: {}", line.trim()),
                    )
                    .at_line(line_no));
                }
                Some(Ok(target)) => {
                    let path = resolve_import(file.dir(), target);
                    if stack.contains(&path) {
                        stack.push(path);
                        return Err(CompileError::new(
                            file.path.clone(),
                            format!("import cycle: {}", stack.join(" -> ")),
                        )
                        .at_line(line_no));
                    }
                    let dep = imports.read(&path).ok_or_else(|| {
                        CompileError::new(file.path.clone(), format!("Unknown import: {target}"))
                            .at_line(line_no)
                    })?;
                    stack.push(path);
                    self.expand(dep, imports, stack, out)?;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

impl MultiFileCompiler for IncludeCompiler {
    fn is_root(&self, file: &InputFile) -> bool {
        !file.file_name().starts_with('_')
    }

    fn compile(
        &self,
        root: &InputFile,
        imports: &mut ImportResolver<'_>,
        _arch: &Arch,
    ) -> Result<Artifact, CompileError> {
        let mut out = String::new();
        let mut stack = vec![root.path.clone()];
        self.expand(root, imports, &mut stack, &mut out)?;
        Ok(Artifact::code(out))
    }

    fn architecture_independent(&self) -> bool {
        self.architecture_independent
    }
}

/// `None` for ordinary lines, `Some(Err(()))` for an `@import` without a
/// quoted path.
fn parse_import(line: &str) -> Option<Result<&str, ()>> {
    let rest = line.trim().strip_prefix("@import")?;
    let quoted = rest.trim().trim_end_matches(';').trim_end();
    Some(
        quoted
            .strip_prefix('"')
            .and_then(|q| q.strip_suffix('"'))
            .filter(|path| !path.is_empty())
            .ok_or(()),
    )
}

/// Resolves an import target against the importing file's directory and
/// normalizes `.` and `..` segments.
fn resolve_import(dir: &str, target: &str) -> String {
    let joined = if target.starts_with('/') {
        target.to_string()
    } else {
        format!("{dir}{target}")
    };
    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}
