//! # Module Loader
//!
//! Resolves module identifiers to files and classifies what was loaded.
//!
//! Only plain WASI command modules are supported: a core module exporting
//! `_start` with no parameters and no results. Everything else loads into a
//! [`ModuleShape::Unsupported`] variant so the bridge can reject it by name
//! instead of guessing at a partial contract.

use std::path::Component as PathComponent;
use std::path::Path;
use std::path::PathBuf;

use wasmtime::Engine;
use wasmtime::ExternType;
use wasmtime::FuncType;
use wasmtime::Module;
use wasmtime::component::Component;

/// Export every supported module must provide.
pub const ENTRY_ROUTINE: &str = "_start";

/// Export that marks a library-style (reactor) module.
pub const REACTOR_INIT: &str = "_initialize";

/// Recognized module file extensions, in resolution order.
pub const EXTENSIONS: [&str; 2] = ["wasm", "wat"];

#[derive(Debug)]
pub enum Error {
    NotFound(String),
    Load(PathBuf, String),
    List(PathBuf, std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "Module \"{}\" was not found", id),
            Self::Load(path, e) => write!(f, "Module \"{}\" could not be loaded: {}", path.display(), e),
            Self::List(path, e) => write!(f, "Cannot list modules in {}: {}", path.display(), e),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Contracts the bridge refuses to run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unsupported {
    /// Component-model binary.
    Component,
    /// Exports `_initialize` but no `_start`.
    Reactor,
    /// Exports no entry routine at all.
    NoEntry,
    /// `_start` exists but is not `() -> ()`.
    EntrySignature(String),
}

impl std::fmt::Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Component => write!(f, "Component modules are not supported"),
            Self::Reactor => write!(f, "Action modules are not supported"),
            Self::NoEntry => write!(f, "Module does not export an entry routine"),
            Self::EntrySignature(ty) => write!(f, "Entry routine has an unsupported signature: {}", ty),
        }
    }
}

/// What a loaded file turned out to be.
pub enum ModuleShape {
    Command(Module),
    Unsupported(Unsupported),
}

/// The top-level identity a module is started under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    program: String,
    path: PathBuf,
}

impl Identity {
    pub fn for_path(path: &Path) -> Self {
        let program = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            program,
            path: path.to_path_buf(),
        }
    }

    /// argv[0] as the module will see it.
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct LoadedModule {
    pub identity: Identity,
    pub shape: ModuleShape,
}

/// Resolves identifiers under a builtin directory, or takes paths as given.
#[derive(Clone, Debug)]
pub struct Loader {
    modules_dir: PathBuf,
}

impl Loader {
    pub fn new(modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            modules_dir: modules_dir.into(),
        }
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// Maps an identifier to a module file.
    ///
    /// Existing paths with a module extension (or absolute paths) are used
    /// directly. A relative id that names its extension is looked up as
    /// `<modules_dir>/<id>`. Otherwise `<modules_dir>/<id>.wasm`, then
    /// `.wat`, are tried.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        let direct = Path::new(id);
        if id.is_empty() || direct.components().any(|c| matches!(c, PathComponent::ParentDir)) {
            return Err(Error::NotFound(id.to_string()));
        }

        if (direct.is_absolute() || has_module_extension(direct)) && direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        if direct.is_absolute() {
            return Err(Error::NotFound(id.to_string()));
        }

        if has_module_extension(direct) {
            let candidate = self.modules_dir.join(direct);
            return match candidate.is_file() {
                true => Ok(candidate),
                false => Err(Error::NotFound(id.to_string())),
            };
        }

        EXTENSIONS
            .iter()
            .map(|ext| self.modules_dir.join(format!("{}.{}", id, ext)))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Compiles the file and classifies its contract.
    pub fn load(&self, engine: &Engine, path: &Path) -> Result<LoadedModule> {
        let bytes = std::fs::read(path).map_err(|e| Error::Load(path.to_path_buf(), e.to_string()))?;
        let shape = match Module::new(engine, &bytes) {
            Ok(module) => classify(module),
            Err(module_err) => match Component::new(engine, &bytes) {
                Ok(_) => ModuleShape::Unsupported(Unsupported::Component),
                Err(_) => return Err(Error::Load(path.to_path_buf(), module_err.to_string())),
            },
        };

        Ok(LoadedModule {
            identity: Identity::for_path(path),
            shape,
        })
    }

    /// Every identifier that currently resolves under the modules directory.
    pub fn available(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        collect(&self.modules_dir, &self.modules_dir, &mut out)?;
        out.sort();
        out.dedup();
        Ok(out)
    }
}

fn has_module_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}

fn classify(module: Module) -> ModuleShape {
    match module.get_export(ENTRY_ROUTINE) {
        Some(ExternType::Func(ty)) if ty.params().len() == 0 && ty.results().len() == 0 => {
            ModuleShape::Command(module)
        }
        Some(ExternType::Func(ty)) => ModuleShape::Unsupported(Unsupported::EntrySignature(signature(&ty))),
        Some(_) => ModuleShape::Unsupported(Unsupported::EntrySignature("not a function".to_string())),
        None if module.get_export(REACTOR_INIT).is_some() => ModuleShape::Unsupported(Unsupported::Reactor),
        None => ModuleShape::Unsupported(Unsupported::NoEntry),
    }
}

fn signature(ty: &FuncType) -> String {
    let params: Vec<String> = ty.params().map(|p| format!("{:?}", p)).collect();
    let results: Vec<String> = ty.results().map(|r| format!("{:?}", r)).collect();
    format!("({}) -> ({})", params.join(", "), results.join(", "))
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::List(dir.to_path_buf(), e))?;
    for entry in entries {
        let path = entry.map_err(|e| Error::List(dir.to_path_buf(), e))?.path();
        if path.is_dir() {
            collect(root, &path, out)?;
        } else if has_module_extension(&path) {
            if let Ok(rel) = path.with_extension("").strip_prefix(root) {
                out.push(rel.to_string_lossy().into_owned());
            }
        }
    }
    Ok(())
}
