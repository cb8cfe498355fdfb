// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Module and Operation Registry
//!
//! Resolves operation names (`list`, `md5`, `arc.gz`, ...) to operation
//! templates. Operations are grouped into modules; a dotted name selects
//! the module explicitly, a bare name selects the module of the same name.
//! Aliases (`unzip` -> `arc.unzip`) are single-hop and applied before
//! module resolution.
//!
//! Modules are loaded on first demand through a [`ModuleProvider`] and
//! cached for the process lifetime. The monolithic build uses a static
//! provider over the built-in module set; the `dynamic-modules` feature
//! adds a provider that loads shared libraries from a module directory.
//! Both paths go through the same ABI version probe: a module built
//! against another fcom version is rejected at load.
//!
//! Modules may also publish named filter factories. Those back
//! `FilterSpec::Name` resolution when a running filter asks the scheduler
//! to insert, say, `"pic.convert"` upstream of itself.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use fcom_domain::services::filter::Filter;
use fcom_domain::{Command, FcomError};

use super::pipeline::FilterResolver;
use super::RuntimeHandle;

/// Registry/module interface version. Bumped on any breaking change to
/// [`FcomModule`] or [`OperationTemplate`].
pub const ABI_VERSION: u32 = 1;

/// Constructs a registered filter by name.
pub type FilterFactory = fn() -> Box<dyn Filter>;

/// Builds the initial filter chain of an operation.
///
/// The builder parses the operation's own arguments, fills the command's
/// shared fields (paths, wildcards, output) and returns the initial chain.
/// Filters appended later at run time come from chain effects.
pub type ChainBuilder =
    fn(&RuntimeHandle, &mut Command, &[String]) -> Result<Vec<Box<dyn Filter>>, FcomError>;

/// Immutable description of one operation. Registered once; lookups of
/// the same name always return the same template identity.
#[derive(Debug)]
pub struct OperationTemplate {
    pub name: &'static str,
    /// Help text; backtick segments render highlighted on a terminal.
    pub help: &'static str,
    pub build: ChainBuilder,
}

/// One loadable module: a named group of operations and filter factories.
pub trait FcomModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Version probe, checked against [`ABI_VERSION`] before `init`.
    fn abi_version(&self) -> u32;

    /// One-time initialization hook, called after the version probe with
    /// the module's `mod_conf` block when the config file carries one.
    fn init(&self, _conf: Option<&toml::Table>) {}

    /// Looks up an operation owned by this module.
    fn provide(&self, op: &str) -> Option<&'static OperationTemplate>;

    /// Named filter factories this module publishes.
    fn filters(&self) -> Vec<(&'static str, FilterFactory)> {
        Vec::new()
    }

    /// Shutdown hook. Loaded modules are retained until process exit.
    fn destroy(&self) {}
}

/// Loads modules by name; the registry caches the result.
pub trait ModuleProvider: Send + Sync {
    fn load(&self, name: &str) -> Result<Arc<dyn FcomModule>, FcomError>;

    /// Module names known up front, for `fcom --help` listings. Dynamic
    /// providers may not know any.
    fn known_modules(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Single-hop alias table applied before module resolution.
const ALIASES: &[(&str, &str)] = &[
    ("gz", "arc.gz"),
    ("ungz", "arc.ungz"),
    ("xz", "arc.xz"),
    ("unxz", "arc.unxz"),
    ("zst", "arc.zst"),
    ("unzst", "arc.unzst"),
    ("zip", "arc.zip"),
    ("unzip", "arc.unzip"),
    ("un7z", "arc.un7z"),
    ("uniso", "arc.uniso"),
    ("ico", "arc.ico"),
    ("unico", "arc.unico"),
    ("pic", "pic.convert"),
];

/// Process-wide operation registry. Mutations happen only during module
/// load, guarded by the internal locks.
pub struct Registry {
    provider: Box<dyn ModuleProvider>,
    aliases: HashMap<&'static str, &'static str>,
    /// Per-module configuration blocks from the config file.
    mod_conf: HashMap<String, toml::Table>,
    modules: RwLock<HashMap<String, Arc<dyn FcomModule>>>,
    filters: RwLock<HashMap<String, FilterFactory>>,
}

impl Registry {
    pub fn new(provider: Box<dyn ModuleProvider>) -> Self {
        Self::with_mod_conf(provider, HashMap::new())
    }

    pub fn with_mod_conf(
        provider: Box<dyn ModuleProvider>,
        mod_conf: HashMap<String, toml::Table>,
    ) -> Self {
        Registry {
            provider,
            aliases: ALIASES.iter().copied().collect(),
            mod_conf,
            modules: RwLock::new(HashMap::new()),
            filters: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves an operation name to its template, loading the owning
    /// module on demand.
    pub fn resolve(&self, op_name: &str) -> Result<&'static OperationTemplate, FcomError> {
        let name = match self.aliases.get(op_name) {
            Some(target) => {
                tracing::debug!(alias = op_name, target, "alias");
                target
            }
            None => op_name,
        };

        let (module_name, op) = match name.split_once('.') {
            Some((m, o)) => (m, o),
            None => (name, name),
        };

        let module = self.module(module_name)?;
        module.provide(op).ok_or_else(|| {
            FcomError::NotFound(format!("{}: no registered operation '{}'", module_name, op))
        })
    }

    /// Returns the help text of an operation.
    pub fn help(&self, op_name: &str) -> Result<&'static str, FcomError> {
        Ok(self.resolve(op_name)?.help)
    }

    /// Preloads a module by name (the config `mod` key).
    pub fn preload(&self, name: &str) -> Result<(), FcomError> {
        self.module(name).map(|_| ())
    }

    /// Module names the provider knows up front.
    pub fn known_modules(&self) -> Vec<&'static str> {
        self.provider.known_modules()
    }

    fn module(&self, name: &str) -> Result<Arc<dyn FcomModule>, FcomError> {
        if let Some(m) = self.modules.read().get(name) {
            return Ok(Arc::clone(m));
        }

        let module = self.provider.load(name)?;
        if module.abi_version() != ABI_VERSION {
            return Err(FcomError::Config(format!(
                "module '{}' is built for another fcom version (abi {} != {})",
                name,
                module.abi_version(),
                ABI_VERSION
            )));
        }
        module.init(self.mod_conf.get(name));
        {
            let mut filters = self.filters.write();
            for (fname, factory) in module.filters() {
                filters.insert(fname.to_string(), factory);
            }
        }
        self.modules
            .write()
            .insert(name.to_string(), Arc::clone(&module));
        tracing::debug!(module = name, "initialized module");
        Ok(module)
    }
}

impl FilterResolver for Registry {
    fn create_filter(&self, name: &str) -> Result<Box<dyn Filter>, FcomError> {
        // Filters live in modules; make sure the owning module is loaded
        // before consulting the factory table.
        if let Some((module_name, _)) = name.split_once('.') {
            let _ = self.module(module_name);
        }
        let filters = self.filters.read();
        match filters.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(FcomError::NotFound(format!("no registered filter '{}'", name))),
        }
    }
}

/// Loads modules from shared libraries in a module directory. Each library
/// exports `fcom_module: fn() -> Box<dyn FcomModule>`; the ABI version
/// probe still runs in the registry.
#[cfg(feature = "dynamic-modules")]
pub mod dynamic {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    pub struct DynamicProvider {
        dir: PathBuf,
        // Libraries stay loaded for the process lifetime.
        libs: Mutex<Vec<libloading::Library>>,
    }

    impl DynamicProvider {
        pub fn new(dir: PathBuf) -> Self {
            DynamicProvider {
                dir,
                libs: Mutex::new(Vec::new()),
            }
        }
    }

    impl ModuleProvider for DynamicProvider {
        fn load(&self, name: &str) -> Result<Arc<dyn FcomModule>, FcomError> {
            let file = format!(
                "{}{}{}",
                std::env::consts::DLL_PREFIX,
                name,
                std::env::consts::DLL_SUFFIX
            );
            let path = self.dir.join(file);
            tracing::debug!(path = %path.display(), "loading module library");

            let lib = unsafe { libloading::Library::new(&path) }.map_err(|e| {
                FcomError::Config(format!("dl open: {}: {}", path.display(), e))
            })?;
            let module = unsafe {
                let ctor: libloading::Symbol<fn() -> Box<dyn FcomModule>> =
                    lib.get(b"fcom_module").map_err(|e| {
                        FcomError::Config(format!(
                            "dl addr 'fcom_module': {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                ctor()
            };
            self.libs.lock().push(lib);
            Ok(Arc::from(module))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcom_domain::services::filter::FilterStatus;

    struct NopFilter;
    impl Filter for NopFilter {
        fn name(&self) -> &str {
            "test.nop"
        }
        fn process(&mut self, _cmd: &mut Command) -> Result<FilterStatus, FcomError> {
            Ok(FilterStatus::Done)
        }
    }

    fn nop_build(
        _rt: &RuntimeHandle,
        _cmd: &mut Command,
        _args: &[String],
    ) -> Result<Vec<Box<dyn Filter>>, FcomError> {
        Ok(vec![Box::new(NopFilter)])
    }

    static TEST_OP: OperationTemplate = OperationTemplate {
        name: "gz",
        help: "test help",
        build: nop_build,
    };

    struct TestModule {
        abi: u32,
    }
    impl FcomModule for TestModule {
        fn name(&self) -> &'static str {
            "arc"
        }
        fn abi_version(&self) -> u32 {
            self.abi
        }
        fn provide(&self, op: &str) -> Option<&'static OperationTemplate> {
            if op == "gz" {
                Some(&TEST_OP)
            } else {
                None
            }
        }
        fn filters(&self) -> Vec<(&'static str, FilterFactory)> {
            vec![("arc.nop", || Box::new(NopFilter))]
        }
    }

    struct TestProvider {
        abi: u32,
    }
    impl ModuleProvider for TestProvider {
        fn load(&self, name: &str) -> Result<Arc<dyn FcomModule>, FcomError> {
            if name == "arc" {
                Ok(Arc::new(TestModule { abi: self.abi }))
            } else {
                Err(FcomError::NotFound(name.into()))
            }
        }
    }

    #[test]
    fn test_alias_resolves_in_one_hop() {
        let reg = Registry::new(Box::new(TestProvider { abi: ABI_VERSION }));
        let t = reg.resolve("gz").unwrap();
        assert_eq!(t.name, "gz");
    }

    #[test]
    fn test_lookup_identity_is_stable() {
        let reg = Registry::new(Box::new(TestProvider { abi: ABI_VERSION }));
        let a = reg.resolve("arc.gz").unwrap() as *const OperationTemplate;
        let b = reg.resolve("arc.gz").unwrap() as *const OperationTemplate;
        assert_eq!(a, b);
    }

    #[test]
    fn test_abi_mismatch_rejected() {
        let reg = Registry::new(Box::new(TestProvider {
            abi: ABI_VERSION + 1,
        }));
        let err = reg.resolve("arc.gz").unwrap_err();
        assert!(err.to_string().contains("another fcom version"));
    }

    #[test]
    fn test_unknown_operation_in_module() {
        let reg = Registry::new(Box::new(TestProvider { abi: ABI_VERSION }));
        assert!(reg.resolve("arc.rar").is_err());
    }

    #[test]
    fn test_filter_factory_registered_on_load() {
        let reg = Registry::new(Box::new(TestProvider { abi: ABI_VERSION }));
        // Module not loaded yet; resolution loads it via the dotted prefix.
        let f = reg.create_filter("arc.nop").unwrap();
        assert_eq!(f.name(), "test.nop");
    }
}
