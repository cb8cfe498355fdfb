// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Runner
//!
//! The top-level driver: resolves the requested operation through the
//! registry, lets its template parse the arguments and build the filter
//! chain, hands the pipeline to the worker pool, and waits for the
//! completion monitor. The runtime handle (config, registry, pool) is
//! created here and threaded through explicitly.

use std::sync::Arc;

use fcom_bootstrap::SignalHub;
use fcom_domain::{Command, FcomError};

use crate::application::operations::StaticProvider;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::runtime::pipeline::{FilterResolver, Pipeline};
use crate::infrastructure::runtime::registry::Registry;
use crate::infrastructure::runtime::worker_pool::WorkerPool;
use crate::infrastructure::runtime::RuntimeHandle;

pub struct CommandRunner {
    rt: RuntimeHandle,
    hub: Arc<SignalHub>,
}

impl CommandRunner {
    /// Builds the process runtime: registry over the built-in modules,
    /// worker pool sized from config, eager module preloads.
    pub fn new(config: Arc<AppConfig>, hub: Arc<SignalHub>) -> Result<Self, FcomError> {
        let registry = Arc::new(Registry::with_mod_conf(
            Box::new(StaticProvider),
            config.mod_conf.clone(),
        ));
        for module in &config.modules {
            registry.preload(module)?;
        }
        let pool = WorkerPool::new(config.worker_count()?)?;
        tracing::debug!(workers = pool.worker_count(), "runtime ready");
        Ok(CommandRunner {
            rt: RuntimeHandle {
                config,
                registry,
                pool,
            },
            hub,
        })
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.rt
    }

    /// Dispatches one operation and blocks until its pipeline completes.
    pub fn run(&self, operation: &str, args: &[String]) -> Result<(), FcomError> {
        if args.iter().any(|a| a == "-h" || a == "--help") {
            let help = self.rt.registry.help(operation)?;
            print!("{}", fcom_bootstrap::render_help(help));
            return Ok(());
        }

        let template = self.rt.registry.resolve(operation)?;
        tracing::debug!(operation = template.name, "dispatching");

        let mut cmd = Command::new(template.name);
        cmd.codepage = self.rt.config.codepage();
        self.hub.register(cmd.stop_flag());

        let chain = (template.build)(&self.rt, &mut cmd, args)?;
        if chain.is_empty() {
            return Err(FcomError::Internal(format!(
                "operation '{}' built an empty chain",
                template.name
            )));
        }

        let mut pipeline = Box::new(Pipeline::new(
            cmd,
            Arc::clone(&self.rt.registry) as Arc<dyn FilterResolver>,
        ));
        for filter in chain {
            pipeline.push(filter);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        self.rt.pool.submit(
            pipeline,
            Some(Box::new(move |result: &Result<(), FcomError>| {
                let _ = tx.send(result.clone());
            })),
        );
        rx.recv()
            .map_err(|_| FcomError::Internal("worker pool shut down unexpectedly".into()))?
    }

    /// One-line inventory for `fcom` with no operation.
    pub fn known_modules(&self) -> Vec<&'static str> {
        self.rt.registry.known_modules()
    }

    pub fn shutdown(&self) {
        self.rt.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> CommandRunner {
        CommandRunner::new(Arc::new(AppConfig::default()), SignalHub::new()).unwrap()
    }

    #[test]
    fn test_unknown_operation() {
        let r = runner();
        let err = r.run("frobnicate", &[]).unwrap_err();
        assert!(matches!(err, FcomError::NotFound(_)));
        r.shutdown();
    }

    #[test]
    fn test_list_runs_end_to_end() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        let r = runner();
        r.run("list", &[tmp.path().to_string_lossy().into_owned()])
            .unwrap();
        r.shutdown();
    }

    #[test]
    fn test_md5_writes_digest_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let input = tmp.path().join("hello.txt");
        std::fs::write(&input, b"hello\n").unwrap();
        let out = tmp.path().join("sums.txt");

        let r = runner();
        r.run(
            "md5",
            &[
                input.to_string_lossy().into_owned(),
                "-o".into(),
                out.to_string_lossy().into_owned(),
            ],
        )
        .unwrap();
        r.shutdown();

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("b1946ac92492d2347c6235b4d2611184 *"));
        assert!(text.ends_with("hello.txt\n"));
    }

    #[test]
    fn test_alias_resolves_through_runner() {
        let r = runner();
        // `unzip` is an alias for arc.unzip; the help lookup resolves it.
        r.run("unzip", &["--help".into()]).unwrap();
        assert!(r.run("unfoo", &["--help".into()]).is_err());
        r.shutdown();
    }
}
