//! Tree walk and two-phase parallel execution.
//!
//! Files are collected from a sorted walk of the target (or the target
//! itself in single-file mode), then processed on a bounded rayon pool in
//! two phases: everything except BUILD files first, BUILD files second. The
//! BUILD fixer reads sources referenced from BUILD files, so those sources
//! must be settled before it runs. The second phase starts only after the
//! first has fully drained.

use crate::classify::{classify, normalize, Category, Exclusions};
use crate::error::{Error, Result};
use crate::models::{Diagnostic, FileResult, FileTask, Operation, RunReport};
use rayon::prelude::*;
use std::any::Any;
use std::backtrace::Backtrace;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Work done for one file. Implementations are shared across worker threads.
pub trait FileProcessor: Sync {
    fn process(&self, task: &FileTask) -> Result<Vec<Diagnostic>>;
}

pub struct Orchestrator {
    root: PathBuf,
    exclusions: Exclusions,
    workers: usize,
    operation: Operation,
}

impl Orchestrator {
    pub fn new(root: impl Into<PathBuf>, exclusions: Exclusions, workers: usize, operation: Operation) -> Self {
        Orchestrator {
            root: root.into(),
            exclusions,
            workers,
            operation,
        }
    }

    fn task(&self, path: PathBuf, rel_path: String) -> FileTask {
        FileTask {
            category: classify(&rel_path),
            path,
            rel_path,
            operation: self.operation,
        }
    }

    /// Files under `target` that pass the exclusion rules, in walk order.
    pub fn collect_tasks(&self, target: &Path) -> Result<Vec<FileTask>> {
        let target = fs::canonicalize(target).map_err(|e| Error::io(target, e))?;

        if target.is_file() {
            let rel = normalize(&target, &self.root);
            if self.exclusions.is_excluded(&rel) {
                log::debug!("{}: excluded", rel);
                return Ok(Vec::new());
            }
            return Ok(vec![self.task(target, rel)]);
        }

        let mut tasks = Vec::new();
        let walker = WalkDir::new(&target)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir() && self.exclusions.prunes_dir(&normalize(e.path(), &self.root)))
            });
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = normalize(entry.path(), &self.root);
            if self.exclusions.is_excluded(&rel) {
                continue;
            }
            tasks.push(self.task(entry.into_path(), rel));
        }
        Ok(tasks)
    }

    /// Process every file under `target` and aggregate the results.
    pub fn run(&self, target: &Path, processor: &dyn FileProcessor) -> Result<RunReport> {
        if self.workers == 0 {
            return Err(Error::InvalidWorkers);
        }
        let tasks = self.collect_tasks(target)?;
        let (build, other): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .partition(|t| t.category == Category::BuildFile);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        let mut report = RunReport::default();
        for (phase, batch) in [other, build].iter().enumerate() {
            log::debug!("phase {}: {} files on {} workers", phase + 1, batch.len(), self.workers);
            let results: Vec<FileResult> =
                pool.install(|| batch.par_iter().map(|t| run_job(processor, t)).collect());
            for r in results {
                report.push(r);
            }
        }
        Ok(report)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one task. Errors and panics become diagnostics for that file only.
fn run_job(processor: &dyn FileProcessor, task: &FileTask) -> FileResult {
    let file = task.rel_path.as_str();
    let diagnostics = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(task))) {
        Ok(Ok(diags)) => diags,
        Ok(Err(e)) => {
            log::warn!("{}: {}", file, e.chain());
            vec![Diagnostic::whole_file(file, e.chain())]
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            log::warn!("{}: panicked: {}", file, msg);
            let trace = Backtrace::force_capture();
            vec![Diagnostic::whole_file(
                file,
                format!("unexpected failure: {}\n{}", msg, trace),
            )]
        }
    };
    FileResult {
        file: file.to_string(),
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl FileProcessor for Recorder {
        fn process(&self, task: &FileTask) -> Result<Vec<Diagnostic>> {
            self.seen.lock().unwrap().push(task.rel_path.clone());
            Ok(Vec::new())
        }
    }

    struct Faulty;

    impl FileProcessor for Faulty {
        fn process(&self, task: &FileTask) -> Result<Vec<Diagnostic>> {
            match task.rel_path.as_str() {
                "./a.cc" => panic!("boom"),
                "./b.cc" => Err(Error::Encoding {
                    path: task.path.clone(),
                }),
                _ => Ok(vec![Diagnostic::at(&task.rel_path, 1, "x")]),
            }
        }
    }

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, "x\n").unwrap();
    }

    fn orchestrator(root: &Path, workers: usize) -> Orchestrator {
        Orchestrator::new(
            root.canonicalize().unwrap(),
            Exclusions::default(),
            workers,
            Operation::Check,
        )
    }

    #[test]
    fn test_walk_is_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for rel in [
            "source/b.cc",
            "source/a.h",
            "source/README.md",
            "generated/x.cc",
            "bazel-out/y.cc",
            "api/z.proto",
        ] {
            touch(root, rel);
        }
        let orch = orchestrator(root, 1);
        let tasks = orch.collect_tasks(root).unwrap();
        let rels: Vec<_> = tasks.iter().map(|t| t.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["./api/z.proto", "./source/a.h", "./source/b.cc"]);
        assert_eq!(tasks[0].category, Category::ProtoFile);
    }

    #[test]
    fn test_single_file_mode() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "source/a.cc");
        touch(root, "generated/a.cc");
        let orch = orchestrator(root, 1);
        let tasks = orch.collect_tasks(&root.join("source/a.cc")).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].rel_path, "./source/a.cc");
        assert!(orch.collect_tasks(&root.join("generated/a.cc")).unwrap().is_empty());
        assert!(orch.collect_tasks(&root.join("missing.cc")).is_err());
    }

    #[test]
    fn test_build_files_run_after_everything_else() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for i in 0..20 {
            touch(root, &format!("pkg{:02}/BUILD", i));
            touch(root, &format!("pkg{:02}/a.cc", i));
            touch(root, &format!("pkg{:02}/defs.bzl", i));
        }
        let rec = Recorder::default();
        let report = orchestrator(root, 4).run(root, &rec).unwrap();
        assert_eq!(report.files, 60);

        let seen = rec.seen.lock().unwrap();
        let first_build = seen.iter().position(|p| p.ends_with("/BUILD")).unwrap();
        assert_eq!(first_build, 40);
        assert!(seen[first_build..].iter().all(|p| p.ends_with("/BUILD")));

        // results keep submission order regardless of completion order
        assert_eq!(report.results[0].file, "./pkg00/a.cc");
        assert_eq!(report.results[40].file, "./pkg00/BUILD");
    }

    #[test]
    fn test_job_faults_stay_local() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for rel in ["a.cc", "b.cc", "c.cc"] {
            touch(root, rel);
        }
        let report = orchestrator(root, 2).run(root, &Faulty).unwrap();
        assert_eq!(report.files, 3);
        let a = &report.results[0].diagnostics;
        assert_eq!(a.len(), 1);
        assert!(a[0].message.starts_with("unexpected failure: boom"));
        let b = &report.results[1].diagnostics;
        assert!(b[0].message.ends_with("is not valid UTF-8"));
        assert_eq!(report.results[2].diagnostics[0].line, Some(1));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let dir = tempdir().unwrap();
        let err = orchestrator(dir.path(), 0).run(dir.path(), &Recorder::default());
        assert!(matches!(err, Err(Error::InvalidWorkers)));
    }
}
