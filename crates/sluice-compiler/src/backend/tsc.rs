//! The TypeScript compiler as a child process
//!
//! Inputs are staged into a scratch project that lives as long as the backend,
//! together with a generated `tsconfig.json` that extends the project's own and
//! pins the options this pass needs. Every file staged so far stays part of the
//! program, so a pass over a few changed files still type checks against their
//! unchanged siblings, and tsc's build info keeps later passes incremental.
//! Only the outputs of the requested inputs are read back, each `.js.map`
//! folded into its `.js` record.

use super::{attach_source_map, CompileOutput, CompilerBackend};
use crate::error::{CompileError, CompileResult};
use regex::Regex;
use serde_json::json;
use sluice_core::record::normalize_path;
use sluice_core::transforms::is_declaration;
use sluice_core::{CompilerOptionsSet, Diagnostic, FileRecord, SourceMap};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

fn diagnostic_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(.+)\((\d+),(\d+)\): )?(error|warning) (TS\d+): (.*)$").expect("static regex")
    })
}

/// Parse one line of `tsc --pretty false` output
///
/// File names are made relative to `staged_root` when they fall under it.
pub fn parse_diagnostic(line: &str, staged_root: Option<&Path>) -> Option<Diagnostic> {
    let caps = diagnostic_regex().captures(line.trim_end())?;
    let mut diagnostic = Diagnostic::error(&caps[6]).with_code(&caps[5]);
    if &caps[4] == "warning" {
        diagnostic = diagnostic.warning();
    }

    if let (Some(file), Some(line), Some(column)) = (caps.get(1), caps.get(2), caps.get(3)) {
        let file = Path::new(file.as_str());
        let file = staged_root
            .and_then(|root| file.strip_prefix(root).ok())
            .unwrap_or(file);
        diagnostic = diagnostic.at(
            normalize_path(&file.to_string_lossy()),
            line.as_str().parse().unwrap_or_default(),
            column.as_str().parse().unwrap_or_default(),
        );
    }
    Some(diagnostic)
}

/// Scratch project shared by every compile of one backend
#[derive(Debug)]
struct Workspace {
    dir: TempDir,
    /// Staged relative path to the file it was read from
    staged: BTreeMap<String, PathBuf>,
}

impl Workspace {
    fn new() -> CompileResult<Self> {
        let dir = TempDir::new().map_err(|e| CompileError::io(std::env::temp_dir(), e))?;
        Ok(Self {
            dir,
            staged: BTreeMap::new(),
        })
    }

    fn src(&self) -> PathBuf {
        self.dir.path().join("src")
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn build_info(&self) -> PathBuf {
        self.dir.path().join("tsconfig.tsbuildinfo")
    }

    fn project(&self) -> PathBuf {
        self.dir.path().join("tsconfig.json")
    }

    /// Write `inputs` over the staged tree and return every staged file
    ///
    /// Files staged by an earlier pass are kept while the file they came from
    /// still exists; the others leave the program along with their outputs.
    fn stage(&mut self, inputs: &[FileRecord]) -> CompileResult<Vec<String>> {
        let src = self.src();
        let out = self.out();

        let requested: BTreeMap<&str, &FileRecord> = inputs.iter().map(|r| (r.relative(), r)).collect();
        let gone: Vec<String> = self
            .staged
            .iter()
            .filter(|(relative, origin)| !requested.contains_key(relative.as_str()) && !origin.exists())
            .map(|(relative, _)| relative.clone())
            .collect();
        for relative in gone {
            debug!("Unstaging {}", relative);
            self.staged.remove(&relative);
            let _ = std::fs::remove_file(src.join(&relative));
            for emitted in emitted_paths(&relative, true) {
                let _ = std::fs::remove_file(out.join(&emitted));
                let _ = std::fs::remove_file(out.join(format!("{}.map", emitted)));
            }
        }

        for (relative, record) in requested {
            let target = src.join(relative);
            let unchanged = std::fs::read(&target).is_ok_and(|staged| staged == record.contents);
            if !unchanged {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| CompileError::io(parent, e))?;
                }
                std::fs::write(&target, &record.contents).map_err(|e| CompileError::io(&target, e))?;
                trace!("Staged {}", relative);
            }
            self.staged.insert(relative.to_string(), record.absolute());
        }

        Ok(self
            .staged
            .keys()
            .map(|relative| src.join(relative).to_string_lossy().into_owned())
            .collect())
    }
}

/// Outputs tsc writes for `relative`, relative to the output directory
fn emitted_paths(relative: &str, declarations: bool) -> Vec<String> {
    if relative.ends_with(".d.ts") {
        return Vec::new();
    }
    let stem = relative.strip_suffix(".ts").unwrap_or(relative);
    let mut paths = vec![format!("{}.js", stem)];
    if declarations {
        paths.push(format!("{}.d.ts", stem));
    }
    paths
}

/// `tsc` driven through a generated project file
#[derive(Debug)]
pub struct TscBackend {
    pub program: PathBuf,
    pub project_path: PathBuf,
    /// Full type check plus declarations when set; isolated transpilation otherwise
    pub type_check: bool,
    workspace: Mutex<Option<Workspace>>,
}

impl TscBackend {
    pub fn new(project_path: impl Into<PathBuf>, type_check: bool) -> Self {
        Self {
            program: PathBuf::from("tsc"),
            project_path: project_path.into(),
            type_check,
            workspace: Mutex::new(None),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn project_file(
        &self,
        files: &[String],
        options: &CompilerOptionsSet,
        src: &Path,
        out: &Path,
        build_info: &Path,
    ) -> serde_json::Value {
        let mut compiler_options = json!({
            "rootDir": src,
            "outDir": out,
            "incremental": true,
            "tsBuildInfoFile": build_info,
            "sourceMap": options.source_map,
            "inlineSources": options.inline_sources && options.source_map,
            "newLine": options.new_line.tsc_flag(),
            "declaration": self.type_check,
            "noEmitOnError": false,
            "pretty": false,
        });
        if !self.type_check {
            compiler_options["noCheck"] = json!(true);
            compiler_options["isolatedModules"] = json!(true);
        }

        // An empty include keeps the base project's own file globs out of the program
        let mut project = json!({
            "compilerOptions": compiler_options,
            "files": files,
            "include": [],
            "exclude": [],
        });
        if self.project_path.is_file() {
            project["extends"] = json!(self.project_path);
        }
        project
    }
    /// Run the child, killing it if `token` fires first
    fn run_child(&self, project: &Path, token: &CancellationToken) -> CompileResult<Option<std::process::Output>> {
        let mut child = Command::new(&self.program)
            .arg("-p")
            .arg(project)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CompileError::backend(self.name(), format!("failed to start {:?}: {}", self.program, e)))?;

        loop {
            if token.is_cancelled() {
                debug!("Cancelling tsc (pid {})", child.id());
                if let Err(e) = child.kill() {
                    warn!("Failed to kill tsc: {}", e);
                }
                let _ = child.wait();
                return Ok(None);
            }
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(CompileError::backend(self.name(), e.to_string())),
            }
        }

        child
            .wait_with_output()
            .map(Some)
            .map_err(|e| CompileError::backend(self.name(), e.to_string()))
    }
}

impl CompilerBackend for TscBackend {
    fn name(&self) -> &str {
        if self.type_check {
            "tsc"
        } else {
            "tsc-transpile"
        }
    }

    fn compile(
        &self,
        inputs: &[FileRecord],
        options: &CompilerOptionsSet,
        token: &CancellationToken,
    ) -> CompileResult<CompileOutput> {
        let mut guard = self
            .workspace
            .lock()
            .map_err(|_| CompileError::backend(self.name(), "workspace lock poisoned"))?;
        let workspace = match guard.take() {
            Some(workspace) => workspace,
            None => Workspace::new()?,
        };
        let workspace = guard.insert(workspace);

        let files = workspace.stage(inputs)?;
        let src = workspace.src();
        let out = workspace.out();
        let project = workspace.project();
        let project_json = self.project_file(&files, options, &src, &out, &workspace.build_info());
        std::fs::write(&project, project_json.to_string()).map_err(|e| CompileError::io(&project, e))?;

        debug!("Running {} on {} of {} files", self.name(), inputs.len(), files.len());
        let Some(output) = self.run_child(&project, token)? else {
            return Ok(CompileOutput::default());
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostics: Vec<Diagnostic> = stdout
            .lines()
            .filter_map(|line| parse_diagnostic(line, Some(&src)))
            .collect();

        if !output.status.success() && diagnostics.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompileError::backend(
                self.name(),
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let records = collect_emitted(&out, &src, inputs, self.type_check, options)?;
        Ok(CompileOutput { records, diagnostics })
    }
}

/// Read the outputs of `inputs` from `out`, pairing each with its `.map`
fn collect_emitted(
    out: &Path,
    src: &Path,
    inputs: &[FileRecord],
    declarations: bool,
    options: &CompilerOptionsSet,
) -> CompileResult<Vec<FileRecord>> {
    let mut records = Vec::new();
    for input in inputs.iter().filter(|r| !is_declaration(r)) {
        for relative in emitted_paths(input.relative(), declarations) {
            let path = out.join(&relative);
            if !path.is_file() {
                continue;
            }
            let contents = std::fs::read(&path).map_err(|e| CompileError::io(&path, e))?;
            let map = std::fs::read_to_string(out.join(format!("{}.map", relative)))
                .ok()
                .and_then(|json| SourceMap::from_json(&json).ok())
                .map(|map| rebase_sources(map, &relative, out, src));

            let record = FileRecord::new(&options.root_dir, &relative, contents);
            records.push(attach_source_map(record, map, input.source_map.as_ref(), options));
        }
    }
    Ok(records)
}

/// Point `sources` at paths relative to the source root instead of the scratch dir
fn rebase_sources(mut map: SourceMap, relative: &str, out: &Path, src: &Path) -> SourceMap {
    let map_dir = out.join(relative);
    let map_dir = map_dir.parent().unwrap_or(out);
    map.sources = map
        .sources
        .iter()
        .map(|source| {
            let resolved = lexical_join(map_dir, source);
            resolved
                .strip_prefix(src)
                .map(|p| normalize_path(&p.to_string_lossy()))
                .unwrap_or_else(|_| source.clone())
        })
        .collect();
    map
}

fn lexical_join(dir: &Path, relative: &str) -> PathBuf {
    let mut joined = dir.to_path_buf();
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                joined.pop();
            }
            other => joined.push(other),
        }
    }
    joined
}
