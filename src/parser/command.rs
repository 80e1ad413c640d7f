//! External process parser backend
//!
//! Two modes. In worker mode (the default) one long-lived process serves
//! the whole run: every parse sends a JSON request line on its stdin and
//! waits for a JSON reply line, so interpreter startup stays out of the
//! trial timings. In per-file mode the program is spawned once per
//! `parse_event` with the demo path, event name and field lists passed
//! through argument placeholders.

use super::{DemoParser, EventQuery, ParserFactory};
use crate::{DemoBenchError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Placeholder replaced by the demo file path
pub const FILE_PLACEHOLDER: &str = "{file}";
/// Placeholder replaced by the event name
pub const EVENT_PLACEHOLDER: &str = "{event}";
/// Placeholder replaced by the comma-joined player fields
pub const PLAYER_PLACEHOLDER: &str = "{player}";
/// Placeholder replaced by the comma-joined other fields
pub const OTHER_PLACEHOLDER: &str = "{other}";

const DEMOPARSER2_WORKER: &str = r#"import json, sys
from demoparser2 import DemoParser
while True:
    line = sys.stdin.readline()
    if not line:
        break
    req = json.loads(line)
    try:
        df = DemoParser(req['file']).parse_event(req['event'], player=req['player'] or None, other=req['other'] or None)
        reply = {'ok': True, 'rows': len(df)}
    except Exception as e:
        reply = {'ok': False, 'error': str(e)}
    sys.stdout.write(json.dumps(reply) + '\n')
    sys.stdout.flush()
"#;

/// How the parser program is driven
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserMode {
    /// One process for the whole run, fed requests over stdin
    #[default]
    Worker,
    /// One process per parse, arguments rendered from placeholders
    PerFile,
}

/// Program and argument template used to parse demos
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserCommand {
    pub mode: ParserMode,
    /// Executable to run, looked up on PATH
    pub program: String,
    /// Arguments; in per-file mode placeholders are substituted per file
    pub args: Vec<String>,
}

impl Default for ParserCommand {
    /// Serves requests from the `demoparser2` Python bindings
    fn default() -> Self {
        Self::worker("python3", ["-c", DEMOPARSER2_WORKER])
    }
}

impl ParserCommand {
    /// Long-lived worker reading one JSON request per line
    pub fn worker<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ParserMode::Worker,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// One process per parse, `{file}` required among the arguments
    pub fn per_file<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ParserMode::PerFile,
            ..Self::worker(program, args)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(DemoBenchError::ConfigError(
                "Parser program must not be empty".to_string(),
            ));
        }

        let references_file = self.args.iter().any(|a| a.contains(FILE_PLACEHOLDER));
        match self.mode {
            ParserMode::PerFile if !references_file => Err(DemoBenchError::ConfigError(format!(
                "Per-file parser arguments must reference the demo file via {}",
                FILE_PLACEHOLDER
            ))),
            ParserMode::Worker if references_file => Err(DemoBenchError::ConfigError(format!(
                "Worker parser arguments cannot use {}; set mode = \"per-file\" instead",
                FILE_PLACEHOLDER
            ))),
            _ => Ok(()),
        }
    }

    /// Substitute placeholders for one demo file
    ///
    /// An argument that is exactly `{file}` receives the path unchanged so
    /// non UTF-8 paths survive.
    pub fn render_args(&self, file: &Path, query: &EventQuery) -> Vec<OsString> {
        let player = query.player_fields.join(",");
        let other = query.other_fields.join(",");
        let file_display = file.to_string_lossy();

        self.args
            .iter()
            .map(|arg| {
                if arg == FILE_PLACEHOLDER {
                    return file.as_os_str().to_os_string();
                }
                arg.replace(FILE_PLACEHOLDER, &file_display)
                    .replace(EVENT_PLACEHOLDER, &query.event_name)
                    .replace(PLAYER_PLACEHOLDER, &player)
                    .replace(OTHER_PLACEHOLDER, &other)
                    .into()
            })
            .collect()
    }
}

/// One request line sent to a worker
#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    file: &'a str,
    event: &'a str,
    player: &'a [String],
    other: &'a [String],
}

/// One reply line read back from a worker
#[derive(Debug, Deserialize)]
struct WorkerReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Running worker process and its pipes
#[derive(Debug)]
struct Worker {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl Worker {
    fn spawn(command: &ParserCommand) -> Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                DemoBenchError::ParserError(format!(
                    "failed to start {}: {}",
                    command.program, e
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DemoBenchError::ParserError(format!(
                "{} started without stdio pipes",
                command.program
            )));
        };

        info!(program = %command.program, pid = child.id(), "started parser worker");
        Ok(Self {
            program: command.program.clone(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one request and wait for its reply line
    fn request(&mut self, request: &WorkerRequest<'_>) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');

        let sent = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(&line).and_then(|()| stdin.flush()),
            None => Ok(()),
        };
        if sent.is_err() {
            return Err(self.exited(request.file));
        }

        let mut reply = Vec::new();
        if self.stdout.read_until(b'\n', &mut reply)? == 0 {
            return Err(self.exited(request.file));
        }

        let parsed: WorkerReply = serde_json::from_slice(&reply).map_err(|e| {
            DemoBenchError::ParserError(format!(
                "unexpected reply from {} for {}: {}",
                self.program, request.file, e
            ))
        })?;

        if !parsed.ok {
            return Err(DemoBenchError::ParserError(format!(
                "{} failed on {}: {}",
                self.program,
                request.file,
                parsed.error.as_deref().unwrap_or("no detail")
            )));
        }

        Ok(reply)
    }

    /// Error for a worker that went away mid-run
    fn exited(&mut self, file: &str) -> DemoBenchError {
        self.stdin.take();
        let status = match self.child.wait() {
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        };
        DemoBenchError::ParserError(format!(
            "{} exited while parsing {} ({})",
            self.program, file, status
        ))
    }

    /// Close stdin and wait for a clean exit
    fn shutdown(&mut self) -> Result<()> {
        self.stdin.take();
        let status = self.child.wait()?;
        if !status.success() {
            return Err(DemoBenchError::ParserError(format!(
                "{} worker exited with {}",
                self.program, status
            )));
        }
        debug!(program = %self.program, "parser worker finished");
        Ok(())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Factory for `CommandParser`s sharing one command and, in worker mode,
/// one worker process
#[derive(Debug, Clone)]
pub struct CommandParserFactory {
    command: Arc<ParserCommand>,
    worker: Arc<Mutex<Option<Worker>>>,
}

impl CommandParserFactory {
    pub fn new(command: ParserCommand) -> Result<Self> {
        command.validate()?;
        Ok(Self {
            command: Arc::new(command),
            worker: Arc::new(Mutex::new(None)),
        })
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn parse_with_worker(&self, file: &Path, query: &EventQuery) -> Result<Vec<u8>> {
        let file = file.to_str().ok_or_else(|| {
            DemoBenchError::ParserError(format!(
                "{} is not valid UTF-8 and cannot be sent to a worker",
                file.display()
            ))
        })?;
        let request = WorkerRequest {
            file,
            event: &query.event_name,
            player: &query.player_fields,
            other: &query.other_fields,
        };

        debug!(program = %self.command.program, file, "sending parse request");

        let mut slot = self.lock_worker();
        let mut worker = match slot.take() {
            Some(worker) => worker,
            None => Worker::spawn(&self.command)?,
        };
        let reply = worker.request(&request);
        // A failed request leaves the pipe protocol in an unknown state
        if reply.is_ok() {
            *slot = Some(worker);
        }
        reply
    }

    fn parse_with_process(&self, file: &Path, query: &EventQuery) -> Result<Vec<u8>> {
        let args = self.command.render_args(file, query);
        debug!(program = %self.command.program, file = %file.display(), "spawning parser");

        let output = Command::new(&self.command.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                DemoBenchError::ParserError(format!(
                    "failed to run {}: {}",
                    self.command.program, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output");
            return Err(DemoBenchError::ParserError(format!(
                "{} failed on {} ({}): {}",
                self.command.program,
                file.display(),
                output.status,
                detail.trim()
            )));
        }

        Ok(output.stdout)
    }
}

impl ParserFactory for CommandParserFactory {
    type Parser = CommandParser;

    /// Start the worker ahead of the first timed parse
    fn prepare(&self) -> Result<()> {
        if self.command.mode == ParserMode::Worker {
            let mut slot = self.lock_worker();
            if slot.is_none() {
                *slot = Some(Worker::spawn(&self.command)?);
            }
        }
        Ok(())
    }

    fn construct(&self, path: &Path) -> Result<CommandParser> {
        let metadata = fs::metadata(path).map_err(|e| {
            DemoBenchError::ParserError(format!("cannot open {}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(DemoBenchError::ParserError(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        Ok(CommandParser {
            factory: self.clone(),
            path: path.to_path_buf(),
        })
    }

    /// Stop the worker so its resource usage is accounted
    fn finish(&self) -> Result<()> {
        match self.lock_worker().take() {
            Some(mut worker) => worker.shutdown(),
            None => Ok(()),
        }
    }
}

/// Parser bound to one demo, backed by an external process
#[derive(Debug)]
pub struct CommandParser {
    factory: CommandParserFactory,
    path: PathBuf,
}

impl DemoParser for CommandParser {
    /// Raw output for the parse: the reply line in worker mode, the whole
    /// standard output in per-file mode
    type Output = Vec<u8>;

    fn parse_event(&mut self, query: &EventQuery) -> Result<Vec<u8>> {
        match self.factory.command.mode {
            ParserMode::Worker => self.factory.parse_with_worker(&self.path, query),
            ParserMode::PerFile => self.factory.parse_with_process(&self.path, query),
        }
    }
}

/// Largest resident set size reached by any waited-for child process
///
/// Parser processes allocate outside this process, so the traced heap
/// does not include them. A worker counts once it has been finished.
#[cfg(unix)]
pub fn child_peak_rss() -> Option<u64> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the provided struct.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 means the struct was filled in.
    let usage = unsafe { usage.assume_init() };
    let max_rss = u64::try_from(usage.ru_maxrss).ok()?;

    // macOS reports bytes, other unixes report kilobytes
    if cfg!(target_os = "macos") {
        Some(max_rss)
    } else {
        Some(max_rss * 1024)
    }
}

#[cfg(not(unix))]
pub fn child_peak_rss() -> Option<u64> {
    None
}
