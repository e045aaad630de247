use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use super::{EvalError, Evaluator, Job};
use crate::config::EvaluateConfig;
use crate::result::{DesignPoint, EvalResult, EvalStage, ParamValue, RetCode};

/// File written into each job with the applied design point.
pub const DESIGN_POINT_FILE: &str = "design_point.json";

const EVALUATE_LOG: &str = "evaluate.log";
const TRANSFORM_LOG: &str = "transform.log";
const WAIT_STEP: Duration = Duration::from_millis(20);

enum CommandOutcome {
    Finished { success: bool, output: String },
    TimedOut,
}

/// Evaluates points by running a shell command inside a copy of the project.
///
/// The command reads `design_point.json` from its working directory and must
/// print the quality as the last non-empty line of its output.
pub struct CommandEvaluator {
    src_dir: PathBuf,
    work_dir: PathBuf,
    command: String,
    transform: Option<String>,
    artifact: Option<PathBuf>,
    timeout: Duration,
    next_job: AtomicU64,
}

impl CommandEvaluator {
    pub fn new(
        src_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        config: &EvaluateConfig,
        timeout: Duration,
    ) -> Self {
        CommandEvaluator {
            src_dir: src_dir.into(),
            work_dir: work_dir.into(),
            command: config.command.clone(),
            transform: config.transform.clone(),
            artifact: config.artifact.clone(),
            timeout,
            next_job: AtomicU64::new(0),
        }
    }

    fn run(&self, job: &Job, command: &str, log_name: &str) -> Result<CommandOutcome, EvalError> {
        let log_path = job.path.join(log_name);
        let io_err = |source| EvalError::Io {
            path: log_path.clone(),
            source,
        };
        let log = File::create(&log_path).map_err(io_err)?;
        let log_err = log.try_clone().map_err(io_err)?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&job.path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|source| EvalError::Io {
                path: job.path.clone(),
                source,
            })?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    if let Err(err) = child.kill() {
                        warn!(job = job.id, error = %err, "failed to kill timed out command");
                    }
                    let _ = child.wait();
                    return Ok(CommandOutcome::TimedOut);
                }
                Ok(None) => thread::sleep(WAIT_STEP),
                Err(source) => {
                    return Err(EvalError::Io {
                        path: job.path.clone(),
                        source,
                    })
                }
            }
        };

        let mut output = String::new();
        File::open(&log_path)
            .and_then(|mut f| f.read_to_string(&mut output))
            .map_err(io_err)?;
        Ok(CommandOutcome::Finished {
            success: status.success(),
            output,
        })
    }
}

impl Evaluator for CommandEvaluator {
    fn create_job(&self) -> Option<Job> {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed);
        let path = self.work_dir.join(format!("job{}", id));
        if path.exists() {
            if let Err(err) = fs::remove_dir_all(&path) {
                error!(path = %path.display(), error = %err, "failed to clean stale job directory");
                return None;
            }
        }
        match copy_dir(&self.src_dir, &path) {
            Ok(()) => Some(Job { id, path }),
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to create job");
                None
            }
        }
    }

    fn apply_design_point(&self, job: &Job, point: &DesignPoint) -> Result<(), EvalError> {
        let object: serde_json::Map<String, serde_json::Value> = point
            .params()
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    ParamValue::Int(v) => serde_json::Value::from(*v),
                    ParamValue::Text(v) => serde_json::Value::from(v.as_str()),
                };
                (name.clone(), value)
            })
            .collect();
        let text = serde_json::to_string_pretty(&object)
            .map_err(|e| EvalError::Apply(e.to_string()))?;

        let path = job.path.join(DESIGN_POINT_FILE);
        fs::write(&path, text).map_err(|source| EvalError::Io { path, source })
    }

    fn code_hash(&self, job: &Job) -> Result<Option<String>, EvalError> {
        if let Some(transform) = &self.transform {
            match self.run(job, transform, TRANSFORM_LOG)? {
                CommandOutcome::Finished { success: true, .. } => {}
                CommandOutcome::Finished { output, .. } => {
                    return Err(EvalError::Transform(last_line(&output).to_string()))
                }
                CommandOutcome::TimedOut => return Err(EvalError::Transform("timed out".into())),
            }
        }

        let Some(artifact) = &self.artifact else {
            return Ok(None);
        };
        let path = job.path.join(artifact);
        let bytes = fs::read(&path).map_err(|source| EvalError::Io { path, source })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Some(format!("{:x}", hasher.finalize())))
    }

    fn evaluate(&self, job: &Job, point: &DesignPoint) -> EvalResult {
        let stage = EvalStage::Toolchain { code_hash: None };
        let fail = |ret_code| EvalResult::failed(Some(point.clone()), ret_code, stage.clone());

        match self.run(job, &self.command, EVALUATE_LOG) {
            Ok(CommandOutcome::Finished {
                success: true,
                output,
            }) => match last_line(&output).parse::<f64>() {
                Ok(quality) => {
                    debug!(job = job.id, quality, "evaluation finished");
                    EvalResult::toolchain(point.clone(), quality, None)
                }
                Err(_) => {
                    warn!(job = job.id, line = last_line(&output), "evaluation printed no quality");
                    fail(RetCode::EvaluatorError)
                }
            },
            Ok(CommandOutcome::Finished { success: false, .. }) => fail(RetCode::EvaluatorError),
            Ok(CommandOutcome::TimedOut) => {
                warn!(job = job.id, "evaluation timed out");
                fail(RetCode::Timeout)
            }
            Err(err) => {
                error!(job = job.id, error = %err, "failed to run evaluation");
                fail(RetCode::EvaluatorError)
            }
        }
    }

    fn release_job(&self, job: Job) {
        if let Err(err) = fs::remove_dir_all(&job.path) {
            warn!(path = %job.path.display(), error = %err, "failed to remove job directory");
        }
    }
}

fn last_line(output: &str) -> &str {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or("")
}

/// Recursively copy `src` into a new directory `dst`.
fn copy_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
