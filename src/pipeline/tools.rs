//! External codec tools: locating them and running them.
//!
//! Three tools take part in the bilevel codec path:
//!
//! | Kind | Default program | Job |
//! |------|-----------------|-----|
//! | [`ToolKind::Compressor`] | `tiffcp` | uncompressed TIFF → CCITT G4 TIFF |
//! | [`ToolKind::Converter`] | `tiff2pdf` | G4 TIFF → base PDF |
//! | [`ToolKind::Overlay`] | `qpdf` | stamp the text PDF over the base PDF |
//!
//! ## Resolution
//!
//! A tool is looked up, first hit wins, in: the explicit path from
//! [`ToolConfig`], its environment variable (`SEARCHPDF_TIFFCP`, ...), the
//! configured candidate directories, then every directory on `PATH`. The
//! executable check itself is done by `which`, so a bare name given as an
//! override is searched the same way.
//!
//! ## Invocation
//!
//! Processes get an explicit argument vector (never a shell), run with the
//! workspace as working directory, stdin closed and stdout discarded. Stderr
//! goes to `<program>.log` in the workspace so its tail can be reported when
//! the tool fails. A spawn error, a non-zero exit and a timeout are all the
//! same failure: [`SearchablePdfError::ExternalToolFailure`].

use crate::config::ToolConfig;
use crate::error::SearchablePdfError;
use crate::pipeline::Stage;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll interval while waiting on a tool with a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Lines of stderr quoted in a failure.
const LOG_TAIL_LINES: usize = 12;

/// One of the three external tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Compressor,
    Converter,
    Overlay,
}

impl ToolKind {
    /// Program name searched for, also used to name the tool in errors.
    pub fn program(self) -> &'static str {
        match self {
            ToolKind::Compressor => "tiffcp",
            ToolKind::Converter => "tiff2pdf",
            ToolKind::Overlay => "qpdf",
        }
    }

    /// Environment variable holding a path override.
    pub fn env_var(self) -> &'static str {
        match self {
            ToolKind::Compressor => "SEARCHPDF_TIFFCP",
            ToolKind::Converter => "SEARCHPDF_TIFF2PDF",
            ToolKind::Overlay => "SEARCHPDF_QPDF",
        }
    }

    /// Pipeline stage the tool runs in.
    pub fn stage(self) -> Stage {
        match self {
            ToolKind::Compressor => Stage::Compress,
            ToolKind::Converter => Stage::BuildBaseDocument,
            ToolKind::Overlay => Stage::Merge,
        }
    }
}

/// Locate `kind` using the process environment.
pub fn resolve_tool(kind: ToolKind, config: &ToolConfig) -> Result<PathBuf, SearchablePdfError> {
    resolve_tool_with(kind, config, |name| std::env::var_os(name))
}

/// Locate `kind`, reading environment variables through `env`.
pub fn resolve_tool_with<F>(
    kind: ToolKind,
    config: &ToolConfig,
    env: F,
) -> Result<PathBuf, SearchablePdfError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let dirs = search_path(config, env("PATH"));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let lookup = |program: &OsStr| which::which_in(program, dirs.as_ref(), &cwd);

    if let Some(path) = config.explicit(kind) {
        return lookup(path.as_os_str())
            .inspect(|found| debug!("{}: configured at {}", kind.program(), found.display()))
            .map_err(|e| {
                let detail = format!("configured path '{}' is not usable: {e}", path.display());
                not_found(kind, detail)
            });
    }

    if let Some(value) = env(kind.env_var()).filter(|v| !v.is_empty()) {
        let var = kind.env_var();
        return lookup(value.as_os_str())
            .inspect(|found| debug!("{}: using ${var} = {}", kind.program(), found.display()))
            .map_err(|e| {
                let shown = Path::new(&value).display();
                not_found(kind, format!("${var} points to '{shown}', which is not usable: {e}"))
            });
    }

    lookup(OsStr::new(kind.program()))
        .inspect(|found| debug!("{}: found at {}", kind.program(), found.display()))
        .map_err(|_| {
            not_found(
                kind,
                format!(
                    "not found in configured directories or PATH; install it or set ${}",
                    kind.env_var()
                ),
            )
        })
}

/// Configured candidate directories first, then `PATH`. `None` when there
/// is nothing to search.
fn search_path(config: &ToolConfig, path_var: Option<OsString>) -> Option<OsString> {
    let path_dirs: Vec<PathBuf> = path_var
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();
    match std::env::join_paths(config.search_dirs.iter().chain(path_dirs.iter())) {
        Ok(joined) if !joined.is_empty() => Some(joined),
        Ok(_) => None,
        Err(e) => {
            warn!("Ignoring tool search directories: {e}");
            None
        }
    }
}

fn not_found(kind: ToolKind, detail: String) -> SearchablePdfError {
    SearchablePdfError::ExternalToolFailure {
        tool: kind.program().to_string(),
        exit_code: None,
        detail,
    }
}

// ── Argument vectors ─────────────────────────────────────────────────────

/// `tiffcp -c g4 -r <rows> <input> <output>`
pub fn compressor_args(rows_per_strip: u32, input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-c".into(),
        "g4".into(),
        "-r".into(),
        rows_per_strip.to_string().into(),
        input.into(),
        output.into(),
    ]
}

/// `tiff2pdf -o <output> -c <creator> -t <title> -x <dpi> -y <dpi> <input>`
pub fn converter_args(
    output: &Path,
    creator: &str,
    title: &str,
    dpi: f64,
    input: &Path,
) -> Vec<OsString> {
    let dpi = format_dpi(dpi);
    vec![
        "-o".into(),
        output.into(),
        "-c".into(),
        creator.into(),
        "-t".into(),
        title.into(),
        "-x".into(),
        dpi.clone().into(),
        "-y".into(),
        dpi.into(),
        input.into(),
    ]
}

/// `qpdf --deterministic-id <base> --overlay <overlay> -- <output>`
pub fn overlay_args(base: &Path, overlay: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "--deterministic-id".into(),
        base.into(),
        "--overlay".into(),
        overlay.into(),
        "--".into(),
        output.into(),
    ]
}

fn format_dpi(dpi: f64) -> String {
    if dpi.fract() == 0.0 {
        format!("{}", dpi as i64)
    } else {
        format!("{dpi:.3}")
    }
}

// ── Invocation ───────────────────────────────────────────────────────────

/// Run a tool to completion inside `workdir`.
///
/// With `timeout`, a tool still running at the deadline is killed and
/// reported without an exit code.
pub fn run_tool(
    kind: ToolKind,
    program: &Path,
    args: &[OsString],
    workdir: &Path,
    timeout: Option<Duration>,
) -> Result<(), SearchablePdfError> {
    let tool = kind.program();
    let log_path = workdir.join(format!("{tool}.log"));
    let failure = |exit_code: Option<i32>, detail: String| SearchablePdfError::ExternalToolFailure {
        tool: tool.to_string(),
        exit_code,
        detail,
    };

    let log = File::create(&log_path).map_err(|e| {
        failure(None, format!("cannot create log file '{}': {}", log_path.display(), e))
    })?;

    info!("Running {} {}", program.display(), display_args(args));
    let started = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log))
        .spawn()
        .map_err(|e| failure(None, format!("failed to start '{}': {}", program.display(), e)))?;

    let status: ExitStatus = match timeout {
        None => child.wait().map_err(|e| failure(None, format!("wait failed: {e}")))?,
        Some(limit) => loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= limit => {
                    warn!("{} still running after {:?}, killing it", tool, limit);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(failure(None, format!("timed out after {}s", limit.as_secs_f64())));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(failure(None, format!("wait failed: {e}"))),
            }
        },
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.success() {
        debug!(tool, elapsed_ms, "Tool finished");
        return Ok(());
    }

    let tail = log_tail(&log_path);
    let detail = match (status.code(), tail.is_empty()) {
        (Some(_), true) => "no diagnostic output".to_string(),
        (None, true) => "terminated by signal".to_string(),
        (_, false) => tail,
    };
    warn!(tool, exit_code = ?status.code(), elapsed_ms, "Tool failed");
    Err(failure(status.code(), detail))
}

fn log_tail(path: &Path) -> String {
    let Ok(text) = std::fs::read_to_string(path) else {
        return String::new();
    };
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.as_os_str())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn no_env(_: &str) -> Option<OsString> {
        None
    }

    #[test]
    fn explicit_path_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = script(dir.path(), "my-tiffcp", "exit 0");
        let from_env = script(dir.path(), "env-tiffcp", "exit 0");
        let config = ToolConfig {
            tiffcp: Some(explicit.clone()),
            ..ToolConfig::default()
        };
        let env =
            |name: &str| (name == "SEARCHPDF_TIFFCP").then(|| from_env.clone().into_os_string());
        assert_eq!(resolve_tool_with(ToolKind::Compressor, &config, env).unwrap(), explicit);
    }

    #[test]
    fn env_var_wins_over_search_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let from_env = script(dir.path(), "custom-qpdf", "exit 0");
        script(dir.path(), "qpdf", "exit 0");
        let config = ToolConfig {
            search_dirs: vec![dir.path().to_path_buf()],
            ..ToolConfig::default()
        };
        let env =
            |name: &str| (name == "SEARCHPDF_QPDF").then(|| from_env.clone().into_os_string());
        assert_eq!(resolve_tool_with(ToolKind::Overlay, &config, env).unwrap(), from_env);
    }

    #[test]
    fn search_dirs_then_path() {
        let dirs = [tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap()];
        let on_path = script(dirs[1].path(), "tiff2pdf", "exit 0");
        let config = ToolConfig {
            tiffcp: None,
            tiff2pdf: None,
            qpdf: None,
            search_dirs: vec![dirs[0].path().to_path_buf()],
        };
        let path_var = std::env::join_paths([dirs[1].path()]).unwrap();
        let env = |name: &str| (name == "PATH").then(|| path_var.clone());
        assert_eq!(resolve_tool_with(ToolKind::Converter, &config, env).unwrap(), on_path);

        let in_dir = script(dirs[0].path(), "tiff2pdf", "exit 0");
        assert_eq!(resolve_tool_with(ToolKind::Converter, &config, env).unwrap(), in_dir);
    }

    #[test]
    fn unresolvable_tool_has_no_exit_code() {
        let config = ToolConfig {
            search_dirs: vec![],
            ..ToolConfig::default()
        };
        let err = resolve_tool_with(ToolKind::Compressor, &config, no_env).unwrap_err();
        match err {
            SearchablePdfError::ExternalToolFailure { tool, exit_code, .. } => {
                assert_eq!(tool, "tiffcp");
                assert_eq!(exit_code, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn non_executable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("qpdf"), "not a program").unwrap();
        let config = ToolConfig {
            search_dirs: vec![dir.path().to_path_buf()],
            ..ToolConfig::default()
        };
        assert!(resolve_tool_with(ToolKind::Overlay, &config, no_env).is_err());
    }

    #[test]
    fn bare_override_name_is_searched() {
        let dir = tempfile::tempdir().unwrap();
        let renamed = script(dir.path(), "tiffcp-4.6", "exit 0");
        let config = ToolConfig {
            search_dirs: vec![dir.path().to_path_buf()],
            ..ToolConfig::default()
        };
        let env = |name: &str| (name == "SEARCHPDF_TIFFCP").then(|| OsString::from("tiffcp-4.6"));
        assert_eq!(resolve_tool_with(ToolKind::Compressor, &config, env).unwrap(), renamed);
    }

    #[test]
    fn configured_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolConfig {
            qpdf: Some(dir.path().to_path_buf()),
            search_dirs: vec![],
            ..ToolConfig::default()
        };
        let err = resolve_tool_with(ToolKind::Overlay, &config, no_env).unwrap_err();
        assert!(err.to_string().contains("configured path"), "{err}");
    }

    #[test]
    fn argument_vectors() {
        let args = compressor_args(40, Path::new("in.tif"), Path::new("out.tif"));
        assert_eq!(args, vec!["-c", "g4", "-r", "40", "in.tif", "out.tif"]);

        let args = converter_args(Path::new("o.pdf"), "c", "t", 144.0, Path::new("i.tif"));
        assert_eq!(
            args,
            vec!["-o", "o.pdf", "-c", "c", "-t", "t", "-x", "144", "-y", "144", "i.tif"]
        );

        let args = overlay_args(Path::new("b.pdf"), Path::new("t.pdf"), Path::new("m.pdf"));
        assert_eq!(args, vec!["--deterministic-id", "b.pdf", "--overlay", "t.pdf", "--", "m.pdf"]);
    }

    #[test]
    fn fractional_dpi_keeps_precision() {
        assert_eq!(format_dpi(93.6), "93.600");
        assert_eq!(format_dpi(72.0), "72");
    }

    // Scripts run through /bin/sh rather than being exec'd directly, so a
    // concurrent fork in another test can't make the exec fail with ETXTBSY.
    fn sh(script: &Path) -> (PathBuf, Vec<OsString>) {
        (PathBuf::from("/bin/sh"), vec![script.into()])
    }

    #[test]
    fn successful_tool_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let (program, args) = sh(&script(dir.path(), "touch-it", "touch created-here"));
        run_tool(ToolKind::Compressor, &program, &args, dir.path(), None).unwrap();
        assert!(dir.path().join("created-here").exists());
        assert!(dir.path().join("tiffcp.log").exists());
    }

    #[test]
    fn nonzero_exit_reports_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let (program, args) =
            sh(&script(dir.path(), "fail", "echo 'cannot read input' >&2\nexit 3"));
        let err = run_tool(ToolKind::Compressor, &program, &args, dir.path(), None).unwrap_err();
        match err {
            SearchablePdfError::ExternalToolFailure { tool, exit_code, detail } => {
                assert_eq!(tool, "tiffcp");
                assert_eq!(exit_code, Some(3));
                assert!(detail.contains("cannot read input"), "detail: {detail}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn spawn_failure_has_no_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent");
        let err = run_tool(ToolKind::Overlay, &absent, &[], dir.path(), None).unwrap_err();
        assert!(matches!(
            err,
            SearchablePdfError::ExternalToolFailure { exit_code: None, .. }
        ));
    }

    #[test]
    fn hung_tool_is_killed_at_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let (program, args) = sh(&script(dir.path(), "hang", "exec sleep 30"));
        let started = Instant::now();
        let err = run_tool(
            ToolKind::Converter,
            &program,
            &args,
            dir.path(),
            Some(Duration::from_millis(200)),
        )
        .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            SearchablePdfError::ExternalToolFailure { tool, exit_code, detail } => {
                assert_eq!(tool, "tiff2pdf");
                assert_eq!(exit_code, None);
                assert!(detail.contains("timed out"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
