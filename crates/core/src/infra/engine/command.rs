use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

use crate::domain::engine::ProcessFailure;

/// 失敗時に保持する stderr の上限 (末尾を残す)
const STDERR_TAIL_BYTES: usize = 16 * 1024;

#[cfg(unix)]
const KILL_SIGNAL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
const KILL_SIGNAL: i32 = 9;

/// 外部ツールを起動して終了を待ち、stdout/stderr/終了コードを捕捉する。
/// 正常終了なら stdout を返す。stderr は失敗時の診断にだけ使う。
///
/// 非ゼロ終了・シグナル終了は `ProcessFailure` になる。タイムアウトは設けない。
pub async fn run_tool(program: &Path, args: &[String]) -> Result<String, ProcessFailure> {
    let name = program_name(program);

    log::debug!("Running {:?} {:?}", program, args);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ProcessFailure::not_started(&name, format!("binary not found: {:?}", program))
            }
            std::io::ErrorKind::PermissionDenied => {
                ProcessFailure::not_started(&name, format!("cannot execute {:?}: {e}", program))
            }
            _ => ProcessFailure::not_started(&name, format!("failed to spawn process: {e}")),
        })?;

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ProcessFailure::not_started(&name, format!("process error: {e}")))?;

    if !output.status.success() {
        let stderr = stderr_tail(&String::from_utf8_lossy(&output.stderr));
        let code = exit_code(&output.status);
        let exhausted = is_kill_exit(code);
        if exhausted {
            log::warn!("{name} was killed (exit code {code}); possible resource exhaustion");
        }
        return Err(ProcessFailure::exited(name, code, stderr, exhausted));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// 終了コードを取り出す。シグナル終了は `-signal` で表す。
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// kill シグナルによる終了か。シェル経由の `128 + SIGKILL` も含む。
///
/// プラットフォーム依存のためヒントであって保証ではない。
pub fn is_kill_exit(code: i32) -> bool {
    code == -KILL_SIGNAL || code == 128 + KILL_SIGNAL
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string_lossy().into_owned())
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}
